use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

pub fn gzip(html: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(html.len() / 3), Compression::default());
    encoder.write_all(html)?;
    encoder.finish()
}

pub fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(body.len() * 3);
    GzDecoder::new(body).read_to_end(&mut decoded)?;
    Ok(decoded)
}
