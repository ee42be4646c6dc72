//! HTML views rendered into cached pages.

pub mod views;
