use std::{io, process, sync::Arc};

use podfeeds::{
    application::{
        error::AppError,
        origin::OriginFetcher,
        rebuild::{RebuildCoordinator, RebuildPolicy, RebuildTrigger},
        revalidate::RevalidationHandler,
        subscriptions::{FileSubscriptions, SubscriptionSource},
        watcher::ChangeWatcher,
    },
    cache::{MemoryPageCache, PageCache},
    config::{self, CacheBackend},
    domain::{CacheKey, page::INDEX_KEY},
    infra::{
        db::SqlitePageCache,
        error::InfraError,
        http::{self, HttpState},
        origin::HttpOriginFetcher,
        telemetry,
    },
};
use tokio::{net::TcpListener, sync::watch, task::JoinError};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Rebuild(_) => run_rebuild(settings).await,
        config::Command::Refresh(args) => run_refresh(settings, &args.url).await,
        config::Command::Evict(args) => run_evict(settings, &args.url).await,
        config::Command::Clear(_) => run_clear(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache = open_cache(&settings).await?;
    let fetcher = origin_fetcher(&settings)?;
    let coordinator = Arc::new(build_coordinator(
        &settings,
        Arc::clone(&fetcher),
        Arc::clone(&cache),
    ));

    let listener = bind_listener(&settings).await?;

    // The startup rebuild runs in the background; until it publishes, pages
    // come from whatever the store already holds.
    let watcher = Arc::new(ChangeWatcher::new(
        coordinator,
        settings.subscriptions.poll_interval,
    ));
    let watcher_handle = watcher.start();

    let pages = Arc::new(RevalidationHandler::new(
        cache,
        fetcher,
        settings.proxy.miss_policy,
    ));
    let result = serve_http(&settings, listener, HttpState::new(pages)).await;

    watcher_handle.abort();
    let _ = watcher_handle.await;

    result
}

async fn run_rebuild(settings: config::Settings) -> Result<(), AppError> {
    if settings.cache.backend == CacheBackend::Memory {
        warn!(
            target: "podfeeds::rebuild",
            "Memory backend selected; the rebuilt pages are discarded on exit"
        );
    }

    let cache = open_cache(&settings).await?;
    let fetcher = origin_fetcher(&settings)?;
    let coordinator = build_coordinator(&settings, fetcher, cache);

    let report = coordinator
        .rebuild(RebuildTrigger::Manual, RebuildPolicy::Wait)
        .await?;
    info!(
        target: "podfeeds::rebuild",
        feeds = report.feeds,
        elapsed_ms = report.elapsed.as_millis(),
        "Rebuild finished"
    );
    Ok(())
}

async fn run_refresh(settings: config::Settings, url: &str) -> Result<(), AppError> {
    let cache = durable_cache(&settings, "refresh").await?;
    let handler = RevalidationHandler::new(
        Arc::new(cache),
        origin_fetcher(&settings)?,
        settings.proxy.miss_policy,
    );

    let served = handler.force_refresh(url).await?;
    info!(
        target: "podfeeds::refresh",
        url,
        outcome = served.revalidation.as_str(),
        etag = served.page.etag.as_deref().unwrap_or(""),
        "Feed page refreshed"
    );
    Ok(())
}

async fn run_evict(settings: config::Settings, url: &str) -> Result<(), AppError> {
    let url = url.trim();
    if url.is_empty() || url == INDEX_KEY {
        return Err(AppError::validation(
            "evict requires the URL of a subscribed feed",
        ));
    }

    let cache = durable_cache(&settings, "evict").await?;
    cache.erase(&CacheKey::feed(url)).await?;
    info!(target: "podfeeds::evict", url, "Cached page removed");
    cache.close().await;
    Ok(())
}

async fn run_clear(settings: config::Settings) -> Result<(), AppError> {
    let cache = durable_cache(&settings, "clear").await?;
    cache.clear().await?;
    info!(target: "podfeeds::clear", "Page store emptied");
    cache.close().await;
    Ok(())
}

async fn open_cache(settings: &config::Settings) -> Result<Arc<dyn PageCache>, AppError> {
    match &settings.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryPageCache::new())),
        CacheBackend::Sqlite { path } => {
            let cache = SqlitePageCache::open(path).await.map_err(InfraError::from)?;
            Ok(Arc::new(cache))
        }
    }
}

/// Maintenance commands only make sense against a store that outlives the
/// process.
async fn durable_cache(
    settings: &config::Settings,
    command: &str,
) -> Result<SqlitePageCache, AppError> {
    match &settings.cache.backend {
        CacheBackend::Sqlite { path } => Ok(SqlitePageCache::open(path)
            .await
            .map_err(InfraError::from)?),
        CacheBackend::Memory => Err(AppError::validation(format!(
            "`{command}` requires `cache.backend = \"sqlite\"`"
        ))),
    }
}

fn origin_fetcher(settings: &config::Settings) -> Result<Arc<dyn OriginFetcher>, AppError> {
    Ok(Arc::new(HttpOriginFetcher::new(&settings.origin)?))
}

fn build_coordinator(
    settings: &config::Settings,
    fetcher: Arc<dyn OriginFetcher>,
    cache: Arc<dyn PageCache>,
) -> RebuildCoordinator {
    let subscriptions: Arc<dyn SubscriptionSource> =
        Arc::new(FileSubscriptions::new(settings.subscriptions.path.clone()));
    RebuildCoordinator::new(subscriptions, fetcher, cache)
}

async fn bind_listener(settings: &config::Settings) -> Result<TcpListener, AppError> {
    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target: "podfeeds::serve", addr = %local_addr, "Listening");
    Ok(listener)
}

async fn serve_http(
    settings: &config::Settings,
    listener: TcpListener,
    state: HttpState,
) -> Result<(), AppError> {
    let router = http::build_router(state);
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(
        target: "podfeeds::serve",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "Shutdown requested; draining connections"
    );
    let _ = stop_tx.send(true);

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target: "podfeeds::serve",
                "Graceful shutdown window elapsed; dropping open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(joined: Result<io::Result<()>, JoinError>) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
