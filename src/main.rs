use adstxt_gateway::analysis::{AnalysisService, DomainAnalyzer};
use adstxt_gateway::cache::{DomainCache, MemoryCache};
use adstxt_gateway::config::Args;
use adstxt_gateway::events::{EventSink, OP_SERVER_SHUTDOWN, OP_SERVER_START, TracingEvents};
use adstxt_gateway::fetcher::HttpFetcher;
use adstxt_gateway::logging::setup_logging;
use adstxt_gateway::rate_limit::TwoTierLimiter;
use adstxt_gateway::server::router;
use adstxt_gateway::state::AppState;
use adstxt_gateway::worker::BatchOrchestrator;
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    setup_logging(args.log_json, &args.log_level);

    let events: Arc<dyn EventSink> = Arc::new(TracingEvents);

    let store = Arc::new(MemoryCache::new());
    let cleanup = store.spawn_cleanup(args.cache_cleanup_interval());
    let cache = DomainCache::new(store, args.cache_ttl());

    let fetcher = HttpFetcher::new(args.fetch_timeout()).context("building HTTP client")?;
    let analyzer: Arc<dyn DomainAnalyzer> = Arc::new(AnalysisService::new(
        Arc::new(fetcher),
        cache,
        Arc::clone(&events),
    ));
    let orchestrator =
        BatchOrchestrator::new(Arc::clone(&analyzer), Arc::clone(&events), args.batch_config());

    let limiter = Arc::new(TwoTierLimiter::new(&args.limiter_config()));
    let sweeper = limiter.spawn_sweeper();

    let state = Arc::new(AppState {
        analyzer,
        orchestrator,
        limiter,
        events: Arc::clone(&events),
        max_batch_size: args.max_batch_size as usize,
    });
    let app = router(state, args.server_timeouts());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    events.info(
        OP_SERVER_START,
        None,
        &format!("Server listening on http://{addr}"),
    );
    tracing::info!(
        cache_ttl_secs = args.cache_ttl,
        global_rate = args.global_rate_limit,
        per_ip_rate = args.per_ip_rate_limit,
        max_concurrent = args.max_concurrent_fetches,
        "configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()));

    let mut server = std::pin::pin!(server.into_future());
    tokio::select! {
        result = &mut server => result.context("server error")?,
        _ = drain_deadline(shutdown.clone(), args.shutdown_timeout()) => {
            tracing::warn!("shutdown timeout reached, dropping open connections");
        }
    }

    sweeper.shutdown().await;
    cleanup.abort();
    events.info(OP_SERVER_SHUTDOWN, None, "Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }

    shutdown.cancel();
}

// resolves `timeout` after shutdown has started
async fn drain_deadline(shutdown: CancellationToken, timeout: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(timeout).await;
}
