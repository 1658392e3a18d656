//! s3emu — a local, file-backed emulator of the Amazon S3 object-storage
//! HTTP API.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use s3emu::accounts::AccountRegistry;
use s3emu::api::auth::sigv4_auth_middleware;
use s3emu::api::handlers::{
    bucket_get_handler, create_bucket, delete_bucket, delete_object, get_object, get_stats,
    head_bucket, head_object, head_root, health_check, list_buckets, post_bucket_dispatch,
    put_object_or_copy, AppState,
};
use s3emu::config::{BucketPreconfig, Cli, ServerOptions};
use s3emu::cors::cors_middleware;
use s3emu::events::EventEmitter;
use s3emu::metrics::{http_metrics_middleware, metrics_handler, Metrics};
use s3emu::router::dispatch_middleware;
use s3emu::storage::{FilesystemStore, Store, SubresourceKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Objects larger than this are rejected before a handler ever sees them;
/// chosen to comfortably clear the 5 GiB round-trip ceiling this emulator
/// claims to support.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024 * 1024 + 16 * 1024 * 1024;

fn version_long() -> &'static str {
    static V: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    V.get_or_init(|| format!("{} (built {})", env!("CARGO_PKG_VERSION"), env!("S3EMU_BUILD_TIME")))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let options = match ServerOptions::load(cli) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    match runtime.block_on(async_main(options)) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn async_main(options: ServerOptions) -> Result<(), Box<dyn std::error::Error>> {
    let initial_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if options.silent {
            EnvFilter::new("s3emu=warn")
        } else {
            EnvFilter::new("s3emu=info,tower_http=info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(initial_filter).init();

    info!("s3emu {}", version_long());
    info!("  data directory: {}", options.data_dir.display());
    info!("  listen address: {}", options.listen_addr());
    if options.tls_enabled() {
        if options.tls.cert_path.is_some() {
            info!("  TLS: enabled (user-provided certificate)");
        } else {
            warn!("  TLS: enabled (auto-generated self-signed certificate)");
        }
    }
    if !options.vhost_buckets_enabled {
        info!("  virtual-hosted-style addressing: disabled");
    }
    if options.allow_mismatched_signatures {
        warn!("  allow-mismatched-signatures is set: SigV4 signatures are not actually checked");
    }

    let store: Arc<dyn Store> = Arc::new(FilesystemStore::new(options.data_dir.clone()).await?);
    preconfigure_buckets(&*store, &options.configure_buckets).await?;

    let metrics = Arc::new(Metrics::new());
    metrics.process_start_time_seconds.set(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64(),
    );
    metrics.build_info.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1.0);

    let state = Arc::new(AppState {
        store,
        accounts: AccountRegistry::fixed(),
        options: Arc::new(options.clone()),
        events: EventEmitter::new(),
        metrics: Some(metrics),
    });

    let app = build_router(state.clone());

    let rustls_config = if options.tls_enabled() {
        Some(s3emu::tls::build_rustls_config(&options.tls).await?)
    } else {
        None
    };

    let addr = options.listen_addr();
    if let Some(rustls_config) = rustls_config {
        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        info!("listening on https://{addr}");
        axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    info!("shutdown complete");
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/metrics", get(metrics_handler))
        .route("/", get(list_buckets).head(head_root))
        .route(
            "/:bucket/*key",
            get(get_object)
                .put(put_object_or_copy)
                .delete(delete_object)
                .head(head_object)
                .post(s3emu::api::handlers::post_object),
        )
        .route(
            "/:bucket",
            get(bucket_get_handler)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(head_bucket)
                .post(post_bucket_dispatch),
        )
        .route(
            "/:bucket/",
            get(bucket_get_handler)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(head_bucket)
                .post(post_bucket_dispatch),
        )
        // Innermost to outermost: CORS sees the response closest to the
        // route handler, dispatch sees the request first of all.
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), sigv4_auth_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), http_metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(state.clone(), dispatch_middleware))
        .with_state(state)
}

/// Sniff a subresource config document's root XML element to decide which
/// kind it installs: the only signal `--configure-bucket` has to go on,
/// since the files carry no other indication of their purpose.
fn sniff_subresource_kind(xml: &str) -> Option<SubresourceKind> {
    if xml.contains("<CORSConfiguration") {
        Some(SubresourceKind::Cors)
    } else if xml.contains("<WebsiteConfiguration") {
        Some(SubresourceKind::Website)
    } else if xml.contains("<Tagging") {
        Some(SubresourceKind::Tagging)
    } else {
        None
    }
}

async fn preconfigure_buckets(
    store: &dyn Store,
    buckets: &[BucketPreconfig],
) -> Result<(), Box<dyn std::error::Error>> {
    for preconfig in buckets {
        store.put_bucket(&preconfig.name).await?;
        info!("configured bucket {}", preconfig.name);
        for path in &preconfig.config_files {
            let xml = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            let kind = sniff_subresource_kind(&xml).ok_or_else(|| {
                format!(
                    "{}: unrecognized subresource root element (expected CORSConfiguration, WebsiteConfiguration, or Tagging)",
                    path.display()
                )
            })?;
            store.put_subresource(&preconfig.name, None, kind, xml).await?;
            info!("  installed {} from {}", kind.as_str(), path.display());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("received Ctrl+C, shutting down"),
        _ = terminate => warn!("received SIGTERM, shutting down"),
    }
}
