pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics_defs;
pub mod query;
pub mod service;

use config::{Config, Listener};
use errors::MirrorError;
use handlers::MirrorState;
use service::MirrorService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use update_center::cache::FileSystemCache;
use update_center::download_counter::DownloadCounter;
use update_center::resolver::UpdateCenterResolver;
use update_center::upstream::JenkinsUpstream;
use update_center::work_pool::WorkPool;

/// Runs the mirror until a listener fails or the process receives ctrl-c.
pub async fn run(config: Config) -> Result<(), MirrorError> {
    config.validate()?;

    let cache = Arc::new(FileSystemCache::new(&config.cache_file));
    let upstream = Arc::new(JenkinsUpstream::new(config.upstream_url.clone())?);
    let work_pool = WorkPool::start(config.work_pool_capacity);

    let state = Arc::new(MirrorState {
        resolver: UpdateCenterResolver::new(cache, upstream),
        work_pool: work_pool.handle(),
        counter: Arc::new(DownloadCounter::new(&config.data_dir)),
        config: config.clone(),
    });

    let main_task = serve(Some(&config.listener), MirrorService::new(state.clone()));
    let lts_task = serve(config.lts_listener.as_ref(), MirrorService::new(state));
    let pool = work_pool.handle();
    let admin_task = serve(
        config.admin_listener.as_ref(),
        AdminService::new(move || pool.is_running()),
    );

    let result = tokio::select! {
        result = async { tokio::try_join!(main_task, lts_task, admin_task).map(|_| ()) } => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    work_pool.stop().await;
    result
}

async fn serve<S>(listener: Option<&Listener>, service: S) -> Result<(), MirrorError>
where
    S: hyper::service::Service<
            hyper::Request<hyper::body::Incoming>,
            Response = handlers::MirrorResponse,
            Error = MirrorError,
        > + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    match listener {
        Some(listener) => run_http_service(&listener.host, listener.port, service).await,
        // Not configured, never completes
        None => std::future::pending().await,
    }
}
