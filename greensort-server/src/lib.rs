pub mod config_manager;
pub mod http;
pub mod metrics;
pub mod session_manager;
pub mod websocket;

pub use config_manager::ConfigManager;
pub use http::{create_router, AppState};
pub use metrics::Metrics;
pub use session_manager::{SessionControl, SessionManager};

use greensort_core::InferenceConfig;
use greensort_eye::{InferenceAdapter, NullAdapter, RemoteAdapter};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Pick the detector backend for this configuration
pub fn build_adapter(config: &InferenceConfig) -> anyhow::Result<Arc<dyn InferenceAdapter>> {
    match &config.endpoint {
        Some(endpoint) => {
            let adapter = RemoteAdapter::new(endpoint.clone(), config)?;
            info!("Using remote detector at {}", endpoint);
            Ok(Arc::new(adapter))
        }
        None => {
            warn!("No inference endpoint configured; every frame will report nothing");
            Ok(Arc::new(NullAdapter))
        }
    }
}

/// Serve the realtime API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
