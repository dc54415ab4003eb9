//! Backend selection: picks the variant named by `[backend] kind` at startup.

use bluechat_config::{AppConfig, BackendKind};
use bluechat_core::backend::Backend;
use bluechat_core::error::BackendError;
use std::sync::Arc;
use tracing::{info, warn};

use crate::remote::RemoteBackend;

/// Build the configured backend.
///
/// The local variant loads its model here, which blocks; call this from
/// `spawn_blocking` when already inside a runtime.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Backend>, BackendError> {
    match config.backend.kind {
        BackendKind::Remote => {
            let backend = RemoteBackend::from_config(config)?;
            if backend.is_configured() {
                info!(
                    backend = backend.name(),
                    model = %config.backend.remote.model,
                    "Remote backend ready"
                );
            } else {
                warn!(
                    backend = backend.name(),
                    "No API key set (GROQ_API_KEY); chat requests will fail until one is configured"
                );
            }
            Ok(Arc::new(backend))
        }
        BackendKind::Local => build_local(config),
    }
}

#[cfg(feature = "local")]
fn build_local(config: &AppConfig) -> Result<Arc<dyn Backend>, BackendError> {
    let backend = crate::local::LocalBackend::load(&config.backend.local)?;
    info!(
        backend = backend.name(),
        model = %config.backend.local.model,
        "Local backend ready"
    );
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "local"))]
fn build_local(_config: &AppConfig) -> Result<Arc<dyn Backend>, BackendError> {
    Err(BackendError::NotConfigured(
        "local inference requires building with the `local` feature".into(),
    ))
}
