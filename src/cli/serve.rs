//! Serve CLI command.

use crate::{Result, WebhookService};

/// Recovers pending tasks and runs the worker pool until Ctrl-C.
///
/// In-flight deliveries finish before returning; tasks still buffered stay in
/// the durable queue for the next start.
///
/// # Errors
///
/// Returns an error if recovery fails or the signal handler cannot be
/// installed.
pub async fn cmd_serve(service: &WebhookService) -> Result<()> {
    let recovered = service.recover().await?;
    let pool = service.start();
    tracing::info!(
        workers = pool.size(),
        recovered,
        "hookrelay serving, press Ctrl-C to stop"
    );

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down webhook workers");
    pool.shutdown().await;

    signal.map_err(|e| crate::Error::OperationFailed {
        operation: "install_signal_handler".to_string(),
        cause: e.to_string(),
    })
}
