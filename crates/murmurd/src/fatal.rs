//! Fatal report handling.

use murmur_api::ApiState;
use murmur_core::FatalPolicy;
use murmur_sessions::FatalReport;
use tokio::sync::mpsc;

/// Apply `policy` to every fatal report.
///
/// Under [`FatalPolicy::Terminate`] the first report is returned so the
/// caller can stop the daemon. Under [`FatalPolicy::CloseSession`] the
/// failing session is destroyed and the watcher keeps going; it returns
/// `None` once every sender is gone.
pub async fn watch(
    mut reports: mpsc::UnboundedReceiver<FatalReport>,
    policy: FatalPolicy,
    state: ApiState,
) -> Option<FatalReport> {
    while let Some(report) = reports.recv().await {
        match policy {
            FatalPolicy::Terminate => return Some(report),
            FatalPolicy::CloseSession => {
                tracing::warn!(
                    session = %report.session,
                    error = %report.error,
                    "closing session after fatal error"
                );
                // Gone already when an earlier report closed it.
                state.close_session(report.session).await;
            }
        }
    }
    None
}
