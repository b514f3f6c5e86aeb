//! CLI command implementations.

pub mod backup;
pub mod info;
pub mod restore;

use chatvault_core::{CancelToken, CoreResult, OperationKind, OperationSupervisor};
use tracing::warn;

/// Runs `job` under the operation supervisor on a fresh runtime. Ctrl-C
/// cancels the job between rows.
pub(crate) fn supervised<T, F>(kind: OperationKind, job: F) -> Result<T, Box<dyn std::error::Error>>
where
    F: FnOnce(CancelToken) -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async move {
        let supervisor = OperationSupervisor::spawn();
        let interrupt = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(operation = %kind, "interrupted, canceling");
                    let _ = supervisor.cancel(kind).await;
                }
            })
        };
        let result = supervisor.run(kind, job).await;
        interrupt.abort();
        result
    });
    Ok(result?)
}
