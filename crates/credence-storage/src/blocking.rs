//! Runs blocking storage work off the async runtime.

use credence_core::traits::BackendError;

/// Run `f` on the blocking pool, mapping a panicked or cancelled task to
/// [`BackendError::Io`].
pub async fn run<T>(
    label: &'static str,
    f: impl FnOnce() -> Result<T, BackendError> + Send + 'static,
) -> Result<T, BackendError>
where
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            tracing::error!(label, "Blocking storage task panicked");
            Err(BackendError::Io(format!("{label}: task panicked")))
        }
        Err(_) => {
            tracing::warn!(label, "Blocking storage task cancelled");
            Err(BackendError::Io(format!("{label}: task cancelled")))
        }
    }
}
