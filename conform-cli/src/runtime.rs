//! Runs blocking engine work on a tokio runtime so Ctrl-C can cancel it.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;

use conform_sync::CancelToken;

/// Run `work` on a blocking thread. The first Ctrl-C trips `cancel` and
/// waits for `work` to wind down.
pub fn run_cancellable<T, F>(cancel: CancelToken, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let mut task = tokio::task::spawn_blocking(work);
        tokio::select! {
            joined = &mut task => joined.map_err(|err| anyhow!("sync worker failed: {err}")),
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupt received, cancelling");
                eprintln!("{}", "Interrupted, stopping after the current chunk...".yellow());
                cancel.cancel();
                task.await.map_err(|err| anyhow!("sync worker failed: {err}"))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_work_result() {
        let value = run_cancellable(CancelToken::new(), || 21 * 2).unwrap();
        assert_eq!(value, 42);
    }
}
