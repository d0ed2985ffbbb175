//! Watchdog timeout for single transport calls
//!
//! A call is raced against a timer; whichever finishes first wins and the
//! loser is dropped. Dropping a backend future kills its local helper process
//! (or closes its socket), but nothing is sent to the node: **the remote
//! command is not killed** and may keep running after the timeout fires.
//! A timeout bounds one call only; it does not cancel the rest of a pipeline.

use futures_lite::future;
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default bound for a single exec/upload/download call
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(180);

/// Run `call`, failing with [`Error::CommandTimeout`] once `limit` elapses
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let operation = operation.to_string();
    future::or(call, async move {
        async_io::Timer::after(limit).await;
        tracing::warn!(
            "{} exceeded {}s; the remote side is not interrupted",
            operation,
            limit.as_secs()
        );
        Err(Error::CommandTimeout {
            operation,
            seconds: limit.as_secs(),
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_fast_call_completes() {
        let value = bounded(Duration::from_secs(5), "fast", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[smol_potat::test]
    async fn test_slow_call_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(50), "sleep 10", async {
            async_io::Timer::after(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        match result {
            Err(Error::CommandTimeout { operation, seconds }) => {
                assert_eq!(operation, "sleep 10");
                assert_eq!(seconds, 0);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[smol_potat::test]
    async fn test_errors_pass_through() {
        let result: Result<()> = bounded(Duration::from_secs(5), "boom", async {
            Err(Error::transfer("boom"))
        })
        .await;
        assert!(matches!(result, Err(Error::Transfer { .. })));
    }
}
