//! Consistency wait after structural mutations / 结构性变更后的一致性等待
//!
//! Bucket creation and deletion are only eventually consistent on most
//! object stores. After such a mutation we poll the bucket listing at a
//! fixed interval until the expected state has held for a number of
//! consecutive observations, then return. This is a best-effort liveness
//! aid, not a guarantee: on timeout we give up silently and the caller
//! proceeds optimistically.

use std::time::{Duration, Instant};

use crate::backend::ObjectBackend;
use crate::config::ConsistencyConfig;

/// Block until `bucket` is observably present/absent or the wait budget runs out
/// 阻塞等待桶的存在状态可被观察到，或等待预算耗尽
pub async fn wait_for_bucket(
    backend: &dyn ObjectBackend,
    bucket: &str,
    expect_exists: bool,
    config: &ConsistencyConfig,
) {
    let deadline = Instant::now() + Duration::from_millis(config.max_wait_ms);
    let interval = Duration::from_millis(config.poll_interval_ms);
    let mut stable = 0u32;

    loop {
        match backend.list_buckets().await {
            Ok(names) => {
                let present = names.iter().any(|n| n == bucket);
                if present == expect_exists {
                    stable += 1;
                    if stable >= config.stable_count {
                        return;
                    }
                } else {
                    stable = 0;
                }
            }
            Err(e) => {
                tracing::debug!("list buckets during consistency wait failed: {}", e);
                stable = 0;
            }
        }

        if Instant::now() >= deadline {
            tracing::warn!(
                "consistency wait for bucket {} (exists={}) timed out, proceeding",
                bucket,
                expect_exists
            );
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn fast() -> ConsistencyConfig {
        ConsistencyConfig {
            poll_interval_ms: 1,
            stable_count: 3,
            max_wait_ms: 200,
        }
    }

    #[tokio::test]
    async fn converges_when_bucket_appears() {
        let backend = MemoryBackend::new();
        backend.create_bucket("b").await.unwrap();
        let start = Instant::now();
        wait_for_bucket(&backend, "b", true, &fast()).await;
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn converges_when_bucket_is_gone() {
        let backend = MemoryBackend::new();
        wait_for_bucket(&backend, "missing", false, &fast()).await;
    }

    #[tokio::test]
    async fn gives_up_silently_on_timeout() {
        let backend = MemoryBackend::new();
        let start = Instant::now();
        // Bucket never appears; the wait must end at the budget, not hang
        wait_for_bucket(&backend, "never", true, &fast()).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(190));
        assert!(elapsed < Duration::from_secs(2));
    }
}
