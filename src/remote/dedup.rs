use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::broadcast;

use super::RemoteError;

/// Entries older than this are treated as leaked (leader cancelled mid
/// flight) and replaced; waiters stop waiting at the same bound.
const PENDING_TIMEOUT: Duration = Duration::from_secs(5);

type Shared = broadcast::Sender<Result<Value, RemoteError>>;

/// Coalesces concurrent identical GET requests: the first caller for a
/// signature performs the fetch, everyone else waits on the shared result.
pub struct Deduplicator {
    pending: Mutex<HashMap<String, (Shared, Instant)>>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `fetch` unless an identical request is already in flight, in
    /// which case the in-flight result is shared. A waiter that outlives the
    /// safety-net timeout falls back to its own fetch.
    pub async fn run<F>(&self, key: &str, fetch: F) -> Result<Value, RemoteError>
    where
        F: Future<Output = Result<Value, RemoteError>>,
    {
        let subscription = {
            let mut pending = self.pending.lock().expect("dedup map lock");
            match pending.get(key) {
                Some((tx, started)) if started.elapsed() < PENDING_TIMEOUT => {
                    Some(tx.subscribe())
                }
                _ => {
                    let (tx, _) = broadcast::channel(1);
                    pending.insert(key.to_string(), (tx, Instant::now()));
                    None
                }
            }
        };

        if let Some(mut rx) = subscription {
            match tokio::time::timeout(PENDING_TIMEOUT, rx.recv()).await {
                Ok(Ok(result)) => return result,
                // Leader vanished without sending; fetch independently.
                _ => return fetch.await,
            }
        }

        let result = fetch.await;
        let sender = self
            .pending
            .lock()
            .expect("dedup map lock")
            .remove(key)
            .map(|(tx, _)| tx);
        if let Some(tx) = sender {
            // No receivers is fine: nobody piggybacked on this request.
            let _ = tx.send(result.clone());
        }
        result
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().expect("dedup map lock").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_fetch() {
        let dedup = Arc::new(Deduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedup = dedup.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                dedup
                    .run("GET:/records", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(json!({"total": 1}))
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.expect("join").expect("fetch ok");
            assert_eq!(result["total"], 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test]
    async fn failures_are_shared_and_not_sticky() {
        let dedup = Arc::new(Deduplicator::new());

        let err = dedup
            .run("GET:/boom", async {
                Err(RemoteError::network("http://x/boom", "connection refused"))
            })
            .await
            .expect_err("should fail");
        assert!(err.is_transient());

        // Entry was removed on resolution; the next call fetches fresh.
        let ok = dedup.run("GET:/boom", async { Ok(json!({"ok": true})) }).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn different_signatures_do_not_coalesce() {
        let dedup = Arc::new(Deduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        let c2 = calls.clone();
        let (a, b) = tokio::join!(
            dedup.run("GET:/a", async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(json!("a"))
            }),
            dedup.run("GET:/b", async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(json!("b"))
            }),
        );
        assert_eq!(a.expect("a"), json!("a"));
        assert_eq!(b.expect("b"), json!("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
