// Request context - the client API key driving the current request
// Stored in a tokio task-local so concurrent requests never see each other's key

use std::future::Future;

tokio::task_local! {
    static CURRENT_API_KEY: Option<String>;
}

/// Run `future` with `api_key` bound as the current client key.
pub async fn scope<F>(api_key: Option<String>, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_API_KEY.scope(api_key, future).await
}

/// Synchronous variant of [`scope`] for non-async call paths.
pub fn sync_scope<F, R>(api_key: Option<String>, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_API_KEY.sync_scope(api_key, f)
}

/// The client key bound for the current request, if any.
///
/// Returns `None` outside of a [`scope`] as well as inside a scope bound to `None`.
pub fn current_api_key() -> Option<String> {
    CURRENT_API_KEY.try_with(|key| key.clone()).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unset_outside_scope() {
        assert_eq!(current_api_key(), None);
    }

    #[test]
    fn test_sync_scope() {
        let seen = sync_scope(Some("key-a".to_string()), current_api_key);
        assert_eq!(seen.as_deref(), Some("key-a"));
        assert_eq!(current_api_key(), None);

        let nested = sync_scope(Some("outer".to_string()), || {
            sync_scope(None, current_api_key)
        });
        assert_eq!(nested, None);
    }

    #[tokio::test]
    async fn test_scope_survives_await_points() {
        let seen = scope(Some("key-b".to_string()), async {
            tokio::task::yield_now().await;
            current_api_key()
        })
        .await;
        assert_eq!(seen.as_deref(), Some("key-b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_isolated() {
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let key = format!("client-key-{}", i);
                tokio::spawn(scope(Some(key.clone()), async move {
                    for _ in 0..5 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        assert_eq!(current_api_key().as_deref(), Some(key.as_str()));
                    }
                    current_api_key()
                }))
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let seen = handle.await.unwrap();
            assert_eq!(seen, Some(format!("client-key-{}", i)));
        }
    }
}
