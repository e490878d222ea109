//! Concurrent first-success resolution
//!
//! Every attempt starts at once; the first `Ok` wins. The remaining
//! attempts are dropped together with the `FuturesUnordered` that drives
//! them, which cancels their I/O and releases their connections. Only when
//! every attempt fails does the caller see an error, and that error lists
//! every failure in completion order.
//!
//! No aggregate timeout is applied here: each attempt bounds itself.

use crate::{AccessError, ParsedContent, ResolutionSource, Result, SourceFailure, TypedContent};
use bytes::Bytes;
use cidway_store::{ContentId, StoreError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A failed attempt in a race
#[derive(Debug)]
pub struct AttemptFailure<E> {
    pub source_name: String,
    pub error: E,
}

impl From<AttemptFailure<StoreError>> for SourceFailure {
    fn from(failure: AttemptFailure<StoreError>) -> Self {
        SourceFailure::new(failure.source_name, failure.error)
    }
}

/// Race labelled attempts and return the first success.
///
/// Fails with every attempt's error when none succeeds, including the
/// degenerate case of no attempts at all.
pub async fn first_success<T, E, F, I>(attempts: I) -> std::result::Result<T, Vec<AttemptFailure<E>>>
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut pending: FuturesUnordered<_> = attempts
        .into_iter()
        .map(|(source_name, attempt)| async move { (source_name, attempt.await) })
        .collect();

    let mut failures = Vec::new();

    while let Some((source_name, result)) = pending.next().await {
        match result {
            Ok(value) => {
                debug!(
                    source = %source_name,
                    abandoned = pending.len(),
                    "Resolved by first successful source"
                );
                return Ok(value);
            }
            Err(error) => {
                debug!(source = %source_name, error = %error, "Source attempt failed");
                failures.push(AttemptFailure { source_name, error });
            }
        }
    }

    Err(failures)
}

/// Races a set of resolution sources against each other
#[derive(Clone, Default)]
pub struct FanOutResolver {
    sources: Vec<Arc<dyn ResolutionSource>>,
}

impl FanOutResolver {
    pub fn new(sources: Vec<Arc<dyn ResolutionSource>>) -> Self {
        Self { sources }
    }

    /// Add a source
    pub fn with_source(mut self, source: Arc<dyn ResolutionSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// First raw fetch to succeed
    pub async fn fetch(&self, cid: &ContentId) -> Result<Bytes> {
        let attempts = self
            .sources
            .iter()
            .map(|source| (source.name(), source.fetch(cid)));
        first_success(attempts)
            .await
            .map_err(|failures| unavailable(cid, failures))
    }

    /// First typed fetch to succeed
    pub async fn fetch_typed(&self, cid: &ContentId) -> Result<TypedContent> {
        let attempts = self
            .sources
            .iter()
            .map(|source| (source.name(), source.fetch_typed(cid)));
        first_success(attempts)
            .await
            .map_err(|failures| unavailable(cid, failures))
    }

    /// First parsed fetch to succeed
    pub async fn fetch_parsed(&self, cid: &ContentId) -> Result<ParsedContent> {
        let attempts = self
            .sources
            .iter()
            .map(|source| (source.name(), source.fetch_parsed(cid)));
        first_success(attempts)
            .await
            .map_err(|failures| unavailable(cid, failures))
    }
}

/// Collapse source-level errors into one `ContentUnavailable`, flattening
/// the failures of sources that fan out themselves.
fn unavailable(cid: &ContentId, failures: Vec<AttemptFailure<AccessError>>) -> AccessError {
    let failures = failures
        .into_iter()
        .flat_map(|failure| failure.error.into_source_failures(&failure.source_name))
        .collect();
    AccessError::ContentUnavailable {
        cid: cid.clone(),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, SourceKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Test source with scripted behaviour
    struct ScriptedSource {
        name: &'static str,
        delay: Duration,
        reply: Option<&'static str>,
    }

    impl ScriptedSource {
        fn succeeding(name: &'static str, reply: &'static str) -> Arc<dyn ResolutionSource> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                reply: Some(reply),
            })
        }

        fn failing(name: &'static str) -> Arc<dyn ResolutionSource> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                reply: None,
            })
        }

        fn slow(name: &'static str, delay: Duration, reply: &'static str) -> Arc<dyn ResolutionSource> {
            Arc::new(Self {
                name,
                delay,
                reply: Some(reply),
            })
        }
    }

    #[async_trait]
    impl ResolutionSource for ScriptedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Remote
        }

        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn fetch(&self, cid: &ContentId) -> Result<Bytes> {
            tokio::time::sleep(self.delay).await;
            match self.reply {
                Some(reply) => Ok(Bytes::from_static(reply.as_bytes())),
                None => Err(AccessError::ContentUnavailable {
                    cid: cid.clone(),
                    failures: vec![SourceFailure::new(
                        self.name,
                        StoreError::Connection("refused".to_string()),
                    )],
                }),
            }
        }
    }

    fn cid() -> ContentId {
        ContentId::new("bafytest")
    }

    #[tokio::test]
    async fn test_fail_and_succeed_returns_success() {
        for order in [["fail", "ok"], ["ok", "fail"]] {
            let sources = order
                .iter()
                .map(|name| match *name {
                    "ok" => ScriptedSource::succeeding("ok", "A"),
                    _ => ScriptedSource::failing("fail"),
                })
                .collect();
            let resolver = FanOutResolver::new(sources);

            let bytes = resolver.fetch(&cid()).await.unwrap();
            assert_eq!(bytes, Bytes::from_static(b"A"));
        }
    }

    #[tokio::test]
    async fn test_all_failing_is_content_unavailable() {
        let resolver = FanOutResolver::new(vec![
            ScriptedSource::failing("first"),
            ScriptedSource::failing("second"),
        ]);

        let err = resolver.fetch(&cid()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentUnavailable);

        let mut names: Vec<_> = err.failures().iter().map(|f| f.source_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_no_sources_is_content_unavailable() {
        let err = FanOutResolver::default().fetch(&cid()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentUnavailable);
        assert!(err.failures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_does_not_block() {
        let resolver = FanOutResolver::new(vec![
            ScriptedSource::slow("slow", Duration::from_secs(3600), "late"),
            ScriptedSource::slow("fast", Duration::from_millis(5), "early"),
        ]);

        let bytes = resolver.fetch(&cid()).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"early"));
    }

    #[tokio::test]
    async fn test_abandoned_attempts_are_dropped() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());

        let never = async move {
            let _flag = flag;
            futures::future::pending::<std::result::Result<u8, String>>().await
        };
        let attempts: Vec<(String, std::pin::Pin<Box<dyn Future<Output = _> + Send>>)> = vec![
            ("never".to_string(), Box::pin(never)),
            ("now".to_string(), Box::pin(async { Ok::<u8, String>(7) })),
        ];

        assert_eq!(first_success(attempts).await.unwrap(), 7);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fetch_typed_and_parsed() {
        let resolver = FanOutResolver::default()
            .with_source(ScriptedSource::failing("down"))
            .with_source(ScriptedSource::succeeding("up", r#"{"a":1}"#));

        let typed = resolver.fetch_typed(&cid()).await.unwrap();
        assert!(typed.detected.is_none());

        let parsed = resolver.fetch_parsed(&cid()).await.unwrap();
        assert_eq!(parsed.as_json().unwrap()["a"], 1);
        assert_eq!(resolver.len(), 2);
    }
}
