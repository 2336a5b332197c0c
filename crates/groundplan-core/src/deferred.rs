//! Deferred values
//!
//! A [`Deferred<T>`] is a labelled handle to a value that is not known at
//! graph-construction time: the identifier of a security group that has not
//! been materialized yet, the result of an image lookup, the CIDR blocks of
//! subnets still being described. Units hand these handles to each other
//! before the underlying computation runs; consumers only read.
//!
//! Resolution is lazy and memoized: the wrapped computation is driven on the
//! first `resolve().await` and its output (value or error) is shared with
//! every clone, so repeated reads never re-invoke the lookup and always
//! observe the same result.

use crate::error::{PlanError, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared, try_join_all};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A memoized, shareable future of a `Result<T>`.
///
/// The label identifies the handle in error messages and deduplication keys;
/// clones share both the label and the underlying computation.
#[derive(Clone)]
pub struct Deferred<T: Clone> {
    label: Arc<str>,
    future: Shared<BoxFuture<'static, Result<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// An already-resolved value.
    pub fn ready(label: impl Into<String>, value: T) -> Self {
        Self::lazy(label, futures_util::future::ready(Ok(value)))
    }

    /// A value produced by a pending computation.
    ///
    /// The future is not polled until the first `resolve().await`.
    pub fn lazy<F>(label: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            future: future.boxed().shared(),
        }
    }

    /// An always-failing handle, for dependencies known to be broken.
    pub fn failed(label: impl Into<String>, error: PlanError) -> Self {
        Self::lazy(label, futures_util::future::ready(Err(error)))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Await the wrapped computation.
    ///
    /// Single-assignment: once resolved, every subsequent read (from any
    /// clone) returns the same value without re-running the computation.
    pub async fn resolve(&self) -> Result<T> {
        self.future.clone().await
    }

    /// Derive a new deferred value from this one.
    ///
    /// Failure of the source propagates to the derived value unchanged.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let source = self.clone();
        Deferred::lazy(self.label.to_string(), async move {
            source.resolve().await.map(f)
        })
    }

    /// Combine several deferred values into one.
    ///
    /// Fails if any input fails; no partial results are produced.
    pub fn join_all(values: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
        let label = format!(
            "join({})",
            values
                .iter()
                .map(|d| d.label().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Deferred::lazy(label, async move {
            try_join_all(values.into_iter().map(|d| async move { d.resolve().await })).await
        })
    }
}

impl<T: Clone> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Deferred").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ready_resolves_immediately() {
        let d = Deferred::ready("answer", 42);
        assert_eq!(d.resolve().await.unwrap(), 42);
        assert_eq!(d.label(), "answer");
    }

    #[tokio::test]
    async fn lazy_is_memoized_across_clones() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let d = Deferred::lazy("lookup", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("value".to_string())
        });

        let clone = d.clone();
        assert_eq!(d.resolve().await.unwrap(), "value");
        assert_eq!(d.resolve().await.unwrap(), "value");
        assert_eq!(clone.resolve().await.unwrap(), "value");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn map_derives_and_propagates_failure() {
        let d = Deferred::ready("port", 8200u32);
        let mapped = d.map(|p| format!("tcp/{p}"));
        assert_eq!(mapped.resolve().await.unwrap(), "tcp/8200");

        let failing: Deferred<u32> =
            Deferred::failed("ami:none", PlanError::unresolved("ami:none", "no match"));
        let derived = failing.map(|p| p + 1);
        assert_eq!(
            derived.resolve().await.unwrap_err(),
            PlanError::unresolved("ami:none", "no match")
        );
    }

    #[tokio::test]
    async fn join_all_combines_or_fails_wholly() {
        let joined = Deferred::join_all(vec![
            Deferred::ready("a", 1),
            Deferred::ready("b", 2),
            Deferred::ready("c", 3),
        ]);
        assert_eq!(joined.resolve().await.unwrap(), vec![1, 2, 3]);

        let broken = Deferred::join_all(vec![
            Deferred::ready("a", 1),
            Deferred::failed("b", PlanError::unresolved("b", "lookup failed")),
        ]);
        assert!(matches!(
            broken.resolve().await.unwrap_err(),
            PlanError::UnresolvedDependency { .. }
        ));
    }

    #[tokio::test]
    async fn errors_are_memoized_too() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let d: Deferred<u32> = Deferred::lazy("flaky", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(PlanError::unresolved("flaky", "boom"))
        });

        assert!(d.resolve().await.is_err());
        assert!(d.resolve().await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
