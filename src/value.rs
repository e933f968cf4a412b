//! Asynchronous value handles
//!
//! An [`AsyncValue<T>`] is a handle to a value that is only known after some
//! external operation completes, typically the materialization of another
//! resource in the provisioning graph. Handles can be derived with `map` and
//! `combine` before anything has resolved, so a resource declared early in
//! graph construction can consume outputs of resources declared around it.
//!
//! Two invariants hold for every handle:
//!
//! 1. A derived value never resolves before all of its sources resolve.
//! 2. Resolution happens exactly once; the value is immutable afterwards.
//!
//! Resolution itself is driven by the graph executor fulfilling
//! [`OutputSlot`]s. The handle side performs no side effects; awaiting
//! `resolve` only suspends, it never blocks a thread.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::NodeId;

/// A deferred handle to a value of type `T`
///
/// Cloning is cheap: all clones share one underlying resolution. The handle
/// carries the set of graph nodes it transitively depends on, which is how
/// the graph turns data references into explicit edges.
pub struct AsyncValue<T: Clone> {
    fut: Shared<BoxFuture<'static, ProvisionResult<T>>>,
    deps: Arc<BTreeSet<NodeId>>,
}

impl<T: Clone> Clone for AsyncValue<T> {
    fn clone(&self) -> Self {
        Self {
            fut: self.fut.clone(),
            deps: Arc::clone(&self.deps),
        }
    }
}

impl<T: Clone> fmt::Debug for AsyncValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncValue<{}>", std::any::type_name::<T>())
    }
}

impl<T: Clone + Send + Sync + 'static> AsyncValue<T> {
    /// An already-resolved value with no dependencies.
    pub fn literal(value: T) -> Self {
        Self {
            fut: futures::future::ready(Ok(value)).boxed().shared(),
            deps: Arc::new(BTreeSet::new()),
        }
    }

    /// Create a pending value together with its producer half.
    ///
    /// The value resolves when the slot is fulfilled. Dropping the slot
    /// without fulfilling it surfaces [`ProvisionError::OutputDropped`] to
    /// every consumer.
    pub fn slot(name: impl Into<String>) -> (OutputSlot<T>, Self) {
        let name = name.into();
        let (tx, rx) = oneshot::channel::<ProvisionResult<T>>();
        let fut = async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(ProvisionError::OutputDropped(name)),
            }
        }
        .boxed()
        .shared();

        (
            OutputSlot { tx },
            Self {
                fut,
                deps: Arc::new(BTreeSet::new()),
            },
        )
    }

    /// Derive a new value by applying `f` once this value resolves.
    ///
    /// Lazy: `f` runs at most once, when the source resolves successfully.
    /// The derived handle keeps the source's dependency set. A failed source
    /// fails every derivation with the same error.
    pub fn map<U, F>(&self, f: F) -> AsyncValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let fut = self.fut.clone();
        AsyncValue {
            fut: async move { fut.await.map(f) }.boxed().shared(),
            deps: Arc::clone(&self.deps),
        }
    }

    /// Derive a value from this handle and another, combining with `f`.
    ///
    /// Resolves only after both sources resolve; the dependency set is the
    /// union of both sources' sets. The first source failure wins.
    pub fn combine<U, V, F>(&self, other: &AsyncValue<U>, f: F) -> AsyncValue<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let a = self.fut.clone();
        let b = other.fut.clone();
        let deps: BTreeSet<NodeId> = self.deps.union(&other.deps).copied().collect();
        AsyncValue {
            fut: async move {
                let (x, y) = futures::future::try_join(a, b).await?;
                Ok(f(x, y))
            }
            .boxed()
            .shared(),
            deps: Arc::new(deps),
        }
    }

    /// Pair this value with another.
    pub fn zip<U>(&self, other: &AsyncValue<U>) -> AsyncValue<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.combine(other, |a, b| (a, b))
    }

    /// Await the underlying value.
    ///
    /// Returns the error of the first failed transitive source, if any.
    pub async fn resolve(&self) -> ProvisionResult<T> {
        self.fut.clone().await
    }

    /// Attach a graph node as an explicit dependency of this handle.
    pub(crate) fn with_dependency(self, node: NodeId) -> Self {
        let mut deps = self.deps.as_ref().clone();
        deps.insert(node);
        Self {
            fut: self.fut,
            deps: Arc::new(deps),
        }
    }
}

/// Producer half of a pending [`AsyncValue`]
///
/// Held by the graph node that materializes the resource. Consumed on use:
/// a slot is fulfilled or failed exactly once.
#[derive(Debug)]
pub struct OutputSlot<T> {
    tx: oneshot::Sender<ProvisionResult<T>>,
}

impl<T> OutputSlot<T> {
    /// Resolve the value for all consumers.
    pub fn fulfill(self, value: T) {
        // Consumers may all have been dropped; that is not an error.
        let _ = self.tx.send(Ok(value));
    }

    /// Fail the value for all consumers.
    pub fn fail(self, error: ProvisionError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Accumulated dependency edges for one graph node
///
/// Built from the `AsyncValue`s a node consumes, so declaring a node makes
/// every data reference an explicit edge.
#[derive(Debug, Default, Clone)]
pub struct DependencySet(pub(crate) BTreeSet<NodeId>);

impl DependencySet {
    /// No dependencies.
    pub fn none() -> Self {
        Self::default()
    }

    /// Dependencies of a single consumed value.
    pub fn on<T: Clone>(value: &AsyncValue<T>) -> Self {
        Self(value.deps.as_ref().clone())
    }

    /// Also depend on everything `value` depends on.
    pub fn and<T: Clone>(mut self, value: &AsyncValue<T>) -> Self {
        self.0.extend(value.deps.iter().copied());
        self
    }

    /// Also depend directly on a node.
    pub fn and_node(mut self, node: NodeId) -> Self {
        self.0.insert(node);
        self
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.contains(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_resolves_immediately() {
        let value = AsyncValue::literal(42);
        assert_eq!(value.resolve().await.unwrap(), 42);
        // Resolution is stable across repeated awaits.
        assert_eq!(value.resolve().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn map_is_lazy_and_composes() {
        let value = AsyncValue::literal(5);
        let composed = value.map(|x| x + 1).map(|x| x * 2);
        let direct = value.map(|x| (x + 1) * 2);
        assert_eq!(
            composed.resolve().await.unwrap(),
            direct.resolve().await.unwrap()
        );
    }

    #[tokio::test]
    async fn derived_value_waits_for_source() {
        let (slot, value) = AsyncValue::<String>::slot("bucket.endpoint");
        let derived = value.map(|e| format!("https://{e}/"));

        // Not resolved before the slot is fulfilled.
        assert!(derived.resolve().now_or_never().is_none());

        slot.fulfill("example.com".to_string());
        assert_eq!(derived.resolve().await.unwrap(), "https://example.com/");
    }

    #[tokio::test]
    async fn combine_unions_sources() {
        let (slot_a, a) = AsyncValue::<u32>::slot("a");
        let (slot_b, b) = AsyncValue::<u32>::slot("b");
        let sum = a.combine(&b, |x, y| x + y);

        slot_a.fulfill(3);
        assert!(sum.resolve().now_or_never().is_none());
        slot_b.fulfill(4);
        assert_eq!(sum.resolve().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn failure_reaches_every_derivation() {
        let (slot, value) = AsyncValue::<u32>::slot("cdn.domain");
        let derived = value.map(|x| x * 2);
        slot.fail(ProvisionError::Provider {
            resource: "cdn".to_string(),
            message: "throttled".to_string(),
        });

        let err = derived.resolve().await.unwrap_err();
        assert_eq!(
            err,
            ProvisionError::Provider {
                resource: "cdn".to_string(),
                message: "throttled".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn dropped_slot_surfaces_as_missing_output() {
        let (slot, value) = AsyncValue::<u32>::slot("record.fqdn");
        drop(slot);
        assert_eq!(
            value.resolve().await.unwrap_err(),
            ProvisionError::OutputDropped("record.fqdn".to_string())
        );
    }

    #[test]
    fn dependency_sets_union() {
        let a = AsyncValue::literal(1).with_dependency(NodeId(0));
        let b = AsyncValue::literal(2).with_dependency(NodeId(1));
        let both = a.zip(&b);

        let deps = DependencySet::on(&both);
        assert!(deps.contains(NodeId(0)));
        assert!(deps.contains(NodeId(1)));

        let extended = DependencySet::on(&a).and(&b).and_node(NodeId(7));
        assert!(extended.contains(NodeId(7)));
    }
}
