//! Tasks, their collaborators and the terms that requeue them

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BranchFailure;
use crate::BoxFuture;

/// Unique identifier for an admitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces the raw value of a task from its arguments.
pub type OperationFactory<A, V, E> = Arc<dyn Fn(A) -> BoxFuture<Result<V, E>> + Send + Sync>;

/// Transforms the raw value of a task into the value that is collected.
pub type Callback<V, T, E> = Arc<dyn Fn(V) -> BoxFuture<Result<T, E>> + Send + Sync>;

/// Derives the arguments of the next generation from a collected value.
pub type Requeue<A, T, E> = Arc<dyn Fn(T) -> BoxFuture<Result<RequeueTerms<A>, E>> + Send + Sync>;

/// The terms a requeue step produced.
///
/// A requeue deriver may produce nothing, a single argument set, or a list of
/// them. All three are normalized into an ordered list by
/// [`RequeueTerms::into_args`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequeueTerms<A> {
    Empty,
    Single(A),
    Many(Vec<A>),
}

impl<A> Default for RequeueTerms<A> {
    fn default() -> Self {
        RequeueTerms::Empty
    }
}

impl<A> RequeueTerms<A> {
    /// Normalize into the ordered argument sets of the next generation
    pub fn into_args(self) -> Vec<A> {
        match self {
            RequeueTerms::Empty => Vec::new(),
            RequeueTerms::Single(args) => vec![args],
            RequeueTerms::Many(args) => args,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RequeueTerms::Empty => 0,
            RequeueTerms::Single(_) => 1,
            RequeueTerms::Many(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the argument sets without consuming the terms
    pub fn iter(&self) -> std::slice::Iter<'_, A> {
        match self {
            RequeueTerms::Empty => <&[A]>::default().iter(),
            RequeueTerms::Single(args) => std::slice::from_ref(args).iter(),
            RequeueTerms::Many(args) => args.iter(),
        }
    }
}

impl<A> From<Vec<A>> for RequeueTerms<A> {
    fn from(value: Vec<A>) -> Self {
        RequeueTerms::Many(value)
    }
}

impl<A> From<Option<A>> for RequeueTerms<A> {
    fn from(value: Option<A>) -> Self {
        value.map(RequeueTerms::Single).unwrap_or_default()
    }
}

/// The collaborators shared by every task of a branch.
///
/// Children created by a requeue step reuse the expansion of their parent.
pub struct Expansion<A, V, T, E> {
    operation: OperationFactory<A, V, E>,
    callback: Callback<V, T, E>,
    requeue: Requeue<A, T, E>,
}

impl<A, V, T, E> Clone for Expansion<A, V, T, E> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            callback: self.callback.clone(),
            requeue: self.requeue.clone(),
        }
    }
}

impl<A, V, T, E> Expansion<A, V, T, E>
where
    A: Send + 'static,
    V: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Bundle an operation factory, a callback and a requeue deriver.
    pub fn new<F, FFut, C, CFut, R, RFut>(operation: F, callback: C, requeue: R) -> Self
    where
        F: Fn(A) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<V, E>> + Send + 'static,
        C: Fn(V) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<T, E>> + Send + 'static,
        R: Fn(T) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<RequeueTerms<A>, E>> + Send + 'static,
    {
        Self {
            operation: Arc::new(move |args| operation(args).boxed()),
            callback: Arc::new(move |value| callback(value).boxed()),
            requeue: Arc::new(move |value| requeue(value).boxed()),
        }
    }
}

/// A unit of pending work owned by the expansion engine.
pub struct Task<A, V, T, E> {
    pub id: TaskId,
    /// Depth in the expansion tree, 0 for seeds
    pub layer: usize,
    /// The arguments this task's operation is invoked with
    pub source_args: A,
    expansion: Expansion<A, V, T, E>,
}

impl<A: Debug, V, T, E> Debug for Task<A, V, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("layer", &self.layer)
            .field("source_args", &self.source_args)
            .finish_non_exhaustive()
    }
}

impl<A, V, T, E> Task<A, V, T, E>
where
    A: Clone + Send + 'static,
    V: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a layer 0 task
    pub fn seed(expansion: Expansion<A, V, T, E>, source_args: A) -> Self {
        Self {
            id: TaskId::new(),
            layer: 0,
            source_args,
            expansion,
        }
    }

    /// Create a task one layer below this one, sharing its collaborators
    pub fn child(&self, source_args: A) -> Self {
        Self {
            id: TaskId::new(),
            layer: self.layer + 1,
            source_args,
            expansion: self.expansion.clone(),
        }
    }

    /// Invoke the operation and pass its raw value through the callback.
    pub fn produce(&self) -> BoxFuture<Result<T, BranchFailure<E>>> {
        let operation = (self.expansion.operation)(self.source_args.clone());
        let callback = self.expansion.callback.clone();
        async move {
            let value = operation.await.map_err(BranchFailure::Operation)?;
            callback(value).await.map_err(BranchFailure::Callback)
        }
        .boxed()
    }

    /// Derive the terms of the next generation from a produced value.
    pub fn derive_terms(&self, value: T) -> BoxFuture<Result<RequeueTerms<A>, BranchFailure<E>>> {
        let requeue = (self.expansion.requeue)(value);
        async move { requeue.await.map_err(BranchFailure::Requeue) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling() -> Expansion<i32, i32, i32, String> {
        Expansion::new(
            |arg: i32| async move {
                if arg < 0 {
                    Err("Negative value not allowed".to_string())
                } else {
                    Ok(arg * 2)
                }
            },
            |value: i32| async move { Ok(value + 1) },
            |value: i32| async move { Ok(RequeueTerms::Single(value)) },
        )
    }

    #[test]
    fn test_task_id_generation() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_requeue_terms_normalization() {
        assert!(RequeueTerms::<i32>::Empty.into_args().is_empty());
        assert!(RequeueTerms::<i32>::Many(vec![]).is_empty());
        assert_eq!(RequeueTerms::Single(7).into_args(), vec![7]);
        assert_eq!(RequeueTerms::Many(vec![1, 2]).into_args(), vec![1, 2]);
        assert_eq!(RequeueTerms::from(None::<i32>), RequeueTerms::Empty);
        assert_eq!(RequeueTerms::from(vec![3]).iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(RequeueTerms::Single(4).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_child_inherits_expansion() {
        let seed = Task::seed(doubling(), 5);
        assert_eq!(seed.layer, 0);
        assert_eq!(seed.produce().await.unwrap(), 11);

        let child = seed.child(10);
        assert_eq!(child.layer, 1);
        assert_ne!(child.id, seed.id);
        assert_eq!(child.produce().await.unwrap(), 21);
        assert_eq!(
            child.derive_terms(21).await.unwrap(),
            RequeueTerms::Single(21)
        );
    }

    #[tokio::test]
    async fn test_operation_failure_is_tagged() {
        let task = Task::seed(doubling(), -1);
        let err = task.produce().await.unwrap_err();
        assert_eq!(err.stage(), "operation");
    }
}
