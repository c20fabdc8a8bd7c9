//! The queue that admits seed tasks and the engine that expands them

use std::fmt::Display;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, BranchFailure, HookFailure, QueueError, QueueResult};
use crate::reporter::{ExpansionEvent, ExpansionReporter};
use crate::result::{ExpansionResult, ResultAggregator};
use crate::task::{Expansion, RequeueTerms, Task, TaskId};
use crate::types::{QueueConfig, RunStats};
use crate::BoxFuture;

/// Admits seed tasks and expands them once [`AsyncQueue::begin`] is awaited.
///
/// `A` are the arguments of an operation, `V` its raw value, `T` the value
/// produced by the callback and collected into the result, `E` the error any
/// collaborator may fail with.
pub struct AsyncQueue<A, V, T, E = BoxError> {
    config: QueueConfig<A, T>,
    pending: Vec<Task<A, V, T, E>>,
    admitted: usize,
    reporter: Option<Box<dyn ExpansionReporter>>,
}

impl<A, V, T, E> AsyncQueue<A, V, T, E>
where
    A: Clone + Send + 'static,
    V: Send + 'static,
    T: Clone + Send + 'static,
    E: Display + Send + 'static,
{
    /// Create an empty queue governed by `config`
    pub fn new(config: QueueConfig<A, T>) -> Self {
        Self {
            config,
            pending: Vec::new(),
            admitted: 0,
            reporter: None,
        }
    }

    /// Attach a reporter that observes the run
    pub fn with_reporter<R: ExpansionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn config(&self) -> &QueueConfig<A, T> {
        &self.config
    }

    /// Number of tasks admitted so far
    pub fn admitted(&self) -> usize {
        self.admitted
    }

    /// Admit a seed task invoking `operation(args)`.
    ///
    /// Fails with [`QueueError::LimitExceeded`] once the result limit has
    /// been reached.
    pub fn enqueue<F, FFut, C, CFut, R, RFut>(
        &mut self,
        operation: F,
        args: A,
        callback: C,
        requeue: R,
    ) -> QueueResult<TaskId>
    where
        F: Fn(A) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<V, E>> + Send + 'static,
        C: Fn(V) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<T, E>> + Send + 'static,
        R: Fn(T) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<RequeueTerms<A>, E>> + Send + 'static,
    {
        let expansion = Expansion::new(operation, callback, requeue);
        self.enqueue_expansion(&expansion, args)
    }

    /// Admit one seed task per argument set, all sharing the same
    /// collaborators.
    ///
    /// Stops at the first argument set that cannot be admitted; the seeds
    /// admitted before it stay queued.
    pub fn enqueue_all<F, FFut, C, CFut, R, RFut>(
        &mut self,
        operation: F,
        args: impl IntoIterator<Item = A>,
        callback: C,
        requeue: R,
    ) -> QueueResult<Vec<TaskId>>
    where
        F: Fn(A) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<V, E>> + Send + 'static,
        C: Fn(V) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<T, E>> + Send + 'static,
        R: Fn(T) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<RequeueTerms<A>, E>> + Send + 'static,
    {
        let expansion = Expansion::new(operation, callback, requeue);
        args.into_iter()
            .map(|args| self.enqueue_expansion(&expansion, args))
            .collect()
    }

    /// Admit a seed task from an already bundled [`Expansion`]
    pub fn enqueue_expansion(
        &mut self,
        expansion: &Expansion<A, V, T, E>,
        args: A,
    ) -> QueueResult<TaskId> {
        let max_results = self.config.max_results();
        if max_results.is_reached_by(self.admitted) {
            return Err(QueueError::LimitExceeded {
                max_results: max_results.max().unwrap_or_default(),
            });
        }

        let task = Task::seed(expansion.clone(), args);
        let task_id = task.id;
        self.admitted += 1;
        debug!(%task_id, admitted = self.admitted, "seed task admitted");
        if let Some(reporter) = self.reporter.as_deref_mut() {
            reporter.report_event(ExpansionEvent::TaskAdmitted { task_id, layer: 0 });
        }
        self.pending.push(task);
        Ok(task_id)
    }

    /// Run the expansion and return everything it produced.
    pub async fn begin(self) -> ExpansionResult<A, T> {
        self.begin_with_stats().await.0
    }

    /// Run the expansion and return everything it produced together with
    /// statistics about the run.
    pub async fn begin_with_stats(self) -> (ExpansionResult<A, T>, RunStats) {
        let AsyncQueue {
            config,
            pending,
            admitted,
            reporter,
        } = self;

        let processor = ExpansionProcessor {
            config,
            admitted,
            pending_futures: FuturesUnordered::new(),
            aggregator: ResultAggregator::new(),
            stats: RunStats {
                admitted,
                ..RunStats::default()
            },
            reporter,
        };

        if processor.config.max_results().is_zero() || processor.config.max_depth().is_zero() {
            warn!(
                "Either a max results or max depth value of 0 was provided, \
                 meaning no results will be returned"
            );
            return processor.finish(Instant::now());
        }

        processor.run(pending).await
    }
}

/// The outcome of one suspended step of a task.
enum StepResult<A, V, T, E> {
    /// The operation and the callback resolved
    Produced(Task<A, V, T, E>, Result<T, BranchFailure<E>>),

    /// The requeue deriver resolved for the value the task produced
    Derived(Task<A, V, T, E>, T, Result<RequeueTerms<A>, BranchFailure<E>>),
}

/// Owns all state of a single run.
///
/// Every step of every live task is a future in `pending_futures`. Their
/// results are handled one at a time, so the run state is only ever touched
/// from the task awaiting [`ExpansionProcessor::run`]. The run is finished
/// once no step is left in flight.
struct ExpansionProcessor<A, V, T, E> {
    config: QueueConfig<A, T>,
    admitted: usize,
    pending_futures: FuturesUnordered<BoxFuture<StepResult<A, V, T, E>>>,
    aggregator: ResultAggregator<A, T>,
    stats: RunStats,
    reporter: Option<Box<dyn ExpansionReporter>>,
}

impl<A, V, T, E> ExpansionProcessor<A, V, T, E>
where
    A: Clone + Send + 'static,
    V: Send + 'static,
    T: Clone + Send + 'static,
    E: Display + Send + 'static,
{
    async fn run(mut self, seeds: Vec<Task<A, V, T, E>>) -> (ExpansionResult<A, T>, RunStats) {
        let start = Instant::now();
        info!(seeds = seeds.len(), max_depth = %self.config.max_depth(), max_results = %self.config.max_results(), "starting expansion");

        for task in seeds {
            self.start_task(task);
        }

        while let Some(step) = self.pending_futures.next().await {
            let flow = match step {
                StepResult::Produced(task, Ok(value)) => self.on_value_produced(task, value),
                StepResult::Produced(task, Err(err)) => self.on_branch_failed(task, err),
                StepResult::Derived(task, value, Ok(terms)) => {
                    self.on_terms_derived(task, value, terms)
                }
                StepResult::Derived(task, _, Err(err)) => self.on_branch_failed(task, err),
            };

            if flow.is_break() {
                self.detach_in_flight();
                break;
            }
        }

        self.finish(start)
    }

    /// Launch the operation of an admitted task.
    fn start_task(&mut self, task: Task<A, V, T, E>) {
        let produced = task.produce();
        self.push(async move { StepResult::Produced(task, produced.await) }.boxed());
    }

    fn push(&mut self, step: BoxFuture<StepResult<A, V, T, E>>) {
        self.pending_futures.push(step);
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.pending_futures.len());
    }

    /// Called when the callback of a task resolved.
    fn on_value_produced(&mut self, task: Task<A, V, T, E>, value: T) -> ControlFlow<()> {
        match self.config.collect_transformed(&value, &task.source_args) {
            Some(Ok(data)) => self.aggregator.merge_transformed_data(data),
            Some(Err(failure)) => self.on_hook_failed(&task, failure),
            None => {}
        }

        self.aggregator
            .record(task.layer, value.clone(), task.source_args.clone());
        self.stats.produced += 1;
        self.report(ExpansionEvent::ValueProduced {
            task_id: task.id,
            layer: task.layer,
        });

        if self.config.max_depth().is_reached_by(task.layer) {
            debug!(task_id = %task.id, layer = task.layer, "maximum depth reached, not requeueing");
            return ControlFlow::Continue(());
        }

        let derived = task.derive_terms(value.clone());
        self.push(async move { StepResult::Derived(task, value, derived.await) }.boxed());
        ControlFlow::Continue(())
    }

    /// Called when the requeue deriver of a task resolved.
    fn on_terms_derived(
        &mut self,
        task: Task<A, V, T, E>,
        value: T,
        terms: RequeueTerms<A>,
    ) -> ControlFlow<()> {
        match self.config.collect_requeue(&terms, &value, &task.source_args) {
            Some(Ok(data)) => self.aggregator.merge_requeue_data(data),
            Some(Err(failure)) => self.on_hook_failed(&task, failure),
            None => {}
        }

        if self.config.should_short_circuit(&value, &terms) {
            info!(task_id = %task.id, layer = task.layer, "short-circuit condition met");
            self.stats.short_circuited = true;
            self.report(ExpansionEvent::ShortCircuited {
                task_id: task.id,
                layer: task.layer,
            });
            return ControlFlow::Break(());
        }

        let args = terms.into_args();
        let derived = args.len();
        let mut created = 0;
        for args in args {
            if self.config.max_results().is_reached_by(self.admitted) {
                break;
            }
            let child = task.child(args);
            self.admit(&child);
            self.start_task(child);
            created += 1;
        }

        let dropped = derived - created;
        if dropped > 0 {
            debug!(task_id = %task.id, layer = task.layer, dropped, "maximum results reached, dropping requeue terms");
            self.stats.dropped_terms += dropped;
            self.report(ExpansionEvent::TermsDropped {
                task_id: task.id,
                layer: task.layer,
                dropped,
            });
        }

        ControlFlow::Continue(())
    }

    /// Called when a step of a task failed. The branch ends here, the rest of
    /// the run is unaffected.
    fn on_branch_failed(&mut self, task: Task<A, V, T, E>, err: BranchFailure<E>) -> ControlFlow<()> {
        error!(
            task_id = %task.id,
            layer = task.layer,
            stage = err.stage(),
            error = %err,
            "branch abandoned"
        );
        self.stats.failed_branches += 1;
        self.report(ExpansionEvent::BranchFailed {
            task_id: task.id,
            layer: task.layer,
            stage: err.stage(),
            error: err.to_string(),
        });
        ControlFlow::Continue(())
    }

    fn on_hook_failed(&mut self, task: &Task<A, V, T, E>, failure: HookFailure) {
        warn!(task_id = %task.id, hook = %failure.hook, error = %failure.source, "failed updating the collected data map");
        self.stats.hook_failures += 1;
        self.report(ExpansionEvent::HookFailed {
            task_id: task.id,
            hook: failure.hook,
            error: failure.source.to_string(),
        });
    }

    fn admit(&mut self, task: &Task<A, V, T, E>) {
        self.admitted += 1;
        self.stats.admitted = self.admitted;
        debug!(task_id = %task.id, layer = task.layer, admitted = self.admitted, "task admitted");
        self.report(ExpansionEvent::TaskAdmitted {
            task_id: task.id,
            layer: task.layer,
        });
    }

    /// Hand the steps that are still in flight to a background task so they
    /// run to completion. Their results are discarded.
    fn detach_in_flight(&mut self) {
        let mut in_flight = std::mem::take(&mut self.pending_futures);
        if in_flight.is_empty() {
            return;
        }

        let remaining = in_flight.len();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(remaining, "detaching in-flight steps");
                handle.spawn(async move {
                    while let Some(step) = in_flight.next().await {
                        let task_id = match &step {
                            StepResult::Produced(task, _) | StepResult::Derived(task, _, _) => {
                                task.id
                            }
                        };
                        debug!(%task_id, "discarding step that finished after the run resolved");
                    }
                });
            }
            Err(_) => {
                warn!(remaining, "no tokio runtime available, dropping in-flight steps");
            }
        }
    }

    fn finish(mut self, start: Instant) -> (ExpansionResult<A, T>, RunStats) {
        self.stats.duration = start.elapsed();
        info!(
            admitted = self.stats.admitted,
            produced = self.stats.produced,
            failed_branches = self.stats.failed_branches,
            short_circuited = self.stats.short_circuited,
            "expansion resolved"
        );

        let stats = self.stats.clone();
        self.report(ExpansionEvent::RunCompleted {
            stats: stats.clone(),
        });
        if let Some(reporter) = self.reporter.as_deref_mut() {
            reporter.finish();
        }

        (self.aggregator.into_result(), stats)
    }

    fn report(&mut self, event: ExpansionEvent) {
        if let Some(reporter) = self.reporter.as_deref_mut() {
            reporter.report_event(event);
        }
    }
}
