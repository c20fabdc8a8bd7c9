//! Progress reporting for expansion runs
//!
//! A reporter receives an event for every admission, produced value, failure
//! and the final outcome of a run. Reporters observe a run, they never
//! influence it.

use tracing::{debug, info, warn};

use crate::error::HookKind;
use crate::task::TaskId;
use crate::types::RunStats;

/// Event types that can be reported during a run
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionEvent {
    /// A task was admitted, either as a seed or by a requeue step
    TaskAdmitted { task_id: TaskId, layer: usize },

    /// A task's value was appended to the result
    ValueProduced { task_id: TaskId, layer: usize },

    /// A step of a task failed and its branch was abandoned
    BranchFailed {
        task_id: TaskId,
        layer: usize,
        stage: &'static str,
        error: String,
    },

    /// A data collection hook failed
    HookFailed {
        task_id: TaskId,
        hook: HookKind,
        error: String,
    },

    /// Requeue terms were dropped because the result limit was reached
    TermsDropped {
        task_id: TaskId,
        layer: usize,
        dropped: usize,
    },

    /// The short-circuit predicate ended the run
    ShortCircuited { task_id: TaskId, layer: usize },

    /// The run resolved
    RunCompleted { stats: RunStats },
}

/// Trait for reporting run progress
pub trait ExpansionReporter: Send {
    /// Report a run event
    fn report_event(&mut self, event: ExpansionEvent);

    /// Set a label for the current run
    fn set_context(&mut self, context: String) {
        let _ = context;
    }

    /// Called once the run resolved
    fn finish(&mut self) {}
}

/// A reporter that discards all events
#[derive(Debug, Default)]
pub struct NoOpReporter;

impl ExpansionReporter for NoOpReporter {
    fn report_event(&mut self, _event: ExpansionEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter {
    context: Option<String>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self) -> &str {
        self.context.as_deref().unwrap_or("async_queue")
    }
}

impl ExpansionReporter for TracingReporter {
    fn report_event(&mut self, event: ExpansionEvent) {
        let context = self.context();
        match event {
            ExpansionEvent::TaskAdmitted { task_id, layer } => {
                debug!(context, %task_id, layer, "task admitted");
            }
            ExpansionEvent::ValueProduced { task_id, layer } => {
                debug!(context, %task_id, layer, "value produced");
            }
            ExpansionEvent::BranchFailed {
                task_id,
                layer,
                stage,
                error,
            } => {
                warn!(context, %task_id, layer, stage, error = %error, "branch abandoned");
            }
            ExpansionEvent::HookFailed {
                task_id,
                hook,
                error,
            } => {
                warn!(context, %task_id, %hook, error = %error, "hook failed");
            }
            ExpansionEvent::TermsDropped {
                task_id,
                layer,
                dropped,
            } => {
                debug!(context, %task_id, layer, dropped, "requeue terms dropped");
            }
            ExpansionEvent::ShortCircuited { task_id, layer } => {
                info!(context, %task_id, layer, "run short-circuited");
            }
            ExpansionEvent::RunCompleted { stats } => {
                info!(
                    context,
                    admitted = stats.admitted,
                    produced = stats.produced,
                    failed_branches = stats.failed_branches,
                    duration = ?stats.duration,
                    "run completed"
                );
            }
        }
    }

    fn set_context(&mut self, context: String) {
        self.context = Some(context);
    }
}

/// Broadcasts events to multiple reporters
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn ExpansionReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter<R: ExpansionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl ExpansionReporter for MultiReporter {
    fn report_event(&mut self, event: ExpansionEvent) {
        for reporter in &mut self.reporters {
            reporter.report_event(event.clone());
        }
    }

    fn set_context(&mut self, context: String) {
        for reporter in &mut self.reporters {
            reporter.set_context(context.clone());
        }
    }

    fn finish(&mut self) {
        for reporter in &mut self.reporters {
            reporter.finish();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every event it receives
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingReporter {
        pub(crate) events: Arc<Mutex<Vec<ExpansionEvent>>>,
        pub(crate) finished: Arc<Mutex<bool>>,
    }

    impl RecordingReporter {
        pub(crate) fn events(&self) -> Vec<ExpansionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ExpansionReporter for RecordingReporter {
        fn report_event(&mut self, event: ExpansionEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn finish(&mut self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    #[test]
    fn test_multi_reporter() {
        let reporter1 = RecordingReporter::default();
        let reporter2 = RecordingReporter::default();

        let mut multi = MultiReporter::new()
            .add_reporter(reporter1.clone())
            .add_reporter(reporter2.clone());

        multi.report_event(ExpansionEvent::TaskAdmitted {
            task_id: TaskId::new(),
            layer: 0,
        });
        multi.finish();

        assert_eq!(reporter1.events().len(), 1);
        assert_eq!(reporter2.events().len(), 1);
        assert!(*reporter2.finished.lock().unwrap());
    }

    #[test]
    fn test_tracing_and_no_op_reporters() {
        let mut reporter = TracingReporter::new();
        reporter.set_context("crawl".to_string());
        assert_eq!(reporter.context(), "crawl");

        // Should not panic without a subscriber installed
        reporter.report_event(ExpansionEvent::RunCompleted {
            stats: RunStats::default(),
        });

        let mut reporter = NoOpReporter;
        reporter.report_event(ExpansionEvent::ShortCircuited {
            task_id: TaskId::new(),
            layer: 1,
        });
        reporter.finish();
    }
}
