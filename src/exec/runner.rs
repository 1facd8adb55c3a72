// src/exec/runner.rs

//! Async shell around the run context.
//!
//! The runner claims pending steps, runs up to `parallelism` of them at once
//! on Tokio tasks, and feeds each completion event back into the context.
//! All decisions about what to do next are made by the handlers inside
//! `RunContext::complete_step`; this loop only moves work around.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{RunContext, RunOutcome, StepId, TaskEvent};
use crate::exec::executor::StepExecutor;

pub struct StepRunner {
    context: Arc<RunContext>,
    executor: Arc<StepExecutor>,
    parallelism: usize,
}

impl StepRunner {
    pub fn new(context: Arc<RunContext>, executor: Arc<StepExecutor>, parallelism: usize) -> Self {
        Self {
            context,
            executor,
            parallelism: parallelism.max(1),
        }
    }

    /// Run the task until nothing is pending and nothing is in flight.
    ///
    /// When `interrupt` resolves, `UserInterruptedExecution` is posted once;
    /// steps already running are left to finish.
    pub async fn run<I>(self, interrupt: I) -> RunOutcome
    where
        I: Future<Output = ()>,
    {
        info!(
            task = %self.context.graph().task_name(),
            parallelism = self.parallelism,
            "task run started"
        );

        self.context.post_event(TaskEvent::TaskStarted);

        let mut in_flight: JoinSet<(StepId, TaskEvent)> = JoinSet::new();
        let mut interrupted = false;
        tokio::pin!(interrupt);

        loop {
            self.dispatch_ready_steps(&mut in_flight);

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(Ok((id, event))) => {
                        debug!(step_id = id, %event, "step completed");
                        self.context.complete_step(id, event);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "step worker did not complete");
                    }
                    None => {}
                },

                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    warn!("interrupt received; aborting task");
                    self.context.post_event(TaskEvent::UserInterruptedExecution);
                }
            }
        }

        let outcome = self.context.outcome();
        info!(
            exit_code = ?outcome.exit_code,
            aborted = outcome.aborted,
            "task run finished"
        );
        outcome
    }

    /// Claim pending steps until the worker limit is reached.
    fn dispatch_ready_steps(&self, in_flight: &mut JoinSet<(StepId, TaskEvent)>) {
        while in_flight.len() < self.parallelism {
            let Some((id, step)) = self.context.claim_next_step() else {
                break;
            };

            debug!(step_id = id, %step, "dispatching step");

            let executor = Arc::clone(&self.executor);
            let context = Arc::clone(&self.context);
            let kind = step.kind();

            in_flight.spawn(async move {
                // Run the step on its own task so a panic inside it becomes
                // an event instead of taking the coordinator down.
                let worker = tokio::spawn(async move { executor.execute(step, &context).await });
                let event = match worker.await {
                    Ok(event) => event,
                    Err(e) => {
                        error!(step_id = id, %kind, error = %e, "step panicked");
                        TaskEvent::ExecutionFailed {
                            message: format!("During execution of step of kind '{kind}': {e}"),
                        }
                    }
                };
                (id, event)
            });
        }
    }
}
