// src/engine/core.rs

//! Pure core of a task run.
//!
//! [`RunState`] owns the event log, the step queue and the abort flag. It is
//! synchronous and deterministic: posting an event appends it to the log and
//! runs that event's handler, which only ever enqueues or removes steps.
//! Nothing in here touches Tokio, processes or the filesystem, so the whole
//! state machine can be driven directly from tests.
//!
//! The thread-safe wrapper used by the step runner lives in
//! [`super::context`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{Container, PortMapping};
use crate::dag::ContainerGraph;
use crate::engine::event_log::{EventLog, RecordedEvent};
use crate::engine::events::{TaskEvent, TaskEventKind};
use crate::engine::handlers;
use crate::engine::step_queue::{StepId, StepQueue};
use crate::engine::steps::{TaskStep, TaskStepKind};
use crate::types::BehaviourAfterFailure;

/// Run-level settings that do not come from the dependency graph.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_name: String,
    pub behaviour_after_failure: BehaviourAfterFailure,
}

/// Summary of a finished (or stalled) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code of the entry container, if it ran to completion.
    pub exit_code: Option<i64>,
    pub aborted: bool,
    pub failures_displayed: usize,
    /// Containers that were created and never removed.
    pub containers_left_behind: Vec<String>,
    /// Whether a network was created and never deleted.
    pub network_left_behind: bool,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.exit_code.is_some()
    }

    /// Exit code for the dockdag process itself.
    pub fn process_exit_code(&self) -> i32 {
        match self.exit_code {
            Some(code) if !self.aborted => i32::try_from(code).unwrap_or(1),
            _ => 1,
        }
    }
}

#[derive(Debug)]
pub struct RunState {
    graph: Arc<ContainerGraph>,
    options: RunOptions,
    events: EventLog,
    steps: StepQueue,
    aborting: bool,
}

impl RunState {
    pub fn new(graph: Arc<ContainerGraph>, options: RunOptions) -> Self {
        Self {
            graph,
            options,
            events: EventLog::new(),
            steps: StepQueue::new(),
            aborting: false,
        }
    }

    /// Append `event` to the log, then apply its handler.
    pub fn post_event(&mut self, event: TaskEvent) {
        debug!(%event, "event posted");
        self.events.append(event.clone());
        handlers::apply(&event, self);
    }

    /// Append `event` to the log without applying its handler.
    ///
    /// Useful for putting a run into a known state before exercising a
    /// single handler.
    pub fn record_event(&mut self, event: TaskEvent) {
        self.events.append(event);
    }

    pub fn queue_step(&mut self, step: TaskStep) -> StepId {
        debug!(%step, "step queued");
        self.steps.queue(step)
    }

    pub fn remove_pending_steps_of_type(&mut self, kind: TaskStepKind) {
        let removed = self.steps.remove_pending_of_kind(kind);
        if removed > 0 {
            debug!(%kind, removed, "removed pending steps");
        }
    }

    pub fn past_events_of_type(&self, kind: TaskEventKind) -> Vec<&TaskEvent> {
        self.events.of_kind(kind).collect()
    }

    /// # Panics
    ///
    /// If more than one event of `kind` has been recorded.
    pub fn single_past_event_of_type(&self, kind: TaskEventKind) -> Option<&TaskEvent> {
        self.events.single_of_kind(kind)
    }

    /// Steps of `kind` that are pending, in flight, or processed.
    pub fn pending_and_processed_steps_of_type(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.steps.pending_and_processed_of_kind(kind)
    }

    pub fn processed_steps_of_type(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.steps.processed_of_kind(kind)
    }

    pub fn pending_steps_of_type(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.steps.pending_of_kind(kind)
    }

    pub fn in_flight_steps_of_type(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.steps.in_flight_of_kind(kind)
    }

    pub fn abort(&mut self) {
        if !self.aborting {
            info!("aborting task run");
        }
        self.aborting = true;
    }

    pub fn is_aborting(&self) -> bool {
        self.aborting
    }

    pub fn behaviour_after_failure(&self) -> BehaviourAfterFailure {
        self.options.behaviour_after_failure
    }

    pub fn project_name(&self) -> &str {
        &self.options.project_name
    }

    pub fn graph(&self) -> &Arc<ContainerGraph> {
        &self.graph
    }

    pub fn all_task_containers(&self) -> Vec<Container> {
        self.graph.all_containers().cloned().collect()
    }

    pub fn is_task_container(&self, container: &str) -> bool {
        self.graph.is_task_container(container)
    }

    pub fn dependencies_of(&self, container: &str) -> Vec<String> {
        self.graph.dependencies_of(container).iter().cloned().collect()
    }

    pub fn containers_that_depend_on(&self, container: &str) -> Vec<String> {
        self.graph
            .containers_that_depend_on(container)
            .iter()
            .cloned()
            .collect()
    }

    pub fn command_for_container(&self, container: &str) -> Option<Vec<String>> {
        self.graph.command_for(container)
    }

    pub fn additional_environment_variables_for_container(
        &self,
        container: &str,
    ) -> BTreeMap<String, String> {
        self.graph.additional_environment_variables_for(container)
    }

    pub fn additional_port_mappings_for_container(&self, container: &str) -> Vec<PortMapping> {
        self.graph.additional_port_mappings_for(container)
    }

    /// Claim the oldest pending step for execution.
    pub fn claim_next_step(&mut self) -> Option<(StepId, TaskStep)> {
        self.steps.claim_next()
    }

    /// Mark a claimed step processed, then post the event it produced.
    pub fn complete_step(&mut self, id: StepId, event: TaskEvent) {
        self.steps.mark_processed(id);
        self.post_event(event);
    }

    pub fn has_pending_steps(&self) -> bool {
        self.steps.pending_count() > 0
    }

    pub fn in_flight_step_count(&self) -> usize {
        self.steps.in_flight_count()
    }

    /// Nothing pending and nothing in flight.
    pub fn is_finished(&self) -> bool {
        !self.has_pending_steps() && self.in_flight_step_count() == 0
    }

    pub fn events(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.iter()
    }

    pub fn outcome(&self) -> RunOutcome {
        let exit_code = self
            .events
            .of_kind(TaskEventKind::RunningContainerExited)
            .find_map(|e| match e {
                TaskEvent::RunningContainerExited { exit_code, .. } => Some(*exit_code),
                _ => None,
            });

        let removed: Vec<&str> = self
            .events
            .of_kind(TaskEventKind::ContainerRemoved)
            .filter_map(TaskEvent::container)
            .collect();
        let containers_left_behind = self
            .events
            .of_kind(TaskEventKind::ContainerCreated)
            .filter_map(TaskEvent::container)
            .filter(|c| !removed.contains(c))
            .map(str::to_string)
            .collect();

        let network_left_behind = self
            .events
            .of_kind(TaskEventKind::TaskNetworkCreated)
            .next()
            .is_some()
            && self
                .events
                .of_kind(TaskEventKind::TaskNetworkDeleted)
                .next()
                .is_none();

        RunOutcome {
            exit_code,
            aborted: self.aborting,
            failures_displayed: self.events.of_kind(TaskEventKind::TaskFailureDisplayed).count(),
            containers_left_behind,
            network_left_behind,
        }
    }
}
