// src/engine/context.rs

//! Thread-safe wrapper around [`RunState`].
//!
//! Workers share one `RunContext` through an `Arc`. Every operation takes
//! the lock for its whole duration, so posting an event (append + handler)
//! is atomic with respect to every other operation, and handlers never
//! interleave. Queries hand back owned copies so no lock outlives a call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::model::{Container, PortMapping};
use crate::dag::ContainerGraph;
use crate::engine::core::{RunOptions, RunOutcome, RunState};
use crate::engine::events::{TaskEvent, TaskEventKind};
use crate::engine::step_queue::StepId;
use crate::engine::steps::{TaskStep, TaskStepKind};
use crate::types::BehaviourAfterFailure;

pub struct RunContext {
    graph: Arc<ContainerGraph>,
    state: Mutex<RunState>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("task", &self.graph.task_name())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(graph: Arc<ContainerGraph>, options: RunOptions) -> Self {
        let state = RunState::new(Arc::clone(&graph), options);
        Self {
            graph,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        // A handler that panicked has already been reported as a failed
        // step; carry on with the state as it was left.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn post_event(&self, event: TaskEvent) {
        self.lock().post_event(event);
    }

    pub fn queue_step(&self, step: TaskStep) -> StepId {
        self.lock().queue_step(step)
    }

    pub fn remove_pending_steps_of_type(&self, kind: TaskStepKind) {
        self.lock().remove_pending_steps_of_type(kind);
    }

    pub fn past_events_of_type(&self, kind: TaskEventKind) -> Vec<TaskEvent> {
        self.lock()
            .past_events_of_type(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    /// # Panics
    ///
    /// If more than one event of `kind` has been recorded.
    pub fn single_past_event_of_type(&self, kind: TaskEventKind) -> Option<TaskEvent> {
        self.lock().single_past_event_of_type(kind).cloned()
    }

    pub fn pending_and_processed_steps_of_type(&self, kind: TaskStepKind) -> Vec<TaskStep> {
        self.lock()
            .pending_and_processed_steps_of_type(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn processed_steps_of_type(&self, kind: TaskStepKind) -> Vec<TaskStep> {
        self.lock()
            .processed_steps_of_type(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn pending_steps_of_type(&self, kind: TaskStepKind) -> Vec<TaskStep> {
        self.lock()
            .pending_steps_of_type(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn abort(&self) {
        self.lock().abort();
    }

    pub fn is_aborting(&self) -> bool {
        self.lock().is_aborting()
    }

    pub fn behaviour_after_failure(&self) -> BehaviourAfterFailure {
        self.lock().behaviour_after_failure()
    }

    pub fn project_name(&self) -> String {
        self.lock().project_name().to_string()
    }

    // Graph lookups need no lock.

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

    // Used by the step runner.

    pub fn claim_next_step(&self) -> Option<(StepId, TaskStep)> {
        self.lock().claim_next_step()
    }

    /// Mark the step processed, then post its event, under one lock.
    pub fn complete_step(&self, id: StepId, event: TaskEvent) {
        self.lock().complete_step(id, event);
    }

    pub fn is_finished(&self) -> bool {
        self.lock().is_finished()
    }

    pub fn outcome(&self) -> RunOutcome {
        self.lock().outcome()
    }

    /// Run `f` against the state while holding the lock.
    pub fn with_state<T>(&self, f: impl FnOnce(&RunState) -> T) -> T {
        f(&self.lock())
    }
}
