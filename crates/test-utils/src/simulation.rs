use dockdag::engine::{RunOutcome, RunState, StepId, TaskEvent, TaskStep, TaskStepKind};

/// Drives a [`RunState`] the way a runner with unlimited workers would:
/// every pending step is claimed straight away, and the test decides which
/// in-flight step completes next and with what event.
pub struct Simulation {
    pub state: RunState,
    in_flight: Vec<(StepId, TaskStep)>,
}

/// What a step acts on: its container, image name, file path or network.
pub fn target_of(step: &TaskStep) -> String {
    match step {
        TaskStep::PullImage { image_name } => image_name.clone(),
        TaskStep::DeleteTemporaryFile { path } => path.display().to_string(),
        TaskStep::DeleteTaskNetwork { network } => network.to_string(),
        other => other.container().unwrap_or_default().to_string(),
    }
}

impl Simulation {
    pub fn new(state: RunState) -> Self {
        Self {
            state,
            in_flight: Vec::new(),
        }
    }

    /// Post `TaskStarted` and claim what it queued.
    pub fn start(&mut self) {
        self.state.post_event(TaskEvent::TaskStarted);
        self.claim();
    }

    pub fn claim(&mut self) {
        while let Some(claimed) = self.state.claim_next_step() {
            self.in_flight.push(claimed);
        }
    }

    /// Complete the in-flight step of `kind` acting on `target` (any target
    /// if empty) with `event`.
    ///
    /// # Panics
    ///
    /// If no such step is in flight.
    pub fn complete(&mut self, kind: TaskStepKind, target: &str, event: TaskEvent) {
        let index = self
            .in_flight
            .iter()
            .position(|(_, s)| s.kind() == kind && (target.is_empty() || target_of(s) == target))
            .unwrap_or_else(|| {
                panic!(
                    "no {kind} step for '{target}' in flight; in flight: {:?}",
                    self.in_flight_summary()
                )
            });
        let (id, _) = self.in_flight.remove(index);
        self.state.complete_step(id, event);
        self.claim();
    }

    /// Post an event that is not the result of a step.
    pub fn post(&mut self, event: TaskEvent) {
        self.state.post_event(event);
        self.claim();
    }

    pub fn in_flight(&self) -> &[(StepId, TaskStep)] {
        &self.in_flight
    }

    pub fn in_flight_of_kind(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.in_flight
            .iter()
            .filter(|(_, s)| s.kind() == kind)
            .map(|(_, s)| s)
            .collect()
    }

    pub fn has_in_flight(&self, kind: TaskStepKind, target: &str) -> bool {
        self.in_flight
            .iter()
            .any(|(_, s)| s.kind() == kind && target_of(s) == target)
    }

    /// `"<kind>:<target>"` for every in-flight step, in claim order.
    pub fn in_flight_summary(&self) -> Vec<String> {
        self.in_flight
            .iter()
            .map(|(_, s)| format!("{}:{}", s.kind(), target_of(s)))
            .collect()
    }

    /// Messages of every failure display step claimed so far.
    pub fn displayed_failures(&self) -> Vec<String> {
        self.state
            .pending_and_processed_steps_of_type(TaskStepKind::DisplayTaskFailure)
            .into_iter()
            .filter_map(|s| match s {
                TaskStep::DisplayTaskFailure { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Complete every in-flight failure display.
    pub fn acknowledge_failures(&mut self) {
        while self
            .in_flight
            .iter()
            .any(|(_, s)| s.kind() == TaskStepKind::DisplayTaskFailure)
        {
            self.complete(TaskStepKind::DisplayTaskFailure, "", TaskEvent::TaskFailureDisplayed);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.in_flight.is_empty() && self.state.is_finished()
    }

    pub fn outcome(&self) -> RunOutcome {
        self.state.outcome()
    }
}
