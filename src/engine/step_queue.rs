// src/engine/step_queue.rs

use std::collections::{BTreeMap, VecDeque};

use tracing::warn;

use crate::engine::steps::{TaskStep, TaskStepKind};

pub type StepId = u64;

/// Lifecycle of a queued step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    InFlight,
    Processed,
}

#[derive(Debug, Clone)]
struct QueuedStep {
    step: TaskStep,
    state: StepState,
}

/// Pending steps in FIFO order, plus every step that has been claimed or
/// processed. Steps removed while pending are forgotten entirely.
#[derive(Debug, Default)]
pub struct StepQueue {
    next_id: StepId,
    steps: BTreeMap<StepId, QueuedStep>,
    pending: VecDeque<StepId>,
}

impl StepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step to the pending set. Duplicates are not detected here.
    pub fn queue(&mut self, step: TaskStep) -> StepId {
        let id = self.next_id;
        self.next_id += 1;
        self.steps.insert(
            id,
            QueuedStep {
                step,
                state: StepState::Pending,
            },
        );
        self.pending.push_back(id);
        id
    }

    /// Take the oldest pending step and mark it in flight.
    pub fn claim_next(&mut self) -> Option<(StepId, TaskStep)> {
        let id = self.pending.pop_front()?;
        let entry = self.steps.get_mut(&id)?;
        entry.state = StepState::InFlight;
        Some((id, entry.step.clone()))
    }

    /// Record that a claimed step has finished. Returns `false` if the step
    /// was not in flight.
    pub fn mark_processed(&mut self, id: StepId) -> bool {
        match self.steps.get_mut(&id) {
            Some(entry) if entry.state == StepState::InFlight => {
                entry.state = StepState::Processed;
                true
            }
            Some(entry) => {
                warn!(step_id = id, state = ?entry.state, "step completed but was not in flight");
                false
            }
            None => {
                warn!(step_id = id, "completed step is unknown");
                false
            }
        }
    }

    /// Drop every pending step of `kind`. Claimed and processed steps are
    /// untouched. Returns how many were removed.
    pub fn remove_pending_of_kind(&mut self, kind: TaskStepKind) -> usize {
        let steps = &mut self.steps;
        let before = self.pending.len();
        self.pending.retain(|id| {
            let keep = steps.get(id).is_some_and(|e| e.step.kind() != kind);
            if !keep {
                steps.remove(id);
            }
            keep
        });
        before - self.pending.len()
    }

    fn of_kind_where(
        &self,
        kind: TaskStepKind,
        wanted: impl Fn(StepState) -> bool,
    ) -> Vec<&TaskStep> {
        self.steps
            .values()
            .filter(|e| e.step.kind() == kind && wanted(e.state))
            .map(|e| &e.step)
            .collect()
    }

    /// Steps of `kind` that are pending, in flight or processed: everything
    /// that has not been removed.
    pub fn pending_and_processed_of_kind(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.of_kind_where(kind, |_| true)
    }

    pub fn processed_of_kind(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.of_kind_where(kind, |s| s == StepState::Processed)
    }

    pub fn pending_of_kind(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.of_kind_where(kind, |s| s == StepState::Pending)
    }

    pub fn in_flight_of_kind(&self, kind: TaskStepKind) -> Vec<&TaskStep> {
        self.of_kind_where(kind, |s| s == StepState::InFlight)
    }

    pub fn state_of(&self, id: StepId) -> Option<StepState> {
        self.steps.get(&id).map(|e| e.state)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.steps
            .values()
            .filter(|e| e.state == StepState::InFlight)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DockerNetwork;

    fn pull(image: &str) -> TaskStep {
        TaskStep::PullImage {
            image_name: image.to_string(),
        }
    }

    #[test]
    fn claims_in_fifo_order_and_tracks_state() {
        let mut queue = StepQueue::new();
        let first = queue.queue(TaskStep::CreateTaskNetwork);
        let second = queue.queue(pull("redis"));

        let (id, step) = queue.claim_next().unwrap();
        assert_eq!(id, first);
        assert_eq!(step, TaskStep::CreateTaskNetwork);
        assert_eq!(queue.state_of(first), Some(StepState::InFlight));
        assert_eq!(queue.state_of(second), Some(StepState::Pending));

        assert!(queue.mark_processed(first));
        assert!(!queue.mark_processed(first));
        assert_eq!(queue.state_of(first), Some(StepState::Processed));
        assert_eq!(queue.processed_of_kind(TaskStepKind::CreateTaskNetwork).len(), 1);
    }

    #[test]
    fn removing_pending_steps_leaves_claimed_ones_alone() {
        let mut queue = StepQueue::new();
        queue.queue(pull("redis"));
        queue.queue(pull("postgres"));
        queue.queue(TaskStep::DeleteTaskNetwork {
            network: DockerNetwork::new("net"),
        });
        let (claimed, _) = queue.claim_next().unwrap();

        assert_eq!(queue.remove_pending_of_kind(TaskStepKind::PullImage), 1);
        assert_eq!(queue.state_of(claimed), Some(StepState::InFlight));
        assert_eq!(
            queue.pending_and_processed_of_kind(TaskStepKind::PullImage),
            vec![&pull("redis")]
        );
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.in_flight_count(), 1);
    }

    #[test]
    fn removing_pending_steps_twice_is_the_same_as_once() {
        let mut queue = StepQueue::new();
        queue.queue(pull("redis"));
        queue.queue(TaskStep::CreateTaskNetwork);

        assert_eq!(queue.remove_pending_of_kind(TaskStepKind::PullImage), 1);
        assert_eq!(queue.remove_pending_of_kind(TaskStepKind::PullImage), 0);
        assert_eq!(queue.pending_count(), 1);
        assert!(queue.pending_of_kind(TaskStepKind::PullImage).is_empty());
        assert_eq!(queue.pending_of_kind(TaskStepKind::CreateTaskNetwork).len(), 1);
    }
}
