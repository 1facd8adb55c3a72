// src/engine/event_log.rs

use std::collections::HashMap;
use std::time::SystemTime;

use crate::engine::events::{TaskEvent, TaskEventKind};

/// An event together with when, and in which position, it was recorded.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub sequence: usize,
    pub recorded_at: SystemTime,
    pub event: TaskEvent,
}

/// Append-only record of everything that happened during a run, indexed by
/// event kind so handlers can query it cheaply.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<RecordedEvent>,
    by_kind: HashMap<TaskEventKind, Vec<usize>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: TaskEvent) -> &RecordedEvent {
        let sequence = self.events.len();
        self.by_kind.entry(event.kind()).or_default().push(sequence);
        self.events.push(RecordedEvent {
            sequence,
            recorded_at: SystemTime::now(),
            event,
        });
        &self.events[sequence]
    }

    /// Every event of the given kind, oldest first.
    pub fn of_kind(&self, kind: TaskEventKind) -> impl Iterator<Item = &TaskEvent> + '_ {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .map(move |&i| &self.events[i].event)
    }

    /// The only event of the given kind, if there is one.
    ///
    /// # Panics
    ///
    /// If more than one event of that kind was recorded. Kinds queried this
    /// way can only legitimately happen once per run.
    pub fn single_of_kind(&self, kind: TaskEventKind) -> Option<&TaskEvent> {
        let indices = self.by_kind.get(&kind)?;
        if indices.len() > 1 {
            panic!("Multiple events of type {kind} found.");
        }
        indices.first().map(|&i| &self.events[i].event)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(name: &str) -> TaskEvent {
        TaskEvent::ContainerBecameHealthy {
            container: name.to_string(),
        }
    }

    #[test]
    fn queries_by_kind_preserve_order() {
        let mut log = EventLog::new();
        log.append(TaskEvent::TaskStarted);
        log.append(healthy("a"));
        log.append(TaskEvent::TaskNetworkDeleted);
        log.append(healthy("b"));

        let found: Vec<_> = log.of_kind(TaskEventKind::ContainerBecameHealthy).collect();
        assert_eq!(found, vec![&healthy("a"), &healthy("b")]);
        assert_eq!(log.of_kind(TaskEventKind::ContainerRemoved).count(), 0);
        assert_eq!(log.len(), 4);

        let sequences: Vec<usize> = log.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn single_of_kind_returns_none_or_the_event() {
        let mut log = EventLog::new();
        assert!(log.single_of_kind(TaskEventKind::TaskStarted).is_none());

        log.append(TaskEvent::TaskStarted);
        assert_eq!(
            log.single_of_kind(TaskEventKind::TaskStarted),
            Some(&TaskEvent::TaskStarted)
        );
    }

    #[test]
    #[should_panic(expected = "Multiple events of type TaskNetworkDeleted found.")]
    fn single_of_kind_panics_on_duplicates() {
        let mut log = EventLog::new();
        log.append(TaskEvent::TaskNetworkDeleted);
        log.append(TaskEvent::TaskNetworkDeleted);
        log.single_of_kind(TaskEventKind::TaskNetworkDeleted);
    }
}
