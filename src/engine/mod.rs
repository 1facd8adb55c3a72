// src/engine/mod.rs

//! Task execution engine.
//!
//! A run is an event-sourced state machine:
//! - [`events`] and [`steps`] are the closed catalogues of facts and work;
//! - [`event_log`] and [`step_queue`] record them;
//! - [`core::RunState`] owns both plus the abort flag, and applies the
//!   [`handlers`] every time an event is posted;
//! - [`context::RunContext`] is the thread-safe face the step runner uses.
//!
//! `TaskStarted` is posted, handlers queue steps, the runner executes them and
//! posts the resulting events, and so on until nothing is pending or in
//! flight.

/// Canonical container name type used throughout the engine.
pub type ContainerName = String;

pub mod context;
pub mod core;
pub mod event_log;
pub mod events;
pub mod handlers;
pub mod messages;
pub mod step_queue;
pub mod steps;

pub use context::RunContext;
pub use core::{RunOptions, RunOutcome, RunState};
pub use event_log::{EventLog, RecordedEvent};
pub use events::{TaskEvent, TaskEventKind};
pub use step_queue::{StepId, StepQueue, StepState};
pub use steps::{TaskStep, TaskStepKind};
