// src/exec/mod.rs

//! Step execution layer.
//!
//! - [`executor`] maps a single step onto the container runtime, the
//!   filesystem or the failure sink, and returns the event that completes it.
//! - [`runner`] owns the coordinator loop: a bounded pool of Tokio tasks
//!   draining the run context's pending steps.

pub mod executor;
pub mod runner;

pub use executor::StepExecutor;
pub use runner::StepRunner;
