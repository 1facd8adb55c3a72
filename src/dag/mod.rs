// src/dag/mod.rs

//! Container dependency graph for a single task.
//!
//! [`graph`] answers "what does X depend on" and "what depends on X" for the
//! containers taking part in a task. It is read-only for the duration of a
//! run and shared between the engine and the step executor.

pub mod graph;

pub use graph::ContainerGraph;
