//! Glue: wires the scheduler (Component A), LLM broker (Component B), the
//! message bus (Component C), and the self-healing monitor (Component D)
//! into one running process, and coordinates shutdown across them (spec
//! §2 "Glue: Event fan-out, metrics taps, shutdown coordination").
//!
//! Every component depends only on the narrow trait its collaborator
//! exposes (`synapse_bus::Bus`, `synapse_monitor::Probe`) rather than on
//! each other directly (spec §9: "cyclic references ... broken with
//! interface abstractions") — this crate is the one place that holds
//! concrete references to all of them at once, the way the teacher's
//! `orchestration::main` wires its autonomous executor, council, and
//! observability stack together (`orchestration/src/main.rs`).

pub mod core;

pub use core::AgencyCore;
