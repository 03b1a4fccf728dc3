//! # Rover payload controller
//!
//! Onboard controller for a descent payload that lands, releases its rover and
//! drives on ground command. One cooperative loop reads sensors, runs the
//! phase machine, executes radio commands and streams telemetry and images;
//! a supervisor restarts the loop after any fault and a watchdog backs it up.
//!
//! ## Layout
//! - `component_a`: sensors, phase machine, telemetry, imaging
//! - `component_b`: radio codec, command grammar, actuator
//! - `advanced`: scheduler/supervisor, watchdog, links, simulated hardware
//! - `utils`: config, faults, clock, metrics, CSV export
//! - `hardware`: trait boundary to the drivers

pub mod component_a;
pub mod component_b;
pub mod advanced;
pub mod utils;
pub mod hardware;
