//! Command line front end for Agent Relay
//!
//! Loads a [`CoordinatorConfig`](agent_relay_coordinator::CoordinatorConfig),
//! sets up logging and runs one pipeline over a set of input files with
//! command-backed agents.

pub mod logging;
pub mod runner;

pub use runner::run_pipeline;
