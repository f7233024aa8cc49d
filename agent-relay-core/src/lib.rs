//! Core domain models and traits for Agent Relay
//!
//! This crate contains the types shared by the coordination runtime and
//! the agents it drives: roles, messages, task and result payloads, agent
//! status, collaboration sessions and workflow run records.

pub mod agent;
pub mod collaboration;
pub mod error;
pub mod history;
pub mod message;
pub mod role;
pub mod task;
pub mod workflow;

pub use agent::{Agent, AgentState, AgentStatus};
pub use error::{Error, Result};
pub use role::AgentRole;
