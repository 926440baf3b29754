//! aiswarm: coordination server for AI agent swarms.
//!
//! Brokers work between long-running agent processes over an MCP tool
//! surface: task dispatch with at-most-one claim, shared key/value memory
//! with blocking waits, heartbeat-driven agent liveness, and an in-process
//! typed event bus with a persistent audit log. State lives in a single
//! SQLite database with WAL journaling.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
