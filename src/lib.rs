//! execd - a lightweight command-execution agent.
//!
//! Accepts HTTP requests to spawn local OS processes, tracks their lifecycle,
//! and exposes status, listing, and cancellation endpoints behind bearer-token
//! authentication. Replaces ad-hoc SSH command invocation in test
//! orchestration with one uniform RPC surface.
//!
//! Architecture:
//! - `executor` - bounded-concurrency, cancellable process supervision
//! - `store` - in-memory state of record for every job
//! - `server` - axum HTTP surface and authentication
//! - `client` - reqwest client for callers of the agent
//! - `config` / `logging` - YAML configuration and tracing setup

pub mod client;
pub mod config;
pub mod executor;
pub mod logging;
pub mod models;
pub mod server;
pub mod store;
