#![allow(clippy::all)]
#![allow(clippy::pedantic)]
#![allow(clippy::nursery)]
#![allow(clippy::cargo)]
#![allow(missing_docs)]
#![allow(unused)]
#![allow(dead_code)]
#![allow(clippy::clone_on_ref_ptr)]
#![allow(clippy::unwrap_used)]
#![allow(unused_comparisons)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::useless_vec)]
#![allow(unused_imports)]
#![allow(clippy::single_component_path_imports)]
//! # Reddit Watch Hive
//!
//! A fleet of A2A (Agent-to-Agent) services that scan Reddit for topics of
//! interest, filter and summarise the relevant posts, and deliver
//! aggregated alerts over Slack and email.
//!
//! ## Architecture Overview
//!
//! - [`agents`]: The five concrete agent variants (retrieval, filter,
//!   summarise, alert, coordinator), each a `SkillTable` + `AgentCard`.
//! - [`coordinator`]: The Retrieve-Filter-Summarise-Alert pipeline driver.
//! - [`recovery_daemon`]: Background sweep that recovers stuck/failed tasks.
//! - [`store`]: Embedded SQLite persistence for tasks, workflows, agent
//!   state, recovery records, content dedup, and alert batches/deliveries.
//! - [`infrastructure`]: Circuit breakers, security middleware, and metrics.
//! - [`registry`]: Peer discovery, backed by an in-memory or Redis store.
//! - [`a2a`] / [`server`] / [`http_client`]: The JSON-RPC wire format, the
//!   per-agent HTTP router, and the client used to call peer agents.
//! - [`utils`]: Configuration, auth, rate limiting, and error handling.

pub mod a2a;
pub mod agent_card;
pub mod agents;
pub mod alerting;
pub mod app_state;
pub mod coordinator;
pub mod http_client;
pub mod idempotency;
pub mod infrastructure;
pub mod recovery_daemon;
pub mod registry;
pub mod server;
pub mod store;
pub mod tasks;
pub mod utils;

pub use app_state::AppState;
pub use utils::{Config, WatchError, WatchResult};
