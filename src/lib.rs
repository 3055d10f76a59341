#![forbid(unsafe_code)]

//! Cache and dedup coordination for externally retrieved split A/V media.
//!
//! The crate does not download anything itself; it decides when a retrieval
//! job should run, makes sure at most one runs per identifier, runs the
//! external tool twice (video, then audio), resolves what the tool actually
//! wrote, and publishes a readiness record other services poll.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod job;
pub mod kv;
pub mod lock;
pub mod queue;
pub mod resolver;
pub mod retriever;
pub mod store;
