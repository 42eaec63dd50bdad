// Library for the agent and server binaries and for tests

pub mod agent;
pub mod aggregation;
pub mod buffer;
pub mod config;
pub mod flusher;
pub mod logging;
pub mod maintenance;
pub mod models;
pub mod provider;
pub mod query;
pub mod routes;
pub mod sampler;
pub mod store;
pub mod version;
