//! SMS opt-out — polls inbound SMS replies and turns STOP into a single
//! backend opt-out per message, recorded in a durable ledger.

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod routes;
pub mod store;
