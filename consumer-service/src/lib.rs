//! Consumer side of the courier outbox platform.
//!
//! Polls the broker under a consumer group, deduplicates deliveries through
//! the processed store, runs the processor callback, records outcomes, and
//! acknowledges results back to the producer.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod migrations;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
