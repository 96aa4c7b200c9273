//! # Conductor Sync Library
//!
//! This library provides the core functionality for the Conductor Sync
//! service: bi-directional synchronization between BRD requirement
//! documents and Jira issues, including handlers, models, and server
//! configuration.

pub mod clients;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod webhook_verification;
pub use migration;
