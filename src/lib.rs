// ============================================================================
// vulndb-server library
// ============================================================================

pub mod core;
pub mod db;
pub mod server;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use core::{HotUpdateError, Result, ServerError};
pub use db::{DbError, DbHandle, DbOperation, Metadata, MetadataStore, RemoteDbClient, VulnDatabase};
pub use server::{AdmissionGate, DbWorker, Server, ServerConfig, UpdateGauge};
