//! # Storage Policy Engine
//!
//! This crate applies the object-storage row-level security policy set to
//! a policy store and reads the result back.
//!
//! ## Overview
//!
//! The storage-policy-engine crate handles:
//! - **Stores**: Connector and session traits over the database
//! - **Application**: Ordered statement execution with per-statement failure isolation
//! - **Verification**: Reading installed policies and buckets back from the catalog
//! - **Orchestration**: Connect, apply, verify, report, exit status
//! - **Configuration**: Connection settings from the environment
//!
//! ## Features
//!
//! - `memory` (default): In-memory store for tests and local runs
//! - `postgres`: PostgreSQL store via `sqlx`
//!
//! ## Failure Model
//!
//! | failure                       | effect on the run                        |
//! |-------------------------------|------------------------------------------|
//! | cannot connect / bad config   | run fails, exit code 1                   |
//! | statement rejected            | recorded, next statement runs            |
//! | catalog listing unreadable    | that listing unconfirmed, others shown   |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use storage_policy_engine::{ConsoleReporter, MemoryConnector, MemoryPolicyStore, Orchestrator, StoreConfig};
//!
//! async fn run() -> i32 {
//!     let connector = MemoryConnector::new(MemoryPolicyStore::new());
//!     let orchestrator = Orchestrator::new(connector, StoreConfig::from_env());
//!
//!     let report = orchestrator.run(&ConsoleReporter).await;
//!     report.exit_code()
//! }
//! ```

pub mod applier;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod store;
pub mod verifier;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export main types for convenience
pub use applier::{ApplicationResult, PolicyApplier};
pub use config::{ConfigError, SslMode, StoreConfig};
pub use error::{PolicyError, PolicyResult, RejectionKind};
pub use orchestrator::{Orchestrator, RunPhase, RunReport, RunStatus};
pub use report::{ConsoleReporter, MemoryReporter, Reporter};
pub use store::{PolicyStore, Row, StoreConnector};
pub use verifier::{BucketInfo, InstalledPolicy, StateVerifier, VerificationSnapshot};

#[cfg(feature = "memory")]
pub use memory::{Catalog, MemoryConnector, MemoryPolicyStore};

#[cfg(feature = "postgres")]
pub use postgres::{PgConnector, PgPolicyStore};
