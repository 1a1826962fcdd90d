//! Policy store abstraction
//!
//! The engine talks to the database through two traits: a
//! [`StoreConnector`] that opens a session, and the [`PolicyStore`]
//! session it returns. Implementations:
//!
//! - [`crate::memory::MemoryPolicyStore`] (feature `memory`, default): an
//!   in-process catalog for tests and dry runs
//! - `crate::postgres::PgPolicyStore` (feature `postgres`): a live
//!   PostgreSQL connection

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::PolicyResult;

/// One result row, column values in selection order.
pub type Row = Vec<serde_json::Value>;

/// An open session against the policy store.
///
/// Calls are issued one at a time; the engine never overlaps two
/// operations on the same session.
#[async_trait]
pub trait PolicyStore: Send {
    /// Execute a statement that returns no rows.
    ///
    /// A rejection is reported as [`crate::PolicyError::StatementRejected`].
    async fn execute(&mut self, statement: &str) -> PolicyResult<()>;

    /// Run a read query and return its rows.
    async fn query(&mut self, sql: &str) -> PolicyResult<Vec<Row>>;

    /// Release the session. Calling it twice is harmless.
    async fn close(&mut self) -> PolicyResult<()>;
}

/// Opens sessions against a policy store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a session.
    ///
    /// Any failure is reported as [`crate::PolicyError::ConnectionFailed`]
    /// or [`crate::PolicyError::Config`].
    async fn connect(&self, config: &StoreConfig) -> PolicyResult<Box<dyn PolicyStore>>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}
