//! Run orchestration.
//!
//! One run walks through a fixed sequence of phases:
//!
//! ```text
//! Connecting ──fail──────────────────────────────────────▶ Failed
//!     │
//!     ▼
//! Applying ──▶ Verifying ──▶ Reporting ──▶ Succeeded
//!              (errors here degrade the report, not the run)
//! ```
//!
//! Only failing to open the store ends a run early. Rejected statements
//! are recorded and skipped past. The policy and bucket listings are read
//! independently, and a listing that cannot be read is reported as
//! unconfirmed while the other is still shown. The store session is closed on every
//! path once it has been opened.
//!
//! ## Usage
//!
//! ```rust
//! use storage_policy_engine::config::StoreConfig;
//! use storage_policy_engine::memory::{MemoryConnector, MemoryPolicyStore};
//! use storage_policy_engine::orchestrator::{Orchestrator, RunStatus};
//! use storage_policy_engine::report::MemoryReporter;
//!
//! # tokio_test_block(async {
//! let connector = MemoryConnector::new(MemoryPolicyStore::new());
//! let orchestrator = Orchestrator::new(connector, StoreConfig::default());
//!
//! let reporter = MemoryReporter::new();
//! let report = orchestrator.run(&reporter).await;
//!
//! assert_eq!(report.status, RunStatus::Succeeded);
//! assert_eq!(report.exit_code(), 0);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_policy_model::{ObjectNamespace, PolicyStatement, StatementPlan};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::applier::{ApplicationResult, PolicyApplier};
use crate::config::StoreConfig;
use crate::error::PolicyResult;
use crate::report::{self, Reporter};
use crate::store::StoreConnector;
use crate::verifier::{StateVerifier, VerificationSnapshot};

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Opening the store session.
    Connecting,
    /// Executing the statement plan.
    Applying,
    /// Reading the catalog back.
    Verifying,
    /// Writing the operator report.
    Reporting,
    /// Finished; exit code 0.
    Succeeded,
    /// Aborted; exit code 1.
    Failed,
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The plan was applied (individual statements may have failed).
    Succeeded,
    /// The run could not start.
    Failed,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id (UUIDv7, time-ordered).
    pub run_id: Uuid,

    /// Store backend name.
    pub backend: String,

    /// Where the run connected, without credentials.
    pub target: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    pub finished_at: DateTime<Utc>,

    /// Final outcome.
    pub status: RunStatus,

    /// Phases entered, in order.
    pub phases: Vec<RunPhase>,

    /// One result per attempted statement, in plan order.
    pub results: Vec<ApplicationResult>,

    /// Catalog state after application; absent when the run never
    /// connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSnapshot>,

    /// Which listings could not be read, and why.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_error: Option<String>,

    /// Why the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RunReport {
    /// Process exit code: 0 when the run succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded => 0,
            RunStatus::Failed => 1,
        }
    }

    /// Number of accepted statements.
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded).count()
    }

    /// Number of rejected statements.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded).count()
    }

    /// Number of rejections that left the catalog as intended.
    pub fn benign_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_benign()).count()
    }

    /// Whether both listings of the final state were read back.
    pub fn is_verified(&self) -> bool {
        self.verification
            .as_ref()
            .map_or(false, VerificationSnapshot::is_complete)
    }

    /// Run duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Drives one connect, apply, verify and report cycle.
pub struct Orchestrator<C> {
    connector: C,
    config: StoreConfig,
    namespace: ObjectNamespace,
    statements: Vec<PolicyStatement>,
    applier: PolicyApplier,
    verifier: StateVerifier,
}

impl<C: StoreConnector> Orchestrator<C> {
    /// Create an orchestrator for the default namespace and its full plan.
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens the store session
    /// * `config` - Connection settings passed to the connector
    pub fn new(connector: C, config: StoreConfig) -> Self {
        let namespace = ObjectNamespace::default();
        let statements = StatementPlan::build(&namespace).statements().to_vec();

        Self {
            connector,
            config,
            verifier: StateVerifier::new(namespace.clone()),
            namespace,
            statements,
            applier: PolicyApplier::new(),
        }
    }

    /// Target another namespace; rebuilds the plan.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PolicyError::Namespace`] if a name in `namespace`
    /// cannot be used in SQL.
    pub fn with_namespace(mut self, namespace: ObjectNamespace) -> PolicyResult<Self> {
        namespace.validate()?;
        self.statements = StatementPlan::build(&namespace).statements().to_vec();
        self.verifier = StateVerifier::new(namespace.clone());
        self.namespace = namespace;
        Ok(self)
    }

    /// Replace the statement list.
    pub fn with_statements(mut self, statements: Vec<PolicyStatement>) -> Self {
        self.statements = statements;
        self
    }

    /// Use a custom applier.
    pub fn with_applier(mut self, applier: PolicyApplier) -> Self {
        self.applier = applier;
        self
    }

    /// Statements a run executes, in order.
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Namespace the run targets.
    pub fn namespace(&self) -> &ObjectNamespace {
        &self.namespace
    }

    /// Write the numbered plan without touching the store.
    ///
    /// # Returns
    ///
    /// Number of statements listed.
    pub fn dry_run(&self, reporter: &dyn Reporter) -> usize {
        for line in report::plan_lines(&self.statements) {
            reporter.emit(&line);
        }
        info!(statements = self.statements.len(), "Dry run, nothing applied");
        self.statements.len()
    }

    /// Execute one run.
    ///
    /// Never returns an error: every outcome, including a failed
    /// connection, is described by the returned [`RunReport`].
    #[instrument(
        skip(self, reporter),
        fields(
            run_id = tracing::field::Empty,
            backend = self.connector.backend(),
            store = %self.config.display_target(),
        )
    )]
    pub async fn run(&self, reporter: &dyn Reporter) -> RunReport {
        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let started_at = Utc::now();
        let mut phases = vec![RunPhase::Connecting];
        info!(statements = self.statements.len(), "Starting policy run");

        let mut store = match self.connector.connect(&self.config).await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Could not open policy store");
                phases.push(RunPhase::Failed);

                let report = RunReport {
                    run_id,
                    backend: self.connector.backend().to_string(),
                    target: self.config.display_target(),
                    started_at,
                    finished_at: Utc::now(),
                    status: RunStatus::Failed,
                    phases,
                    results: Vec::new(),
                    verification: None,
                    verification_error: None,
                    failure: Some(e.to_string()),
                };
                reporter.emit(&report::banner(&report));
                return report;
            }
        };

        phases.push(RunPhase::Applying);
        let results = self.applier.apply(&self.statements, store.as_mut()).await;

        phases.push(RunPhase::Verifying);
        let snapshot = self.verifier.read_state(store.as_mut()).await;
        let verification_error = snapshot.failure_summary();
        if let Some(e) = &verification_error {
            warn!(error = %e, "Could not confirm final state");
        }

        if let Err(e) = store.close().await {
            warn!(error = %e, "Failed to close policy store session");
        }

        phases.push(RunPhase::Reporting);
        phases.push(RunPhase::Succeeded);

        let report = RunReport {
            run_id,
            backend: self.connector.backend().to_string(),
            target: self.config.display_target(),
            started_at,
            finished_at: Utc::now(),
            status: RunStatus::Succeeded,
            phases,
            results,
            verification: Some(snapshot),
            verification_error,
            failure: None,
        };
        self.write_report(&report, reporter);

        info!(
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            verified = report.is_verified(),
            duration_ms = report.duration_ms(),
            "Policy run finished"
        );
        report
    }

    fn write_report(&self, report: &RunReport, reporter: &dyn Reporter) {
        let total = self.statements.len();
        for (statement, result) in self.statements.iter().zip(&report.results) {
            reporter.emit(&report::statement_line(statement, result, total));
        }

        if let Some(snapshot) = &report.verification {
            for line in report::verification_lines(snapshot) {
                reporter.emit(&line);
            }
        }

        reporter.emit(&report::banner(report));
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::memory::{Catalog, MemoryConnector, MemoryPolicyStore};
    use crate::report::MemoryReporter;

    fn orchestrator(store: MemoryPolicyStore) -> Orchestrator<MemoryConnector> {
        Orchestrator::new(MemoryConnector::new(store), StoreConfig::default())
    }

    #[tokio::test]
    async fn test_successful_run_walks_all_phases() {
        let store = MemoryPolicyStore::from_catalog(Catalog::seeded().with_bucket("documents", false));
        let reporter = MemoryReporter::new();

        let report = orchestrator(store.clone()).run(&reporter).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(
            report.phases,
            vec![
                RunPhase::Connecting,
                RunPhase::Applying,
                RunPhase::Verifying,
                RunPhase::Reporting,
                RunPhase::Succeeded
            ]
        );
        assert_eq!(report.results.len(), 28);
        assert_eq!(report.failed_count(), 0);
        assert!(report.is_verified());
        assert!(report.finished_at >= report.started_at);
        assert_eq!(report.backend, "memory");
        assert_eq!(store.sessions_closed(), 1);
        assert!(reporter.contains("Applied 28/28 statements"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_terminal() {
        let store = MemoryPolicyStore::new();
        let connector = MemoryConnector::refusing(store.clone(), "could not connect to server");
        let reporter = MemoryReporter::new();

        let report = Orchestrator::new(connector, StoreConfig::default())
            .run(&reporter)
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code(), 1);
        assert!(report.results.is_empty());
        assert_eq!(report.phases, vec![RunPhase::Connecting, RunPhase::Failed]);
        assert!(store.executed().await.is_empty());
        assert_eq!(store.sessions_closed(), 0);
        assert_eq!(
            reporter.lines(),
            vec!["Run failed: Connection failed: could not connect to server"]
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_terminal() {
        let config = StoreConfig {
            host: String::new(),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(MemoryConnector::new(MemoryPolicyStore::new()), config);

        let report = orchestrator.run(&MemoryReporter::new()).await;

        assert_eq!(report.exit_code(), 1);
        assert!(report.failure.unwrap().starts_with("Configuration error"));
    }

    #[tokio::test]
    async fn test_unreadable_policies_degrade_report() {
        let store = MemoryPolicyStore::from_catalog(Catalog::seeded().with_bucket("documents", false));
        store
            .fail_queries_matching("pg_policies", "permission denied for view pg_policies")
            .await;
        let reporter = MemoryReporter::new();

        let report = orchestrator(store.clone()).run(&reporter).await;

        assert_eq!(report.exit_code(), 0);
        assert!(!report.is_verified());
        assert_eq!(
            report.verification_error.as_deref(),
            Some("policies: Query failed: permission denied for view pg_policies")
        );
        assert!(reporter.contains(
            "Could not confirm final state of policies: Query failed: permission denied for view pg_policies"
        ));
        assert!(reporter.contains("  - documents (private)"));
        assert!(reporter.contains("final state unconfirmed"));
        assert_eq!(store.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_buckets_keep_policy_listing() {
        let store = MemoryPolicyStore::new();
        store
            .fail_queries_matching("storage.buckets", "permission denied for table buckets")
            .await;
        let reporter = MemoryReporter::new();

        let report = orchestrator(store).run(&reporter).await;

        let snapshot = report.verification.as_ref().unwrap();
        assert_eq!(snapshot.policies.len(), 12);
        assert!(snapshot.policies_error.is_none());
        assert_eq!(
            report.verification_error.as_deref(),
            Some("buckets: Query failed: permission denied for table buckets")
        );
        assert!(reporter.contains("Installed policies (12):"));
        assert!(reporter.contains("  - pet_photos_select (SELECT)"));
        assert!(!reporter.contains("Buckets ("));
        assert!(reporter.contains(
            "Could not confirm final state of buckets: Query failed: permission denied for table buckets"
        ));
        assert_eq!(
            reporter.lines().last().map(String::as_str),
            Some("Applied 28/28 statements; final state unconfirmed")
        );
    }

    #[test]
    fn test_with_namespace_rejects_bad_names() {
        let ns = ObjectNamespace {
            collection_tag: "pets'; --".into(),
            ..Default::default()
        };
        let result = orchestrator(MemoryPolicyStore::new()).with_namespace(ns);
        assert!(matches!(result, Err(crate::PolicyError::Namespace(_))));
    }

    #[test]
    fn test_dry_run_lists_plan() {
        let store = MemoryPolicyStore::new();
        let reporter = MemoryReporter::new();

        let count = orchestrator(store.clone()).dry_run(&reporter);

        assert_eq!(count, 28);
        assert_eq!(
            reporter.lines(),
            report::plan_lines(StatementPlan::build(&ObjectNamespace::default()).statements())
        );
        assert_eq!(store.sessions_opened(), 0);
    }

    #[test]
    fn test_exit_codes() {
        let mut report = RunReport {
            run_id: Uuid::now_v7(),
            backend: "memory".into(),
            target: "t".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            status: RunStatus::Succeeded,
            phases: vec![],
            results: vec![],
            verification: None,
            verification_error: None,
            failure: None,
        };
        assert_eq!(report.exit_code(), 0);
        report.status = RunStatus::Failed;
        assert_eq!(report.exit_code(), 1);
    }
}
