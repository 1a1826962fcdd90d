//! Statement application.
//!
//! Runs a statement sequence against a store, one statement at a time, and
//! records one [`ApplicationResult`] per statement. A rejected statement is
//! logged and recorded; it never stops the statements after it, and nothing
//! already applied is rolled back.

use serde::{Deserialize, Serialize};
use storage_policy_model::{PolicyStatement, StatementKind};
use tracing::{debug, warn};

use crate::error::RejectionKind;
use crate::store::PolicyStore;

/// Default length of an error summary, in characters.
pub const DEFAULT_SUMMARY_WIDTH: usize = 50;

/// Outcome of one statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationResult {
    /// 1-based position of the statement in the plan.
    pub statement_index: usize,

    /// What the statement does.
    pub kind: StatementKind,

    /// Function, table or policy the statement targets.
    pub target_name: String,

    /// Whether the store accepted the statement.
    pub succeeded: bool,

    /// Truncated store error, present iff the statement failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,

    /// Classification of the rejection, present iff the statement failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionKind>,
}

impl ApplicationResult {
    /// Result for an accepted statement.
    pub fn accepted(statement: &PolicyStatement) -> Self {
        Self {
            statement_index: statement.sequence_index,
            kind: statement.kind,
            target_name: statement.target_name.clone(),
            succeeded: true,
            error_summary: None,
            rejection: None,
        }
    }

    /// Result for a rejected statement.
    pub fn rejected(statement: &PolicyStatement, summary: String, kind: RejectionKind) -> Self {
        Self {
            statement_index: statement.sequence_index,
            kind: statement.kind,
            target_name: statement.target_name.clone(),
            succeeded: false,
            error_summary: Some(summary),
            rejection: Some(kind),
        }
    }

    /// A failure that leaves the catalog as intended (the object was
    /// already there).
    pub fn is_benign(&self) -> bool {
        self.rejection == Some(RejectionKind::AlreadyExists)
    }
}

/// Applies statement sequences to a [`PolicyStore`].
#[derive(Debug, Clone)]
pub struct PolicyApplier {
    summary_width: usize,
}

impl Default for PolicyApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyApplier {
    /// Create an applier with the default summary width.
    pub fn new() -> Self {
        Self {
            summary_width: DEFAULT_SUMMARY_WIDTH,
        }
    }

    /// Set the error summary width.
    pub fn with_summary_width(mut self, width: usize) -> Self {
        self.summary_width = width;
        self
    }

    /// Apply `statements` in order.
    ///
    /// # Arguments
    ///
    /// * `statements` - Statements to run, in the order given
    /// * `store` - Open store session
    ///
    /// # Returns
    ///
    /// One result per input statement, in input order. Never fails: every
    /// store error is captured in the corresponding result.
    pub async fn apply(
        &self,
        statements: &[PolicyStatement],
        store: &mut dyn PolicyStore,
    ) -> Vec<ApplicationResult> {
        let mut results = Vec::with_capacity(statements.len());

        for statement in statements {
            match store.execute(&statement.body).await {
                Ok(()) => {
                    debug!(
                        statement = statement.sequence_index,
                        kind = statement.kind.as_str(),
                        target_name = %statement.target_name,
                        "Statement applied"
                    );
                    results.push(ApplicationResult::accepted(statement));
                }
                Err(e) => {
                    let kind = e.rejection_kind().unwrap_or(RejectionKind::Other);
                    let summary = summarize(&e.detail(), self.summary_width);
                    warn!(
                        statement = statement.sequence_index,
                        kind = statement.kind.as_str(),
                        target_name = %statement.target_name,
                        rejection = kind.as_str(),
                        error = %e,
                        "Statement failed, continuing"
                    );
                    results.push(ApplicationResult::rejected(statement, summary, kind));
                }
            }
        }

        results
    }
}

/// Fold whitespace runs to single spaces and keep the first `width`
/// characters.
pub fn summarize(message: &str, width: usize) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(width)
        .collect()
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::memory::{Catalog, MemoryConnector, MemoryPolicyStore};
    use crate::store::StoreConnector;
    use storage_policy_model::{ObjectNamespace, StatementPlan};

    fn statement(index: usize, body: &str) -> PolicyStatement {
        PolicyStatement {
            sequence_index: index,
            kind: StatementKind::DefineFunction,
            target_name: format!("storage.f{}", index),
            body: body.to_string(),
            rule: None,
        }
    }

    async fn session(store: &MemoryPolicyStore) -> Box<dyn PolicyStore> {
        MemoryConnector::new(store.clone())
            .connect(&StoreConfig::default())
            .await
            .unwrap()
    }

    #[test]
    fn test_summarize_folds_and_truncates() {
        assert_eq!(summarize("a\n  b\tc", 50), "a b c");
        let long = "x".repeat(80);
        assert_eq!(summarize(&long, 50).chars().count(), 50);
        assert_eq!(summarize("", 50), "");
    }

    #[tokio::test]
    async fn test_apply_continues_past_failure() {
        let store = MemoryPolicyStore::new();
        store
            .reject_when("storage.f3", "permission denied for schema storage", Some("42501"))
            .await;
        let mut s = session(&store).await;

        let statements: Vec<_> = (1..=5)
            .map(|i| {
                statement(
                    i,
                    &format!(
                        "CREATE OR REPLACE FUNCTION storage.f{}() RETURNS INT AS $$ SELECT 1 $$ LANGUAGE sql;",
                        i
                    ),
                )
            })
            .collect();

        let results = PolicyApplier::new().apply(&statements, s.as_mut()).await;

        assert_eq!(results.len(), 5);
        let outcomes: Vec<bool> = results.iter().map(|r| r.succeeded).collect();
        assert_eq!(outcomes, vec![true, true, false, true, true]);
        assert_eq!(results[2].rejection, Some(RejectionKind::PermissionDenied));
        assert_eq!(
            results[2].error_summary.as_deref(),
            Some("permission denied for schema storage")
        );
        assert!(results[0].error_summary.is_none());
        assert_eq!(store.executed().await.len(), 5);

        let functions = store.catalog().await.functions;
        assert!(functions.contains("storage.f4"));
        assert!(!functions.contains("storage.f3"));
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;
        let plan = StatementPlan::build(&ObjectNamespace::default());

        let results = PolicyApplier::new().apply(plan.statements(), s.as_mut()).await;

        assert_eq!(results.len(), plan.len());
        for (result, stmt) in results.iter().zip(plan.statements()) {
            assert_eq!(result.statement_index, stmt.sequence_index);
            assert_eq!(result.kind, stmt.kind);
            assert_eq!(result.target_name, stmt.target_name);
        }
        assert!(results.iter().all(|r| r.succeeded), "{:?}", results);
    }

    #[tokio::test]
    async fn test_create_runs_even_when_drop_fails() {
        let store = MemoryPolicyStore::new();
        store
            .reject_when("DROP POLICY IF EXISTS \"documents_select\"", "lock timeout", None)
            .await;
        let mut s = session(&store).await;
        let plan = StatementPlan::build(&ObjectNamespace::default());

        let results = PolicyApplier::new().apply(plan.statements(), s.as_mut()).await;

        let drop = results
            .iter()
            .find(|r| r.kind == StatementKind::DropPolicy && r.target_name == "documents_select")
            .unwrap();
        let create = results
            .iter()
            .find(|r| r.kind == StatementKind::CreatePolicy && r.target_name == "documents_select")
            .unwrap();
        assert!(!drop.succeeded);
        assert_eq!(drop.rejection, Some(RejectionKind::Other));
        assert!(create.succeeded);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_benign() {
        let store =
            MemoryPolicyStore::from_catalog(Catalog::seeded().with_policy("p", "storage.objects", "SELECT"));
        let mut s = session(&store).await;
        let stmt = PolicyStatement {
            sequence_index: 1,
            kind: StatementKind::CreatePolicy,
            target_name: "p".to_string(),
            body: "CREATE POLICY \"p\" ON storage.objects FOR SELECT USING (true);".to_string(),
            rule: None,
        };

        let results = PolicyApplier::new()
            .with_summary_width(10)
            .apply(std::slice::from_ref(&stmt), s.as_mut())
            .await;

        assert!(!results[0].succeeded);
        assert!(results[0].is_benign());
        assert_eq!(results[0].error_summary.as_deref(), Some("policy \"p\""));
    }

    #[tokio::test]
    async fn test_apply_empty_sequence() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;
        let results = PolicyApplier::new().apply(&[], s.as_mut()).await;
        assert!(results.is_empty());
        assert!(store.executed().await.is_empty());
    }
}
