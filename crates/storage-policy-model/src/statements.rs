//! # Policy Statements
//!
//! The fixed, ordered list of statements that (re)installs the policy set.
//!
//! ## Ordering
//!
//! ```text
//! 1        enable row-level security on the managed table
//! 2..4     helper functions (CREATE OR REPLACE)
//! 5..16    guarded drops, grouped per bucket
//! 17..28   creates, grouped per bucket
//! ```
//!
//! Policies reference the helpers, so helpers come first. Every create is
//! preceded by the guarded drop of the same policy, which is what makes a
//! second run converge to the same catalog state as the first.

use serde::{Deserialize, Serialize};

use crate::actions::PolicyAction;
use crate::authorization::Requirement;
use crate::buckets::Bucket;
use crate::namespace::ObjectNamespace;
use crate::sql;

/// What a statement does to the store's catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Turn on row-level security for the managed table.
    EnableRowSecurity,
    /// Define (or replace) a helper function.
    DefineFunction,
    /// Drop a policy if it exists.
    DropPolicy,
    /// Create a policy.
    CreatePolicy,
}

impl StatementKind {
    /// Short label used in reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::EnableRowSecurity => "enable_rls",
            StatementKind::DefineFunction => "function",
            StatementKind::DropPolicy => "drop_policy",
            StatementKind::CreatePolicy => "create_policy",
        }
    }
}

/// One bucket/action policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    /// Bucket the policy guards.
    pub bucket: Bucket,
    /// Action the policy gates.
    pub action: PolicyAction,
}

impl PolicyRule {
    /// Create a rule.
    pub fn new(bucket: Bucket, action: PolicyAction) -> Self {
        Self { bucket, action }
    }

    /// Policy name, `<bucket>_<action>` (e.g. `wall_media_insert`).
    pub fn name(&self) -> String {
        format!("{}_{}", self.bucket.policy_prefix(), self.action.as_str())
    }

    /// The requirement this policy enforces.
    pub fn requirement(&self) -> Requirement {
        Requirement::for_rule(self.bucket, self.action)
    }

    /// Every managed rule, bucket-major.
    pub fn all() -> Vec<Self> {
        Bucket::all()
            .into_iter()
            .flat_map(|bucket| {
                PolicyAction::all()
                    .into_iter()
                    .map(move |action| PolicyRule::new(bucket, action))
            })
            .collect()
    }
}

/// A single unit of work against the policy store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyStatement {
    /// 1-based position in the plan.
    pub sequence_index: usize,

    /// What the statement does.
    pub kind: StatementKind,

    /// Name of the function, table or policy the statement targets.
    pub target_name: String,

    /// SQL text sent to the store.
    pub body: String,

    /// Policy the statement drops or creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<PolicyRule>,
}

impl PolicyStatement {
    /// Single-line preview of the body, at most `width` characters.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::statements::{PolicyStatement, StatementKind};
    ///
    /// let stmt = PolicyStatement {
    ///     sequence_index: 1,
    ///     kind: StatementKind::DropPolicy,
    ///     target_name: "documents_select".to_string(),
    ///     body: "DROP POLICY IF EXISTS\n  \"documents_select\" ON storage.objects;".to_string(),
    ///     rule: None,
    /// };
    /// assert_eq!(stmt.preview(22), "DROP POLICY IF EXISTS ");
    /// ```
    pub fn preview(&self, width: usize) -> String {
        let folded = self.body.split_whitespace().collect::<Vec<_>>().join(" ");
        folded.chars().take(width).collect()
    }
}

/// The ordered statement list for one namespace.
///
/// Built once; exposes its statements read-only.
#[derive(Debug, Clone, Serialize)]
pub struct StatementPlan {
    statements: Vec<PolicyStatement>,
}

impl StatementPlan {
    /// Build the full plan for `ns`.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::namespace::ObjectNamespace;
    /// use storage_policy_model::statements::{StatementKind, StatementPlan};
    ///
    /// let plan = StatementPlan::build(&ObjectNamespace::default());
    /// assert_eq!(plan.len(), 28);
    /// assert_eq!(plan.statements()[0].kind, StatementKind::EnableRowSecurity);
    /// ```
    pub fn build(ns: &ObjectNamespace) -> Self {
        let mut entries: Vec<(StatementKind, String, String, Option<PolicyRule>)> = Vec::new();

        entries.push((
            StatementKind::EnableRowSecurity,
            ns.table_ref(),
            sql::enable_row_security(ns),
            None,
        ));

        for (name, body) in [
            (sql::OWNER_FUNCTION, sql::owner_function(ns)),
            (sql::ADMIN_FUNCTION, sql::admin_function(ns)),
            (sql::TUTOR_FUNCTION, sql::tutor_function(ns)),
        ] {
            entries.push((StatementKind::DefineFunction, ns.function_ref(name), body, None));
        }

        let rules = PolicyRule::all();
        for rule in &rules {
            let name = rule.name();
            let body = sql::drop_policy(&name, ns);
            entries.push((StatementKind::DropPolicy, name, body, Some(*rule)));
        }
        for rule in &rules {
            let name = rule.name();
            let body = sql::create_policy(&name, rule.bucket, rule.action, ns);
            entries.push((StatementKind::CreatePolicy, name, body, Some(*rule)));
        }

        let statements = entries
            .into_iter()
            .enumerate()
            .map(|(i, (kind, target_name, body, rule))| PolicyStatement {
                sequence_index: i + 1,
                kind,
                target_name,
                body,
                rule,
            })
            .collect();

        Self { statements }
    }

    /// Statements in execution order.
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Check if the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Names of the policies the plan installs, in creation order.
    pub fn policy_names(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.kind == StatementKind::CreatePolicy)
            .map(|s| s.target_name.as_str())
            .collect()
    }
}
