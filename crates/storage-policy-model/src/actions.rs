//! # Actions
//!
//! Defines the row-level actions a storage policy can gate.
//! Each action maps onto one PostgreSQL policy command.

use serde::{Deserialize, Serialize};

/// Actions a caller can attempt on a stored object.
///
/// These mirror the commands PostgreSQL row-level security distinguishes:
/// - **Select**: Read/download an object
/// - **Insert**: Upload a new object
/// - **Update**: Overwrite or move an existing object
/// - **Delete**: Remove an object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Read an object.
    ///
    /// Gated by the policy's `USING` expression.
    Select,

    /// Create a new object.
    ///
    /// Gated by the policy's `WITH CHECK` expression.
    Insert,

    /// Modify an existing object.
    ///
    /// Gated by the policy's `USING` expression.
    Update,

    /// Remove an object.
    ///
    /// Gated by the policy's `USING` expression.
    Delete,
}

/// The clause a policy uses to carry its predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyClause {
    /// `USING (...)`: filters rows visible to the command.
    Using,
    /// `WITH CHECK (...)`: validates rows being written.
    WithCheck,
}

impl PolicyClause {
    /// SQL keyword(s) introducing the clause.
    pub fn keyword(&self) -> &'static str {
        match self {
            PolicyClause::Using => "USING",
            PolicyClause::WithCheck => "WITH CHECK",
        }
    }
}

impl PolicyAction {
    /// Get the string representation of the action.
    ///
    /// This is also the suffix used in policy names (`<bucket>_<action>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Select => "select",
            PolicyAction::Insert => "insert",
            PolicyAction::Update => "update",
            PolicyAction::Delete => "delete",
        }
    }

    /// The SQL command keyword used in `CREATE POLICY ... FOR <command>`.
    ///
    /// This is also how `pg_policies.cmd` reports the action.
    pub fn sql_command(&self) -> &'static str {
        match self {
            PolicyAction::Select => "SELECT",
            PolicyAction::Insert => "INSERT",
            PolicyAction::Update => "UPDATE",
            PolicyAction::Delete => "DELETE",
        }
    }

    /// Parse action from string representation.
    ///
    /// # Arguments
    ///
    /// * `s` - String to parse (case-insensitive, supports aliases)
    ///
    /// # Returns
    ///
    /// `Some(PolicyAction)` if valid, `None` otherwise
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::actions::PolicyAction;
    ///
    /// assert_eq!(PolicyAction::parse("select"), Some(PolicyAction::Select));
    /// assert_eq!(PolicyAction::parse("SELECT"), Some(PolicyAction::Select));
    /// assert_eq!(PolicyAction::parse("upload"), Some(PolicyAction::Insert));
    /// assert_eq!(PolicyAction::parse("all"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "select" | "read" | "download" => Some(PolicyAction::Select),
            "insert" | "create" | "upload" => Some(PolicyAction::Insert),
            "update" | "modify" | "move" => Some(PolicyAction::Update),
            "delete" | "remove" => Some(PolicyAction::Delete),
            _ => None,
        }
    }

    /// Get all actions, in the order policies are generated.
    pub fn all() -> [Self; 4] {
        [
            PolicyAction::Select,
            PolicyAction::Insert,
            PolicyAction::Update,
            PolicyAction::Delete,
        ]
    }

    /// The clause this action's policy carries its predicate in.
    ///
    /// PostgreSQL rejects a `USING` expression on `INSERT` policies; the
    /// other commands filter existing rows.
    pub fn clause(&self) -> PolicyClause {
        match self {
            PolicyAction::Insert => PolicyClause::WithCheck,
            _ => PolicyClause::Using,
        }
    }

    /// Check if this is a read-only action.
    pub fn is_read_only(&self) -> bool {
        matches!(self, PolicyAction::Select)
    }

    /// Check if this action creates, changes or removes objects.
    pub fn is_write(&self) -> bool {
        !self.is_read_only()
    }
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
