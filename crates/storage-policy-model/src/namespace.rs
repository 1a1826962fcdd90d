//! # Object Namespace
//!
//! Names of the database objects the policy set is installed on and reads
//! from. Every name here is interpolated into generated SQL, so the
//! namespace validates them before any statement is rendered.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamespaceError {
    /// A field is not a plain SQL identifier.
    #[error("Invalid identifier for {field}: {value:?}")]
    InvalidIdentifier {
        /// Namespace field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// The collection tag cannot be embedded in a SQL string literal.
    #[error("Invalid collection tag: {0:?}")]
    InvalidCollectionTag(String),
}

/// Where the managed policies live and which tables the helper
/// predicates consult.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectNamespace {
    /// Schema holding the object table and the helper functions.
    pub schema: String,

    /// Table the policies are attached to.
    pub table: String,

    /// First path segment of objects that belong to a resource.
    pub collection_tag: String,

    /// Qualified table mapping auth subjects to users and roles.
    pub identity_table: String,

    /// Qualified table joining users to the resources they tutor.
    pub relationship_table: String,

    /// Role value that grants administrative access.
    pub admin_role: String,
}

impl Default for ObjectNamespace {
    fn default() -> Self {
        Self {
            schema: "storage".to_string(),
            table: "objects".to_string(),
            collection_tag: "pets".to_string(),
            identity_table: "public.users".to_string(),
            relationship_table: "public.pet_tutors".to_string(),
            admin_role: "admin".to_string(),
        }
    }
}

impl ObjectNamespace {
    /// Qualified name of the policy-bearing table, e.g. `storage.objects`.
    pub fn table_ref(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Qualify a helper function name with the namespace schema.
    pub fn function_ref(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }

    /// Check every name before it is spliced into SQL.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::namespace::ObjectNamespace;
    ///
    /// assert!(ObjectNamespace::default().validate().is_ok());
    ///
    /// let mut ns = ObjectNamespace::default();
    /// ns.table = "objects; DROP TABLE users".to_string();
    /// assert!(ns.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), NamespaceError> {
        check_identifier("schema", &self.schema, false)?;
        check_identifier("table", &self.table, false)?;
        check_identifier("identity_table", &self.identity_table, true)?;
        check_identifier("relationship_table", &self.relationship_table, true)?;
        check_literal("admin_role", &self.admin_role)?;

        let tag_ok = !self.collection_tag.is_empty()
            && !self.collection_tag.contains('/')
            && self
                .collection_tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !tag_ok {
            return Err(NamespaceError::InvalidCollectionTag(
                self.collection_tag.clone(),
            ));
        }

        Ok(())
    }
}

fn check_identifier(field: &'static str, value: &str, qualified: bool) -> Result<(), NamespaceError> {
    let parts: Vec<&str> = value.split('.').collect();
    let shape_ok = if qualified {
        parts.len() == 2
    } else {
        parts.len() == 1
    };

    if shape_ok && parts.iter().all(|p| is_identifier(p)) {
        Ok(())
    } else {
        Err(NamespaceError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

fn check_literal(field: &'static str, value: &str) -> Result<(), NamespaceError> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(NamespaceError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
