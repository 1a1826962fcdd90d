//! Post-application state verification.
//!
//! After the plan has run, the verifier reads the store's catalog back and
//! reports what is actually installed:
//!
//! - **Policies**: every policy on the managed table, with its command
//! - **Buckets**: every bucket, with its public flag
//!
//! The two listings are independent: [`StateVerifier::read_state`] keeps
//! whichever one succeeded and records why the other failed.
//!
//! Verification is read-only and can be repeated. It reports what it sees;
//! deciding whether that matches the plan is left to the caller (see
//! [`VerificationSnapshot::missing_policies`]).
//!
//! ## Usage
//!
//! ```rust
//! use storage_policy_engine::config::StoreConfig;
//! use storage_policy_engine::memory::{Catalog, MemoryConnector, MemoryPolicyStore};
//! use storage_policy_engine::store::StoreConnector;
//! use storage_policy_engine::verifier::StateVerifier;
//! use storage_policy_model::ObjectNamespace;
//!
//! # tokio_test_block(async {
//! let store = MemoryPolicyStore::from_catalog(Catalog::seeded().with_bucket("documents", false));
//! let connector = MemoryConnector::new(store);
//! let mut store = connector.connect(&StoreConfig::default()).await.unwrap();
//!
//! let verifier = StateVerifier::new(ObjectNamespace::default());
//! let snapshot = verifier.snapshot(store.as_mut()).await.unwrap();
//! assert!(snapshot.policies.is_empty());
//! assert_eq!(snapshot.buckets[0].name, "documents");
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_policy_model::{ObjectNamespace, PolicyAction};
use tracing::{debug, instrument, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::store::{PolicyStore, Row};

/// A policy found on the managed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPolicy {
    /// Policy name.
    pub name: String,

    /// Command the policy gates, as the catalog reports it
    /// (`SELECT`, `INSERT`, `UPDATE`, `DELETE` or `ALL`).
    pub action: String,
}

impl InstalledPolicy {
    /// The gated action, or `None` for `ALL` policies.
    pub fn parsed_action(&self) -> Option<PolicyAction> {
        PolicyAction::parse(&self.action)
    }
}

/// A storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket id.
    pub id: String,

    /// Bucket name.
    pub name: String,

    /// Whether objects are publicly readable.
    pub is_public: bool,
}

/// What the store reported after application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    /// When the catalog was read.
    pub captured_at: DateTime<Utc>,

    /// Installed policies, sorted by name.
    pub policies: Vec<InstalledPolicy>,

    /// Buckets, sorted by name.
    pub buckets: Vec<BucketInfo>,

    /// Why the policy listing could not be read; `policies` is empty then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies_error: Option<String>,

    /// Why the bucket listing could not be read; `buckets` is empty then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets_error: Option<String>,
}

impl VerificationSnapshot {
    /// Whether both listings were read.
    pub fn is_complete(&self) -> bool {
        self.policies_error.is_none() && self.buckets_error.is_none()
    }

    /// Failed listings as `part: error`, joined with `; `.
    pub fn failure_summary(&self) -> Option<String> {
        let failures: Vec<String> = [("policies", &self.policies_error), ("buckets", &self.buckets_error)]
            .into_iter()
            .filter_map(|(part, error)| error.as_ref().map(|e| format!("{}: {}", part, e)))
            .collect();
        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }

    /// Installed policy names, sorted.
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name.as_str()).collect()
    }

    /// Names from `expected` that are not installed.
    pub fn missing_policies<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|name| !self.policies.iter().any(|p| p.name == *name))
            .collect()
    }

    /// Check whether two complete snapshots saw the same catalog state.
    pub fn same_state(&self, other: &VerificationSnapshot) -> bool {
        self.is_complete()
            && other.is_complete()
            && self.policies == other.policies
            && self.buckets == other.buckets
    }
}

/// Reads installed policies and buckets back from the store.
#[derive(Debug, Clone)]
pub struct StateVerifier {
    namespace: ObjectNamespace,
}

impl StateVerifier {
    /// Create a verifier for `namespace`.
    pub fn new(namespace: ObjectNamespace) -> Self {
        Self { namespace }
    }

    /// Catalog query listing the managed table's policies.
    pub fn policies_query(&self) -> String {
        format!(
            "SELECT policyname::text, cmd::text FROM pg_policies \
             WHERE schemaname = '{}' AND tablename = '{}' ORDER BY policyname",
            self.namespace.schema, self.namespace.table
        )
    }

    /// Catalog query listing buckets.
    pub fn buckets_query(&self) -> String {
        format!(
            "SELECT id::text, name::text, public FROM {}.buckets ORDER BY name",
            self.namespace.schema
        )
    }

    /// List policies on the managed table, sorted by name.
    #[instrument(skip(self, store))]
    pub async fn list_policies(&self, store: &mut dyn PolicyStore) -> PolicyResult<Vec<InstalledPolicy>> {
        let rows = store.query(&self.policies_query()).await?;

        let mut policies = rows
            .iter()
            .map(|row| {
                Ok(InstalledPolicy {
                    name: text_cell(row, 0, "policyname")?,
                    action: text_cell(row, 1, "cmd")?,
                })
            })
            .collect::<PolicyResult<Vec<_>>>()?;
        policies.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = policies.len(), "Listed policies");
        Ok(policies)
    }

    /// List buckets, sorted by name.
    #[instrument(skip(self, store))]
    pub async fn list_buckets(&self, store: &mut dyn PolicyStore) -> PolicyResult<Vec<BucketInfo>> {
        let rows = store.query(&self.buckets_query()).await?;

        let mut buckets = rows
            .iter()
            .map(|row| {
                Ok(BucketInfo {
                    id: text_cell(row, 0, "id")?,
                    name: text_cell(row, 1, "name")?,
                    is_public: bool_cell(row, 2, "public")?,
                })
            })
            .collect::<PolicyResult<Vec<_>>>()?;
        buckets.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = buckets.len(), "Listed buckets");
        Ok(buckets)
    }

    /// Read policies then buckets into one snapshot.
    ///
    /// # Errors
    ///
    /// Fails with the first listing error. Use [`Self::read_state`] to keep
    /// a listing when the other one fails.
    pub async fn snapshot(&self, store: &mut dyn PolicyStore) -> PolicyResult<VerificationSnapshot> {
        let policies = self.list_policies(store).await?;
        let buckets = self.list_buckets(store).await?;

        Ok(VerificationSnapshot {
            captured_at: Utc::now(),
            policies,
            buckets,
            policies_error: None,
            buckets_error: None,
        })
    }

    /// Read policies then buckets, each on its own.
    ///
    /// Never fails: a listing that cannot be read is left empty and its
    /// error is recorded on the snapshot.
    pub async fn read_state(&self, store: &mut dyn PolicyStore) -> VerificationSnapshot {
        let (policies, policies_error) = match self.list_policies(store).await {
            Ok(policies) => (policies, None),
            Err(e) => {
                warn!(error = %e, "Could not list policies");
                (Vec::new(), Some(e.to_string()))
            }
        };
        let (buckets, buckets_error) = match self.list_buckets(store).await {
            Ok(buckets) => (buckets, None),
            Err(e) => {
                warn!(error = %e, "Could not list buckets");
                (Vec::new(), Some(e.to_string()))
            }
        };

        VerificationSnapshot {
            captured_at: Utc::now(),
            policies,
            buckets,
            policies_error,
            buckets_error,
        }
    }
}

fn cell<'a>(row: &'a Row, index: usize, column: &str) -> PolicyResult<&'a serde_json::Value> {
    row.get(index).ok_or_else(|| {
        PolicyError::VerificationFailed(format!(
            "row has {} columns, expected `{}` at position {}",
            row.len(),
            column,
            index
        ))
    })
}

fn text_cell(row: &Row, index: usize, column: &str) -> PolicyResult<String> {
    match cell(row, index, column)? {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(PolicyError::VerificationFailed(format!(
            "column `{}` is not text: {}",
            column, other
        ))),
    }
}

fn bool_cell(row: &Row, index: usize, column: &str) -> PolicyResult<bool> {
    match cell(row, index, column)? {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::String(s) if s == "t" || s == "true" => Ok(true),
        serde_json::Value::String(s) if s == "f" || s == "false" => Ok(false),
        other => Err(PolicyError::VerificationFailed(format!(
            "column `{}` is not boolean: {}",
            column, other
        ))),
    }
}
