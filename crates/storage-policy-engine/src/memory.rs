//! In-memory policy store.
//!
//! Interprets the subset of DDL the statement plan emits against an
//! in-process catalog, and answers the catalog queries the verifier runs.
//! It enforces the same rules PostgreSQL would for that subset: a policy
//! name is unique per table, a policy may only call functions that exist,
//! and `ALTER TABLE` needs the table to exist.
//!
//! Sessions opened from the same [`MemoryConnector`] share one catalog, so
//! repeated runs observe each other's effects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::error::{PolicyError, PolicyResult};
use crate::store::{PolicyStore, Row, StoreConnector};

/// A policy as the catalog records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPolicy {
    /// Policy name.
    pub name: String,
    /// Qualified table, e.g. `storage.objects`.
    pub table: String,
    /// Command keyword (`SELECT`, `INSERT`, `UPDATE`, `DELETE`, `ALL`).
    pub command: String,
}

/// A bucket row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogBucket {
    /// Bucket id.
    pub id: String,
    /// Bucket name.
    pub name: String,
    /// Whether objects are publicly readable.
    pub public: bool,
}

/// Catalog state held by the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// Qualified table names that exist.
    pub tables: BTreeSet<String>,
    /// Tables with row-level security enabled.
    pub row_security: BTreeSet<String>,
    /// Qualified function names that exist.
    pub functions: BTreeSet<String>,
    /// Policies, in creation order.
    pub policies: Vec<CatalogPolicy>,
    /// Bucket rows, in insertion order.
    pub buckets: Vec<CatalogBucket>,
}

impl Catalog {
    /// Catalog of a fresh hosted storage database: `storage.objects` and
    /// `storage.buckets` exist, and the `auth.uid()` and `auth.role()`
    /// helpers are defined. No buckets, no policies.
    pub fn seeded() -> Self {
        let mut catalog = Self::default();
        catalog.tables.insert("storage.objects".to_string());
        catalog.tables.insert("storage.buckets".to_string());
        catalog.functions.insert("auth.uid".to_string());
        catalog.functions.insert("auth.role".to_string());
        catalog
    }

    /// Add a bucket row.
    pub fn with_bucket(mut self, id: &str, public: bool) -> Self {
        self.buckets.push(CatalogBucket {
            id: id.to_string(),
            name: id.to_string(),
            public,
        });
        self
    }

    /// Add a pre-existing policy.
    pub fn with_policy(mut self, name: &str, table: &str, command: &str) -> Self {
        self.policies.push(CatalogPolicy {
            name: name.to_string(),
            table: table.to_string(),
            command: command.to_uppercase(),
        });
        self
    }

    /// Add a table.
    pub fn with_table(mut self, table: &str) -> Self {
        self.tables.insert(table.to_string());
        self
    }
}

/// A statement rejection injected by a test.
#[derive(Debug, Clone)]
struct InjectedRejection {
    pattern: String,
    message: String,
    sql_state: Option<String>,
}

/// A query failure injected by a test.
#[derive(Debug, Clone)]
struct InjectedQueryFailure {
    pattern: String,
    message: String,
}

#[derive(Debug, Default)]
struct Shared {
    catalog: RwLock<Catalog>,
    rejections: RwLock<Vec<InjectedRejection>>,
    query_failures: RwLock<Vec<InjectedQueryFailure>>,
    executed: RwLock<Vec<String>>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
}

/// In-memory policy store session.
///
/// Cloning yields another session over the same catalog.
#[derive(Debug, Clone)]
pub struct MemoryPolicyStore {
    shared: Arc<Shared>,
    closed: bool,
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPolicyStore {
    /// Create a store over [`Catalog::seeded`].
    pub fn new() -> Self {
        Self::from_catalog(Catalog::seeded())
    }

    /// Create a store over `catalog`.
    ///
    /// ```rust
    /// use storage_policy_engine::memory::{Catalog, MemoryPolicyStore};
    ///
    /// let store = MemoryPolicyStore::from_catalog(
    ///     Catalog::seeded().with_bucket("documents", false),
    /// );
    /// # let _ = store;
    /// ```
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog: RwLock::new(catalog),
                ..Default::default()
            }),
            closed: false,
        }
    }

    /// Reject every statement containing `pattern` with `message`.
    pub async fn reject_when(&self, pattern: &str, message: &str, sql_state: Option<&str>) {
        self.shared.rejections.write().await.push(InjectedRejection {
            pattern: pattern.to_string(),
            message: message.to_string(),
            sql_state: sql_state.map(str::to_string),
        });
    }

    /// Make every subsequent query fail with `message`.
    pub async fn fail_queries(&self, message: &str) {
        self.fail_queries_matching("", message).await;
    }

    /// Make every subsequent query containing `pattern` fail with `message`.
    pub async fn fail_queries_matching(&self, pattern: &str, message: &str) {
        self.shared.query_failures.write().await.push(InjectedQueryFailure {
            pattern: pattern.to_string(),
            message: message.to_string(),
        });
    }

    /// Snapshot of the catalog.
    pub async fn catalog(&self) -> Catalog {
        self.shared.catalog.read().await.clone()
    }

    /// Every statement passed to `execute`, accepted or not, in order.
    pub async fn executed(&self) -> Vec<String> {
        self.shared.executed.read().await.clone()
    }

    /// Number of sessions a connector opened over this store.
    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed.
    pub fn sessions_closed(&self) -> usize {
        self.shared.sessions_closed.load(Ordering::SeqCst)
    }

    fn session(&self) -> Self {
        self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: self.shared.clone(),
            closed: false,
        }
    }

    async fn injected_rejection(&self, statement: &str) -> Option<PolicyError> {
        let rejections = self.shared.rejections.read().await;
        rejections
            .iter()
            .find(|r| statement.contains(&r.pattern))
            .map(|r| PolicyError::StatementRejected {
                message: r.message.clone(),
                sql_state: r.sql_state.clone(),
            })
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn execute(&mut self, statement: &str) -> PolicyResult<()> {
        if self.closed {
            return Err(PolicyError::ConnectionClosed);
        }

        self.shared.executed.write().await.push(statement.to_string());

        if let Some(err) = self.injected_rejection(statement).await {
            return Err(err);
        }

        let mut catalog = self.shared.catalog.write().await;
        apply_statement(&mut catalog, statement)
    }

    async fn query(&mut self, sql: &str) -> PolicyResult<Vec<Row>> {
        if self.closed {
            return Err(PolicyError::ConnectionClosed);
        }
        if let Some(failure) = self
            .shared
            .query_failures
            .read()
            .await
            .iter()
            .find(|f| sql.contains(&f.pattern))
        {
            return Err(PolicyError::QueryFailed(failure.message.clone()));
        }

        let catalog = self.shared.catalog.read().await;
        answer_query(&catalog, sql)
    }

    async fn close(&mut self) -> PolicyResult<()> {
        if !self.closed {
            self.closed = true;
            self.shared.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Connector handing out sessions over one [`MemoryPolicyStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: MemoryPolicyStore,
    refusal: Option<String>,
}

impl MemoryConnector {
    /// Connector over `store`.
    pub fn new(store: MemoryPolicyStore) -> Self {
        Self {
            store,
            refusal: None,
        }
    }

    /// Connector whose every connect attempt fails with `message`.
    pub fn refusing(store: MemoryPolicyStore, message: &str) -> Self {
        Self {
            store,
            refusal: Some(message.to_string()),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &MemoryPolicyStore {
        &self.store
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, config: &StoreConfig) -> PolicyResult<Box<dyn PolicyStore>> {
        config.validate()?;
        if let Some(message) = &self.refusal {
            return Err(PolicyError::ConnectionFailed(message.clone()));
        }
        Ok(Box::new(self.store.session()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Statement interpretation
// ============================================================================

fn rejection(message: String, sql_state: &str) -> PolicyError {
    PolicyError::StatementRejected {
        message,
        sql_state: Some(sql_state.to_string()),
    }
}

fn apply_statement(catalog: &mut Catalog, statement: &str) -> PolicyResult<()> {
    let normalized = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized = normalized.trim_end_matches(';').trim_end();

    if let Some(rest) = strip_prefix_ci(normalized, "ALTER TABLE ") {
        return enable_row_security(catalog, rest);
    }
    if let Some(rest) = strip_prefix_ci(normalized, "CREATE OR REPLACE FUNCTION ") {
        return define_function(catalog, rest, true);
    }
    if let Some(rest) = strip_prefix_ci(normalized, "CREATE FUNCTION ") {
        return define_function(catalog, rest, false);
    }
    if let Some(rest) = strip_prefix_ci(normalized, "DROP POLICY IF EXISTS ") {
        return drop_policy(catalog, rest, true);
    }
    if let Some(rest) = strip_prefix_ci(normalized, "DROP POLICY ") {
        return drop_policy(catalog, rest, false);
    }
    if let Some(rest) = strip_prefix_ci(normalized, "CREATE POLICY ") {
        return create_policy(catalog, rest);
    }

    let near = normalized.split(' ').next().unwrap_or_default();
    Err(rejection(format!("syntax error at or near \"{}\"", near), "42601"))
}

fn enable_row_security(catalog: &mut Catalog, rest: &str) -> PolicyResult<()> {
    let (table, tail) = take_ident(rest)
        .ok_or_else(|| rejection("syntax error at end of input".to_string(), "42601"))?;
    if !tail.trim().eq_ignore_ascii_case("ENABLE ROW LEVEL SECURITY") {
        return Err(rejection(
            format!("syntax error at or near \"{}\"", tail.trim()),
            "42601",
        ));
    }
    if !catalog.tables.contains(&table) {
        return Err(rejection(
            format!("relation \"{}\" does not exist", table),
            "42P01",
        ));
    }
    catalog.row_security.insert(table);
    Ok(())
}

fn define_function(catalog: &mut Catalog, rest: &str, replace: bool) -> PolicyResult<()> {
    let end = rest
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(rest.len());
    if end == 0 || !rest[end..].starts_with('(') {
        return Err(rejection("syntax error at or near \"(\"".to_string(), "42601"));
    }
    let name = rest[..end].to_lowercase();
    if !replace && catalog.functions.contains(&name) {
        return Err(rejection(
            format!("function \"{}\" already exists with same argument types", name),
            "42723",
        ));
    }
    catalog.functions.insert(name);
    Ok(())
}

fn drop_policy(catalog: &mut Catalog, rest: &str, if_exists: bool) -> PolicyResult<()> {
    let (name, table) = policy_target(rest)?;
    let before = catalog.policies.len();
    catalog
        .policies
        .retain(|p| !(p.name == name && p.table == table));

    if catalog.policies.len() == before && !if_exists {
        return Err(rejection(
            format!(
                "policy \"{}\" for table \"{}\" does not exist",
                name,
                bare_table(&table)
            ),
            "42704",
        ));
    }
    Ok(())
}

fn create_policy(catalog: &mut Catalog, rest: &str) -> PolicyResult<()> {
    let (name, after_name) = take_ident(rest)
        .ok_or_else(|| rejection("syntax error at end of input".to_string(), "42601"))?;
    let after_on = strip_prefix_ci(after_name.trim_start(), "ON ")
        .ok_or_else(|| rejection("syntax error: expected ON".to_string(), "42601"))?;
    let (table, after_table) = take_ident(after_on)
        .ok_or_else(|| rejection("syntax error: expected table".to_string(), "42601"))?;
    let command = strip_prefix_ci(after_table.trim_start(), "FOR ")
        .and_then(|s| s.split(' ').next())
        .map(str::to_uppercase)
        .unwrap_or_else(|| "ALL".to_string());

    if !matches!(command.as_str(), "ALL" | "SELECT" | "INSERT" | "UPDATE" | "DELETE") {
        return Err(rejection(
            format!("syntax error at or near \"{}\"", command),
            "42601",
        ));
    }
    if !catalog.tables.contains(&table) {
        return Err(rejection(
            format!("relation \"{}\" does not exist", table),
            "42P01",
        ));
    }
    if catalog
        .policies
        .iter()
        .any(|p| p.name == name && p.table == table)
    {
        return Err(rejection(
            format!(
                "policy \"{}\" for table \"{}\" already exists",
                name,
                bare_table(&table)
            ),
            "42710",
        ));
    }
    for function in referenced_functions(after_table) {
        if !catalog.functions.contains(&function) {
            return Err(rejection(
                format!("function {}() does not exist", function),
                "42883",
            ));
        }
    }

    catalog.policies.push(CatalogPolicy {
        name,
        table,
        command,
    });
    Ok(())
}

fn policy_target(rest: &str) -> PolicyResult<(String, String)> {
    let (name, after_name) = take_ident(rest)
        .ok_or_else(|| rejection("syntax error at end of input".to_string(), "42601"))?;
    let after_on = strip_prefix_ci(after_name.trim_start(), "ON ")
        .ok_or_else(|| rejection("syntax error: expected ON".to_string(), "42601"))?;
    let (table, _) = take_ident(after_on)
        .ok_or_else(|| rejection("syntax error: expected table".to_string(), "42601"))?;
    Ok((name, table))
}

fn bare_table(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

/// Read a quoted or bare (possibly qualified) identifier.
fn take_ident(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    if let Some(quoted) = s.strip_prefix('"') {
        let end = quoted.find('"')?;
        return Some((quoted[..end].to_string(), &quoted[end + 1..]));
    }

    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].to_lowercase(), &s[end..]))
}

/// Schema-qualified function calls (`schema.name(`) in an expression.
fn referenced_functions(expr: &str) -> Vec<String> {
    let mut found = Vec::new();
    for (idx, _) in expr.match_indices('(') {
        let head = &expr[..idx];
        let start = head
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .map(|i| i + 1)
            .unwrap_or(0);
        let candidate = &head[start..];
        let mut parts = candidate.split('.');
        if let (Some(schema), Some(name), None) = (parts.next(), parts.next(), parts.next()) {
            if !schema.is_empty() && !name.is_empty() {
                found.push(candidate.to_lowercase());
            }
        }
    }
    found
}

// ============================================================================
// Query answering
// ============================================================================

fn answer_query(catalog: &Catalog, sql: &str) -> PolicyResult<Vec<Row>> {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = normalized.to_lowercase();

    let Some(from) = lower.split(" from ").nth(1) else {
        if lower.trim_end_matches(';') == "select 1" {
            return Ok(vec![vec![serde_json::json!(1)]]);
        }
        return Err(PolicyError::QueryFailed(format!(
            "unsupported query: {}",
            normalized
        )));
    };
    let source = from.split(' ').next().unwrap_or_default();

    if source == "pg_policies" {
        let schema = string_filter(&lower, "schemaname");
        let table = string_filter(&lower, "tablename");
        let rows = catalog
            .policies
            .iter()
            .filter(|p| {
                let (p_schema, p_table) = p.table.split_once('.').unwrap_or(("public", p.table.as_str()));
                schema.as_deref().map_or(true, |s| s == p_schema)
                    && table.as_deref().map_or(true, |t| t == p_table)
            })
            .map(|p| vec![serde_json::json!(p.name), serde_json::json!(p.command)])
            .collect();
        return Ok(rows);
    }

    if source.ends_with(".buckets") && catalog.tables.contains(source) {
        let rows = catalog
            .buckets
            .iter()
            .map(|b| {
                vec![
                    serde_json::json!(b.id),
                    serde_json::json!(b.name),
                    serde_json::json!(b.public),
                ]
            })
            .collect();
        return Ok(rows);
    }

    Err(PolicyError::QueryFailed(format!(
        "relation \"{}\" does not exist",
        source
    )))
}

/// Value of a `column = '<literal>'` filter in a lowercased query.
fn string_filter(query: &str, column: &str) -> Option<String> {
    let needle = format!("{} = '", column);
    let start = query.find(&needle)? + needle.len();
    let end = query[start..].find('\'')?;
    Some(query[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn session(store: &MemoryPolicyStore) -> Box<dyn PolicyStore> {
        MemoryConnector::new(store.clone())
            .connect(&StoreConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_drop_policy() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;

        s.execute("CREATE POLICY \"p1\" ON storage.objects FOR SELECT USING (true);")
            .await
            .unwrap();
        assert_eq!(store.catalog().await.policies.len(), 1);
        assert_eq!(store.catalog().await.policies[0].command, "SELECT");

        let err = s
            .execute("CREATE POLICY \"p1\" ON storage.objects FOR SELECT USING (true);")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        s.execute("DROP POLICY IF EXISTS \"p1\" ON storage.objects;").await.unwrap();
        s.execute("DROP POLICY IF EXISTS \"p1\" ON storage.objects;").await.unwrap();
        assert!(store.catalog().await.policies.is_empty());

        let err = s.execute("DROP POLICY \"p1\" ON storage.objects;").await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_policy_requires_referenced_functions() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;

        let create = "CREATE POLICY \"p\" ON storage.objects FOR DELETE USING (auth.role() = 'authenticated' AND storage.is_admin());";
        let err = s.execute(create).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Statement rejected: function storage.is_admin() does not exist"
        );

        s.execute("CREATE OR REPLACE FUNCTION storage.is_admin()\nRETURNS BOOLEAN AS $$ BEGIN RETURN true; END; $$ LANGUAGE plpgsql;")
            .await
            .unwrap();
        s.execute(create).await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_create_function_conflicts() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;
        s.execute("CREATE FUNCTION storage.f() RETURNS INT AS $$ SELECT 1 $$ LANGUAGE sql;")
            .await
            .unwrap();
        let err = s
            .execute("CREATE FUNCTION storage.f() RETURNS INT AS $$ SELECT 1 $$ LANGUAGE sql;")
            .await
            .unwrap_err();
        assert_eq!(err.rejection_kind(), Some(crate::error::RejectionKind::AlreadyExists));
    }

    #[tokio::test]
    async fn test_enable_row_security() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;
        s.execute("ALTER TABLE storage.objects ENABLE ROW LEVEL SECURITY;").await.unwrap();
        assert!(store.catalog().await.row_security.contains("storage.objects"));

        let err = s
            .execute("ALTER TABLE storage.missing ENABLE ROW LEVEL SECURITY;")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("relation \"storage.missing\" does not exist"));
    }

    #[tokio::test]
    async fn test_unknown_statement_is_syntax_error() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;
        let err = s.execute("GRANT ALL ON storage.objects TO anon;").await.unwrap_err();
        assert_eq!(err.rejection_kind(), Some(crate::error::RejectionKind::Syntax));
    }

    #[tokio::test]
    async fn test_injected_rejection() {
        let store = MemoryPolicyStore::new();
        store.reject_when("storage.objects", "permission denied for table objects", Some("42501")).await;
        let mut s = session(&store).await;
        let err = s
            .execute("ALTER TABLE storage.objects ENABLE ROW LEVEL SECURITY;")
            .await
            .unwrap_err();
        assert_eq!(
            err.rejection_kind(),
            Some(crate::error::RejectionKind::PermissionDenied)
        );
        assert!(store.catalog().await.row_security.is_empty());
        assert_eq!(store.executed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_policy_catalog_query_filters_namespace() {
        let store = MemoryPolicyStore::from_catalog(
            Catalog::seeded()
                .with_table("public.profiles")
                .with_policy("a", "storage.objects", "select")
                .with_policy("b", "public.profiles", "ALL"),
        );
        let mut s = session(&store).await;

        let rows = s
            .query("SELECT policyname::text, cmd::text FROM pg_policies WHERE schemaname = 'storage' AND tablename = 'objects' ORDER BY policyname")
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![serde_json::json!("a"), serde_json::json!("SELECT")]]);
    }

    #[tokio::test]
    async fn test_bucket_query() {
        let store = MemoryPolicyStore::from_catalog(
            Catalog::seeded()
                .with_bucket("wall-media", true)
                .with_bucket("documents", false),
        );
        let mut s = session(&store).await;
        let rows = s
            .query("SELECT id::text, name::text, public FROM storage.buckets ORDER BY name")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], serde_json::json!(true));

        let err = s.query("SELECT * FROM media.buckets").await.unwrap_err();
        assert!(matches!(err, PolicyError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let store = MemoryPolicyStore::new();
        let mut s = session(&store).await;
        s.close().await.unwrap();
        s.close().await.unwrap();
        assert_eq!(store.sessions_opened(), 1);
        assert_eq!(store.sessions_closed(), 1);
        assert!(matches!(
            s.execute("SELECT 1").await,
            Err(PolicyError::ConnectionClosed)
        ));
        assert!(matches!(s.query("SELECT 1").await, Err(PolicyError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_refusing_connector() {
        let connector = MemoryConnector::refusing(MemoryPolicyStore::new(), "connection refused");
        let Err(err) = connector.connect(&StoreConfig::default()).await else {
            panic!("connect should be refused");
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Connection failed: connection refused");
        assert_eq!(connector.store().sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_seeded_catalog_survives_shared_store() {
        let store = MemoryPolicyStore::from_catalog(
            Catalog::seeded()
                .with_bucket("documents", false)
                .with_policy("documents_select", "storage.objects", "SELECT"),
        );
        let other = store.clone();
        let catalog = other.shared.catalog.read().await;
        assert_eq!(catalog.buckets.len(), 1);
        drop(catalog);

        let mut s = session(&store).await;
        let rows = s
            .query("SELECT id::text, name::text, public FROM storage.buckets ORDER BY name")
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![
            serde_json::json!("documents"),
            serde_json::json!("documents"),
            serde_json::json!(false)
        ]]);
        assert_eq!(other.catalog().await.policies.len(), 1);
        assert!(Catalog::seeded().functions.contains("auth.uid"));
    }

    #[tokio::test]
    async fn test_query_failure_matches_pattern() {
        let store = MemoryPolicyStore::from_catalog(Catalog::seeded().with_policy(
            "a",
            "storage.objects",
            "SELECT",
        ));
        store
            .fail_queries_matching("storage.buckets", "permission denied for table buckets")
            .await;
        let mut s = session(&store).await;

        let rows = s
            .query("SELECT policyname::text, cmd::text FROM pg_policies WHERE schemaname = 'storage' AND tablename = 'objects'")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let err = s
            .query("SELECT id::text, name::text, public FROM storage.buckets ORDER BY name")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Query failed: permission denied for table buckets");
    }

    #[test]
    fn test_referenced_functions() {
        let found = referenced_functions(
            "USING (bucket_id = 'x' AND auth.role() = 'a' AND (storage.is_admin() OR storage.is_pet_tutor(storage.extract_pet_id(name))))",
        );
        assert_eq!(
            found,
            vec![
                "auth.role",
                "storage.is_admin",
                "storage.is_pet_tutor",
                "storage.extract_pet_id"
            ]
        );
    }

    #[test]
    fn test_take_ident() {
        assert_eq!(
            take_ident("\"My Policy\" ON t"),
            Some(("My Policy".to_string(), " ON t"))
        );
        assert_eq!(
            take_ident("Storage.Objects FOR"),
            Some(("storage.objects".to_string(), " FOR"))
        );
        assert_eq!(take_ident("(x"), None);
    }
}
