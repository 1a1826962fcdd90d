//! SQL rendering for the policy set.
//!
//! Each helper function here is the store-side twin of a predicate in
//! [`crate::authorization`]; [`predicate`] turns a [`Requirement`] into the
//! boolean expression a policy carries.

use crate::actions::PolicyAction;
use crate::authorization::Requirement;
use crate::buckets::Bucket;
use crate::namespace::ObjectNamespace;

/// Helper resolving an object name to its owning resource id.
pub const OWNER_FUNCTION: &str = "extract_pet_id";

/// Helper checking the caller's administrative role.
pub const ADMIN_FUNCTION: &str = "is_admin";

/// Helper checking the caller's tutor relationship to a resource.
pub const TUTOR_FUNCTION: &str = "is_pet_tutor";

/// `ALTER TABLE ... ENABLE ROW LEVEL SECURITY` for the managed table.
pub fn enable_row_security(ns: &ObjectNamespace) -> String {
    format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY;", ns.table_ref())
}

/// Owner resolution helper. Any cast failure yields `NULL`.
pub fn owner_function(ns: &ObjectNamespace) -> String {
    format!(
        r#"CREATE OR REPLACE FUNCTION {name}(file_path TEXT)
RETURNS INTEGER AS $$
DECLARE
  parts TEXT[];
BEGIN
  parts := string_to_array(file_path, '/');
  IF array_length(parts, 1) >= 2 AND parts[1] = '{tag}' THEN
    RETURN parts[2]::INTEGER;
  END IF;
  RETURN NULL;
EXCEPTION WHEN OTHERS THEN
  RETURN NULL;
END;
$$ LANGUAGE plpgsql IMMUTABLE;"#,
        name = ns.function_ref(OWNER_FUNCTION),
        tag = ns.collection_tag,
    )
}

/// Administrative role helper.
pub fn admin_function(ns: &ObjectNamespace) -> String {
    format!(
        r#"CREATE OR REPLACE FUNCTION {name}()
RETURNS BOOLEAN AS $$
BEGIN
  RETURN EXISTS (
    SELECT 1 FROM {users}
    WHERE auth_id = auth.uid()::text
    AND role = '{role}'
  );
END;
$$ LANGUAGE plpgsql SECURITY DEFINER;"#,
        name = ns.function_ref(ADMIN_FUNCTION),
        users = ns.identity_table,
        role = ns.admin_role,
    )
}

/// Tutor relationship helper (caller -> user record -> tutor record -> resource).
pub fn tutor_function(ns: &ObjectNamespace) -> String {
    format!(
        r#"CREATE OR REPLACE FUNCTION {name}(pet_id_param INTEGER)
RETURNS BOOLEAN AS $$
BEGIN
  RETURN EXISTS (
    SELECT 1 FROM {tutors} pt
    JOIN {users} u ON pt.tutor_id = u.id
    WHERE pt.pet_id = pet_id_param
    AND u.auth_id = auth.uid()::text
  );
END;
$$ LANGUAGE plpgsql SECURITY DEFINER;"#,
        name = ns.function_ref(TUTOR_FUNCTION),
        tutors = ns.relationship_table,
        users = ns.identity_table,
    )
}

/// Guarded drop, safe to run whether or not the policy exists.
pub fn drop_policy(name: &str, ns: &ObjectNamespace) -> String {
    format!("DROP POLICY IF EXISTS \"{}\" ON {};", name, ns.table_ref())
}

/// Boolean expression enforcing `requirement` for objects in `bucket`.
///
/// # Example
///
/// ```
/// use storage_policy_model::authorization::Requirement;
/// use storage_policy_model::buckets::Bucket;
/// use storage_policy_model::namespace::ObjectNamespace;
/// use storage_policy_model::sql::predicate;
///
/// let expr = predicate(Bucket::WallMedia, Requirement::Authenticated, &ObjectNamespace::default());
/// assert_eq!(expr, "bucket_id = 'wall-media' AND auth.role() = 'authenticated'");
/// ```
pub fn predicate(bucket: Bucket, requirement: Requirement, ns: &ObjectNamespace) -> String {
    let base = format!(
        "bucket_id = '{}' AND auth.role() = 'authenticated'",
        bucket.as_str()
    );
    let admin = format!("{}()", ns.function_ref(ADMIN_FUNCTION));

    match requirement {
        Requirement::Authenticated => base,
        Requirement::Privileged => format!("{} AND {}", base, admin),
        Requirement::PrivilegedOrRelated => format!(
            "{} AND ({} OR {}({}(name)))",
            base,
            admin,
            ns.function_ref(TUTOR_FUNCTION),
            ns.function_ref(OWNER_FUNCTION),
        ),
    }
}

/// `CREATE POLICY` for one bucket/action pair.
pub fn create_policy(name: &str, bucket: Bucket, action: PolicyAction, ns: &ObjectNamespace) -> String {
    format!(
        "CREATE POLICY \"{name}\" ON {table}\nFOR {command} {clause} (\n  {expr}\n);",
        name = name,
        table = ns.table_ref(),
        command = action.sql_command(),
        clause = action.clause().keyword(),
        expr = predicate(bucket, Requirement::for_rule(bucket, action), ns),
    )
}
