//! # Authorization Model
//!
//! Resource ownership resolution and the role/relationship predicates the
//! policy set is built from. The store evaluates the generated SQL form of
//! these predicates at request time; this module is the same logic in
//! Rust, evaluated against an [`IdentityDirectory`] so it can be checked
//! without a database.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::actions::PolicyAction;
use crate::buckets::{Bucket, BucketScope};
use crate::namespace::ObjectNamespace;

/// The identity attempting an action.
///
/// A caller without a subject is anonymous and is denied by every policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// Authenticated subject id (the auth provider's user id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Caller {
    /// An authenticated caller.
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
        }
    }

    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Self { subject: None }
    }

    /// Check if the caller carries an authenticated subject.
    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }
}

/// Lookups the predicates need from the identity store.
///
/// The store-side helpers answer these with joins over the identity and
/// relationship tables; tests answer them from [`MemoryDirectory`].
pub trait IdentityDirectory {
    /// Role attribute of the user record bound to `subject`, if any.
    fn role_of(&self, subject: &str) -> Option<String>;

    /// Whether a relationship record makes `subject` a tutor of `resource_id`.
    fn is_tutor_of(&self, subject: &str, resource_id: i32) -> bool;
}

impl<T: IdentityDirectory + ?Sized> IdentityDirectory for &T {
    fn role_of(&self, subject: &str) -> Option<String> {
        (**self).role_of(subject)
    }

    fn is_tutor_of(&self, subject: &str, resource_id: i32) -> bool {
        (**self).is_tutor_of(subject, resource_id)
    }
}

/// In-memory identity directory.
///
/// # Example
///
/// ```
/// use storage_policy_model::authorization::{IdentityDirectory, MemoryDirectory};
///
/// let directory = MemoryDirectory::new()
///     .with_role("auth-1", "admin")
///     .with_tutor("auth-2", 42);
///
/// assert_eq!(directory.role_of("auth-1"), Some("admin".to_string()));
/// assert!(directory.is_tutor_of("auth-2", 42));
/// assert!(!directory.is_tutor_of("auth-2", 7));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    roles: HashMap<String, String>,
    tutors: HashSet<(String, i32)>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a role to a subject.
    pub fn with_role(mut self, subject: impl Into<String>, role: impl Into<String>) -> Self {
        self.roles.insert(subject.into(), role.into());
        self
    }

    /// Record that a subject tutors a resource.
    pub fn with_tutor(mut self, subject: impl Into<String>, resource_id: i32) -> Self {
        self.tutors.insert((subject.into(), resource_id));
        self
    }
}

impl IdentityDirectory for MemoryDirectory {
    fn role_of(&self, subject: &str) -> Option<String> {
        self.roles.get(subject).cloned()
    }

    fn is_tutor_of(&self, subject: &str, resource_id: i32) -> bool {
        self.tutors.contains(&(subject.to_string(), resource_id))
    }
}

/// Condition a policy imposes on an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Any authenticated caller.
    Authenticated,
    /// Administrators only.
    Privileged,
    /// Administrators, or a tutor of the object's owning resource.
    PrivilegedOrRelated,
}

impl Requirement {
    /// The requirement for one bucket/action pair.
    ///
    /// Resource-scoped buckets are owner-or-admin for every action.
    /// Broadcast buckets are readable by anyone signed in and writable by
    /// administrators only.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::actions::PolicyAction;
    /// use storage_policy_model::authorization::Requirement;
    /// use storage_policy_model::buckets::Bucket;
    ///
    /// assert_eq!(
    ///     Requirement::for_rule(Bucket::WallMedia, PolicyAction::Select),
    ///     Requirement::Authenticated
    /// );
    /// assert_eq!(
    ///     Requirement::for_rule(Bucket::WallMedia, PolicyAction::Delete),
    ///     Requirement::Privileged
    /// );
    /// ```
    pub fn for_rule(bucket: Bucket, action: PolicyAction) -> Self {
        match bucket.scope() {
            BucketScope::ResourceScoped => Requirement::PrivilegedOrRelated,
            BucketScope::Broadcast if action.is_read_only() => Requirement::Authenticated,
            BucketScope::Broadcast => Requirement::Privileged,
        }
    }

    /// Whether evaluating this requirement consults the admin check.
    pub fn checks_privilege(&self) -> bool {
        !matches!(self, Requirement::Authenticated)
    }

    /// Whether evaluating this requirement resolves the object's owner.
    pub fn checks_relationship(&self) -> bool {
        matches!(self, Requirement::PrivilegedOrRelated)
    }
}

/// Resolve the resource id an object path belongs to.
///
/// Paths look like `<collection_tag>/<id>/...`. Anything else, including an
/// id that is not a valid 32-bit integer, resolves to `None`. As with
/// PostgreSQL's integer input, surrounding whitespace and a leading sign
/// are accepted.
///
/// # Example
///
/// ```
/// use storage_policy_model::authorization::resolve_owner;
///
/// assert_eq!(resolve_owner("pets/42/photo.png", "pets"), Some(42));
/// assert_eq!(resolve_owner("pets/abc/x", "pets"), None);
/// assert_eq!(resolve_owner("other/42", "pets"), None);
/// assert_eq!(resolve_owner("pets", "pets"), None);
/// ```
pub fn resolve_owner(path: &str, collection_tag: &str) -> Option<i32> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments[0] != collection_tag {
        return None;
    }

    segments[1]
        .trim_matches(|c: char| c.is_ascii_whitespace())
        .parse::<i32>()
        .ok()
}

/// Row-level authorization model over one object namespace.
///
/// # Example
///
/// ```
/// use storage_policy_model::actions::PolicyAction;
/// use storage_policy_model::authorization::{AuthorizationModel, Caller, MemoryDirectory};
/// use storage_policy_model::buckets::Bucket;
/// use storage_policy_model::namespace::ObjectNamespace;
///
/// let directory = MemoryDirectory::new().with_tutor("auth-7", 42);
/// let model = AuthorizationModel::new(ObjectNamespace::default(), directory);
///
/// let tutor = Caller::authenticated("auth-7");
/// assert!(model.authorize(Bucket::PetPhotos, PolicyAction::Select, &tutor, "pets/42/a.png"));
/// assert!(!model.authorize(Bucket::PetPhotos, PolicyAction::Select, &tutor, "pets/43/a.png"));
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationModel<D> {
    namespace: ObjectNamespace,
    directory: D,
}

impl<D: IdentityDirectory> AuthorizationModel<D> {
    /// Create a model for a namespace, backed by an identity directory.
    pub fn new(namespace: ObjectNamespace, directory: D) -> Self {
        Self {
            namespace,
            directory,
        }
    }

    /// The namespace this model governs.
    pub fn namespace(&self) -> &ObjectNamespace {
        &self.namespace
    }

    /// Resolve the owning resource of an object path in this namespace.
    pub fn resolve_owner(&self, path: &str) -> Option<i32> {
        resolve_owner(path, &self.namespace.collection_tag)
    }

    /// True iff the caller's role is the administrative role.
    pub fn is_privileged(&self, caller: &Caller) -> bool {
        match caller.subject.as_deref() {
            Some(subject) => self
                .directory
                .role_of(subject)
                .is_some_and(|role| role == self.namespace.admin_role),
            None => false,
        }
    }

    /// True iff the caller tutors the resource `owner_id`.
    ///
    /// An absent owner never relates to anyone.
    pub fn is_related(&self, caller: &Caller, owner_id: Option<i32>) -> bool {
        match (caller.subject.as_deref(), owner_id) {
            (Some(subject), Some(id)) => self.directory.is_tutor_of(subject, id),
            _ => false,
        }
    }

    /// Decide whether `caller` may perform `action` on the object at `path`
    /// in `bucket`.
    pub fn authorize(
        &self,
        bucket: Bucket,
        action: PolicyAction,
        caller: &Caller,
        path: &str,
    ) -> bool {
        if !caller.is_authenticated() {
            return false;
        }

        match Requirement::for_rule(bucket, action) {
            Requirement::Authenticated => true,
            Requirement::Privileged => self.is_privileged(caller),
            Requirement::PrivilegedOrRelated => {
                self.is_privileged(caller) || self.is_related(caller, self.resolve_owner(path))
            }
        }
    }
}
