//! # Storage Policy Model
//!
//! This crate defines the row-level authorization model for the object
//! storage namespace, and the fixed statement plan that installs it.
//!
//! ## Overview
//!
//! The storage-policy-model crate handles:
//! - **Buckets**: Storage partitions with their own policy set
//! - **Actions**: Row-level commands a policy gates (select/insert/update/delete)
//! - **Authorization**: Owner resolution, role and relationship predicates
//! - **Statements**: The ordered SQL plan that installs helpers and policies
//!
//! Nothing here performs I/O. Applying the plan is the job of
//! `storage-policy-engine`.
//!
//! ## Ownership
//!
//! ```text
//! pets/42/photo.png
//! ^^^^ ^^
//! |    resource id (INTEGER), owner of the object
//! collection tag
//! ```
//!
//! ## Authorization Table
//!
//! | bucket     | select                 | insert / update / delete |
//! |------------|------------------------|--------------------------|
//! | pet-photos | admin OR tutor(owner)  | admin OR tutor(owner)    |
//! | documents  | admin OR tutor(owner)  | admin OR tutor(owner)    |
//! | wall-media | any authenticated user | admin                    |
//!
//! ## Usage
//!
//! ```rust
//! use storage_policy_model::{
//!     AuthorizationModel, Bucket, Caller, MemoryDirectory, ObjectNamespace, PolicyAction,
//!     StatementPlan,
//! };
//!
//! let directory = MemoryDirectory::new().with_role("auth-1", "admin");
//! let model = AuthorizationModel::new(ObjectNamespace::default(), directory);
//!
//! let admin = Caller::authenticated("auth-1");
//! assert!(model.authorize(Bucket::WallMedia, PolicyAction::Insert, &admin, "wall/a.png"));
//!
//! let plan = StatementPlan::build(model.namespace());
//! assert_eq!(plan.policy_names().len(), 12);
//! ```

pub mod actions;
pub mod authorization;
pub mod buckets;
pub mod namespace;
pub mod sql;
pub mod statements;

// Re-export main types for convenience
pub use actions::{PolicyAction, PolicyClause};
pub use authorization::{
    resolve_owner, AuthorizationModel, Caller, IdentityDirectory, MemoryDirectory, Requirement,
};
pub use buckets::{Bucket, BucketScope};
pub use namespace::{NamespaceError, ObjectNamespace};
pub use statements::{PolicyRule, PolicyStatement, StatementKind, StatementPlan};
