//! # Buckets
//!
//! Defines the storage buckets that carry their own policy set.
//! Buckets are grouped by who their content is meant for.

use serde::{Deserialize, Serialize};

/// Audience a bucket's content is meant for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BucketScope {
    /// Private per-resource content: owner-or-admin for every action.
    ResourceScoped,
    /// Content broadcast to every signed-in user, curated by admins.
    Broadcast,
}

/// Storage buckets with a managed policy set.
///
/// - **PetPhotos**: photos attached to a pet profile
/// - **Documents**: files attached to a pet (vaccination cards, exams)
/// - **WallMedia**: media posted to the shared wall
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    /// `pet-photos` bucket.
    PetPhotos,
    /// `documents` bucket.
    Documents,
    /// `wall-media` bucket.
    WallMedia,
}

impl Bucket {
    /// Get the bucket id as stored in `storage.objects.bucket_id`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::PetPhotos => "pet-photos",
            Bucket::Documents => "documents",
            Bucket::WallMedia => "wall-media",
        }
    }

    /// Prefix used for this bucket's policy names.
    ///
    /// Policy names are SQL identifiers, so the bucket id's `-` becomes `_`.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::buckets::Bucket;
    ///
    /// assert_eq!(Bucket::PetPhotos.policy_prefix(), "pet_photos");
    /// assert_eq!(Bucket::Documents.policy_prefix(), "documents");
    /// ```
    pub fn policy_prefix(&self) -> &'static str {
        match self {
            Bucket::PetPhotos => "pet_photos",
            Bucket::Documents => "documents",
            Bucket::WallMedia => "wall_media",
        }
    }

    /// Parse a bucket from its id or its policy prefix.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pet-photos" | "pet_photos" => Some(Bucket::PetPhotos),
            "documents" => Some(Bucket::Documents),
            "wall-media" | "wall_media" => Some(Bucket::WallMedia),
            _ => None,
        }
    }

    /// Get all managed buckets, in the order their policies are generated.
    pub fn all() -> [Self; 3] {
        [Bucket::PetPhotos, Bucket::Documents, Bucket::WallMedia]
    }

    /// Get the audience this bucket serves.
    ///
    /// # Example
    ///
    /// ```
    /// use storage_policy_model::buckets::{Bucket, BucketScope};
    ///
    /// assert_eq!(Bucket::Documents.scope(), BucketScope::ResourceScoped);
    /// assert_eq!(Bucket::WallMedia.scope(), BucketScope::Broadcast);
    /// ```
    pub fn scope(&self) -> BucketScope {
        match self {
            Bucket::PetPhotos | Bucket::Documents => BucketScope::ResourceScoped,
            Bucket::WallMedia => BucketScope::Broadcast,
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_ids() {
        assert_eq!(Bucket::PetPhotos.as_str(), "pet-photos");
        assert_eq!(Bucket::Documents.as_str(), "documents");
        assert_eq!(Bucket::WallMedia.as_str(), "wall-media");
    }

    #[test]
    fn test_bucket_parse_accepts_id_and_prefix() {
        for bucket in Bucket::all() {
            assert_eq!(Bucket::parse(bucket.as_str()), Some(bucket));
            assert_eq!(Bucket::parse(bucket.policy_prefix()), Some(bucket));
        }
        assert_eq!(Bucket::parse("avatars"), None);
    }

    #[test]
    fn test_policy_prefix_is_identifier_safe() {
        for bucket in Bucket::all() {
            assert!(bucket
                .policy_prefix()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_bucket_scope() {
        assert_eq!(Bucket::PetPhotos.scope(), BucketScope::ResourceScoped);
        assert_eq!(Bucket::Documents.scope(), BucketScope::ResourceScoped);
        assert_eq!(Bucket::WallMedia.scope(), BucketScope::Broadcast);
    }
}
