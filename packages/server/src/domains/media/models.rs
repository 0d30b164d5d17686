//! Media attachment and upload-grant models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{AttachmentId, GrantId};

/// The entity type a media attachment belongs to. Exactly one owner per
/// attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaOwnerKind {
    Post,
    Comment,
    Profile,
    Chat,
    JobPosting,
    ProfileExperience,
}

impl MediaOwnerKind {
    /// Every owner kind, in sweep order.
    pub const ALL: [MediaOwnerKind; 6] = [
        MediaOwnerKind::Post,
        MediaOwnerKind::Comment,
        MediaOwnerKind::Profile,
        MediaOwnerKind::Chat,
        MediaOwnerKind::JobPosting,
        MediaOwnerKind::ProfileExperience,
    ];

    /// Discriminator value stored in the attachments table.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaOwnerKind::Post => "post",
            MediaOwnerKind::Comment => "comment",
            MediaOwnerKind::Profile => "profile",
            MediaOwnerKind::Chat => "chat",
            MediaOwnerKind::JobPosting => "job_posting",
            MediaOwnerKind::ProfileExperience => "profile_experience",
        }
    }

    /// Table holding the owning entity.
    pub fn owner_table(&self) -> &'static str {
        match self {
            MediaOwnerKind::Post => "posts",
            MediaOwnerKind::Comment => "comments",
            MediaOwnerKind::Profile => "profiles",
            MediaOwnerKind::Chat => "chats",
            MediaOwnerKind::JobPosting => "job_postings",
            MediaOwnerKind::ProfileExperience => "profile_experiences",
        }
    }
}

impl std::fmt::Display for MediaOwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored file attached to an entity. The owning entity may be deleted
/// without this row being cleaned up synchronously — reconciling that is
/// the GC sweep's job.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub id: AttachmentId,
    /// Object-storage key.
    pub key: String,
    pub owner_kind: MediaOwnerKind,
    pub owner_id: uuid::Uuid,
    pub is_deleted: bool,
}

/// A provisional permission to upload a file. Created when a client requests
/// a presigned upload URL; the hold is released when the upload is attached
/// to an entity. Abandoned grants are reclaimed by the GC sweep after a
/// grace period.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaGrant {
    pub id: GrantId,
    pub key: String,
    pub on_hold: bool,
    pub granted_at: DateTime<Utc>,
}

/// One attachment row from a GC scan, joined to its owner's liveness.
#[derive(Debug, Clone)]
pub struct AttachmentScan {
    pub attachment: MediaAttachment,
    /// True when the owning entity exists and is not soft-deleted.
    pub owner_alive: bool,
}
