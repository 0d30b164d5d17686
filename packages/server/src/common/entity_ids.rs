//! Typed ID definitions for all domain entities.
//!
//! One marker type per entity, plus a type alias that is the primary API.
//! The aliases are incompatible with each other at compile time, so an
//! attachment's owner ID can never be confused with a grant ID.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Profile entities (platform users).
pub struct Profile;

/// Marker type for Comment entities.
pub struct Comment;

/// Marker type for Notification entities.
pub struct Notification;

/// Marker type for Tag entities.
pub struct Tag;

/// Marker type for ModerationReport entities.
pub struct ModerationReport;

/// Marker type for MediaAttachment entities.
pub struct MediaAttachment;

/// Marker type for MediaGrant entities.
pub struct MediaGrant;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Profile entities.
pub type ProfileId = Id<Profile>;

/// Typed ID for Comment entities.
pub type CommentId = Id<Comment>;

/// Typed ID for Notification entities.
pub type NotificationId = Id<Notification>;

/// Typed ID for Tag entities.
pub type TagId = Id<Tag>;

/// Typed ID for ModerationReport entities.
pub type ReportId = Id<ModerationReport>;

/// Typed ID for MediaAttachment entities.
pub type AttachmentId = Id<MediaAttachment>;

/// Typed ID for MediaGrant entities.
pub type GrantId = Id<MediaGrant>;

/// Typed ID shared by every content item that flows through the processing
/// pipeline. Posts and job postings live in separate tables but share one ID
/// space in messages; the `ContentKind` discriminator picks the table.
pub type ContentId = uuid::Uuid;
