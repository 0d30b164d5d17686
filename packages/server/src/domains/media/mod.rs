//! Media attachments, upload grants, and the garbage-collection sweep that
//! reconciles them against object storage.

pub mod gc;
pub mod models;
pub mod store;

pub use gc::MediaGcWorker;
pub use models::{AttachmentScan, MediaAttachment, MediaGrant, MediaOwnerKind};
pub use store::{MediaStore, PgMediaStore};
