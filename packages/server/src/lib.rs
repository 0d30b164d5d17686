//! Skillboard server core: the asynchronous content-processing pipeline.
//!
//! New posts and job postings land in the database unprocessed. From there:
//!
//! - a periodic scan publishes stage messages for every item whose next
//!   pipeline flag is still unset (moderation → tagging → embedding), and
//!   bulk-flips safe+tagged items to processed;
//! - stage consumers call the AI providers and advance each item's state,
//!   idempotently, since messages are republished every cycle;
//! - the notification fan-out decouples persisting a notification from
//!   broadcasting it to connected clients;
//! - the media GC reconciles attachment rows and abandoned upload grants
//!   against object storage.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::Config;
