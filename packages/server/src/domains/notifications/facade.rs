//! Notification facade: the single entry point domain code uses to notify
//! users.
//!
//! Each domain-event method builds the notification rows for that event,
//! persists them synchronously, then hands them to the dispatch worker via a
//! non-blocking enqueue on an unbounded queue. Persistence failures surface
//! to the caller; delivery is fire-and-forget.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::common::{CommentId, ContentId, ProfileId};
use crate::domains::content::models::ContentKind;
use crate::domains::notifications::models::{Notification, NotificationStore};

/// A new comment (or reply) on a post or job posting.
#[derive(Debug, Clone)]
pub struct NewCommentEvent {
    pub comment_id: CommentId,
    pub item_id: ContentId,
    pub item_kind: ContentKind,
    pub item_author_id: ProfileId,
    pub commenter_id: ProfileId,
    pub commenter_first_name: String,
    pub commenter_picture_url: Option<String>,
    pub content: String,
    /// Set when the comment is a reply; the parent comment's author also
    /// gets notified.
    pub parent_comment_author_id: Option<ProfileId>,
}

/// A new application on a job posting.
#[derive(Debug, Clone)]
pub struct NewJobApplicationEvent {
    pub job_posting_id: ContentId,
    pub job_author_id: ProfileId,
    pub applicant_id: ProfileId,
    pub applicant_first_name: String,
    pub applicant_picture_url: Option<String>,
    pub job_title: String,
}

pub struct NotificationFacade {
    store: Arc<dyn NotificationStore>,
    queue: mpsc::UnboundedSender<Notification>,
}

impl NotificationFacade {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        queue: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self { store, queue }
    }

    /// Notify about a new comment. For replies both the item author and the
    /// parent comment's author are notified.
    pub async fn notify_new_comment(&self, event: &NewCommentEvent) -> Result<()> {
        let action_url = format!(
            "/{}/{}/#comment-{}",
            item_path(event.item_kind),
            event.item_id,
            event.comment_id
        );

        if let Some(parent_author_id) = event.parent_comment_author_id {
            self.dispatch(Notification {
                id: crate::common::NotificationId::new(),
                recipient_id: event.item_author_id,
                sender_id: event.commenter_id,
                message: format!(
                    "{} replied to a comment on your post: {}",
                    event.commenter_first_name, event.content
                ),
                is_read: false,
                action_url: Some(action_url.clone()),
                icon_url: event.commenter_picture_url.clone(),
                icon_action_url: Some(format!("/profile/{}", event.commenter_id)),
                created_at: chrono::Utc::now(),
            })
            .await?;

            self.dispatch(Notification {
                id: crate::common::NotificationId::new(),
                recipient_id: parent_author_id,
                sender_id: event.commenter_id,
                message: format!(
                    "{} replied to your comment: {}",
                    event.commenter_first_name, event.content
                ),
                is_read: false,
                action_url: Some(action_url),
                icon_url: event.commenter_picture_url.clone(),
                icon_action_url: Some(format!("/profile/{}", event.commenter_id)),
                created_at: chrono::Utc::now(),
            })
            .await?;
        } else {
            self.dispatch(Notification {
                id: crate::common::NotificationId::new(),
                recipient_id: event.item_author_id,
                sender_id: event.commenter_id,
                message: format!(
                    "{} commented on your post: {}",
                    event.commenter_first_name, event.content
                ),
                is_read: false,
                action_url: Some(action_url),
                icon_url: event.commenter_picture_url.clone(),
                icon_action_url: Some(format!("/profile/{}", event.commenter_id)),
                created_at: chrono::Utc::now(),
            })
            .await?;
        }

        Ok(())
    }

    /// Notify an author that moderation removed their content.
    pub async fn notify_content_removed(
        &self,
        kind: ContentKind,
        author_id: ProfileId,
        reason: &str,
    ) -> Result<()> {
        let noun = match kind {
            ContentKind::Post => "post",
            ContentKind::JobPosting => "job posting",
        };
        self.dispatch(Notification {
            id: crate::common::NotificationId::new(),
            recipient_id: author_id,
            sender_id: author_id,
            message: format!("Your {noun} was removed: {reason}"),
            is_read: false,
            action_url: None,
            icon_url: None,
            icon_action_url: None,
            created_at: chrono::Utc::now(),
        })
        .await
    }

    /// Notify a job author about a new application.
    pub async fn notify_new_job_application(
        &self,
        event: &NewJobApplicationEvent,
    ) -> Result<()> {
        self.dispatch(Notification {
            id: crate::common::NotificationId::new(),
            recipient_id: event.job_author_id,
            sender_id: event.applicant_id,
            message: format!(
                "{} applied to your job posting: {}",
                event.applicant_first_name, event.job_title
            ),
            is_read: false,
            action_url: Some(format!("/jobPostings/{}/applications", event.job_posting_id)),
            icon_url: event.applicant_picture_url.clone(),
            icon_action_url: Some(format!("/profile/{}", event.applicant_id)),
            created_at: chrono::Utc::now(),
        })
        .await
    }

    /// Persist the row, then enqueue it for delivery. The enqueue never
    /// blocks; if the dispatch worker is gone the delivery is skipped with a
    /// warning, the persisted row remains.
    async fn dispatch(&self, notification: Notification) -> Result<()> {
        self.store.insert(&notification).await?;

        if self.queue.send(notification).is_err() {
            tracing::warn!("Notification queue closed; skipping real-time delivery");
        }
        Ok(())
    }
}

fn item_path(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Post => "posts",
        ContentKind::JobPosting => "jobPostings",
    }
}
