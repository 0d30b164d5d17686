//! Tests for the notification fan-out: persist-then-enqueue on the facade
//! side, ordered single-consumer delivery on the worker side.

use std::sync::Arc;

use tokio::sync::mpsc;

use server_core::common::{CommentId, ProfileId};
use server_core::domains::content::ContentKind;
use server_core::domains::notifications::{
    NewCommentEvent, NewJobApplicationEvent, NotificationDispatchWorker, NotificationFacade,
};
use server_core::kernel::test_dependencies::TestNotificationStore;
use server_core::kernel::StreamHub;

fn comment_event(recipient: ProfileId, content: &str) -> NewCommentEvent {
    NewCommentEvent {
        comment_id: CommentId::new(),
        item_id: uuid::Uuid::now_v7(),
        item_kind: ContentKind::Post,
        item_author_id: recipient,
        commenter_id: ProfileId::new(),
        commenter_first_name: "Nadia".to_string(),
        commenter_picture_url: Some("https://cdn.example/nadia.png".to_string()),
        content: content.to_string(),
        parent_comment_author_id: None,
    }
}

#[tokio::test]
async fn facade_persists_before_enqueueing() {
    let store = Arc::new(TestNotificationStore::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let facade = NotificationFacade::new(store.clone(), tx);

    let recipient = ProfileId::new();
    facade
        .notify_new_comment(&comment_event(recipient, "great post!"))
        .await
        .unwrap();

    // Persisted synchronously...
    let persisted = store.notifications();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].recipient_id, recipient);
    assert!(persisted[0].message.contains("commented on your post"));
    assert!(!persisted[0].is_read);

    // ...and the same notification is waiting on the queue.
    let queued = rx.recv().await.unwrap();
    assert_eq!(queued.id, persisted[0].id);
}

#[tokio::test]
async fn reply_notifies_item_author_and_parent_comment_author() {
    let store = Arc::new(TestNotificationStore::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let facade = NotificationFacade::new(store.clone(), tx);

    let item_author = ProfileId::new();
    let parent_author = ProfileId::new();
    let mut event = comment_event(item_author, "me too");
    event.parent_comment_author_id = Some(parent_author);

    facade.notify_new_comment(&event).await.unwrap();

    let persisted = store.notifications();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].recipient_id, item_author);
    assert_eq!(persisted[1].recipient_id, parent_author);
    assert!(persisted[1].message.contains("replied to your comment"));
}

#[tokio::test]
async fn job_application_notification_links_to_the_applications_page() {
    let store = Arc::new(TestNotificationStore::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let facade = NotificationFacade::new(store.clone(), tx);

    let event = NewJobApplicationEvent {
        job_posting_id: uuid::Uuid::now_v7(),
        job_author_id: ProfileId::new(),
        applicant_id: ProfileId::new(),
        applicant_first_name: "Omar".to_string(),
        applicant_picture_url: None,
        job_title: "Senior Backend Engineer".to_string(),
    };
    facade.notify_new_job_application(&event).await.unwrap();

    let persisted = store.notifications();
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0].message.contains("applied to your job posting"));
    assert_eq!(
        persisted[0].action_url.as_deref(),
        Some(format!("/jobPostings/{}/applications", event.job_posting_id).as_str())
    );
}

#[tokio::test]
async fn fan_out_delivers_in_order_through_the_stream_hub() {
    let store = Arc::new(TestNotificationStore::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let facade = NotificationFacade::new(store, tx);

    let hub = StreamHub::new();
    let recipient = ProfileId::new();
    let mut sub = hub.subscribe(&format!("notifications:{recipient}")).await;

    for i in 0..4 {
        facade
            .notify_new_comment(&comment_event(recipient, &format!("comment {i}")))
            .await
            .unwrap();
    }
    drop(facade); // closes the queue once drained

    NotificationDispatchWorker::new(rx, hub.clone()).run().await;

    for i in 0..4 {
        let delivered = sub.recv().await.unwrap();
        assert!(delivered["message"]
            .as_str()
            .unwrap()
            .contains(&format!("comment {i}")));
    }
}
