//! User notifications: persistence, fan-out queue, and real-time delivery.

pub mod facade;
pub mod models;
pub mod worker;

pub use facade::{NewCommentEvent, NewJobApplicationEvent, NotificationFacade};
pub use models::{Notification, NotificationStore, PgNotificationStore, READ_RETENTION_DAYS};
pub use worker::NotificationDispatchWorker;
