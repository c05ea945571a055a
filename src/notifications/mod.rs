use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::metrics::NOTIFICATION_FAILURES;

/// Represents a notification
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            message: message.into(),
            notification_type,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// Types of notifications
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    TaskAssigned,
    RecountRequested,
    TransferDecision,
    ReturnUpdate,
    OrderStatus,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Trait for notification service operations
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError>;
    async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError>;
}

const MAX_NOTIFICATIONS_PER_USER: isize = 1000;

/// Redis-based notification service: stores the latest notifications per user
/// in a sorted set and publishes each one on the user's channel.
#[derive(Clone)]
pub struct RedisNotificationService {
    redis: Arc<Client>,
}

impl RedisNotificationService {
    pub fn new(redis_url: &str) -> Result<Self, NotificationError> {
        let redis = Client::open(redis_url)?;
        Ok(Self {
            redis: Arc::new(redis),
        })
    }

    fn user_key(user_id: Uuid) -> String {
        format!("notifications:user:{}", user_id)
    }

    fn channel(user_id: Uuid) -> String {
        format!("notifications:channel:{}", user_id)
    }
}

#[async_trait]
impl NotificationService for RedisNotificationService {
    #[instrument(skip(self, notification), fields(id = %notification.id, user_id = %notification.user_id))]
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let json = serde_json::to_string(&notification)?;
        let user_key = Self::user_key(notification.user_id);

        redis::pipe()
            .atomic()
            .zadd(&user_key, &json, notification.created_at.timestamp_millis())
            .ignore()
            .zremrangebyrank(&user_key, 0, -(MAX_NOTIFICATIONS_PER_USER + 1))
            .ignore()
            .publish(Self::channel(notification.user_id), &json)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(notification_type = ?notification.notification_type, "notification sent");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.get_async_connection().await?;
        let raw: Vec<String> = conn
            .zrevrange(Self::user_key(user_id), 0, limit as isize - 1)
            .await?;

        raw.into_iter()
            .map(|json| serde_json::from_str(&json).map_err(NotificationError::from))
            .collect()
    }
}

/// Writes notifications to the log only.
#[derive(Clone, Default)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            user_id = %notification.user_id,
            notification_type = ?notification.notification_type,
            title = %notification.title,
            "notification: {}",
            notification.message
        );
        Ok(())
    }

    async fn get_user_notifications(
        &self,
        _user_id: Uuid,
        _limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        Ok(Vec::new())
    }
}

/// Keeps notifications in memory. Used by tests and local tooling.
#[derive(Clone, Default)]
pub struct InMemoryNotificationService {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail: bool,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Unavailable("transport disabled".into()));
        }
        self.sent.write().await.push(notification);
        Ok(())
    }

    async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        let sent = self.sent.read().await;
        Ok(sent
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Best-effort dispatcher used by workflows after their unit of work commits.
#[derive(Clone)]
pub struct Notifier {
    service: Arc<dyn NotificationService>,
}

impl Notifier {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }

    /// Sends a notification; failures are logged and counted, never returned.
    pub async fn notify(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        title: &str,
        message: impl Into<String>,
    ) {
        let notification = Notification::new(user_id, notification_type, title, message);
        if let Err(e) = self.service.send(notification).await {
            NOTIFICATION_FAILURES.inc();
            warn!(%user_id, error = %e, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifier_records_in_memory() {
        let transport = InMemoryNotificationService::new();
        let notifier = Notifier::new(Arc::new(transport.clone()));
        let user = Uuid::new_v4();

        notifier
            .notify(user, NotificationType::TaskAssigned, "Pick list assigned", "PL-1")
            .await;

        let sent = transport.get_user_notifications(user, 10).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Pick list assigned");
        assert_eq!(sent[0].notification_type, NotificationType::TaskAssigned);
    }

    #[tokio::test]
    async fn notifier_swallows_transport_failures() {
        let before = NOTIFICATION_FAILURES.get();
        let notifier = Notifier::new(Arc::new(InMemoryNotificationService::failing()));

        notifier
            .notify(Uuid::new_v4(), NotificationType::ReturnUpdate, "Refund", "done")
            .await;

        assert!(NOTIFICATION_FAILURES.get() > before);
    }
}
