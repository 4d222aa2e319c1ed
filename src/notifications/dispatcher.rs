use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::Notification;
use crate::config::{backoff_delay_ms, NotificationConfig};
use crate::error::{AppError, AppResult, StorageError};
use crate::storage::{DirectoryStore, NotificationStore, UserType};

/// Content of a notification independent of its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NotificationMessage {
    /// Create a message with an empty payload.
    pub fn new(
        notification_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            notification_type: notification_type.into(),
            title: title.into(),
            content: content.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    fn addressed(&self, sender_id: Option<&str>, receiver_id: &str) -> Notification {
        Notification::new(
            sender_id.map(String::from),
            receiver_id,
            self.notification_type.clone(),
            self.title.clone(),
            self.content.clone(),
            self.data.clone(),
        )
    }
}

/// Aggregated result of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
    /// Confirmed writes.
    pub sent_count: usize,
    /// Receivers whose notification could not be written, in input order.
    pub failed_recipients: Vec<String>,
}

/// Creates notifications and tracks their read state.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn DirectoryStore>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        directory: Arc<dyn DirectoryStore>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    /// Create one notification, retrying transient write failures.
    pub async fn notify(
        &self,
        sender_id: Option<&str>,
        receiver_id: &str,
        message: &NotificationMessage,
    ) -> AppResult<Notification> {
        let notification = message.addressed(sender_id, receiver_id);

        deliver_with_retry(self.store.as_ref(), &notification, &self.config)
            .await
            .map_err(|message| AppError::DeliveryFailed {
                target: receiver_id.to_string(),
                message,
            })?;

        debug!(
            notification_id = %notification.id,
            receiver_id = %receiver_id,
            notification_type = %notification.notification_type,
            "Notification created"
        );

        Ok(notification)
    }

    /// Mark a receiver's notification read.
    ///
    /// Reading an already-read notification changes nothing. A notification
    /// addressed to someone else is reported as not found.
    pub async fn mark_read(&self, notification_id: &str, receiver_id: &str) -> AppResult<Notification> {
        let mut notification = self
            .store
            .get_notification(notification_id)
            .await?
            .filter(|n| n.receiver_id == receiver_id)
            .ok_or_else(|| AppError::not_found("notification", notification_id))?;

        if notification.is_read {
            return Ok(notification);
        }

        let read_at = chrono::Utc::now();
        if self.store.mark_notification_read(notification_id, read_at).await? {
            notification.is_read = true;
            notification.read_at = Some(read_at);
            return Ok(notification);
        }

        // Lost a race with a concurrent reader; return the stored state.
        self.store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("notification", notification_id))
    }

    /// Send one independent notification per receiver.
    ///
    /// Writes run concurrently up to the configured bound. Each receiver is
    /// retried with exponential backoff and a per-attempt timeout; a receiver
    /// that still fails is reported instead of aborting the rest.
    pub async fn broadcast(
        &self,
        sender_id: Option<&str>,
        receiver_ids: &[String],
        message: &NotificationMessage,
    ) -> BroadcastOutcome {
        let start = Instant::now();
        let mut seen = HashSet::new();
        let receivers: Vec<&String> = receiver_ids.iter().filter(|id| seen.insert(id.as_str())).collect();

        let semaphore = Arc::new(Semaphore::new(self.config.broadcast_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, receiver_id) in receivers.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let notification = message.addressed(sender_id, receiver_id);

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => deliver_with_retry(store.as_ref(), &notification, &config).await,
                    Err(_) => Err("broadcast permit unavailable".to_string()),
                };
                (index, notification.receiver_id, result)
            });
        }

        // Receivers whose task panicked stay `false` and count as failed.
        let mut confirmed = vec![false; receivers.len()];

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(()))) => confirmed[index] = true,
                Ok((_, receiver_id, Err(error))) => {
                    warn!(receiver_id = %receiver_id, error = %error, "Broadcast delivery failed");
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Broadcast task aborted");
                }
            }
        }

        let outcome = BroadcastOutcome {
            sent_count: confirmed.iter().filter(|ok| **ok).count(),
            failed_recipients: receivers
                .iter()
                .zip(&confirmed)
                .filter(|(_, ok)| !**ok)
                .map(|(id, _)| (*id).clone())
                .collect(),
        };

        info!(
            notification_type = %message.notification_type,
            targets = receivers.len(),
            sent_count = outcome.sent_count,
            failed_count = outcome.failed_recipients.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Broadcast completed"
        );

        outcome
    }

    /// Broadcast to all active users, optionally of one type.
    pub async fn broadcast_to_group(
        &self,
        sender_id: Option<&str>,
        user_type: Option<UserType>,
        message: &NotificationMessage,
    ) -> AppResult<BroadcastOutcome> {
        let receivers: Vec<String> = self
            .directory
            .list_active_users(user_type)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();

        Ok(self.broadcast(sender_id, &receivers, message).await)
    }

    /// A receiver's notifications, newest first.
    pub async fn list_for_receiver(&self, receiver_id: &str, unread_only: bool) -> AppResult<Vec<Notification>> {
        Ok(self.store.list_notifications(receiver_id, unread_only).await?)
    }

    /// Number of unread notifications of a receiver.
    pub async fn unread_count(&self, receiver_id: &str) -> AppResult<u64> {
        Ok(self.store.count_unread(receiver_id).await?)
    }
}

/// Write one notification with bounded retries.
///
/// A unique violation after a timed-out attempt means that attempt landed.
async fn deliver_with_retry(
    store: &dyn NotificationStore,
    notification: &Notification,
    config: &NotificationConfig,
) -> Result<(), String> {
    let attempt_timeout = Duration::from_millis(config.timeout_ms);
    let mut timed_out = false;
    let mut retries = 0;

    loop {
        let error = match tokio::time::timeout(attempt_timeout, store.create_notification(notification)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(StorageError::UniqueViolation { .. })) if timed_out => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => {
                timed_out = true;
                format!("timed out after {}ms", config.timeout_ms)
            }
        };

        if retries >= config.max_retries {
            return Err(error);
        }

        retries += 1;
        let delay = backoff_delay_ms(config.retry_delay_ms, retries);
        warn!(
            notification_id = %notification.id,
            receiver_id = %notification.receiver_id,
            error = %error,
            retry = retries,
            max_retries = config.max_retries,
            delay_ms = delay,
            "Notification write failed, retrying"
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
