//! Turns push events into deliveries to the notification collaborator.
//!
//! The dispatcher is stateless: every `AlertRaised` produces exactly one
//! delivery, duplicates included — deduplication belongs to the platform
//! layer if it wants it. All other event variants are diagnostic only.

use tokio::sync::mpsc;

use crate::push::PushEvent;

/// A user-facing notification record.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub related_post_id: i64,
}

/// External notification-delivery collaborator (OS notification center,
/// terminal bell, test recorder).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Stateless mapper from the push event stream to the [`Notifier`].
pub struct NotificationDispatcher<N: Notifier> {
    notifier: N,
}

impl<N: Notifier> NotificationDispatcher<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    /// Handles one event. Only `AlertRaised` has an externally visible
    /// effect.
    pub fn on_event(&self, event: &PushEvent) {
        match event {
            PushEvent::AlertRaised {
                title,
                body,
                related_post_id,
            } => {
                tracing::info!(post_id = related_post_id, title = %title, "Raising alert notification");
                self.notifier.notify(Notification {
                    title: title.clone(),
                    body: body.clone(),
                    related_post_id: *related_post_id,
                });
            }
            PushEvent::ConnectionEstablished { message } => {
                tracing::debug!(message = %message, "Push subscription confirmed");
            }
            PushEvent::Pong => {
                tracing::debug!("Received keepalive pong");
            }
            PushEvent::Unrecognized { raw } => {
                tracing::debug!(frame = %raw, "Dropping unrecognized push frame");
            }
        }
    }

    /// Drains the manager's event channel to completion, preserving the
    /// order frames arrived in.
    pub async fn run(&self, mut events: mpsc::Receiver<PushEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(&event);
        }
        tracing::debug!("Push event channel closed, dispatcher exiting");
    }
}

/// Prints notifications to stdout; the delivery collaborator used by the
/// CLI `watch` command.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        println!(
            "[ALERT] {} — {} (post #{})",
            notification.title, notification.body, notification.related_post_id
        );
    }
}
