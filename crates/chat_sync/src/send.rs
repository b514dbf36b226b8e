use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use shared::domain::{Identity, LocalId, Message, MessageId};
use tracing::{debug, error};

use crate::{error::SendError, room::RoomView, ChatEvent};

/// Creates optimistic messages and settles them once the backend answers.
#[derive(Debug, Default)]
pub struct SendCoordinator {
    next_local_id: AtomicU64,
}

impl SendCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_local_id(&self) -> LocalId {
        LocalId(self.next_local_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) async fn send(
        &self,
        view: &RoomView,
        body: &str,
        identity: Option<&Identity>,
    ) -> Result<Message, SendError> {
        let identity = identity.ok_or(SendError::MissingIdentity)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(SendError::EmptyBody);
        }

        let local_id = self.next_local_id();
        view.insert_pending(Message {
            id: MessageId::Pending(local_id),
            room: view.topic().cloned(),
            sender_display_name: identity.display_name.clone(),
            body: body.to_string(),
            created_at: Utc::now(),
        })
        .await;
        debug!(room = ?view.topic(), %local_id, "optimistic message inserted");

        match view
            .backend()
            .send_message(&identity.display_name, body, view.topic())
            .await
        {
            Ok(confirmed) => {
                debug!(room = ?view.topic(), %local_id, id = %confirmed.id, "message confirmed");
                view.promote(local_id, confirmed.clone()).await;
                Ok(confirmed)
            }
            Err(err) => {
                error!(room = ?view.topic(), %local_id, %err, "message send failed");
                view.discard(local_id).await;
                view.emit(ChatEvent::SendFailed {
                    local_id,
                    reason: err.to_string(),
                });
                Err(SendError::Backend(err))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/send_tests.rs"]
mod tests;
