use crate::domain::conversation::ConversationKey;
use crate::domain::message::{DeliveryError, DeliveryStatus, Message, MessageDraft, VerificationStatus};
use crate::error::{AppError, Result};
use crate::storage::persistence::{MemoryPersistence, Persistence};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcOffset;
use tokio::sync::Mutex;
use uuid::Uuid;

const INTERRUPTED: &str = "delivery interrupted before completion; check the relay before retrying";

/// Ordered message list shared by operator actions and the dispatcher.
///
/// Each mutation runs under one lock and is followed by a full save, so a reader
/// never sees a half-applied transition. Memory stays authoritative when a save
/// fails; the failure is logged, reported by [`Self::is_persisted`], and the next
/// successful save catches the file up.
#[derive(Clone, Debug)]
pub struct MessageStore {
    messages: Arc<Mutex<Vec<Message>>>,
    persistence: Arc<dyn Persistence>,
    persisted: Arc<AtomicBool>,
    utc_offset: UtcOffset,
}

impl MessageStore {
    /// Loads the saved list. Messages left in `sending` by a previous process are
    /// marked `failed` so they are never resent blindly.
    ///
    /// # Errors
    /// Returns an error if the saved list cannot be read.
    pub async fn open(persistence: Arc<dyn Persistence>, utc_offset: UtcOffset) -> Result<Self> {
        let loaded = persistence.load().await?;
        let total = loaded.len();
        let messages = normalize_records(loaded, utc_offset);
        if messages.len() < total {
            tracing::warn!(dropped = total - messages.len(), "Dropped malformed saved messages");
        }
        tracing::info!(count = messages.len(), "Message store loaded");

        Ok(Self {
            messages: Arc::new(Mutex::new(messages)),
            persistence,
            persisted: Arc::new(AtomicBool::new(true)),
            utc_offset,
        })
    }

    #[must_use]
    pub fn in_memory(utc_offset: UtcOffset) -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            persistence: Arc::new(MemoryPersistence::new()),
            persisted: Arc::new(AtomicBool::new(true)),
            utc_offset,
        }
    }

    /// Whether the most recent save succeeded.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted.load(Ordering::Relaxed)
    }

    pub async fn list(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Message> {
        self.messages.lock().await.iter().find(|m| m.id == id).cloned()
    }

    /// Appends a new `pending` message.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` for invalid input.
    #[tracing::instrument(err(level = "warn"), skip(self, draft))]
    pub async fn add(&self, draft: MessageDraft) -> Result<Message> {
        let message = Message::from_draft(Uuid::new_v4().to_string(), draft, self.utc_offset)?;
        self.mutate(|messages| {
            messages.push(message.clone());
            Ok(message)
        })
        .await
    }

    /// Rewrites a message's fields and returns it to `pending`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` when the
    /// message is being sent or has already been sent.
    #[tracing::instrument(err(level = "warn"), skip(self, draft))]
    pub async fn edit(&self, id: &str, draft: MessageDraft) -> Result<Message> {
        let edited = Message::from_draft(id.to_string(), draft, self.utc_offset)?;
        self.mutate(|messages| {
            let slot = find_mut(messages, id)?;
            match slot.status {
                DeliveryStatus::Sending => Err(AppError::Conflict("message is being sent".to_string())),
                DeliveryStatus::Sent => Err(AppError::Conflict("sent messages cannot be edited".to_string())),
                DeliveryStatus::Pending | DeliveryStatus::Failed => {
                    *slot = edited;
                    Ok(slot.clone())
                }
            }
        })
        .await
    }

    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` while it is being sent.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.mutate(|messages| {
            let position = messages.iter().position(|m| m.id == id).ok_or(AppError::NotFound)?;
            if messages[position].status == DeliveryStatus::Sending {
                return Err(AppError::Conflict("message is being sent".to_string()));
            }
            messages.remove(position);
            Ok(())
        })
        .await
    }

    /// Removes every message and returns how many there were.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` while any message is being sent.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn clear(&self) -> Result<usize> {
        self.mutate(|messages| {
            ensure_idle(messages)?;
            let count = messages.len();
            messages.clear();
            Ok(count)
        })
        .await
    }

    /// Replaces the list with imported records, returning how many were kept.
    ///
    /// Records missing a required field or carrying an unparseable time are
    /// dropped, as are repeated ids after their first occurrence.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` when nothing valid remains and `AppError::Conflict`
    /// while any message is being sent.
    #[tracing::instrument(err(level = "warn"), skip(self, records), fields(offered = records.len()))]
    pub async fn replace_all(&self, records: Vec<Message>) -> Result<usize> {
        let imported = normalize_records(records, self.utc_offset);
        if imported.is_empty() {
            return Err(AppError::BadRequest("no valid messages to import".to_string()));
        }

        self.mutate(|messages| {
            ensure_idle(messages)?;
            *messages = imported;
            Ok(messages.len())
        })
        .await
    }

    /// Parses an exported JSON array and imports it with [`Self::replace_all`].
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the payload is not a JSON array.
    pub async fn import_json(&self, raw: &str) -> Result<usize> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| AppError::BadRequest(format!("import is not valid JSON: {e}")))?;
        let serde_json::Value::Array(items) = value else {
            return Err(AppError::BadRequest("import must be a JSON array of messages".to_string()));
        };

        let records: Vec<Message> = items.into_iter().filter_map(|item| serde_json::from_value(item).ok()).collect();
        self.replace_all(records).await
    }

    /// Serializes the list exactly as it is persisted.
    ///
    /// # Errors
    /// Returns `AppError::Serialization` if encoding fails.
    pub async fn export_json(&self) -> Result<String> {
        let messages = self.messages.lock().await;
        Ok(serde_json::to_string_pretty(&*messages)?)
    }

    /// Moves a message of conversation `key` into `sending` and returns the state it
    /// will be sent with.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if the
    /// message is already sent, in flight, or no longer belongs to `key`.
    pub async fn begin_sending(&self, id: &str, key: &ConversationKey) -> Result<Message> {
        self.mutate(|messages| {
            let slot = find_mut(messages, id)?;
            if !key.matches(slot) {
                return Err(AppError::Conflict(format!("message was moved out of conversation {key}")));
            }
            match slot.status {
                DeliveryStatus::Sent => Err(AppError::Conflict("message was already sent".to_string())),
                DeliveryStatus::Sending => Err(AppError::Conflict("message is already being sent".to_string())),
                DeliveryStatus::Pending | DeliveryStatus::Failed => {
                    slot.status = DeliveryStatus::Sending;
                    slot.last_error = None;
                    slot.delivery_receipt_id = None;
                    slot.verification_status = None;
                    Ok(slot.clone())
                }
            }
        })
        .await
    }

    /// Records a successful send together with its receipt.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id.
    pub async fn mark_sent(
        &self,
        id: &str,
        receipt_id: Option<i64>,
        verification: Option<VerificationStatus>,
    ) -> Result<Message> {
        self.mutate(|messages| {
            let slot = find_mut(messages, id)?;
            slot.status = DeliveryStatus::Sent;
            slot.delivery_receipt_id = receipt_id;
            slot.verification_status = verification;
            slot.last_error = None;
            Ok(slot.clone())
        })
        .await
    }

    /// Records a failed or skipped attempt. Sent messages are left untouched.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if it was already sent.
    pub async fn mark_failed(&self, id: &str, error: DeliveryError) -> Result<Message> {
        self.mutate(|messages| {
            let slot = find_mut(messages, id)?;
            if slot.status == DeliveryStatus::Sent {
                return Err(AppError::Conflict("message was already sent".to_string()));
            }
            slot.status = DeliveryStatus::Failed;
            slot.last_error = Some(error);
            Ok(slot.clone())
        })
        .await
    }

    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` unless the message is sent.
    pub async fn set_verification(&self, id: &str, status: VerificationStatus) -> Result<Message> {
        self.mutate(|messages| {
            let slot = find_mut(messages, id)?;
            if slot.status != DeliveryStatus::Sent {
                return Err(AppError::Conflict("only sent messages can be verified".to_string()));
            }
            slot.verification_status = Some(status);
            Ok(slot.clone())
        })
        .await
    }

    /// Latest timestamp already delivered for a conversation, as far as this store knows.
    pub async fn last_sent_timestamp(&self, key: &ConversationKey) -> Option<i64> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.status == DeliveryStatus::Sent && key.matches(m))
            .map(|m| m.unix_timestamp)
            .max()
    }

    async fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Message>) -> Result<T>,
    {
        let mut messages = self.messages.lock().await;
        let result = apply(&mut messages)?;

        match self.persistence.save(&messages).await {
            Ok(()) => self.persisted.store(true, Ordering::Relaxed),
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist message list");
                self.persisted.store(false, Ordering::Relaxed);
            }
        }

        Ok(result)
    }
}

fn find_mut<'a>(messages: &'a mut [Message], id: &str) -> Result<&'a mut Message> {
    messages.iter_mut().find(|m| m.id == id).ok_or(AppError::NotFound)
}

fn ensure_idle(messages: &[Message]) -> Result<()> {
    if messages.iter().any(|m| m.status == DeliveryStatus::Sending) {
        return Err(AppError::Conflict("a message is being sent".to_string()));
    }
    Ok(())
}

fn normalize_records(records: Vec<Message>, offset: UtcOffset) -> Vec<Message> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|record| record.normalize_record(offset))
        .filter(|record| seen.insert(record.id.clone()))
        .map(|mut record| {
            if record.status == DeliveryStatus::Sending {
                tracing::warn!(message_id = %record.id, "Recovering message left in sending state");
                record.status = DeliveryStatus::Failed;
                record.last_error = Some(DeliveryError::exception(INTERRUPTED));
            }
            record
        })
        .collect()
}
