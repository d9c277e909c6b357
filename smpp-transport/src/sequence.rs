//! Sequence number persistence and pending-submission correlation

use crate::identity::TransportIdentity;
use crate::session::SequenceNumber;
use crate::store::{KeyValueStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sequence state of one transport, stored below its identity namespace.
///
/// Key layout:
/// - `<namespace>_<offset>#last_sequence_number` holds the counter
/// - `<namespace>#<sequence_number>` holds the pending message id
///
/// Counter and pending writes are independent; a crash between them leaves
/// one written without the other.
#[derive(Clone)]
pub struct SequenceStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    offset: SequenceNumber,
    pending_ttl: Option<Duration>,
}

impl SequenceStore {
    /// Create adapter for `identity`; `pending_ttl` bounds how long an
    /// unanswered submission stays correlated.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        identity: &TransportIdentity,
        offset: SequenceNumber,
        pending_ttl: Option<Duration>,
    ) -> Self {
        Self {
            store,
            namespace: identity.namespace(),
            offset,
            pending_ttl,
        }
    }

    /// Namespace prefix of every key written
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Configured starting offset
    pub fn offset(&self) -> SequenceNumber {
        self.offset
    }

    /// Key holding the last sequence number
    pub fn last_sequence_key(&self) -> String {
        format!("{}_{}#last_sequence_number", self.namespace, self.offset)
    }

    /// Key holding the pending message id for `sequence_number`
    pub fn pending_key(&self, sequence_number: SequenceNumber) -> String {
        format!("{}#{}", self.namespace, sequence_number)
    }

    /// Last persisted sequence number, if any
    pub async fn get_last_sequence(&self) -> Result<Option<SequenceNumber>, StoreError> {
        let key = self.last_sequence_key();
        match self.store.get(&key).await? {
            Some(raw) => raw
                .trim()
                .parse::<SequenceNumber>()
                .map(Some)
                .map_err(|e| StoreError::InvalidValue {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Last persisted sequence number, or the configured offset on first run
    pub async fn starting_sequence(&self) -> Result<SequenceNumber, StoreError> {
        Ok(self.get_last_sequence().await?.unwrap_or(self.offset))
    }

    /// Persist the last used sequence number
    pub async fn set_last_sequence(
        &self,
        sequence_number: SequenceNumber,
    ) -> Result<(), StoreError> {
        self.store
            .set(&self.last_sequence_key(), &sequence_number.to_string(), None)
            .await
    }

    /// Message id awaiting a response for `sequence_number`
    pub async fn get_pending(
        &self,
        sequence_number: SequenceNumber,
    ) -> Result<Option<String>, StoreError> {
        self.store.get(&self.pending_key(sequence_number)).await
    }

    /// Record the message id submitted under `sequence_number`, replacing any earlier entry
    pub async fn set_pending(
        &self,
        sequence_number: SequenceNumber,
        message_id: &str,
    ) -> Result<(), StoreError> {
        debug!("Pending {} -> {}", sequence_number, message_id);
        self.store
            .set(&self.pending_key(sequence_number), message_id, self.pending_ttl)
            .await
    }

    /// Retire the pending entry; returns whether one existed
    pub async fn delete_pending(
        &self,
        sequence_number: SequenceNumber,
    ) -> Result<bool, StoreError> {
        self.store.delete(&self.pending_key(sequence_number)).await
    }
}
