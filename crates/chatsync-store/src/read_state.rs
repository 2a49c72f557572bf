//! Typed view over the persisted read-state of one conversation.
//!
//! Three string entries survive reloads: the last acknowledged message id, the
//! session-active flag and the session start timestamp. Sibling tabs read and
//! write them without coordination.

use chatsync_shared::constants::{KEY_LAST_READ_MESSAGE_ID, KEY_SESSION_ON, KEY_SESSION_ON_TIMESTAMP};
use chatsync_shared::{ConversationId, MessageId};
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::kv::KeyValueStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadState {
    pub last_acknowledged_message_id: Option<MessageId>,
    pub session_active: bool,
    pub session_started_at: Option<DateTime<Utc>>,
}

pub struct ReadStateStore {
    store: Box<dyn KeyValueStore>,
    scope: String,
}

impl ReadStateStore {
    pub fn new(store: Box<dyn KeyValueStore>, conversation: &ConversationId) -> Self {
        Self {
            store,
            scope: conversation.storage_scope(),
        }
    }

    pub fn load(&self) -> Result<ReadState> {
        let session_started_at = self
            .store
            .get(&self.scope, KEY_SESSION_ON_TIMESTAMP)?
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(ReadState {
            last_acknowledged_message_id: self.last_acknowledged()?,
            session_active: self.is_session_on()?,
            session_started_at,
        })
    }

    /// The stored id, if present and well-formed. A garbled value reads as
    /// absent so the next operator message is acknowledged over it.
    pub fn last_acknowledged(&self) -> Result<Option<MessageId>> {
        let raw = self.store.get(&self.scope, KEY_LAST_READ_MESSAGE_ID)?;
        Ok(raw.and_then(|value| {
            let parsed = MessageId::parse(&value);
            if parsed.is_none() {
                tracing::warn!(scope = %self.scope, %value, "ignoring unparseable acknowledged id");
            }
            parsed
        }))
    }

    pub fn is_acknowledged(&self, id: MessageId) -> Result<bool> {
        Ok(self.last_acknowledged()?.is_some_and(|acked| acked >= id))
    }

    /// Move the acknowledged id forward to `id`. Never moves it back.
    /// Returns whether the stored value changed.
    pub fn advance_acknowledged(&self, id: MessageId) -> Result<bool> {
        if self.is_acknowledged(id)? {
            return Ok(false);
        }
        self.store
            .set(&self.scope, KEY_LAST_READ_MESSAGE_ID, &id.to_string())?;
        tracing::debug!(scope = %self.scope, id = %id, "acknowledged message");
        Ok(true)
    }

    pub fn is_session_on(&self) -> Result<bool> {
        Ok(self
            .store
            .get(&self.scope, KEY_SESSION_ON)?
            .is_some_and(|v| v == "true"))
    }

    pub fn set_session_on(&self, now: DateTime<Utc>) -> Result<()> {
        self.store.set(&self.scope, KEY_SESSION_ON, "true")?;
        self.store
            .set(&self.scope, KEY_SESSION_ON_TIMESTAMP, &now.to_rfc3339())?;
        Ok(())
    }

    /// Only the flag is cleared; the timestamp stays for diagnostics.
    pub fn set_session_off(&self) -> Result<()> {
        self.store.remove(&self.scope, KEY_SESSION_ON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn store_for(kv: &MemoryStore) -> ReadStateStore {
        ReadStateStore::new(Box::new(kv.clone()), &ConversationId::new("test"))
    }

    #[test]
    fn fresh_state_is_empty() {
        let state = store_for(&MemoryStore::new()).load().unwrap();
        assert_eq!(state, ReadState::default());
    }

    #[test]
    fn acknowledgment_is_monotonic() {
        let store = store_for(&MemoryStore::new());

        assert!(store.advance_acknowledged(MessageId(41)).unwrap());
        assert!(store.advance_acknowledged(MessageId(42)).unwrap());
        assert!(!store.advance_acknowledged(MessageId(40)).unwrap());
        assert!(!store.advance_acknowledged(MessageId(42)).unwrap());

        assert_eq!(store.last_acknowledged().unwrap(), Some(MessageId(42)));
        assert!(store.is_acknowledged(MessageId(41)).unwrap());
        assert!(!store.is_acknowledged(MessageId(43)).unwrap());
    }

    #[test]
    fn garbled_id_is_overwritten() {
        let kv = MemoryStore::new();
        kv.set("chat:test", KEY_LAST_READ_MESSAGE_ID, "not-a-number").unwrap();
        let store = store_for(&kv);

        assert_eq!(store.last_acknowledged().unwrap(), None);
        assert!(store.advance_acknowledged(MessageId(3)).unwrap());
        assert_eq!(store.last_acknowledged().unwrap(), Some(MessageId(3)));
    }

    #[test]
    fn session_flag_round_trip() {
        let kv = MemoryStore::new();
        let store = store_for(&kv);
        let now = Utc::now();

        store.set_session_on(now).unwrap();
        let state = store.load().unwrap();
        assert!(state.session_active);
        assert_eq!(
            state.session_started_at.map(|t| t.timestamp()),
            Some(now.timestamp())
        );

        store.set_session_off().unwrap();
        let state = store.load().unwrap();
        assert!(!state.session_active);
        assert!(state.session_started_at.is_some());
    }

    #[test]
    fn conversations_do_not_share_state() {
        let kv = MemoryStore::new();
        let a = ReadStateStore::new(Box::new(kv.clone()), &ConversationId::new("a"));
        let b = ReadStateStore::new(Box::new(kv.clone()), &ConversationId::new("b"));

        a.advance_acknowledged(MessageId(5)).unwrap();
        assert_eq!(b.last_acknowledged().unwrap(), None);
    }
}
