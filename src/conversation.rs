use crate::protocol::{ChatMessage, ConversationRecord, MessageRole};
use std::time::{Duration, Instant};

/// Default write-through debounce for persistence.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_millis(300);

/// Backing store for conversation records, keyed by host document URL.
pub trait ConversationStore {
    fn load(&self, url: &str) -> anyhow::Result<Option<ConversationRecord>>;
    /// Persist the record, returning its id (minting one when the record has
    /// none yet).
    fn save(&self, record: &ConversationRecord) -> anyhow::Result<String>;
}

/// Owns the authoritative in-memory conversation for the current host
/// document, persists it (debounced) on every mutation, and merges streamed
/// deltas into the trailing assistant message.
///
/// Nothing else writes `messages`; other components read or go through these
/// operations.
pub struct ConversationSync {
    store: Box<dyn ConversationStore>,
    record: ConversationRecord,
    dirty: bool,
    write_due: Option<Instant>,
    debounce: Duration,
}

impl ConversationSync {
    /// Hydrate from the store when a record exists for `url`, otherwise start
    /// empty. Load failures are logged and treated as absent.
    pub fn new(
        store: Box<dyn ConversationStore>,
        url: impl Into<String>,
        title: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        let url = url.into();
        let title = title.into();
        let record = match store.load(&url) {
            Ok(Some(record)) => record,
            Ok(None) => ConversationRecord::new(url, title),
            Err(e) => {
                tracing::warn!(%url, "failed to load conversation, starting empty: {e}");
                ConversationRecord::new(url, title)
            }
        };
        Self {
            store,
            record,
            dirty: false,
            write_due: None,
            debounce,
        }
    }

    pub fn record(&self) -> &ConversationRecord {
        &self.record
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.record.messages
    }

    pub fn id(&self) -> Option<&str> {
        self.record.id.as_deref()
    }

    pub fn document_url(&self) -> &str {
        &self.record.url
    }

    /// Append a message. A user message whose trimmed content equals the
    /// immediately preceding user message is an idempotent resubmission and
    /// is dropped.
    pub fn append(&mut self, message: ChatMessage) {
        if message.role == MessageRole::User {
            if let Some(last) = self.record.messages.last() {
                if last.role == MessageRole::User && last.content.trim() == message.content.trim()
                {
                    tracing::debug!("skipping duplicate consecutive user message");
                    return;
                }
            }
        }
        self.record.messages.push(message);
        self.touch();
    }

    /// Merge a streamed delta into the trailing assistant message, creating
    /// one when absent.
    ///
    /// The upstream producer may emit either cumulative snapshots or
    /// incremental fragments and does not say which; detection is by prefix
    /// match, preferring the cumulative interpretation when both fit.
    pub fn apply_stream_delta(&mut self, delta: &str) {
        match self.record.messages.last_mut() {
            Some(last) if last.role == MessageRole::Assistant => {
                if delta.starts_with(&last.content) {
                    last.content = delta.to_string();
                } else {
                    last.content.push_str(delta);
                }
            }
            _ => {
                self.record.messages.push(ChatMessage::assistant(delta));
            }
        }
        self.touch();
    }

    /// Mark the streamed assistant message complete. The content assembled
    /// during streaming is preserved; only the timestamp moves to the
    /// completion time. Without a trailing assistant message the completed
    /// message is appended whole.
    pub fn finalize(&mut self, message: ChatMessage) {
        match self.record.messages.last_mut() {
            Some(last) if last.role == MessageRole::Assistant => {
                last.timestamp = message.timestamp;
            }
            _ => {
                self.record.messages.push(message);
            }
        }
        self.touch();
    }

    /// Wholesale replacement from the surface (`update-conversation`). The
    /// incoming id is adopted only while the local record has none; once
    /// assigned the id is immutable.
    pub fn set_messages(&mut self, messages: Vec<ChatMessage>, conversation_id: Option<String>) {
        self.record.messages = messages;
        if self.record.id.is_none() {
            self.record.id = conversation_id;
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.record.updated_at = chrono::Utc::now().timestamp_millis();
        self.dirty = true;
        self.write_due = Some(Instant::now() + self.debounce);
    }

    /// Write through when the debounce window has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if self.dirty {
            if let Some(due) = self.write_due {
                if now >= due {
                    self.persist(now);
                }
            }
        }
    }

    /// Immediate write of any pending mutation (used before teardown so no
    /// in-flight edits are lost).
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist(Instant::now());
        }
    }

    fn persist(&mut self, now: Instant) {
        match self.store.save(&self.record) {
            Ok(id) => {
                if self.record.id.is_none() {
                    self.record.id = Some(id);
                }
                self.dirty = false;
                self.write_due = None;
            }
            Err(e) => {
                tracing::warn!(url = %self.record.url, "failed to persist conversation: {e}");
                self.write_due = Some(now + self.debounce);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct MemStore {
        saved: Rc<RefCell<Vec<ConversationRecord>>>,
    }

    impl ConversationStore for MemStore {
        fn load(&self, _url: &str) -> anyhow::Result<Option<ConversationRecord>> {
            Ok(None)
        }
        fn save(&self, record: &ConversationRecord) -> anyhow::Result<String> {
            self.saved.borrow_mut().push(record.clone());
            Ok(record.id.clone().unwrap_or_else(|| "conv-1".to_string()))
        }
    }

    fn sync() -> ConversationSync {
        ConversationSync::new(
            Box::new(MemStore::default()),
            "https://example.com",
            "Example",
            Duration::from_millis(0),
        )
    }

    #[test]
    fn duplicate_consecutive_user_messages_collapse() {
        let mut sync = sync();
        sync.append(ChatMessage::user("hello"));
        sync.append(ChatMessage::user("  hello  "));
        sync.append(ChatMessage::user("hello"));
        assert_eq!(sync.messages().len(), 1);

        sync.append(ChatMessage::assistant("hi"));
        sync.append(ChatMessage::user("hello"));
        assert_eq!(sync.messages().len(), 3);
    }

    #[test]
    fn cumulative_delta_is_idempotent() {
        let mut sync = sync();
        sync.apply_stream_delta("Hello, wor");
        sync.apply_stream_delta("Hello, world");
        sync.apply_stream_delta("Hello, world");
        assert_eq!(sync.messages().last().unwrap().content, "Hello, world");
        assert_eq!(sync.messages().len(), 1);
    }

    #[test]
    fn incremental_deltas_concatenate_in_order() {
        let mut sync = sync();
        sync.append(ChatMessage::user("hi"));
        for d in ["one ", "two ", "three"] {
            sync.apply_stream_delta(d);
        }
        assert_eq!(sync.messages().last().unwrap().content, "one two three");
    }

    #[test]
    fn streaming_scenario_matches_transcript() {
        let mut sync = sync();
        sync.append(ChatMessage::user("hi"));
        sync.apply_stream_delta("He");
        sync.apply_stream_delta("Hello");
        let msgs = sync.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, MessageRole::User);
        assert_eq!(msgs[0].content, "hi");
        assert_eq!(msgs[1].role, MessageRole::Assistant);
        assert_eq!(msgs[1].content, "Hello");
    }

    #[test]
    fn finalize_keeps_streamed_content() {
        let mut sync = sync();
        sync.apply_stream_delta("partial answer");
        let mut done = ChatMessage::assistant("ignored");
        done.timestamp = 42_000;
        sync.finalize(done);
        let last = sync.messages().last().unwrap();
        assert_eq!(last.content, "partial answer");
        assert_eq!(last.timestamp, 42_000);
    }

    #[test]
    fn finalize_without_assistant_appends() {
        let mut sync = sync();
        sync.append(ChatMessage::user("hi"));
        sync.finalize(ChatMessage::assistant("full answer"));
        assert_eq!(sync.messages().last().unwrap().content, "full answer");
    }

    #[test]
    fn id_assigned_on_first_save_then_immutable() {
        let store = MemStore::default();
        let saved = Rc::clone(&store.saved);
        let mut sync = ConversationSync::new(
            Box::new(store),
            "https://example.com",
            "Example",
            Duration::from_millis(0),
        );
        sync.append(ChatMessage::user("hi"));
        sync.flush();
        assert_eq!(sync.id(), Some("conv-1"));
        assert_eq!(saved.borrow().len(), 1);

        sync.set_messages(vec![ChatMessage::user("hi")], Some("other-id".into()));
        assert_eq!(sync.id(), Some("conv-1"));
    }

    #[test]
    fn failed_save_stays_dirty_and_retries_after_rearm() {
        #[derive(Default, Clone)]
        struct FlakyStore {
            fail_remaining: Rc<Cell<u32>>,
            attempts: Rc<Cell<u32>>,
            saved: Rc<RefCell<Vec<ConversationRecord>>>,
        }

        impl ConversationStore for FlakyStore {
            fn load(&self, _url: &str) -> anyhow::Result<Option<ConversationRecord>> {
                Ok(None)
            }
            fn save(&self, record: &ConversationRecord) -> anyhow::Result<String> {
                self.attempts.set(self.attempts.get() + 1);
                if self.fail_remaining.get() > 0 {
                    self.fail_remaining.set(self.fail_remaining.get() - 1);
                    anyhow::bail!("disk full");
                }
                self.saved.borrow_mut().push(record.clone());
                Ok("conv-1".to_string())
            }
        }

        let store = FlakyStore::default();
        store.fail_remaining.set(1);
        let attempts = Rc::clone(&store.attempts);
        let saved = Rc::clone(&store.saved);
        let debounce = Duration::from_secs(60);
        let mut sync = ConversationSync::new(
            Box::new(store),
            "https://example.com",
            "Example",
            debounce,
        );
        let start = Instant::now();
        sync.append(ChatMessage::user("hi"));

        // First due tick fails; the record stays dirty and unassigned.
        sync.tick(start + debounce + Duration::from_secs(1));
        assert_eq!(attempts.get(), 1);
        assert!(saved.borrow().is_empty());
        assert_eq!(sync.id(), None);

        // The deadline was re-armed from the failed attempt: a tick inside
        // the new window does not retry.
        sync.tick(start + debounce + Duration::from_secs(10));
        assert_eq!(attempts.get(), 1);

        // Past the re-armed deadline the write goes through.
        sync.tick(start + debounce + debounce + Duration::from_secs(2));
        assert_eq!(attempts.get(), 2);
        assert_eq!(saved.borrow().len(), 1);
        assert_eq!(sync.id(), Some("conv-1"));
    }

    #[test]
    fn debounce_defers_write_until_due() {
        let store = MemStore::default();
        let saved = Rc::clone(&store.saved);
        let mut sync = ConversationSync::new(
            Box::new(store),
            "https://example.com",
            "Example",
            Duration::from_secs(60),
        );
        sync.append(ChatMessage::user("hi"));
        sync.tick(Instant::now());
        assert!(saved.borrow().is_empty());
        sync.tick(Instant::now() + Duration::from_secs(61));
        assert_eq!(saved.borrow().len(), 1);
    }
}
