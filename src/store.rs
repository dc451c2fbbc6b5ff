use crate::conversation::ConversationStore;
use crate::protocol::ConversationRecord;
use rand::Rng;
use std::path::{Path, PathBuf};

/// File-backed conversation store: one pretty-printed JSON record per host
/// document, named by a filesystem-safe slug of the document URL.
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug::slugify(url)))
    }
}

fn mint_id() -> String {
    format!("conv-{:016x}", rand::thread_rng().gen::<u64>())
}

impl ConversationStore for FileConversationStore {
    fn load(&self, url: &str) -> anyhow::Result<Option<ConversationRecord>> {
        let content = std::fs::read_to_string(self.path_for(url)).unwrap_or_default();
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, record: &ConversationRecord) -> anyhow::Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        let mut stored = record.clone();
        let id = stored.id.clone().unwrap_or_else(mint_id);
        stored.id = Some(id.clone());
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(self.path_for(&stored.url), json)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChatMessage;
    use tempfile::tempdir;

    #[test]
    fn absent_record_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = FileConversationStore::new(dir.path());
        assert!(store.load("https://example.com").expect("load").is_none());
    }

    #[test]
    fn save_assigns_id_and_roundtrips() {
        let dir = tempdir().expect("tempdir");
        let store = FileConversationStore::new(dir.path());
        let mut record = ConversationRecord::new("https://example.com/page?a=1", "Example");
        record.messages.push(ChatMessage::user("hi"));

        let id = store.save(&record).expect("save");
        assert!(id.starts_with("conv-"));

        let loaded = store
            .load("https://example.com/page?a=1")
            .expect("load")
            .expect("record");
        assert_eq!(loaded.id.as_deref(), Some(id.as_str()));
        assert_eq!(loaded.messages, record.messages);
    }

    #[test]
    fn existing_id_is_reused() {
        let dir = tempdir().expect("tempdir");
        let store = FileConversationStore::new(dir.path());
        let mut record = ConversationRecord::new("https://example.com", "Example");
        record.id = Some("conv-fixed".into());
        let id = store.save(&record).expect("save");
        assert_eq!(id, "conv-fixed");
    }

    #[test]
    fn records_for_different_urls_do_not_collide() {
        let dir = tempdir().expect("tempdir");
        let store = FileConversationStore::new(dir.path());
        let a = ConversationRecord::new("https://example.com/a", "A");
        let b = ConversationRecord::new("https://example.com/b", "B");
        store.save(&a).expect("save a");
        store.save(&b).expect("save b");
        assert_eq!(
            store
                .load("https://example.com/a")
                .expect("load")
                .expect("record")
                .title,
            "A"
        );
        assert_eq!(
            store
                .load("https://example.com/b")
                .expect("load")
                .expect("record")
                .title,
            "B"
        );
    }
}
