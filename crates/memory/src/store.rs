//! Memory store: an ordered collection of atomic facts with stable identity.
//!
//! Entries carry an `(id, revision)` pair so replacement is a compare-and-swap
//! on identity rather than position. Two concurrent turns that both decide to
//! rewrite the same entry based on a stale snapshot cannot clobber each
//! other's write: the loser's revision no longer matches and the operation is
//! rejected without touching the store.

use std::path::{Path, PathBuf};

use {async_trait::async_trait, tokio::sync::Mutex, tracing::debug};

/// One atomic fact about the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Stable identity, never reused within a store's lifetime.
    pub id: u64,
    /// Bumped on every replacement; the CAS token for `replace`.
    pub revision: u64,
    pub text: String,
}

/// Result of a compare-and-swap replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced(MemoryEntry),
    /// The entry was rewritten by someone else since the caller's snapshot.
    StaleRevision,
    /// No entry with that id exists (deleted, or never existed).
    UnknownId,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append facts in order. Facts that are empty after normalization are
    /// dropped. Returns the entries actually created.
    async fn append(&self, facts: &[String]) -> anyhow::Result<Vec<MemoryEntry>>;

    /// Replace the text of entry `id` if its revision still matches.
    async fn replace(
        &self,
        id: u64,
        expected_revision: u64,
        text: &str,
    ) -> anyhow::Result<ReplaceOutcome>;

    /// Snapshot of all entries in insertion order.
    async fn list(&self) -> anyhow::Result<Vec<MemoryEntry>>;

    /// Remove every entry.
    async fn clear(&self) -> anyhow::Result<()>;
}

/// Collapse internal line breaks and trim; `None` if nothing is left.
/// Facts must stay single-line because the backing file is line-oriented.
fn normalize_fact(text: &str) -> Option<String> {
    let cleaned = text
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

struct Inner {
    entries: Vec<MemoryEntry>,
    next_id: u64,
}

/// File-backed store: one fact per line, full rewrite on every mutation.
///
/// The whole corpus lives in memory under a single mutex; the file is only a
/// persistence mirror. Rewrites go through a temp file and rename so a crash
/// mid-write never leaves a truncated store behind.
pub struct FileMemoryStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileMemoryStore {
    /// Open (or create) the store at `path`, loading any existing facts.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut entries = Vec::new();
        let mut next_id = 1;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for line in content.lines() {
                    let Some(text) = normalize_fact(line) else {
                        continue;
                    };
                    entries.push(MemoryEntry {
                        id: next_id,
                        revision: 1,
                        text,
                    });
                    next_id += 1;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(anyhow::Error::new(e).context("failed to read memory file")),
        }

        debug!(path = %path.display(), count = entries.len(), "opened memory store");
        Ok(Self {
            path,
            inner: Mutex::new(Inner { entries, next_id }),
        })
    }

    async fn persist(path: &Path, entries: &[MemoryEntry]) -> anyhow::Result<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&entry.text);
            content.push('\n');
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content.as_bytes()).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn append(&self, facts: &[String]) -> anyhow::Result<Vec<MemoryEntry>> {
        let mut inner = self.inner.lock().await;

        // Stage on a copy; commit only after the file write succeeds, so a
        // failed persist cannot leave entries that would vanish on restart.
        let mut staged = inner.entries.clone();
        let mut next_id = inner.next_id;
        let mut created = Vec::new();

        for fact in facts {
            let Some(text) = normalize_fact(fact) else {
                continue;
            };
            let entry = MemoryEntry {
                id: next_id,
                revision: 1,
                text,
            };
            next_id += 1;
            staged.push(entry.clone());
            created.push(entry);
        }

        if !created.is_empty() {
            Self::persist(&self.path, &staged).await?;
            inner.entries = staged;
            inner.next_id = next_id;
        }
        Ok(created)
    }

    async fn replace(
        &self,
        id: u64,
        expected_revision: u64,
        text: &str,
    ) -> anyhow::Result<ReplaceOutcome> {
        let Some(text) = normalize_fact(text) else {
            anyhow::bail!("replacement text is empty after normalization");
        };

        let mut inner = self.inner.lock().await;
        let Some(idx) = inner.entries.iter().position(|e| e.id == id) else {
            return Ok(ReplaceOutcome::UnknownId);
        };
        if inner.entries[idx].revision != expected_revision {
            return Ok(ReplaceOutcome::StaleRevision);
        }

        let mut updated = inner.entries[idx].clone();
        updated.text = text;
        updated.revision += 1;

        let mut staged = inner.entries.clone();
        staged[idx] = updated.clone();
        Self::persist(&self.path, &staged).await?;
        inner.entries = staged;
        Ok(ReplaceOutcome::Replaced(updated))
    }

    async fn list(&self) -> anyhow::Result<Vec<MemoryEntry>> {
        Ok(self.inner.lock().await.entries.clone())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        Self::persist(&self.path, &[]).await?;
        inner.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {super::*, tempfile::TempDir};

    async fn open_store(tmp: &TempDir) -> FileMemoryStore {
        FileMemoryStore::open(tmp.path().join("memory.txt"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn append_then_list_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.append(&["user's birthday is Dec 6".into()]).await.unwrap();
        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "user's birthday is Dec 6");
        assert_eq!(entries[0].revision, 1);
    }

    #[tokio::test]
    async fn append_drops_blank_facts() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let created = store
            .append(&["  ".into(), "real fact".into(), "\n".into()])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn multiline_facts_are_flattened() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .append(&["likes cheese\nand also bread".into()])
            .await
            .unwrap();
        let entries = store.list().await.unwrap();
        assert_eq!(entries[0].text, "likes cheese and also bread");
    }

    #[tokio::test]
    async fn replace_bumps_revision_and_keeps_length() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let created = store
            .append(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        let target = &created[1];

        let outcome = store.replace(target.id, target.revision, "b2").await.unwrap();
        let ReplaceOutcome::Replaced(updated) = outcome else {
            panic!("expected Replaced, got {outcome:?}");
        };
        assert_eq!(updated.revision, 2);

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].text, "b2");
    }

    #[tokio::test]
    async fn replace_with_stale_revision_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let created = store.append(&["a".into()]).await.unwrap();
        let entry = &created[0];

        // First writer wins.
        store.replace(entry.id, entry.revision, "first").await.unwrap();
        // Second writer holds the old revision and must lose.
        let outcome = store.replace(entry.id, entry.revision, "second").await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::StaleRevision);

        assert_eq!(store.list().await.unwrap()[0].text, "first");
    }

    #[tokio::test]
    async fn replace_unknown_id_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let outcome = store.replace(999, 1, "ghost").await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::UnknownId);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_with_blank_text_errors() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let created = store.append(&["a".into()]).await.unwrap();

        assert!(store.replace(created[0].id, 1, "   ").await.is_err());
        assert_eq!(store.list().await.unwrap()[0].text, "a");
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.append(&["a".into(), "b".into()]).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn facts_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.txt");

        {
            let store = FileMemoryStore::open(&path).await.unwrap();
            store
                .append(&["likes cheese".into(), "lives in Hangzhou".into()])
                .await
                .unwrap();
        }

        let reopened = FileMemoryStore::open(&path).await.unwrap();
        let entries = reopened.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "likes cheese");
        assert_eq!(entries[1].text, "lives in Hangzhou");
    }

    #[tokio::test]
    async fn failed_persist_leaves_the_in_memory_state_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sub");
        tokio::fs::create_dir(&dir).await.unwrap();
        let store = FileMemoryStore::open(dir.join("memory.txt")).await.unwrap();
        let created = store.append(&["likes cheese".into()]).await.unwrap();
        let entry = created[0].clone();

        // With the directory gone every file write fails.
        tokio::fs::remove_dir_all(&dir).await.unwrap();

        assert!(store.append(&["plays violin".into()]).await.is_err());
        assert!(store.replace(entry.id, entry.revision, "loves cheese").await.is_err());
        assert!(store.clear().await.is_err());

        // list() must not report facts that would vanish on restart.
        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "likes cheese");
        assert_eq!(entries[0].revision, 1);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_clear_within_a_session() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let first = store.append(&["a".into()]).await.unwrap();
        store.clear().await.unwrap();
        let second = store.append(&["b".into()]).await.unwrap();
        assert!(second[0].id > first[0].id);
    }
}
