//! Persistent, reinforced, decaying memory.
//!
//! Entries live in memory behind one lock and are mirrored to a JSON file
//! that is rewritten in full after every mutation. A mutation is applied to
//! a copy, persisted, and only then published, so a failed write leaves the
//! store exactly as it was.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cortex_sdk::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_BOOST: f64 = 1.2;
pub const DEFAULT_DECAY: f64 = 0.95;
pub const DEFAULT_FLOOR: f64 = 0.1;
pub const DEFAULT_RECALL_LIMIT: usize = 10;
pub const DEFAULT_DECAY_INTERVAL: Duration = Duration::from_secs(300);

/// Tuning for reinforcement, decay and eviction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryPolicy {
    /// Multiplier applied to matching entries on reinforcement.
    pub boost: f64,
    /// Multiplier applied to every entry on each decay tick.
    pub decay: f64,
    /// Entries at or below this weight are evicted by decay.
    pub floor: f64,
    /// Keep only the top-N entries by confidence.
    pub capacity: Option<usize>,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            boost: DEFAULT_BOOST,
            decay: DEFAULT_DECAY,
            floor: DEFAULT_FLOOR,
            capacity: None,
        }
    }
}

impl MemoryPolicy {
    pub fn capped(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Default::default()
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// A stored memory.
///
/// The field aliases let older record files (with `data`, `input`,
/// `topic`, ... instead of `text`) load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: String,
    #[serde(
        alias = "data",
        alias = "input",
        alias = "topic",
        alias = "message",
        alias = "task",
        alias = "title"
    )]
    pub text: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "response",
        alias = "insights",
        alias = "logic_analysis",
        alias = "content"
    )]
    pub detail: Option<String>,
    #[serde(default = "default_weight")]
    pub recall_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl MemoryEntry {
    fn matches(&self, needle_lower: &str) -> bool {
        self.text.to_lowercase().contains(needle_lower)
    }

    fn rank(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }
}

/// What a caller hands to [`MemoryStore::remember_record`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub text: String,
    pub detail: Option<String>,
    pub confidence: Option<f64>,
}

impl Record {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Memory store shared between connection handlers, workers and the decay
/// task. All mutations are serialized through one lock.
pub struct MemoryStore {
    path: Option<PathBuf>,
    policy: MemoryPolicy,
    entries: Mutex<Vec<MemoryEntry>>,
}

impl MemoryStore {
    /// Open a file-backed store, loading existing entries. A missing file
    /// is an empty store.
    pub fn open(path: &Path, policy: MemoryPolicy) -> Result<Self> {
        let mut entries: Vec<MemoryEntry> = if path.exists() {
            let raw = std::fs::read(path).map_err(|e| Error::storage(path, e))?;
            serde_json::from_slice(&raw).map_err(|e| Error::storage(path, e))?
        } else {
            Vec::new()
        };

        for entry in &mut entries {
            entry.recall_weight = entry.recall_weight.max(0.0);
        }
        apply_capacity(&mut entries, policy.capacity);

        tracing::info!(path = %path.display(), entries = entries.len(), "Opened memory store");
        Ok(Self {
            path: Some(path.to_path_buf()),
            policy,
            entries: Mutex::new(entries),
        })
    }

    /// A store that never touches disk (for testing and ephemeral bots).
    pub fn in_memory(policy: MemoryPolicy) -> Self {
        Self {
            path: None,
            policy,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of every entry in stored order.
    pub fn snapshot(&self) -> Vec<MemoryEntry> {
        self.entries.lock().clone()
    }

    pub fn remember(&self, text: &str) -> Result<MemoryEntry> {
        self.remember_record(Record::new(text))
    }

    pub fn remember_record(&self, record: Record) -> Result<MemoryEntry> {
        if let Some(c) = record.confidence.filter(|c| !(c.is_finite() && *c >= 0.0)) {
            return Err(Error::Validation(format!("confidence must be a non-negative number, got {c}")));
        }

        let entry = MemoryEntry {
            timestamp: Utc::now().to_rfc3339(),
            text: record.text,
            detail: record.detail,
            recall_weight: 1.0,
            confidence: record.confidence,
        };
        let capacity = self.policy.capacity;
        let stored = entry.clone();
        self.mutate(move |entries| {
            entries.push(entry);
            apply_capacity(entries, capacity);
            Ok(())
        })?;
        Ok(stored)
    }

    /// Entries whose text contains `query` (case-insensitive), or all entries
    /// when `query` is `None`, capped at `limit`. Most recent first, or
    /// highest confidence first for a capped store. An empty result is the
    /// "nothing stored" signal, not an error.
    pub fn recall(&self, query: Option<&str>, limit: usize) -> Vec<MemoryEntry> {
        let needle = query.map(str::to_lowercase);
        let keep = |e: &&MemoryEntry| needle.as_deref().is_none_or(|n| e.matches(n));

        let entries = self.entries.lock();
        if self.policy.capacity.is_some() {
            entries.iter().filter(keep).take(limit).cloned().collect()
        } else {
            entries.iter().rev().filter(keep).take(limit).cloned().collect()
        }
    }

    /// Boost the weight of every entry matching `query`. Returns how many
    /// entries were reinforced.
    pub fn reinforce(&self, query: &str) -> Result<usize> {
        let needle = query.to_lowercase();
        let boost = self.policy.boost;
        self.mutate(move |entries| {
            let mut hits = 0;
            for entry in entries.iter_mut().filter(|e| e.matches(&needle)) {
                entry.recall_weight *= boost;
                hits += 1;
            }
            Ok(hits)
        })
    }

    /// One decay tick: fade every weight, then evict entries at or below the
    /// floor. Returns how many entries were evicted.
    pub fn decay(&self) -> Result<usize> {
        let MemoryPolicy { decay, floor, .. } = self.policy;
        self.mutate(move |entries| {
            let before = entries.len();
            for entry in entries.iter_mut() {
                entry.recall_weight *= decay;
            }
            entries.retain(|e| e.recall_weight > floor);
            Ok(before - entries.len())
        })
    }

    /// Drop the `n` most recent entries.
    pub fn forget_last(&self, n: usize) -> Result<()> {
        self.mutate(move |entries| {
            if entries.len() < n {
                return Err(Error::Validation(format!(
                    "not enough memory entries to delete ({} stored, {n} requested)",
                    entries.len()
                )));
            }
            entries.truncate(entries.len() - n);
            Ok(())
        })
    }

    /// Clear the store. Returns how many entries were dropped.
    pub fn forget_all(&self) -> Result<usize> {
        self.mutate(|entries| {
            let n = entries.len();
            entries.clear();
            Ok(n)
        })
    }

    #[cfg(test)]
    fn set_weight(&self, index: usize, weight: f64) {
        self.entries.lock()[index].recall_weight = weight;
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<MemoryEntry>) -> Result<R>) -> Result<R> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *entries = next;
        Ok(out)
    }

    fn persist(&self, entries: &[MemoryEntry]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(entries).map_err(|e| Error::storage(path, e))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        // Data hits the disk before the rename makes it visible.
        if let Err(e) = write_synced(&tmp, &json).and_then(|()| std::fs::rename(&tmp, path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::storage(path, e));
        }
        sync_parent(path);
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Flush the directory entry so the rename survives a crash.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "Directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// Sort by confidence (stable, highest first) and keep the top `capacity`.
fn apply_capacity(entries: &mut Vec<MemoryEntry>, capacity: Option<usize>) {
    if let Some(cap) = capacity {
        entries.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
        entries.truncate(cap);
    }
}

/// Run [`MemoryStore::decay`] every `every` until `shutdown` flips.
/// The first tick happens one full interval after start.
pub fn spawn_decay(
    store: Arc<MemoryStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // skip first immediate tick
        loop {
            tokio::select! {
                _ = interval.tick() => match store.decay() {
                    Ok(evicted) => tracing::info!(evicted, remaining = store.len(), "Memory decay applied"),
                    Err(e) => tracing::error!(error = %e, "Memory decay failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Decay task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::in_memory(MemoryPolicy::default())
    }

    #[test]
    fn remember_then_recall() {
        let s = store();
        s.remember("x").unwrap();
        let got = s.recall(Some("x"), 1);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "x");
        assert_eq!(got[0].recall_weight, 1.0);
    }

    #[test]
    fn recall_is_case_insensitive_and_most_recent_first() {
        let s = store();
        s.remember("Buy AAPL").unwrap();
        s.remember("weather is nice").unwrap();
        s.remember("sell aapl").unwrap();

        let got = s.recall(Some("AaPl"), 10);
        let texts: Vec<_> = got.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["sell aapl", "Buy AAPL"]);
    }

    #[test]
    fn recall_without_query_returns_latest() {
        let s = store();
        for i in 0..5 {
            s.remember(&format!("m{i}")).unwrap();
        }
        let texts: Vec<_> = s.recall(None, 2).into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["m4", "m3"]);
    }

    #[test]
    fn recall_empty_signal() {
        let s = store();
        assert!(s.recall(None, 10).is_empty());
        s.remember("something").unwrap();
        assert!(s.recall(Some("nothing"), 10).is_empty());
    }

    #[test]
    fn reinforce_twice_compounds() {
        let s = store();
        s.remember("remember the alamo").unwrap();
        s.remember("unrelated").unwrap();
        assert_eq!(s.reinforce("ALAMO").unwrap(), 1);
        assert_eq!(s.reinforce("alamo").unwrap(), 1);

        let entries = s.snapshot();
        assert!((entries[0].recall_weight - 1.44).abs() < 1e-9);
        assert_eq!(entries[1].recall_weight, 1.0);
    }

    #[test]
    fn decay_evicts_at_floor() {
        let s = store();
        s.remember("weak").unwrap();
        s.remember("strong").unwrap();
        s.set_weight(0, 0.10);
        s.set_weight(1, 0.20);

        assert_eq!(s.decay().unwrap(), 1);

        let entries = s.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "strong");
        assert!((entries[0].recall_weight - 0.19).abs() < 1e-9);
    }

    #[test]
    fn fresh_entries_survive_many_ticks() {
        let s = store();
        s.remember("x").unwrap();
        // 0.95^44 ≈ 0.105
        for _ in 0..44 {
            s.decay().unwrap();
        }
        assert_eq!(s.len(), 1);
        s.decay().unwrap();
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn capped_store_keeps_highest_confidence() {
        let s = MemoryStore::in_memory(MemoryPolicy::capped(50));
        // Insert confidences in a scrambled order: (i * 37) % 60.
        for i in 0..60u32 {
            let c = f64::from((i * 37) % 60);
            s.remember_record(Record::new(format!("c{c}")).with_confidence(c))
                .unwrap();
        }

        let entries = s.snapshot();
        assert_eq!(entries.len(), 50);
        let mut kept: Vec<f64> = entries.iter().map(|e| e.confidence.unwrap()).collect();
        assert!(kept.windows(2).all(|w| w[0] >= w[1]), "not ranked: {kept:?}");
        kept.sort_by(f64::total_cmp);
        let expected: Vec<f64> = (10..60).map(f64::from).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn capped_recall_walks_ranked_order() {
        let s = MemoryStore::in_memory(MemoryPolicy::capped(5));
        s.remember_record(Record::new("low").with_confidence(1.0)).unwrap();
        s.remember_record(Record::new("high").with_confidence(9.0)).unwrap();
        s.remember_record(Record::new("mid").with_confidence(5.0)).unwrap();

        let texts: Vec<_> = s.recall(None, 2).into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }

    #[test]
    fn negative_confidence_rejected() {
        let s = store();
        let err = s
            .remember_record(Record::new("bad").with_confidence(-1.0))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(s.is_empty());
    }

    #[test]
    fn forget_last_and_all() {
        let s = store();
        for i in 0..4 {
            s.remember(&format!("m{i}")).unwrap();
        }
        s.forget_last(2).unwrap();
        let texts: Vec<_> = s.snapshot().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["m0", "m1"]);

        let err = s.forget_last(3).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(s.len(), 2);

        assert_eq!(s.forget_all().unwrap(), 2);
        assert!(s.is_empty());
    }

    #[test]
    fn persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        {
            let s = MemoryStore::open(&path, MemoryPolicy::default()).unwrap();
            s.remember("first").unwrap();
            s.remember_record(Record::new("task").with_detail("done")).unwrap();
            s.reinforce("first").unwrap();
        }

        let s = MemoryStore::open(&path, MemoryPolicy::default()).unwrap();
        let entries = s.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "first");
        assert!((entries[0].recall_weight - 1.2).abs() < 1e-9);
        assert_eq!(entries[1].detail.as_deref(), Some("done"));
        assert!(!dir.path().join("memory.json.tmp").exists());
    }

    #[test]
    fn loads_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r#"[
                {"timestamp": "2024-01-01 10:00:00", "data": "plain memory"},
                {"timestamp": "2024-01-01 10:01:00", "data": "weighted", "recall_weight": 0.5},
                {"timestamp": "2024-01-01 10:02:00", "input": "a therefore b",
                 "logic_analysis": "deduction", "confidence": 1.2},
                {"timestamp": "2024-01-01 10:03:00", "topic": "stress", "insights": "breathe"}
            ]"#,
        )
        .unwrap();

        let s = MemoryStore::open(&path, MemoryPolicy::default()).unwrap();
        let entries = s.snapshot();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].recall_weight, 1.0);
        assert_eq!(entries[1].recall_weight, 0.5);
        assert_eq!(entries[2].detail.as_deref(), Some("deduction"));
        assert_eq!(entries[2].confidence, Some(1.2));
        assert_eq!(entries[3].text, "stress");
    }

    #[test]
    fn corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = MemoryStore::open(&path, MemoryPolicy::default()).err().unwrap();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[test]
    fn failed_write_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("memory.json");
        let s = MemoryStore::open(&path, MemoryPolicy::default()).unwrap();

        let err = s.remember("lost").unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert!(s.is_empty());
    }

    /// Replace the store's file with a non-empty directory so every rename
    /// onto it fails after the temp file was written.
    fn block_file(path: &Path) {
        std::fs::remove_file(path).unwrap();
        std::fs::create_dir(path).unwrap();
        std::fs::write(path.join("occupant"), b"x").unwrap();
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let s = MemoryStore::open(&path, MemoryPolicy::default()).unwrap();
        s.remember("kept").unwrap();
        block_file(&path);

        let err = s.remember("lost").unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert!(!dir.path().join("memory.json.tmp").exists());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn failed_write_leaves_every_mutation_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let s = MemoryStore::open(&path, MemoryPolicy::default()).unwrap();
        s.remember("alpha").unwrap();
        s.remember("beta").unwrap();
        s.set_weight(1, 0.10);
        let before = s.snapshot();
        block_file(&path);

        assert!(matches!(s.reinforce("alpha"), Err(Error::Storage { .. })));
        assert_eq!(s.snapshot(), before);

        assert!(matches!(s.decay(), Err(Error::Storage { .. })));
        assert_eq!(s.snapshot(), before);

        assert!(matches!(s.forget_last(1), Err(Error::Storage { .. })));
        assert_eq!(s.snapshot(), before);

        assert!(matches!(s.forget_all(), Err(Error::Storage { .. })));
        assert_eq!(s.snapshot(), before);

        assert!(!dir.path().join("memory.json.tmp").exists());
    }

    #[test]
    fn concurrent_remembers_are_all_kept() {
        let s = Arc::new(store());
        std::thread::scope(|scope| {
            for t in 0..8 {
                let s = Arc::clone(&s);
                scope.spawn(move || {
                    for i in 0..50 {
                        s.remember(&format!("t{t}-{i}")).unwrap();
                    }
                });
            }
        });
        assert_eq!(s.len(), 400);
    }

    #[tokio::test]
    async fn decay_task_ticks_and_stops() {
        let s = Arc::new(store());
        s.remember("fading").unwrap();
        let (tx, rx) = watch::channel(false);

        let task = spawn_decay(Arc::clone(&s), Duration::from_millis(30), rx);
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        let weight = s.snapshot()[0].recall_weight;
        assert!(weight < 1.0, "no decay applied: {weight}");
        let after_stop = weight;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(s.snapshot()[0].recall_weight, after_stop);
    }
}
