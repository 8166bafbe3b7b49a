//! Session memory persistence.
//!
//! [`FileStore`] keeps one JSON file per session:
//!
//! ```text
//! storage_dir/
//!   session-1.json
//!   session-2.json
//!   old-session.md      <- legacy plain-text log, upgraded on load
//! ```
//!
//! Writes go to a dot-prefixed temp file first and are renamed into place, so
//! a crash never leaves a half-written session behind.

use super::legacy::parse_legacy_log;
use super::merge::merge;
use super::types::{ObservationGroup, SessionMemory};
use crate::error::MemoryError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Load and save [`SessionMemory`] by session id.
///
/// `load` of an unknown session returns an empty memory, not an error.
pub trait MemoryStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<SessionMemory, MemoryError>;
    fn save(&self, session_id: &str, memory: &SessionMemory) -> Result<(), MemoryError>;
}

// ── FileStore ──────────────────────────────────────────────────────

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store, ensuring the storage directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn json_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(session_id)))
    }

    fn legacy_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", encode_id(session_id)))
    }

    /// Ids of every stored session, sorted. Legacy `.md` sessions are included.
    pub fn list_sessions(&self) -> Result<Vec<String>, MemoryError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| MemoryError::Storage(format!("Failed to read storage dir: {e}")))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| MemoryError::Storage(format!("Failed to read entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name
                .strip_suffix(".json")
                .or_else(|| name.strip_suffix(".md"))
            else {
                continue;
            };
            match decode_id(stem) {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => warn!("Skipping {name}: not a session file name"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl MemoryStore for FileStore {
    fn load(&self, session_id: &str) -> Result<SessionMemory, MemoryError> {
        let path = self.json_path(session_id);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| MemoryError::Storage(format!("Failed to read session: {e}")))?;
            return decode(&raw);
        }

        let legacy = self.legacy_path(session_id);
        if legacy.exists() {
            let raw = std::fs::read_to_string(&legacy)
                .map_err(|e| MemoryError::Storage(format!("Failed to read legacy log: {e}")))?;
            info!("Upgrading legacy plain-text log for session {session_id}");
            return Ok(SessionMemory {
                observation_log: parse_legacy_log(&raw),
                ..Default::default()
            });
        }

        debug!("No stored memory for session {session_id}");
        Ok(SessionMemory::default())
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    fn save(&self, session_id: &str, memory: &SessionMemory) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| MemoryError::Storage(format!("Failed to create storage dir: {e}")))?;

        let final_path = self.json_path(session_id);
        let tmp_path = self
            .dir
            .join(format!(".{}.json.tmp", encode_id(session_id)));

        let json = serde_json::to_string_pretty(memory)?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| MemoryError::Storage(format!("Failed to write temp session: {e}")))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| MemoryError::Storage(format!("Failed to rename session: {e}")))?;

        Ok(())
    }
}

/// Session ids become file names. `[A-Za-z0-9-]` is kept, every other byte
/// (`_` included) is written as `_XX` hex, so distinct ids never share a file.
/// The empty id maps to a lone `_`.
fn encode_id(session_id: &str) -> String {
    if session_id.is_empty() {
        return "_".into();
    }
    let mut out = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{byte:02X}"));
        }
    }
    out
}

/// Inverse of [`encode_id`]. `None` for names it could not have produced.
fn decode_id(stem: &str) -> Option<String> {
    if stem == "_" {
        return Some(String::new());
    }
    let mut bytes = Vec::with_capacity(stem.len());
    let mut rest = stem.bytes();
    while let Some(byte) = rest.next() {
        if byte == b'_' {
            let hex = [rest.next()?, rest.next()?];
            let hex = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
        } else if byte.is_ascii_alphanumeric() || byte == b'-' {
            bytes.push(byte);
        } else {
            return None;
        }
    }
    String::from_utf8(bytes).ok()
}

/// Decode a stored session, upgrading older layouts.
///
/// - Content that is not JSON at all is treated as a legacy plain-text log.
/// - `observations` (the old field name) and `observation_log` are both read.
///   String values are reparsed as legacy text. Everything found is merged,
///   older `observations` content first, so no entry is lost.
/// - A negative `last_observed_index` (the old "nothing observed" sentinel)
///   becomes `None`.
fn decode(raw: &str) -> Result<SessionMemory, MemoryError> {
    let mut value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            warn!("Stored session is not JSON; reparsing as legacy text");
            return Ok(SessionMemory {
                observation_log: parse_legacy_log(raw),
                ..Default::default()
            });
        }
    };

    if let Some(obj) = value.as_object_mut() {
        let mut log: Vec<ObservationGroup> = Vec::new();
        for key in ["observations", "observation_log"] {
            let parsed = match obj.remove(key) {
                Some(Value::String(text)) => {
                    debug!("Upgrading string-valued {key}");
                    parse_legacy_log(&text)
                }
                Some(Value::Null) | None => continue,
                Some(other) => serde_json::from_value(other)?,
            };
            log = merge(&log, &parsed);
        }
        obj.insert("observation_log".into(), serde_json::to_value(log)?);

        if obj
            .get("last_observed_index")
            .and_then(Value::as_i64)
            .is_some_and(|i| i < 0)
        {
            obj.insert("last_observed_index".into(), Value::Null);
        }
    }

    Ok(serde_json::from_value(value)?)
}

// ── InMemoryStore ──────────────────────────────────────────────────

/// Process-local store for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, SessionMemory>>,
    fail_saves: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with a storage error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStore for InMemoryStore {
    fn load(&self, session_id: &str) -> Result<SessionMemory, MemoryError> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn save(&self, session_id: &str, memory: &SessionMemory) -> Result<(), MemoryError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(MemoryError::Storage("save disabled".into()));
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.to_string(), memory.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ObservationEntry, ObservationGroup, Priority};

    fn sample_memory() -> SessionMemory {
        SessionMemory {
            observation_log: vec![ObservationGroup::new(
                "Mar 1, 2026",
                vec![ObservationEntry::new(Priority::High, "09:00", "Started")],
            )],
            last_observed_index: Some(4),
            last_observed_token_count: 1_200,
            current_task_hint: Some("Write tests".into()),
            ..Default::default()
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.save("s1", &sample_memory()).unwrap();
        assert_eq!(store.load("s1").unwrap(), sample_memory());
    }

    #[test]
    fn missing_session_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.load("nope").unwrap().is_fresh());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.save("s1", &sample_memory()).unwrap();

        assert!(dir.path().join("s1.json").exists());
        assert!(!dir.path().join(".s1.json.tmp").exists());
        assert_eq!(store.list_sessions().unwrap(), vec!["s1"]);
    }

    #[test]
    fn session_ids_are_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.save("../escape/me", &sample_memory()).unwrap();

        assert!(dir.path().join("_2E_2E_2Fescape_2Fme.json").exists());
        assert_eq!(store.load("../escape/me").unwrap(), sample_memory());
        assert_eq!(store.list_sessions().unwrap(), vec!["../escape/me"]);
    }

    #[test]
    fn similar_ids_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let a = SessionMemory {
            current_task_hint: Some("A".into()),
            ..sample_memory()
        };
        store.save("team/a", &a).unwrap();

        assert!(store.load("team_a").unwrap().is_fresh());
        assert!(store.load("team a").unwrap().is_fresh());
        assert_eq!(store.load("team/a").unwrap(), a);

        store.save("team_a", &sample_memory()).unwrap();
        assert_eq!(store.load("team/a").unwrap().current_task_hint.as_deref(), Some("A"));
        assert_eq!(store.list_sessions().unwrap(), vec!["team/a", "team_a"]);
    }

    #[test]
    fn id_encoding_round_trips() {
        for id in ["", "_", "plain-id", "a_b", "ünï/cödé", "x_2F"] {
            assert_eq!(decode_id(&encode_id(id)).as_deref(), Some(id), "{id:?}");
        }
        assert_eq!(decode_id("bad_Z"), None);
        assert_eq!(decode_id("has space"), None);
    }

    #[test]
    fn string_observations_are_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = serde_json::json!({
            "observations": "Date: Mar 1, 2026\n- 🔴 09:00 Legacy fact\n  - detail",
            "last_observed_index": -1,
            "current_task_hint": "Resume"
        });
        std::fs::write(dir.path().join("old.json"), legacy.to_string()).unwrap();

        let store = FileStore::new(dir.path()).unwrap();
        let mem = store.load("old").unwrap();
        assert_eq!(mem.last_observed_index, None);
        assert_eq!(mem.observation_log[0].date, "Mar 1, 2026");
        assert_eq!(mem.observation_log[0].entries[0].text, "Legacy fact");
        assert_eq!(mem.observation_log[0].entries[0].children, vec!["detail"]);
        assert_eq!(mem.current_task_hint.as_deref(), Some("Resume"));
    }

    #[test]
    fn legacy_and_structured_logs_are_both_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mixed = serde_json::json!({
            "observations": "Date: Feb 1, 2026\n- 🔴 09:00 Legacy fact",
            "observation_log": [{
                "date": "Feb 1, 2026",
                "entries": [{"priority": "medium", "time": "10:00", "text": "Structured fact"}]
            }, {
                "date": "Feb 2, 2026",
                "entries": [{"priority": "low", "time": "08:00", "text": "Next day"}]
            }]
        });
        std::fs::write(dir.path().join("mixed.json"), mixed.to_string()).unwrap();

        let store = FileStore::new(dir.path()).unwrap();
        let mem = store.load("mixed").unwrap();
        let texts: Vec<&str> = mem
            .observation_log
            .iter()
            .flat_map(|g| g.entries.iter().map(|e| e.text.as_str()))
            .collect();
        assert_eq!(texts, vec!["Legacy fact", "Structured fact", "Next day"]);
        assert_eq!(mem.observation_log.len(), 2);
    }

    #[test]
    fn markdown_sidecar_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("md.md"), "Date: Mar 2, 2026\n- 🟢 Quiet day").unwrap();

        let store = FileStore::new(dir.path()).unwrap();
        let mem = store.load("md").unwrap();
        assert_eq!(mem.entry_count(), 1);
        assert_eq!(store.list_sessions().unwrap(), vec!["md"]);
    }

    #[test]
    fn non_json_file_is_reparsed_as_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("raw.json"), "- 🔴 10:00 Bare text").unwrap();

        let store = FileStore::new(dir.path()).unwrap();
        let mem = store.load("raw").unwrap();
        assert_eq!(mem.observation_log[0].date, "Undated");
        assert_eq!(mem.observation_log[0].entries[0].time, "10:00");
    }

    #[test]
    fn in_memory_store_roundtrip_and_failure() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        store.save("a", &sample_memory()).unwrap();
        assert_eq!(store.load("a").unwrap(), sample_memory());
        assert!(store.load("b").unwrap().is_fresh());

        store.set_fail_saves(true);
        assert!(matches!(
            store.save("a", &SessionMemory::default()),
            Err(MemoryError::Storage(_))
        ));
        assert_eq!(store.load("a").unwrap(), sample_memory());
    }
}
