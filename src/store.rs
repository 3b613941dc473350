use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::data::InputFiles;
use crate::error::{ErrorKind, LocalizeResult};
use crate::pipeline::ReviewState;

pub const STATE_VERSION: u32 = 1;
const STATE_FILE_NAME: &str = "state.json";
const INPUTS_DIR_NAME: &str = "inputs";
const CLAIMED_SUFFIX: &str = ".rendering";

/// Everything a later review submission needs besides the edits.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOperation {
    pub state: ReviewState,
    pub inputs: InputFiles,
}

/// Durable snapshots keyed by operation id.
pub trait ReviewStore: Send + Sync {
    fn save(&self, id: &str, operation: &StoredOperation) -> LocalizeResult<()>;
    /// `ReviewStateMissing` when nothing is stored under `id`.
    fn load(&self, id: &str) -> LocalizeResult<StoredOperation>;
    /// Takes the snapshot for rendering. Until it is released, further
    /// claims and loads see `ReviewStateMissing`.
    fn claim(&self, id: &str) -> LocalizeResult<StoredOperation>;
    /// Hands a claimed snapshot back after a failed render.
    fn release(&self, id: &str) -> LocalizeResult<()>;
    /// Deletes the snapshot, claimed or not.
    fn remove(&self, id: &str) -> LocalizeResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(default)]
    created_at: u64,
    state: ReviewState,
    #[serde(default)]
    inputs: Vec<InputEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InputEntry {
    name: String,
    file: String,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

fn encode_envelope(envelope: &Envelope) -> LocalizeResult<String> {
    serde_json::to_string_pretty(envelope)
        .map_err(|err| ErrorKind::Store(format!("failed to serialize review state: {}", err)))
}

/// Checks the version before touching the state so an old snapshot reports
/// a version mismatch instead of a parse error.
fn decode_envelope(content: &str) -> LocalizeResult<Envelope> {
    let probe: VersionProbe = serde_json::from_str(content)
        .map_err(|err| ErrorKind::Store(format!("failed to parse review state: {}", err)))?;
    if probe.version != STATE_VERSION {
        return Err(ErrorKind::IncompatibleReviewState {
            found: probe.version,
            expected: STATE_VERSION,
        });
    }
    serde_json::from_str(content)
        .map_err(|err| ErrorKind::Store(format!("failed to parse review state: {}", err)))
}

/// Operation ids become directory names; only `[A-Za-z0-9_-]` is allowed.
pub fn validate_operation_id(id: &str) -> LocalizeResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(ErrorKind::InvalidOperationId(id.to_string()))
    }
}

/// One directory per operation: `state.json` plus `inputs/NNN.bin`.
#[derive(Debug, Clone)]
pub struct FileReviewStore {
    root: PathBuf,
}

impl FileReviewStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn operation_dir(&self, id: &str) -> LocalizeResult<PathBuf> {
        validate_operation_id(id)?;
        Ok(self.root.join(id))
    }

    fn claimed_dir(&self, id: &str) -> LocalizeResult<PathBuf> {
        validate_operation_id(id)?;
        Ok(self.root.join(format!("{}{}", id, CLAIMED_SUFFIX)))
    }

    /// Deletes snapshots older than `ttl` that were never submitted.
    pub fn purge_expired(&self, ttl: Duration) -> LocalizeResult<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(store_error("failed to list review states", &self.root, err)),
        };
        let cutoff = now_unix().saturating_sub(ttl.as_secs());
        let mut removed = 0;
        for entry in entries.flatten() {
            let dir = entry.path();
            let state_path = dir.join(STATE_FILE_NAME);
            let created_at = fs::read_to_string(&state_path)
                .ok()
                .and_then(|content| serde_json::from_str::<CreatedProbe>(&content).ok())
                .map(|probe| probe.created_at);
            let expired = match created_at {
                Some(created_at) => created_at < cutoff,
                None => !state_path.exists(),
            };
            if !expired {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => removed += 1,
                Err(err) => warn!(dir = %dir.display(), error = %err, "failed to purge review state"),
            }
        }
        if removed > 0 {
            info!(removed, "purged expired review states");
        }
        Ok(removed)
    }
}

#[derive(Deserialize)]
struct CreatedProbe {
    #[serde(default)]
    created_at: u64,
}

impl ReviewStore for FileReviewStore {
    fn save(&self, id: &str, operation: &StoredOperation) -> LocalizeResult<()> {
        let dir = self.operation_dir(id)?;
        let inputs_dir = dir.join(INPUTS_DIR_NAME);
        fs::create_dir_all(&inputs_dir)
            .map_err(|err| store_error("failed to create review dir", &inputs_dir, err))?;

        let mut entries = Vec::with_capacity(operation.inputs.len());
        for (idx, (name, bytes)) in operation.inputs.iter().enumerate() {
            let file = format!("{:03}.bin", idx);
            let path = inputs_dir.join(&file);
            fs::write(&path, bytes).map_err(|err| store_error("failed to write input", &path, err))?;
            entries.push(InputEntry {
                name: name.clone(),
                file,
            });
        }

        let content = encode_envelope(&Envelope {
            version: STATE_VERSION,
            created_at: now_unix(),
            state: operation.state.clone(),
            inputs: entries,
        })?;
        let state_path = dir.join(STATE_FILE_NAME);
        fs::write(&state_path, content)
            .map_err(|err| store_error("failed to write review state", &state_path, err))?;
        debug!(operation = id, dir = %dir.display(), "saved review state");
        Ok(())
    }

    fn load(&self, id: &str) -> LocalizeResult<StoredOperation> {
        read_snapshot(&self.operation_dir(id)?, id)
    }

    fn claim(&self, id: &str) -> LocalizeResult<StoredOperation> {
        let dir = self.operation_dir(id)?;
        let claimed = self.claimed_dir(id)?;
        // The rename is the claim: only one caller can move the directory.
        match fs::rename(&dir, &claimed) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ErrorKind::ReviewStateMissing(id.to_string()));
            }
            Err(err) => return Err(store_error("failed to claim review state", &dir, err)),
        }
        debug!(operation = id, "claimed review state");
        match read_snapshot(&claimed, id) {
            Ok(operation) => Ok(operation),
            Err(err) => {
                if let Err(release_err) = self.release(id) {
                    warn!(operation = id, error = %release_err, "failed to release review state");
                }
                Err(err)
            }
        }
    }

    fn release(&self, id: &str) -> LocalizeResult<()> {
        let claimed = self.claimed_dir(id)?;
        let dir = self.operation_dir(id)?;
        fs::rename(&claimed, &dir)
            .map_err(|err| store_error("failed to release review state", &claimed, err))
    }

    fn remove(&self, id: &str) -> LocalizeResult<()> {
        for dir in [self.operation_dir(id)?, self.claimed_dir(id)?] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(store_error("failed to remove review state", &dir, err)),
            }
        }
        Ok(())
    }
}

fn read_snapshot(dir: &Path, id: &str) -> LocalizeResult<StoredOperation> {
    let state_path = dir.join(STATE_FILE_NAME);
    let content = match fs::read_to_string(&state_path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ErrorKind::ReviewStateMissing(id.to_string()));
        }
        Err(err) => return Err(store_error("failed to read review state", &state_path, err)),
    };
    let envelope = decode_envelope(&content)?;

    let inputs_dir = dir.join(INPUTS_DIR_NAME);
    let mut inputs = InputFiles::new();
    for entry in envelope.inputs {
        if validate_operation_id(entry.file.trim_end_matches(".bin")).is_err() {
            return Err(ErrorKind::Store(format!("invalid input entry '{}'", entry.file)));
        }
        let path = inputs_dir.join(&entry.file);
        let bytes = fs::read(&path).map_err(|err| store_error("failed to read input", &path, err))?;
        inputs.insert(entry.name, bytes);
    }
    Ok(StoredOperation {
        state: envelope.state,
        inputs,
    })
}

/// In-process store; snapshots still go through the JSON envelope.
#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    entries: Mutex<HashMap<String, MemorySlot>>,
}

#[derive(Debug, Clone)]
struct MemorySlot {
    content: String,
    inputs: InputFiles,
    claimed: bool,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a raw envelope, for exercising version handling.
    pub fn insert_raw(&self, id: &str, content: String, inputs: InputFiles) -> LocalizeResult<()> {
        validate_operation_id(id)?;
        self.lock()?.insert(
            id.to_string(),
            MemorySlot {
                content,
                inputs,
                claimed: false,
            },
        );
        Ok(())
    }

    fn lock(&self) -> LocalizeResult<std::sync::MutexGuard<'_, HashMap<String, MemorySlot>>> {
        self.entries
            .lock()
            .map_err(|_| ErrorKind::Store("review store lock poisoned".to_string()))
    }
}

impl ReviewStore for MemoryReviewStore {
    fn save(&self, id: &str, operation: &StoredOperation) -> LocalizeResult<()> {
        let content = encode_envelope(&Envelope {
            version: STATE_VERSION,
            created_at: now_unix(),
            state: operation.state.clone(),
            inputs: Vec::new(),
        })?;
        self.insert_raw(id, content, operation.inputs.clone())
    }

    fn load(&self, id: &str) -> LocalizeResult<StoredOperation> {
        validate_operation_id(id)?;
        let slot = self
            .lock()?
            .get(id)
            .filter(|slot| !slot.claimed)
            .cloned()
            .ok_or_else(|| ErrorKind::ReviewStateMissing(id.to_string()))?;
        let envelope = decode_envelope(&slot.content)?;
        Ok(StoredOperation {
            state: envelope.state,
            inputs: slot.inputs,
        })
    }

    fn claim(&self, id: &str) -> LocalizeResult<StoredOperation> {
        validate_operation_id(id)?;
        let mut entries = self.lock()?;
        let slot = entries
            .get_mut(id)
            .filter(|slot| !slot.claimed)
            .ok_or_else(|| ErrorKind::ReviewStateMissing(id.to_string()))?;
        let envelope = decode_envelope(&slot.content)?;
        slot.claimed = true;
        Ok(StoredOperation {
            state: envelope.state,
            inputs: slot.inputs.clone(),
        })
    }

    fn release(&self, id: &str) -> LocalizeResult<()> {
        validate_operation_id(id)?;
        if let Some(slot) = self.lock()?.get_mut(id) {
            slot.claimed = false;
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> LocalizeResult<()> {
        validate_operation_id(id)?;
        self.lock()?.remove(id);
        Ok(())
    }
}

fn store_error(action: &str, path: &Path, err: std::io::Error) -> ErrorKind {
    ErrorKind::Store(format!("{}: {} ({})", action, path.display(), err))
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
