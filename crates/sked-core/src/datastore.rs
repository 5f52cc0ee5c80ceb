use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {id}")]
    NotFound { id: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed parsing {path} line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize task: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid id sequence in {path}: {raw:?}")]
    Sequence { path: PathBuf, raw: String },

    #[error("datastore lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Tasks kept as JSON lines in `tasks.data`, with the last handed-out id in
/// `sequence.data`.
///
/// Every operation holds the store lock for its whole read-modify-write
/// cycle and rewrites files through a temp file. The lock is a mutex for
/// threads sharing this handle plus an OS lock on `data_dir/lock`, so other
/// handles and other processes on the same directory wait their turn.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub sequence_path: PathBuf,
    pub lock_path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Held store lock. The file lock is released on drop, before the mutex.
struct StoreGuard<'a> {
    file: File,
    path: &'a Path,
    mode: LockMode,
    _thread: MutexGuard<'a, ()>,
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = fs2::FileExt::unlock(&self.file) {
            warn!(
                lock = %self.path.display(),
                mode = ?self.mode,
                error = %err,
                "failed to release datastore lock"
            );
        }
    }
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let tasks_path = data_dir.join("tasks.data");
        let sequence_path = data_dir.join("sequence.data");
        let lock_path = data_dir.join("lock");

        // Appending never truncates rows another handle has already written.
        for path in [&tasks_path, &sequence_path] {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            sequence = %sequence_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            sequence_path,
            lock_path,
            lock: Mutex::new(()),
        })
    }

    /// Up to `limit` tasks, earliest date first.
    #[tracing::instrument(skip(self))]
    pub fn list(&self, limit: usize) -> Result<Vec<Task>> {
        let _guard = self.guard(LockMode::Shared)?;
        let mut tasks = load_jsonl(&self.tasks_path)?;
        tasks.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| numeric_id(&a.id).cmp(&numeric_id(&b.id)))
        });
        tasks.truncate(limit);
        Ok(tasks)
    }

    #[tracing::instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Task> {
        let _guard = self.guard(LockMode::Shared)?;
        load_jsonl(&self.tasks_path)?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| not_found(id))
    }

    /// Stores `task` under a freshly assigned id and returns that id. Ids
    /// are never reused, even after the highest one is deleted.
    #[tracing::instrument(skip(self, task), fields(title = %task.title))]
    pub fn insert(&self, task: &Task) -> Result<String> {
        let _guard = self.guard(LockMode::Exclusive)?;
        let mut tasks = load_jsonl(&self.tasks_path)?;

        let last = self.load_sequence()?;
        let highest = tasks.iter().filter_map(|t| numeric_id(&t.id)).max().unwrap_or(0);
        let id = (last.max(highest) + 1).to_string();

        let mut stored = task.clone();
        stored.id = id.clone();
        tasks.push(stored);

        // Sequence first: a failed task write then only leaves a gap.
        save_text_atomic(&self.sequence_path, &id)?;
        save_jsonl_atomic(&self.tasks_path, &tasks)?;
        debug!(%id, "inserted task");
        Ok(id)
    }

    /// Replaces every field of the task whose id matches `task.id`.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn update(&self, task: &Task) -> Result<()> {
        self.modify(&task.id, |slot| *slot = task.clone())
    }

    #[tracing::instrument(skip(self))]
    pub fn update_date(&self, id: &str, date: &str) -> Result<()> {
        self.modify(id, |slot| slot.date = date.to_string())
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.guard(LockMode::Exclusive)?;
        let mut tasks = load_jsonl(&self.tasks_path)?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Err(not_found(id));
        }
        save_jsonl_atomic(&self.tasks_path, &tasks)?;
        debug!(remaining = tasks.len(), "deleted task");
        Ok(())
    }

    fn modify<F>(&self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Task),
    {
        let _guard = self.guard(LockMode::Exclusive)?;
        let mut tasks = load_jsonl(&self.tasks_path)?;
        let slot = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| not_found(id))?;
        apply(slot);
        slot.id = id.to_string();
        save_jsonl_atomic(&self.tasks_path, &tasks)
    }

    fn guard(&self, mode: LockMode) -> Result<StoreGuard<'_>> {
        let thread = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        let io_err = |source| StoreError::Io {
            path: self.lock_path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(io_err)?;
        match mode {
            LockMode::Shared => fs2::FileExt::lock_shared(&file),
            LockMode::Exclusive => fs2::FileExt::lock_exclusive(&file),
        }
        .map_err(io_err)?;

        Ok(StoreGuard {
            file,
            path: &self.lock_path,
            mode,
            _thread: thread,
        })
    }

    fn load_sequence(&self) -> Result<u64> {
        let raw = fs::read_to_string(&self.sequence_path).map_err(|source| StoreError::Io {
            path: self.sequence_path.clone(),
            source,
        })?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse().map_err(|_| StoreError::Sequence {
            path: self.sequence_path.clone(),
            raw: trimmed.to_string(),
        })
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound { id: id.to_string() }
}

fn numeric_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let mut payload = String::new();
    for task in tasks {
        payload.push_str(&serde_json::to_string(task)?);
        payload.push('\n');
    }
    save_text_atomic(path, &payload)
}

fn save_text_atomic(path: &Path, payload: &str) -> Result<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    temp.write_all(payload.as_bytes()).map_err(io_err)?;
    temp.flush().map_err(io_err)?;
    temp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}
