//! Whole-collection persistence for the term set and quiz history.
//!
//! `FileStore` keeps a data directory with:
//! ```text
//! <data_dir>/
//! ├── terms.csv      # one row per term, editable by hand
//! └── history.json   # newest-first array of quiz attempts
//! ```
//! Writes go to a temp file first and are renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::history::{History, HistoryEntry};
use crate::term::{self, Term};

pub trait Store: Send {
    fn load(&self) -> Result<(Vec<Term>, History)>;

    fn save(&self, terms: &[Term], history: &History) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<FileStore> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| Error::storage(&dir, e))?;
        }
        Ok(FileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn terms_path(&self) -> PathBuf {
        self.dir.join("terms.csv")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("history.json")
    }

    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("data");
        let temp_path = self.dir.join(format!(".{file_name}.tmp"));
        {
            let mut file = fs::File::create(&temp_path).map_err(|e| Error::storage(&temp_path, e))?;
            file.write_all(bytes)
                .map_err(|e| Error::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| Error::storage(&temp_path, e))?;
        }
        fs::rename(&temp_path, path).map_err(|e| Error::storage(path, e))
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<(Vec<Term>, History)> {
        let terms_path = self.terms_path();
        let terms = if terms_path.exists() {
            let file = fs::File::open(&terms_path).map_err(|e| Error::storage(&terms_path, e))?;
            term::read_terms(file, Utc::now())?
        } else {
            Vec::new()
        };

        let history_path = self.history_path();
        let history = if history_path.exists() {
            let content =
                fs::read_to_string(&history_path).map_err(|e| Error::storage(&history_path, e))?;
            match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
                Ok(entries) => History::from_entries(entries),
                Err(e) => {
                    log::warn!(
                        "ignoring unreadable history at {}: {e}",
                        history_path.display()
                    );
                    History::new()
                }
            }
        } else {
            History::new()
        };

        Ok((terms, history))
    }

    fn save(&self, terms: &[Term], history: &History) -> Result<()> {
        let mut csv_bytes = Vec::new();
        term::write_terms(&mut csv_bytes, terms)?;
        self.atomic_write(&self.terms_path(), &csv_bytes)?;

        let json = serde_json::to_string_pretty(history)?;
        self.atomic_write(&self.history_path(), json.as_bytes())
    }
}

/// In-memory store, used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<(Vec<Term>, History)>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with_terms(terms: Vec<Term>) -> MemoryStore {
        MemoryStore {
            data: Mutex::new((terms, History::new())),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> (Vec<Term>, History) {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<(Vec<Term>, History)> {
        Ok(self.snapshot())
    }

    fn save(&self, terms: &[Term], history: &History) -> Result<()> {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = (terms.to_vec(), history.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
