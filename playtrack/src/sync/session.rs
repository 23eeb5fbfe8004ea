use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds of idle time that separate two sessions.
pub const SESSION_GAP_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error on session file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionState {
    #[serde(default)]
    pub session_count: u32,
    #[serde(rename = "last_playtime", default)]
    pub last_usage_minutes: u64,
    #[serde(rename = "last_played", default)]
    pub last_used: i64,
}

/// Durable `app_id -> SessionState` mapping backed by one JSON file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    states: BTreeMap<u32, SessionState>,
}

impl SessionStore {
    /// Loads the mapping; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let states = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                SessionError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        Ok(Self { path, states })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, app_id: u32) -> Option<&SessionState> {
        self.states.get(&app_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &SessionState)> {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    fn insert(&mut self, app_id: u32, state: SessionState) {
        self.states.insert(app_id, state);
    }

    /// Rewrites the whole mapping through a sibling temp file.
    pub fn save(&self) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let payload = serde_json::to_vec_pretty(&self.states).map_err(|source| {
            SessionError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let partial = partial_path(&self.path);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&partial)
            .map_err(io_err)?;
        file.write_all(&payload).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&partial, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}

/// Infers play sessions from the cumulative playtime counter.
///
/// A session is counted when playtime grew since the last observation and
/// the new last-played stamp is more than [`SESSION_GAP_SECS`] after the
/// previous one. Every observation is written through to the store.
#[derive(Debug)]
pub struct SessionTracker {
    store: SessionStore,
}

impl SessionTracker {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn into_store(self) -> SessionStore {
        self.store
    }

    pub fn observe(
        &mut self,
        app_id: u32,
        usage_minutes: u64,
        last_used: i64,
    ) -> Result<u32, SessionError> {
        let next = match self.store.get(app_id) {
            None => SessionState {
                session_count: u32::from(usage_minutes > 0),
                last_usage_minutes: usage_minutes,
                last_used,
            },
            Some(prev) if usage_minutes > prev.last_usage_minutes => {
                let gap = last_used.saturating_sub(prev.last_used);
                SessionState {
                    session_count: if gap > SESSION_GAP_SECS {
                        prev.session_count.saturating_add(1)
                    } else {
                        prev.session_count
                    },
                    last_usage_minutes: usage_minutes,
                    last_used,
                }
            }
            Some(prev) => *prev,
        };
        self.store.insert(app_id, next);
        self.store.save()?;
        Ok(next.session_count)
    }
}
