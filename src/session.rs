// src/session.rs

use moka::{notification::RemovalCause, sync::Cache};
use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::debug;
use uuid::Uuid;

use crate::{group::CityGroup, workspace::CycleId};

/// Opaque per-browser session identifier, carried in the `session_id` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// The most recent grouping result for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub cycle: CycleId,
    pub prefix: String,
    pub headers: Vec<String>,
    pub groups: Vec<CityGroup>,
}

#[derive(Debug, Default)]
struct Entry {
    upload: Option<UploadSession>,
    notices: Vec<String>,
}

impl Entry {
    fn is_empty(&self) -> bool {
        self.upload.is_none() && self.notices.is_empty()
    }
}

type Shared = Arc<Mutex<Entry>>;

/// Called with the upload of every session dropped for idleness or capacity.
pub type EvictedUpload = Arc<dyn Fn(UploadSession) + Send + Sync>;

/// Process-local session state, keyed by [`SessionId`].
///
/// Entries exist only while they hold an upload or pending notices. Idle
/// sessions expire after `idle`, and at most `capacity` are kept; the upload
/// of a session dropped that way is handed to the eviction callback.
#[derive(Clone)]
pub struct SessionStore {
    entries: Cache<SessionId, Shared>,
}

impl SessionStore {
    pub fn new(capacity: u64, idle: Duration, on_evict: EvictedUpload) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(idle)
            .eviction_listener(move |id: Arc<SessionId>, entry: Shared, cause| {
                // explicit removals and replacements are handled by the caller
                if !matches!(cause, RemovalCause::Expired | RemovalCause::Size) {
                    return;
                }
                let upload = lock(&entry).upload.take();
                if let Some(upload) = upload {
                    debug!(session = %id, cycle = %upload.cycle, ?cause, "session evicted");
                    on_evict(upload);
                }
            })
            .build();
        Self { entries }
    }

    fn entry(&self, id: SessionId) -> Shared {
        self.entries.get_with(id, Shared::default)
    }

    /// Store `upload` for `id`, returning the upload it replaces.
    pub fn save(&self, id: SessionId, upload: UploadSession) -> Option<UploadSession> {
        lock(&self.entry(id)).upload.replace(upload)
    }

    pub fn load(&self, id: SessionId) -> Option<UploadSession> {
        let entry = self.entries.get(&id)?;
        let upload = lock(&entry).upload.clone();
        upload
    }

    /// Drop everything held for `id`, pending notices included.
    pub fn clear(&self, id: SessionId) {
        self.entries.invalidate(&id);
    }

    /// Queue a one-time notice for the next rendered page.
    pub fn flash(&self, id: SessionId, notice: impl Into<String>) {
        lock(&self.entry(id)).notices.push(notice.into());
    }

    pub fn take_notices(&self, id: SessionId) -> Vec<String> {
        let Some(entry) = self.entries.get(&id) else {
            return Vec::new();
        };
        let (notices, empty) = {
            let mut guard = lock(&entry);
            (std::mem::take(&mut guard.notices), guard.is_empty())
        };
        if empty {
            self.entries.invalidate(&id);
        }
        notices
    }

    /// Apply pending expiry and capacity evictions now.
    pub fn run_maintenance(&self) {
        self.entries.run_pending_tasks();
    }

    /// Number of live sessions, after pending maintenance.
    pub fn len(&self) -> u64 {
        self.run_maintenance();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(entry: &Mutex<Entry>) -> MutexGuard<'_, Entry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
