//! Transactional repository cache
//!
//! Holds one session's repository list plus per-repository detail entries,
//! both keyed by `(owner, name)`. Mutations go through [`RepositoryCache::apply`],
//! which snapshots the prior state so the change can later be committed or
//! rolled back verbatim.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::github::{Repository, RepositoryKey};

/// Default time a fetched list is served without refetching
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

/// Change applied to the cached list and detail entries
#[derive(Debug, Clone)]
pub enum CachePatch {
    /// Insert at the front of the list (newest first)
    Prepend(Repository),
    /// Replace the entry stored under `key`; the repository may carry a new key
    Replace {
        key: RepositoryKey,
        repository: Repository,
    },
    /// Drop every listed key
    Remove(Vec<RepositoryKey>),
}

/// Handle of an applied, not yet settled patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationToken(u64);

#[derive(Debug, Clone)]
struct Snapshot {
    list: Option<Vec<Repository>>,
    details: HashMap<RepositoryKey, Repository>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// `None` until the first list fetch
    list: Option<Vec<Repository>>,
    fetched_at: Option<Instant>,
    details: HashMap<RepositoryKey, Repository>,
    pending: HashMap<MutationToken, Snapshot>,
    next_token: u64,
}

impl CacheState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            list: self.list.clone(),
            details: self.details.clone(),
        }
    }

    fn patch(&mut self, patch: CachePatch) {
        match patch {
            CachePatch::Prepend(repository) => {
                let key = repository.key();
                if let Some(list) = self.list.as_mut() {
                    list.retain(|entry| entry.key() != key);
                    list.insert(0, repository.clone());
                }
                self.details.insert(key, repository);
            }
            CachePatch::Replace { key, repository } => {
                if let Some(entry) = self
                    .list
                    .as_mut()
                    .and_then(|list| list.iter_mut().find(|entry| entry.key() == key))
                {
                    *entry = repository.clone();
                }
                self.details.remove(&key);
                self.details.insert(repository.key(), repository);
            }
            CachePatch::Remove(keys) => {
                if let Some(list) = self.list.as_mut() {
                    list.retain(|entry| !keys.contains(&entry.key()));
                }
                for key in &keys {
                    self.details.remove(key);
                }
            }
        }
    }
}

/// Repository cache for one session
#[derive(Debug)]
pub struct RepositoryCache {
    state: RwLock<CacheState>,
    stale_after: Duration,
}

impl RepositoryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            stale_after,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached list, `None` if never fetched
    pub fn list(&self) -> Option<Vec<Repository>> {
        self.read().list.clone()
    }

    /// Whether the list was fetched within the stale window
    pub fn is_fresh(&self) -> bool {
        self.read()
            .fetched_at
            .is_some_and(|fetched_at| fetched_at.elapsed() < self.stale_after)
    }

    /// Replace the list wholesale with a server response
    ///
    /// Detail entries present in the list take the listed record. Entries
    /// missing from it are kept: the list only covers owned repositories on
    /// its first page, so absence does not mean deletion.
    pub fn replace_list(&self, repositories: Vec<Repository>) {
        let mut state = self.write();

        for repository in &repositories {
            if let Some(detail) = state.details.get_mut(&repository.key()) {
                *detail = repository.clone();
            }
        }

        state.list = Some(repositories);
        state.fetched_at = Some(Instant::now());
    }

    /// Mark the list stale so the next read refetches
    pub fn invalidate(&self) {
        self.write().fetched_at = None;
    }

    pub fn detail(&self, key: &RepositoryKey) -> Option<Repository> {
        self.read().details.get(key).cloned()
    }

    pub fn put_detail(&self, repository: Repository) {
        self.write().details.insert(repository.key(), repository);
    }

    /// Apply a patch, remembering the prior state under the returned token
    pub fn apply(&self, patch: CachePatch) -> MutationToken {
        let mut state = self.write();

        let token = MutationToken(state.next_token);
        state.next_token += 1;

        let snapshot = state.snapshot();
        state.pending.insert(token, snapshot);
        state.patch(patch);

        token
    }

    /// Keep the patch and forget its snapshot
    ///
    /// Returns `false` for unknown or already settled tokens.
    pub fn commit(&self, token: MutationToken) -> bool {
        self.write().pending.remove(&token).is_some()
    }

    /// Restore the state captured when `token` was applied
    ///
    /// The snapshot is restored verbatim, so patches applied after `token`
    /// are undone as well, including ones already committed. Callers follow
    /// a rollback with a list fetch to close that window.
    ///
    /// Returns `false` for unknown or already settled tokens.
    pub fn rollback(&self, token: MutationToken) -> bool {
        let mut state = self.write();
        match state.pending.remove(&token) {
            Some(snapshot) => {
                state.list = snapshot.list;
                state.details = snapshot.details;
                true
            }
            None => false,
        }
    }

    /// Number of applied patches not yet committed or rolled back
    pub fn pending_count(&self) -> usize {
        self.read().pending.len()
    }

    pub fn len(&self) -> usize {
        self.read().list.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RepositoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}
