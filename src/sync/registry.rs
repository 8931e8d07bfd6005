//! Per-session repository views
//!
//! One [`RepositorySync`] per signed-in user, created on first use and
//! dropped on logout or after sitting idle for a session lifetime.
//! Uses Moka for the keyed, idle-expiring storage.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::{RepositoryApi, RepositorySync};
use crate::github::GitHubClient;
use crate::metrics::REPOSITORY_SESSIONS;

/// Registry of repository views keyed by user id
pub struct RepositorySessions<A: RepositoryApi = GitHubClient> {
    api: Arc<A>,
    /// User id -> view bound to that user's access token
    views: Cache<String, Arc<RepositorySync<A>>>,
}

impl<A: RepositoryApi> RepositorySessions<A> {
    /// Create a registry whose views expire after `max_idle` without use
    pub fn new(api: Arc<A>, max_idle: Duration) -> Self {
        let views = Cache::builder().time_to_idle(max_idle).build();
        Self { api, views }
    }

    /// View for `user_id`, created or rebuilt when the access token changed
    pub fn get_or_create(&self, user_id: &str, access_token: &str) -> Arc<RepositorySync<A>> {
        if let Some(sync) = self.views.get(user_id) {
            if sync.token() == access_token {
                return sync;
            }
            tracing::debug!(user_id, "Access token changed, rebuilding repository cache");
        }

        let sync = Arc::new(RepositorySync::new(self.api.clone(), access_token));
        self.views.insert(user_id.to_string(), sync.clone());
        REPOSITORY_SESSIONS.set(self.views.entry_count() as i64);

        sync
    }

    /// Drop the view of `user_id`; returns whether one existed
    pub fn evict(&self, user_id: &str) -> bool {
        let removed = self.views.remove(user_id).is_some();
        REPOSITORY_SESSIONS.set(self.len() as i64);
        removed
    }

    /// Number of live views
    pub fn len(&self) -> usize {
        self.views.run_pending_tasks();
        self.views.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
