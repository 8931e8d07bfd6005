//! Repository cache & mutation layer
//!
//! Keeps a session's view of its GitHub repositories in sync with the API:
//! - List and detail fetches fill the [`RepositoryCache`]
//! - Create/update patch the cache once GitHub confirms
//! - Delete/batch delete patch the cache optimistically and roll back on failure
//! - Every mutation is followed by a reconciliation fetch
//! - Mutations run on their own task and settle even if the caller goes away

mod cache;
mod registry;

pub use cache::{CachePatch, DEFAULT_STALE_AFTER, MutationToken, RepositoryCache};
pub use registry::RepositorySessions;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::async_trait;
use thiserror::Error;

use crate::github::{
    CreateRepositoryParams, GitHubClient, GitHubError, ListRepositoriesParams, Repository,
    RepositoryKey, UpdateRepositoryParams,
};
use crate::metrics::{CACHE_ROLLBACKS_TOTAL, REPOSITORY_MUTATIONS_TOTAL};

/// Failure of a cache-backed repository operation
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] GitHubError),

    /// At least one delete of a batch failed; the whole batch was rolled back
    #[error("failed to delete {failed} of {total} repositories: {source}")]
    BatchDelete {
        failed: usize,
        total: usize,
        source: GitHubError,
    },

    /// The task driving the mutation panicked
    #[error("repository task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// The GitHub error behind this failure
    pub fn upstream(&self) -> Option<&GitHubError> {
        match self {
            SyncError::Upstream(error) => Some(error),
            SyncError::BatchDelete { source, .. } => Some(source),
            SyncError::Task(_) => None,
        }
    }
}

/// Repository endpoints the mutation layer depends on
#[async_trait]
pub trait RepositoryApi: Send + Sync + 'static {
    async fn list_repositories(
        &self,
        token: &str,
        params: &ListRepositoriesParams,
    ) -> Result<Vec<Repository>, GitHubError>;

    async fn get_repository(
        &self,
        token: &str,
        owner: &str,
        name: &str,
    ) -> Result<Repository, GitHubError>;

    async fn get_repository_languages(
        &self,
        token: &str,
        owner: &str,
        name: &str,
    ) -> Result<BTreeMap<String, u64>, GitHubError>;

    async fn create_repository(
        &self,
        token: &str,
        params: &CreateRepositoryParams,
    ) -> Result<Repository, GitHubError>;

    async fn update_repository(
        &self,
        token: &str,
        owner: &str,
        name: &str,
        params: &UpdateRepositoryParams,
    ) -> Result<Repository, GitHubError>;

    async fn delete_repository(&self, token: &str, owner: &str, name: &str)
    -> Result<(), GitHubError>;
}

#[async_trait]
impl RepositoryApi for GitHubClient {
    async fn list_repositories(
        &self,
        token: &str,
        params: &ListRepositoriesParams,
    ) -> Result<Vec<Repository>, GitHubError> {
        self.list_user_repositories(token, params).await
    }

    async fn get_repository(
        &self,
        token: &str,
        owner: &str,
        name: &str,
    ) -> Result<Repository, GitHubError> {
        GitHubClient::get_repository(self, token, owner, name).await
    }

    async fn get_repository_languages(
        &self,
        token: &str,
        owner: &str,
        name: &str,
    ) -> Result<BTreeMap<String, u64>, GitHubError> {
        GitHubClient::get_repository_languages(self, token, owner, name).await
    }

    async fn create_repository(
        &self,
        token: &str,
        params: &CreateRepositoryParams,
    ) -> Result<Repository, GitHubError> {
        GitHubClient::create_repository(self, token, params).await
    }

    async fn update_repository(
        &self,
        token: &str,
        owner: &str,
        name: &str,
        params: &UpdateRepositoryParams,
    ) -> Result<Repository, GitHubError> {
        GitHubClient::update_repository(self, token, owner, name, params).await
    }

    async fn delete_repository(
        &self,
        token: &str,
        owner: &str,
        name: &str,
    ) -> Result<(), GitHubError> {
        GitHubClient::delete_repository(self, token, owner, name).await
    }
}

/// When the list is refetched after a mutation settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Await the refetch before the mutation returns
    #[default]
    Inline,
    /// Refetch on a spawned task
    Background,
    /// Leave the cache as the mutation settled it
    Off,
}

/// Repository view of one session, bound to its access token
pub struct RepositorySync<A: RepositoryApi = GitHubClient> {
    api: Arc<A>,
    token: String,
    cache: Arc<RepositoryCache>,
    reconcile: ReconcileMode,
}

impl<A: RepositoryApi> Clone for RepositorySync<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            token: self.token.clone(),
            cache: self.cache.clone(),
            reconcile: self.reconcile,
        }
    }
}

impl<A: RepositoryApi> std::fmt::Debug for RepositorySync<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySync")
            .field("cached", &self.cache.len())
            .field("reconcile", &self.reconcile)
            .finish_non_exhaustive()
    }
}

impl<A: RepositoryApi> RepositorySync<A> {
    pub fn new(api: Arc<A>, token: impl Into<String>) -> Self {
        Self {
            api,
            token: token.into(),
            cache: Arc::new(RepositoryCache::default()),
            reconcile: ReconcileMode::default(),
        }
    }

    pub fn with_reconcile(mut self, reconcile: ReconcileMode) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn cache(&self) -> &Arc<RepositoryCache> {
        &self.cache
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// Fetching is only enabled with a non-empty access token
    pub fn is_enabled(&self) -> bool {
        !self.token.trim().is_empty()
    }

    fn ensure_enabled(&self) -> Result<(), SyncError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(SyncError::Upstream(GitHubError::MissingToken))
        }
    }

    /// Fetch the full list and replace the cache with it
    pub async fn fetch_list(&self) -> Result<Vec<Repository>, SyncError> {
        self.ensure_enabled()?;

        let repositories = self
            .api
            .list_repositories(&self.token, &ListRepositoriesParams::dashboard())
            .await?;
        self.cache.replace_list(repositories.clone());

        tracing::debug!(count = repositories.len(), "Repository list fetched");
        Ok(repositories)
    }

    /// Cached list while fresh, otherwise a fetch
    pub async fn list(&self) -> Result<Vec<Repository>, SyncError> {
        if self.cache.is_fresh() {
            if let Some(repositories) = self.cache.list() {
                return Ok(repositories);
            }
        }
        self.fetch_list().await
    }

    /// Fetch one repository and store it as a detail entry
    pub async fn fetch_detail(&self, owner: &str, name: &str) -> Result<Repository, SyncError> {
        self.ensure_enabled()?;

        let repository = self.api.get_repository(&self.token, owner, name).await?;
        self.cache.put_detail(repository.clone());
        Ok(repository)
    }

    /// Cached detail entry, otherwise a fetch
    pub async fn detail(&self, owner: &str, name: &str) -> Result<Repository, SyncError> {
        match self.cache.detail(&RepositoryKey::new(owner, name)) {
            Some(repository) => Ok(repository),
            None => self.fetch_detail(owner, name).await,
        }
    }

    /// Language breakdown (bytes per language); not cached
    pub async fn languages(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<BTreeMap<String, u64>, SyncError> {
        self.ensure_enabled()?;
        Ok(self
            .api
            .get_repository_languages(&self.token, owner, name)
            .await?)
    }

    /// Create a repository; it becomes the first list entry on success
    pub async fn create(&self, params: &CreateRepositoryParams) -> Result<Repository, SyncError> {
        self.ensure_enabled()?;

        let sync = self.clone();
        let params = params.clone();
        detached(async move { sync.run_create(&params).await }).await
    }

    async fn run_create(&self, params: &CreateRepositoryParams) -> Result<Repository, SyncError> {
        let result = self.api.create_repository(&self.token, params).await;
        match &result {
            Ok(repository) => {
                let token = self.cache.apply(CachePatch::Prepend(repository.clone()));
                self.cache.commit(token);
                record_mutation("create", "success");
                tracing::info!(repository = %repository.key(), "Repository created");
            }
            Err(error) => {
                record_mutation("create", "failure");
                tracing::warn!(name = %params.name, %error, "Repository creation failed");
            }
        }

        self.reconcile().await;
        Ok(result?)
    }

    /// Update a repository; list and detail entries are replaced on success
    pub async fn update(
        &self,
        owner: &str,
        name: &str,
        params: &UpdateRepositoryParams,
    ) -> Result<Repository, SyncError> {
        self.ensure_enabled()?;

        let sync = self.clone();
        let key = RepositoryKey::new(owner, name);
        let params = params.clone();
        detached(async move { sync.run_update(key, &params).await }).await
    }

    async fn run_update(
        &self,
        key: RepositoryKey,
        params: &UpdateRepositoryParams,
    ) -> Result<Repository, SyncError> {
        let result = self
            .api
            .update_repository(&self.token, &key.owner, &key.name, params)
            .await;
        match &result {
            Ok(repository) => {
                tracing::info!(repository = %key, "Repository updated");
                let token = self.cache.apply(CachePatch::Replace {
                    key,
                    repository: repository.clone(),
                });
                self.cache.commit(token);
                record_mutation("update", "success");
            }
            Err(error) => {
                record_mutation("update", "failure");
                tracing::warn!(repository = %key, %error, "Repository update failed");
            }
        }

        self.reconcile().await;
        Ok(result?)
    }

    /// Delete a repository, removing it from the cache before GitHub answers
    ///
    /// A 404 means it is already gone and counts as success. Any other
    /// failure restores the cache to its state before the removal.
    ///
    /// The rollback restores the snapshot taken at removal time, so it also
    /// undoes removals committed by concurrent deletes in between. The
    /// reconciliation fetch that follows corrects the list.
    pub async fn delete(&self, owner: &str, name: &str) -> Result<(), SyncError> {
        self.ensure_enabled()?;

        let sync = self.clone();
        let key = RepositoryKey::new(owner, name);
        detached(async move { sync.run_delete(key).await }).await
    }

    async fn run_delete(&self, key: RepositoryKey) -> Result<(), SyncError> {
        let token = self.cache.apply(CachePatch::Remove(vec![key.clone()]));

        let result = self
            .api
            .delete_repository(&self.token, &key.owner, &key.name)
            .await;
        let outcome = match result {
            Ok(()) => {
                self.cache.commit(token);
                record_mutation("delete", "success");
                tracing::info!(repository = %key, "Repository deleted");
                Ok(())
            }
            Err(error) if error.is_not_found() => {
                self.cache.commit(token);
                record_mutation("delete", "not_found");
                tracing::info!(repository = %key, "Repository already deleted");
                Ok(())
            }
            Err(error) => {
                self.cache.rollback(token);
                record_mutation("delete", "failure");
                CACHE_ROLLBACKS_TOTAL.with_label_values(&["delete"]).inc();
                tracing::warn!(repository = %key, %error, "Repository delete failed, rolled back");
                Err(SyncError::Upstream(error))
            }
        };

        self.reconcile().await;
        outcome
    }

    /// Delete several repositories concurrently
    ///
    /// All keys leave the cache up front. The batch succeeds only if every
    /// delete succeeded or hit 404; otherwise the whole removal is rolled
    /// back, even though some deletes may already have taken effect.
    /// Returns the number of distinct repositories targeted.
    pub async fn batch_delete(&self, keys: &[RepositoryKey]) -> Result<usize, SyncError> {
        self.ensure_enabled()?;

        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(0);
        }

        let sync = self.clone();
        detached(async move { sync.run_batch_delete(keys).await }).await
    }

    async fn run_batch_delete(&self, keys: Vec<RepositoryKey>) -> Result<usize, SyncError> {
        let total = keys.len();
        let token = self.cache.apply(CachePatch::Remove(keys.clone()));

        let results = futures::future::join_all(
            keys.iter()
                .map(|key| self.api.delete_repository(&self.token, &key.owner, &key.name)),
        )
        .await;

        let mut failures = results
            .into_iter()
            .filter_map(Result::err)
            .filter(|error| !error.is_not_found());

        let outcome = match failures.next() {
            None => {
                self.cache.commit(token);
                record_mutation("batch_delete", "success");
                tracing::info!(count = total, "Repositories deleted");
                Ok(total)
            }
            Some(first) => {
                let failed = 1 + failures.count();
                self.cache.rollback(token);
                record_mutation("batch_delete", "failure");
                CACHE_ROLLBACKS_TOTAL
                    .with_label_values(&["batch_delete"])
                    .inc();
                tracing::warn!(
                    failed,
                    total,
                    error = %first,
                    "Batch delete failed, rolled back"
                );
                Err(SyncError::BatchDelete {
                    failed,
                    total,
                    source: first,
                })
            }
        };

        self.reconcile().await;
        outcome
    }

    /// Refetch the list after a mutation settled
    ///
    /// Failures are logged; the mutation's own result stands.
    async fn reconcile(&self) {
        match self.reconcile {
            ReconcileMode::Off => {}
            ReconcileMode::Inline => {
                if let Err(error) = self.fetch_list().await {
                    self.cache.invalidate();
                    tracing::warn!(%error, "Reconciliation fetch failed");
                }
            }
            ReconcileMode::Background => {
                let sync = self.clone();
                tokio::spawn(async move {
                    if let Err(error) = sync.fetch_list().await {
                        sync.cache.invalidate();
                        tracing::warn!(%error, "Background reconciliation fetch failed");
                    }
                });
            }
        }
    }
}

/// Run a mutation on its own task and wait for it
///
/// Dropping the returned future detaches from the task instead of cancelling
/// it, so the network call still completes and the optimistic patch is
/// always committed or rolled back, then reconciled.
async fn detached<T, F>(mutation: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SyncError>> + Send + 'static,
{
    tokio::spawn(mutation).await?
}

fn record_mutation(kind: &str, outcome: &str) {
    REPOSITORY_MUTATIONS_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}
