//! GitHub REST resources
//!
//! Only the fields the dashboard reads are modelled; unknown fields are
//! ignored and missing non-key fields fall back to defaults.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Repository
// =============================================================================

/// Repository owner (user or organization)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOwner {
    pub login: String,
    pub id: u64,
    pub avatar_url: String,
    #[serde(rename = "type")]
    pub owner_type: String,
}

/// Repository resource as returned by `/user/repos` and `/repos/{owner}/{repo}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub id: u64,
    pub node_id: String,
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub owner: RepositoryOwner,
    pub html_url: String,
    pub description: Option<String>,
    pub fork: bool,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub git_url: String,
    pub ssh_url: String,
    pub clone_url: String,
    pub language: Option<String>,
    pub stargazers_count: u64,
    pub watchers_count: u64,
    pub forks_count: u64,
    pub open_issues_count: u64,
    pub default_branch: String,
    pub size: u64,
}

impl Repository {
    /// Cache key of this repository
    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.owner.login, &self.name)
    }
}

/// `(owner, name)` pair identifying a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryKey {
    pub owner: String,
    pub name: String,
}

impl RepositoryKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Body of `POST /user/repos`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRepositoryParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub auto_init: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitignore_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_template: Option<String>,
}

/// Body of `PATCH /repos/{owner}/{repo}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRepositoryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
}

impl UpdateRepositoryParams {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.private.is_none()
    }
}

/// Which repositories `/user/repos` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryAffiliation {
    All,
    Owner,
    Member,
}

/// Sort field for `/user/repos`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositorySort {
    Created,
    Updated,
    Pushed,
    FullName,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Query string of `GET /user/repos`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRepositoriesParams {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<RepositoryAffiliation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<RepositorySort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ListRepositoriesParams {
    /// Owned repositories, most recently updated first, one full page
    pub fn dashboard() -> Self {
        Self {
            affiliation: Some(RepositoryAffiliation::Owner),
            sort: Some(RepositorySort::Updated),
            direction: None,
            per_page: Some(100),
            page: None,
        }
    }
}
