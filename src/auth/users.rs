//! Email/password accounts
//!
//! The session controller only depends on [`UserStore`]; the in-memory
//! store below is seeded from configuration and can be swapped for a
//! persistent implementation.

use axum::async_trait;

use crate::config::UserSeed;
use crate::error::AppError;

/// A local account
#[derive(Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    /// bcrypt hash
    password_hash: String,
}

impl UserRecord {
    /// Account whose password is hashed with bcrypt at `cost`
    ///
    /// # Errors
    /// Returns error if hashing fails (e.g. cost out of range)
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        password: &str,
        cost: u32,
    ) -> Result<Self, AppError> {
        let password_hash = bcrypt::hash(password, cost)
            .map_err(|e| AppError::Encryption(format!("bcrypt error: {e}")))?;
        Ok(Self::with_password_hash(id, email, name, password_hash))
    }

    /// Account around an existing bcrypt hash
    pub fn with_password_hash(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            password_hash: password_hash.into(),
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Lookup capability used by login and identity lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError>;

    async fn verify_password(&self, user: &UserRecord, password: &str) -> Result<bool, AppError>;
}

/// Accounts held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Vec<UserRecord>,
}

impl InMemoryUserStore {
    /// Build the store from configured accounts
    ///
    /// Seeds carrying a `password_hash` are used as is; plain passwords are
    /// hashed with `cost`.
    pub fn from_seeds(seeds: &[UserSeed], cost: u32) -> Result<Self, AppError> {
        let users = seeds
            .iter()
            .map(|seed| match seed.password_hash.as_deref() {
                Some(hash) if !hash.is_empty() => Ok(UserRecord::with_password_hash(
                    &seed.id,
                    &seed.email,
                    &seed.name,
                    hash,
                )),
                _ => UserRecord::new(&seed.id, &seed.email, &seed.name, &seed.password, cost),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let email = email.trim();
        Ok(self
            .users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.iter().find(|user| user.id == id).cloned())
    }

    async fn verify_password(&self, user: &UserRecord, password: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let hash = user.password_hash.clone();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(|e| AppError::Encryption(format!("bcrypt error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    fn seed(id: &str, email: &str, password: &str, name: &str) -> UserSeed {
        UserSeed {
            id: id.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password_hash: None,
            name: name.to_string(),
        }
    }

    fn store() -> InMemoryUserStore {
        InMemoryUserStore::from_seeds(
            &[
                seed("1", "admin@example.com", "admin123", "Admin User"),
                seed("2", "user@example.com", "user123", "Test User"),
            ],
            TEST_COST,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn finds_users_by_email_ignoring_case() {
        let store = store();
        let user = store
            .find_by_email(" Admin@Example.com ")
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(user.id, "1");
        assert!(store.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finds_users_by_id() {
        let store = store();
        assert_eq!(store.find_by_id("2").await.unwrap().unwrap().name, "Test User");
        assert!(store.find_by_id("3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verifies_passwords() {
        let store = store();
        let user = store.find_by_email("user@example.com").await.unwrap().unwrap();
        assert!(store.verify_password(&user, "user123").await.unwrap());
        assert!(!store.verify_password(&user, "admin123").await.unwrap());
        assert!(!store.verify_password(&user, "").await.unwrap());
    }

    #[test]
    fn passwords_are_stored_as_salted_bcrypt_hashes() {
        let hashed = |id: &str| UserRecord::new(id, "a@example.com", "A", "same", TEST_COST);
        let first = hashed("1").unwrap();
        let second = hashed("2").unwrap();

        assert!(first.password_hash.starts_with("$2"));
        assert_ne!(first.password_hash, "same");
        assert_ne!(first.password_hash, second.password_hash);
    }

    #[tokio::test]
    async fn seeds_may_carry_a_precomputed_hash() {
        let hash = bcrypt::hash("hunter22", TEST_COST).unwrap();
        let mut hashed = seed("9", "ops@example.com", "", "Ops");
        hashed.password_hash = Some(hash.clone());

        let store = InMemoryUserStore::from_seeds(&[hashed], TEST_COST).unwrap();
        let user = store.find_by_id("9").await.unwrap().unwrap();
        assert_eq!(user.password_hash, hash);
        assert!(store.verify_password(&user, "hunter22").await.unwrap());
    }

    #[test]
    fn invalid_cost_is_rejected() {
        let error =
            UserRecord::new("1", "a@example.com", "A", "pw", 99).expect_err("cost too high");
        assert!(matches!(error, AppError::Encryption(_)));
    }

    #[test]
    fn debug_output_hides_password_hash() {
        let user = UserRecord::with_password_hash("1", "admin@example.com", "Admin", "$2b$04$abc");
        assert!(!format!("{user:?}").contains("$2b$"));
    }
}
