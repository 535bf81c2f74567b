use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    error::{UserError, UserResult},
    model::{NewUser, User, UserChanges},
    repo::UserRepository,
};

/// Process-local repository backing `AppState::fake`.
///
/// Duplicate checks and inserts run under the same write lock, so concurrent
/// registrations with one email cannot both succeed.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflict(users: &HashMap<Uuid, User>, skip: Option<Uuid>, name: Option<&str>, email: Option<&str>) -> Option<UserError> {
    let others = || users.values().filter(|u| u.is_live() && Some(u.id) != skip);
    if let Some(email) = email {
        if others().any(|u| u.email == email) {
            return Some(UserError::EmailExists);
        }
    }
    if let Some(name) = name {
        if others().any(|u| u.name == name) {
            return Some(UserError::NameExists);
        }
    }
    None
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, input: NewUser) -> UserResult<User> {
        let mut users = self.users.write().await;
        if let Some(err) = conflict(&users, None, Some(&input.name), Some(&input.email)) {
            return Err(err);
        }
        let user = User::new(input);
        users.insert(user.id, user.clone());
        tracing::debug!(user_id = %user.id, "stored user in memory");
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.is_live() && u.email == email)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> UserResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.is_live() && u.name == name)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> UserResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).filter(|u| u.is_live()).cloned())
    }

    async fn find_all(&self) -> UserResult<Vec<User>> {
        let users = self.users.read().await;
        let mut live: Vec<User> = users.values().filter(|u| u.is_live()).cloned().collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> UserResult<User> {
        let mut users = self.users.write().await;
        if !users.get(&id).is_some_and(User::is_live) {
            return Err(UserError::NotFound);
        }
        if let Some(err) = conflict(
            &users,
            Some(id),
            changes.name.as_deref(),
            changes.email.as_deref(),
        ) {
            return Err(err);
        }
        let user = users.get_mut(&id).ok_or(UserError::NotFound)?;
        user.apply(&changes);
        Ok(user.clone())
    }

    async fn record_login(&self, id: Uuid) -> UserResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .filter(|u| u.is_live())
            .ok_or(UserError::NotFound)?;
        user.mark_login();
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> UserResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .filter(|u| u.is_live())
            .ok_or(UserError::NotFound)?;
        user.soft_delete();
        Ok(())
    }

    async fn count(&self) -> UserResult<i64> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| u.is_live()).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn create_and_find() {
        let repo = InMemoryUserRepository::new();
        let created = repo.create(new_user("Alice", "alice@x.com")).await.unwrap();

        let by_id = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@x.com");
        assert!(repo.find_by_email("alice@x.com").await.unwrap().is_some());
        assert!(repo.find_by_name("Alice").await.unwrap().is_some());
        assert!(repo.find_by_name("Bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("Alice", "alice@x.com")).await.unwrap();

        let err = repo.create(new_user("Bob", "alice@x.com")).await.unwrap_err();
        assert!(matches!(err, UserError::EmailExists));
        let err = repo.create(new_user("Alice", "bob@x.com")).await.unwrap_err();
        assert!(matches!(err, UserError::NameExists));
    }

    #[tokio::test]
    async fn soft_deleted_rows_are_invisible_and_free_their_keys() {
        let repo = InMemoryUserRepository::new();
        let alice = repo.create(new_user("Alice", "alice@x.com")).await.unwrap();
        repo.soft_delete(alice.id).await.unwrap();

        assert!(repo.find_by_id(alice.id).await.unwrap().is_none());
        assert!(repo.find_by_email("alice@x.com").await.unwrap().is_none());
        assert!(repo.find_all().await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 0);

        assert!(matches!(
            repo.soft_delete(alice.id).await,
            Err(UserError::NotFound)
        ));
        repo.create(new_user("Alice", "alice@x.com")).await.unwrap();
    }

    #[tokio::test]
    async fn update_checks_other_rows_only() {
        let repo = InMemoryUserRepository::new();
        let alice = repo.create(new_user("Alice", "alice@x.com")).await.unwrap();
        repo.create(new_user("Bob", "bob@x.com")).await.unwrap();

        let same = repo
            .update(
                alice.id,
                UserChanges {
                    name: Some("Alice".into()),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(same.name, "Alice");

        let err = repo
            .update(
                alice.id,
                UserChanges {
                    name: None,
                    email: Some("bob@x.com".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::EmailExists));

        let err = repo
            .update(Uuid::new_v4(), UserChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::NotFound));
    }

    #[tokio::test]
    async fn concurrent_creates_with_same_email_admit_one() {
        let repo = InMemoryUserRepository::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create(new_user(&format!("User {i}"), "same@x.com")).await
                })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn record_login_stamps_last_login() {
        let repo = InMemoryUserRepository::new();
        let alice = repo.create(new_user("Alice", "alice@x.com")).await.unwrap();
        repo.record_login(alice.id).await.unwrap();
        let alice = repo.find_by_id(alice.id).await.unwrap().unwrap();
        assert!(alice.last_login.is_some());
    }
}
