use std::{future::Future, sync::Arc, time::Duration};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::UpdateUserRequest,
    error::{UserError, UserResult},
    model::{normalize_email, NewUser, User, UserChanges},
    repo::UserRepository,
};
use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_dummy, verify_password},
    },
    validation::{validate_email, validate_name, validate_user_input},
};

/// Account workflows shared by the HTTP and gRPC surfaces.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    keys: JwtKeys,
    storage_timeout: Duration,
}

pub fn parse_user_id(raw: &str) -> UserResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| UserError::InvalidId)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, keys: JwtKeys, storage_timeout: Duration) -> Self {
        Self {
            repo,
            keys,
            storage_timeout,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Runs a repository call under the storage deadline.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> UserResult<T>
    where
        F: Future<Output = UserResult<T>>,
    {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.storage_timeout.as_millis() as u64, "storage deadline exceeded");
                Err(UserError::Storage(format!("{op} timed out")))
            }
        }
    }

    #[instrument(skip(self, password, email))]
    pub async fn register(&self, name: &str, email: &str, password: &str) -> UserResult<Uuid> {
        let email = normalize_email(email);
        validate_user_input(name, &email, password)?;
        let name = name.trim().to_string();

        if self
            .bounded("find_by_email", self.repo.find_by_email(&email))
            .await?
            .is_some()
        {
            warn!(email = %email, "email already registered");
            return Err(UserError::EmailExists);
        }
        if self
            .bounded("find_by_name", self.repo.find_by_name(&name))
            .await?
            .is_some()
        {
            warn!(name = %name, "name already taken");
            return Err(UserError::NameExists);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .bounded(
                "create",
                self.repo.create(NewUser {
                    name,
                    email,
                    password_hash,
                }),
            )
            .await?;

        info!(target: "audit", action = "user.register", user_id = %user.id, email = %user.email, "user registered");
        Ok(user.id)
    }

    #[instrument(skip(self, password, email))]
    pub async fn login(&self, email: &str, password: &str) -> UserResult<String> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.is_empty() {
            return Err(UserError::Validation("password is required".into()));
        }

        let user = match self
            .bounded("find_by_email", self.repo.find_by_email(&email))
            .await?
        {
            Some(u) => u,
            None => {
                verify_dummy(password);
                warn!(email = %email, "login unknown email");
                return Err(UserError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(UserError::InvalidCredentials);
        }

        // The account may be deleted between lookup and stamp.
        match self
            .bounded("record_login", self.repo.record_login(user.id))
            .await
        {
            Err(UserError::NotFound) => {
                warn!(user_id = %user.id, "login user vanished");
                return Err(UserError::InvalidCredentials);
            }
            other => other?,
        }
        let token = self.keys.sign(user.id)?;

        info!(target: "audit", action = "user.login", user_id = %user.id, "user logged in");
        Ok(token)
    }

    pub async fn list_users(&self) -> UserResult<Vec<User>> {
        self.bounded("find_all", self.repo.find_all()).await
    }

    pub async fn get_user(&self, id: &str) -> UserResult<User> {
        let id = parse_user_id(id)?;
        self.bounded("find_by_id", self.repo.find_by_id(id))
            .await?
            .ok_or(UserError::NotFound)
    }

    #[instrument(skip(self, request))]
    pub async fn update_user(&self, id: &str, request: UpdateUserRequest) -> UserResult<User> {
        let id = parse_user_id(id)?;
        let changes = UserChanges {
            name: non_blank(request.name).map(|n| n.trim().to_string()),
            email: non_blank(request.email).map(|e| normalize_email(&e)),
        };
        if changes.is_empty() {
            return Err(UserError::Validation("no data to update".into()));
        }
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }
        if let Some(email) = &changes.email {
            validate_email(email)?;
        }

        if self
            .bounded("find_by_id", self.repo.find_by_id(id))
            .await?
            .is_none()
        {
            return Err(UserError::NotFound);
        }
        if let Some(name) = &changes.name {
            let holder = self
                .bounded("find_by_name", self.repo.find_by_name(name))
                .await?;
            if holder.is_some_and(|u| u.id != id) {
                return Err(UserError::NameExists);
            }
        }
        if let Some(email) = &changes.email {
            let holder = self
                .bounded("find_by_email", self.repo.find_by_email(email))
                .await?;
            if holder.is_some_and(|u| u.id != id) {
                return Err(UserError::EmailExists);
            }
        }

        let user = self.bounded("update", self.repo.update(id, changes)).await?;
        info!(target: "audit", action = "user.update", user_id = %id, "user updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> UserResult<()> {
        let id = parse_user_id(id)?;
        self.bounded("soft_delete", self.repo.soft_delete(id)).await?;
        info!(target: "audit", action = "user.delete", user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn count_live_users(&self) -> UserResult<i64> {
        self.bounded("count", self.repo.count()).await
    }
}
