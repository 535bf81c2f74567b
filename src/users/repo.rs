use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    error::{UserError, UserResult},
    model::{NewUser, User, UserChanges},
};

/// Persistence contract for accounts. Every method only sees live rows.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `EmailExists`/`NameExists` if a live row already holds the key.
    async fn create(&self, input: NewUser) -> UserResult<User>;

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>>;

    async fn find_by_name(&self, name: &str) -> UserResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> UserResult<Option<User>>;

    /// Newest first.
    async fn find_all(&self) -> UserResult<Vec<User>>;

    /// Applies the present fields and stamps `updated_at`.
    async fn update(&self, id: Uuid, changes: UserChanges) -> UserResult<User>;

    async fn record_login(&self, id: Uuid) -> UserResult<()>;

    /// Not idempotent: a second call on the same id returns `NotFound`.
    async fn soft_delete(&self, id: Uuid) -> UserResult<()>;

    /// Number of live users.
    async fn count(&self) -> UserResult<i64>;
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, status, created_at, updated_at, last_login, deleted_at";

const EMAIL_INDEX: &str = "users_email_live_idx";
const NAME_INDEX: &str = "users_name_live_idx";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
    last_login: Option<OffsetDateTime>,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = UserError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse().map_err(UserError::Storage)?,
            status: r.status.parse().map_err(UserError::Storage)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_login: r.last_login,
            deleted_at: r.deleted_at,
        })
    }
}

/// Maps a partial-unique-index violation onto the matching duplicate error.
fn map_write_error(e: sqlx::Error) -> UserError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            match db.constraint() {
                Some(EMAIL_INDEX) => return UserError::EmailExists,
                Some(NAME_INDEX) => return UserError::NameExists,
                _ => {}
            }
        }
    }
    UserError::from(e)
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> UserResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, input: NewUser) -> UserResult<User> {
        let user = User::new(input);
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.status.as_str())
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.db)
            .await
            .map_err(map_write_error)?;
        User::try_from(row)
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn find_by_name(&self, name: &str) -> UserResult<Option<User>> {
        self.fetch_one_by("name", name).await
    }

    async fn find_by_id(&self, id: Uuid) -> UserResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_all(&self) -> UserResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> UserResult<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.email)
            .fetch_optional(&self.db)
            .await
            .map_err(map_write_error)?
            .ok_or(UserError::NotFound)?;
        User::try_from(row)
    }

    async fn record_login(&self, id: Uuid) -> UserResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET last_login = now(), updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> UserResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = now(), status = 'inactive', updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    async fn count(&self) -> UserResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}
