//! Database store for users, tasks and login sessions

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::Session;
use crate::authz::TaskScope;
use crate::error::{AppError, Result};
use crate::models::{Task, User, WorkedHours};

const USER_COLUMNS: &str = r#"
    id, username, password_hash, email, first_name, last_name, role, admin_id, phone,
    is_active, last_login, created_at, updated_at, created_by, updated_by
"#;

const TASK_SELECT: &str = r#"
    SELECT t.id, t.title, t.description,
           t.assigned_to, ua.username AS assigned_to_username,
           t.assigned_by, ub.username AS assigned_by_username,
           t.due_date, t.status, t.completion_report, t.worked_hundredths, t.completed_at,
           t.created_at, t.updated_at,
           t.created_by, uc.username AS created_by_username,
           t.updated_by, uu.username AS updated_by_username
    FROM tasks t
    JOIN users ua ON ua.id = t.assigned_to
    LEFT JOIN users ub ON ub.id = t.assigned_by
    LEFT JOIN users uc ON uc.id = t.created_by
    LEFT JOIN users uu ON uu.id = t.updated_by
"#;

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // User operations

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            USER_COLUMNS
        ))
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.admin.map(|u| u.to_string()))
        .bind(&user.phone)
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.created_by.map(|u| u.to_string()))
        .bind(user.updated_by.map(|u| u.to_string()))
        .execute(&self.pool)
        .await
        .map_err(username_conflict)?;

        Ok(())
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.find_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    /// Every user, or only the users managed by `managed_by`. The admin
    /// itself is not part of its own listing.
    pub async fn list_users(&self, managed_by: Option<Uuid>) -> Result<Vec<User>> {
        let (filter, bind) = match managed_by {
            None => ("1 = 1", None),
            Some(admin) => ("admin_id = ?", Some(admin.to_string())),
        };
        let sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY created_at DESC",
            USER_COLUMNS, filter
        );

        let mut query = sqlx::query_as::<_, UserRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_admins(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE role IN ('ADMIN', 'SUPERADMIN') ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn update_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = ?, password_hash = ?, email = ?, first_name = ?, last_name = ?,
                role = ?, admin_id = ?, phone = ?, is_active = ?, updated_at = ?, updated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.admin.map(|u| u.to_string()))
        .bind(&user.phone)
        .bind(user.is_active)
        .bind(user.updated_at)
        .bind(user.updated_by.map(|u| u.to_string()))
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(username_conflict)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }

    pub async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    pub async fn count_users(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of users whose `admin` is `admin_id`
    pub async fn count_managed_users(&self, admin_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE admin_id = ?")
            .bind(admin_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // Task operations

    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, title, description, assigned_to, assigned_by, due_date, status,
                               completion_report, worked_hundredths, completed_at,
                               created_at, updated_at, created_by, updated_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assigned_to.to_string())
        .bind(task.assigned_by.map(|u| u.to_string()))
        .bind(task.due_date)
        .bind(task.status.as_str())
        .bind(&task.completion_report)
        .bind(task.worked_hours.map(|h| h.hundredths() as i64))
        .bind(task.completed_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.created_by.map(|u| u.to_string()))
        .bind(task.updated_by.map(|u| u.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a task if it lies inside `scope`
    pub async fn get_task(&self, id: Uuid, scope: TaskScope) -> Result<Task> {
        let (filter, binds) = task_filter(scope);
        let sql = format!("{} WHERE t.id = ? AND {}", TASK_SELECT, filter);

        let mut query = sqlx::query_as::<_, TaskRow>(&sql).bind(id.to_string());
        for value in binds {
            query = query.bind(value);
        }

        query
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?
            .try_into()
    }

    pub async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>> {
        let (filter, binds) = task_filter(scope);
        let sql = format!(
            "{} WHERE {} ORDER BY t.created_at DESC",
            TASK_SELECT, filter
        );

        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Write every mutable column of a task. `assigned_by` and `created_*`
    /// are never rewritten.
    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, assigned_to = ?, due_date = ?, status = ?,
                completion_report = ?, worked_hundredths = ?, completed_at = ?,
                updated_at = ?, updated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assigned_to.to_string())
        .bind(task.due_date)
        .bind(task.status.as_str())
        .bind(&task.completion_report)
        .bind(task.worked_hours.map(|h| h.hundredths() as i64))
        .bind(task.completed_at)
        .bind(task.updated_at)
        .bind(task.updated_by.map(|u| u.to_string()))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", task.id)));
        }
        Ok(())
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", id)));
        }
        Ok(())
    }

    // Session operations

    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, access_hash, access_expires_at,
                                  refresh_hash, refresh_expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(&session.access_hash)
        .bind(session.access_expires_at)
        .bind(&session.refresh_hash)
        .bind(session.refresh_expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_session_by_access(&self, access_hash: &str) -> Result<Option<Session>> {
        self.find_session("access_hash", access_hash).await
    }

    pub async fn find_session_by_refresh(&self, refresh_hash: &str) -> Result<Option<Session>> {
        self.find_session("refresh_hash", refresh_hash).await
    }

    async fn find_session(&self, column: &'static str, hash: &str) -> Result<Option<Session>> {
        sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT id, user_id, access_hash, access_expires_at,
                   refresh_hash, refresh_expires_at, created_at
            FROM sessions
            WHERE {} = ?
            "#,
            column
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?
        .map(Session::try_from)
        .transpose()
    }

    pub async fn rotate_access(
        &self,
        session_id: Uuid,
        access_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE sessions SET access_hash = ?, access_expires_at = ? WHERE id = ?")
            .bind(access_hash)
            .bind(expires_at)
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Drop sessions whose refresh token has expired
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn task_filter(scope: TaskScope) -> (&'static str, Vec<String>) {
    match scope {
        TaskScope::All => ("1 = 1", vec![]),
        TaskScope::ManagedBy(admin) => (
            "(ua.admin_id = ? OR t.assigned_by = ?)",
            vec![admin.to_string(), admin.to_string()],
        ),
        TaskScope::AssignedTo(user) => ("t.assigned_to = ?", vec![user.to_string()]),
    }
}

pub(crate) fn username_taken() -> AppError {
    AppError::validation("username", "A user with that username already exists.")
}

/// A UNIQUE violation on `users.username` becomes a field error
fn username_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.message().contains("users.username") =>
        {
            username_taken()
        }
        _ => AppError::Database(err),
    }
}

fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", column, e)))
}

fn parse_optional_uuid(value: Option<String>, column: &str) -> Result<Option<Uuid>> {
    value.map(|s| parse_uuid(&s, column)).transpose()
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    password_hash: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    admin_id: Option<String>,
    phone: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id, "id")?,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role: row
                .role
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid role: {}", e)))?,
            admin: parse_optional_uuid(row.admin_id, "admin_id")?,
            phone: row.phone,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: parse_optional_uuid(row.created_by, "created_by")?,
            updated_by: parse_optional_uuid(row.updated_by, "updated_by")?,
            password_hash: row.password_hash,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    assigned_to: String,
    assigned_to_username: String,
    assigned_by: Option<String>,
    assigned_by_username: Option<String>,
    due_date: NaiveDate,
    status: String,
    completion_report: String,
    worked_hundredths: Option<i64>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    created_by_username: Option<String>,
    updated_by: Option<String>,
    updated_by_username: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let worked_hours = row
            .worked_hundredths
            .map(|h| {
                u32::try_from(h)
                    .map_err(|e| e.to_string())
                    .and_then(WorkedHours::from_hundredths)
            })
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid worked hours: {}", e)))?;

        Ok(Task {
            id: parse_uuid(&row.id, "id")?,
            title: row.title,
            description: row.description,
            assigned_to: parse_uuid(&row.assigned_to, "assigned_to")?,
            assigned_to_username: row.assigned_to_username,
            assigned_by: parse_optional_uuid(row.assigned_by, "assigned_by")?,
            assigned_by_username: row.assigned_by_username,
            due_date: row.due_date,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            completion_report: row.completion_report,
            worked_hours,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: parse_optional_uuid(row.created_by, "created_by")?,
            created_by_username: row.created_by_username,
            updated_by: parse_optional_uuid(row.updated_by, "updated_by")?,
            updated_by_username: row.updated_by_username,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    access_hash: String,
    access_expires_at: DateTime<Utc>,
    refresh_hash: String,
    refresh_expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Session {
            id: parse_uuid(&row.id, "id")?,
            user_id: parse_uuid(&row.user_id, "user_id")?,
            access_hash: row.access_hash,
            access_expires_at: row.access_expires_at,
            refresh_hash: row.refresh_hash,
            refresh_expires_at: row.refresh_expires_at,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::tests::{make_task, make_user};
    use crate::models::{Role, TaskStatus};
    use chrono::Duration;

    async fn setup_test_db() -> Store {
        let pool = crate::db::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory database");
        Store::new(pool)
    }

    async fn seed(store: &Store, username: &str, role: Role, admin: Option<Uuid>) -> User {
        let user = make_user(username, role, admin);
        store.insert_user(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_insert_and_get_user() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;

        let fetched = store.get_user(alice.id).await.unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.role, Role::Admin);
        assert!(fetched.admin.is_none());
        assert!(fetched.is_active);

        let by_name = store.find_user_by_username("alice").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(alice.id));
        assert!(store.find_user_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let store = setup_test_db().await;
        let result = store.get_user(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected_by_schema() {
        let store = setup_test_db().await;
        seed(&store, "alice", Role::Admin, None).await;
        let dup = make_user("alice", Role::User, None);
        match store.insert_user(&dup).await {
            Err(AppError::Validation { field, message }) => {
                assert_eq!(field, "username");
                assert_eq!(message, "A user with that username already exists.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let mut bob = seed(&store, "bob", Role::User, None).await;
        bob.username = "alice".to_string();
        assert!(matches!(
            store.update_user(&bob).await,
            Err(AppError::Validation { .. })
        ));
        assert_eq!(store.get_user(bob.id).await.unwrap().username, "bob");
    }

    #[tokio::test]
    async fn test_list_users_by_scope() {
        let store = setup_test_db().await;
        let root = seed(&store, "root", Role::Superadmin, None).await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        seed(&store, "carol", Role::User, None).await;

        assert_eq!(store.list_users(None).await.unwrap().len(), 4);

        let managed = store.list_users(Some(alice.id)).await.unwrap();
        assert_eq!(managed.len(), 1);
        assert_eq!(managed[0].id, bob.id);

        assert!(store.list_users(Some(bob.id)).await.unwrap().is_empty());

        let admins = store.list_admins().await.unwrap();
        let ids: Vec<Uuid> = admins.iter().map(|u| u.id).collect();
        assert_eq!(admins.len(), 2);
        assert!(ids.contains(&root.id));
        assert!(ids.contains(&alice.id));

        assert_eq!(store.count_users().await.unwrap(), 4);
        assert_eq!(store.count_managed_users(alice.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_user() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let mut bob = seed(&store, "bob", Role::User, None).await;

        bob.admin = Some(alice.id);
        bob.phone = "555-0100".to_string();
        bob.updated_by = Some(alice.id);
        store.update_user(&bob).await.unwrap();

        let fetched = store.get_user(bob.id).await.unwrap();
        assert_eq!(fetched.admin, Some(alice.id));
        assert_eq!(fetched.phone, "555-0100");
        assert_eq!(fetched.updated_by, Some(alice.id));

        let ghost = make_user("ghost", Role::User, None);
        assert!(matches!(
            store.update_user(&ghost).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_login() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let now = Utc::now();
        store.record_login(alice.id, now).await.unwrap();
        let fetched = store.get_user(alice.id).await.unwrap();
        assert!(fetched.last_login.is_some());
    }

    #[tokio::test]
    async fn test_insert_and_get_task() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        let mut task = make_task(&bob, &alice);
        task.worked_hours = Some("1.75".parse().unwrap());
        store.insert_task(&task).await.unwrap();

        let fetched = store.get_task(task.id, TaskScope::All).await.unwrap();
        assert_eq!(fetched.title, task.title);
        assert_eq!(fetched.assigned_to_username, "bob");
        assert_eq!(fetched.assigned_by_username.as_deref(), Some("alice"));
        assert_eq!(fetched.created_by_username.as_deref(), Some("alice"));
        assert_eq!(fetched.due_date, task.due_date);
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.worked_hours.map(|h| h.hundredths()), Some(175));
    }

    #[tokio::test]
    async fn test_get_task_outside_scope_is_not_found() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let dave = seed(&store, "dave", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        let carol = seed(&store, "carol", Role::User, Some(alice.id)).await;
        let task = make_task(&bob, &alice);
        store.insert_task(&task).await.unwrap();

        assert!(store.get_task(task.id, TaskScope::ManagedBy(alice.id)).await.is_ok());
        assert!(store.get_task(task.id, TaskScope::AssignedTo(bob.id)).await.is_ok());
        assert!(matches!(
            store.get_task(task.id, TaskScope::ManagedBy(dave.id)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.get_task(task.id, TaskScope::AssignedTo(carol.id)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_tasks_admin_scope_is_exact() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let dave = seed(&store, "dave", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        let erin = seed(&store, "erin", Role::User, Some(dave.id)).await;

        let managed = make_task(&bob, &dave);
        let created = make_task(&erin, &alice);
        let foreign = make_task(&erin, &dave);
        for task in [&managed, &created, &foreign] {
            store.insert_task(task).await.unwrap();
        }

        let ids: Vec<Uuid> = store
            .list_tasks(TaskScope::ManagedBy(alice.id))
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&managed.id));
        assert!(ids.contains(&created.id));
        assert!(!ids.contains(&foreign.id));

        assert_eq!(store.list_tasks(TaskScope::All).await.unwrap().len(), 3);
        assert_eq!(
            store
                .list_tasks(TaskScope::AssignedTo(erin.id))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_update_task() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        let mut task = make_task(&bob, &alice);
        store.insert_task(&task).await.unwrap();

        let now = Utc::now();
        task.status = TaskStatus::Completed;
        task.completion_report = "done".to_string();
        task.worked_hours = Some("3.5".parse().unwrap());
        task.completed_at = Some(now);
        task.updated_by = Some(bob.id);
        task.updated_at = now;
        store.update_task(&task).await.unwrap();

        let fetched = store.get_task(task.id, TaskScope::All).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.completion_report, "done");
        assert!(fetched.completed_at.is_some());
        assert_eq!(fetched.updated_by_username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_delete_task() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        let task = make_task(&bob, &alice);
        store.insert_task(&task).await.unwrap();

        store.delete_task(task.id).await.unwrap();
        assert!(matches!(
            store.get_task(task.id, TaskScope::All).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_task(task.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let bob = seed(&store, "bob", Role::User, Some(alice.id)).await;
        let carol = seed(&store, "carol", Role::User, Some(alice.id)).await;
        let bobs_task = make_task(&bob, &alice);
        let carols_task = make_task(&carol, &alice);
        store.insert_task(&bobs_task).await.unwrap();
        store.insert_task(&carols_task).await.unwrap();

        // tasks assigned to a deleted user go with it
        store.delete_user(bob.id).await.unwrap();
        assert!(store.get_task(bobs_task.id, TaskScope::All).await.is_err());

        // tasks and users authored by a deleted admin lose the reference
        store.delete_user(alice.id).await.unwrap();
        let task = store.get_task(carols_task.id, TaskScope::All).await.unwrap();
        assert!(task.assigned_by.is_none());
        assert!(task.assigned_by_username.is_none());
        let carol = store.get_user(carol.id).await.unwrap();
        assert!(carol.admin.is_none());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: alice.id,
            access_hash: "a1".to_string(),
            access_expires_at: now + Duration::minutes(5),
            refresh_hash: "r1".to_string(),
            refresh_expires_at: now + Duration::days(1),
            created_at: now,
        };
        store.insert_session(&session).await.unwrap();

        let found = store.find_session_by_access("a1").await.unwrap().unwrap();
        assert_eq!(found.user_id, alice.id);
        assert!(store.find_session_by_refresh("r1").await.unwrap().is_some());
        assert!(store.find_session_by_access("r1").await.unwrap().is_none());

        store
            .rotate_access(session.id, "a2", now + Duration::minutes(10))
            .await
            .unwrap();
        assert!(store.find_session_by_access("a1").await.unwrap().is_none());
        assert!(store.find_session_by_access("a2").await.unwrap().is_some());

        store.delete_session(session.id).await.unwrap();
        assert!(store.find_session_by_refresh("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_sessions() {
        let store = setup_test_db().await;
        let alice = seed(&store, "alice", Role::Admin, None).await;
        let now = Utc::now();
        let sessions = [
            ("old", now - Duration::hours(1)),
            ("new", now + Duration::hours(1)),
        ];
        for (hash, refresh_expires_at) in sessions {
            store
                .insert_session(&Session {
                    id: Uuid::new_v4(),
                    user_id: alice.id,
                    access_hash: format!("{}-access", hash),
                    access_expires_at: now,
                    refresh_hash: format!("{}-refresh", hash),
                    refresh_expires_at,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.purge_expired_sessions(now).await.unwrap(), 1);
        assert!(store.find_session_by_refresh("new-refresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_row_try_from_invalid_role() {
        let now = Utc::now();
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: "x".to_string(),
            password_hash: String::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role: "ROOT".to_string(),
            admin_id: None,
            phone: String::new(),
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        };
        let result: Result<User> = row.try_into();
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_task_row_try_from_invalid_uuid() {
        let now = Utc::now();
        let row = TaskRow {
            id: "not-a-uuid".to_string(),
            title: "t".to_string(),
            description: String::new(),
            assigned_to: Uuid::new_v4().to_string(),
            assigned_to_username: "bob".to_string(),
            assigned_by: None,
            assigned_by_username: None,
            due_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            status: "PENDING".to_string(),
            completion_report: String::new(),
            worked_hundredths: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            created_by: None,
            created_by_username: None,
            updated_by: None,
            updated_by_username: None,
        };
        let result: Result<Task> = row.try_into();
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
