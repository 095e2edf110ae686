//! Data models for users, tasks and completion reports

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Position of a user in the supervision hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Superadmin,
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "SUPERADMIN",
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }

    /// ADMIN or SUPERADMIN
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }

    pub fn is_superadmin(&self) -> bool {
        matches!(self, Role::Superadmin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPERADMIN" => Ok(Role::Superadmin),
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Workflow state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
        }
    }

    /// Check if this is the terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// Hours worked on a task, kept as hundredths of an hour.
///
/// Holds at most five digits with two decimal places (0.00 to 999.99).
/// Serialized as a decimal string; deserialized from a JSON number or string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkedHours(u32);

impl WorkedHours {
    pub const MAX_HUNDREDTHS: u32 = 99_999;

    pub fn from_hundredths(hundredths: u32) -> Result<Self, String> {
        if hundredths > Self::MAX_HUNDREDTHS {
            return Err("Ensure that there are no more than 5 digits in total.".to_string());
        }
        Ok(Self(hundredths))
    }

    pub fn hundredths(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn from_f64(value: f64) -> Result<Self, String> {
        if !value.is_finite() || value < 0.0 {
            return Err("A valid non-negative number is required.".to_string());
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err("Ensure that there are no more than 2 decimal places.".to_string());
        }
        if rounded > Self::MAX_HUNDREDTHS as f64 {
            return Err("Ensure that there are no more than 5 digits in total.".to_string());
        }
        Ok(Self(rounded as u32))
    }
}

impl std::str::FromStr for WorkedHours {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(frac) {
            return Err("A valid number is required.".to_string());
        }
        if frac.len() > 2 {
            return Err("Ensure that there are no more than 2 decimal places.".to_string());
        }
        if whole.trim_start_matches('0').len() > 3 {
            return Err("Ensure that there are no more than 5 digits in total.".to_string());
        }
        let whole: u32 = whole
            .parse()
            .map_err(|_| "A valid number is required.".to_string())?;
        let frac: u32 = format!("{:0<2}", frac)
            .parse()
            .map_err(|_| "A valid number is required.".to_string())?;
        Self::from_hundredths(whole * 100 + frac)
    }
}

impl fmt::Display for WorkedHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for WorkedHours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WorkedHours {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => WorkedHours::from_f64(n),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// An account in the hierarchy
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    /// Supervising admin, only ever set for USER accounts
    pub admin: Option<Uuid>,
    pub phone: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_superadmin(&self) -> bool {
        self.role.is_superadmin()
    }

    pub fn is_regular_user(&self) -> bool {
        self.role == Role::User
    }
}

/// A unit of assigned work
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub assigned_to: Uuid,
    pub assigned_to_username: String,
    pub assigned_by: Option<Uuid>,
    pub assigned_by_username: Option<String>,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub completion_report: String,
    pub worked_hours: Option<WorkedHours>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub created_by_username: Option<String>,
    pub updated_by: Option<Uuid>,
    pub updated_by_username: Option<String>,
}

/// Reduced view of a completed task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub assigned_to_username: String,
    pub assigned_to_email: String,
    pub due_date: NaiveDate,
    pub completion_report: String,
    pub worked_hours: Option<WorkedHours>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a user
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub role: Option<Role>,
    pub admin: Option<Uuid>,
}

/// Partial update of a user; absent fields are left untouched
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    /// `null` clears the link, a missing key leaves it alone
    #[serde(default, deserialize_with = "double_option")]
    pub admin: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

/// Request to create a task
#[derive(Debug, Default, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    pub completion_report: Option<String>,
    pub worked_hours: Option<WorkedHours>,
}

/// Partial update of a task.
///
/// Keys that are not task fields are collected in `other` and task fields
/// sent as `null` are listed in `nulls`, so the workflow sees every key the
/// client sent.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "TaskPatchBody")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    pub completion_report: Option<String>,
    pub worked_hours: Option<WorkedHours>,
    pub nulls: BTreeSet<String>,
    pub other: BTreeMap<String, serde_json::Value>,
}

impl TaskPatch {
    /// Names of every field carried by this patch, including explicit nulls
    pub fn touched_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = [
            ("title", self.title.is_some()),
            ("description", self.description.is_some()),
            ("assigned_to", self.assigned_to.is_some()),
            ("due_date", self.due_date.is_some()),
            ("status", self.status.is_some()),
            ("completion_report", self.completion_report.is_some()),
            ("worked_hours", self.worked_hours.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect();
        fields.extend(self.nulls.iter().cloned());
        fields.extend(self.other.keys().cloned());
        fields
    }
}

/// Wire form of [`TaskPatch`]: a missing key is `None`, `null` is `Some(None)`
#[derive(Deserialize)]
struct TaskPatchBody {
    #[serde(default, deserialize_with = "double_option")]
    title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    assigned_to: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    status: Option<Option<TaskStatus>>,
    #[serde(default, deserialize_with = "double_option")]
    completion_report: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    worked_hours: Option<Option<WorkedHours>>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

impl From<TaskPatchBody> for TaskPatch {
    fn from(body: TaskPatchBody) -> Self {
        let mut nulls = BTreeSet::new();
        TaskPatch {
            title: present(&mut nulls, "title", body.title),
            description: present(&mut nulls, "description", body.description),
            assigned_to: present(&mut nulls, "assigned_to", body.assigned_to),
            due_date: present(&mut nulls, "due_date", body.due_date),
            status: present(&mut nulls, "status", body.status),
            completion_report: present(&mut nulls, "completion_report", body.completion_report),
            worked_hours: present(&mut nulls, "worked_hours", body.worked_hours),
            nulls,
            other: body.other,
        }
    }
}

fn present<T>(nulls: &mut BTreeSet<String>, name: &str, value: Option<Option<T>>) -> Option<T> {
    if let Some(None) = value {
        nulls.insert(name.to_string());
    }
    value.flatten()
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access: String,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
