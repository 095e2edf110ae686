//! Task workflow rules
//!
//! Pure functions over [`Task`] values: building a new task, applying a patch,
//! and enforcing the completion invariants. Nothing here touches the database;
//! callers resolve users and scopes first and persist the result afterwards.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{CreateTaskRequest, Task, TaskPatch, TaskStatus, User};

/// Fields a plain user may send when updating their own task
pub const USER_EDITABLE_FIELDS: [&str; 3] = ["status", "completion_report", "worked_hours"];

/// Fields frozen once a task is completed
pub const LOCKED_WHEN_COMPLETED: [&str; 4] = ["title", "description", "assigned_to", "due_date"];

pub const TITLE_MAX_CHARS: usize = 200;

/// Whether a status may be written over `from`. COMPLETED is terminal;
/// every other move, including IN_PROGRESS back to PENDING, is allowed.
pub fn transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    !from.is_terminal() || to.is_terminal()
}

pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title", "This field may not be blank."));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(AppError::validation(
            "title",
            format!(
                "Ensure this field has no more than {} characters.",
                TITLE_MAX_CHARS
            ),
        ));
    }
    Ok(title.to_string())
}

/// Refuse any field outside [`USER_EDITABLE_FIELDS`]
pub fn check_user_fields(patch: &TaskPatch) -> Result<()> {
    if let Some(field) = patch
        .touched_fields()
        .into_iter()
        .find(|f| !USER_EDITABLE_FIELDS.contains(&f.as_str()))
    {
        return Err(AppError::permission(format!(
            "Users can only update: {} (got {})",
            USER_EDITABLE_FIELDS.join(", "),
            field
        )));
    }
    Ok(())
}

/// A COMPLETED task needs a non-blank report and non-zero hours
pub fn ensure_completion_fields(task: &Task) -> Result<()> {
    if task.status != TaskStatus::Completed {
        return Ok(());
    }
    if task.completion_report.trim().is_empty() {
        return Err(AppError::validation(
            "completion_report",
            "Completion report is required when marking task as completed",
        ));
    }
    match task.worked_hours {
        Some(hours) if !hours.is_zero() => Ok(()),
        _ => Err(AppError::validation(
            "worked_hours",
            "Worked hours are required when marking task as completed",
        )),
    }
}

/// Set `completed_at` the first time a task is saved as COMPLETED
pub fn stamp_completion(task: &mut Task, now: DateTime<Utc>) {
    if task.status == TaskStatus::Completed && task.completed_at.is_none() {
        task.completed_at = Some(now);
    }
}

/// Build a new task from a creation request.
///
/// `assignee` must already be resolved from `req.assigned_to`.
pub fn new_task(
    req: CreateTaskRequest,
    assignee: &User,
    creator: &User,
    now: DateTime<Utc>,
) -> Result<Task> {
    let title = validate_title(
        req.title
            .as_deref()
            .ok_or_else(|| AppError::validation("title", "This field is required."))?,
    )?;
    let due_date = req
        .due_date
        .ok_or_else(|| AppError::validation("due_date", "This field is required."))?;

    let mut task = Task {
        id: Uuid::new_v4(),
        title,
        description: req.description.unwrap_or_default(),
        assigned_to: assignee.id,
        assigned_to_username: assignee.username.clone(),
        assigned_by: Some(creator.id),
        assigned_by_username: Some(creator.username.clone()),
        due_date,
        status: req.status.unwrap_or_default(),
        completion_report: req.completion_report.unwrap_or_default(),
        worked_hours: req.worked_hours,
        completed_at: None,
        created_at: now,
        updated_at: now,
        created_by: Some(creator.id),
        created_by_username: Some(creator.username.clone()),
        updated_by: Some(creator.id),
        updated_by_username: Some(creator.username.clone()),
    };

    ensure_completion_fields(&task)?;
    stamp_completion(&mut task, now);
    Ok(task)
}

/// Apply a patch to a task and return the resulting task.
///
/// Role checks happen before this; here only the state rules apply. A new
/// assignee must be resolved by the caller and is passed as `assignee`.
pub fn apply_patch(
    task: &Task,
    patch: &TaskPatch,
    assignee: Option<&User>,
    editor: &User,
    now: DateTime<Utc>,
) -> Result<Task> {
    if task.status.is_terminal() {
        if let Some(field) = patch
            .touched_fields()
            .into_iter()
            .find(|f| LOCKED_WHEN_COMPLETED.contains(&f.as_str()))
        {
            return Err(AppError::validation(field, "Cannot modify completed tasks"));
        }
    }

    let mut next = task.clone();

    for field in &patch.nulls {
        match field.as_str() {
            "worked_hours" => next.worked_hours = None,
            _ => {
                return Err(AppError::validation(
                    field.as_str(),
                    "This field may not be null.",
                ))
            }
        }
    }

    if let Some(status) = patch.status {
        if !transition_allowed(task.status, status) {
            return Err(AppError::validation(
                "status",
                format!(
                    "Cannot move a completed task back to {}",
                    status.as_str()
                ),
            ));
        }
        next.status = status;
    }
    if let Some(title) = &patch.title {
        next.title = validate_title(title)?;
    }
    if let Some(description) = &patch.description {
        next.description = description.clone();
    }
    if let Some(due_date) = patch.due_date {
        next.due_date = due_date;
    }
    if let Some(assignee_id) = patch.assigned_to {
        let assignee = assignee
            .filter(|u| u.id == assignee_id)
            .ok_or_else(|| AppError::validation("assigned_to", "Unknown user"))?;
        next.assigned_to = assignee.id;
        next.assigned_to_username = assignee.username.clone();
    }
    if let Some(report) = &patch.completion_report {
        next.completion_report = report.clone();
    }
    if let Some(hours) = patch.worked_hours {
        next.worked_hours = Some(hours);
    }

    ensure_completion_fields(&next)?;
    stamp_completion(&mut next, now);
    next.updated_at = now;
    next.updated_by = Some(editor.id);
    next.updated_by_username = Some(editor.username.clone());
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::tests::{make_task, make_user};
    use crate::models::{Role, WorkedHours};
    use chrono::{Duration, NaiveDate};

    fn hours(s: &str) -> WorkedHours {
        s.parse().unwrap()
    }

    fn completed_task() -> (User, User, Task) {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let mut task = make_task(&bob, &alice);
        task.status = TaskStatus::Completed;
        task.completion_report = "done".to_string();
        task.worked_hours = Some(hours("3.5"));
        task.completed_at = Some(Utc::now() - Duration::hours(1));
        (alice, bob, task)
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        assert!(transition_allowed(Pending, InProgress));
        assert!(transition_allowed(InProgress, Pending));
        assert!(transition_allowed(Pending, Completed));
        assert!(transition_allowed(InProgress, Completed));
        assert!(transition_allowed(Completed, Completed));
        assert!(!transition_allowed(Completed, Pending));
        assert!(!transition_allowed(Completed, InProgress));
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Ship it ").unwrap(), "Ship it");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
        assert!(validate_title(&"x".repeat(200)).is_ok());
    }

    #[test]
    fn test_check_user_fields() {
        let patch = TaskPatch {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        assert!(check_user_fields(&patch).is_ok());

        let patch = TaskPatch {
            status: Some(TaskStatus::InProgress),
            title: Some("new".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            check_user_fields(&patch),
            Err(AppError::PermissionDenied(_))
        ));

        let mut patch = TaskPatch::default();
        patch
            .other
            .insert("assigned_by".to_string(), serde_json::json!("someone"));
        assert!(check_user_fields(&patch).is_err());
    }

    #[test]
    fn test_null_fields_count_as_sent() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"status": "IN_PROGRESS", "due_date": null}"#).unwrap();
        assert!(matches!(
            check_user_fields(&patch),
            Err(AppError::PermissionDenied(_))
        ));

        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let task = make_task(&bob, &alice);
        let patch: TaskPatch = serde_json::from_str(r#"{"title": null}"#).unwrap();
        match apply_patch(&task, &patch, None, &alice, Utc::now()) {
            Err(AppError::Validation { field, message }) => {
                assert_eq!(field, "title");
                assert_eq!(message, "This field may not be null.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_worked_hours_clears_hours() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let mut task = make_task(&bob, &alice);
        task.worked_hours = Some(hours("1.5"));

        let patch: TaskPatch = serde_json::from_str(r#"{"worked_hours": null}"#).unwrap();
        let next = apply_patch(&task, &patch, None, &bob, Utc::now()).unwrap();
        assert!(next.worked_hours.is_none());

        let (_, bob, completed) = completed_task();
        match apply_patch(&completed, &patch, None, &bob, Utc::now()) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "worked_hours"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_completed_task_locks_null_fields() {
        let (alice, _, task) = completed_task();
        let patch: TaskPatch =
            serde_json::from_str(r#"{"title": null, "description": null}"#).unwrap();
        match apply_patch(&task, &patch, None, &alice, Utc::now()) {
            Err(AppError::Validation { message, .. }) => {
                assert_eq!(message, "Cannot modify completed tasks")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_completion_requires_report_and_hours() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let task = make_task(&bob, &alice);

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        match apply_patch(&task, &patch, None, &bob, Utc::now()) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "completion_report"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            completion_report: Some("done".to_string()),
            ..Default::default()
        };
        match apply_patch(&task, &patch, None, &bob, Utc::now()) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "worked_hours"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            completion_report: Some("done".to_string()),
            worked_hours: Some(hours("0")),
            ..Default::default()
        };
        assert!(apply_patch(&task, &patch, None, &bob, Utc::now()).is_err());
    }

    #[test]
    fn test_completion_uses_existing_fields() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let mut task = make_task(&bob, &alice);
        task.completion_report = "drafted earlier".to_string();
        task.worked_hours = Some(hours("1.25"));

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let next = apply_patch(&task, &patch, None, &bob, Utc::now()).unwrap();
        assert_eq!(next.status, TaskStatus::Completed);
        assert!(next.completed_at.is_some());
    }

    #[test]
    fn test_completion_stamps_once() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let task = make_task(&bob, &alice);

        let first_save = Utc::now();
        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            completion_report: Some("done".to_string()),
            worked_hours: Some(hours("3.5")),
            ..Default::default()
        };
        let completed = apply_patch(&task, &patch, None, &bob, first_save).unwrap();
        assert_eq!(completed.completed_at, Some(first_save));
        assert_eq!(completed.updated_by, Some(bob.id));

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            completion_report: Some("done, with notes".to_string()),
            ..Default::default()
        };
        let later = first_save + Duration::minutes(5);
        let resaved = apply_patch(&completed, &patch, None, &bob, later).unwrap();
        assert_eq!(resaved.completed_at, Some(first_save));
        assert_eq!(resaved.completion_report, "done, with notes");
    }

    #[test]
    fn test_completed_task_fields_are_locked() {
        let (alice, _bob, task) = completed_task();

        for patch in [
            TaskPatch {
                title: Some("renamed".to_string()),
                ..Default::default()
            },
            TaskPatch {
                description: Some("more".to_string()),
                ..Default::default()
            },
            TaskPatch {
                due_date: NaiveDate::from_ymd_opt(2031, 1, 1),
                ..Default::default()
            },
            TaskPatch {
                assigned_to: Some(alice.id),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                apply_patch(&task, &patch, Some(&alice), &alice, Utc::now()),
                Err(AppError::Validation { .. })
            ));
        }
    }

    #[test]
    fn test_completed_task_cannot_be_reopened() {
        let (alice, _bob, task) = completed_task();
        let patch = TaskPatch {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        match apply_patch(&task, &patch, None, &alice, Utc::now()) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "status"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_completed_task_report_cannot_be_blanked() {
        let (alice, _bob, task) = completed_task();
        let patch = TaskPatch {
            completion_report: Some(String::new()),
            ..Default::default()
        };
        assert!(apply_patch(&task, &patch, None, &alice, Utc::now()).is_err());
    }

    #[test]
    fn test_reassignment_requires_resolved_assignee() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let carol = make_user("carol", Role::User, Some(alice.id));
        let task = make_task(&bob, &alice);

        let patch = TaskPatch {
            assigned_to: Some(carol.id),
            ..Default::default()
        };
        assert!(apply_patch(&task, &patch, None, &alice, Utc::now()).is_err());

        let next = apply_patch(&task, &patch, Some(&carol), &alice, Utc::now()).unwrap();
        assert_eq!(next.assigned_to, carol.id);
        assert_eq!(next.assigned_to_username, "carol");
        assert_eq!(next.assigned_by, Some(alice.id));
    }

    #[test]
    fn test_backward_transition_allowed() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let mut task = make_task(&bob, &alice);
        task.status = TaskStatus::InProgress;

        let patch = TaskPatch {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        let next = apply_patch(&task, &patch, None, &bob, Utc::now()).unwrap();
        assert_eq!(next.status, TaskStatus::Pending);
    }

    #[test]
    fn test_new_task() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let now = Utc::now();

        let req = CreateTaskRequest {
            title: Some("Inventory".to_string()),
            assigned_to: Some(bob.id),
            due_date: NaiveDate::from_ymd_opt(2030, 6, 1),
            ..Default::default()
        };
        let task = new_task(req, &bob, &alice, now).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assigned_by, Some(alice.id));
        assert_eq!(task.created_by, Some(alice.id));
        assert!(task.completed_at.is_none());

        let req = CreateTaskRequest {
            assigned_to: Some(bob.id),
            due_date: NaiveDate::from_ymd_opt(2030, 6, 1),
            ..Default::default()
        };
        match new_task(req, &bob, &alice, now) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "title"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let req = CreateTaskRequest {
            title: Some("Inventory".to_string()),
            assigned_to: Some(bob.id),
            ..Default::default()
        };
        match new_task(req, &bob, &alice, now) {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "due_date"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_new_task_created_completed() {
        let alice = make_user("alice", Role::Admin, None);
        let bob = make_user("bob", Role::User, Some(alice.id));
        let now = Utc::now();

        let req = CreateTaskRequest {
            title: Some("Backfill".to_string()),
            assigned_to: Some(bob.id),
            due_date: NaiveDate::from_ymd_opt(2030, 6, 1),
            status: Some(TaskStatus::Completed),
            completion_report: Some("already done".to_string()),
            worked_hours: Some(hours("2")),
            ..Default::default()
        };
        let task = new_task(req, &bob, &alice, now).unwrap();
        assert_eq!(task.completed_at, Some(now));

        let req = CreateTaskRequest {
            title: Some("Backfill".to_string()),
            assigned_to: Some(bob.id),
            due_date: NaiveDate::from_ymd_opt(2030, 6, 1),
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        assert!(new_task(req, &bob, &alice, now).is_err());
    }
}
