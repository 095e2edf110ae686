//! Task operations: creation, visibility, updates and completion reports

use chrono::Utc;
use uuid::Uuid;

use crate::authz::{authorize, Action, Resource, TaskScope};
use crate::error::{AppError, Result};
use crate::models::{CreateTaskRequest, Task, TaskPatch, TaskReport, TaskStatus, User};
use crate::store::Store;
use crate::workflow;

async fn resolve_assignee(store: &Store, id: Uuid) -> Result<User> {
    store.find_user(id).await?.ok_or_else(|| {
        AppError::validation(
            "assigned_to",
            format!("Invalid pk \"{}\" - object does not exist.", id),
        )
    })
}

/// Create a task assigned by the actor
pub async fn create_task(store: &Store, actor: &User, req: CreateTaskRequest) -> Result<Task> {
    authorize(actor, Resource::Tasks, Action::Create)?;

    let assignee_id = req
        .assigned_to
        .ok_or_else(|| AppError::validation("assigned_to", "This field is required."))?;
    let assignee = resolve_assignee(store, assignee_id).await?;

    let task = workflow::new_task(req, &assignee, actor, Utc::now())?;
    store.insert_task(&task).await?;

    tracing::info!(
        actor = %actor.username,
        task = %task.id,
        assignee = %assignee.username,
        "task created"
    );
    Ok(task)
}

/// Tasks in the actor's scope, newest first
pub async fn list_tasks(store: &Store, actor: &User) -> Result<Vec<Task>> {
    store.list_tasks(TaskScope::for_actor(actor)).await
}

pub async fn get_task(store: &Store, actor: &User, id: Uuid) -> Result<Task> {
    store.get_task(id, TaskScope::for_actor(actor)).await
}

/// Apply a partial update.
///
/// A plain user editing someone else's task is refused outright rather than
/// told the task does not exist; admins only reach tasks in their scope.
pub async fn update_task(
    store: &Store,
    actor: &User,
    id: Uuid,
    patch: TaskPatch,
) -> Result<Task> {
    let task = if actor.is_regular_user() {
        let task = store.get_task(id, TaskScope::All).await?;
        authorize(actor, Resource::Task(&task), Action::Update)?;
        workflow::check_user_fields(&patch)?;
        task
    } else {
        let task = store.get_task(id, TaskScope::for_actor(actor)).await?;
        authorize(actor, Resource::Task(&task), Action::Update)?;
        task
    };

    let assignee = match patch.assigned_to {
        Some(assignee_id) if !task.status.is_terminal() => {
            Some(resolve_assignee(store, assignee_id).await?)
        }
        _ => None,
    };

    let next = workflow::apply_patch(&task, &patch, assignee.as_ref(), actor, Utc::now())?;
    store.update_task(&next).await?;

    if next.status == TaskStatus::Completed && task.status != TaskStatus::Completed {
        tracing::info!(actor = %actor.username, task = %next.id, "task completed");
    } else {
        tracing::debug!(actor = %actor.username, task = %next.id, "task updated");
    }

    store.get_task(id, TaskScope::All).await
}

pub async fn delete_task(store: &Store, actor: &User, id: Uuid) -> Result<()> {
    let task = get_task(store, actor, id).await?;
    authorize(actor, Resource::Task(&task), Action::Delete)?;
    store.delete_task(task.id).await?;

    tracing::warn!(actor = %actor.username, task = %task.id, "task deleted");
    Ok(())
}

/// Completion report of a task. Only completed tasks have one.
pub async fn get_report(store: &Store, actor: &User, id: Uuid) -> Result<TaskReport> {
    let task = store.get_task(id, TaskScope::All).await?;
    if task.status != TaskStatus::Completed {
        return Err(AppError::NotFound(format!("Task {} has no report", id)));
    }
    authorize(actor, Resource::Report(&task), Action::View)?;

    let assignee = store.get_user(task.assigned_to).await?;

    Ok(TaskReport {
        id: task.id,
        title: task.title,
        description: task.description,
        assigned_to_username: assignee.username,
        assigned_to_email: assignee.email,
        due_date: task.due_date,
        completion_report: task.completion_report,
        worked_hours: task.worked_hours,
        completed_at: task.completed_at,
        created_at: task.created_at,
    })
}
