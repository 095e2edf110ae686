//! Authorization rules
//!
//! Two layers decide what an actor may do:
//! - scopes: per-role visibility predicates over users and tasks. Rows outside
//!   the actor's scope are reported as not found.
//! - the rule table in [`check`]: given a visible resource, decides whether the
//!   action is allowed. Denials are reported as permission errors.

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Role, Task, User};

/// What an actor is acting upon
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// The user collection (list, create)
    Users,
    /// The admin roster
    Admins,
    /// A single account
    Account(&'a User),
    /// The task collection (list, create)
    Tasks,
    /// A single task
    Task(&'a Task),
    /// Completion report of a task
    Report(&'a Task),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Create,
    View,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

pub fn is_admin(user: &User) -> bool {
    user.is_admin()
}

pub fn is_superadmin(user: &User) -> bool {
    user.is_superadmin()
}

/// Decide whether `actor` may perform `action` on `resource`
pub fn check(actor: &User, resource: Resource<'_>, action: Action) -> Decision {
    use Action::*;
    use Decision::*;

    match (actor.role, resource, action) {
        (Role::Superadmin, _, _) => Allow,

        (Role::Admin, Resource::Users, List | Create) => Allow,
        (_, Resource::Users, _) => Deny("Only admins can list or create users"),

        (_, Resource::Admins, _) => Deny("Only superadmins can list admins"),

        (_, Resource::Account(target), View | Update) if target.id == actor.id => Allow,
        (Role::Admin, Resource::Account(target), View) if target.admin == Some(actor.id) => {
            Allow
        }
        (_, Resource::Account(_), View) => Deny("You cannot view this user"),
        (_, Resource::Account(_), _) => Deny("Only superadmins can modify other users"),

        (Role::User, Resource::Tasks, Create) => Deny("Users cannot create tasks"),
        (_, Resource::Tasks, List | Create) => Allow,
        (_, Resource::Tasks, _) => Deny("Unsupported action on the task collection"),

        (Role::Admin, Resource::Task(_), View | Update | Delete) => Allow,
        (Role::User, Resource::Task(task), View | Update) if task.assigned_to == actor.id => {
            Allow
        }
        (Role::User, Resource::Task(_), Update) => Deny("You can only update your own tasks"),
        (_, Resource::Task(_), _) => Deny("You do not have permission to modify this task"),

        (Role::Admin, Resource::Report(_), View) => Allow,
        (Role::User, Resource::Report(task), View) if task.assigned_to == actor.id => Allow,
        (_, Resource::Report(_), _) => Deny("You do not have permission to view this report"),
    }
}

/// [`check`], with a denial turned into [`AppError::PermissionDenied`]
pub fn authorize(actor: &User, resource: Resource<'_>, action: Action) -> Result<()> {
    match check(actor, resource, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::debug!(actor = %actor.username, ?action, reason, "denied");
            Err(AppError::permission(reason))
        }
    }
}

/// Gate for endpoints reserved to ADMIN and SUPERADMIN
pub fn require_admin(actor: &User) -> Result<()> {
    if is_admin(actor) {
        Ok(())
    } else {
        Err(AppError::permission(
            "You do not have permission to perform this action",
        ))
    }
}

/// Users an actor can see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    All,
    /// An admin: itself plus its management scope
    Managed(Uuid),
    /// A plain user: only itself
    Own(Uuid),
}

impl UserScope {
    pub fn for_actor(actor: &User) -> Self {
        match actor.role {
            Role::Superadmin => UserScope::All,
            Role::Admin => UserScope::Managed(actor.id),
            Role::User => UserScope::Own(actor.id),
        }
    }

    pub fn permits(&self, target: &User) -> bool {
        match *self {
            UserScope::All => true,
            UserScope::Managed(admin) => target.id == admin || target.admin == Some(admin),
            UserScope::Own(id) => target.id == id,
        }
    }
}

/// Tasks an actor can see. The store turns a scope into a SQL filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    All,
    /// Tasks of the admin's managed users plus tasks the admin assigned
    ManagedBy(Uuid),
    AssignedTo(Uuid),
}

impl TaskScope {
    pub fn for_actor(actor: &User) -> Self {
        match actor.role {
            Role::Superadmin => TaskScope::All,
            Role::Admin => TaskScope::ManagedBy(actor.id),
            Role::User => TaskScope::AssignedTo(actor.id),
        }
    }
}
