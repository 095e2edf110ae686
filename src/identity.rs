//! Identity and hierarchy operations
//!
//! Every operation takes the acting user explicitly. Visibility comes from
//! [`UserScope`]; actions are decided by [`authz::check`](crate::authz::check).

use chrono::Utc;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::authz::{authorize, Action, Resource, UserScope};
use crate::error::{AppError, Result};
use crate::models::{CreateUserRequest, Role, UpdateUserRequest, User};
use crate::store::{username_taken, Store};

pub const USERNAME_MAX_CHARS: usize = 150;

fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::validation("username", "This field is required."));
    }
    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(AppError::validation(
            "username",
            format!(
                "Ensure this field has no more than {} characters.",
                USERNAME_MAX_CHARS
            ),
        ));
    }
    Ok(username.to_string())
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AppError::validation("password", "This field is required."));
    }
    Ok(())
}

async fn ensure_username_free(store: &Store, username: &str, except: Option<Uuid>) -> Result<()> {
    match store.find_user_by_username(username).await? {
        Some(existing) if Some(existing.id) != except => Err(username_taken()),
        _ => Ok(()),
    }
}

/// A USER may point at an ADMIN or SUPERADMIN; other roles carry no link
async fn validate_admin_link(
    store: &Store,
    user_id: Uuid,
    role: Role,
    admin: Option<Uuid>,
) -> Result<()> {
    let Some(admin_id) = admin else {
        return Ok(());
    };
    if role != Role::User {
        return Err(AppError::validation(
            "admin",
            "Only users with role USER can have an admin",
        ));
    }
    if admin_id == user_id {
        return Err(AppError::validation("admin", "A user cannot supervise itself"));
    }
    match store.find_user(admin_id).await? {
        Some(supervisor) if supervisor.is_admin() => Ok(()),
        Some(_) => Err(AppError::validation(
            "admin",
            "The supervising user must be an ADMIN or SUPERADMIN",
        )),
        None => Err(AppError::validation("admin", "Unknown user")),
    }
}

/// Create a user. Admins always create plain users under themselves.
pub async fn create_user(store: &Store, actor: &User, req: CreateUserRequest) -> Result<User> {
    authorize(actor, Resource::Users, Action::Create)?;

    let username = validate_username(&req.username)?;
    validate_password(&req.password)?;
    ensure_username_free(store, &username, None).await?;

    let (role, admin) = if actor.is_superadmin() {
        (req.role.unwrap_or_default(), req.admin)
    } else {
        (Role::User, Some(actor.id))
    };

    let id = Uuid::new_v4();
    validate_admin_link(store, id, role, admin).await?;

    let now = Utc::now();
    let user = User {
        id,
        username,
        email: req.email,
        first_name: req.first_name,
        last_name: req.last_name,
        role,
        admin,
        phone: req.phone,
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
        created_by: Some(actor.id),
        updated_by: Some(actor.id),
        password_hash: hash_password(&req.password)?,
    };
    store.insert_user(&user).await?;

    tracing::info!(
        actor = %actor.username,
        user = %user.username,
        role = user.role.as_str(),
        "user created"
    );
    Ok(user)
}

/// Fetch a user visible to the actor
pub async fn get_user(store: &Store, actor: &User, id: Uuid) -> Result<User> {
    let scope = UserScope::for_actor(actor);
    store
        .find_user(id)
        .await?
        .filter(|user| scope.permits(user))
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

/// SuperAdmins see everyone, admins their management scope
pub async fn list_users(store: &Store, actor: &User) -> Result<Vec<User>> {
    authorize(actor, Resource::Users, Action::List)?;
    let managed_by = (!actor.is_superadmin()).then_some(actor.id);
    store.list_users(managed_by).await
}

pub async fn list_admins(store: &Store, actor: &User) -> Result<Vec<User>> {
    authorize(actor, Resource::Admins, Action::List)?;
    store.list_admins().await
}

/// Update a user. Only SuperAdmins touch username, role, admin link or
/// account status; everyone else edits their own profile and password.
pub async fn update_user(
    store: &Store,
    actor: &User,
    id: Uuid,
    req: UpdateUserRequest,
) -> Result<User> {
    let target = get_user(store, actor, id).await?;
    authorize(actor, Resource::Account(&target), Action::Update)?;

    if !actor.is_superadmin() {
        let privileged = [
            ("username", req.username.is_some()),
            ("role", req.role.is_some()),
            ("admin", req.admin.is_some()),
            ("is_active", req.is_active.is_some()),
        ];
        if let Some((field, _)) = privileged.iter().find(|(_, present)| *present) {
            return Err(AppError::permission(format!(
                "Only superadmins can change {}",
                field
            )));
        }
    }

    let mut next = target.clone();

    if let Some(username) = &req.username {
        let username = validate_username(username)?;
        if username != target.username {
            ensure_username_free(store, &username, Some(target.id)).await?;
        }
        next.username = username;
    }
    if let Some(password) = &req.password {
        validate_password(password)?;
        next.password_hash = hash_password(password)?;
    }
    if let Some(email) = req.email {
        next.email = email;
    }
    if let Some(first_name) = req.first_name {
        next.first_name = first_name;
    }
    if let Some(last_name) = req.last_name {
        next.last_name = last_name;
    }
    if let Some(phone) = req.phone {
        next.phone = phone;
    }
    if let Some(is_active) = req.is_active {
        next.is_active = is_active;
    }
    if let Some(role) = req.role {
        next.role = role;
    }
    next.admin = match req.admin {
        Some(admin) => admin,
        None if next.role != Role::User => None,
        None => target.admin,
    };

    if target.is_admin() && !next.is_admin() {
        let managed = store.count_managed_users(target.id).await?;
        if managed > 0 {
            return Err(AppError::validation(
                "role",
                format!("This admin still manages {} user(s)", managed),
            ));
        }
    }
    validate_admin_link(store, next.id, next.role, next.admin).await?;

    next.updated_at = Utc::now();
    next.updated_by = Some(actor.id);
    store.update_user(&next).await?;

    tracing::info!(actor = %actor.username, user = %next.username, "user updated");
    Ok(next)
}

pub async fn delete_user(store: &Store, actor: &User, id: Uuid) -> Result<()> {
    let target = get_user(store, actor, id).await?;
    authorize(actor, Resource::Account(&target), Action::Delete)?;
    store.delete_user(target.id).await?;

    tracing::warn!(actor = %actor.username, user = %target.username, "user deleted");
    Ok(())
}

/// Create the first SuperAdmin when no user exists yet
pub async fn bootstrap_superadmin(
    store: &Store,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    if store.count_users().await? > 0 {
        return Ok(None);
    }

    let username = validate_username(username)?;
    validate_password(password)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username,
        email: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        role: Role::Superadmin,
        admin: None,
        phone: String::new(),
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
        created_by: None,
        updated_by: None,
        password_hash: hash_password(password)?,
    };
    store.insert_user(&user).await?;

    tracing::info!(user = %user.username, "bootstrapped superadmin");
    Ok(Some(user))
}
