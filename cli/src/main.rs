//! Taskboard CLI client

mod client;
mod messages;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::client::TaskboardClient;
use crate::messages::{NewTask, NewUser, Role, Task, TaskStatus, TaskUpdate, User};

#[derive(Parser)]
#[command(name = "taskboard-cli")]
#[command(about = "Command-line client for the Taskboard server")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, env = "TASKBOARD_URL", default_value = "http://localhost:3000")]
    server: String,

    /// Access token from `login`
    #[arg(short, long, env = "TASKBOARD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the issued tokens
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Exchange a refresh token for a new access token
    Refresh {
        refresh: String,
    },

    /// End the current session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Manage users
    #[command(subcommand)]
    Users(UserCommands),

    /// Manage tasks
    #[command(subcommand)]
    Tasks(TaskCommands),

    /// Show the completion report of a task
    Report { id: Uuid },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List users you manage
    List,

    /// List admins and superadmins
    Admins,

    /// Create a user
    Create {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,

        #[arg(short, long, default_value = "")]
        email: String,

        /// SUPERADMIN, ADMIN or USER (superadmins only)
        #[arg(short, long, value_parser = parse_role)]
        role: Option<Role>,

        /// Supervising admin id (superadmins only)
        #[arg(short, long)]
        admin: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks visible to you
    List,

    /// Show one task
    Show { id: Uuid },

    /// Create and assign a task
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Assignee id
        #[arg(short, long)]
        assign_to: Uuid,

        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: NaiveDate,
    },

    /// Mark a task as in progress
    Start { id: Uuid },

    /// Complete a task with a report and worked hours
    Complete {
        id: Uuid,

        #[arg(short, long)]
        report: String,

        /// Hours worked, e.g. 3.5
        #[arg(long)]
        hours: String,
    },

    /// Delete a task
    Delete { id: Uuid },
}

fn parse_role(value: &str) -> std::result::Result<Role, String> {
    match value.to_ascii_uppercase().as_str() {
        "SUPERADMIN" => Ok(Role::Superadmin),
        "ADMIN" => Ok(Role::Admin),
        "USER" => Ok(Role::User),
        other => Err(format!("unknown role: {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let client = TaskboardClient::new(&cli.server, cli.token)
        .with_context(|| format!("Cannot use server URL {}", cli.server))?;

    match cli.command {
        Commands::Login { username, password } => run_login(&client, &username, &password).await,
        Commands::Refresh { refresh } => {
            let token = client.refresh(&refresh).await?;
            println!("export TASKBOARD_TOKEN={}", token.access);
            Ok(())
        }
        Commands::Logout => {
            client.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Whoami => {
            print_user(&client.me().await?);
            Ok(())
        }
        Commands::Users(command) => run_users(&client, command).await,
        Commands::Tasks(command) => run_tasks(&client, command).await,
        Commands::Report { id } => run_report(&client, id).await,
    }
}

async fn run_login(client: &TaskboardClient, username: &str, password: &str) -> Result<()> {
    let login = client.login(username, password).await?;
    tracing::info!("Logged in as {} ({})", login.user.username, login.user.role);

    println!("export TASKBOARD_TOKEN={}", login.access);
    println!("# refresh token: {}", login.refresh);
    Ok(())
}

async fn run_users(client: &TaskboardClient, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::List => print_users(&client.list_users().await?),
        UserCommands::Admins => print_users(&client.list_admins().await?),
        UserCommands::Create {
            username,
            password,
            email,
            role,
            admin,
        } => {
            let user = client
                .create_user(&NewUser {
                    username,
                    password,
                    email,
                    role,
                    admin,
                })
                .await?;
            println!("Created user {}", user.id);
            print_user(&user);
        }
    }
    Ok(())
}

async fn run_tasks(client: &TaskboardClient, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::List => {
            let tasks = client.list_tasks().await?;
            if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                println!("Tasks:");
                println!("{:─<60}", "");
                for task in tasks {
                    println!(
                        "  {} - {} [{}] due {} -> {}",
                        task.id, task.title, task.status, task.due_date, task.assigned_to_username
                    );
                }
            }
        }
        TaskCommands::Show { id } => print_task(&client.get_task(id).await?),
        TaskCommands::Create {
            title,
            description,
            assign_to,
            due,
        } => {
            let task = client
                .create_task(&NewTask {
                    title,
                    description,
                    assigned_to: assign_to,
                    due_date: due,
                })
                .await?;
            println!("Created task {}", task.id);
        }
        TaskCommands::Start { id } => {
            let update = TaskUpdate {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            };
            let task = client.update_task(id, &update).await?;
            println!("Task {} is {}", task.id, task.status);
        }
        TaskCommands::Complete { id, report, hours } => {
            let update = TaskUpdate {
                status: Some(TaskStatus::Completed),
                completion_report: Some(report),
                worked_hours: Some(hours),
            };
            let task = client.update_task(id, &update).await?;
            println!("Task {} is {}", task.id, task.status);
        }
        TaskCommands::Delete { id } => {
            client.delete_task(id).await?;
            println!("Deleted task {}", id);
        }
    }
    Ok(())
}

async fn run_report(client: &TaskboardClient, id: Uuid) -> Result<()> {
    let report = client.report(id).await?;

    println!("{}", report.title);
    println!("{:─<60}", "");
    println!(
        "Assignee:  {} <{}>",
        report.assigned_to_username, report.assigned_to_email
    );
    println!("Due:       {}", report.due_date);
    if let Some(completed_at) = report.completed_at {
        println!("Completed: {}", completed_at.format("%Y-%m-%d %H:%M"));
    }
    println!("Hours:     {}", report.worked_hours.as_deref().unwrap_or("-"));
    println!();
    println!("{}", report.completion_report);
    Ok(())
}

fn print_users(users: &[User]) {
    if users.is_empty() {
        println!("No users found.");
        return;
    }
    println!("Users:");
    println!("{:─<60}", "");
    for user in users {
        println!("  {} - {} ({})", user.id, user.username, user.role);
    }
}

fn print_user(user: &User) {
    println!("{} ({})", user.username, user.role);
    println!("  id:         {}", user.id);
    if !user.email.is_empty() {
        println!("  email:      {}", user.email);
    }
    if let Some(admin) = user.admin {
        println!("  admin:      {}", admin);
    }
    if let Some(last_login) = user.last_login {
        println!("  last login: {}", last_login.format("%Y-%m-%d %H:%M"));
    }
}

fn print_task(task: &Task) {
    println!("{} [{}]", task.title, task.status);
    println!("{:─<60}", "");
    println!("  id:          {}", task.id);
    println!("  assigned to: {}", task.assigned_to_username);
    if let Some(by) = &task.assigned_by_username {
        println!("  assigned by: {}", by);
    }
    println!("  due:         {}", task.due_date);
    if !task.description.is_empty() {
        println!();
        println!("{}", task.description);
    }
    if task.status == TaskStatus::Completed {
        println!();
        println!(
            "Completed with {} hours: {}",
            task.worked_hours.as_deref().unwrap_or("-"),
            task.completion_report
        );
    }
}
