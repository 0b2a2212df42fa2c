//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use taskdesk_core::models::{StatusFilter, TaskSortColumn, TaskStatus};
use taskdesk_core::StorageBackend;

#[derive(Debug, Parser)]
#[command(name = "taskdesk", version, about = "Manage your tasks from the terminal")]
pub struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, global = true, env = "TASKDESK_API_URL")]
    pub api_url: Option<String>,

    /// Session storage backend (encrypted, keyring, memory)
    #[arg(long, global = true)]
    pub storage: Option<StorageBackend>,

    /// Print JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long, short, env = "TASKDESK_USERNAME")]
        username: Option<String>,
    },
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List tasks
    List(ListArgs),
    /// Show one task
    Show { id: i64 },
    /// Create a task
    Add {
        title: String,
        #[arg(long, short, default_value = "")]
        description: String,
    },
    /// Change a task
    Edit(EditArgs),
    /// Flip a task between pending and completed
    Toggle { id: i64 },
    /// Delete a task
    Rm { id: i64 },
    /// Show completion statistics
    Stats,
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long, short)]
    pub username: String,
    #[arg(long, short)]
    pub email: String,
    #[arg(long, default_value = "")]
    pub first_name: String,
    #[arg(long, default_value = "")]
    pub last_name: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Case-insensitive match on title or description
    #[arg(long, short)]
    pub search: Option<String>,
    /// all, pending or completed
    #[arg(long, default_value = "all")]
    pub status: StatusFilter,
    /// created, title or status
    #[arg(long, default_value = "created")]
    pub sort: TaskSortColumn,
    /// Use the last fetched snapshot instead of the server
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
}
