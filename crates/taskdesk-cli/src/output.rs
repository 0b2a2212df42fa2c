//! Plain-text and JSON rendering of command results.

use anyhow::Result;
use serde::Serialize;
use taskdesk_core::models::{CompletionBand, Task, TaskStats, User};
use taskdesk_core::utils::{format_date, truncate_string};
use taskdesk_core::{ClientEvent, NoticeLevel};

const TITLE_WIDTH: usize = 40;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_mark(task: &Task) -> &'static str {
    if task.is_completed() {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn task_line(task: &Task) -> String {
    format!(
        "{:>5}  {}  {:<width$}  {}",
        task.id,
        status_mark(task),
        truncate_string(&task.title, TITLE_WIDTH),
        format_date(&task.created_at),
        width = TITLE_WIDTH
    )
}

pub fn print_tasks(tasks: &[&Task]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }
    for task in tasks {
        println!("{}", task_line(task));
    }
}

pub fn print_task(task: &Task) {
    println!("#{} {}", task.id, task.title);
    println!("Status:  {}", task.status.label());
    if !task.description_or_empty().is_empty() {
        println!("Details: {}", task.description_or_empty());
    }
    println!("Created: {}", format_date(&task.created_at));
    println!("Updated: {}", format_date(&task.updated_at));
}

fn band_label(band: CompletionBand) -> &'static str {
    match band {
        CompletionBand::Excellent => "excellent",
        CompletionBand::Good => "good",
        CompletionBand::Fair => "fair",
        CompletionBand::Low => "low",
    }
}

pub fn stats_summary(stats: &TaskStats) -> String {
    format!(
        "{} tasks: {} completed, {} pending ({}% done, {})",
        stats.total_tasks,
        stats.completed_tasks,
        stats.pending_tasks,
        stats.completion_percent(),
        band_label(stats.completion_band())
    )
}

pub fn print_user(user: &User) {
    println!("{} ({})", user.display_name(), user.username);
    if !user.email.is_empty() {
        println!("Email:  {}", user.email);
    }
    if let Some(ref joined) = user.date_joined {
        println!("Joined: {}", format_date(joined));
    }
}

/// Text for a client event, printed to stderr
pub fn event_line(event: &ClientEvent) -> String {
    match event {
        ClientEvent::Notice { level, message } => match level {
            NoticeLevel::Info => message.clone(),
            NoticeLevel::Success => format!("✓ {}", message),
            NoticeLevel::Error => format!("error: {}", message),
        },
        ClientEvent::LoginRequired => {
            "Your session has expired. Run `taskdesk login` to sign in again.".to_string()
        }
    }
}
