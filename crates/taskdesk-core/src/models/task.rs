//! Task records, their write payloads, and local list view logic.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{cmp_ignore_case, contains_ignore_case};

/// Completion state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    /// The status a toggle would move this task to
    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "completed" | "done" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "unknown status '{}', expected 'pending' or 'completed'",
                other
            )),
        }
    }
}

/// A task as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owner's username, when the server includes it
    #[serde(default)]
    pub user: Option<String>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Check if the task matches a search query.
    /// Query should already be lowercased.
    fn matches_search(&self, query: &str) -> bool {
        contains_ignore_case(&self.title, query)
            || self
                .description
                .as_ref()
                .map(|d| contains_ignore_case(d, query))
                .unwrap_or(false)
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Copy with surrounding whitespace removed from text fields
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            status: self.status,
        }
    }
}

/// Partial update; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// Success shape of create/update/toggle.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEnvelope {
    pub task: Task,
    #[serde(default)]
    pub message: Option<String>,
}

/// List endpoint body: paginated object or bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TaskList {
    Page {
        results: Vec<Task>,
        #[serde(default)]
        count: Option<u64>,
    },
    Items(Vec<Task>),
}

impl TaskList {
    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            TaskList::Page { results, .. } => results,
            TaskList::Items(items) => items,
        }
    }
}

// Sorting options for the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSortColumn {
    #[default]
    CreatedAt,
    Title,
    Status,
}

impl TaskSortColumn {
    /// Value of the server-side `ordering` query parameter
    pub fn ordering_param(&self) -> &'static str {
        match self {
            TaskSortColumn::CreatedAt => "-created_at",
            TaskSortColumn::Title => "title",
            TaskSortColumn::Status => "status",
        }
    }
}

impl FromStr for TaskSortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" | "created_at" | "date" => Ok(TaskSortColumn::CreatedAt),
            "title" => Ok(TaskSortColumn::Title),
            "status" => Ok(TaskSortColumn::Status),
            other => Err(format!(
                "unknown sort '{}', expected 'created', 'title' or 'status'",
                other
            )),
        }
    }
}

/// Status restriction for the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TaskStatus),
}

impl StatusFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(status) => task.status == *status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

/// Server-side list parameters.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub search: Option<String>,
    pub status: Option<TaskStatus>,
    pub ordering: Option<TaskSortColumn>,
}

impl TaskQuery {
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(ref search) = self.search {
            if !search.is_empty() {
                params.push(("search".to_string(), search.clone()));
            }
        }
        if let Some(status) = self.status {
            params.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(ordering) = self.ordering {
            params.push(("ordering".to_string(), ordering.ordering_param().to_string()));
        }
        params
    }
}

/// Search, status filter and sort applied to an already-fetched list.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub search: String,
    pub status: StatusFilter,
    pub sort: TaskSortColumn,
}

impl TaskFilter {
    /// Tasks matching the filter, in display order
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let mut filtered: Vec<&Task> = tasks.iter().collect();

        // Search title and description
        if !self.search.is_empty() {
            let query = self.search.to_lowercase();
            filtered.retain(|t| t.matches_search(&query));
        }

        filtered.retain(|t| self.status.matches(t));

        filtered.sort_by(|a, b| {
            let newest_first = |x: &Task, y: &Task| y.created_at.cmp(&x.created_at);

            match self.sort {
                TaskSortColumn::CreatedAt => newest_first(a, b),
                TaskSortColumn::Title => {
                    cmp_ignore_case(&a.title, &b.title).then_with(|| newest_first(a, b))
                }
                TaskSortColumn::Status => a
                    .status
                    .as_str()
                    .cmp(b.status.as_str())
                    .then_with(|| newest_first(a, b)),
            }
        });

        filtered
    }
}
