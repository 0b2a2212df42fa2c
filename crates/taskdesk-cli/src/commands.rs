//! Command handlers.
//!
//! Each invocation wires config, session storage, the API client and the
//! session store together, runs one command, then prints any notices the
//! core emitted along the way.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Context as _, Result};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use taskdesk_core::events::drain;
use taskdesk_core::models::{
    Credentials, FieldError, Registration, StatusFilter, TaskDraft, TaskFilter, TaskPatch,
    TaskQuery, TaskStats, User,
};
use taskdesk_core::{
    ApiClient, ApiError, CacheManager, ClientEvent, Config, EventBus, SessionStorage,
    SessionStore,
};

use crate::cli::{Cli, Command, EditArgs, ListArgs, RegisterArgs};
use crate::output;

const PASSWORD_ENV: &str = "TASKDESK_PASSWORD";

pub struct Context {
    config: Config,
    session: SessionStore,
    cache: Option<CacheManager>,
    events: broadcast::Receiver<ClientEvent>,
    json: bool,
}

impl Context {
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        });
        config = config.with_env_overrides();
        if let Some(ref url) = cli.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(storage) = cli.storage {
            config.storage = storage;
        }
        debug!(api = %config.api_base_url, storage = %config.storage, "Configuration loaded");

        let storage = config.open_storage()?;
        let cache = match config.cache_dir().and_then(CacheManager::new) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Task snapshot unavailable");
                None
            }
        };
        Self::with_parts(config, storage, cache, cli.json)
    }

    fn with_parts(
        config: Config,
        storage: SessionStorage,
        cache: Option<CacheManager>,
        json: bool,
    ) -> Result<Self> {
        let bus = EventBus::new();
        let events = bus.subscribe();
        let api = ApiClient::with_timeout(
            &config.api_base_url,
            config.request_timeout(),
            storage.clone(),
            bus.clone(),
        )?;
        let session = SessionStore::new(api, storage, bus);

        Ok(Self {
            config,
            session,
            cache,
            events,
            json,
        })
    }

    /// Print everything the core emitted since the last flush. A session
    /// the client could not renew also takes the task snapshot with it.
    pub fn flush_events(&mut self) {
        if self.session.process_events() {
            self.clear_snapshot();
        }
        for event in drain(&mut self.events) {
            eprintln!("{}", output::event_line(&event));
        }
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        let needs_session = match command {
            Command::Login { .. } | Command::Register(_) => false,
            Command::List(ref args) => !args.offline,
            _ => true,
        };
        if needs_session {
            self.session.initialize().await;
        }

        match command {
            Command::Login { username } => self.login(username).await,
            Command::Register(args) => self.register(args).await,
            Command::Logout => self.logout().await,
            Command::Whoami => self.whoami(),
            Command::List(args) => self.list(args).await,
            Command::Show { id } => self.show(id).await,
            Command::Add { title, description } => self.add(title, description).await,
            Command::Edit(args) => self.edit(args).await,
            Command::Toggle { id } => self.toggle(id).await,
            Command::Rm { id } => self.remove(id).await,
            Command::Stats => self.stats().await,
        }
    }

    fn require_user(&self) -> Result<&User> {
        self.session
            .user()
            .ok_or_else(|| anyhow!("Not logged in. Run `taskdesk login` first."))
    }

    fn api(&self) -> &ApiClient {
        self.session.api()
    }

    // ===== Session =====

    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(name) => name,
            None => prompt("Username: ")?,
        };
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ => rpassword::prompt_password("Password: ")?,
        };
        if username.is_empty() || password.is_empty() {
            bail!("Username and password required");
        }

        let user = self
            .session
            .login(&Credentials::new(username.clone(), password))
            .await?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        println!("Logged in as {}", user.display_name());
        Ok(())
    }

    async fn register(&mut self, args: RegisterArgs) -> Result<()> {
        let password = rpassword::prompt_password("Password: ")?;
        let password_confirm = rpassword::prompt_password("Confirm password: ")?;
        let registration = Registration {
            username: args.username.trim().to_string(),
            email: args.email.trim().to_string(),
            password,
            password_confirm,
            first_name: args.first_name,
            last_name: args.last_name,
        };
        check_form(registration.validate())?;

        let user = self.session.register(&registration).await?;
        self.config.last_username = Some(user.username.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        println!("Welcome, {}!", user.display_name());
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.session.logout().await;
        self.clear_snapshot();
        Ok(())
    }

    fn clear_snapshot(&self) {
        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.clear() {
                warn!(error = %e, "Failed to clear task snapshot");
            }
        }
    }

    fn whoami(&self) -> Result<()> {
        let user = self.require_user()?;
        if self.json {
            return output::print_json(user);
        }
        output::print_user(user);
        Ok(())
    }

    // ===== Tasks =====

    async fn list(&self, args: ListArgs) -> Result<()> {
        let filter = TaskFilter {
            search: args.search.clone().unwrap_or_default(),
            status: args.status,
            sort: args.sort,
        };

        if args.offline {
            return self.list_offline(&filter);
        }

        self.require_user()?;
        let query = TaskQuery {
            search: args.search,
            status: match args.status {
                StatusFilter::All => None,
                StatusFilter::Only(status) => Some(status),
            },
            ordering: Some(args.sort),
        };
        let (tasks, stats) =
            futures::try_join!(self.api().list_tasks(&query), self.api().task_stats())?;

        // Only an unfiltered list is a full snapshot
        if let Some(ref cache) = self.cache {
            if query.search.is_none() && query.status.is_none() {
                if let Err(e) = cache.save_tasks(&tasks) {
                    warn!(error = %e, "Failed to cache tasks");
                }
            }
            if let Err(e) = cache.save_stats(&stats) {
                warn!(error = %e, "Failed to cache stats");
            }
        }

        let shown = filter.apply(&tasks);
        if self.json {
            return output::print_json(&shown);
        }
        output::print_tasks(&shown);
        println!();
        println!("{}", output::stats_summary(&stats));
        Ok(())
    }

    fn list_offline(&self, filter: &TaskFilter) -> Result<()> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| anyhow!("No task snapshot available"))?;
        let cached = cache
            .load_tasks()?
            .ok_or_else(|| anyhow!("No task snapshot yet. Run `taskdesk list` while online."))?;

        let shown = filter.apply(&cached.data);
        if self.json {
            return output::print_json(&shown);
        }
        output::print_tasks(&shown);
        println!();
        println!("{}", output::stats_summary(&TaskStats::from_tasks(&cached.data)));
        let stale = if cached.is_stale() { ", stale" } else { "" };
        eprintln!("Offline snapshot from {}{}", cached.age_display(), stale);
        Ok(())
    }

    async fn show(&self, id: i64) -> Result<()> {
        self.require_user()?;
        let task = self.api().get_task(id).await?;
        if self.json {
            return output::print_json(&task);
        }
        output::print_task(&task);
        Ok(())
    }

    async fn add(&self, title: String, description: String) -> Result<()> {
        self.require_user()?;
        let draft = TaskDraft::new(title).with_description(description);
        check_form(draft.validate())?;

        let created = self.api().create_task(&draft).await?;
        if self.json {
            return output::print_json(&created.task);
        }
        println!("{}", created.message.as_deref().unwrap_or("Task created"));
        println!("{}", output::task_line(&created.task));
        Ok(())
    }

    async fn edit(&self, args: EditArgs) -> Result<()> {
        self.require_user()?;
        let patch = TaskPatch {
            title: args.title.map(|t| t.trim().to_string()),
            description: args.description.map(|d| d.trim().to_string()),
            status: args.status,
        };
        if patch.is_empty() {
            bail!("Nothing to change. Pass --title, --description or --status.");
        }
        check_form(patch.validate())?;

        let updated = self.api().update_task(args.id, &patch).await?;
        if self.json {
            return output::print_json(&updated.task);
        }
        println!("{}", updated.message.as_deref().unwrap_or("Task updated"));
        println!("{}", output::task_line(&updated.task));
        Ok(())
    }

    async fn toggle(&self, id: i64) -> Result<()> {
        self.require_user()?;
        let toggled = self.api().toggle_task_status(id).await?;
        if self.json {
            return output::print_json(&toggled.task);
        }
        let fallback = format!("Task marked {}", toggled.task.status.label().to_lowercase());
        println!("{}", toggled.message.as_deref().unwrap_or(&fallback));
        println!("{}", output::task_line(&toggled.task));
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<()> {
        self.require_user()?;
        self.api().delete_task(id).await?;
        println!("Task deleted");
        Ok(())
    }

    async fn stats(&self) -> Result<()> {
        self.require_user()?;
        let stats = self.api().task_stats().await?;
        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.save_stats(&stats) {
                warn!(error = %e, "Failed to cache stats");
            }
        }
        if self.json {
            return output::print_json(&stats);
        }
        println!("{}", output::stats_summary(&stats));
        Ok(())
    }
}

/// Fail with every field error if the form is invalid
fn check_form(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let lines: Vec<String> = errors.iter().map(|e| format!("  {}", e)).collect();
    bail!("Please fix the following:\n{}", lines.join("\n"))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;
    Ok(input.trim().to_string())
}

/// Whether the core already emitted a notice for this failure
pub fn already_reported(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<ApiError>() {
        Some(ApiError::NetworkError(_)) => true,
        Some(ApiError::RefreshFailed(_)) => true,
        Some(ApiError::InvalidResponse(_)) => true,
        Some(api_error) => api_error.status().is_some(),
        None => false,
    }
}
