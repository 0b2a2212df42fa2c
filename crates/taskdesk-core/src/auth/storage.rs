//! Persisted session data.
//!
//! The access token, refresh token and user snapshot live together in one
//! key/value map. Backends load and save the whole map, so the three keys
//! are always written or cleared as a group.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Context, Result};

use crate::models::{TokenPair, User};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

pub type Entries = BTreeMap<String, String>;

/// Durable key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn load(&self) -> Result<Entries>;
    fn save(&self, entries: &Entries) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn load(&self) -> Result<Entries> {
        (**self).load()
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        (**self).save(entries)
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Entries) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self) -> Result<Entries> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        Ok(entries.clone())
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        let mut current = self
            .entries
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        *current = entries.clone();
        Ok(())
    }
}

/// Typed handle over a `KeyValueStore`, shared by the API client and the
/// session store. Clone is cheap.
#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStorage").finish_non_exhaustive()
    }
}

impl SessionStorage {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.load()?.remove(key).filter(|v| !v.is_empty()))
    }

    /// Load, change and save the map while holding the write lock
    fn modify(&self, change: impl FnOnce(&mut Entries)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("Session storage lock poisoned"))?;
        let mut entries = self.store.load()?;
        change(&mut entries);
        self.store.save(&entries)
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.get(REFRESH_TOKEN_KEY)
    }

    pub fn user(&self) -> Result<Option<User>> {
        match self.get(USER_KEY)? {
            Some(json) => {
                let user = serde_json::from_str(&json).context("Failed to parse stored user")?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Whether both an access token and a user snapshot are stored
    pub fn has_session(&self) -> Result<bool> {
        let entries = self.store.load()?;
        let present = |key: &str| entries.get(key).map(|v| !v.is_empty()).unwrap_or(false);
        Ok(present(ACCESS_TOKEN_KEY) && present(USER_KEY))
    }

    /// Store a fresh login: both tokens and the user, in one write
    pub fn save_session(&self, tokens: &TokenPair, user: &User) -> Result<()> {
        let user_json = serde_json::to_string(user).context("Failed to serialize user")?;
        self.modify(|entries| {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), tokens.access.clone());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), tokens.refresh.clone());
            entries.insert(USER_KEY.to_string(), user_json);
        })
    }

    /// Replace the access token, and the refresh token if the server rotated it
    pub fn update_access_token(&self, access: &str, rotated_refresh: Option<&str>) -> Result<()> {
        self.modify(|entries| {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
            if let Some(refresh) = rotated_refresh {
                entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
            }
        })
    }

    /// Remove tokens and user together
    pub fn clear(&self) -> Result<()> {
        self.modify(|entries| {
            for key in SESSION_KEYS {
                entries.remove(key);
            }
        })
    }
}
