use anyhow::{Context, Result};
use keyring::Entry;

use super::storage::{Entries, KeyValueStore};

const SERVICE_NAME: &str = "taskdesk";

/// Session map kept as one JSON secret in the OS keychain
pub struct KeyringStore {
    account: String,
}

impl KeyringStore {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl KeyValueStore for KeyringStore {
    fn load(&self) -> Result<Entries> {
        match self.entry()?.get_password() {
            Ok(json) => serde_json::from_str(&json).context("Failed to parse keychain session"),
            Err(keyring::Error::NoEntry) => Ok(Entries::new()),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        let entry = self.entry()?;
        if entries.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e).context("Failed to delete session from keychain"),
            };
        }

        let json = serde_json::to_string(entries)?;
        entry
            .set_password(&json)
            .context("Failed to store session in keychain")
    }
}
