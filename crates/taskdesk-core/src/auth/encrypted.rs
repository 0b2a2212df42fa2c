//! Encrypted on-disk session store.
//!
//! The key/value map is serialized to JSON and sealed with XChaCha20-Poly1305.
//! The key is derived with Argon2 from a machine identifier (or an explicit
//! secret), so a copied session file is useless on another machine.
//! File layout: 24-byte nonce followed by the ciphertext.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use tracing::debug;

use super::storage::{Entries, KeyValueStore};

/// Session file name in cache directory
pub const SESSION_FILE: &str = "session.bin";

/// Argon2 salt; at least 8 bytes
const KEY_SALT: &[u8] = b"taskdesk-session-store-v1";

const NONCE_LEN: usize = 24;

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

pub struct EncryptedFileStore {
    path: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileStore {
    /// Store at `dir/session.bin`, keyed to this machine
    pub fn open(dir: &Path) -> Result<Self> {
        Self::with_secret(dir.join(SESSION_FILE), Self::machine_secret().as_bytes())
    }

    pub fn with_secret(path: PathBuf, secret: &[u8]) -> Result<Self> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(secret, KEY_SALT, &mut key)
            .map_err(|e| anyhow!("Failed to derive session key: {}", e))?;
        Ok(Self { path, key })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn machine_secret() -> String {
        for path in MACHINE_ID_PATHS {
            if let Ok(id) = std::fs::read_to_string(path) {
                let id = id.trim();
                if !id.is_empty() {
                    return id.to_string();
                }
            }
        }
        debug!("No machine id found, deriving session key from home directory");
        dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "taskdesk".to_string())
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for EncryptedFileStore {
    fn load(&self) -> Result<Entries> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }

        let bytes = std::fs::read(&self.path).context("Failed to read session file")?;
        if bytes.len() < NONCE_LEN {
            bail!("Session file is truncated");
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt session file"))?;

        serde_json::from_slice(&plaintext).context("Failed to parse session file")
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }

        let plaintext = serde_json::to_vec(entries)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| anyhow!("Failed to encrypt session file"))?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ciphertext);
        self.write_atomically(&bytes)
    }
}
