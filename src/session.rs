use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::client::Client;
use crate::config::Settings;
use crate::error::api_error;
use crate::payloads::Credentials;
use crate::util::mask_key;

/// The saved session key: a single string in a single file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.key_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Saved key, if the file exists and is not blank.
    pub fn load(&self) -> Result<Option<String>> {
        tracing::debug!(path = %self.path.display(), "reading API key file");
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let key = text.trim();
                Ok((!key.is_empty()).then(|| key.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("failed to read API key file {}", self.path.display())),
        }
    }

    pub fn save(&self, key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
        }
        tracing::debug!(path = %self.path.display(), "writing API key file");
        std::fs::write(&self.path, key)
            .with_context(|| format!("failed to write API key file {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to restrict {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Removes the key file. Returns whether there was one.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "removed API key file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove API key file {}", self.path.display())),
        }
    }

    /// Reuses the saved key when the server still accepts it, otherwise logs
    /// in with `credentials`. A fresh key is written to the store only when
    /// `save` is set.
    pub fn establish(&self, client: &Client, credentials: &Credentials, save: bool) -> Result<String> {
        match self.load()? {
            Some(key) => {
                tracing::debug!("found API key in file, will try to reuse");
                if key_is_valid(client, &key)? {
                    tracing::info!(key = %mask_key(&key), "API key appears to be valid, reusing it");
                    return Ok(key);
                }
            }
            None => tracing::info!("no key file found, performing new login"),
        }

        let key = client
            .login(credentials)
            .context("can't continue without successful authentication")?;
        if save {
            self.save(&key)?;
        }
        Ok(key)
    }

    /// Logs out and removes the key file.
    pub fn end(&self, client: &Client, key: &str) -> Result<()> {
        tracing::info!(key = %mask_key(key), "logging out to invalidate the API key");
        client.logout(key)?;
        self.remove()?;
        Ok(())
    }
}

/// Checks a key with a cheap authenticated call (`notifications`).
///
/// Server-side errors mean "not valid"; transport failures are returned.
pub fn key_is_valid(client: &Client, key: &str) -> Result<bool> {
    let err = match client.notifications(key) {
        Ok(_) => return Ok(true),
        Err(e) => e,
    };

    match api_error(&err) {
        Some(api) if api.is_unauthorized() => {
            tracing::warn!(key = %mask_key(key), "API key appears to be invalid, new login required");
            Ok(false)
        }
        Some(api) => {
            tracing::error!(code = %api.code, message = %api.message, "error while validating API key");
            Ok(false)
        }
        None => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_or_blank_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("key"));
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), None);

        std::fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join(".usgs_api_key"));
        store.save("f00dfeed").unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap().as_deref(), Some("f00dfeed"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
    }
}
