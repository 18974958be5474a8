use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

const ENV_TOKEN: &str = "ROSTER_TOKEN";
const KEYRING_SERVICE: &str = "roster";

/// Where the API token can currently come from
#[derive(Debug, Clone)]
pub struct TokenStatus {
    pub keyring_available: bool,
    pub env_var_set: bool,
    pub file_path: PathBuf,
    pub file_exists: bool,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Token storage:")?;
        writeln!(
            f,
            "  Keyring: {}",
            if self.keyring_available {
                "available"
            } else {
                "unavailable"
            }
        )?;
        writeln!(
            f,
            "  Environment var ({}): {}",
            ENV_TOKEN,
            if self.env_var_set { "set" } else { "not set" }
        )?;
        writeln!(f, "  File fallback: {}", self.file_path.display())?;
        write!(f, "  File exists: {}", self.file_exists)
    }
}

/// Bearer token storage for one API server.
///
/// Lookup order: `ROSTER_TOKEN`, OS keyring, then a 0600 file in the config
/// directory.
pub struct TokenStore {
    key: String,
    token_file: PathBuf,
}

fn safe_name(s: &str) -> String {
    s.replace(['@', '.', '/', '\\', ':', '?', '&', '='], "_")
}

impl TokenStore {
    pub fn new(base_url: &str) -> Self {
        let server = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let token_file = crate::config::Config::config_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(format!(".token_{}", safe_name(server)));

        Self {
            key: format!("token:{}", server),
            token_file,
        }
    }

    #[cfg(test)]
    fn with_file(base_url: &str, token_file: PathBuf) -> Self {
        Self {
            token_file,
            ..Self::new(base_url)
        }
    }

    pub fn status(&self) -> TokenStatus {
        let probe = format!("probe:{}", self.key);
        let keyring_available = keyring::Entry::new(KEYRING_SERVICE, &probe)
            .map(|entry| {
                entry.set_password("__probe__").is_ok()
                    && entry.get_password().is_ok()
                    && entry.delete_credential().is_ok()
            })
            .unwrap_or(false);

        TokenStatus {
            keyring_available,
            env_var_set: Self::env_token().is_some(),
            file_path: self.token_file.clone(),
            file_exists: self.token_file.exists(),
        }
    }

    fn env_token() -> Option<String> {
        env::var(ENV_TOKEN).ok().filter(|t| !t.trim().is_empty())
    }

    fn keyring_get(&self) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &self.key).ok()?;
        entry.get_password().ok()
    }

    fn keyring_set(&self, token: &str) -> bool {
        keyring::Entry::new(KEYRING_SERVICE, &self.key)
            .map(|entry| entry.set_password(token).is_ok())
            .unwrap_or(false)
    }

    fn file_get(&self) -> Option<String> {
        fs::read_to_string(&self.token_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn file_set(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.token_file.parent() {
            fs::create_dir_all(parent)?;
        }

        // Create with restricted permissions atomically to avoid TOCTOU
        #[cfg(unix)]
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.token_file)
                .with_context(|| format!("Failed to write {}", self.token_file.display()))?;
            file.write_all(token.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.token_file, token)?;
        }

        Ok(())
    }

    /// Stored token, if any.
    pub fn token(&self) -> Option<String> {
        Self::env_token()
            .or_else(|| self.keyring_get())
            .or_else(|| self.file_get())
    }

    pub fn get_token(&self) -> Result<String> {
        self.token().with_context(|| {
            format!(
                "No API token. Set {} or run 'roster login'.",
                ENV_TOKEN
            )
        })
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Token is empty");
        }

        if self.keyring_set(token) && self.keyring_get().as_deref() == Some(token) {
            return Ok(());
        }

        tracing::warn!("Keyring unavailable, storing token in {}", self.token_file.display());
        eprintln!("Note: Keyring unavailable, using file-based storage.");
        self.file_set(token)
    }

    pub fn delete_token(&self) -> Result<()> {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &self.key) {
            let _ = entry.delete_credential();
        }
        if self.token_file.exists() {
            fs::remove_file(&self.token_file)
                .with_context(|| format!("Failed to remove {}", self.token_file.display()))?;
        }
        Ok(())
    }
}
