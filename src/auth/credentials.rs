// Credential resolution
// Precedence: explicit > environment > interactive prompt > anonymous

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

use super::types::Credentials;

pub const USERNAME_ENV: &str = "MUCKROCK_USERNAME";
pub const PASSWORD_ENV: &str = "MUCKROCK_PASSWORD";

/// Something that can ask a human for credentials
pub trait CredentialPrompt {
    fn prompt(&self) -> Result<Option<Credentials>>;
}

/// Terminal prompt
pub struct DialoguerPrompt;

impl CredentialPrompt for DialoguerPrompt {
    fn prompt(&self) -> Result<Option<Credentials>> {
        eprintln!();
        eprintln!("No MuckRock credentials found in the environment.");
        eprintln!("Leave the username empty to continue with anonymous access.");
        eprintln!();

        let username: String = Input::new()
            .with_prompt("MuckRock username")
            .allow_empty(true)
            .interact_text()
            .context("Failed to read username")?;

        if username.trim().is_empty() {
            return Ok(None);
        }

        let password: String = Password::new()
            .with_prompt("MuckRock password")
            .allow_empty_password(true)
            .interact()
            .context("Failed to read password")?;

        Ok(pair(Some(username), Some(SecretString::new(password.into()))))
    }
}

/// Layered credential source; absence is a normal outcome, never an error
#[derive(Default)]
pub struct CredentialSource {
    explicit: Option<Credentials>,
    env: Option<Credentials>,
    prompt: Option<Box<dyn CredentialPrompt + Send + Sync>>,
}

impl CredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller-supplied pair, used only if both halves are non-empty
    pub fn with_explicit(mut self, username: Option<String>, password: Option<SecretString>) -> Self {
        self.explicit = pair(username, password);
        self
    }

    /// Pair read from the process environment
    pub fn from_env(self) -> Self {
        let username = std::env::var(USERNAME_ENV).ok();
        let password = std::env::var(PASSWORD_ENV)
            .ok()
            .map(|p| SecretString::new(p.into()));
        self.with_env_values(username, password)
    }

    pub fn with_env_values(mut self, username: Option<String>, password: Option<SecretString>) -> Self {
        self.env = pair(username, password);
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn CredentialPrompt + Send + Sync>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Whether a non-interactive source already yields credentials
    pub fn has_noninteractive(&self) -> bool {
        self.explicit.is_some() || self.env.is_some()
    }

    pub fn resolve(self) -> Option<Credentials> {
        if let Some(creds) = self.explicit {
            tracing::debug!("Using explicitly supplied credentials for {}", creds.username);
            return Some(creds);
        }

        if let Some(creds) = self.env {
            tracing::debug!("Using credentials from environment for {}", creds.username);
            return Some(creds);
        }

        if let Some(prompt) = self.prompt {
            match prompt.prompt() {
                Ok(Some(creds)) => return Some(creds),
                Ok(None) => {}
                Err(e) => tracing::warn!("Credential prompt failed: {:#}", e),
            }
        }

        tracing::info!("No credentials found, continuing anonymously");
        None
    }
}

/// Build credentials from two halves, both of which must be non-empty
fn pair(username: Option<String>, password: Option<SecretString>) -> Option<Credentials> {
    let username = username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
    let password = password.filter(|p| !p.expose_secret().is_empty())?;
    Some(Credentials::from_secret(username, password))
}

/// Read a password from a file, trimming surrounding whitespace
pub fn read_password_file(path: &str) -> Result<SecretString> {
    let path = expand_tilde(path);
    read_password_from(&path)
}

fn read_password_from(path: &Path) -> Result<SecretString> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read password file: {}", path.display()))?;

    let password = contents.trim();
    if password.is_empty() {
        anyhow::bail!("Password file is empty: {}", path.display());
    }

    Ok(SecretString::new(password.into()))
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
