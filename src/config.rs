use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use std::io::IsTerminal;

use crate::auth::{CredentialSource, DialoguerPrompt, SessionSettings};
use crate::muckrock::HttpConnectorConfig;

/// MuckRock gateway - FOIA tools over MCP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Transport to serve MCP over
    #[arg(short, long, env = "MCP_TRANSPORT", value_enum, default_value = "stdio")]
    pub transport: Transport,

    /// Server host address (http transport)
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port (http transport)
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// API key protecting POST /mcp
    #[arg(short = 'k', long, env = "GATEWAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// MuckRock username; takes precedence over MUCKROCK_USERNAME
    #[arg(short, long)]
    pub username: Option<String>,

    /// MuckRock password; prefer MUCKROCK_PASSWORD, command lines are visible to other users
    #[arg(long)]
    pub password: Option<String>,

    /// MuckRock API base URL
    #[arg(
        long,
        env = "MUCKROCK_API_URL",
        default_value = "https://www.muckrock.com/api_v2/"
    )]
    pub api_url: String,

    /// MuckRock token endpoint
    #[arg(
        long,
        env = "MUCKROCK_TOKEN_URL",
        default_value = "https://accounts.muckrock.com/api/token/"
    )]
    pub token_url: String,

    /// Assumed session lifetime in seconds
    #[arg(long, env = "TOKEN_LIFETIME_SECS", default_value = "7200")]
    pub token_lifetime: u64,

    /// Refresh this many seconds before assumed expiry
    #[arg(long, env = "TOKEN_REFRESH_BUFFER_SECS", default_value = "600")]
    pub refresh_buffer: u64,

    /// Timeout for login and probe calls in seconds
    #[arg(long, env = "LOGIN_TIMEOUT_SECS", default_value = "30")]
    pub login_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// HTTP max retries
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub http_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug)]
pub struct Config {
    pub transport: Transport,

    // Server settings
    pub server_host: String,
    pub server_port: u16,
    pub gateway_api_key: Option<String>,

    // Explicit MuckRock credentials from the command line.
    // MUCKROCK_USERNAME/MUCKROCK_PASSWORD are read by CredentialSource.
    pub muckrock_username: Option<String>,
    pub muckrock_password: Option<SecretString>,

    // MuckRock endpoints
    pub api_url: String,
    pub token_url: String,

    // Session timing
    pub token_lifetime_secs: u64,
    pub token_refresh_buffer_secs: u64,
    pub login_timeout_secs: u64,
    pub pending_login_ttl_secs: u64,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub http_max_retries: u32,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::try_parse().context("Failed to parse command line arguments")?;
        Ok(Self::from_args(args))
    }

    pub fn from_args(args: CliArgs) -> Self {
        Config {
            transport: args.transport,

            server_host: args.host,
            server_port: args.port,
            gateway_api_key: args.api_key.filter(|k| !k.is_empty()),

            muckrock_username: args.username.filter(|u| !u.trim().is_empty()),
            muckrock_password: args
                .password
                .filter(|p| !p.is_empty())
                .map(|p| SecretString::new(p.into())),

            api_url: args.api_url,
            token_url: args.token_url,

            token_lifetime_secs: args.token_lifetime,
            token_refresh_buffer_secs: args.refresh_buffer,
            login_timeout_secs: args.login_timeout,

            pending_login_ttl_secs: std::env::var("PENDING_LOGIN_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,
            http_max_retries: args.http_retries,

            log_level: args.log_level,
            log_format: args.log_format,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.token_lifetime_secs == 0 {
            anyhow::bail!("TOKEN_LIFETIME_SECS must be greater than zero");
        }

        self.session_settings()?;
        self.pending_login_ttl()?;

        if self.token_refresh_buffer_secs >= self.token_lifetime_secs {
            anyhow::bail!(
                "TOKEN_REFRESH_BUFFER_SECS ({}) must be shorter than TOKEN_LIFETIME_SECS ({})",
                self.token_refresh_buffer_secs,
                self.token_lifetime_secs
            );
        }

        if self.login_timeout_secs == 0 {
            anyhow::bail!("LOGIN_TIMEOUT_SECS must be greater than zero");
        }

        for (name, url) in [
            ("MUCKROCK_API_URL", &self.api_url),
            ("MUCKROCK_TOKEN_URL", &self.token_url),
        ] {
            reqwest::Url::parse(url).with_context(|| format!("{} is not a valid URL: {}", name, url))?;
        }

        if self.muckrock_username.is_some() != self.muckrock_password.is_some() {
            tracing::warn!("Only one of --username and --password was given; ignoring both");
        }

        Ok(())
    }

    pub fn session_settings(&self) -> Result<SessionSettings> {
        SessionSettings::try_from_secs(
            self.token_lifetime_secs,
            self.token_refresh_buffer_secs,
            self.login_timeout_secs,
        )
        .context("TOKEN_LIFETIME_SECS and TOKEN_REFRESH_BUFFER_SECS must fit a signed duration")
    }

    pub fn connector_config(&self) -> HttpConnectorConfig {
        HttpConnectorConfig {
            api_url: self.api_url.clone(),
            token_url: self.token_url.clone(),
            connect_timeout: self.http_connect_timeout,
            request_timeout: self.http_request_timeout,
            max_retries: self.http_max_retries,
            retry_base_delay_ms: 500,
        }
    }

    pub fn pending_login_ttl(&self) -> Result<chrono::Duration> {
        i64::try_from(self.pending_login_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .context("PENDING_LOGIN_TTL_SECS must fit a signed duration")
    }

    /// Whether the terminal may be used to ask for credentials.
    /// The stdio transport never prompts; stdin carries protocol traffic.
    pub fn should_prompt(&self) -> bool {
        self.transport == Transport::Http && std::io::stdin().is_terminal()
    }

    /// Credential source for startup: command line, then environment, then the terminal prompt
    pub fn credential_source(&self) -> CredentialSource {
        let source = CredentialSource::new()
            .with_explicit(self.muckrock_username.clone(), self.muckrock_password.clone())
            .from_env();

        if !source.has_noninteractive() && self.should_prompt() {
            source.with_prompt(Box::new(DialoguerPrompt))
        } else {
            source
        }
    }
}
