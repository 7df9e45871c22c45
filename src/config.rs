//! Runtime settings, loaded from the environment with sane defaults.
//!
//! Every long-lived handle (store, gateway, tracker client, dispatcher,
//! proxy) is constructed from one of these structs at process start and
//! dependency-injected from there; nothing re-reads the environment later.

use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Settings for the two primary reviewers and the optional validator.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Reviewer A: slow, authoritative.
    pub mistral_base_url: String,
    pub mistral_model: String,
    pub mistral_timeout: Duration,
    /// Reviewer B: fast, optional.
    pub qwen_base_url: String,
    pub qwen_model: String,
    pub qwen_timeout: Duration,
    /// Cloud validator; disabled when no key is configured.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_timeout: Duration,
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self {
            mistral_base_url: env_string("MISTRAL_API_BASE_URL", "http://127.0.0.1:1234"),
            mistral_model: env_string("MISTRAL_MODEL", "mistral:7b"),
            mistral_timeout: Duration::from_secs(90),
            qwen_base_url: env_string("QWEN_API_BASE_URL", "http://127.0.0.1:1235"),
            qwen_model: env_string("QWEN_MODEL", "qwen2.5-coder:7b"),
            qwen_timeout: Duration::from_secs(15),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.0-flash"),
            gemini_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Issue tracker (Jira REST v2) settings.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub base_url: String,
    pub user_email: String,
    pub api_token: String,
    pub project_key: String,
    /// Preferred issue type name; discovery falls back when absent.
    pub issue_type: String,
}

impl TrackerSettings {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("JIRA_BASE_URL", "https://your-domain.atlassian.net"),
            user_email: env_string("JIRA_USER_EMAIL", ""),
            api_token: env_string("JIRA_API_TOKEN", ""),
            project_key: env_string("JIRA_PROJECT_KEY", "SENT"),
            issue_type: env_string("JIRA_ISSUE_TYPE", "Bug"),
        }
    }

    /// Credentials present at all?
    pub fn is_configured(&self) -> bool {
        !self.user_email.is_empty() && !self.api_token.is_empty()
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Notification dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub poll_interval: Duration,
}

impl DispatcherSettings {
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(env_u64("JIRA_POLLING_INTERVAL", 30)),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Webhook verification settings.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub secret: String,
    /// Dev-mode escape hatch: log a bad signature and continue instead of
    /// rejecting. Off by default.
    pub allow_unverified: bool,
}

impl WebhookSettings {
    pub fn from_env() -> Self {
        Self {
            secret: env_string("GITHUB_WEBHOOK_SECRET", ""),
            allow_unverified: env_bool("WEBHOOK_ALLOW_UNVERIFIED", false),
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pass-through proxy adapter settings.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub listen_addr: String,
    pub target_base: String,
    pub timeout: Duration,
}

impl ProxySettings {
    pub fn from_env() -> Self {
        Self {
            listen_addr: env_string("PROXY_LISTEN_ADDR", "0.0.0.0:8080"),
            target_base: env_string("PROXY_TARGET", "http://127.0.0.1:1234"),
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Top-level settings bundle.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database path shared by all workers.
    pub db_path: String,
    pub llm: LlmSettings,
    pub tracker: TrackerSettings,
    pub dispatcher: DispatcherSettings,
    pub webhook: WebhookSettings,
    pub proxy: ProxySettings,
    /// Dependency-injection marker recognised by the extractor.
    pub dependency_marker: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            db_path: env_string("SENTINEL_DB_PATH", "sentinel.db"),
            llm: LlmSettings::from_env(),
            tracker: TrackerSettings::from_env(),
            dispatcher: DispatcherSettings::from_env(),
            webhook: WebhookSettings::from_env(),
            proxy: ProxySettings::from_env(),
            dependency_marker: env_string("DEPENDENCY_MARKER", "Depends"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}
