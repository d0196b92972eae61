use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::orchestrator::TurnTimeouts;

const DEFAULT_PROMPT_TEMPLATE: &str = r#"Your name is Aurora.
You are a helpful assistant that provides SHORT and CONCISE answers.
You are running in a terminal on {os} ({arch}); the user's shell is {shell}.
You can use ANSI escape codes to color text:
- Red: \033[31m
- Green: \033[32m
- Yellow: \033[33m
- Blue: \033[34m
- Magenta: \033[35m
- Cyan: \033[36m
- Reset: \033[0m
- Bold: \033[1m
- Underline: \033[4m
Use colors to highlight important information, warnings, and errors.
Example usage: \033[31mThis is red text\033[0m

When the user asks you to perform an action, call execute_terminal_command
with the shell command to run, for example "ls -la" to list files.
After a command runs you will see its output; explain it briefly."#;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
}

impl LlmConfig {
    pub fn provider(&self) -> Result<ProviderKind, ConfigError> {
        match self.provider.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("openai") => Ok(ProviderKind::OpenAi),
            Some(other) => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        resolve_api_key(self.api_key.as_deref(), env::var("OPENAI_API_KEY").ok())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .or_else(|| env::var("OPENAI_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

fn resolve_api_key(configured: Option<&str>, from_env: Option<String>) -> Result<String, ConfigError> {
    configured
        .map(str::to_string)
        .or(from_env)
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)
}

#[derive(Debug, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_prompt_template")]
    pub template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct ShellConfig {
    /// Shell executable path. If not set, `$SHELL` or bash.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_query_secs")]
    pub query_secs: u64,
    #[serde(default = "default_stream_secs")]
    pub stream_secs: u64,
    #[serde(default = "default_interpret_secs")]
    pub interpret_secs: u64,
}

fn default_query_secs() -> u64 {
    30
}

fn default_stream_secs() -> u64 {
    60
}

fn default_interpret_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_secs: default_query_secs(),
            stream_secs: default_stream_secs(),
            interpret_secs: default_interpret_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn turn_timeouts(&self) -> TurnTimeouts {
        TurnTimeouts {
            query: Duration::from_secs(self.query_secs),
            stream: Duration::from_secs(self.stream_secs),
            interpret: Duration::from_secs(self.interpret_secs),
        }
    }
}

#[derive(Debug)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub shell: String,
}

impl SystemInfo {
    pub fn collect(shell_path: &str) -> Self {
        Self {
            os: Self::detect_os(),
            arch: env::consts::ARCH.to_string(),
            shell: shell_path
                .rsplit('/')
                .next()
                .unwrap_or(shell_path)
                .to_string(),
        }
    }

    fn detect_os() -> String {
        if cfg!(target_os = "macos") {
            "macOS".to_string()
        } else if cfg!(target_os = "linux") {
            "Linux".to_string()
        } else {
            env::consts::OS.to_string()
        }
    }

    pub fn to_vars(&self) -> HashMap<&str, &str> {
        let mut vars = HashMap::new();
        vars.insert("os", self.os.as_str());
        vars.insert("arch", self.arch.as_str());
        vars.insert("shell", self.shell.as_str());
        vars
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // 1. Check path specified by environment variable
        if let Ok(path) = env::var("AURORA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        // 2. Check XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("aurora").join("config.toml");
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        // 3. Fall back to default configuration
        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn shell_path(&self) -> String {
        self.shell
            .path
            .clone()
            .unwrap_or_else(crate::pty::default_shell)
    }
}

pub fn render_prompt(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
