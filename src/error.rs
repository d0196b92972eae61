use std::time::Duration;

/// Fatal start-up problems. The process exits before any turn runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is required (set via config file or environment variable)")]
    MissingApiKey,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Transport-level failures talking to the model provider. They fail the
/// current turn only.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("provider request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to read provider stream: {0}")]
    Stream(#[source] std::io::Error),

    #[error("provider returned no choices")]
    EmptyResponse,
}

impl ProviderError {
    /// Classify a reqwest failure; `timeout` is the limit the request ran with.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::Transport(err)
        }
    }

    pub fn from_io(err: std::io::Error, timeout: Duration) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            return ProviderError::Timeout(timeout);
        }
        let is_timeout = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout);
        if is_timeout {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::Stream(err)
        }
    }
}

/// The model asked for something we cannot run.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("function call arrived without a function name")]
    MissingFunctionName,

    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("error parsing function arguments: {0}")]
    InvalidArguments(#[source] serde_json::Error),

    #[error("function arguments have no `command` field")]
    MissingCommand,
}

/// Why a single turn failed. History is never left with a partial entry.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
