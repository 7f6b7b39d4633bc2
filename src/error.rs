use std::fmt;
use thiserror::Error;

/// Why a call to the hosted model did not produce a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFailureKind {
    Auth,
    Throttling,
    Transport,
    MalformedResponse,
}

impl fmt::Display for GatewayFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GatewayFailureKind::Auth => "auth",
            GatewayFailureKind::Throttling => "throttling",
            GatewayFailureKind::Transport => "transport",
            GatewayFailureKind::MalformedResponse => "malformed response",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model gateway error ({kind}): {message}")]
    Gateway {
        kind: GatewayFailureKind,
        message: String,
    },

    #[error("Model could not produce a query: {0}")]
    SynthesisDegenerate(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Artifact write error: {0}")]
    ArtifactWrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    #[error("Tool protocol error: {0}")]
    ToolProtocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
}

impl AgentError {
    pub fn gateway(kind: GatewayFailureKind, message: impl Into<String>) -> Self {
        AgentError::Gateway {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
