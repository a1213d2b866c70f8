//! Errors raised while talking to the backend, and the texts shown to the user
//!
//! Every failure a user can trigger ends up as exactly one alert. The alert
//! text depends on what the user was doing ([`Action`]) and on whether the
//! backend explained itself:
//!
//! | Failure | Alert text |
//! |---------|------------|
//! | Non-2xx with `{"error": "..."}` | the server's message |
//! | Non-2xx without an `error` field | the action's default error |
//! | Connection refused, bad JSON, timeout | the action's transport error |

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur when interacting with the backend
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "backend returned HTTP {status}: {}",
        .message.as_deref().unwrap_or("no error message")
    )]
    Backend { status: u16, message: Option<String> },

    #[error("{0}")]
    Input(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("details not ready after {attempts} attempt(s)")]
    NotReady { attempts: u32 },

    #[error("cancelled")]
    Cancelled,
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// A user-facing operation, used to pick fallback and alert texts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Upload,
    Details,
    Ask,
    Message,
}

pub const NO_FILE_SELECTED: &str = "Please select a file first.";

impl Action {
    /// Text used when the backend succeeds but leaves the payload field out.
    /// Details have none: a response without a chart is an error.
    pub fn fallback(&self) -> Option<&'static str> {
        match self {
            Action::Upload => Some("File uploaded successfully."),
            Action::Details => None,
            Action::Ask => Some("No answer received."),
            Action::Message => Some("No response received."),
        }
    }

    /// Alert for a non-2xx response without a server-supplied message
    pub fn default_error(&self) -> &'static str {
        match self {
            Action::Upload => "Error uploading file.",
            Action::Details => "Error fetching details.",
            Action::Ask => "Error getting answer.",
            Action::Message => "Error processing message.",
        }
    }

    /// Alert for transport-level failures
    pub fn transport_error(&self) -> &'static str {
        match self {
            Action::Upload => "An error occurred while uploading the file.",
            Action::Details => "An error occurred while fetching the details.",
            Action::Ask => "An error occurred while asking the question.",
            Action::Message => "An error occurred while sending the message.",
        }
    }

    /// Alert for empty user input
    pub fn empty_input(&self) -> &'static str {
        match self {
            Action::Upload | Action::Details => NO_FILE_SELECTED,
            Action::Ask => "Please enter a question.",
            Action::Message => "Please enter a message.",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Upload => write!(f, "upload"),
            Action::Details => write!(f, "details"),
            Action::Ask => write!(f, "ask"),
            Action::Message => write!(f, "message"),
        }
    }
}

impl ClientError {
    /// The single alert text shown to the user for this failure
    pub fn alert_message(&self, action: Action) -> String {
        match self {
            ClientError::Backend { message: Some(m), .. } if !m.is_empty() => m.clone(),
            ClientError::Backend { .. } => action.default_error().to_string(),
            ClientError::Input(m) => m.clone(),
            ClientError::Config(m) => format!("Invalid configuration: {}", m),
            ClientError::NotReady { .. } => {
                "The chart is still being prepared. Try uploading again later.".to_string()
            }
            ClientError::Cancelled => String::new(),
            ClientError::Http(_) | ClientError::Json(_) | ClientError::Io(_) => {
                action.transport_error().to_string()
            }
        }
    }

    /// Cancellation is a normal outcome of starting over, never an alert
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
