//! Client for the ChartRAG backend
//!
//! | Endpoint | Method | Request | Success |
//! |----------|--------|---------|---------|
//! | `/upload` | POST | multipart, field `datafile` | `{"summary": "..."}` |
//! | `/details` | GET | - | `{"graph_html": "...", "table": "..."}` |
//! | `/ask` | POST | `{"question": "..."}` | `{"answer": "..."}` |
//! | `/process_message` | POST | `{"message": "..."}` | `{"message": "..."}` |
//!
//! Failures may carry `{"error": "..."}` with a non-2xx status.

use crate::config::Config;
use crate::error::{Action, ClientError};
use crate::markup;
use crate::model::{ChartSource, Details, Summary, UploadFile};
use reqwest::blocking::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Multipart field the backend reads the CSV from
pub const UPLOAD_FIELD: &str = "datafile";

/// `/details` answers meaning "not ready yet": Accepted, Too Early, Service Unavailable
const PENDING_STATUSES: [u16; 3] = [202, 425, 503];

/// Outcome of one `/details` request
#[derive(Debug, Clone, PartialEq)]
pub enum DetailsPoll {
    Ready(Details),
    Pending,
}

/// Operations the backend offers
pub trait Backend: Send + Sync {
    fn upload(&self, file: &UploadFile) -> Result<Summary, ClientError>;

    fn details(&self) -> Result<DetailsPoll, ClientError>;

    fn ask(&self, question: &str) -> Result<String, ClientError>;

    fn process_message(&self, message: &str) -> Result<String, ClientError>;
}

/// Blocking HTTP implementation of [`Backend`]
pub struct HttpBackend {
    client: Client,
    config: Config,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    graph_html: Option<String>,
    #[serde(default)]
    chart: Option<serde_json::Value>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

impl HttpBackend {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<Response, ClientError> {
        let url = self.config.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.client.post(url).json(body).send()?;
        check_status(response)
    }
}

impl Backend for HttpBackend {
    fn upload(&self, file: &UploadFile) -> Result<Summary, ClientError> {
        let url = self.config.endpoint("upload")?;
        debug!(%url, file = %file.file_name, bytes = file.len(), "uploading");

        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str("text/csv")?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        let response = check_status(self.client.post(url).multipart(form).send()?)?;
        let body: UploadResponse = response.json()?;
        Ok(Summary::from_response(body.summary))
    }

    fn details(&self) -> Result<DetailsPoll, ClientError> {
        let url = self.config.endpoint("details")?;
        debug!(%url, "GET");
        let response = self.client.get(url).send()?;

        let status = response.status().as_u16();
        if PENDING_STATUSES.contains(&status) {
            return Ok(DetailsPoll::Pending);
        }

        let body: DetailsResponse = check_status(response)?.json()?;
        details_from_response(body, status)
    }

    fn ask(&self, question: &str) -> Result<String, ClientError> {
        if question.trim().is_empty() {
            return Err(ClientError::Input(Action::Ask.empty_input().to_string()));
        }
        let body: AskResponse = self.post_json("ask", &AskRequest { question })?.json()?;
        Ok(non_empty_or(body.answer, Action::Ask))
    }

    fn process_message(&self, message: &str) -> Result<String, ClientError> {
        if message.trim().is_empty() {
            return Err(ClientError::Input(Action::Message.empty_input().to_string()));
        }
        let request = MessageBody { message: Some(message.to_string()) };
        let body: MessageBody = self.post_json("process_message", &request)?.json()?;
        Ok(non_empty_or(body.message, Action::Message))
    }
}

/// Turn a non-2xx response into [`ClientError::Backend`], keeping the server's message
fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.json::<ErrorResponse>().ok().and_then(|b| b.error);
    warn!(status = status.as_u16(), message = ?message, "backend returned an error");
    Err(ClientError::Backend { status: status.as_u16(), message })
}

fn details_from_response(body: DetailsResponse, status: u16) -> Result<DetailsPoll, ClientError> {
    if body.status.as_deref() == Some("pending") {
        return Ok(DetailsPoll::Pending);
    }

    let spec = match body.chart {
        Some(serde_json::Value::String(json)) => match serde_json::from_str::<serde_json::Value>(&json) {
            Ok(spec) => Some(spec),
            Err(e) if body.graph_html.is_some() => {
                warn!(error = %e, "chart field is not valid JSON, using graph_html");
                None
            }
            Err(e) => return Err(e.into()),
        },
        Some(spec) if spec.is_object() => Some(spec),
        _ => None,
    };

    let chart = match (spec, body.graph_html) {
        (Some(spec), _) => ChartSource::Spec(spec),
        (None, Some(html)) => ChartSource::Markup(markup::extract_body(&html).to_string()),
        (None, None) => {
            return Err(ClientError::Backend {
                status,
                message: Some("Details response contained no chart.".to_string()),
            })
        }
    };

    Ok(DetailsPoll::Ready(Details {
        chart,
        table: body.table.unwrap_or_default(),
    }))
}

fn non_empty_or(value: Option<String>, action: Action) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => action.fallback().unwrap_or_default().to_string(),
    }
}
