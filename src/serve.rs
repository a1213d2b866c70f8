//! HTTP server for interactive mode
//!
//! `chartrag serve` → starts server, opens browser, shows the upload page.
//! The page never talks to the backend directly: uploads, questions and
//! messages go through this server, which owns the [`SharedSession`].

use crate::error::{Action, ClientError};
use crate::markup::{chart_document, table_document};
use crate::model::UploadFile;
use crate::session::{SessionView, SharedSession};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

// Embed the UI directly in the binary
const UI_HTML: &str = include_str!("ui.html");

/// Content-Security-Policy for chart documents: scripts run, but in an opaque origin
const CHART_CSP: &str = "sandbox allow-scripts";

/// Content-Security-Policy for table documents: every sandbox restriction applies
const TABLE_CSP: &str = "sandbox";

const HTML_TYPE: &str = "text/html; charset=utf-8";

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self { ok: false, data: None, error: Some(message) }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct UploadParams {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AskParams {
    #[serde(default)]
    question: String,
}

#[derive(Deserialize, Debug)]
struct MessageParams {
    #[serde(default)]
    message: String,
}

/// Everything a request handler needs
#[derive(Clone)]
pub struct App {
    pub session: SharedSession,
    pub library_url: String,
}

/// Start server, open browser, serve UI
pub fn start(port: u16, app: App, open_browser: bool) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let url = format!("http://localhost:{}", port);

    eprintln!("\n\x1b[1;32mChartRAG\x1b[0m");
    eprintln!("   {}\n", url);

    if open_browser {
        let _ = open::that(&url);
    }

    run(&server, &app);
    app.session.close();
    Ok(())
}

/// Handle requests until the server shuts down
pub fn run(server: &Server, app: &App) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, app) {
            warn!(error = %e, "failed to answer request");
        }
    }
}

fn handle_request(mut request: Request, app: &App) -> std::io::Result<()> {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/");
    let method = request.method().clone();
    debug!(%method, path, "request");

    match (&method, path) {
        // Serve embedded UI
        (&Method::Get, "/") => {
            let response =
                Response::from_string(UI_HTML).with_header(header("Content-Type", HTML_TYPE));
            request.respond(response)
        }

        // API: Upload a CSV, body is the raw file
        (&Method::Post, "/api/upload") => {
            let params = parse_query::<UploadParams>(&url).unwrap_or_default();
            let mut bytes = Vec::new();
            request.as_reader().read_to_end(&mut bytes)?;

            let file_name = params
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "data.csv".to_string());
            info!(file = %file_name, bytes = bytes.len(), "upload from browser");

            let result = app.session.upload(UploadFile::new(file_name, bytes));
            respond_view(request, result.map(|_| ()), Action::Upload, app)
        }

        // API: Current state of the result view
        (&Method::Get, "/api/session") => {
            respond_json(request, 200, &ApiResponse::success(client_view(app)))
        }

        // API: Ask a question about the data
        (&Method::Post, "/api/ask") => {
            let params: AskParams = match read_json(&mut request) {
                Ok(p) => p,
                Err(_) => return respond_empty_input(request, Action::Ask),
            };
            let result = app.session.ask(&params.question);
            respond_view(request, result.map(|_| ()), Action::Ask, app)
        }

        // API: Send a chat message
        (&Method::Post, "/api/message") => {
            let params: MessageParams = match read_json(&mut request) {
                Ok(p) => p,
                Err(_) => return respond_empty_input(request, Action::Message),
            };
            let result = app.session.process_message(&params.message);
            respond_view(request, result.map(|_| ()), Action::Message, app)
        }

        // Chart document, loaded by the page in a sandboxed iframe
        (&Method::Get, "/chart") => match app.session.view().details {
            Some(details) => {
                let document = chart_document(&details.chart, &app.library_url);
                respond_sandboxed(request, document, CHART_CSP)
            }
            None => request.respond(Response::from_string("No chart yet").with_status_code(404)),
        },

        // Table document, loaded by the page in an iframe without scripts
        (&Method::Get, "/table") => match app.session.view().details {
            Some(details) => respond_sandboxed(request, table_document(&details.table), TABLE_CSP),
            None => request.respond(Response::from_string("No table yet").with_status_code(404)),
        },

        // 404
        _ => {
            let response = Response::from_string("Not found").with_status_code(404);
            request.respond(response)
        }
    }
}

/// Session snapshot safe to hand to the page.
/// Chart and table markup are only served from /chart and /table.
fn client_view(app: &App) -> SessionView {
    let mut view = app.session.view();
    if let Some(ref mut details) = view.details {
        details.chart = crate::model::ChartSource::Markup(String::new());
        details.table = String::new();
    }
    view
}

fn respond_sandboxed(request: Request, document: String, csp: &str) -> std::io::Result<()> {
    let response = Response::from_string(document)
        .with_header(header("Content-Type", HTML_TYPE))
        .with_header(header("Content-Security-Policy", csp));
    request.respond(response)
}

fn respond_empty_input(request: Request, action: Action) -> std::io::Result<()> {
    respond_json(request, 400, &ApiResponse::failure(action.empty_input().to_string()))
}

fn respond_view(
    request: Request,
    result: Result<(), ClientError>,
    action: Action,
    app: &App,
) -> std::io::Result<()> {
    match result {
        Ok(()) => respond_json(request, 200, &ApiResponse::success(client_view(app))),
        Err(e) => {
            let status = status_for(&e);
            respond_json(request, status, &ApiResponse::failure(e.alert_message(action)))
        }
    }
}

fn status_for(error: &ClientError) -> u16 {
    match error {
        ClientError::Input(_) => 400,
        ClientError::Backend { .. } | ClientError::Http(_) | ClientError::Json(_) => 502,
        ClientError::NotReady { .. } => 504,
        _ => 500,
    }
}

fn respond_json<T: Serialize>(request: Request, status: u16, body: &T) -> std::io::Result<()> {
    let json = serde_json::to_string(body)?;
    let response = Response::from_string(json)
        .with_status_code(status)
        .with_header(header("Content-Type", "application/json"));
    request.respond(response)
}

fn read_json<T: for<'de> Deserialize<'de>>(request: &mut Request) -> std::io::Result<T> {
    let mut body = String::new();
    request.as_reader().read_to_string(&mut body)?;
    serde_json::from_str(&body).map_err(std::io::Error::from)
}

fn parse_query<T: for<'de> Deserialize<'de>>(url: &str) -> Option<T> {
    let query = url.split('?').nth(1)?;
    serde_urlencoded::from_str::<T>(query).ok()
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("static header is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::FakeBackend;
    use crate::api::DetailsPoll;
    use crate::config::DEFAULT_CHART_LIBRARY_URL;
    use crate::model::{ChartSource, Details, Summary};
    use crate::poll::PollPolicy;
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn(backend: FakeBackend) -> (String, App) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let policy = PollPolicy {
            initial_delay: Duration::from_millis(1),
            max_attempts: 3,
            max_backoff: Duration::from_millis(2),
        };
        let app = App {
            session: SharedSession::new(Arc::new(backend), policy),
            library_url: DEFAULT_CHART_LIBRARY_URL.to_string(),
        };
        let served = app.clone();
        std::thread::spawn(move || run(&server, &served));
        (format!("http://127.0.0.1:{}", port), app)
    }

    fn chart_details() -> Details {
        Details {
            chart: ChartSource::Markup(
                r#"<div id="c"></div><script>Plotly.newPlot("c", [], {});</script>"#.into(),
            ),
            table: "<table><tr><td>1</td></tr></table><img src=x onerror=alert(2)>".into(),
        }
    }

    // ==========================================================================
    // ROUTING TESTS
    // ==========================================================================

    #[test]
    fn test_index_serves_ui() {
        let (base, _) = spawn(FakeBackend::new());
        let response = reqwest::blocking::get(format!("{}/", base)).unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert!(response.text().unwrap().contains("ChartRAG"));
    }

    #[test]
    fn test_unknown_path_is_404() {
        let (base, _) = spawn(FakeBackend::new());
        let response = reqwest::blocking::get(format!("{}/nope", base)).unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }

    #[test]
    fn test_chart_and_table_404_before_details() {
        let (base, _) = spawn(FakeBackend::new());
        for path in ["chart", "table"] {
            let response = reqwest::blocking::get(format!("{}/{}", base, path)).unwrap();
            assert_eq!(response.status().as_u16(), 404, "/{}", path);
        }
    }

    // ==========================================================================
    // UPLOAD FLOW TESTS
    // ==========================================================================

    #[test]
    fn test_upload_then_chart_is_sandboxed() {
        let backend = FakeBackend::new()
            .with_uploads(vec![Ok(Summary::from_response(Some("X".into())))])
            .with_details(vec![Ok(DetailsPoll::Ready(chart_details()))]);
        let (base, app) = spawn(backend);
        let client = reqwest::blocking::Client::new();

        let body: serde_json::Value = client
            .post(format!("{}/api/upload?name=sales.csv", base))
            .body("a,b\n1,2\n")
            .send()
            .unwrap()
            .json()
            .unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["summary"], "X");
        assert_eq!(body["data"]["file_name"], "sales.csv");

        app.session.wait_for_details();

        let view: serde_json::Value =
            client.get(format!("{}/api/session", base)).send().unwrap().json().unwrap();
        assert_eq!(view["data"]["phase"], "ready");
        // Chart and table markup stay out of the JSON the page reads
        assert!(!view.to_string().contains("Plotly.newPlot"));
        assert!(!view.to_string().contains("onerror"));

        let chart = client.get(format!("{}/chart", base)).send().unwrap();
        assert_eq!(
            chart.headers()["content-security-policy"].to_str().unwrap(),
            "sandbox allow-scripts"
        );
        assert!(chart.text().unwrap().contains("Plotly.newPlot"));

        let table = client.get(format!("{}/table", base)).send().unwrap();
        assert_eq!(table.headers()["content-security-policy"].to_str().unwrap(), "sandbox");
        assert!(table.text().unwrap().contains("<td>1</td>"));
    }

    #[test]
    fn test_upload_error_returns_alert_text() {
        let backend = FakeBackend::new().with_uploads(vec![Err(ClientError::Backend {
            status: 400,
            message: Some("No file provided".into()),
        })]);
        let (base, _) = spawn(backend);

        let response = reqwest::blocking::Client::new()
            .post(format!("{}/api/upload?name=a.csv", base))
            .body("x")
            .send()
            .unwrap();
        assert_eq!(response.status().as_u16(), 502);

        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "No file provided");
    }

    #[test]
    fn test_empty_upload_is_bad_request() {
        let (base, _) = spawn(FakeBackend::new());
        let response = reqwest::blocking::Client::new()
            .post(format!("{}/api/upload", base))
            .send()
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "Please select a file first.");
    }

    // ==========================================================================
    // QUESTION AND MESSAGE TESTS
    // ==========================================================================

    #[test]
    fn test_ask_round_trip() {
        let (base, _) = spawn(FakeBackend::new());
        let body: serde_json::Value = reqwest::blocking::Client::new()
            .post(format!("{}/api/ask", base))
            .json(&serde_json::json!({"question": "why?"}))
            .send()
            .unwrap()
            .json()
            .unwrap();

        assert_eq!(body["data"]["answer"], "answer to why?");
    }

    #[test]
    fn test_message_round_trip() {
        let (base, _) = spawn(FakeBackend::new());
        let body: serde_json::Value = reqwest::blocking::Client::new()
            .post(format!("{}/api/message", base))
            .json(&serde_json::json!({"message": "hello"}))
            .send()
            .unwrap()
            .json()
            .unwrap();

        assert_eq!(body["data"]["reply"], "reply to hello");
    }

    #[test]
    fn test_malformed_question_is_bad_request() {
        let (base, _) = spawn(FakeBackend::new());
        let response = reqwest::blocking::Client::new()
            .post(format!("{}/api/ask", base))
            .body("not json")
            .send()
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "Please enter a question.");
    }

    #[test]
    fn test_parse_query() {
        let params: UploadParams = parse_query("/api/upload?name=my%20data.csv").unwrap();
        assert_eq!(params.name.as_deref(), Some("my data.csv"));
        assert!(parse_query::<UploadParams>("/api/upload").is_none());
    }
}
