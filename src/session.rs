//! Result view state: what the user uploaded and what came back
//!
//! ```text
//!            begin_upload              finish_upload(Ok)          finish_details(Ok)
//!   Idle ─────────────────▶ Uploading ─────────────────▶ AwaitingDetails ─────────────────▶ Ready
//!     ▲                         │                              │
//!     │                         │ Err                          │ Err
//!     │                         ▼                              ▼
//!     └──── begin_upload ─── Failed ◀──────────────────────────┘
//! ```
//!
//! Choosing a new file clears summary, details, answers and the last alert
//! right away, and cancels a details poll that is still waiting. Each
//! upload gets a new generation; results that arrive for an older
//! generation are dropped.

use crate::api::Backend;
use crate::error::{Action, ClientError};
use crate::model::{Details, Summary, UploadFile};
use crate::poll::{poll_details, CancelToken, PollPolicy};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Uploading,
    AwaitingDetails,
    Ready,
    Failed,
}

/// Proof that a result belongs to a particular upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// A failure the user has to be told about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub action: Action,
    pub message: String,
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub generation: u64,
    pub phase: Phase,
    pub file_name: Option<String>,
    pub summary: Option<String>,
    pub details: Option<Details>,
    pub alert: Option<Alert>,
    pub answer: Option<String>,
    pub reply: Option<String>,
    pub updated: String,
}

#[derive(Debug)]
pub struct Session {
    generation: u64,
    phase: Phase,
    file_name: Option<String>,
    summary: Option<Summary>,
    details: Option<Details>,
    details_requested: bool,
    alert: Option<Alert>,
    answer: Option<String>,
    reply: Option<String>,
    updated: chrono::DateTime<chrono::Local>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            generation: 0,
            phase: Phase::Idle,
            file_name: None,
            summary: None,
            details: None,
            details_requested: false,
            alert: None,
            answer: None,
            reply: None,
            updated: chrono::Local::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    pub fn alert(&self) -> Option<&Alert> {
        self.alert.as_ref()
    }

    /// A new file was chosen: drop everything derived from the previous one
    pub fn begin_upload(&mut self, file_name: &str) -> Ticket {
        self.generation += 1;
        self.phase = Phase::Uploading;
        self.file_name = Some(file_name.to_string());
        self.summary = None;
        self.details = None;
        self.details_requested = false;
        self.alert = None;
        self.answer = None;
        self.reply = None;
        self.touch();
        Ticket(self.generation)
    }

    /// Store the upload result.
    ///
    /// Returns the ticket for the details fetch when one should start now;
    /// this happens at most once per summary.
    pub fn finish_upload(
        &mut self,
        ticket: Ticket,
        result: &Result<Summary, ClientError>,
    ) -> Option<Ticket> {
        if !self.is_current(ticket) {
            debug!(generation = ticket.0, "ignoring stale upload result");
            return None;
        }

        match result {
            Ok(summary) => {
                self.summary = Some(summary.clone());
                self.phase = Phase::AwaitingDetails;
                self.touch();
                self.claim_details_fetch()
            }
            Err(e) => {
                self.fail(Action::Upload, e);
                None
            }
        }
    }

    /// Ticket for a details fetch if none has been made for the current summary
    pub fn claim_details_fetch(&mut self) -> Option<Ticket> {
        if self.summary.is_some() && self.details.is_none() && !self.details_requested {
            self.details_requested = true;
            Some(Ticket(self.generation))
        } else {
            None
        }
    }

    pub fn finish_details(&mut self, ticket: Ticket, result: Result<Details, ClientError>) {
        if !self.is_current(ticket) {
            debug!(generation = ticket.0, "ignoring stale details result");
            return;
        }

        match result {
            Ok(details) => {
                self.details = Some(details);
                self.phase = Phase::Ready;
                self.touch();
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => self.fail(Action::Details, &e),
        }
    }

    pub fn record_answer(&mut self, result: &Result<String, ClientError>) {
        match result {
            Ok(answer) => self.answer = Some(answer.clone()),
            Err(e) => self.alert_for(Action::Ask, e),
        }
        self.touch();
    }

    pub fn record_reply(&mut self, result: &Result<String, ClientError>) {
        match result {
            Ok(reply) => self.reply = Some(reply.clone()),
            Err(e) => self.alert_for(Action::Message, e),
        }
        self.touch();
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            generation: self.generation,
            phase: self.phase,
            file_name: self.file_name.clone(),
            summary: self.summary.as_ref().map(|s| s.as_str().to_string()),
            details: self.details.clone(),
            alert: self.alert.clone(),
            answer: self.answer.clone(),
            reply: self.reply.clone(),
            updated: self.updated.to_rfc3339(),
        }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.generation
    }

    fn fail(&mut self, action: Action, error: &ClientError) {
        warn!(%action, error = %error, "request failed");
        self.phase = Phase::Failed;
        self.alert_for(action, error);
        self.touch();
    }

    fn alert_for(&mut self, action: Action, error: &ClientError) {
        self.alert = Some(Alert { action, message: error.alert_message(action) });
    }

    fn touch(&mut self) {
        self.updated = chrono::Local::now();
    }
}

struct SharedState {
    session: Session,
    poll: Option<(CancelToken, JoinHandle<()>)>,
}

/// A session driven against a backend, shared between threads
///
/// Uploads run on the calling thread. The details poll runs on its own
/// thread and is cancelled when a new file is chosen or on [`close`](Self::close).
#[derive(Clone)]
pub struct SharedSession {
    state: Arc<Mutex<SharedState>>,
    backend: Arc<dyn Backend>,
    policy: PollPolicy,
}

impl SharedSession {
    pub fn new(backend: Arc<dyn Backend>, policy: PollPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState { session: Session::new(), poll: None })),
            backend,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Upload `file`, then start polling for details in the background
    pub fn upload(&self, file: UploadFile) -> Result<Summary, ClientError> {
        let ticket = {
            let mut state = self.lock();
            if let Some((token, _)) = state.poll.take() {
                token.cancel();
            }
            state.session.begin_upload(&file.file_name)
        };

        info!(file = %file.file_name, bytes = file.len(), "uploading");
        let result = if file.is_empty() {
            Err(ClientError::Input(Action::Upload.empty_input().to_string()))
        } else {
            self.backend.upload(&file)
        };

        let mut state = self.lock();
        if let Some(details_ticket) = state.session.finish_upload(ticket, &result) {
            let token = CancelToken::new();
            let handle = self.spawn_details(details_ticket, token.clone());
            state.poll = Some((token, handle));
        }

        result
    }

    fn spawn_details(&self, ticket: Ticket, token: CancelToken) -> JoinHandle<()> {
        let backend = self.backend.clone();
        let state = self.state.clone();
        let policy = self.policy.clone();

        std::thread::spawn(move || {
            let result = poll_details(&*backend, &policy, &token);
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.session.finish_details(ticket, result);
        })
    }

    /// Block until the running details poll, if any, has finished
    pub fn wait_for_details(&self) {
        let handle = self.lock().poll.take().map(|(_, handle)| handle);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("details poll thread panicked");
            }
        }
    }

    pub fn ask(&self, question: &str) -> Result<String, ClientError> {
        let result = self.backend.ask(question);
        self.lock().session.record_answer(&result);
        result
    }

    pub fn process_message(&self, message: &str) -> Result<String, ClientError> {
        let result = self.backend.process_message(message);
        self.lock().session.record_reply(&result);
        result
    }

    pub fn view(&self) -> SessionView {
        self.lock().session.view()
    }

    /// Tear down: cancel a pending details poll
    pub fn close(&self) {
        if let Some((token, _)) = self.lock().poll.as_ref() {
            token.cancel();
        }
    }
}
