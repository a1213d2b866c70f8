//! ChartRAG - summaries, charts and tables for CSV files
//!
//! ChartRAG sends a CSV file to a ChartRAG backend, shows the text summary
//! the backend writes for it, then waits for the chart and data table the
//! backend prepares afterwards.
//!
//! # Overview
//!
//! ```text
//! pick file ──▶ POST /upload ──▶ summary ──▶ wait ──▶ GET /details ──▶ chart + table
//!                                               ▲            │
//!                                               └─ pending ──┘
//! ```
//!
//! The backend does all of the data work. This crate is the client side:
//! the HTTP calls, the state of the result view, and rendering of the
//! backend's chart markup without letting its scripts touch the host page.
//!
//! # Quick Start
//!
//! ```no_run
//! use chartrag::{Config, HttpBackend, SharedSession, UploadFile};
//! use std::sync::Arc;
//!
//! let config = Config::from_env()?;
//! let backend = HttpBackend::new(config.clone())?;
//! let session = SharedSession::new(Arc::new(backend), config.details.clone());
//!
//! let summary = session.upload(UploadFile::from_path("sales.csv")?)?;
//! println!("{}", summary);
//!
//! session.wait_for_details();
//! if let Some(details) = session.view().details {
//!     println!("table: {} bytes", details.table.len());
//! }
//! # Ok::<(), chartrag::ClientError>(())
//! ```
//!
//! # Modules
//!
//! - [`api`]: the backend client and the [`Backend`] trait
//! - [`poll`]: waiting for details with backoff and cancellation
//! - [`session`]: result view state machine
//! - [`markup`]: body extraction and sandboxed chart documents
//! - [`report`]: HTML and JSON output
//! - [`serve`]: interactive browser UI

pub mod api;
pub mod config;
pub mod error;
pub mod markup;
pub mod model;
pub mod poll;
pub mod report;
pub mod serve;
pub mod session;

pub use api::{Backend, DetailsPoll, HttpBackend};
pub use config::Config;
pub use error::{Action, ClientError};
pub use model::{ChartSource, Details, Summary, UploadFile};
pub use poll::{CancelToken, PollPolicy};
pub use session::{Phase, Session, SessionView, SharedSession};

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // PUBLIC API TESTS
    // ==========================================================================
    //
    // These tests verify the public API surface is correct and documented.
    // ==========================================================================

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        let _: Phase = Phase::Idle;
        let _session = Session::new();
        let _token = CancelToken::new();
        let _policy = PollPolicy::default();
    }

    #[test]
    fn test_default_config_points_at_local_backend() {
        let config = Config::default();
        assert_eq!(config.backend_url.as_str(), "http://127.0.0.1:5000/");
    }

    #[test]
    fn test_http_backend_constructible() {
        let backend = HttpBackend::new(Config::default()).unwrap();
        assert_eq!(backend.config().endpoint("upload").unwrap().path(), "/upload");
    }
}
