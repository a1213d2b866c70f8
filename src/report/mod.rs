//! Report generation for a finished session
//!
//! This module writes the result view to a file:
//!
//! - **HTML**: the summary, plus chart and table each in a sandboxed frame
//! - **JSON**: the [`SessionView`] snapshot for programmatic consumption
//!
//! # Usage
//!
//! ```ignore
//! use chartrag::report;
//!
//! // Automatically picks format based on extension
//! report::generate("report.html", &view, &config)?;  // HTML
//! report::generate("report.json", &view, &config)?;  // JSON
//! ```

pub mod html;
pub mod json;

use crate::config::Config;
use crate::session::SessionView;
use std::io;
use std::path::Path;

/// Generate a report in the appropriate format based on file extension
pub fn generate<P: AsRef<Path>>(path: P, view: &SessionView, config: &Config) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = std::fs::File::create(path)?;

    match ext.as_str() {
        "json" => json::write(&mut file, view),
        _ => html::write(&mut file, view, &config.chart_library_url),
    }
}
