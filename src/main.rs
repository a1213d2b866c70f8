use chartrag::poll::poll_details;
use chartrag::{
    report, Action, Backend, CancelToken, Config, HttpBackend, Phase, SessionView, SharedSession,
    UploadFile,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chartrag")]
#[command(author, version, about = "Upload a CSV file and get a summary, chart and table back")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// CSV file to upload (optional in GUI mode)
    path: Option<PathBuf>,

    /// Launch GUI file picker (auto-enabled when no path is given)
    #[arg(long)]
    gui: bool,

    /// Backend base URL
    #[arg(long, global = true, env = "CHARTRAG_BACKEND_URL")]
    backend: Option<String>,

    /// Output report file (.html, .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for auto-generated reports
    #[arg(long, default_value = "chartrag-reports")]
    report_dir: PathBuf,

    /// Don't write a report
    #[arg(long)]
    no_report: bool,

    /// Don't prompt to open report
    #[arg(long)]
    no_open: bool,

    /// Only upload and print the summary
    #[arg(long)]
    no_details: bool,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print results and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start interactive web UI
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,

        /// Don't open the browser
        #[arg(long)]
        no_open: bool,
    },

    /// Ask a question about the uploaded data
    Ask {
        /// The question
        question: String,
    },

    /// Send a chat message to the backend
    Message {
        /// The message text
        text: String,
    },

    /// Fetch chart and table for the data the backend currently holds
    Details {
        /// Output report file (.html, .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = match load_config(args.backend.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let backend = match HttpBackend::new(config.clone()) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    // Handle subcommands first
    if let Some(cmd) = args.command {
        match cmd {
            Command::Serve { port, no_open } => {
                let app = chartrag::serve::App {
                    session: SharedSession::new(Arc::new(backend), config.details.clone()),
                    library_url: config.chart_library_url.clone(),
                };
                if let Err(e) = chartrag::serve::start(port, app, !no_open) {
                    eprintln!("Server error: {}", e);
                    std::process::exit(1);
                }
            }
            Command::Ask { question } => {
                print_or_exit(backend.ask(&question), Action::Ask);
            }
            Command::Message { text } => {
                print_or_exit(backend.process_message(&text), Action::Message);
            }
            Command::Details { output } => {
                handle_details(
                    &backend,
                    &config,
                    output,
                    &args.report_dir,
                    args.no_open,
                    args.quiet,
                );
            }
        }
        return;
    }

    // With GUI feature: launch GUI if --gui flag OR no path provided
    #[cfg(feature = "gui")]
    let use_gui = args.gui || args.path.is_none();

    #[cfg(not(feature = "gui"))]
    let use_gui = false;

    #[cfg(feature = "gui")]
    let path = if use_gui {
        match pick_file_gui() {
            Some(p) => p,
            None => {
                eprintln!("{}", Action::Upload.empty_input());
                std::process::exit(0);
            }
        }
    } else {
        match args.path.clone() {
            Some(p) => p,
            None => std::process::exit(1),
        }
    };

    #[cfg(not(feature = "gui"))]
    let path = if let Some(p) = args.path.clone() {
        p
    } else {
        eprintln!("Usage: chartrag <FILE.csv>");
        eprintln!("Run 'chartrag --help' for more options.");
        eprintln!("Note: GUI mode not available in this build.");
        std::process::exit(1);
    };

    let file = match UploadFile::from_path(&path) {
        Ok(f) => f,
        Err(e) => {
            alert(&e.alert_message(Action::Upload));
            std::process::exit(1);
        }
    };

    if !args.quiet {
        eprintln!("\x1b[1mChartRAG\x1b[0m");
        eprintln!("{}", "─".repeat(70));
        eprintln!("Uploading {} ({} bytes)\n", file.file_name, file.len());
    }

    let session = SharedSession::new(Arc::new(backend), config.details.clone());

    let spinner = start_spinner(args.quiet, "Uploading...");
    let result = session.upload(file);
    if let Some(ref pb) = spinner {
        pb.finish_and_clear();
    }

    let summary = match result {
        Ok(s) => s,
        Err(e) => {
            alert(&e.alert_message(Action::Upload));
            std::process::exit(1);
        }
    };

    if !args.quiet {
        eprintln!("\x1b[1mSummary:\x1b[0m");
    }
    println!("{}", summary);

    if args.no_details {
        session.close();
    } else {
        let spinner = start_spinner(args.quiet, "Preparing chart and table...");
        session.wait_for_details();
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
    }

    let view = session.view();
    if let Some(ref a) = view.alert {
        alert(&a.message);
    } else if view.phase == Phase::Ready && !args.quiet {
        eprintln!("\n\x1b[32m✓ Chart and table ready\x1b[0m");
    }

    if !args.no_report {
        let report_path = args
            .output
            .clone()
            .unwrap_or_else(|| auto_report_path(&args.report_dir));
        write_report(&report_path, &view, &config, use_gui, args.no_open, args.quiet);
    }

    if view.alert.is_some() {
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(backend: Option<&str>) -> Result<Config, chartrag::ClientError> {
    let config = Config::from_env()?;
    match backend {
        Some(url) => config.with_backend_url(url),
        None => Ok(config),
    }
}

fn start_spinner(quiet: bool, message: &'static str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed}")
            .unwrap(),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn alert(message: &str) {
    eprintln!("\x1b[31m✗ {}\x1b[0m", message);
}

fn print_or_exit(result: Result<String, chartrag::ClientError>, action: Action) {
    match result {
        Ok(text) => println!("{}", text),
        Err(e) => {
            alert(&e.alert_message(action));
            std::process::exit(1);
        }
    }
}

fn auto_report_path(report_dir: &Path) -> PathBuf {
    std::fs::create_dir_all(report_dir).ok();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    report_dir.join(format!("chartrag_report_{}.html", timestamp))
}

fn handle_details(
    backend: &HttpBackend,
    config: &Config,
    output: Option<PathBuf>,
    report_dir: &Path,
    no_open: bool,
    quiet: bool,
) {
    // The data is already on the backend, so there is nothing to wait for up front
    let mut policy = config.details.clone();
    policy.initial_delay = Duration::ZERO;

    let spinner = start_spinner(quiet, "Fetching chart and table...");
    let result = poll_details(backend, &policy, &CancelToken::new());
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let details = match result {
        Ok(d) => d,
        Err(e) => {
            alert(&e.alert_message(Action::Details));
            std::process::exit(1);
        }
    };

    let view = SessionView {
        generation: 0,
        phase: Phase::Ready,
        file_name: None,
        summary: None,
        details: Some(details),
        alert: None,
        answer: None,
        reply: None,
        updated: Local::now().to_rfc3339(),
    };

    let path = output.unwrap_or_else(|| auto_report_path(report_dir));
    write_report(&path, &view, config, false, no_open, quiet);
}

fn write_report(
    path: &Path,
    view: &SessionView,
    config: &Config,
    use_gui: bool,
    no_open: bool,
    quiet: bool,
) {
    if let Err(e) = report::generate(path, view, config) {
        eprintln!("Failed to write report: {}", e);
        std::process::exit(1);
    }
    if !quiet {
        eprintln!("\n\x1b[32mReport saved: {}\x1b[0m", path.display());
    }

    if no_open {
        return;
    }

    if use_gui {
        // In GUI mode, auto-open the report (no prompt)
        let _ = open::that(path);
    } else if !quiet {
        // In terminal mode, ask first
        eprint!("\nOpen report in browser? [Y/n] ");
        io::stderr().flush().ok();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_ok() {
            let input = input.trim().to_lowercase();
            if input.is_empty() || input == "y" || input == "yes" {
                if let Err(e) = open::that(path) {
                    eprintln!("Failed to open report: {}", e);
                }
            }
        }
    }
}

#[cfg(feature = "gui")]
fn pick_file_gui() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Select CSV file to upload")
        .add_filter("CSV files", &["csv"])
        .pick_file()
}
