//! HTML report: summary, sandboxed chart and table

use crate::markup::{chart_document, escape_html, sandboxed_iframe, static_iframe, table_document};
use crate::session::{Phase, SessionView};
use std::io::{self, Write};

pub fn write<W: Write>(writer: &mut W, view: &SessionView, library_url: &str) -> io::Result<()> {
    let file_name = view.file_name.as_deref().unwrap_or("No file");

    let summary = match view.summary {
        Some(ref s) => format!(
            r#"<section class="card"><h3>Summary:</h3><p class="summary">{}</p></section>"#,
            escape_html(s)
        ),
        None => String::new(),
    };

    let (chart, table) = match view.details {
        Some(ref details) => (
            format!(
                r#"<section class="card"><h3>Chart</h3>{}</section>"#,
                sandboxed_iframe(&chart_document(&details.chart, library_url), "Chart")
            ),
            format!(
                r#"<section class="card"><h3>Table</h3>{}</section>"#,
                static_iframe(&table_document(&details.table), "Table")
            ),
        ),
        None => (String::new(), String::new()),
    };

    let alert = match view.alert {
        Some(ref a) => format!(r#"<div class="alert">{}</div>"#, escape_html(&a.message)),
        None => String::new(),
    };

    let mut conversation = String::new();
    if let Some(ref answer) = view.answer {
        conversation.push_str(&format!(
            r#"<section class="card"><h3>Answer</h3><p class="summary">{}</p></section>"#,
            escape_html(answer)
        ));
    }
    if let Some(ref reply) = view.reply {
        conversation.push_str(&format!(
            r#"<section class="card"><h3>Response</h3><p class="summary">{}</p></section>"#,
            escape_html(reply)
        ));
    }

    write!(writer, r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>ChartRAG - {title}</title>
    <style>
        :root {{
            --bg: #f0fdf4;
            --card: #ffffff;
            --border: #e5e7eb;
            --text: #111827;
            --dim: #6b7280;
            --accent: #3b82f6;
            --error: #dc2626;
        }}
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Noto Sans', Helvetica, Arial, sans-serif;
            background: linear-gradient(to bottom, #dcfce7, var(--card));
            color: var(--text);
            line-height: 1.5;
            min-height: 100vh;
        }}
        .container {{ max-width: 1100px; margin: 0 auto; padding: 2rem; }}
        h1 {{ font-size: 3rem; font-weight: 700; text-align: center; }}
        .subtitle {{ color: var(--dim); text-align: center; margin-bottom: 2rem; }}
        .card {{
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 12px;
            padding: 1.5rem;
            margin-bottom: 1.5rem;
            box-shadow: 0 1px 3px rgba(0, 0, 0, 0.08);
        }}
        h3 {{ font-size: 1.125rem; font-weight: 600; margin-bottom: 0.5rem; }}
        .summary {{ white-space: pre-wrap; }}
        .alert {{
            border: 1px solid var(--error);
            color: var(--error);
            border-radius: 8px;
            padding: 1rem;
            margin-bottom: 1.5rem;
        }}
        iframe {{ width: 100%; height: 520px; border: 0; }}
        iframe[title="Table"] {{ height: 400px; }}
        .footer {{ color: var(--dim); font-size: 0.8rem; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>ChartRAG</h1>
        <p class="subtitle">{title} &middot; {status}</p>
        {alert}
        {summary}
        {chart}
        {table}
        {conversation}
        <p class="footer">Generated {updated}</p>
    </div>
</body>
</html>
"#,
        title = escape_html(file_name),
        status = phase_label(view.phase),
        alert = alert,
        summary = summary,
        chart = chart,
        table = table,
        conversation = conversation,
        updated = escape_html(&view.updated),
    )?;

    Ok(())
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "no file uploaded",
        Phase::Uploading => "uploading",
        Phase::AwaitingDetails => "chart and table pending",
        Phase::Ready => "complete",
        Phase::Failed => "failed",
    }
}
