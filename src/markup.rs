//! Handling of backend-supplied chart and table markup
//!
//! The backend renders charts with Plotly and sends back an HTML fragment
//! that usually contains `<script>` tags: one loading Plotly from its CDN and
//! one inline `Plotly.newPlot(...)` call. That script must never run in the
//! page that shows the summary, so a chart fragment is turned into a
//! standalone document and only ever displayed inside a sandboxed iframe:
//!
//! ```text
//! graph_html ──extract_body──▶ Fragment::parse ──▶ sandboxed_document ──▶ <iframe sandbox="allow-scripts">
//!                                  │
//!                                  ├─ chart library tags: dropped, loaded once by the document
//!                                  ├─ external tags: re-created as fresh <script src>
//!                                  └─ inline tags: kept in order, after the library
//! ```
//!
//! Structured charts ([`ChartSource::Spec`]) skip all of this: the figure
//! JSON is embedded as inert data and drawn by a fixed `Plotly.newPlot` call.
//!
//! Table markup needs no scripts at all. It gets its own document, shown in
//! an iframe with an empty `sandbox` attribute, so neither `<script>` tags
//! nor event-handler attributes in it can run.

use crate::model::ChartSource;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BODY_RE: Regex = Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").unwrap();
    static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap();
    static ref SRC_ATTR_RE: Regex =
        Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap();
    static ref TYPE_ATTR_RE: Regex =
        Regex::new(r#"(?i)\btype\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap();
}

/// Any script whose source contains this is treated as the chart library
const CHART_LIBRARY_MARKER: &str = "plot.ly/plotly";

/// Content of the `<body>` element if there is one, the input unchanged otherwise
pub fn extract_body(html: &str) -> &str {
    BODY_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html)
}

/// A script tag found in a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    ChartLibrary { src: String },
    External { src: String, script_type: Option<String> },
    Inline { code: String, script_type: Option<String> },
}

/// Chart markup split into its HTML and its scripts
#[derive(Debug, Clone)]
pub struct Fragment {
    /// The fragment with every script tag removed
    pub markup: String,
    /// Scripts in document order
    pub scripts: Vec<Script>,
    library_url: String,
}

impl Fragment {
    pub fn parse(html: &str, library_url: &str) -> Self {
        let mut scripts = Vec::new();

        for caps in SCRIPT_RE.captures_iter(html) {
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let script_type = attr_value(&TYPE_ATTR_RE, attrs);

            let script = match attr_value(&SRC_ATTR_RE, attrs) {
                Some(src) if is_chart_library(&src, library_url) => Script::ChartLibrary { src },
                Some(src) => Script::External { src, script_type },
                None => {
                    if body.trim().is_empty() {
                        continue;
                    }
                    Script::Inline { code: body.to_string(), script_type }
                }
            };
            scripts.push(script);
        }

        Self {
            markup: strip_scripts(html),
            scripts,
            library_url: library_url.to_string(),
        }
    }

    pub fn inline_scripts(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|s| match s {
            Script::Inline { code, .. } => Some(code.as_str()),
            _ => None,
        })
    }

    pub fn external_scripts(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|s| match s {
            Script::External { src, .. } => Some(src.as_str()),
            _ => None,
        })
    }

    pub fn has_scripts(&self) -> bool {
        !self.scripts.is_empty()
    }

    /// Standalone document for a sandboxed iframe
    ///
    /// The chart library is loaded exactly once, in `<head>`, before any
    /// fragment script runs. Fragment scripts follow the markup in their
    /// original order.
    pub fn sandboxed_document(&self) -> String {
        let mut scripts = String::new();
        for script in &self.scripts {
            match script {
                Script::ChartLibrary { .. } => {}
                Script::External { src, script_type } => {
                    scripts.push_str(&format!(
                        "<script type=\"{}\" src=\"{}\"></script>\n",
                        escape_attr(script_type.as_deref().unwrap_or("text/javascript")),
                        escape_attr(src)
                    ));
                }
                Script::Inline { code, script_type } => {
                    let type_attr = script_type
                        .as_deref()
                        .map(|t| format!(" type=\"{}\"", escape_attr(t)))
                        .unwrap_or_default();
                    scripts.push_str(&format!("<script{}>{}</script>\n", type_attr, code));
                }
            }
        }

        document(&self.library_url, &self.markup, &scripts)
    }
}

/// Standalone document drawing a Plotly figure through a fixed call
pub fn spec_document(spec: &serde_json::Value, library_url: &str) -> String {
    let markup = format!(
        "<div id=\"chart\"></div>\n<script type=\"application/json\" id=\"chart-spec\">{}</script>",
        json_for_script(spec)
    );
    document(library_url, &markup, PLOT_FROM_SPEC)
}

/// Document for either kind of chart
pub fn chart_document(chart: &ChartSource, library_url: &str) -> String {
    match chart {
        ChartSource::Spec(spec) => spec_document(spec, library_url),
        ChartSource::Markup(html) => Fragment::parse(html, library_url).sandboxed_document(),
    }
}

/// Iframe that shows `document` with scripts enabled but no access to the host page
pub fn sandboxed_iframe(document: &str, title: &str) -> String {
    format!(
        "<iframe sandbox=\"allow-scripts\" title=\"{}\" srcdoc=\"{}\"></iframe>",
        escape_attr(title),
        escape_attr(document)
    )
}

/// Standalone document for backend table markup
///
/// Only ever shown with every sandbox restriction on, see [`static_iframe`].
pub fn table_document(table: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<style>
body {{ margin: 0; font-family: sans-serif; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #e5e7eb; padding: 0.4rem 0.6rem; text-align: left; }}
</style>
</head>
<body>
{}
</body>
</html>
"#,
        table
    )
}

/// Iframe that shows `document` with scripts, forms and same-origin access all disabled
pub fn static_iframe(document: &str, title: &str) -> String {
    format!(
        "<iframe sandbox=\"\" title=\"{}\" srcdoc=\"{}\"></iframe>",
        escape_attr(title),
        escape_attr(document)
    )
}

/// Remove every `<script>...</script>` element
fn strip_scripts(html: &str) -> String {
    SCRIPT_RE.replace_all(html, "").into_owned()
}

pub fn is_chart_library(src: &str, library_url: &str) -> bool {
    src == library_url || src.contains(CHART_LIBRARY_MARKER)
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    escape_html(s).replace('"', "&quot;").replace('\'', "&#39;")
}

const PLOT_FROM_SPEC: &str = r#"<script>
(function () {
    var fig = JSON.parse(document.getElementById('chart-spec').textContent);
    Plotly.newPlot('chart', fig.data || [], fig.layout || {}, { responsive: true });
})();
</script>
"#;

fn document(library_url: &str, markup: &str, scripts: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<script src="{}"></script>
<style>body {{ margin: 0; font-family: sans-serif; }}</style>
</head>
<body>
{}
{}</body>
</html>
"#,
        escape_attr(library_url),
        markup,
        scripts
    )
}

fn attr_value(re: &Regex, attrs: &str) -> Option<String> {
    re.captures(attrs).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .or_else(|| c.get(3))
            .map(|m| m.as_str().to_string())
    })
}

/// JSON that cannot close the surrounding `<script>` element
fn json_for_script(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CHART_LIBRARY_URL;

    // ==========================================================================
    // BODY EXTRACTION TESTS
    // ==========================================================================
    //
    // Plotly's to_html() may return a full document. Only the body is kept.
    // ==========================================================================

    #[test]
    fn test_extract_body_from_full_document() {
        let html = "<html><body><div>chart</div></body></html>";
        assert_eq!(extract_body(html), "<div>chart</div>");
    }

    #[test]
    fn test_extract_body_without_body_tag_is_unchanged() {
        let html = "<div>chart</div><script>x()</script>";
        assert_eq!(extract_body(html), html);
    }

    #[test]
    fn test_extract_body_is_idempotent() {
        let once = extract_body("<html><body><p>a</p></body></html>");
        assert_eq!(extract_body(once), once);
    }

    #[test]
    fn test_extract_body_with_attributes_and_newlines() {
        let html = concat!(
            "<HTML>\n<head><title>t</title></head>\n",
            "<BODY class=\"x\">\n<div>a</div>\n</BODY>\n</HTML>"
        );
        assert_eq!(extract_body(html), "\n<div>a</div>\n");
    }

    // ==========================================================================
    // SCRIPT CLASSIFICATION TESTS
    // ==========================================================================

    const PLOTLY_FRAGMENT: &str = r#"<div>
<script type="text/javascript">window.PlotlyConfig = {MathJaxConfig: 'local'};</script>
<script charset="utf-8" src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<div id="abc" class="plotly-graph-div" style="height:100%; width:100%;"></div>
<script type="text/javascript">Plotly.newPlot("abc", [{"x":[1,2]}], {});</script>
</div>"#;

    #[test]
    fn test_parse_classifies_plotly_output() {
        let fragment = Fragment::parse(PLOTLY_FRAGMENT, DEFAULT_CHART_LIBRARY_URL);

        assert_eq!(fragment.scripts.len(), 3);
        assert!(matches!(fragment.scripts[0], Script::Inline { .. }));
        assert_eq!(
            fragment.scripts[1],
            Script::ChartLibrary { src: "https://cdn.plot.ly/plotly-2.35.2.min.js".into() }
        );
        assert_eq!(fragment.inline_scripts().count(), 2);
        assert_eq!(fragment.external_scripts().count(), 0);
        assert!(!fragment.markup.contains("<script"));
        assert!(fragment.markup.contains("plotly-graph-div"));
    }

    #[test]
    fn test_parse_keeps_other_external_scripts() {
        let html = r#"<script src='https://example.com/extra.js'></script><div></div>"#;
        let fragment = Fragment::parse(html, DEFAULT_CHART_LIBRARY_URL);

        assert_eq!(
            fragment.scripts,
            vec![Script::External { src: "https://example.com/extra.js".into(), script_type: None }]
        );
    }

    #[test]
    fn test_configured_library_url_is_recognised() {
        let html = r#"<script src="/static/plotly.js"></script>"#;
        let fragment = Fragment::parse(html, "/static/plotly.js");
        assert!(matches!(fragment.scripts[0], Script::ChartLibrary { .. }));
    }

    #[test]
    fn test_empty_inline_scripts_are_dropped() {
        let fragment = Fragment::parse("<script>  </script><p>x</p>", DEFAULT_CHART_LIBRARY_URL);
        assert!(!fragment.has_scripts());
        assert_eq!(fragment.markup, "<p>x</p>");
    }

    // ==========================================================================
    // SANDBOXED DOCUMENT TESTS
    // ==========================================================================

    #[test]
    fn test_document_loads_library_once() {
        let doc = Fragment::parse(PLOTLY_FRAGMENT, DEFAULT_CHART_LIBRARY_URL).sandboxed_document();

        assert_eq!(doc.matches("plot.ly/plotly").count(), 1);
        assert!(doc.contains(DEFAULT_CHART_LIBRARY_URL));
        assert!(!doc.contains("plotly-2.35.2"));
    }

    #[test]
    fn test_document_runs_inline_after_library() {
        let doc = Fragment::parse(PLOTLY_FRAGMENT, DEFAULT_CHART_LIBRARY_URL).sandboxed_document();

        let library = doc.find(DEFAULT_CHART_LIBRARY_URL).unwrap();
        let new_plot = doc.find("Plotly.newPlot").unwrap();
        let config = doc.find("PlotlyConfig").unwrap();
        assert!(library < config);
        assert!(config < new_plot);
    }

    #[test]
    fn test_document_recreates_external_scripts() {
        let html = r#"<script type="module" src="https://example.com/a.js"></script>"#;
        let doc = Fragment::parse(html, DEFAULT_CHART_LIBRARY_URL).sandboxed_document();
        assert!(doc.contains(r#"<script type="module" src="https://example.com/a.js"></script>"#));
    }

    #[test]
    fn test_spec_document_embeds_inert_json() {
        let spec = serde_json::json!({"data": [{"x": [1], "name": "</script><script>alert(1)"}]});
        let doc = spec_document(&spec, DEFAULT_CHART_LIBRARY_URL);

        assert!(doc.contains(r#"type="application/json""#));
        assert!(!doc.contains("</script><script>alert(1)"));
        assert!(doc.contains("Plotly.newPlot('chart'"));
    }

    #[test]
    fn test_chart_document_dispatch() {
        let markup = ChartSource::Markup("<div>chart</div>".into());
        assert!(chart_document(&markup, DEFAULT_CHART_LIBRARY_URL).contains("<div>chart</div>"));

        let spec = ChartSource::Spec(serde_json::json!({"data": []}));
        assert!(chart_document(&spec, DEFAULT_CHART_LIBRARY_URL).contains("chart-spec"));
    }

    #[test]
    fn test_iframe_is_sandboxed_and_escaped() {
        let iframe = sandboxed_iframe("<p class=\"a\">it's</p>", "Chart");
        assert!(iframe.starts_with("<iframe sandbox=\"allow-scripts\""));
        assert!(!iframe.contains("allow-same-origin"));
        assert!(iframe.contains("srcdoc=\"&lt;p class=&quot;a&quot;&gt;it&#39;s&lt;/p&gt;\""));
    }

    // ==========================================================================
    // ESCAPING TESTS
    // ==========================================================================

    #[test]
    fn test_strip_scripts_from_fragment() {
        let html = "<div id=\"c\"></div><script>steal()</script>";
        assert_eq!(strip_scripts(html), "<div id=\"c\"></div>");
    }

    // ==========================================================================
    // TABLE ISOLATION TESTS
    // ==========================================================================
    //
    // Table markup is never inlined into a host page. Whatever it contains
    // ends up as escaped text in the srcdoc of a script-less frame.
    // ==========================================================================

    const HOSTILE_TABLE: &str = concat!(
        "<table><tr><td>1</td></tr></table>",
        "<scr<script></script>ipt>alert(1)</script>",
        "<img src=x onerror=alert(2)>"
    );

    #[test]
    fn test_table_document_keeps_markup() {
        let doc = table_document("<table><tr><td>1</td></tr></table>");
        assert!(doc.contains("<body>\n<table><tr><td>1</td></tr></table>\n</body>"));
        assert!(!doc.contains("<script"));
    }

    #[test]
    fn test_static_iframe_disables_scripts() {
        let iframe = static_iframe(&table_document(HOSTILE_TABLE), "Table");

        assert!(iframe.starts_with("<iframe sandbox=\"\" title=\"Table\""));
        assert!(!iframe.contains("allow-scripts"));
        assert!(!iframe.contains("<script"));
        assert!(!iframe.contains("<img"));
        assert!(iframe.contains("&lt;img src=x onerror=alert(2)&gt;"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }
}
