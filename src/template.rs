//! The HTML page the rendered markdown is placed into.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ViewerError;

/// `$$`, `$name`, `${name}`, or a lone `$`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$(?:(\$)|([_a-z][_a-z0-9]*)|\{([_a-z][_a-z0-9]*)\}|)").unwrap()
});

/// Name of the single substitution point in [`PAGE`].
pub const BODY: &str = "body";

/// A text template with `$name` placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Replaces known placeholders and leaves everything else literal.
    ///
    /// Only the template text is scanned. Values are inserted verbatim, so a `$`
    /// inside a value never turns into another substitution.
    pub fn safe_substitute(&self, vars: &HashMap<&str, &str>) -> String {
        PLACEHOLDER
            .replace_all(&self.source, |caps: &Captures<'_>| {
                if caps.get(1).is_some() {
                    return "$".to_string();
                }
                let name = caps.get(2).or_else(|| caps.get(3));
                match name.and_then(|n| vars.get(n.as_str())) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// The page skeleton: solarized dark stylesheet and one `$body` insertion point.
pub const PAGE: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <meta charset="utf-8">
        <title>Markdown Live</title>
        <style>
            body {
                background-color: #002b36;
                color: #839496;
                font-family: "Droid Sans", "DejaVu Sans", sans-serif;
                line-height: 1.5;
                margin: 0 auto;
                max-width: 52em;
                padding: 1em 2em;
            }

            h1, h2, h3, h4, h5, h6 {
                color: #b58900;
                border-bottom: 1px solid #073642;
                font-family: Inconsolata, "Source Code Pro", monospace;
            }

            a {
                color: #eee8d5;
                text-decoration: underline;
            }

            code {
                color: #2aa198;
                font-family: Inconsolata, "Source Code Pro", monospace;
            }

            pre {
                background-color: #073642;
                border: 1px solid #586e75;
                border-radius: 3px;
                overflow-x: auto;
                padding: 4px 8px;
            }

            blockquote {
                background-color: #073642;
                font-family: "Droid Serif", "Liberation Serif", serif;
                margin-left: 0;
                padding: 1px 20px;
            }

            hr {
                border: none;
                border-bottom: 1px solid #2aa198;
            }

            table {
                border-collapse: collapse;
                width: 100%;
            }

            tr:nth-child(2n+1) {
                background-color: #002b36;
            }

            tr:nth-child(2n) {
                background-color: #073642;
            }

            th {
                color: #b58900;
                font-weight: bold;
                text-align: left;
            }

            .notice {
                border-left: 4px solid #cb4b16;
                background-color: #073642;
                padding: 4px 16px;
            }

            .notice h2 {
                color: #cb4b16;
                border-bottom: none;
            }
        </style>
    </head>
    <body>
        $body
    </body>
</html>"#;

static PAGE_TEMPLATE: LazyLock<Template> = LazyLock::new(|| Template::new(PAGE));

/// Places an HTML fragment into the page skeleton.
pub fn page(body: &str) -> String {
    let vars = HashMap::from([(BODY, body)]);
    PAGE_TEMPLATE.safe_substitute(&vars)
}

fn skeleton_parts() -> (&'static str, &'static str) {
    let marker = "$body";
    match PAGE.find(marker) {
        Some(at) => (&PAGE[..at], &PAGE[at + marker.len()..]),
        None => (PAGE, ""),
    }
}

/// Recovers the fragment [`page`] inserted, or `None` if `html` is not a page.
pub fn extract_body(html: &str) -> Option<&str> {
    let (head, tail) = skeleton_parts();
    html.strip_prefix(head)?.strip_suffix(tail)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn notice(title: &str, detail: &str) -> String {
    format!(
        "<div class=\"notice\">\n<h2>{}</h2>\n<p>{}</p>\n</div>\n",
        escape_html(title),
        escape_html(detail)
    )
}

/// Page shown in place of the document when it could not be loaded.
pub fn error_page(err: &ViewerError) -> String {
    page(&notice(err.title(), &err.to_string()))
}

/// Page showing the unrendered source under a notice.
pub fn raw_text_page(err: &ViewerError, text: &str) -> String {
    let mut body = notice(err.title(), &err.to_string());
    body.push_str("<pre>");
    body.push_str(&escape_html(text));
    body.push_str("</pre>\n");
    page(&body)
}
