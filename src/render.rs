//! HTML pages. Every piece of user text goes through [`escape`].

use std::fmt::Write;

use crate::highlight::Annotation;
use crate::service::Analysis;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; color: #222; }
nav a { margin-right: 1rem; }
textarea { width: 100%; min-height: 8rem; font: inherit; }
.verdict { font-size: 1.25rem; font-weight: 600; margin: 1rem 0; }
.toxic { background: #ffd6d6; color: #a40000; border-radius: 3px; padding: 0 2px; }
.suggestions li { margin: .25rem 0; }
"#;

/// Escape text for an HTML body or double/single-quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><a href=\"/\">Home</a><a href=\"/about\">About</a></nav>\n{body}\n</body>\n</html>\n",
        title = escape(title),
    )
}

/// Annotated text with flagged tokens wrapped in `<span class='toxic'>`.
pub fn annotated_html(annotation: &Annotation) -> String {
    annotation
        .segments
        .iter()
        .map(|segment| {
            if segment.flagged {
                format!("<span class='toxic'>{}</span>", escape(&segment.text))
            } else {
                escape(&segment.text)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The index page. `analysis` is `None` for a fresh GET.
pub fn index_page(text: &str, analysis: Option<&Analysis>) -> String {
    index_page_with_notice(text, analysis.map(Analysis::message).as_deref(), analysis)
}

/// The index page with an arbitrary notice line in place of a verdict.
pub fn index_page_with_notice(text: &str, notice: Option<&str>, analysis: Option<&Analysis>) -> String {
    let mut body = String::new();
    body.push_str("<h1>Toxicity Checker</h1>\n");
    body.push_str("<form method=\"post\" action=\"/\">\n");
    let _ = writeln!(
        body,
        "<textarea name=\"text\" placeholder=\"Type something...\">{}</textarea>",
        escape(text)
    );
    body.push_str("<p><button type=\"submit\">Check</button></p>\n</form>\n");

    if let Some(notice) = notice {
        let _ = writeln!(body, "<p class=\"verdict\">{}</p>", escape(notice));
    }

    if let Some(annotation) = analysis.and_then(Analysis::annotation) {
        let _ = writeln!(body, "<h2>Your text</h2>\n<p>{}</p>", escape(text));
        let _ = writeln!(
            body,
            "<h2>Highlighted</h2>\n<p class=\"highlighted\">{}</p>",
            annotated_html(annotation)
        );
        if !annotation.suggestions.is_empty() {
            body.push_str("<h2>Suggestions</h2>\n<ul class=\"suggestions\">\n");
            for s in &annotation.suggestions {
                let _ = writeln!(
                    body,
                    "<li><span class='toxic'>{}</span> &rarr; {}</li>",
                    escape(&s.original),
                    escape(&s.replacement)
                );
            }
            body.push_str("</ul>\n");
        }
    }

    layout("Toxicity Checker", &body)
}

pub fn about_page() -> String {
    layout(
        "About",
        "<h1>About</h1>\n\
         <p>This tool scores a piece of text with a neural toxicity classifier \
         and reports whether it reads as toxic, with the model's confidence.</p>\n\
         <p>Words from a fixed list of common insults and profanity are \
         highlighted, each with a gentler phrase you could use instead. \
         Suggestions are a simple word list, not a rewrite of your text.</p>\n\
         <p>Nothing you submit is stored.</p>",
    )
}
