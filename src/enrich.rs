//! Web page summaries attached to outgoing messages.
//!
//! A user may attach a URL to a message; the page is fetched and reduced to
//! its title plus a few sections (or the head and tail of the body text).
//! Enrichment never fails the send: any fetch or parse problem yields an
//! empty summary and the message goes out without it.

use reqwest::Client;
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

/// Timeout for page fetches in seconds
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Body text longer than this is cut down to its head and tail
const MAX_BODY_CHARS: usize = 2000;
const BODY_EDGE_CHARS: usize = 1000;

/// Sections kept from each end of the page
const EDGE_SECTIONS: usize = 2;

const ELISION: &str = "...(omitted)...";

/// Add `http://` to URLs typed without a scheme.
pub fn normalize_url(raw: &str) -> String {
    let url = raw.trim();
    if url.is_empty() {
        return String::new();
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Text of the second message sent along with a URL attachment.
pub fn url_message_text(url: &str, summary: &str) -> String {
    format!("URL ({}) 내용:\n{}", url, summary)
}

/// Fetches a plain-text summary of a web page.
pub trait ContentFetcher {
    /// Summary of the page at `url`, or an empty string on any failure.
    fn fetch_summary(&self, url: &str) -> impl Future<Output = String> + Send;
}

/// Fetches pages over HTTP and summarizes their HTML.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: Client,
}

impl HttpContentFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl ContentFetcher for HttpContentFetcher {
    async fn fetch_summary(&self, url: &str) -> String {
        match self.fetch_html(url).await {
            Ok(html) => {
                debug!("Fetched {} bytes from {}", html.len(), url);
                summarize_html(&html)
            }
            Err(e) => {
                warn!("Failed to fetch content from {}: {}", url, e);
                String::new()
            }
        }
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("Invalid built-in regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?is)<title[^>]*>(.*?)</title>")
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?is)<section[^>]*>(.*?)</section>")
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?is)<h[1-6][^>]*>(.*?)</h[1-6]>")
}

fn body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?is)<body[^>]*>(.*)</body>")
}

fn non_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<head[^>]*>.*?</head>|<!--.*?-->",
    )
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?s)<[^>]*>")
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\s+")
}

/// Visible text of an HTML fragment with whitespace collapsed.
fn text_content(fragment: &str) -> String {
    let text = tag_re().replace_all(fragment, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    whitespace_re().replace_all(&text, " ").trim().to_string()
}

struct Section {
    heading: String,
    content: String,
}

fn push_sections(out: &mut String, label: &str, sections: &[Section]) {
    for (i, section) in sections.iter().enumerate() {
        if !section.heading.is_empty() {
            out.push_str(&format!("{} - Section {} heading: {}\n", label, i + 1, section.heading));
        }
        if !section.content.is_empty() {
            out.push_str(&format!("{} - Section {} content: {}\n\n", label, i + 1, section.content));
        }
    }
}

/// Summarize an HTML page.
///
/// Pages with `<section>` elements keep the first two sections, and the last
/// two when there are more than two. Other pages keep their body text, or
/// its first and last 1000 characters when it is longer than 2000.
pub fn summarize_html(html: &str) -> String {
    let title = title_re()
        .captures(html)
        .map(|c| text_content(&c[1]))
        .unwrap_or_default();
    let visible = non_text_re().replace_all(html, " ");

    let sections: Vec<Section> = section_re()
        .captures_iter(&visible)
        .map(|c| Section {
            heading: heading_re()
                .captures(&c[1])
                .map(|h| text_content(&h[1]))
                .unwrap_or_default(),
            content: text_content(&c[1]),
        })
        .collect();

    let mut summary = format!("Title: {}\n\n", title);

    if !sections.is_empty() {
        let head = &sections[..sections.len().min(EDGE_SECTIONS)];
        push_sections(&mut summary, "First part", head);

        if sections.len() > EDGE_SECTIONS {
            summary.push_str(ELISION);
            summary.push_str("\n\n");
            let tail = &sections[sections.len().saturating_sub(EDGE_SECTIONS)..];
            push_sections(&mut summary, "Last part", tail);
        }
        return summary;
    }

    let body = body_re()
        .captures(&visible)
        .map(|c| text_content(&c[1]))
        .unwrap_or_else(|| text_content(&visible));
    let chars: Vec<char> = body.chars().collect();

    if chars.len() > MAX_BODY_CHARS {
        let first: String = chars[..BODY_EDGE_CHARS].iter().collect();
        let last: String = chars[chars.len() - BODY_EDGE_CHARS..].iter().collect();
        summary.push_str(&format!(
            "Content (beginning):\n{}\n\n{}\n\nContent (end):\n{}",
            first, ELISION, last
        ));
    } else {
        summary.push_str(&format!("Content: {}", body));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("  https://a.b/c "), "https://a.b/c");
        assert_eq!(normalize_url("HTTP://A.B"), "HTTP://A.B");
        assert_eq!(normalize_url("   "), "");
    }

    #[test]
    fn test_url_message_text() {
        assert_eq!(
            url_message_text("http://example.com", "Title: Example\n\nContent: test"),
            "URL (http://example.com) 내용:\nTitle: Example\n\nContent: test"
        );
    }

    #[test]
    fn test_summarize_plain_page() {
        let html = "<html><head><title>Example</title><style>p{}</style></head>\
                    <body><p>test</p><script>var x = 1;</script></body></html>";
        assert_eq!(summarize_html(html), "Title: Example\n\nContent: test");
    }

    #[test]
    fn test_summarize_long_body_keeps_edges() {
        let body = format!("{}{}", "a".repeat(1500), "b".repeat(1500));
        let html = format!("<html><body>{}</body></html>", body);
        let summary = summarize_html(&html);
        assert!(summary.starts_with("Title: \n\nContent (beginning):\n"));
        assert!(summary.contains(&format!("\n{}\n\n{}", "a".repeat(1000), ELISION)));
        assert!(summary.ends_with(&format!("Content (end):\n{}", "b".repeat(1000))));
    }

    #[test]
    fn test_summarize_sections() {
        let html = "<title>Doc</title><body>\
            <section><h2>One</h2><p>first</p></section>\
            <section><h2>Two</h2><p>second</p></section>\
            <section><h2>Three</h2><p>third</p></section>\
            <section><p>fourth</p></section>\
            </body>";
        let summary = summarize_html(html);
        assert!(summary.starts_with("Title: Doc\n\n"));
        assert!(summary.contains("First part - Section 1 heading: One\n"));
        assert!(summary.contains("First part - Section 2 content: Two second\n\n"));
        assert!(summary.contains(ELISION));
        assert!(summary.contains("Last part - Section 1 heading: Three\n"));
        assert!(summary.contains("Last part - Section 2 content: fourth\n\n"));
        assert!(!summary.contains("Last part - Section 2 heading"));
    }

    #[test]
    fn test_two_sections_have_no_elision() {
        let html = "<section><h1>A</h1></section><section>b</section>";
        let summary = summarize_html(html);
        assert!(!summary.contains(ELISION));
        assert!(summary.contains("First part - Section 2 content: b"));
    }

    #[test]
    fn test_entities_decoded() {
        let html = "<title>A &amp; B</title><body>x &lt; y</body>";
        assert_eq!(summarize_html(html), "Title: A & B\n\nContent: x < y");
    }
}
