//! Page metadata for `fetch_url_metadata`: title, description and a favicon.
//!
//! Fetching is best effort. A page that cannot be fetched within the budget
//! is treated as empty HTML, which still yields the hosted favicon fallback.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client as HttpClient, Url};

use super::errors::AgentError;
use super::types::PageMetadata;

/// Favicon service used when the page declares no icon.
const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";

const USER_AGENT: &str = concat!("admin-agent/", env!("CARGO_PKG_VERSION"));

// ─── Fetcher ────────────────────────────────────────────────────────────────

/// Fetches pages with a hard per-request timeout.
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    http: HttpClient,
    timeout: Duration,
}

impl MetadataFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AgentError> {
        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AgentError::ToolExecutionError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, timeout })
    }

    /// Fetch `url` and extract its metadata.
    ///
    /// Only `http` and `https` URLs are accepted. Fetch failures are not
    /// errors; they produce metadata from empty HTML.
    pub async fn fetch(&self, url: &str) -> Result<PageMetadata, AgentError> {
        let parsed = Url::parse(url).map_err(|e| AgentError::InvalidArguments {
            tool: "fetch_url_metadata".into(),
            reason: format!("invalid URL '{url}': {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AgentError::InvalidArguments {
                tool: "fetch_url_metadata".into(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let html = match self.fetch_html(&parsed).await {
            Ok(html) => html,
            Err(reason) => {
                tracing::warn!(url = %parsed, %reason, "metadata fetch failed, using empty page");
                String::new()
            }
        };

        Ok(extract_metadata(&html, &parsed))
    }

    async fn fetch_html(&self, url: &Url) -> Result<String, String> {
        let request = async {
            let response = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("HTTP {}", response.status().as_u16()));
            }
            response.text().await.map_err(|e| e.to_string())
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(format!("timed out after {}ms", self.timeout.as_millis())),
        }
    }
}

// ─── Extraction ─────────────────────────────────────────────────────────────

struct Patterns {
    title: Regex,
    meta: Regex,
    link: Regex,
    attr: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?,
                meta: Regex::new(r"(?is)<meta\b[^>]*>").ok()?,
                link: Regex::new(r"(?is)<link\b[^>]*>").ok()?,
                attr: Regex::new(
                    r#"(?s)([A-Za-z_:\-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
                )
                .ok()?,
            })
        })
        .as_ref()
}

/// Attributes of one tag as lower-cased name / raw value pairs.
fn attributes(attr_re: &Regex, tag: &str) -> Vec<(String, String)> {
    attr_re
        .captures_iter(tag)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (c[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Extract metadata from `html`, resolving relative icon URLs against `page`.
///
/// Favicon preference: Apple touch icon, then an `icon` link tag, then the
/// hosted favicon service for the page's host.
pub fn extract_metadata(html: &str, page: &Url) -> PageMetadata {
    let Some(p) = patterns() else {
        return PageMetadata {
            url: page.to_string(),
            favicon_url: favicon_service_url(page),
            ..Default::default()
        };
    };

    let title = p
        .title
        .captures(html)
        .map(|c| clean_text(&c[1]))
        .filter(|t| !t.is_empty());

    let metas: Vec<Vec<(String, String)>> = p
        .meta
        .find_iter(html)
        .map(|m| attributes(&p.attr, m.as_str()))
        .collect();
    let meta_content = |key: &str, value: &str| {
        metas
            .iter()
            .find(|attrs| attr(attrs, key).is_some_and(|v| v.eq_ignore_ascii_case(value)))
            .and_then(|attrs| attr(attrs, "content"))
            .map(clean_text)
            .filter(|t| !t.is_empty())
    };
    let description = meta_content("property", "og:description")
        .or_else(|| meta_content("name", "description"));

    let links: Vec<Vec<(String, String)>> = p
        .link
        .find_iter(html)
        .map(|m| attributes(&p.attr, m.as_str()))
        .collect();
    let icon_href = |wanted: fn(&str) -> bool| {
        links
            .iter()
            .find(|attrs| {
                attr(attrs, "rel")
                    .map(|rel| rel.to_ascii_lowercase())
                    .is_some_and(|rel| wanted(&rel))
                    && attr(attrs, "href").is_some_and(|h| !h.trim().is_empty())
            })
            .and_then(|attrs| attr(attrs, "href"))
            .and_then(|href| page.join(&decode_entities(href.trim())).ok())
            .map(|url| url.to_string())
    };
    let favicon_url = icon_href(|rel| rel.contains("apple-touch-icon"))
        .or_else(|| icon_href(|rel| rel.split_whitespace().any(|r| r == "icon")))
        .or_else(|| favicon_service_url(page));

    PageMetadata {
        url: page.to_string(),
        title,
        description,
        favicon_url,
    }
}

fn favicon_service_url(page: &Url) -> Option<String> {
    page.host_str()
        .map(|host| format!("{FAVICON_SERVICE}?domain={host}&sz=64"))
}

/// Decode entities and collapse whitespace.
fn clean_text(raw: &str) -> String {
    decode_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode the handful of entities that show up in titles and descriptions.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://tools.example.com/app/index.html").unwrap()
    }

    #[test]
    fn test_full_page() {
        let html = r#"<html><head>
            <title>  Example &amp; Co
            </title>
            <meta name="description" content="plain description">
            <meta content="OG &quot;rich&quot; description" property="og:description">
            <link rel="icon" href="/favicon.ico">
            <link href="/apple.png" rel="apple-touch-icon" sizes="180x180">
        </head></html>"#;

        let meta = extract_metadata(html, &page());
        assert_eq!(meta.title.as_deref(), Some("Example & Co"));
        assert_eq!(meta.description.as_deref(), Some("OG \"rich\" description"));
        assert_eq!(meta.favicon_url.as_deref(), Some("https://tools.example.com/apple.png"));
        assert_eq!(meta.url, "https://tools.example.com/app/index.html");
    }

    #[test]
    fn test_meta_description_fallback_and_icon_link() {
        let html = r#"<title>X</title>
            <meta name='description' content='It&#39;s a tool'>
            <link rel="shortcut icon" href="img/fav.png">"#;

        let meta = extract_metadata(html, &page());
        assert_eq!(meta.description.as_deref(), Some("It's a tool"));
        assert_eq!(meta.favicon_url.as_deref(), Some("https://tools.example.com/app/img/fav.png"));
    }

    #[test]
    fn test_empty_html_uses_favicon_service() {
        let meta = extract_metadata("", &page());
        assert!(meta.title.is_none());
        assert!(meta.description.is_none());
        assert_eq!(
            meta.favicon_url.as_deref(),
            Some("https://www.google.com/s2/favicons?domain=tools.example.com&sz=64")
        );
    }

    #[test]
    fn test_absolute_icon_href_kept() {
        let html = r#"<link rel="icon" type="image/png" href="https://cdn.example.net/i.png">"#;
        let meta = extract_metadata(html, &page());
        assert_eq!(meta.favicon_url.as_deref(), Some("https://cdn.example.net/i.png"));
    }

    #[test]
    fn test_entities_decoded_once() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("a &lt;b&gt;"), "a <b>");
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let fetcher = MetadataFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch("ftp://example.com/file").await.unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
        assert!(fetcher.fetch("not a url").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_falls_back_to_empty_page() {
        let fetcher = MetadataFetcher::new(Duration::from_millis(500)).unwrap();
        let meta = fetcher.fetch("http://127.0.0.1:9/").await.unwrap();
        assert!(meta.title.is_none());
        assert_eq!(
            meta.favicon_url.as_deref(),
            Some("https://www.google.com/s2/favicons?domain=127.0.0.1&sz=64")
        );
    }
}
