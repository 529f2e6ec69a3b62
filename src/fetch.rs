//! Outbound HTTP: page titles for new links and remote icon downloads.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::FetchConfig;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote answered with status {0}")]
    Status(StatusCode),

    #[error("remote file is larger than {0} bytes")]
    TooLarge(usize),
}

/// A downloaded remote file.
#[derive(Debug, Clone)]
pub struct RemoteAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Title of the page at `url`, or an empty string when it cannot be read.
    async fn page_title(&self, url: &str) -> String;

    async fn download(&self, url: &str) -> Result<RemoteAsset, FetchError>;
}

pub struct HttpFetcher {
    pages: Client,
    icons: Client,
    max_title_bytes: usize,
    max_icon_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );

        let pages = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.title_timeout_secs.max(1)))
            .build()?;

        let icons = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.icon_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            pages,
            icons,
            max_title_bytes: config.max_title_bytes.max(1),
            max_icon_bytes: usize::MAX,
        })
    }

    /// Refuses icon downloads larger than `bytes`.
    pub fn with_icon_limit(mut self, bytes: usize) -> Self {
        self.max_icon_bytes = bytes;
        self
    }
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Reads at most `limit` bytes of the body. Returns the bytes and whether
/// more were left unread.
async fn read_capped(response: &mut Response, limit: usize) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

/// Decodes a page body with the charset named in its Content-Type, falling
/// back to UTF-8.
pub fn decode_body(content_type: &str, body: &[u8]) -> String {
    let encoding = content_type
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, label)| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn page_title(&self, url: &str) -> String {
        let mut response = match self.pages.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "Page title request failed");
                return String::new();
            }
        };

        if response.status() != StatusCode::OK {
            tracing::warn!(url, status = %response.status(), "Page title request not OK");
            return String::new();
        }

        let content_type = content_type(&response);
        match read_capped(&mut response, self.max_title_bytes).await {
            Ok((body, _)) => extract_title(&decode_body(&content_type, &body)).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to read page body");
                String::new()
            }
        }
    }

    async fn download(&self, url: &str) -> Result<RemoteAsset, FetchError> {
        let mut response = self.icons.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_icon_bytes as u64)
        {
            return Err(FetchError::TooLarge(self.max_icon_bytes));
        }

        let content_type = content_type(&response);
        let (bytes, truncated) = read_capped(&mut response, self.max_icon_bytes).await?;
        if truncated {
            return Err(FetchError::TooLarge(self.max_icon_bytes));
        }

        Ok(RemoteAsset {
            bytes,
            content_type,
        })
    }
}

fn title_regex() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid")
    })
}

/// Pulls the first `<title>` out of an HTML document, decoding common
/// entities and collapsing whitespace runs to single spaces.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = title_regex().captures(html)?.get(1)?.as_str();
    let title = decode_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// File extension for a downloaded icon, chosen from its content type.
pub fn icon_extension(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("jpeg") {
        ".jpg"
    } else if content_type.contains("svg") {
        ".svg"
    } else if content_type.contains("x-icon") {
        ".ico"
    } else {
        ".png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single request with `body` and returns the URL to hit.
    async fn serve_once(content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn page_title_honors_declared_charset() {
        let (body, _, _) = encoding_rs::GBK.encode("<html><title>百度一下</title></html>");
        let url = serve_once("text/html; charset=gbk", body.into_owned()).await;
        assert_eq!(fetcher().page_title(&url).await, "百度一下");
    }

    #[tokio::test]
    async fn page_title_defaults_to_utf8() {
        let url = serve_once("text/html", "<title>Grüße</title>".as_bytes().to_vec()).await;
        assert_eq!(fetcher().page_title(&url).await, "Grüße");
    }

    #[tokio::test]
    async fn oversized_icon_is_refused() {
        let url = serve_once("image/png", vec![0u8; 64]).await;
        let err = fetcher().with_icon_limit(16).download(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge(16)));
    }

    #[tokio::test]
    async fn icon_within_limit_downloads() {
        let url = serve_once("image/png", vec![7u8; 16]).await;
        let asset = fetcher().with_icon_limit(16).download(&url).await.unwrap();
        assert_eq!(asset.bytes, vec![7u8; 16]);
        assert_eq!(asset.content_type, "image/png");
    }

    #[test]
    fn decode_body_reads_charset_parameter() {
        let (gbk, _, _) = encoding_rs::GBK.encode("中文");
        assert_eq!(decode_body("text/html; Charset=\"GB2312\"", &gbk), "中文");
        assert_eq!(decode_body("text/html; charset=unknown-x", "ok".as_bytes()), "ok");
        assert_eq!(decode_body("", "plain".as_bytes()), "plain");
    }

    #[test]
    fn extracts_and_collapses_title() {
        let html = "<html><head><TITLE lang=\"en\">\n  Rust \t Lang\n</TITLE></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Rust Lang"));
    }

    #[test]
    fn missing_or_blank_title_is_none() {
        assert_eq!(extract_title("<html><body>hi</body></html>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(
            extract_title("<title>Tom &amp; Jerry &#39;s &#x4E2D; &bogus; &</title>").as_deref(),
            Some("Tom & Jerry 's 中 &bogus; &")
        );
    }

    #[test]
    fn first_title_wins() {
        let html = "<title>one</title><svg><title>two</title></svg>";
        assert_eq!(extract_title(html).as_deref(), Some("one"));
    }

    #[test]
    fn icon_extension_follows_content_type() {
        assert_eq!(icon_extension("image/jpeg"), ".jpg");
        assert_eq!(icon_extension("image/svg+xml"), ".svg");
        assert_eq!(icon_extension("image/x-icon"), ".ico");
        assert_eq!(icon_extension("image/png"), ".png");
        assert_eq!(icon_extension(""), ".png");
    }
}
