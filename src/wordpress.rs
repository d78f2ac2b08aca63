use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::markup;

pub const SITE_HOST: &str = "testsiteexam.wordpress.com";
pub const API_BASE: &str =
    "https://public-api.wordpress.com/wp/v2/sites/testsiteexam.wordpress.com";

const WP_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("unexpected payload from {url}: {reason}")]
    Payload { url: String, reason: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: String,
    pub published_at: NaiveDateTime,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

impl Post {
    /// Title with markup stripped and entities decoded.
    pub fn plain_title(&self) -> String {
        markup::plain_text(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub base_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("blog-tui/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            base_url: None,
            http_client: None,
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("wordpress client user agent required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        let base_url = config
            .base_url
            .unwrap_or_else(|| API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&base_url)?;

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn posts(&self, category: Option<i64>) -> Result<Vec<Post>, FetchError> {
        let mut url = self.endpoint("posts/")?;
        if let Some(id) = category {
            url.query_pairs_mut()
                .append_pair("categories", &id.to_string());
        }
        let raw: Vec<RawPost> = self.get_json(&url)?;
        raw.into_iter()
            .map(|post| post.into_post(url.as_str()))
            .collect()
    }

    pub fn post(&self, id: i64) -> Result<Post, FetchError> {
        let url = self.endpoint(&format!("posts/{id}"))?;
        let raw: RawPost = self.get_json(&url)?;
        raw.into_post(url.as_str())
    }

    pub fn categories(&self) -> Result<Vec<Category>, FetchError> {
        let url = self.endpoint("categories/")?;
        let raw: Vec<RawCategory> = self.get_json(&url)?;
        raw.into_iter()
            .map(|category| category.into_category(url.as_str()))
            .collect()
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        let joined = format!("{}/{}", self.base_url, path);
        Url::parse(&joined).map_err(|err| FetchError::Payload {
            url: joined.clone(),
            reason: format!("invalid endpoint: {err}"),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|err| FetchError::Payload {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Rendered {
    rendered: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Id(i64),
    Name(String),
}

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    title: Option<Rendered>,
    #[serde(default)]
    content: Option<Rendered>,
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    jetpack_featured_media_url: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

impl RawPost {
    fn into_post(self, url: &str) -> Result<Post, FetchError> {
        let missing = |field: &str| FetchError::Payload {
            url: url.to_string(),
            reason: format!("post is missing `{field}`"),
        };

        let id = self.id.ok_or_else(|| missing("id"))?;
        let title = self.title.ok_or_else(|| missing("title"))?.rendered;
        let content = self.content.ok_or_else(|| missing("content"))?.rendered;
        let date = self.date.ok_or_else(|| missing("date"))?;
        let published_at = parse_wp_date(&date).ok_or_else(|| FetchError::Payload {
            url: url.to_string(),
            reason: format!("post {id} has unparsable date {date:?}"),
        })?;
        let author = match self.author {
            Some(RawAuthor::Name(name)) if !name.trim().is_empty() => name,
            Some(RawAuthor::Id(id)) => id.to_string(),
            _ => "Unknown".to_string(),
        };

        Ok(Post {
            id,
            title,
            content,
            author,
            published_at,
            image_url: non_empty(self.jetpack_featured_media_url),
            link: non_empty(self.link),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

impl RawCategory {
    fn into_category(self, url: &str) -> Result<Category, FetchError> {
        match (self.id, self.name) {
            (Some(id), Some(name)) => Ok(Category {
                id,
                name: markup::plain_text(&name),
            }),
            _ => Err(FetchError::Payload {
                url: url.to_string(),
                reason: "category requires `id` and `name`".to_string(),
            }),
        }
    }
}

/// WordPress `date` is site-local without an offset; RFC 3339 is accepted too.
pub fn parse_wp_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, WP_DATE_FORMAT)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    /// Serves `responses` in order, then shuts down. Returns the base URL and
    /// a handle yielding the request URLs that were seen.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let base = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let request = server.recv().expect("receive request");
                seen.push(request.url().to_string());
                let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .expect("header");
                let _ = request.respond(
                    Response::from_string(body)
                        .with_status_code(status)
                        .with_header(header),
                );
            }
            seen
        });
        (base, handle)
    }

    fn client(base: &str) -> Client {
        Client::new(ClientConfig {
            base_url: Some(base.to_string()),
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    const POSTS: &str = r#"[
        {"id": 7, "title": {"rendered": "Hello &amp; Welcome"}, "content": {"rendered": "<p>Body</p>"},
         "author": 3, "date": "2025-01-05T15:04:00",
         "jetpack_featured_media_url": "https://testsiteexam.wordpress.com/wp-content/uploads/a.png",
         "link": "https://testsiteexam.wordpress.com/2025/01/05/hello/"},
        {"id": 8, "title": {"rendered": "Second"}, "content": {"rendered": ""},
         "author": "Jane", "date": "2025-01-06T09:00:00", "jetpack_featured_media_url": ""}
    ]"#;

    #[test]
    fn lists_posts_and_converts_fields() {
        let (base, handle) = serve(vec![(200, POSTS)]);
        let posts = client(&base).posts(None).unwrap();
        let seen = handle.join().unwrap();

        assert_eq!(seen, vec!["/posts/".to_string()]);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, 7);
        assert_eq!(posts[0].author, "3");
        assert_eq!(posts[0].plain_title(), "Hello & Welcome");
        assert!(posts[0].image_url.is_some());
        assert_eq!(posts[1].author, "Jane");
        assert_eq!(posts[1].image_url, None);
        assert_eq!(posts[1].link, None);
    }

    #[test]
    fn category_filter_is_sent_as_query_parameter() {
        let (base, handle) = serve(vec![(200, "[]")]);
        let posts = client(&base).posts(Some(5)).unwrap();
        let seen = handle.join().unwrap();

        assert!(posts.is_empty());
        assert_eq!(seen, vec!["/posts/?categories=5".to_string()]);
    }

    #[test]
    fn non_success_status_maps_to_status_error() {
        let (base, handle) = serve(vec![(404, r#"{"code":"rest_post_invalid_id"}"#)]);
        let err = client(&base).post(404).unwrap_err();
        handle.join().unwrap();

        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[test]
    fn malformed_payload_maps_to_payload_error() {
        let (base, handle) = serve(vec![
            (200, r#"{"not": "a list"}"#),
            (200, r#"[{"id": 1, "title": {"rendered": "x"}}]"#),
        ]);
        let client = client(&base);
        let first = client.posts(None).unwrap_err();
        let second = client.posts(None).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(first, FetchError::Payload { .. }));
        match second {
            FetchError::Payload { reason, .. } => assert!(reason.contains("content")),
            other => panic!("expected payload error, got {other:?}"),
        }
    }

    #[test]
    fn lists_categories() {
        let (base, handle) = serve(vec![(200, r#"[{"id": 2, "name": "News &amp; Views"}]"#)]);
        let categories = client(&base).categories().unwrap();
        handle.join().unwrap();

        assert_eq!(
            categories,
            vec![Category {
                id: 2,
                name: "News & Views".into()
            }]
        );
    }

    #[test]
    fn transport_failure_maps_to_transport_error() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr());
        drop(server);

        let err = client(&base).categories().unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[test]
    fn parses_wordpress_and_rfc3339_dates() {
        let local = parse_wp_date("2025-01-05T15:04:00").unwrap();
        assert_eq!(local.to_string(), "2025-01-05 15:04:00");
        let offset = parse_wp_date("2025-01-05T15:04:00+02:00").unwrap();
        assert_eq!(offset, local);
        assert!(parse_wp_date("yesterday").is_none());
    }

    #[test]
    fn rejects_empty_user_agent() {
        let result = Client::new(ClientConfig {
            user_agent: "  ".into(),
            ..ClientConfig::default()
        });
        assert!(result.is_err());
    }
}
