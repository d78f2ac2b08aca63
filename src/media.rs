use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use image::ImageFormat;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::wordpress::SITE_HOST;

const SNIFF_BYTES: u64 = 512;

#[derive(Debug, thiserror::Error)]
pub enum ImageUnavailable {
    #[error("post has no featured image")]
    MissingUrl,
    #[error("image url {0} is not allowed")]
    Disallowed(String),
    #[error("image request failed: {0}")]
    Transport(String),
    #[error("image request returned {0}")]
    Status(u16),
    #[error("resource is not an image ({0})")]
    NotAnImage(String),
}

/// Checks whether a hero image can actually be loaded.
pub trait ImageProbe: Send + Sync {
    fn probe(&self, url: &str) -> Result<(), ImageUnavailable>;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout: Duration,
    /// Hosts images may be loaded from; empty allows any host.
    pub allowed_hosts: Vec<String>,
    pub require_https: bool,
    pub user_agent: String,
    pub http_client: Option<Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            allowed_hosts: vec![SITE_HOST.to_string()],
            require_https: true,
            user_agent: format!("blog-tui/{}", crate::VERSION),
            http_client: None,
        }
    }
}

pub struct HttpImageProbe {
    client: Client,
    allowed_hosts: Vec<String>,
    require_https: bool,
    user_agent: String,
}

impl HttpImageProbe {
    pub fn new(cfg: Config) -> Result<Self> {
        let client = match cfg.http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(cfg.timeout)
                .build()
                .context("media: build http client")?,
        };
        Ok(Self {
            client,
            allowed_hosts: cfg
                .allowed_hosts
                .into_iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
            require_https: cfg.require_https,
            user_agent: cfg.user_agent,
        })
    }

    fn check_url(&self, raw: &str) -> Result<Url, ImageUnavailable> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageUnavailable::MissingUrl);
        }
        let url = Url::parse(raw).map_err(|_| ImageUnavailable::Disallowed(raw.to_string()))?;
        let scheme_ok = match url.scheme() {
            "https" => true,
            "http" => !self.require_https,
            _ => false,
        };
        if !scheme_ok {
            return Err(ImageUnavailable::Disallowed(raw.to_string()));
        }
        if !self.allowed_hosts.is_empty() {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
                return Err(ImageUnavailable::Disallowed(raw.to_string()));
            }
        }
        Ok(url)
    }
}

impl ImageProbe for HttpImageProbe {
    fn probe(&self, raw: &str) -> Result<(), ImageUnavailable> {
        let url = self.check_url(raw)?;

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|err| ImageUnavailable::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageUnavailable::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .map(|s| s.to_ascii_lowercase());
        if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
        {
            return Ok(());
        }

        let mut head = Vec::with_capacity(SNIFF_BYTES as usize);
        response
            .take(SNIFF_BYTES)
            .read_to_end(&mut head)
            .map_err(|err| ImageUnavailable::Transport(err.to_string()))?;
        let detected = detect_mime(&head);
        if detected.starts_with("image/") {
            Ok(())
        } else {
            Err(ImageUnavailable::NotAnImage(
                content_type.unwrap_or(detected),
            ))
        }
    }
}

fn detect_mime(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg".into(),
        Ok(ImageFormat::Png) => "image/png".into(),
        Ok(ImageFormat::Gif) => "image/gif".into(),
        Ok(ImageFormat::WebP) => "image/webp".into(),
        _ => tree_magic_mini::from_u8(bytes).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    fn serve_once(status: u16, content_type: &'static str, body: &'static [u8]) -> String {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let base = format!("http://{}", server.server_addr());
        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let header =
                    Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()).unwrap();
                let _ = request.respond(
                    Response::from_data(body)
                        .with_status_code(status)
                        .with_header(header),
                );
            }
        });
        base
    }

    fn local_probe() -> HttpImageProbe {
        HttpImageProbe::new(Config {
            timeout: Duration::from_secs(5),
            allowed_hosts: vec!["127.0.0.1".into()],
            require_https: false,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn accepts_image_content_type() {
        let base = serve_once(200, "image/jpeg", b"not really a jpeg");
        assert!(local_probe().probe(&format!("{base}/a.jpg")).is_ok());
    }

    #[test]
    fn sniffs_bytes_when_content_type_is_generic() {
        let base = serve_once(200, "application/octet-stream", PNG_MAGIC);
        assert!(local_probe().probe(&format!("{base}/a.png")).is_ok());
    }

    #[test]
    fn rejects_error_status() {
        let base = serve_once(404, "text/html", b"<h1>missing</h1>");
        let err = local_probe().probe(&format!("{base}/gone.png")).unwrap_err();
        assert!(matches!(err, ImageUnavailable::Status(404)));
    }

    #[test]
    fn rejects_html_served_as_success() {
        let base = serve_once(200, "text/html", b"<html><body>login</body></html>");
        let err = local_probe().probe(&format!("{base}/page")).unwrap_err();
        assert!(matches!(err, ImageUnavailable::NotAnImage(_)));
    }

    #[test]
    fn rejects_unreachable_host() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr());
        drop(server);
        let err = local_probe().probe(&format!("{base}/a.png")).unwrap_err();
        assert!(matches!(err, ImageUnavailable::Transport(_)));
    }

    #[test]
    fn default_allow_list_only_admits_the_blog_over_https() {
        let probe = HttpImageProbe::new(Config::default()).unwrap();
        assert!(probe
            .check_url("https://testsiteexam.wordpress.com/wp-content/uploads/a.png")
            .is_ok());
        assert!(matches!(
            probe.check_url("http://testsiteexam.wordpress.com/a.png"),
            Err(ImageUnavailable::Disallowed(_))
        ));
        assert!(matches!(
            probe.check_url("https://evil.example/a.png"),
            Err(ImageUnavailable::Disallowed(_))
        ));
        assert!(matches!(
            probe.check_url("   "),
            Err(ImageUnavailable::MissingUrl)
        ));
        assert!(matches!(
            probe.check_url("file:///etc/passwd"),
            Err(ImageUnavailable::Disallowed(_))
        ));
    }
}
