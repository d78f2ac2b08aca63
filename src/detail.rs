//! Single-post view state.
//!
//! A failed fetch keeps the placeholder post on screen and records the error;
//! it is never returned to the caller. The hero image is only exposed once a
//! probe for the current post succeeded.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::data::ContentService;
use crate::media::ImageProbe;
use crate::wordpress::{FetchError, Post};

const DISPLAY_DATE_FORMAT: &str = "%B %d, %Y at %I:%M %p";

/// Long-form date and time, e.g. `January 05, 2025 at 03:04 PM`.
pub fn format_display_date(timestamp: &NaiveDateTime) -> String {
    timestamp.format(DISPLAY_DATE_FORMAT).to_string()
}

fn placeholder(id: i64) -> Post {
    Post {
        id,
        title: "Loading...".to_string(),
        content: "Loading...".to_string(),
        author: "Unknown".to_string(),
        published_at: NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or_default(),
        image_url: None,
        link: None,
    }
}

struct PendingPost {
    request_id: u64,
    post_id: i64,
    cancel_flag: Arc<AtomicBool>,
}

struct PendingImage {
    request_id: u64,
    post_id: i64,
    cancel_flag: Arc<AtomicBool>,
}

enum Response {
    Post {
        request_id: u64,
        post_id: i64,
        result: Result<Post, FetchError>,
    },
    Image {
        request_id: u64,
        post_id: i64,
        valid: bool,
    },
}

pub struct DetailLoader {
    service: Arc<dyn ContentService>,
    probe: Arc<dyn ImageProbe>,
    current_id: Option<i64>,
    post: Post,
    loaded: bool,
    image_valid: bool,
    last_error: Option<String>,
    response_tx: Sender<Response>,
    response_rx: Receiver<Response>,
    next_request_id: u64,
    pending_post: Option<PendingPost>,
    pending_image: Option<PendingImage>,
}

impl DetailLoader {
    pub fn new(service: Arc<dyn ContentService>, probe: Arc<dyn ImageProbe>) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            service,
            probe,
            current_id: None,
            post: placeholder(0),
            loaded: false,
            image_valid: false,
            last_error: None,
            response_tx,
            response_rx,
            next_request_id: 1,
            pending_post: None,
            pending_image: None,
        }
    }

    pub fn current_id(&self) -> Option<i64> {
        self.current_id
    }

    /// The loaded post, or the placeholder while loading or after a failure.
    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn image_valid(&self) -> bool {
        self.image_valid
    }

    pub fn hero_image_url(&self) -> Option<&str> {
        if self.loaded && self.image_valid {
            self.post.image_url.as_deref()
        } else {
            None
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_post.is_some() || self.pending_image.is_some()
    }

    pub fn load(&mut self, id: i64) {
        if self.current_id == Some(id) && (self.loaded || self.pending_post.is_some()) {
            return;
        }
        self.cancel_pending();

        self.current_id = Some(id);
        self.post = placeholder(id);
        self.loaded = false;
        self.image_valid = false;
        self.last_error = None;

        let request_id = self.take_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_post = Some(PendingPost {
            request_id,
            post_id: id,
            cancel_flag: cancel_flag.clone(),
        });
        tracing::debug!(request_id, post_id = id, "requesting post");

        let tx = self.response_tx.clone();
        let service = self.service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.get_post(id);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Post {
                request_id,
                post_id: id,
                result,
            });
        });
    }

    /// Drops the current post and any in-flight work, e.g. when the detail
    /// view closes.
    pub fn clear(&mut self) {
        self.cancel_pending();
        self.current_id = None;
        self.post = placeholder(0);
        self.loaded = false;
        self.image_valid = false;
        self.last_error = None;
    }

    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
            changed = true;
        }
        changed
    }

    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.poll();
        !self.is_loading()
    }

    fn take_request_id(&mut self) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        request_id
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending_post.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        if let Some(pending) = self.pending_image.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
    }

    fn start_probe(&mut self, post_id: i64, url: String) {
        let request_id = self.take_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_image = Some(PendingImage {
            request_id,
            post_id,
            cancel_flag: cancel_flag.clone(),
        });

        let tx = self.response_tx.clone();
        let probe = self.probe.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let valid = match probe.probe(&url) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(post_id, %url, error = %err, "hero image unavailable");
                    false
                }
            };
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Image {
                request_id,
                post_id,
                valid,
            });
        });
    }

    fn handle_response(&mut self, response: Response) {
        match response {
            Response::Post {
                request_id,
                post_id,
                result,
            } => {
                let Some(pending) = &self.pending_post else {
                    return;
                };
                if pending.request_id != request_id
                    || pending.post_id != post_id
                    || pending.cancel_flag.load(Ordering::SeqCst)
                    || self.current_id != Some(post_id)
                {
                    return;
                }
                self.pending_post = None;

                match result {
                    Ok(post) => {
                        tracing::info!(post_id, "post loaded");
                        let image_url = post.image_url.clone();
                        self.post = post;
                        self.loaded = true;
                        if let Some(url) = image_url {
                            self.start_probe(post_id, url);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(post_id, error = %err, "failed to load post");
                        self.last_error = Some(format!("Failed to load post {post_id}: {err}"));
                    }
                }
            }
            Response::Image {
                request_id,
                post_id,
                valid,
            } => {
                let Some(pending) = &self.pending_image else {
                    return;
                };
                if pending.request_id != request_id
                    || pending.post_id != post_id
                    || self.current_id != Some(post_id)
                {
                    return;
                }
                self.pending_image = None;
                self.image_valid = valid;
            }
        }
    }
}
