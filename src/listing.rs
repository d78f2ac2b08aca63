//! Listing view state: search, category filter and client-side pagination.
//!
//! [`ListingState`] is the pure part and holds the invariants; every mutation
//! goes through one of its methods. [`ListingController`] adds the three
//! network-backed actions (initialize, category filter, refresh), which run
//! on background threads and are applied on the owning thread by [`poll`].
//! Posts requests share one slot: a response is only applied if it answers
//! the most recent posts request.
//!
//! [`poll`]: ListingController::poll

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::data::ContentService;
use crate::wordpress::{Category, FetchError, Post};

pub const PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ListingState {
    all_posts: Vec<Post>,
    filtered_posts: Vec<Post>,
    search_query: String,
    current_page: usize,
}

impl Default for ListingState {
    fn default() -> Self {
        Self {
            all_posts: Vec::new(),
            filtered_posts: Vec::new(),
            search_query: String::new(),
            current_page: 1,
        }
    }
}

impl ListingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_posts(&self) -> &[Post] {
        &self.all_posts
    }

    pub fn filtered_posts(&self) -> &[Post] {
        &self.filtered_posts
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
        self.filtered_posts = filter_posts(&self.all_posts, &self.search_query);
        self.current_page = 1;
    }

    /// Replaces the collection with a fresh fetch. The search text is kept
    /// but not reapplied, so every fetched post is visible again.
    pub fn replace_posts(&mut self, posts: Vec<Post>) {
        self.filtered_posts = posts.clone();
        self.all_posts = posts;
        self.current_page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        if page < 1 {
            return;
        }
        if page > 1 && (page - 1).saturating_mul(PAGE_SIZE) >= self.filtered_posts.len() {
            return;
        }
        self.current_page = page;
    }

    pub fn visible_posts(&self) -> &[Post] {
        let start = (self.current_page - 1).saturating_mul(PAGE_SIZE);
        if start >= self.filtered_posts.len() {
            return &[];
        }
        let end = (start + PAGE_SIZE).min(self.filtered_posts.len());
        &self.filtered_posts[start..end]
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page * PAGE_SIZE < self.filtered_posts.len()
    }

    pub fn has_prev_page(&self) -> bool {
        self.current_page > 1
    }

    pub fn page_count(&self) -> usize {
        self.filtered_posts.len().div_ceil(PAGE_SIZE).max(1)
    }
}

/// Case-insensitive substring match on the plain-text title; a blank query
/// keeps everything. The query is matched as typed, surrounding spaces
/// included. Order is preserved.
pub fn filter_posts(posts: &[Post], query: &str) -> Vec<Post> {
    if query.trim().is_empty() {
        return posts.to_vec();
    }
    let needle = query.to_lowercase();
    posts
        .iter()
        .filter(|post| post.plain_title().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

struct PendingPosts {
    request_id: u64,
    category: Option<i64>,
    cancel_flag: Arc<AtomicBool>,
}

struct PendingCategories {
    request_id: u64,
}

enum Response {
    Posts {
        request_id: u64,
        category: Option<i64>,
        result: Result<Vec<Post>, FetchError>,
    },
    Categories {
        request_id: u64,
        result: Result<Vec<Category>, FetchError>,
    },
}

pub struct ListingController {
    service: Arc<dyn ContentService>,
    state: ListingState,
    categories: Vec<Category>,
    selected_category: Option<i64>,
    posts_error: Option<String>,
    categories_error: Option<String>,
    response_tx: Sender<Response>,
    response_rx: Receiver<Response>,
    next_request_id: u64,
    pending_posts: Option<PendingPosts>,
    pending_categories: Option<PendingCategories>,
}

impl ListingController {
    pub fn new(service: Arc<dyn ContentService>) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            service,
            state: ListingState::new(),
            categories: Vec::new(),
            selected_category: None,
            posts_error: None,
            categories_error: None,
            response_tx,
            response_rx,
            next_request_id: 1,
            pending_posts: None,
            pending_categories: None,
        }
    }

    pub fn state(&self) -> &ListingState {
        &self.state
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn selected_category(&self) -> Option<i64> {
        self.selected_category
    }

    /// Most relevant failure: a posts error first, then a categories error.
    /// Each clears only when its own request succeeds.
    pub fn last_error(&self) -> Option<&str> {
        self.posts_error
            .as_deref()
            .or(self.categories_error.as_deref())
    }

    pub fn is_loading(&self) -> bool {
        self.pending_posts.is_some() || self.pending_categories.is_some()
    }

    pub fn initialize(&mut self) {
        self.request_posts(None);
        self.request_categories();
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.state.set_search_query(query);
    }

    pub fn filter_by_category(&mut self, category_id: i64) {
        self.request_posts(Some(category_id));
    }

    /// Reloads every post. Like any fresh fetch this returns to page 1 and
    /// leaves the category filter. Categories are fetched again only if
    /// their last request failed.
    pub fn refresh(&mut self) {
        self.request_posts(None);
        if self.categories_error.is_some() && self.pending_categories.is_none() {
            self.request_categories();
        }
    }

    pub fn set_page(&mut self, page: usize) {
        self.state.set_page(page);
    }

    pub fn next_page(&mut self) {
        let page = self.state.current_page() + 1;
        self.state.set_page(page);
    }

    pub fn prev_page(&mut self) {
        let page = self.state.current_page().saturating_sub(1);
        self.state.set_page(page);
    }

    pub fn visible_posts(&self) -> &[Post] {
        self.state.visible_posts()
    }

    pub fn has_next_page(&self) -> bool {
        self.state.has_next_page()
    }

    pub fn has_prev_page(&self) -> bool {
        self.state.has_prev_page()
    }

    /// Applies every response that has arrived. Returns whether anything
    /// was received.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
            changed = true;
        }
        changed
    }

    /// Blocks until no request is pending or `timeout` elapses. Returns
    /// `true` when everything settled.
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

    fn request_posts(&mut self, category: Option<i64>) {
        if let Some(pending) = self.pending_posts.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }

        let request_id = self.take_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_posts = Some(PendingPosts {
            request_id,
            category,
            cancel_flag: cancel_flag.clone(),
        });
        tracing::debug!(request_id, ?category, "requesting posts");

        let tx = self.response_tx.clone();
        let service = self.service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.list_posts(category);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Posts {
                request_id,
                category,
                result,
            });
        });
    }

    fn request_categories(&mut self) {
        let request_id = self.take_request_id();
        self.pending_categories = Some(PendingCategories { request_id });
        tracing::debug!(request_id, "requesting categories");

        let tx = self.response_tx.clone();
        let service = self.service.clone();
        thread::spawn(move || {
            let result = service.list_categories();
            let _ = tx.send(Response::Categories { request_id, result });
        });
    }

    fn handle_response(&mut self, response: Response) {
        match response {
            Response::Posts {
                request_id,
                category,
                result,
            } => {
                let Some(pending) = &self.pending_posts else {
                    return;
                };
                if pending.request_id != request_id
                    || pending.category != category
                    || pending.cancel_flag.load(Ordering::SeqCst)
                {
                    tracing::debug!(request_id, "dropping stale posts response");
                    return;
                }
                self.pending_posts = None;

                match result {
                    Ok(posts) => {
                        tracing::info!(count = posts.len(), ?category, "posts loaded");
                        self.state.replace_posts(posts);
                        self.selected_category = category;
                        self.posts_error = None;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, ?category, "failed to load posts");
                        self.posts_error = Some(format!("Failed to load posts: {err}"));
                    }
                }
            }
            Response::Categories { request_id, result } => {
                let Some(pending) = &self.pending_categories else {
                    return;
                };
                if pending.request_id != request_id {
                    return;
                }
                self.pending_categories = None;

                match result {
                    Ok(categories) => {
                        tracing::info!(count = categories.len(), "categories loaded");
                        self.categories = categories;
                        self.categories_error = None;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to load categories");
                        self.categories_error =
                            Some(format!("Failed to load categories: {err}"));
                    }
                }
            }
        }
    }
}
