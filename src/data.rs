use std::sync::Arc;

use crate::wordpress::{self, Category, FetchError, Post};

pub trait ContentService: Send + Sync {
    fn list_posts(&self, category: Option<i64>) -> Result<Vec<Post>, FetchError>;
    fn list_categories(&self) -> Result<Vec<Category>, FetchError>;
    fn get_post(&self, id: i64) -> Result<Post, FetchError>;
}

pub struct WordpressContentService {
    client: Arc<wordpress::Client>,
}

impl WordpressContentService {
    pub fn new(client: Arc<wordpress::Client>) -> Self {
        Self { client }
    }
}

impl ContentService for WordpressContentService {
    fn list_posts(&self, category: Option<i64>) -> Result<Vec<Post>, FetchError> {
        self.client.posts(category)
    }

    fn list_categories(&self) -> Result<Vec<Category>, FetchError> {
        self.client.categories()
    }

    fn get_post(&self, id: i64) -> Result<Post, FetchError> {
        self.client.post(id)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use chrono::NaiveDate;
    use reqwest::StatusCode;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Call {
        Posts(Option<i64>),
        Categories,
        Post(i64),
    }

    /// Scripted content source: fixed data, per-call failures and delays.
    #[derive(Default)]
    pub struct FakeContentService {
        posts: Mutex<Vec<Post>>,
        by_category: Mutex<HashMap<i64, Vec<Post>>>,
        categories: Mutex<Vec<Category>>,
        failing: Mutex<HashSet<Call>>,
        delays: Mutex<HashMap<Call, Duration>>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeContentService {
        pub fn with_posts(posts: Vec<Post>) -> Self {
            let service = Self::default();
            *service.posts.lock().unwrap() = posts;
            service
        }

        pub fn set_posts(&self, posts: Vec<Post>) {
            *self.posts.lock().unwrap() = posts;
        }

        pub fn set_category_posts(&self, category: i64, posts: Vec<Post>) {
            self.by_category.lock().unwrap().insert(category, posts);
        }

        pub fn set_categories(&self, categories: Vec<Category>) {
            *self.categories.lock().unwrap() = categories;
        }

        pub fn fail(&self, call: Call) {
            self.failing.lock().unwrap().insert(call);
        }

        pub fn recover(&self, call: Call) {
            self.failing.lock().unwrap().remove(&call);
        }

        pub fn delay(&self, call: Call, delay: Duration) {
            self.delays.lock().unwrap().insert(call, delay);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn enter(&self, call: Call) -> Result<(), FetchError> {
            self.calls.lock().unwrap().push(call);
            let delay = self.delays.lock().unwrap().get(&call).copied();
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            if self.failing.lock().unwrap().contains(&call) {
                return Err(FetchError::Status {
                    url: format!("fake://{call:?}"),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            Ok(())
        }
    }

    impl ContentService for FakeContentService {
        fn list_posts(&self, category: Option<i64>) -> Result<Vec<Post>, FetchError> {
            self.enter(Call::Posts(category))?;
            Ok(match category {
                Some(id) => self
                    .by_category
                    .lock()
                    .unwrap()
                    .get(&id)
                    .cloned()
                    .unwrap_or_default(),
                None => self.posts.lock().unwrap().clone(),
            })
        }

        fn list_categories(&self) -> Result<Vec<Category>, FetchError> {
            self.enter(Call::Categories)?;
            Ok(self.categories.lock().unwrap().clone())
        }

        fn get_post(&self, id: i64) -> Result<Post, FetchError> {
            self.enter(Call::Post(id))?;
            self.posts
                .lock()
                .unwrap()
                .iter()
                .find(|post| post.id == id)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: format!("fake://posts/{id}"),
                    status: StatusCode::NOT_FOUND,
                })
        }
    }

    pub fn post(id: i64, title: &str) -> Post {
        Post {
            id,
            title: title.to_string(),
            content: format!("<p>Body of {title}</p>"),
            author: "Tester".to_string(),
            published_at: NaiveDate::from_ymd_opt(2025, 1, 5)
                .and_then(|d| d.and_hms_opt(15, 4, 0))
                .unwrap(),
            image_url: None,
            link: Some(format!("https://testsiteexam.wordpress.com/?p={id}")),
        }
    }

    pub fn numbered_posts(count: i64) -> Vec<Post> {
        (1..=count).map(|id| post(id, &format!("Post {id}"))).collect()
    }
}
