//! Canned-response [`HttpClient`] for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Request, Response, Url};

use super::HttpClient;

pub struct Canned {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
}

impl Canned {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Answers requests in order; once the queue is drained every request gets a 404.
pub struct StubClient {
    responses: Mutex<VecDeque<Canned>>,
    seen: Mutex<Vec<(reqwest::Method, Url)>>,
}

impl StubClient {
    pub fn new(responses: Vec<Canned>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(reqwest::Method, Url)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.seen
            .lock()
            .unwrap()
            .push((req.method().clone(), req.url().clone()));
        let canned = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Canned::with_status(404, ""));

        let mut builder = http::Response::builder().status(canned.status);
        for (name, value) in &canned.headers {
            builder = builder.header(*name, value.as_str());
        }
        Ok(Response::from(builder.body(canned.body).unwrap()))
    }
}
