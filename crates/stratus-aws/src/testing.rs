//! Recording transport that replays canned responses.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use stratus_core::{CloudError, CloudResult};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

type Responder = Box<dyn Fn(&HttpRequest) -> Option<HttpResponse> + Send + Sync>;

/// Answers from routes first (matched per request), then from the FIFO queue.
#[derive(Default)]
pub struct MockTransport {
    queue: Mutex<VecDeque<HttpResponse>>,
    routes: Mutex<Vec<Responder>>,
    requests: Mutex<Vec<HttpRequest>>,
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: BTreeMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

/// Decoded form body of a Query-protocol request.
pub fn form(request: &HttpRequest) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(&request.body[..])
        .into_owned()
        .collect()
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, body: &str) {
        self.push_status(200, body);
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.queue.lock().unwrap().push_back(response(status, body));
    }

    /// Answer every request whose form `Action` (or target operation) is `action`.
    pub fn on_action(&self, action: &str, status: u16, body: &str) {
        let action = action.to_string();
        let resp = response(status, body);
        self.route(move |req| {
            let form = form(req);
            let target = req
                .headers
                .get("x-amz-target")
                .and_then(|t| t.rsplit('.').next());
            let matches = form.get("Action").map(String::as_str) == Some(action.as_str())
                || target == Some(action.as_str());
            matches.then(|| resp.clone())
        });
    }

    /// Answer requests for which `f` returns a response.
    pub fn route<F>(&self, f: F)
    where
        F: Fn(&HttpRequest) -> Option<HttpResponse> + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Box::new(f));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Form `Action` of every recorded request, in order.
    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| form(r).get("Action").cloned())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> CloudResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let routed = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find_map(|route| route(&request));
        if let Some(resp) = routed {
            return Ok(resp);
        }
        self.queue.lock().unwrap().pop_front().ok_or_else(|| {
            CloudError::Transport(format!("no canned response for {} {}", request.method, request.url))
        })
    }
}
