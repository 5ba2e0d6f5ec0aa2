#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::{header, Method, Request};
use chrono::{DateTime, Duration, Utc};

use plinth::extend::{handler, HandlerFn};
use plinth::flow::Flow;
use plinth::session::Clock;

/// Build a flow for a bare request with no body
pub fn flow(method: &str, uri: &str) -> Arc<Flow> {
    flow_with(method, uri, &[], b"")
}

/// Build a flow with headers and a body
pub fn flow_with(method: &str, uri: &str, headers: &[(&str, &str)], body: &[u8]) -> Arc<Flow> {
    let mut builder = Request::builder()
        .method(Method::from_bytes(method.as_bytes()).expect("method"))
        .uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(()).expect("request");
    let (parts, _) = request.into_parts();
    Arc::new(Flow::new(parts, Bytes::copy_from_slice(body)))
}

/// Build a flow carrying a session cookie
pub fn flow_with_session(method: &str, uri: &str, cookie_name: &str, token: &str) -> Arc<Flow> {
    let cookie = format!("{}={}", cookie_name, token);
    flow_with(method, uri, &[(header::COOKIE.as_str(), cookie.as_str())], b"")
}

/// Shared trace of which handlers ran, in order
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

/// Handler that appends `label` to the trace and nothing else
pub fn tracing_handler(trace: &Trace, label: &str) -> HandlerFn {
    let trace = trace.clone();
    let label = label.to_string();
    handler(move |_flow| {
        let trace = trace.clone();
        let label = label.clone();
        async move {
            trace.lock().expect("trace lock").push(label);
        }
    })
}

pub fn trace_entries(trace: &Trace) -> Vec<String> {
    trace.lock().expect("trace lock").clone()
}

/// Manually advanced time source
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn at(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now = *now + by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}
