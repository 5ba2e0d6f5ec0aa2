//! Per-request state carrier.
//!
//! A `Flow` wraps one inbound request together with the response being
//! accumulated for it. Middleware, the resolved resource handler, and
//! anything they call all share the same `Flow` for the duration of the
//! request; it is never shared across requests. The key/value store is
//! guarded by a read-write lock because several collaborators touch it
//! during a single request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use axum::body::{Body, Bytes};
use axum::http::{
    header, request::Parts, Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri,
};
use axum::response::Response;
use cookie::Cookie;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ApiError;

/// Response state accumulated while a request moves through the pipeline
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    /// Set once anything has been written; a committed response is sent as-is
    committed: bool,
}

pub struct Flow {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,

    data: RwLock<HashMap<String, Value>>,
    extensions: RwLock<Extensions>,
    terminated: AtomicBool,
    response: Mutex<ResponseState>,
}

impl Flow {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            data: RwLock::new(HashMap::new()),
            extensions: RwLock::new(Extensions::new()),
            terminated: AtomicBool::new(false),
            response: Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Vec::new(),
                committed: false,
            }),
        }
    }

    // ---- Request surface ----

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Look up a request cookie by name
    pub fn cookie(&self, name: &str) -> Option<String> {
        for value in self.headers.get_all(header::COOKIE) {
            let raw = match value.to_str() {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            for parsed in Cookie::split_parse(raw).flatten() {
                if parsed.name() == name {
                    return Some(parsed.value().to_string());
                }
            }
        }
        None
    }

    /// Read a field from an application/x-www-form-urlencoded body
    pub fn form_value(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Decode the request body as JSON
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
    }

    // ---- Key/value store ----

    pub fn set(&self, key: &str, value: Value) {
        let mut data = self.data.write().expect("flow data lock poisoned");
        data.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let data = self.data.read().expect("flow data lock poisoned");
        data.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        let data = self.data.read().expect("flow data lock poisoned");
        matches!(data.get(key), Some(v) if !v.is_null())
    }

    pub fn del(&self, key: &str) {
        let mut data = self.data.write().expect("flow data lock poisoned");
        data.remove(key);
    }

    /// Add or update a nested value under `key.subkey`. A non-object value
    /// already stored at `key` is replaced by a fresh object.
    pub fn append_nested(&self, key: &str, subkey: &str, value: Value) {
        let mut data = self.data.write().expect("flow data lock poisoned");
        let entry = data.entry(key.to_string()).or_insert_with(|| json!({}));
        if !entry.is_object() {
            *entry = json!({});
        }
        if let Some(map) = entry.as_object_mut() {
            map.insert(subkey.to_string(), value);
        }
    }

    pub fn get_nested(&self, key: &str, subkey: &str) -> Option<Value> {
        let data = self.data.read().expect("flow data lock poisoned");
        data.get(key).and_then(|v| v.get(subkey)).cloned()
    }

    // ---- Typed extensions (session, principal, registry handle) ----

    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) {
        let mut ext = self.extensions.write().expect("flow extensions lock poisoned");
        ext.insert(value);
    }

    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let ext = self.extensions.read().expect("flow extensions lock poisoned");
        ext.get::<T>().cloned()
    }

    pub fn remove_extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let mut ext = self.extensions.write().expect("flow extensions lock poisoned");
        ext.remove::<T>()
    }

    // ---- Termination ----

    /// Stop all further pipeline processing. Intended for fatal but
    /// manageable conditions inside middleware.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    // ---- Response surface ----

    pub fn set_status(&self, status: StatusCode) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        res.status = status;
        res.committed = true;
    }

    pub fn set_header(&self, name: header::HeaderName, value: &str) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        if let Ok(value) = HeaderValue::from_str(value) {
            res.headers.insert(name, value);
        }
    }

    pub fn write(&self, bytes: &[u8]) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        res.body.extend_from_slice(bytes);
        res.committed = true;
    }

    pub fn write_html(&self, status: StatusCode, html: &str) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        res.status = status;
        res.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        res.body.extend_from_slice(html.as_bytes());
        res.committed = true;
    }

    pub fn write_json(&self, status: StatusCode, value: &Value) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        res.status = status;
        res.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        res.body
            .extend_from_slice(value.to_string().as_bytes());
        res.committed = true;
    }

    pub fn write_error_json(&self, status: StatusCode, message: &str) {
        self.write_json(
            status,
            &json!({
                "error": true,
                "message": message
            }),
        );
    }

    pub fn write_api_error(&self, err: &ApiError) {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.write_json(status, &err.to_json());
    }

    pub fn redirect(&self, location: &str, status: StatusCode) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        res.status = status;
        if let Ok(value) = HeaderValue::from_str(location) {
            res.headers.insert(header::LOCATION, value);
        }
        res.committed = true;
    }

    /// Append a Set-Cookie header to the response
    pub fn set_cookie(&self, cookie: Cookie<'static>) {
        let mut res = self.response.lock().expect("flow response lock poisoned");
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            res.headers.append(header::SET_COOKIE, value);
        }
    }

    /// Instruct the client to drop a cookie: zero Max-Age and an Expires in
    /// the past, same attributes as the cookies this host issues
    pub fn expire_cookie(&self, name: &str) {
        let mut cookie = Cookie::new(name.to_string(), "");
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_secure(true);
        cookie.set_same_site(cookie::SameSite::Strict);
        cookie.set_max_age(cookie::time::Duration::ZERO);
        cookie.set_expires(cookie::time::OffsetDateTime::UNIX_EPOCH);
        self.set_cookie(cookie);
    }

    pub fn is_committed(&self) -> bool {
        let res = self.response.lock().expect("flow response lock poisoned");
        res.committed
    }

    pub fn status(&self) -> StatusCode {
        let res = self.response.lock().expect("flow response lock poisoned");
        res.status
    }

    /// Snapshot the accumulated response as an axum `Response`
    pub fn to_response(&self) -> Response {
        let res = self.response.lock().expect("flow response lock poisoned");
        let mut builder = Response::builder().status(res.status);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(res.headers.clone());
        }
        builder
            .body(Body::from(res.body.clone()))
            .unwrap_or_else(|_| {
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())
                    .expect("empty response")
            })
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_for(method: Method, uri: &str) -> Flow {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, "Plinth_Auth=abc123; Other=xyz")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        Flow::new(parts, Bytes::from_static(b"username=admin&password=secret"))
    }

    #[test]
    fn data_store_roundtrip() {
        let flow = flow_for(Method::GET, "/admin/dashboard");
        assert!(!flow.has("user"));
        flow.set("user", json!({"name": "admin"}));
        assert!(flow.has("user"));
        assert_eq!(flow.get("user").unwrap()["name"], "admin");
        flow.del("user");
        assert!(!flow.has("user"));
    }

    #[test]
    fn append_nested_builds_objects() {
        let flow = flow_for(Method::GET, "/");
        flow.append_nested("templateData", "title", json!("Home"));
        flow.append_nested("templateData", "user", json!("admin"));
        assert_eq!(flow.get_nested("templateData", "title").unwrap(), "Home");
        assert_eq!(flow.get_nested("templateData", "user").unwrap(), "admin");

        // A scalar stored at the key is replaced by an object
        flow.set("meta", json!("scalar"));
        flow.append_nested("meta", "k", json!(1));
        assert_eq!(flow.get_nested("meta", "k").unwrap(), 1);
    }

    #[test]
    fn cookie_and_form_access() {
        let flow = flow_for(Method::POST, "/admin/login");
        assert_eq!(flow.cookie("Plinth_Auth").as_deref(), Some("abc123"));
        assert_eq!(flow.cookie("Missing"), None);
        assert_eq!(flow.form_value("username").as_deref(), Some("admin"));
        assert_eq!(flow.form_value("password").as_deref(), Some("secret"));
        assert_eq!(flow.form_value("nope"), None);
    }

    #[test]
    fn termination_flag() {
        let flow = flow_for(Method::GET, "/");
        assert!(!flow.is_terminated());
        flow.terminate();
        assert!(flow.is_terminated());
    }

    #[test]
    fn expire_cookie_zeroes_the_max_age() {
        let flow = flow_for(Method::GET, "/admin/logout");
        flow.expire_cookie("Plinth_Auth");
        let response = flow.to_response();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(cookie.starts_with("Plinth_Auth="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn query_is_exposed_raw() {
        let flow = flow_for(Method::GET, "/admin/docs?page=2&sort=asc");
        assert_eq!(flow.query(), Some("page=2&sort=asc"));
        assert_eq!(flow_for(Method::GET, "/admin/docs").query(), None);
    }

    #[test]
    fn redirect_commits_response() {
        let flow = flow_for(Method::GET, "/admin");
        assert!(!flow.is_committed());
        flow.redirect("/admin/login", StatusCode::FOUND);
        assert!(flow.is_committed());
        let response = flow.to_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/admin/login"
        );
    }
}
