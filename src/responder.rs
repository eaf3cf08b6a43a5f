//! Responder/ResponderContext traits, virtual-host resolution and dispatch.
//!
//! `ResponderList::attach` prepends each newly attached responder, so a
//! plain forward scan already visits the most recently attached one first
//! — no append-then-reverse needed.

use std::collections::HashMap;
use std::fmt;

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

pub trait ResponderContext: Send {
    /// Minimum delay, in milliseconds, between successive re-entries.
    /// Default zero: re-enter as soon as the worker gets back around to it.
    fn response_interval(&self) -> u64 {
        0
    }

    /// Returning `None` terminates the continuation. Returning `Some`
    /// replaces the current context (most responders return `self`-like
    /// state wrapped in a fresh box, but any context may be substituted).
    fn continue_response(
        &mut self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Option<Box<dyn ResponderContext>>;
}

pub trait Responder: Send + Sync {
    fn matches(&self, request: &HttpRequest) -> bool;

    fn respond(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Option<Box<dyn ResponderContext>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    NoVHost,
    NoResponder,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoVHost => write!(f, "no virtual host matched the request"),
            DispatchError::NoResponder => write!(f, "no responder matched the request"),
        }
    }
}

/// Responders in dispatch order (most-recently-attached first).
#[derive(Default)]
pub struct ResponderList(Vec<Box<dyn Responder>>);

impl ResponderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn attach(&mut self, responder: Box<dyn Responder>) {
        self.0.insert(0, responder);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn Responder>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Looks the lower-cased `Host` header up in `vhosts`; on a miss, falls
/// back to `default_root`. `None` means neither source resolved a root.
pub fn resolve_vhost(
    vhosts: &HashMap<String, String>,
    default_root: Option<&str>,
    host_header: Option<&str>,
) -> Option<String> {
    if let Some(host) = host_header {
        if let Some(root) = vhosts.get(&host.to_lowercase()) {
            return Some(root.clone());
        }
    }
    default_root.map(str::to_string)
}

/// Resolves the virtual host, then tries each responder in dispatch order.
/// Writes a 500 error page directly into `response` on a vhost or
/// responder miss instead of returning `Err`, since both outcomes are
/// connection-scoped and already fully handled once the error page is
/// written.
pub fn dispatch(
    responders: &ResponderList,
    vhosts: &HashMap<String, String>,
    default_root: Option<&str>,
    request: &mut HttpRequest,
    response: &mut HttpResponse,
) -> Option<Box<dyn ResponderContext>> {
    let host = request.headers.get("host").map(str::to_string);
    match resolve_vhost(vhosts, default_root, host.as_deref()) {
        Some(root) => request.vhost_root = root,
        None => {
            response.send_error_response(500, "No Virtual Host", "No virtual host matches this request.");
            return None;
        }
    }

    for responder in responders.iter() {
        if responder.matches(request) {
            return responder.respond(request, response);
        }
    }

    response.send_error_response(500, "No Responder", "No responder matches this request.");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl Responder for Echo {
        fn matches(&self, request: &HttpRequest) -> bool {
            request.path == "/echo"
        }
        fn respond(&self, _req: &HttpRequest, response: &mut HttpResponse) -> Option<Box<dyn ResponderContext>> {
            response.send_response(200, "OK", "text/plain", "echo");
            None
        }
    }

    struct Tag(&'static str);
    impl Responder for Tag {
        fn matches(&self, _request: &HttpRequest) -> bool {
            true
        }
        fn respond(&self, _req: &HttpRequest, response: &mut HttpResponse) -> Option<Box<dyn ResponderContext>> {
            response.send_response(200, "OK", "text/plain", self.0);
            None
        }
    }

    #[test]
    fn attach_prepends_so_latest_wins_first() {
        let mut list = ResponderList::new();
        list.attach(Box::new(Tag("a")));
        list.attach(Box::new(Tag("b")));
        list.attach(Box::new(Tag("c")));

        let vhosts = HashMap::new();
        let mut req = HttpRequest::new();
        req.headers.insert_first("host".to_string(), "x".to_string());
        let mut resp = HttpResponse::new();
        dispatch(&list, &vhosts, Some("/www"), &mut req, &mut resp);
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.ends_with('c'));
    }

    #[test]
    fn vhost_miss_without_default_emits_500() {
        let list = ResponderList::new();
        let vhosts = HashMap::new();
        let mut req = HttpRequest::new();
        req.headers.insert_first("host".to_string(), "anything".to_string());
        let mut resp = HttpResponse::new();
        dispatch(&list, &vhosts, None, &mut req, &mut resp);
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.contains("No Virtual Host"));
    }

    #[test]
    fn no_matching_responder_emits_500() {
        let mut list = ResponderList::new();
        list.attach(Box::new(Echo));
        let vhosts = HashMap::new();
        let mut req = HttpRequest::new();
        req.path = "/nope".to_string();
        req.headers.insert_first("host".to_string(), "a".to_string());
        let mut resp = HttpResponse::new();
        dispatch(&list, &vhosts, Some("/www"), &mut req, &mut resp);
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.contains("No Responder"));
    }

    #[test]
    fn matching_responder_handles_request() {
        let mut list = ResponderList::new();
        list.attach(Box::new(Echo));
        let vhosts = HashMap::new();
        let mut req = HttpRequest::new();
        req.path = "/echo".to_string();
        req.headers.insert_first("host".to_string(), "a".to_string());
        let mut resp = HttpResponse::new();
        dispatch(&list, &vhosts, Some("/www"), &mut req, &mut resp);
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.ends_with("echo"));
    }
}
