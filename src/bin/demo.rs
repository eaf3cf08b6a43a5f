//! Minimal runnable wiring: a couple of demonstration responders plus a
//! real accept loop. Not part of the library surface.

use std::env;

use mio::Poll;

use xviweb::config::AppConfig;
use xviweb::http::request::HttpRequest;
use xviweb::http::response::HttpResponse;
use xviweb::responder::{Responder, ResponderContext};
use xviweb::server::Server;

struct HelloResponder;

impl Responder for HelloResponder {
    fn matches(&self, request: &HttpRequest) -> bool {
        request.path == "/hello"
    }

    fn respond(&self, _request: &HttpRequest, response: &mut HttpResponse) -> Option<Box<dyn ResponderContext>> {
        response.send_response(200, "OK", "text/plain", "hi");
        None
    }
}

/// Emits `.` three times, 200ms apart, demonstrating a streaming
/// continuation that paces itself with `response_interval`.
struct TickResponder;

struct TickContext {
    remaining: u32,
}

impl Responder for TickResponder {
    fn matches(&self, request: &HttpRequest) -> bool {
        request.path == "/tick"
    }

    fn respond(&self, _request: &HttpRequest, response: &mut HttpResponse) -> Option<Box<dyn ResponderContext>> {
        response.set_status(200, "OK");
        response.set_content_type("text/plain");
        Some(Box::new(TickContext { remaining: 3 }))
    }
}

impl ResponderContext for TickContext {
    fn response_interval(&self) -> u64 {
        200
    }

    fn continue_response(
        &mut self,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Option<Box<dyn ResponderContext>> {
        response.send_string(".");
        self.remaining -= 1;
        if self.remaining == 0 {
            response.end_response();
            None
        } else {
            Some(Box::new(TickContext { remaining: self.remaining }))
        }
    }
}

fn main() -> xviweb::error::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let poll = Poll::new()?;
    let responders: Vec<Box<dyn Responder>> = vec![Box::new(HelloResponder), Box::new(TickResponder)];
    let mut server = Server::new(config, responders, &poll)?;
    server.run(poll)
}
