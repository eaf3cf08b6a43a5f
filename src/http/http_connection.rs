//! The per-connection parse-progress state machine: tracks a cumulative
//! byte count against an 8 KiB cap, switches behavior on state as lines
//! arrive, and on the POST blank-line transition synchronously feeds
//! whatever tail bytes remain in the line buffer as initial post-data
//! rather than waiting for another socket read. Post-data completion is an
//! exact `Content-Length` match; anything past that length is overflow.

use crate::connection::Connection;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

pub const MAX_REQUEST_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    AwaitingRequest,
    ReadingHeaders,
    ReadingPostData,
    ReceivedRequest,
    SendingResponse,
    Done,
}

pub struct HttpConnection {
    pub connection: Connection,
    pub request: HttpRequest,
    pub state: ConnState,
    line_buffer: Vec<u8>,
    bytes_read: usize,
    content_length: usize,
    post_buffer: Vec<u8>,
    error_output: Option<Vec<u8>>,
}

impl HttpConnection {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            request: HttpRequest::new(),
            state: ConnState::AwaitingRequest,
            line_buffer: Vec::new(),
            bytes_read: 0,
            content_length: 0,
            post_buffer: Vec::new(),
            error_output: None,
        }
    }

    /// Feeds freshly read bytes into the state machine. May transition the
    /// connection through several states (header parse, blank line,
    /// post-data completion) in a single call.
    pub fn on_read(&mut self, data: &[u8]) {
        self.bytes_read += data.len();
        if self.bytes_read > MAX_REQUEST_SIZE {
            xviweb_log::warn!("{}: request exceeded {} bytes, closing", self.connection.remote, MAX_REQUEST_SIZE);
            self.state = ConnState::Done;
            return;
        }

        match self.state {
            ConnState::ReadingPostData => self.feed_post_data(data),
            ConnState::Done | ConnState::ReceivedRequest | ConnState::SendingResponse => {}
            ConnState::AwaitingRequest | ConnState::ReadingHeaders => {
                self.line_buffer.extend_from_slice(data);
                self.drain_lines();
            }
        }
    }

    fn drain_lines(&mut self) {
        loop {
            let pos = match find_crlf(&self.line_buffer) {
                Some(p) => p,
                None => break,
            };
            let line: Vec<u8> = self.line_buffer.drain(..pos + 2).collect();
            let line = &line[..line.len() - 2];
            self.on_line(line);

            if self.state == ConnState::ReadingPostData {
                // Whatever is left in the line buffer at the header/body
                // boundary is the start of the post body; feed it now
                // rather than waiting for the next socket read.
                let remainder = std::mem::take(&mut self.line_buffer);
                self.feed_post_data(&remainder);
                break;
            }
            if self.state == ConnState::Done || self.state == ConnState::ReceivedRequest {
                break;
            }
        }
    }

    fn on_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line).into_owned();
        match self.state {
            ConnState::AwaitingRequest => match self.request.parse_request_line(&text) {
                Ok(()) => self.state = ConnState::ReadingHeaders,
                Err(_) => self.fail_with_bad_request(),
            },
            ConnState::ReadingHeaders => {
                if text.is_empty() {
                    self.end_of_headers();
                } else if self.request.parse_header_line(&text).is_err() {
                    self.fail_with_bad_request();
                }
            }
            _ => {}
        }
    }

    fn end_of_headers(&mut self) {
        use crate::http::request::Method;
        if self.request.method == Method::Post {
            self.content_length = self
                .request
                .headers
                .get("content-length")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            self.state = ConnState::ReadingPostData;
        } else {
            self.state = ConnState::ReceivedRequest;
        }
    }

    fn feed_post_data(&mut self, data: &[u8]) {
        self.post_buffer.extend_from_slice(data);
        if self.post_buffer.len() == self.content_length {
            let body = String::from_utf8_lossy(&self.post_buffer).into_owned();
            self.request.parse_post_data(&body);
            self.state = ConnState::ReceivedRequest;
        } else if self.post_buffer.len() > self.content_length {
            self.fail_with_bad_request();
        }
    }

    fn fail_with_bad_request(&mut self) {
        let mut response = HttpResponse::new();
        response.send_error_response(400, "Bad Request", "Your request could not be understood.");
        self.error_output = Some(response.take_output());
        self.state = ConnState::Done;
    }

    /// Bytes a parse failure already produced (a canned 400 page) that the
    /// worker must flush before tearing the connection down.
    pub fn take_error_output(&mut self) -> Option<Vec<u8>> {
        self.error_output.take()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::clock::test_support::FakeClock;
    use mio::net::TcpListener;
    use std::net::TcpStream as StdTcpStream;

    fn make_connection() -> (HttpConnection, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server_stream, remote) = loop {
            match listener.accept() {
                Ok(pair) => break pair,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => panic!("{e}"),
            }
        };
        let clock = FakeClock::new(0);
        let conn = Connection::new(server_stream, Address::from_ip(remote.ip()), remote.port(), &clock);
        (HttpConnection::new(conn), client)
    }

    #[test]
    fn get_request_reaches_received_request_with_no_skipped_states() {
        let (mut http, _client) = make_connection();
        assert_eq!(http.state, ConnState::AwaitingRequest);
        http.on_read(b"GET /hello HTTP/1.1\r\n");
        assert_eq!(http.state, ConnState::ReadingHeaders);
        http.on_read(b"Host: a\r\n\r\n");
        assert_eq!(http.state, ConnState::ReceivedRequest);
    }

    #[test]
    fn malformed_request_line_produces_400_and_done() {
        let (mut http, _client) = make_connection();
        http.on_read(b"BOGUS\r\n");
        assert_eq!(http.state, ConnState::Done);
        let out = http.take_error_output().expect("expected a canned error page");
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn post_with_trailing_body_in_header_chunk_completes_in_one_call() {
        let (mut http, _client) = make_connection();
        http.on_read(b"POST /p HTTP/1.1\r\nHost: a\r\nContent-Length: 7\r\n\r\nx=1&y=2");
        assert_eq!(http.state, ConnState::ReceivedRequest);
        assert_eq!(http.request.post_data.get("y"), Some("2"));
    }

    #[test]
    fn post_body_split_across_reads_still_completes() {
        let (mut http, _client) = make_connection();
        http.on_read(b"POST /p HTTP/1.1\r\nHost: a\r\nContent-Length: 7\r\n\r\nx=1&");
        assert_eq!(http.state, ConnState::ReadingPostData);
        http.on_read(b"y=2");
        assert_eq!(http.state, ConnState::ReceivedRequest);
        assert_eq!(http.request.post_data.get("y"), Some("2"));
    }

    #[test]
    fn post_with_zero_content_length_reaches_received_request_immediately() {
        let (mut http, _client) = make_connection();
        http.on_read(b"POST /p HTTP/1.1\r\nHost: a\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(http.state, ConnState::ReceivedRequest);
    }

    #[test]
    fn post_body_overflow_is_rejected() {
        let (mut http, _client) = make_connection();
        http.on_read(b"POST /p HTTP/1.1\r\nHost: a\r\nContent-Length: 2\r\n\r\ntoolong");
        assert_eq!(http.state, ConnState::Done);
        assert!(http.take_error_output().is_some());
    }

    #[test]
    fn oversized_request_is_dropped_without_a_reply() {
        let (mut http, _client) = make_connection();
        let huge = vec![b'a'; MAX_REQUEST_SIZE + 1];
        http.on_read(&huge);
        assert_eq!(http.state, ConnState::Done);
        assert!(http.take_error_output().is_none());
    }
}
