//! Deferred-commit response builder. The constructor sets status 200/"OK",
//! a `Server: xviweb` header and `Content-Type: text/html` up front, all
//! overwritable until commit; `set_header` finds-and-replaces an existing
//! entry (last write wins, case preserved as written); error responses are
//! built from an exact canned HTML template. Output bytes are buffered
//! internally and handed to the caller via `take_output` rather than
//! written straight to a socket, which keeps this type from needing to
//! borrow its owning connection (see DESIGN.md for the tradeoff).

const DEFAULT_SERVER_HEADER: &str = concat!("xviweb/", env!("CARGO_PKG_VERSION"));

const ERROR_PAGE_TEMPLATE: &str = "<!DOCTYPE html>\r\n\
<html lang=\"en\">\r\n\
<head>\r\n\
<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\r\n\
<title>{code} {desc}</title>\r\n\
<style type=\"text/css\">\r\n\
body { margin: 0; background-color: white; color: black; font-family: Arial, Helvetica, sans-serif; }\r\n\
h1 { margin: 0; padding: 0.5em; background-color: #dedede; color: inherit; text-shadow: gray 1px 1px 4px; }\r\n\
p { margin: 0.5em; }\r\n\
</style>\r\n\
</head>\r\n\
<body>\r\n\
\r\n\
<h1>{desc}</h1>\r\n\
<p>{message}</p>\r\n\
\r\n\
</body>\r\n\
</html>\r\n";

#[derive(Debug)]
pub struct HttpResponse {
    status_code: u16,
    status_message: String,
    headers: Vec<(String, String)>,
    committed: bool,
    done: bool,
    out: Vec<u8>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        let mut headers = Vec::new();
        headers.push(("Server".to_string(), DEFAULT_SERVER_HEADER.to_string()));
        headers.push(("Content-Type".to_string(), "text/html".to_string()));
        Self {
            status_code: 200,
            status_message: "OK".to_string(),
            headers,
            committed: false,
            done: false,
            out: Vec::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn set_status(&mut self, code: u16, message: &str) {
        if self.committed {
            return;
        }
        self.status_code = code;
        self.status_message = message.to_string();
    }

    /// Overwrites an existing header with the same name (case-sensitive as
    /// written), or appends a new entry. A no-op once committed.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if self.committed {
            return;
        }
        if let Some(entry) = self.headers.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header("Content-Type", content_type);
    }

    pub fn set_content_length(&mut self, len: usize) {
        self.set_header("Content-Length", &len.to_string());
    }

    fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_message).as_bytes(),
        );
        for (name, value) in &self.headers {
            self.out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        self.out.extend_from_slice(b"\r\n");
        self.committed = true;
    }

    /// Commits (if not already committed) and appends raw bytes to the
    /// output buffer.
    pub fn send_string(&mut self, s: &str) {
        self.commit();
        self.out.extend_from_slice(s.as_bytes());
    }

    pub fn send_line(&mut self, s: &str) {
        self.send_string(s);
        self.out.extend_from_slice(b"\r\n");
    }

    pub fn send_response(&mut self, code: u16, message: &str, content_type: &str, content: &str) {
        self.set_status(code, message);
        self.set_content_type(content_type);
        self.set_content_length(content.len());
        self.send_string(content);
        self.end_response();
    }

    /// Builds the canned HTML error page (byte-exact, CRLF line endings)
    /// and sends it as the response body.
    pub fn send_error_response(&mut self, code: u16, desc: &str, message: &str) {
        let page = ERROR_PAGE_TEMPLATE
            .replacen("{code}", &code.to_string(), 1)
            .replace("{desc}", desc)
            .replace("{message}", message);
        self.send_response(code, desc, "text/html", &page);
    }

    /// Commits if not yet committed, then marks the response done. The
    /// worker observes `is_done()` to drive the owning connection to DONE.
    pub fn end_response(&mut self) {
        self.commit();
        self.done = true;
    }

    /// Drains whatever bytes have accumulated since the last flush, for the
    /// worker to write to the socket.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_200_ok_with_server_and_content_type() {
        let mut resp = HttpResponse::new();
        resp.send_string("");
        let out = resp.take_output();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Server: xviweb/"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn header_writes_are_noop_after_commit() {
        let mut resp = HttpResponse::new();
        resp.send_string("body");
        resp.set_header("X-Late", "nope");
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(!out.contains("X-Late"));
    }

    #[test]
    fn send_response_sets_status_type_and_length() {
        let mut resp = HttpResponse::new();
        resp.send_response(200, "OK", "text/plain", "hi");
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.contains("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Type: text/plain\r\n"));
        assert!(out.contains("Content-Length: 2\r\n"));
        assert!(out.ends_with("hi"));
        assert!(resp.is_done());
    }

    #[test]
    fn error_response_embeds_code_desc_and_message() {
        let mut resp = HttpResponse::new();
        resp.send_error_response(400, "Bad Request", "Your request could not be understood.");
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.contains("<title>400 Bad Request</title>"));
        assert!(out.contains("<h1>Bad Request</h1>"));
        assert!(out.contains("<p>Your request could not be understood.</p>"));
        assert!(out.ends_with("</html>\r\n"));
        assert!(resp.is_done());
    }

    #[test]
    fn repeated_header_write_overwrites_previous_value() {
        let mut resp = HttpResponse::new();
        resp.set_header("X-Thing", "first");
        resp.set_header("X-Thing", "second");
        resp.send_string("");
        let out = String::from_utf8(resp.take_output()).unwrap();
        assert!(out.contains("X-Thing: second"));
        assert!(!out.contains("X-Thing: first"));
    }
}
