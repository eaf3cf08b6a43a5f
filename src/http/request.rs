//! Request-line, header-line and post-data parsing, fed incrementally into
//! a growing `HttpRequest` through three entry points. Key/value lists
//! (query string, post data) insert without overwriting, so the first
//! occurrence of a name wins; the request line splits on the first two
//! spaces and rejects a target not starting with `/`; a header line splits
//! on the first `:` with the value starting two characters past it.

use std::collections::HashMap;
use std::fmt;

/// Case-insensitive, first-write-wins map used for request headers, query
/// parameters and post-data fields. Distinct from the response header map,
/// which is case-sensitive and last-write-wins (see `http::response`).
#[derive(Debug, Default, Clone)]
pub struct CaseInsensitiveMap(HashMap<String, String>);

impl CaseInsensitiveMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Inserts only if the (lower-cased) key is absent. Returns whether the
    /// insert took effect.
    pub fn insert_first(&mut self, key: String, value: String) -> bool {
        let key = key.to_lowercase();
        if self.0.contains_key(&key) {
            false
        } else {
            self.0.insert(key, value);
            true
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
    Put,
    Delete,
    /// The original never validates the verb at parse time; rejecting an
    /// unrecognized one is a responder/route concern, not the parser's.
    Other(String),
}

impl Default for Method {
    fn default() -> Self {
        Method::Other(String::new())
    }
}

impl Method {
    fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Head => write!(f, "HEAD"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
            Method::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    MalformedRequestLine,
    MalformedHeader,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedRequestLine => write!(f, "malformed request line"),
            ParseError::MalformedHeader => write!(f, "malformed header line"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub query: CaseInsensitiveMap,
    pub headers: CaseInsensitiveMap,
    pub post_data: CaseInsensitiveMap,
    pub vhost_root: String,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits on the first two spaces into verb, target, version. Rejects
    /// an empty verb, a missing target, a target not starting with `/`, or
    /// a missing second space separator. An empty version after a present
    /// separator (e.g. a trailing space with nothing after it) is accepted.
    pub fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let line = line.trim_end_matches('\r');
        let mut parts = line.splitn(3, ' ');
        let verb = parts.next().unwrap_or("");
        let target = parts.next().unwrap_or("");
        let version = match parts.next() {
            Some(v) => v,
            None => return Err(ParseError::MalformedRequestLine),
        };

        if verb.is_empty() || target.is_empty() || !target.starts_with('/') {
            return Err(ParseError::MalformedRequestLine);
        }

        self.method = Method::parse(verb);
        self.version = version.to_string();

        match target.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                parse_kv_list(query, &mut self.query);
            }
            None => {
                self.path = target.to_string();
            }
        }
        Ok(())
    }

    /// Splits on the first `:`. The value begins two characters past the
    /// colon (skipping the mandatory space); the remainder is stored
    /// verbatim, undecoded, under the lower-cased name.
    pub fn parse_header_line(&mut self, line: &str) -> Result<(), ParseError> {
        let line = line.trim_end_matches('\r');
        let colon = line.find(':').ok_or(ParseError::MalformedHeader)?;
        if colon == 0 {
            return Err(ParseError::MalformedHeader);
        }
        let name = &line[..colon];
        let value_start = (colon + 2).min(line.len());
        let value = &line[value_start..];
        self.headers.insert_first(name.to_string(), value.to_string());
        Ok(())
    }

    /// Parsed identically to a query string.
    pub fn parse_post_data(&mut self, body: &str) {
        parse_kv_list(body, &mut self.post_data);
    }
}

/// Parses a `&`-separated list of `name=value` pairs into `map`. Each name
/// and value is url-decoded; the name is lower-cased by `insert_first`.
/// Pairs without `=` are discarded. First occurrence of a name wins.
fn parse_kv_list(s: &str, map: &mut CaseInsensitiveMap) {
    for pair in s.split('&') {
        if pair.is_empty() {
            continue;
        }
        if let Some((name, value)) = pair.split_once('=') {
            map.insert_first(url_decode(name), url_decode(value));
        }
    }
}

/// `+` becomes space, `%HH` becomes the byte with hex value `HH`. A
/// trailing `%` or `%H` with fewer than two hex digits remaining is left
/// untouched and the decoder advances past the lone `%`.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = &bytes[i + 1..i + 3];
                match std::str::from_utf8(hex).ok().and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get_request_line() {
        let mut req = HttpRequest::new();
        req.parse_request_line("GET /hello HTTP/1.1").unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/hello");
        assert_eq!(req.version, "HTTP/1.1");
    }

    #[test]
    fn rejects_path_without_leading_slash() {
        let mut req = HttpRequest::new();
        assert_eq!(
            req.parse_request_line("GET hello HTTP/1.1"),
            Err(ParseError::MalformedRequestLine)
        );
    }

    #[test]
    fn rejects_bogus_line() {
        let mut req = HttpRequest::new();
        assert!(req.parse_request_line("BOGUS").is_err());
    }

    #[test]
    fn accepts_empty_version_when_separator_present() {
        let mut req = HttpRequest::new();
        req.parse_request_line("GET /path ").unwrap();
        assert_eq!(req.path, "/path");
        assert_eq!(req.version, "");
    }

    #[test]
    fn rejects_missing_version_separator() {
        let mut req = HttpRequest::new();
        assert_eq!(
            req.parse_request_line("GET /path"),
            Err(ParseError::MalformedRequestLine)
        );
    }

    #[test]
    fn splits_query_string_and_keeps_first_occurrence() {
        let mut req = HttpRequest::new();
        req.parse_request_line("GET /s?a=1&b=2&a=3 HTTP/1.1").unwrap();
        assert_eq!(req.path, "/s");
        assert_eq!(req.query.get("a"), Some("1"));
        assert_eq!(req.query.get("b"), Some("2"));
    }

    #[test]
    fn header_value_starts_two_chars_past_colon() {
        let mut req = HttpRequest::new();
        req.parse_header_line("Host: example.com").unwrap();
        assert_eq!(req.headers.get("host"), Some("example.com"));
        assert_eq!(req.headers.get("HOST"), Some("example.com"));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let mut req = HttpRequest::new();
        assert!(req.parse_header_line("NoColonHere").is_err());
    }

    #[test]
    fn first_header_occurrence_wins() {
        let mut req = HttpRequest::new();
        req.parse_header_line("X-Thing: first").unwrap();
        req.parse_header_line("X-Thing: second").unwrap();
        assert_eq!(req.headers.get("x-thing"), Some("first"));
    }

    #[test]
    fn url_decode_handles_plus_and_percent() {
        assert_eq!(url_decode("a+b%20c"), "a b c");
    }

    #[test]
    fn url_decode_leaves_truncated_escape_untouched() {
        assert_eq!(url_decode("abc%"), "abc%");
        assert_eq!(url_decode("abc%2"), "abc%2");
    }

    #[test]
    fn url_decode_is_idempotent_without_escapes() {
        let s = "plain-text-value";
        assert_eq!(url_decode(s), s);
    }

    #[test]
    fn post_data_parses_like_query_string() {
        let mut req = HttpRequest::new();
        req.parse_post_data("x=1&y=2");
        assert_eq!(req.post_data.get("y"), Some("2"));
    }
}
