use std::fmt;

/// HTTP methods the dispatcher knows how to route. Anything else parses fine
/// but dispatch answers 501 for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
    Other(String),
}

impl Method {
    fn parse(raw: &str) -> Method {
        match raw {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "DELETE" => Method::Delete,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    ChunkedSize,
    ChunkedData,
    ChunkedEnd,
    Complete,
    Error,
}

/// An in-progress or completed HTTP/1.1 request, plus the byte-driven parser
/// state needed to assemble it incrementally across multiple socket reads.
/// The parser never discards unconsumed buffer prefix: `cursor` marks how
/// far into `buf` we've consumed, and we compact the two back to zero only
/// at state boundaries where it's free to do so.
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,

    pub state: ParseState,
    pub error_status: u16,

    buf: Vec<u8>,
    cursor: usize,
    header_bytes_seen: usize,

    pub content_length: Option<usize>,
    pub chunk_size: usize,
    pub chunked: bool,
    pub error: bool,

    max_body_size: usize,
    max_header_section: usize,
}

impl Request {
    pub fn new(max_body_size: usize, max_header_section: usize) -> Self {
        Request {
            method: Method::Other(String::new()),
            uri: String::new(),
            version: String::new(),
            path: String::new(),
            query: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
            state: ParseState::RequestLine,
            error_status: 400,
            buf: Vec::new(),
            cursor: 0,
            header_bytes_seen: 0,
            content_length: None,
            chunk_size: 0,
            chunked: false,
            error: false,
            max_body_size,
            max_header_section,
        }
    }

    /// Resets this struct so the same Connection can parse the next
    /// pipelined/keep-alive request without reallocating buffers. Any bytes
    /// already read past the end of this request (pipelined ahead of it)
    /// carry over and are parsed immediately.
    pub fn reset(&mut self) {
        let max_body_size = self.max_body_size;
        let max_header_section = self.max_header_section;
        let leftover = std::mem::take(&mut self.buf);
        *self = Request::new(max_body_size, max_header_section);
        self.buf = leftover;
        self.advance();
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn fail(&mut self, status: u16) {
        self.state = ParseState::Error;
        self.error = true;
        self.error_status = status;
    }

    /// Appends newly-read bytes and drives the state machine as far as it
    /// will go without further input.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.advance();
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buf.drain(0..self.cursor);
            self.cursor = 0;
        }
    }

    /// Total request-line + header bytes seen so far, including ones
    /// already consumed and compacted out of `buf`. Checked against
    /// `max_header_section` instead of `remaining().len()` alone so the cap
    /// is cumulative across however many `feed()` calls the section arrives in.
    fn header_section_len(&self) -> usize {
        self.header_bytes_seen + self.remaining().len()
    }

    /// Advances the cursor past a consumed request-line/header line and
    /// counts its bytes toward the cumulative header-section cap.
    fn consume_line(&mut self, len: usize) {
        self.cursor += len;
        self.header_bytes_seen += len;
    }

    fn advance(&mut self) {
        loop {
            match self.state {
                ParseState::RequestLine => {
                    if !self.try_parse_request_line() {
                        break;
                    }
                }
                ParseState::Headers => {
                    if !self.try_parse_headers() {
                        break;
                    }
                }
                ParseState::Body => {
                    if !self.try_parse_body() {
                        break;
                    }
                }
                ParseState::ChunkedSize => {
                    if !self.try_parse_chunk_size() {
                        break;
                    }
                }
                ParseState::ChunkedData => {
                    if !self.try_parse_chunk_data() {
                        break;
                    }
                }
                ParseState::ChunkedEnd => {
                    if !self.try_parse_chunked_end() {
                        break;
                    }
                }
                ParseState::Complete | ParseState::Error => break,
            }
        }
        self.compact();
    }

    fn try_parse_request_line(&mut self) -> bool {
        if self.header_section_len() > self.max_header_section {
            self.fail(414);
            return true;
        }
        let Some(idx) = find_crlf(self.remaining()) else {
            return false;
        };
        let line = &self.remaining()[..idx];
        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                self.consume_line(idx + 2);
                self.fail(400);
                return true;
            }
        };
        let mut parts = line.splitn(3, ' ');
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(u), Some(v)) if !m.is_empty() && !u.is_empty() && !v.is_empty() => {
                (m, u, v)
            }
            _ => {
                self.consume_line(idx + 2);
                self.fail(400);
                return true;
            }
        };
        if uri.len() > self.max_header_section {
            self.consume_line(idx + 2);
            self.fail(414);
            return true;
        }
        self.method = Method::parse(method);
        self.uri = uri.to_string();
        self.version = version.to_string();
        match uri.split_once('?') {
            Some((p, q)) => {
                self.path = p.to_string();
                self.query = q.to_string();
            }
            None => {
                self.path = uri.to_string();
                self.query = String::new();
            }
        }
        self.consume_line(idx + 2);
        self.state = ParseState::Headers;
        true
    }

    fn try_parse_headers(&mut self) -> bool {
        if self.header_section_len() > self.max_header_section {
            self.fail(400);
            return true;
        }
        let Some(idx) = find_crlf(self.remaining()) else {
            return false;
        };
        let line = &self.remaining()[..idx];
        if line.is_empty() {
            self.consume_line(idx + 2);
            self.finish_headers();
            return true;
        }
        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                self.consume_line(idx + 2);
                self.fail(400);
                return true;
            }
        };
        match line.split_once(':') {
            Some((name, value)) => {
                self.headers
                    .push((name.to_string(), value.trim_matches([' ', '\t']).to_string()));
            }
            None => {
                self.consume_line(idx + 2);
                self.fail(400);
                return true;
            }
        }
        self.consume_line(idx + 2);
        true
    }

    fn finish_headers(&mut self) {
        self.header_bytes_seen = 0;
        let chunked = self
            .header("Transfer-Encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        if chunked {
            self.chunked = true;
            self.state = ParseState::ChunkedSize;
            return;
        }
        if let Some(raw) = self.header("Content-Length") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n <= self.max_body_size => {
                    self.content_length = Some(n);
                    self.state = ParseState::Body;
                }
                Ok(_) => self.fail(413),
                Err(_) => self.fail(400),
            }
            return;
        }
        self.state = ParseState::Complete;
    }

    fn try_parse_body(&mut self) -> bool {
        let need = self.content_length.unwrap_or(0) - self.body.len();
        if need == 0 {
            self.state = ParseState::Complete;
            return true;
        }
        let take = need.min(self.remaining().len());
        if take == 0 {
            return false;
        }
        self.body.extend_from_slice(&self.remaining()[..take]);
        self.cursor += take;
        if self.body.len() == self.content_length.unwrap_or(0) {
            self.state = ParseState::Complete;
        }
        true
    }

    fn try_parse_chunk_size(&mut self) -> bool {
        let Some(idx) = find_crlf(self.remaining()) else {
            return false;
        };
        let line = &self.remaining()[..idx];
        let line = String::from_utf8_lossy(line);
        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = match usize::from_str_radix(size_str, 16) {
            Ok(n) => n,
            Err(_) => {
                self.cursor += idx + 2;
                self.fail(400);
                return true;
            }
        };
        self.cursor += idx + 2;
        if self.body.len() + size > self.max_body_size {
            self.fail(413);
            return true;
        }
        self.chunk_size = size;
        self.state = if size == 0 {
            ParseState::ChunkedEnd
        } else {
            ParseState::ChunkedData
        };
        true
    }

    fn try_parse_chunk_data(&mut self) -> bool {
        let needed = self.chunk_size + 2; // data + trailing CRLF
        if self.remaining().len() < needed {
            return false;
        }
        self.body
            .extend_from_slice(&self.remaining()[..self.chunk_size]);
        self.cursor += needed;
        self.state = ParseState::ChunkedSize;
        true
    }

    fn try_parse_chunked_end(&mut self) -> bool {
        // Trailer lines (ignored) terminated by a final empty line.
        let Some(idx) = find_crlf(self.remaining()) else {
            return false;
        };
        if idx == 0 {
            self.cursor += 2;
            self.state = ParseState::Complete;
        } else {
            self.cursor += idx + 2;
        }
        true
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"GET /index.html HTTP/1.1\r\nHost: h\r\n\r\n");
        assert_eq!(req.state, ParseState::Complete);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.header("Host"), Some("h"));
    }

    #[test]
    fn splits_query_string() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"GET /cgi/env.py?x=1 HTTP/1.1\r\nHost: h\r\n\r\n");
        assert_eq!(req.path, "/cgi/env.py");
        assert_eq!(req.query, "x=1");
    }

    #[test]
    fn handles_byte_at_a_time_feed() {
        let mut req = Request::new(1024, 8192);
        let raw = b"GET / HTTP/1.1\r\nHost: h\r\n\r\n";
        for b in raw {
            req.feed(&[*b]);
        }
        assert_eq!(req.state, ParseState::Complete);
    }

    #[test]
    fn parses_content_length_body() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(req.state, ParseState::Complete);
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn body_over_limit_is_413() {
        let mut req = Request::new(4, 8192);
        req.feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(req.state, ParseState::Error);
        assert_eq!(req.error_status, 413);
    }

    #[test]
    fn parses_chunked_body() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n");
        assert_eq!(req.state, ParseState::Complete);
        assert_eq!(req.body, b"Hello World");
    }

    #[test]
    fn chunked_matches_content_length_equivalent() {
        let mut cl = Request::new(1024, 8192);
        cl.feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 11\r\n\r\nHello World");
        let mut chunked = Request::new(1024, 8192);
        chunked.feed(b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\nB\r\nHello World\r\n0\r\n\r\n");
        assert_eq!(cl.body, chunked.body);
    }

    #[test]
    fn malformed_request_line_is_error() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"GARBAGE\r\n\r\n");
        assert_eq!(req.state, ParseState::Error);
    }

    #[test]
    fn reset_carries_over_a_pipelined_request() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"GET /first HTTP/1.1\r\nHost: h\r\n\r\nGET /second HTTP/1.1\r\nHost: h\r\n\r\n");
        assert_eq!(req.state, ParseState::Complete);
        assert_eq!(req.path, "/first");
        req.reset();
        assert_eq!(req.state, ParseState::Complete);
        assert_eq!(req.path, "/second");
    }

    #[test]
    fn header_split_across_reads() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"GET / HTTP/1.1\r\nHo");
        req.feed(b"st: h\r\n\r\n");
        assert_eq!(req.state, ParseState::Complete);
        assert_eq!(req.header("Host"), Some("h"));
    }

    #[test]
    fn header_cap_is_cumulative_across_feed_calls() {
        let mut req = Request::new(1024, 8192);
        req.feed(b"GET / HTTP/1.1\r\n");
        let mut lines = String::new();
        for _ in 0..2000 {
            lines.push_str("A: 1\r\n");
        }
        let (first, second) = lines.split_at(lines.len() / 2);
        req.feed(first.as_bytes());
        assert_eq!(req.state, ParseState::Headers, "should not fail on first half alone");
        req.feed(second.as_bytes());
        assert_eq!(req.state, ParseState::Error);
        assert_eq!(req.error_status, 400);
    }
}
