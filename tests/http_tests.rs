use originserv::http::{Method, ParseState, Request};

fn parsed(raw: &[u8]) -> Request {
    let mut req = Request::new(1_048_576, 8192);
    req.feed(raw);
    req
}

#[test]
fn parses_a_simple_get_request() {
    let req = parsed(b"GET /index.html?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(req.state, ParseState::Complete);
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.path, "/index.html");
    assert_eq!(req.query, "x=1");
    assert_eq!(req.header("Host"), Some("localhost"));
}

#[test]
fn fragmented_request_line_and_headers_assemble_across_feeds() {
    let mut req = Request::new(1_048_576, 8192);
    req.feed(b"GET /path ");
    assert_eq!(req.state, ParseState::RequestLine);
    req.feed(b"HTTP/1.1\r\n");
    assert_eq!(req.state, ParseState::Headers);
    req.feed(b"Host: example.com\r\n");
    assert_eq!(req.state, ParseState::Headers);
    req.feed(b"\r\n");
    assert_eq!(req.state, ParseState::Complete);
    assert_eq!(req.path, "/path");
}

#[test]
fn content_length_body_is_collected() {
    let req = parsed(b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello");
    assert_eq!(req.state, ParseState::Complete);
    assert_eq!(req.body, b"hello");
}

#[test]
fn chunked_body_is_decoded_and_reassembled() {
    let raw = b"POST /submit HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
    let req = parsed(raw);
    assert_eq!(req.state, ParseState::Complete);
    assert_eq!(req.body, b"Wikipedia");
}

#[test]
fn chunked_body_arriving_one_byte_at_a_time_still_decodes() {
    let raw = b"POST /submit HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
    let mut req = Request::new(1_048_576, 8192);
    for byte in raw {
        req.feed(&[*byte]);
    }
    assert_eq!(req.state, ParseState::Complete);
    assert_eq!(req.body, b"abc");
}

#[test]
fn oversized_request_line_is_rejected_with_414() {
    let mut raw = b"GET /".to_vec();
    raw.extend(std::iter::repeat(b'a').take(9 * 1024));
    raw.extend_from_slice(b" HTTP/1.1\r\nHost: h\r\n\r\n");
    let req = parsed(&raw);
    assert_eq!(req.state, ParseState::Error);
    assert_eq!(req.error_status, 414);
}

#[test]
fn body_over_the_configured_cap_is_rejected() {
    let mut req = Request::new(4, 8192);
    req.feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\n0123456789");
    assert_eq!(req.state, ParseState::Error);
}
