//! Multipart/form-data and raw upload bodies. Because the reactor only
//! hands a request to the router once parsing reaches `ParseState::Complete`
//! (the whole body is already buffered), this works over a complete byte
//! slice rather than the source's incremental, read-driven state machine.

use std::path::{Path, PathBuf};

pub struct FilePart {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Pulls the `boundary=` parameter out of a `multipart/form-data; boundary=...`
/// Content-Type value, honoring an optionally-quoted value.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|segment| {
        let segment = segment.trim();
        segment
            .strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_by_delim<'a>(body: &'a [u8], delim: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut rest = body;
    while let Some(idx) = find_subsequence(rest, delim) {
        if idx > 0 || !parts.is_empty() {
            parts.push(&rest[..idx]);
        }
        rest = &rest[idx + delim.len()..];
    }
    parts.push(rest);
    parts
}

fn extract_filename(headers: &str) -> Option<String> {
    for line in headers.split("\r\n") {
        if line.to_ascii_lowercase().starts_with("content-disposition") {
            if let Some(start) = line.find("filename=\"") {
                let rest = &line[start + "filename=\"".len()..];
                if let Some(end) = rest.find('"') {
                    return Some(rest[..end].to_string());
                }
            }
        }
    }
    None
}

/// Strips any directory component a client-supplied filename might carry,
/// keeping only the basename.
pub fn sanitize_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| "upload".to_string())
}

/// Parses a complete multipart body and returns the first part carrying a
/// `filename` in its Content-Disposition header.
pub fn parse_first_file_part(body: &[u8], boundary: &str) -> Option<FilePart> {
    let delim = format!("--{}", boundary).into_bytes();
    for raw_part in split_by_delim(body, &delim) {
        let part = raw_part
            .strip_prefix(b"\r\n")
            .or_else(|| raw_part.strip_prefix(b"\n"))
            .unwrap_or(raw_part);
        if part.is_empty() || part.starts_with(b"--") {
            continue;
        }
        let Some(sep) = find_subsequence(part, b"\r\n\r\n") else {
            continue;
        };
        let headers_raw = &part[..sep];
        let mut content = &part[sep + 4..];
        if content.ends_with(b"\r\n") {
            content = &content[..content.len() - 2];
        }
        let headers = String::from_utf8_lossy(headers_raw);
        if let Some(filename) = extract_filename(&headers) {
            return Some(FilePart {
                filename: sanitize_filename(&filename),
                data: content.to_vec(),
            });
        }
    }
    None
}

/// Filesystem destination for a raw (non-multipart) upload body.
pub fn raw_upload_path(upload_store: &str, epoch_secs: u64) -> PathBuf {
    Path::new(upload_store).join(format!("upload_{}", epoch_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boundary_from_content_type() {
        assert_eq!(
            parse_boundary("multipart/form-data; boundary=----WebKitABC"),
            Some("----WebKitABC".to_string())
        );
        assert_eq!(
            parse_boundary("multipart/form-data; boundary=\"abc123\""),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn sanitizes_path_components_out_of_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("report.txt"), "report.txt");
    }

    #[test]
    fn extracts_first_file_part() {
        let boundary = "X";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
            b = boundary
        );
        let part = parse_first_file_part(body.as_bytes(), boundary).unwrap();
        assert_eq!(part.filename, "a.txt");
        assert_eq!(part.data, b"hello");
    }

    #[test]
    fn boundary_inside_file_bytes_does_not_confuse_split() {
        let boundary = "BOUND";
        let inner = b"data --BOUN not a real boundary-- more data";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"bin.dat\"\r\n\r\n",
        );
        body.extend_from_slice(inner);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        let part = parse_first_file_part(&body, boundary).unwrap();
        assert_eq!(part.data, inner);
    }
}
