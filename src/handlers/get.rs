use std::fs;
use std::path::Path;

use crate::config::LocationConfig;
use crate::http::Response;
use crate::mime::{generate_autoindex, get_mime_type};

/// GET dispatch (spec §4.4.4 point 5): directories redirect to a trailing
/// slash, then try the location's index file, then autoindex, then 403.
/// Files are served with a Content-Type derived from their extension.
pub fn handle_get(full_path: &str, request_path: &str, location: &LocationConfig) -> Response {
    let metadata = match fs::metadata(full_path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Response::new(404),
        Err(_) => return Response::new(403),
    };

    if metadata.is_dir() {
        if !request_path.ends_with('/') {
            let mut response = Response::new(301);
            response.set_header("Location", format!("{}/", request_path));
            return response;
        }
        let index_path = Path::new(full_path).join(&location.index);
        if let Ok(body) = fs::read(&index_path) {
            let mut response = Response::new(200);
            response.set_header("Content-Type", get_mime_type(&location.index));
            response.set_body(body);
            return response;
        }
        if location.autoindex {
            let entries = list_dir(full_path);
            let mut response = Response::new(200);
            response.set_header("Content-Type", "text/html");
            response.set_body(generate_autoindex(request_path, &entries).into_bytes());
            return response;
        }
        return Response::new(403);
    }

    match fs::read(full_path) {
        Ok(body) => {
            let mut response = Response::new(200);
            response.set_header("Content-Type", get_mime_type(full_path));
            response.set_body(body);
            response
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Response::new(403),
        Err(_) => Response::new(404),
    }
}

fn list_dir(full_path: &str) -> Vec<String> {
    let mut entries: Vec<String> = fs::read_dir(full_path)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    if e.path().is_dir() {
                        format!("{}/", name)
                    } else {
                        name
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("originserv_get_test_{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn serves_static_file() {
        let dir = temp_dir("static_file");
        fs::write(dir.join("hi.txt"), "hi\n").unwrap();
        let location = LocationConfig::default();
        let response = handle_get(dir.join("hi.txt").to_str().unwrap(), "/hi.txt", &location);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hi\n");
    }

    #[test]
    fn missing_file_is_404() {
        let location = LocationConfig::default();
        let response = handle_get("/does/not/exist", "/does/not/exist", &location);
        assert_eq!(response.status, 404);
    }

    #[test]
    fn directory_without_trailing_slash_redirects() {
        let dir = temp_dir("redirect");
        let location = LocationConfig::default();
        let response = handle_get(dir.to_str().unwrap(), "/sub", &location);
        assert_eq!(response.status, 301);
        assert_eq!(response.headers[0].1, "/sub/");
    }

    #[test]
    fn directory_with_index_serves_index() {
        let dir = temp_dir("with_index");
        fs::write(dir.join("index.html"), "hello").unwrap();
        let location = LocationConfig::default();
        let response = handle_get(dir.to_str().unwrap(), "/sub/", &location);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn directory_without_index_and_no_autoindex_is_403() {
        let dir = temp_dir("no_index");
        let location = LocationConfig::default();
        let response = handle_get(dir.to_str().unwrap(), "/sub/", &location);
        assert_eq!(response.status, 403);
    }

    #[test]
    fn directory_with_autoindex_lists_entries() {
        let dir = temp_dir("autoindex");
        fs::write(dir.join("a.txt"), "a").unwrap();
        let mut location = LocationConfig::default();
        location.autoindex = true;
        let response = handle_get(dir.to_str().unwrap(), "/sub/", &location);
        assert_eq!(response.status, 200);
        assert!(String::from_utf8_lossy(&response.body).contains("a.txt"));
    }
}
