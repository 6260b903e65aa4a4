//! Dispatch (spec §4.4.4): once a location has been selected, this resolves
//! redirects, method allow-lists, path traversal, CGI routing, and finally
//! the per-method handler. CGI is routed back out to the caller as a
//! `Dispatch::Cgi` variant because spawning and pump-driving the child is a
//! reactor-integrated, multi-tick affair (§4.5), not a single synchronous
//! call like the other methods.

use crate::config::{LocationConfig, ServerConfig};
use crate::handlers::{handle_delete, handle_get, handle_upload};
use crate::http::{error_response, Method, Request, Response};
use crate::router::find_location;

pub enum Dispatch {
    Response(Response),
    Cgi {
        full_path: String,
        location: LocationConfig,
    },
}

pub fn dispatch(request: &Request, server: &ServerConfig) -> Dispatch {
    let Some(location) = find_location(&server.locations, &request.path) else {
        return Dispatch::Response(error_response(404, &server.error_pages));
    };

    if !location.redirect.is_empty() {
        let mut response = Response::new(301);
        response.set_header("Location", location.redirect.clone());
        return Dispatch::Response(response);
    }

    if !location.method_allowed(request.method.as_str()) {
        let mut response = error_response(405, &server.error_pages);
        response.set_header("Allow", allow_header(location));
        return Dispatch::Response(response);
    }

    if !path_is_safe(&request.path) {
        return Dispatch::Response(error_response(403, &server.error_pages));
    }

    let full_path = resolve_full_path(location, &request.path);

    if location.is_cgi_target(&full_path) {
        return Dispatch::Cgi {
            full_path,
            location: location.clone(),
        };
    }

    let response = match &request.method {
        Method::Get => handle_get(&full_path, &request.path, location),
        Method::Post => handle_upload(request, location),
        Method::Delete => handle_delete(&full_path),
        Method::Other(_) => error_response(501, &server.error_pages),
    };

    // Swap in the server's configured error page for non-2xx/3xx responses
    // produced by handlers, which only know bare status codes.
    let response = if response.status >= 400 && response.body.is_empty() {
        let mut with_page = error_response(response.status, &server.error_pages);
        for (name, value) in response.headers {
            with_page.set_header(&name, value);
        }
        with_page
    } else {
        response
    };

    Dispatch::Response(response)
}

fn allow_header(location: &LocationConfig) -> String {
    location.methods.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn path_is_safe(path: &str) -> bool {
    !path.contains("..") && !path.contains('\0')
}

fn resolve_full_path(location: &LocationConfig, request_path: &str) -> String {
    let suffix = request_path
        .strip_prefix(location.path.as_str())
        .unwrap_or(request_path);
    let root = location.root.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", root, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::fs;

    fn temp_root(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("originserv_dispatch_test_{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.to_str().unwrap().to_string()
    }

    fn request_for(raw: &[u8]) -> Request {
        let mut req = Request::new(1_048_576, 8192);
        req.feed(raw);
        req
    }

    #[test]
    fn serves_index_for_minimal_get() {
        let root = temp_root("s1");
        fs::write(format!("{}/index.html", root), "hi\n").unwrap();
        let server = ServerConfig {
            locations: vec![LocationConfig {
                path: "/".to_string(),
                root,
                ..LocationConfig::default()
            }],
            ..ServerConfig::default()
        };
        let req = request_for(b"GET / HTTP/1.1\r\nHost: 127.0.0.1:8080\r\n\r\n");
        match dispatch(&req, &server) {
            Dispatch::Response(r) => {
                assert_eq!(r.status, 200);
                assert_eq!(r.body, b"hi\n");
            }
            Dispatch::Cgi { .. } => panic!("expected a direct response"),
        }
    }

    #[test]
    fn path_traversal_is_403() {
        let server = ServerConfig {
            locations: vec![LocationConfig {
                path: "/".to_string(),
                root: temp_root("traversal"),
                ..LocationConfig::default()
            }],
            ..ServerConfig::default()
        };
        let req = request_for(b"GET /../etc/passwd HTTP/1.1\r\nHost: h\r\n\r\n");
        match dispatch(&req, &server) {
            Dispatch::Response(r) => assert_eq!(r.status, 403),
            Dispatch::Cgi { .. } => panic!("expected a direct response"),
        }
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let mut location = LocationConfig {
            path: "/".to_string(),
            root: temp_root("method"),
            ..LocationConfig::default()
        };
        location.methods.insert("GET".to_string());
        let server = ServerConfig {
            locations: vec![location],
            ..ServerConfig::default()
        };
        let req = request_for(b"DELETE / HTTP/1.1\r\nHost: h\r\n\r\n");
        match dispatch(&req, &server) {
            Dispatch::Response(r) => {
                assert_eq!(r.status, 405);
                assert!(r.has_header("Allow"));
            }
            Dispatch::Cgi { .. } => panic!("expected a direct response"),
        }
    }

    #[test]
    fn redirect_short_circuits_dispatch() {
        let server = ServerConfig {
            locations: vec![LocationConfig {
                path: "/old".to_string(),
                root: temp_root("redirect"),
                redirect: "/new".to_string(),
                ..LocationConfig::default()
            }],
            ..ServerConfig::default()
        };
        let req = request_for(b"GET /old HTTP/1.1\r\nHost: h\r\n\r\n");
        match dispatch(&req, &server) {
            Dispatch::Response(r) => {
                assert_eq!(r.status, 301);
                assert_eq!(r.headers[0].1, "/new");
            }
            Dispatch::Cgi { .. } => panic!("expected a direct response"),
        }
    }

    #[test]
    fn cgi_extension_routes_to_cgi() {
        let mut location = LocationConfig {
            path: "/cgi".to_string(),
            root: temp_root("cgi"),
            ..LocationConfig::default()
        };
        location.cgi_extensions.insert(".py".to_string());
        let server = ServerConfig {
            locations: vec![location],
            ..ServerConfig::default()
        };
        let req = request_for(b"GET /cgi/env.py?x=1 HTTP/1.1\r\nHost: h\r\n\r\n");
        match dispatch(&req, &server) {
            Dispatch::Cgi { full_path, .. } => assert!(full_path.ends_with("env.py")),
            Dispatch::Response(_) => panic!("expected CGI routing"),
        }
    }

    #[test]
    fn unknown_location_is_404() {
        let server = ServerConfig::default();
        let req = request_for(b"GET /nope HTTP/1.1\r\nHost: h\r\n\r\n");
        match dispatch(&req, &server) {
            Dispatch::Response(r) => assert_eq!(r.status, 404),
            Dispatch::Cgi { .. } => panic!("expected a direct response"),
        }
    }
}
