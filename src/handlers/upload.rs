use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LocationConfig;
use crate::http::{Request, Response};
use crate::upload::{parse_boundary, parse_first_file_part, raw_upload_path};

/// POST dispatch (spec §4.4.4 point 5 / §8 S2): multipart uploads save the
/// first file part and redirect 303; urlencoded bodies get a 200 echo page;
/// anything else is stored raw under `upload_store/upload_<epoch>`.
pub fn handle_upload(request: &Request, location: &LocationConfig) -> Response {
    if location.upload_store.is_empty() {
        return Response::new(403);
    }
    let content_type = request.header("Content-Type").unwrap_or("");

    if content_type.to_ascii_lowercase().starts_with("multipart/form-data") {
        let Some(boundary) = parse_boundary(content_type) else {
            return Response::new(400);
        };
        let Some(part) = parse_first_file_part(&request.body, &boundary) else {
            return Response::new(400);
        };
        let dest = Path::new(&location.upload_store).join(&part.filename);
        if fs::write(&dest, &part.data).is_err() {
            return Response::new(500);
        }
        let mut response = Response::new(303);
        response.set_header("Location", "/sucessupload.html");
        return response;
    }

    if content_type
        .to_ascii_lowercase()
        .starts_with("application/x-www-form-urlencoded")
    {
        let mut response = Response::new(200);
        response.set_header("Content-Type", "text/html");
        response.set_body(
            format!(
                "<html><body><h1>Upload received</h1><pre>{}</pre></body></html>",
                String::from_utf8_lossy(&request.body)
            )
            .into_bytes(),
        );
        return response;
    }

    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let dest = raw_upload_path(&location.upload_store, epoch);
    if fs::write(&dest, &request.body).is_err() {
        return Response::new(500);
    }
    let mut response = Response::new(303);
    response.set_header("Location", "/sucessupload.html");
    response
}
