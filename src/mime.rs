/// Extension → MIME type lookup. Falls back to `application/octet-stream`.
pub fn get_mime_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Renders a directory listing as a minimal HTML page: one anchor per entry,
/// relative to the request URL.
pub fn generate_autoindex(request_path: &str, entries: &[String]) -> String {
    let mut body = String::new();
    body.push_str("<html><head><title>Index of ");
    body.push_str(request_path);
    body.push_str("</title></head><body>\n<h1>Index of ");
    body.push_str(request_path);
    body.push_str("</h1>\n<ul>\n");
    if request_path != "/" {
        body.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for entry in entries {
        body.push_str(&format!("<li><a href=\"{0}\">{0}</a></li>\n", entry));
    }
    body.push_str("</ul>\n</body></html>\n");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_resolve() {
        assert_eq!(get_mime_type("index.html"), "text/html");
        assert_eq!(get_mime_type("style.css"), "text/css");
        assert_eq!(get_mime_type("photo.JPG"), "image/jpeg");
    }

    #[test]
    fn unknown_extension_falls_back() {
        assert_eq!(get_mime_type("archive.bin"), "application/octet-stream");
        assert_eq!(get_mime_type("noext"), "application/octet-stream");
    }

    #[test]
    fn autoindex_lists_entries() {
        let html = generate_autoindex("/files/", &["a.txt".to_string(), "b/".to_string()]);
        assert!(html.contains("a.txt"));
        assert!(html.contains("b/"));
        assert!(html.contains("../"));
    }
}
