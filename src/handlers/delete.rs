use std::fs;

use crate::http::Response;

/// DELETE dispatch (spec §4.4.4 point 5 / §8 S4): 204 on success, 404 when
/// the target is missing, 500 when removal fails for any other reason.
pub fn handle_delete(full_path: &str) -> Response {
    match fs::metadata(full_path) {
        Err(_) => Response::new(404),
        Ok(_) => match fs::remove_file(full_path) {
            Ok(()) => Response::new(204),
            Err(_) => Response::new(500),
        },
    }
}
