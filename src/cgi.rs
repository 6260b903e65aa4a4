//! CGI/1.1 executor (spec §4.5). Spawns the script's interpreter with a
//! built environment block and two non-blocking pipes, and exposes
//! `on_readable`/`on_writable` so the reactor can pump the exchange across
//! multiple ticks instead of blocking the whole server on one child.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use mio::unix::pipe;

use crate::config::{LocationConfig, ServerConfig};
use crate::http::{Request, Response};
use crate::prelude::{
    CGI_TIMEOUT, GATEWAY_TIMEOUT, HTTP_FORBIDDEN, HTTP_INTERNAL_SERVER_ERROR, HTTP_NOT_FOUND,
    HTTP_OK, READ_BUF_SIZE,
};

pub enum CgiSpawnError {
    NotFound,
    NotExecutable,
    Io(io::Error),
}

impl CgiSpawnError {
    /// The response to send when a CGI request can't even be started.
    pub fn response(&self) -> Response {
        match self {
            CgiSpawnError::NotFound => Response::new(HTTP_NOT_FOUND),
            CgiSpawnError::NotExecutable => Response::new(HTTP_FORBIDDEN),
            CgiSpawnError::Io(_) => {
                let mut response = Response::new(HTTP_INTERNAL_SERVER_ERROR);
                response.set_body(b"Internal Server Error: CGI execution failed".to_vec());
                response
            }
        }
    }
}

pub enum CgiOutcome {
    Pending,
    Done(Response),
}

/// One in-flight CGI exchange: the child process plus the two ends of its
/// stdin/stdout pipes this side owns. `stdin` becomes `None` once the
/// request body has been fully written and the write end closed, which is
/// how the child sees EOF on its own stdin.
pub struct CgiHandle {
    child: Child,
    stdin: Option<pipe::Sender>,
    stdout: pipe::Receiver,
    request_body: Vec<u8>,
    written: usize,
    raw_output: Vec<u8>,
    started_at: Instant,
}

impl CgiHandle {
    pub fn stdin_source(&mut self) -> Option<&mut pipe::Sender> {
        self.stdin.as_mut()
    }

    pub fn stdout_source(&mut self) -> &mut pipe::Receiver {
        &mut self.stdout
    }

    pub fn wants_write(&self) -> bool {
        self.stdin.is_some()
    }

    pub fn timed_out(&self) -> bool {
        self.started_at.elapsed() > CGI_TIMEOUT
    }

    /// Drains as much of the request body into the child's stdin as the
    /// pipe accepts right now; closes stdin once the body is exhausted.
    pub fn on_writable(&mut self) -> io::Result<()> {
        loop {
            let Some(stdin) = self.stdin.as_mut() else {
                return Ok(());
            };
            if self.written >= self.request_body.len() {
                self.stdin = None;
                return Ok(());
            }
            match stdin.write(&self.request_body[self.written..]) {
                Ok(0) => {
                    self.stdin = None;
                    return Ok(());
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Drains available stdout into the output buffer; on EOF, reaps the
    /// child and parses the accumulated bytes into a Response.
    pub fn on_readable(&mut self) -> io::Result<CgiOutcome> {
        let mut chunk = [0u8; READ_BUF_SIZE];
        loop {
            match self.stdout.read(&mut chunk) {
                Ok(0) => return Ok(self.finish()),
                Ok(n) => self.raw_output.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(CgiOutcome::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn finish(&mut self) -> CgiOutcome {
        let exit = self.child.wait();
        if self.raw_output.is_empty() {
            if let Ok(status) = exit {
                if !status.success() {
                    let mut response = Response::new(HTTP_INTERNAL_SERVER_ERROR);
                    response.set_body(b"Internal Server Error: CGI execution failed".to_vec());
                    return CgiOutcome::Done(response);
                }
            }
        }
        CgiOutcome::Done(parse_cgi_output(&self.raw_output))
    }

    /// SIGKILLs the child, reaps it, and returns the 504 disposition.
    pub fn kill_on_timeout(&mut self) -> Response {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let mut response = Response::new(GATEWAY_TIMEOUT);
        response.keep_alive = false;
        response
    }
}

enum Invocation {
    Interpreter(String),
    Direct,
}

fn choose_invocation(location: &LocationConfig, script_path: &Path) -> Invocation {
    if !location.cgi_path.is_empty() {
        return Invocation::Interpreter(location.cgi_path.clone());
    }
    match script_path.extension().and_then(|e| e.to_str()) {
        Some("php") => Invocation::Interpreter("php-cgi".to_string()),
        Some("py") => Invocation::Interpreter("python3".to_string()),
        Some("pl") => Invocation::Interpreter("perl".to_string()),
        _ => Invocation::Direct,
    }
}

fn wants_script_arg(interpreter: &str) -> bool {
    Path::new(interpreter).file_name().and_then(|n| n.to_str()) != Some("php-cgi")
}

/// Spawns the interpreter (or the script directly) with stdin/stdout wired
/// to non-blocking pipes. Returns the handle with both ends still owned by
/// this process; the reactor drives `on_readable`/`on_writable` from here.
pub fn spawn(
    request: &Request,
    server: &ServerConfig,
    location: &LocationConfig,
    script_path: &str,
) -> Result<CgiHandle, CgiSpawnError> {
    let metadata = fs::metadata(script_path).map_err(|_| CgiSpawnError::NotFound)?;
    if !metadata.is_file() {
        return Err(CgiSpawnError::NotFound);
    }
    if metadata.permissions().mode() & 0o100 == 0 {
        return Err(CgiSpawnError::NotExecutable);
    }
    let absolute: PathBuf = fs::canonicalize(script_path).map_err(|_| CgiSpawnError::NotFound)?;
    let working_dir = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    let (program, script_arg) = match choose_invocation(location, &absolute) {
        Invocation::Direct => (absolute.to_string_lossy().to_string(), None),
        Invocation::Interpreter(bin) => {
            let arg = wants_script_arg(&bin).then(|| absolute.to_string_lossy().to_string());
            (bin, arg)
        }
    };

    let env = build_cgi_env(request, server, &absolute);

    let (parent_stdin, child_stdin) = pipe::new().map_err(CgiSpawnError::Io)?;
    let (child_stdout, parent_stdout) = pipe::new().map_err(CgiSpawnError::Io)?;

    let mut command = Command::new(&program);
    command.current_dir(&working_dir);
    if let Some(arg) = &script_arg {
        command.arg(arg);
    }
    command.env_clear();
    command.envs(env);
    command.stdin(Stdio::from(child_stdin));
    command.stdout(Stdio::from(child_stdout));
    command.stderr(Stdio::null());

    let child = command.spawn().map_err(CgiSpawnError::Io)?;

    Ok(CgiHandle {
        child,
        stdin: Some(parent_stdin),
        stdout: parent_stdout,
        request_body: request.body.clone(),
        written: 0,
        raw_output: Vec::new(),
        started_at: Instant::now(),
    })
}

fn build_cgi_env(
    request: &Request,
    server: &ServerConfig,
    script_path: &Path,
) -> std::collections::HashMap<String, String> {
    let mut env = std::collections::HashMap::new();
    env.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    env.insert("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string());
    env.insert(
        "REQUEST_METHOD".to_string(),
        request.method.as_str().to_string(),
    );
    env.insert("PATH_INFO".to_string(), request.path.clone());
    env.insert("SCRIPT_NAME".to_string(), request.path.clone());
    env.insert(
        "SCRIPT_FILENAME".to_string(),
        script_path.to_string_lossy().to_string(),
    );
    env.insert("QUERY_STRING".to_string(), request.query.clone());
    env.insert(
        "SERVER_NAME".to_string(),
        server
            .server_names
            .first()
            .cloned()
            .unwrap_or_else(|| server.host.clone()),
    );
    env.insert("SERVER_PORT".to_string(), server.port.to_string());
    env.insert("REDIRECT_STATUS".to_string(), "200".to_string());

    if let Some(content_type) = request.header("Content-Type") {
        env.insert("CONTENT_TYPE".to_string(), content_type.to_string());
    }
    if let Some(content_length) = request.header("Content-Length") {
        env.insert("CONTENT_LENGTH".to_string(), content_length.to_string());
    } else if !request.body.is_empty() {
        env.insert(
            "CONTENT_LENGTH".to_string(),
            request.body.len().to_string(),
        );
    }

    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("Content-Type") || name.eq_ignore_ascii_case("Content-Length")
        {
            continue;
        }
        let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
        env.insert(key, value.clone());
    }

    env
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits the earliest of `\r\n\r\n` or `\n\n`, whichever occurs first.
fn split_cgi_output(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = find_subsequence(raw, b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = find_subsequence(raw, b"\n\n").map(|pos| (pos, 2));
    let (pos, seplen) = match (crlf, lf) {
        (Some((c, _)), Some((l, lseplen))) if l < c => (l, lseplen),
        (Some((c, clen)), _) => (c, clen),
        (None, Some((l, llen))) => (l, llen),
        (None, None) => return None,
    };
    Some((&raw[..pos], &raw[pos + seplen..]))
}

/// Parses a CGI child's raw stdout per spec §4.5 step 8: header block up to
/// the first blank line sets status/headers, the remainder is the body. A
/// missing header block means the whole output is a 200 text/html body.
fn parse_cgi_output(raw: &[u8]) -> Response {
    let (header_block, body) = split_cgi_output(raw).unwrap_or((&[][..], raw));

    let mut status = HTTP_OK;
    let mut headers = Vec::new();
    for raw_line in header_block.split(|&b| b == b'\n') {
        let line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }
        let Ok(line) = std::str::from_utf8(line) else {
            continue;
        };
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("Status") {
            if let Some(code) = value.split_whitespace().next().and_then(|s| s.parse().ok()) {
                status = code;
            }
            continue;
        }
        headers.push((name.trim().to_string(), value.to_string()));
    }

    let mut response = Response::new(status);
    for (name, value) in headers {
        response.set_header(&name, value);
    }
    if !response.has_header("Content-Type") {
        response.set_header("Content-Type", "text/html");
    }
    response.set_body(body.to_vec());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocationConfig, ServerConfig};
    use std::fs;

    fn request_for(raw: &[u8]) -> Request {
        let mut req = Request::new(1_048_576, 8192);
        req.feed(raw);
        req
    }

    #[test]
    fn direct_invocation_for_unknown_extension() {
        let location = LocationConfig::default();
        match choose_invocation(&location, Path::new("/srv/bin/handler")) {
            Invocation::Direct => {}
            Invocation::Interpreter(_) => panic!("expected direct execution"),
        }
    }

    #[test]
    fn python_extension_picks_python3() {
        let location = LocationConfig::default();
        match choose_invocation(&location, Path::new("/srv/cgi-bin/env.py")) {
            Invocation::Interpreter(bin) => assert_eq!(bin, "python3"),
            Invocation::Direct => panic!("expected an interpreter"),
        }
    }

    #[test]
    fn explicit_cgi_path_overrides_extension() {
        let mut location = LocationConfig::default();
        location.cgi_path = "/usr/bin/ruby".to_string();
        match choose_invocation(&location, Path::new("/srv/cgi-bin/env.py")) {
            Invocation::Interpreter(bin) => assert_eq!(bin, "/usr/bin/ruby"),
            Invocation::Direct => panic!("expected an interpreter"),
        }
    }

    #[test]
    fn php_cgi_takes_no_script_argument() {
        assert!(!wants_script_arg("php-cgi"));
        assert!(!wants_script_arg("/usr/bin/php-cgi"));
        assert!(wants_script_arg("python3"));
    }

    #[test]
    fn env_includes_required_variables() {
        let request = request_for(b"GET /cgi/env.py?x=1 HTTP/1.1\r\nHost: h\r\nX-Custom: yes\r\n\r\n");
        let server = ServerConfig::default();
        let env = build_cgi_env(&request, &server, Path::new("/srv/cgi-bin/env.py"));
        assert_eq!(env.get("QUERY_STRING").map(String::as_str), Some("x=1"));
        assert_eq!(
            env.get("SCRIPT_FILENAME").map(String::as_str),
            Some("/srv/cgi-bin/env.py")
        );
        assert_eq!(env.get("SERVER_PORT").map(String::as_str), Some("8080"));
        assert_eq!(
            env.get("REDIRECT_STATUS").map(String::as_str),
            Some("200")
        );
        assert_eq!(env.get("GATEWAY_INTERFACE").map(String::as_str), Some("CGI/1.1"));
        assert_eq!(env.get("HTTP_X_CUSTOM").map(String::as_str), Some("yes"));
    }

    #[test]
    fn parses_status_and_headers_from_output() {
        let raw = b"Status: 302 Found\r\nLocation: /elsewhere\r\n\r\nbye";
        let response = parse_cgi_output(raw);
        assert_eq!(response.status, 302);
        assert!(response.has_header("Location"));
        assert_eq!(response.body, b"bye");
    }

    #[test]
    fn defaults_to_200_text_html_without_header_block() {
        let response = parse_cgi_output(b"just some bytes, no headers at all");
        assert_eq!(response.status, HTTP_OK);
        assert!(response.has_header("Content-Type"));
    }

    #[test]
    fn lf_only_terminator_is_also_accepted() {
        let raw = b"Content-Type: text/plain\n\nhello";
        let response = parse_cgi_output(raw);
        assert_eq!(response.body, b"hello");
        assert!(response.has_header("Content-Type"));
    }

    #[test]
    fn spawn_runs_a_real_script_and_collects_its_output() {
        let dir = std::env::temp_dir().join("originserv_cgi_test_spawn");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let script_path = dir.join("hello.sh");
        fs::write(
            &script_path,
            "#!/bin/sh\nprintf 'Content-Type: text/plain\\r\\n\\r\\nhi from cgi'\n",
        )
        .unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();

        let request = request_for(b"GET /cgi/hello.sh HTTP/1.1\r\nHost: h\r\n\r\n");
        let server = ServerConfig::default();
        let location = LocationConfig::default();
        let mut handle = spawn(&request, &server, &location, script_path.to_str().unwrap())
            .ok()
            .expect("spawn should succeed");

        // Drive the exchange synchronously for the test: no body to write,
        // so stdin closes immediately, then poll stdout until EOF.
        handle.on_writable().unwrap();
        assert!(!handle.wants_write());

        let mut response = None;
        for _ in 0..200 {
            match handle.on_readable() {
                Ok(CgiOutcome::Done(r)) => {
                    response = Some(r);
                    break;
                }
                Ok(CgiOutcome::Pending) => std::thread::sleep(std::time::Duration::from_millis(5)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(5))
                }
                Err(e) => panic!("unexpected read error: {}", e),
            }
        }
        let response = response.expect("cgi script should complete within the polling window");
        assert_eq!(response.status, HTTP_OK);
        assert_eq!(response.body, b"hi from cgi");
    }
}
