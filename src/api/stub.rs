//! In-process stub backend.
//!
//! Serves the §api surface from mutable in-memory fixtures so the demo
//! binary and the integration tests can run the full console loop without a
//! real detector. Fixtures can be swapped at runtime; registration posts are
//! recorded for inspection.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::DetectionPayload;
use crate::telemetry::Roster;

const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct RegistrationRecord {
    pub id: String,
    pub category: String,
    pub file_bytes: usize,
}

#[derive(Default)]
struct StubState {
    frame_jpeg: Vec<u8>,
    detections: DetectionPayload,
    roster: Roster,
    registrations: Vec<RegistrationRecord>,
    fail_detections: bool,
}

#[derive(Default)]
pub struct StubBackend {
    state: Arc<Mutex<StubState>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind and serve on a background thread. Use `127.0.0.1:0` to let the
    /// OS pick a free port.
    pub fn spawn(self, addr: &str) -> Result<StubHandle> {
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = self.state.clone();
        let state_thread = state.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = serve(listener, state_thread, shutdown_thread) {
                log::error!("stub backend stopped: {}", err);
            }
        });

        Ok(StubHandle {
            addr,
            state,
            shutdown,
            join: Some(join),
        })
    }
}

pub struct StubHandle {
    pub addr: SocketAddr,
    state: Arc<Mutex<StubState>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StubHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_frame_jpeg(&self, bytes: Vec<u8>) {
        lock_state(&self.state).frame_jpeg = bytes;
    }

    pub fn set_detections(&self, payload: DetectionPayload) {
        lock_state(&self.state).detections = payload;
    }

    pub fn set_roster(&self, roster: Roster) {
        lock_state(&self.state).roster = roster;
    }

    /// Make `/api/detections` answer 500 until cleared, for exercising the
    /// stale-but-valid poll policy.
    pub fn set_detections_failing(&self, failing: bool) {
        lock_state(&self.state).fail_detections = failing;
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        lock_state(&self.state).registrations.clone()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stub backend thread panicked"))?;
        }
        Ok(())
    }
}

fn lock_state(state: &Mutex<StubState>) -> std::sync::MutexGuard<'_, StubState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn serve(
    listener: TcpListener,
    state: Arc<Mutex<StubState>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &state) {
                    log::debug!("stub backend request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &Arc<Mutex<StubState>>) -> Result<()> {
    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("GET", "/api/frame.jpg") => {
            let frame = lock_state(state).frame_jpeg.clone();
            if frame.is_empty() {
                write_response(&mut stream, 204, "image/jpeg", &[])
            } else {
                write_response(&mut stream, 200, "image/jpeg", &frame)
            }
        }
        ("GET", "/api/detections") => {
            let (payload, failing) = {
                let state = lock_state(state);
                (state.detections.clone(), state.fail_detections)
            };
            if failing {
                return write_json_response(&mut stream, 500, r#"{"error":"detector_offline"}"#);
            }
            let body = serde_json::to_string(&payload)?;
            write_json_response(&mut stream, 200, &body)
        }
        ("GET", "/api/soldiers") => {
            let roster = lock_state(state).roster.clone();
            let body = serde_json::to_string(&roster)?;
            write_json_response(&mut stream, 200, &body)
        }
        ("POST", "/api/register-face") => {
            let record = parse_registration(&request)?;
            lock_state(state).registrations.push(record);
            write_json_response(&mut stream, 200, r#"{"status":"registered"}"#)
        }
        ("GET", _) => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        _ => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
    }
}

fn parse_registration(request: &HttpRequest) -> Result<RegistrationRecord> {
    let content_type = request
        .headers
        .get("content-type")
        .ok_or_else(|| anyhow!("missing content-type"))?;
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .ok_or_else(|| anyhow!("missing multipart boundary"))?
        .trim();

    let mut record = RegistrationRecord::default();
    for part in split_multipart(&request.body, boundary) {
        let Some(header_end) = find_subslice(part, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&part[..header_end]);
        let content = &part[header_end + 4..];
        let Some(name) = part_name(&headers) else {
            continue;
        };
        match name.as_str() {
            "id" => record.id = String::from_utf8_lossy(content).to_string(),
            "category" => record.category = String::from_utf8_lossy(content).to_string(),
            "file" => record.file_bytes = content.len(),
            _ => {}
        }
    }
    if record.id.is_empty() {
        return Err(anyhow!("registration missing id field"));
    }
    Ok(record)
}

/// Part bodies between `--boundary` markers, trailing CRLF stripped.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let marker = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();
    let mut offset = 0;
    let mut starts = Vec::new();
    while let Some(found) = find_subslice(&body[offset..], &marker) {
        starts.push(offset + found);
        offset += found + marker.len();
    }
    for pair in starts.windows(2) {
        let start = pair[0] + marker.len();
        let mut end = pair[1];
        if body[start..end].starts_with(b"--") {
            break;
        }
        if end >= 2 && &body[end - 2..end] == b"\r\n" {
            end -= 2;
        }
        let part = &body[start..end];
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        parts.push(part);
    }
    parts
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn part_name(headers: &str) -> Option<String> {
    for line in headers.lines() {
        if !line.to_lowercase().starts_with("content-disposition") {
            continue;
        }
        for attr in line.split(';') {
            let attr = attr.trim();
            if let Some(value) = attr.strip_prefix("name=") {
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    None
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            match find_subslice(&data, b"\r\n\r\n") {
                Some(end) => break end,
                None => return Err(anyhow!("connection closed mid-request")),
            }
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(end) = find_subslice(&data, b"\r\n\r\n") {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|value| value.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    // One request per connection; ureq must not try to reuse the socket.
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multipart_registration() {
        let boundary = "b0undary";
        let body = crate::api::multipart_body(
            boundary,
            &[("id", "S1"), ("category", "criminal")],
            ("file", "face.jpg", b"IMAGE"),
        );
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            format!("multipart/form-data; boundary={}", boundary),
        );
        let request = HttpRequest {
            method: "POST".to_string(),
            path: "/api/register-face".to_string(),
            headers,
            body,
        };

        let record = parse_registration(&request).unwrap();
        assert_eq!(record.id, "S1");
        assert_eq!(record.category, "criminal");
        assert_eq!(record.file_bytes, 5);
    }

    #[test]
    fn find_subslice_behaves() {
        assert_eq!(find_subslice(b"abcdef", b"cd"), Some(2));
        assert_eq!(find_subslice(b"abcdef", b"xy"), None);
        assert_eq!(find_subslice(b"ab", b"abcd"), None);
    }
}
