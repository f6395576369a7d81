//! Backend HTTP surface.
//!
//! The console depends on four collaborator-owned endpoints:
//! - `GET /api/frame.jpg?ts=<cache-buster>` -> current frame JPEG
//! - `GET /api/detections` -> detection payload JSON
//! - `GET /api/soldiers` -> telemetry roster JSON
//! - `POST /api/register-face` -> multipart `id`/`category`/`file`
//!
//! The client is responsible for:
//! - Cache-defeating frame fetches (a `ts` value distinct per tick)
//! - Decoding JSON payloads into the crate's wire types
//! - Building the multipart registration body
//!
//! The client MUST NOT:
//! - Retry out of band (the next scheduled tick is the retry)
//! - Surface poll failures to the operator

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

use crate::detect::{Category, DetectionPayload};
use crate::telemetry::Roster;

pub mod stub;

const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Produces frame-fetch `ts` values that are guaranteed distinct from the
/// previous tick's even when the wall clock has not advanced.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: u64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        self.last = now_ms.max(self.last + 1);
        self.last
    }
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    base: Url,
    agent: ureq::Agent,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).context("parse backend base url")?;
        Ok(Self {
            base,
            agent: ureq::agent(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("join backend endpoint {}", path))
    }

    pub fn health(&self) -> Result<()> {
        let url = self.endpoint("/api/health")?;
        self.agent
            .get(url.as_str())
            .call()
            .context("probe backend health")?;
        Ok(())
    }

    /// Fetch the current frame. An empty body (e.g. 204, no frame yet) is a
    /// failed load; the previous frame stays displayed until the next tick.
    pub fn fetch_frame(&self, cache_buster: u64) -> Result<Vec<u8>> {
        let url = self.endpoint("/api/frame.jpg")?;
        let response = self
            .agent
            .get(url.as_str())
            .query("ts", &cache_buster.to_string())
            .call()
            .context("fetch frame")?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_FRAME_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read frame body")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty frame body"));
        }
        Ok(bytes)
    }

    pub fn fetch_detections(&self) -> Result<DetectionPayload> {
        let url = self.endpoint("/api/detections")?;
        let body = self
            .agent
            .get(url.as_str())
            .call()
            .context("fetch detections")?
            .into_string()
            .context("read detections body")?;
        serde_json::from_str(&body).context("decode detections payload")
    }

    pub fn fetch_soldiers(&self) -> Result<Roster> {
        let url = self.endpoint("/api/soldiers")?;
        let body = self
            .agent
            .get(url.as_str())
            .call()
            .context("fetch soldiers")?
            .into_string()
            .context("read soldiers body")?;
        serde_json::from_str(&body).context("decode soldier roster")
    }

    /// Submit one registration as a single multipart request. Only the HTTP
    /// status is relied upon; the response body is opaque.
    pub fn register_face(
        &self,
        id: &str,
        category: Category,
        filename: &str,
        image: &[u8],
    ) -> Result<()> {
        let url = self.endpoint("/api/register-face")?;
        let boundary = format!("watchpost-{:016x}", rand::thread_rng().gen::<u64>());
        let body = multipart_body(
            &boundary,
            &[("id", id), ("category", category.wire_name())],
            ("file", filename, image),
        );
        self.agent
            .post(url.as_str())
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .context("submit face registration")?;
        Ok(())
    }
}

pub(crate) fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: (&str, &str, &[u8]),
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    let (file_name, filename, bytes) = file;
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            file_name, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
