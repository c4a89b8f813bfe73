//! HAR-shaped model for network captures.
//!
//! The browser-side capture hook records fetch/XHR traffic as flat entries;
//! this module gives them a stable serialized shape. Round-tripping a
//! capture through serde preserves the request set: count, URLs, methods,
//! statuses, and sizes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarEntry {
    pub started: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub request_body_size: u64,
    #[serde(default)]
    pub response_body_size: u64,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarCapture {
    pub version: String,
    pub creator: String,
    pub started: DateTime<Utc>,
    pub page_url: String,
    pub entries: Vec<HarEntry>,
}

impl HarCapture {
    #[must_use]
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            version: "1.2".to_string(),
            creator: concat!("browser-control/", env!("CARGO_PKG_VERSION")).to_string(),
            started: Utc::now(),
            page_url: page_url.into(),
            entries: Vec::new(),
        }
    }

    /// Build a capture from the raw rows the browser-side hook collected.
    /// Malformed rows are skipped rather than failing the capture.
    #[must_use]
    pub fn from_hook_rows(page_url: impl Into<String>, rows: &Value) -> Self {
        let mut capture = Self::new(page_url);
        let Some(rows) = rows.as_array() else {
            return capture;
        };
        for row in rows {
            let Some(url) = row.get("url").and_then(Value::as_str) else {
                continue;
            };
            capture.entries.push(HarEntry {
                started: row
                    .get("started")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(Utc::now),
                method: row
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or("GET")
                    .to_uppercase(),
                url: url.to_string(),
                status: row
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(0),
                request_body_size: row
                    .get("requestBodySize")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                response_body_size: row
                    .get("responseBodySize")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                duration_ms: row
                    .get("durationMs")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                resource_type: row
                    .get("resourceType")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                error: row.get("error").and_then(Value::as_str).map(str::to_string),
            });
        }
        capture
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn total_response_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.response_body_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_round_trip_preserves_the_request_set() {
        let mut capture = HarCapture::new("https://example.test/");
        capture.entries.push(HarEntry {
            started: Utc::now(),
            method: "GET".into(),
            url: "https://example.test/app.js".into(),
            status: 200,
            request_body_size: 0,
            response_body_size: 48_211,
            duration_ms: 12.5,
            resource_type: Some("script".into()),
            error: None,
        });
        capture.entries.push(HarEntry {
            started: Utc::now(),
            method: "POST".into(),
            url: "https://example.test/api/search".into(),
            status: 503,
            request_body_size: 88,
            response_body_size: 512,
            duration_ms: 230.0,
            resource_type: Some("fetch".into()),
            error: Some("service unavailable".into()),
        });

        let wire = serde_json::to_string(&capture).unwrap();
        let back: HarCapture = serde_json::from_str(&wire).unwrap();

        assert_eq!(back.len(), capture.len());
        for (a, b) in capture.entries.iter().zip(back.entries.iter()) {
            assert_eq!(a.url, b.url);
            assert_eq!(a.method, b.method);
            assert_eq!(a.status, b.status);
            assert_eq!(a.response_body_size, b.response_body_size);
        }
    }

    #[test]
    fn hook_rows_tolerate_partial_garbage() {
        let rows = json!([
            { "url": "https://example.test/a.css", "method": "get", "status": 200 },
            { "nonsense": true },
            { "url": "https://example.test/b.png", "status": 404, "responseBodySize": 10 }
        ]);
        let capture = HarCapture::from_hook_rows("https://example.test/", &rows);
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.entries[0].method, "GET");
        assert_eq!(capture.entries[1].status, 404);
        assert_eq!(capture.total_response_bytes(), 10);
    }
}
