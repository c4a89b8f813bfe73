//! Artifact sinks: screenshots, page captures, and generated reports.
//!
//! Everything lands under `<cwd>/browser-control/`. File names carry an
//! ISO-8601 timestamp (colons replaced by dashes so the names survive every
//! filesystem) plus a sanitized host component. Binary payloads arrive as
//! base-64 intermediates and are written as raw bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::error::ControlError;

pub mod har;

pub use har::{HarCapture, HarEntry};

/// Directory name under the working directory.
const ARTIFACT_ROOT: &str = "browser-control";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Screenshot,
    PageCapture,
    Report,
}

impl ArtifactKind {
    fn dir(self) -> &'static str {
        match self {
            Self::Screenshot => "screenshots",
            Self::PageCapture => "pagecache",
            Self::Report => "reports",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Screenshot => "png",
            Self::PageCapture => "html",
            Self::Report => "json",
        }
    }
}

/// Filesystem sink rooted at `<base>/browser-control/`.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted in the process working directory.
    pub fn in_cwd() -> Result<Self, ControlError> {
        let cwd = std::env::current_dir()
            .map_err(|err| ControlError::internal(format!("cannot resolve cwd: {err}")))?;
        Ok(Self::at(cwd))
    }

    #[must_use]
    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self {
            root: base.into().join(ARTIFACT_ROOT),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory for one artifact kind, created on demand.
    async fn dir_for(&self, kind: ArtifactKind) -> Result<PathBuf, ControlError> {
        let dir = self.root.join(kind.dir());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| ControlError::internal(format!("cannot create {dir:?}: {err}")))?;
        Ok(dir)
    }

    /// `2026-08-01T12-30-05Z_example.test.png`-style name for a capture of
    /// `source_url`, optionally overridden by a caller-supplied stem.
    #[must_use]
    pub fn file_name(kind: ArtifactKind, source_url: &str, stem: Option<&str>) -> String {
        let timestamp = Utc::now()
            .format("%Y-%m-%dT%H-%M-%S%.3fZ")
            .to_string()
            .replace(':', "-");
        let host = Url::parse(source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown-host".to_string());
        let host = sanitize_filename::sanitize(&host);
        match stem {
            Some(stem) => format!(
                "{timestamp}_{host}_{}.{}",
                sanitize_filename::sanitize(stem),
                kind.extension()
            ),
            None => format!("{timestamp}_{host}.{}", kind.extension()),
        }
    }

    /// Write raw bytes and return the absolute path.
    pub async fn write_bytes(
        &self,
        kind: ArtifactKind,
        source_url: &str,
        stem: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, ControlError> {
        let dir = self.dir_for(kind).await?;
        let path = dir.join(Self::file_name(kind, source_url, stem));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|err| ControlError::internal(format!("cannot create {path:?}: {err}")))?;
        file.write_all(bytes)
            .await
            .map_err(|err| ControlError::internal(format!("write to {path:?} failed: {err}")))?;
        debug!(?path, len = bytes.len(), "artifact written");
        Ok(path)
    }

    /// Decode a base-64 intermediate and store the raw bytes.
    pub async fn write_base64(
        &self,
        kind: ArtifactKind,
        source_url: &str,
        stem: Option<&str>,
        encoded: &str,
    ) -> Result<PathBuf, ControlError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|err| ControlError::validation("data", None, format!("invalid base64: {err}")))?;
        self.write_bytes(kind, source_url, stem, &bytes).await
    }

    pub async fn write_text(
        &self,
        kind: ArtifactKind,
        source_url: &str,
        stem: Option<&str>,
        text: &str,
    ) -> Result<PathBuf, ControlError> {
        self.write_bytes(kind, source_url, stem, text.as_bytes())
            .await
    }

    /// Cheap writability probe for the readiness check.
    pub async fn writable(&self) -> bool {
        let probe = self.root.join(".writable-probe");
        if tokio::fs::create_dir_all(&self.root).await.is_err() {
            return false;
        }
        match tokio::fs::write(&probe, b"ok").await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&probe).await;
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_carry_timestamp_and_sanitized_host() {
        let name =
            ArtifactStore::file_name(ArtifactKind::Screenshot, "https://ex\u{0}ample.test/x", None);
        assert!(name.ends_with(".png"));
        assert!(!name.contains(':'));
        assert!(!name.contains('\u{0}'));

        let named = ArtifactStore::file_name(
            ArtifactKind::Report,
            "https://example.test/",
            Some("seo/audit"),
        );
        assert!(named.contains("example.test"));
        assert!(!named.contains('/'));
        assert!(named.ends_with(".json"));
    }

    #[tokio::test]
    async fn base64_round_trips_to_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::at(dir.path());

        let payload = b"\x89PNG\r\n\x1a\nfake";
        let encoded = BASE64.encode(payload);
        let path = store
            .write_base64(
                ArtifactKind::Screenshot,
                "https://example.test/",
                Some("probe"),
                &encoded,
            )
            .await
            .unwrap();

        let on_disk = tokio::fs::read(&path).await.unwrap();
        assert_eq!(on_disk, payload);
        assert!(path.starts_with(dir.path().join("browser-control").join("screenshots")));
    }

    #[tokio::test]
    async fn writability_probe_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::at(dir.path());
        assert!(store.writable().await);
        assert!(!store.root().join(".writable-probe").exists());
    }
}
