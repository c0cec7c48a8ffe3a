use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::ReaderConfig;
use crate::error::ReaderError;

/// Revocable reference to a prepared download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactHandle(u64);

/// Bytes offered to the user as a file.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadArtifact {
    pub handle: ArtifactHandle,
    pub bytes: Vec<u8>,
    pub suggested_name: String,
    pub mime_type: String,
}

/// File extension for a recorder MIME type. Parameters such as
/// `;codecs=opus` are ignored; unknown types map to `webm`.
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/webm" => "webm",
        "audio/mp4" => "m4a",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        _ => "webm",
    }
}

/// Filename-safe preview of the first `max_chars` characters of `text`.
///
/// Keeps letters, digits and `_` from any script; drops everything else,
/// whitespace included.
pub fn sanitize_preview(text: &str, max_chars: usize) -> String {
    text.trim()
        .chars()
        .take(max_chars)
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Turns finished recordings into named downloads and tracks their lifetime.
///
/// Every prepared artifact stays registered until it is released, either
/// explicitly or by [`release_expired`](Self::release_expired) once the
/// release delay has passed, giving the user's download time to start.
pub struct DownloadPackager {
    prefix: String,
    preview_chars: usize,
    preview_fallback: String,
    release_delay: Duration,
    next_handle: u64,
    outstanding: Vec<(ArtifactHandle, Instant)>,
}

impl DownloadPackager {
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            prefix: config.filename_prefix.clone(),
            preview_chars: config.preview_chars,
            preview_fallback: config.preview_fallback.clone(),
            release_delay: config.release_delay(),
            next_handle: 1,
            outstanding: Vec::new(),
        }
    }

    /// Package `bytes` using the current wall-clock time.
    pub fn prepare(
        &mut self,
        bytes: Vec<u8>,
        mime_type: &str,
        text_preview: &str,
    ) -> Result<DownloadArtifact, ReaderError> {
        self.prepare_at(bytes, mime_type, text_preview, Utc::now(), Instant::now())
    }

    /// Package `bytes`, stamping the name with `timestamp` and scheduling the
    /// release relative to `now`.
    pub fn prepare_at(
        &mut self,
        bytes: Vec<u8>,
        mime_type: &str,
        text_preview: &str,
        timestamp: DateTime<Utc>,
        now: Instant,
    ) -> Result<DownloadArtifact, ReaderError> {
        if bytes.is_empty() {
            return Err(ReaderError::NoArtifact);
        }

        let handle = ArtifactHandle(self.next_handle);
        self.next_handle += 1;
        self.outstanding.push((handle, now + self.release_delay));

        let suggested_name = self.suggested_name(mime_type, text_preview, timestamp);
        log::info!(
            "Prepared download {suggested_name} ({} bytes, {mime_type})",
            bytes.len()
        );

        Ok(DownloadArtifact {
            handle,
            bytes,
            suggested_name,
            mime_type: mime_type.to_string(),
        })
    }

    /// `{prefix}-{preview}-{timestamp}.{ext}`
    pub fn suggested_name(
        &self,
        mime_type: &str,
        text_preview: &str,
        timestamp: DateTime<Utc>,
    ) -> String {
        let mut preview = sanitize_preview(text_preview, self.preview_chars);
        if preview.is_empty() {
            preview = self.preview_fallback.clone();
        }
        format!(
            "{}-{}-{}.{}",
            self.prefix,
            preview,
            timestamp.format("%Y%m%dT%H%M%S"),
            extension_for(mime_type)
        )
    }

    /// Release a handle now. Returns `false` if it was already released.
    pub fn release(&mut self, handle: ArtifactHandle) -> bool {
        let before = self.outstanding.len();
        self.outstanding.retain(|(h, _)| *h != handle);
        before != self.outstanding.len()
    }

    /// Release every handle whose delay has elapsed at `now`.
    pub fn release_expired(&mut self, now: Instant) -> Vec<ArtifactHandle> {
        let (expired, live): (Vec<_>, Vec<_>) = self
            .outstanding
            .drain(..)
            .partition(|(_, deadline)| *deadline <= now);
        self.outstanding = live;

        if !expired.is_empty() {
            log::debug!("Released {} download handle(s)", expired.len());
        }
        expired.into_iter().map(|(h, _)| h).collect()
    }

    pub fn release_all(&mut self) -> usize {
        let count = self.outstanding.len();
        self.outstanding.clear();
        count
    }

    /// Number of handles not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}
