use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::PathBuf;
use tracing::warn;
use vigil_core::Frame;

/// Writes frames to `<root>/camera{id}_<YYYYMMDD>_<HHMMSS>_<microseconds>.jpg`
/// and precomputes the base64 encoding. Filename uniqueness is guaranteed by
/// microsecond-resolution timestamps plus the camera id, so concurrent
/// workers never collide (spec 5, "FrameStore: concurrent-safe").
pub struct FrameStore {
    root: PathBuf,
}

impl FrameStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Best-effort write: on I/O failure the frame degrades to base64-only
    /// (no `url`) rather than failing the tick (spec 4.2 / Error Handling
    /// "local I/O").
    pub async fn persist(&self, frame: &mut Frame) {
        let base64 = STANDARD.encode(&frame.jpeg_bytes);
        frame.base64 = Some(base64);

        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            warn!(error = %e, "frame store failed to create root directory, degrading to base64-only");
            return;
        }

        let filename = format!(
            "camera{}_{}.jpg",
            frame.camera_id,
            frame.captured_at.format("%Y%m%d_%H%M%S_%6f")
        );
        let path = self.root.join(&filename);

        match tokio::fs::write(&path, &frame.jpeg_bytes).await {
            Ok(()) => {
                frame.url = Some(path.to_string_lossy().into_owned());
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "frame store write failed, degrading to base64-only");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    #[tokio::test]
    async fn persists_frame_and_sets_url_and_base64() {
        let dir = std::env::temp_dir().join(format!("vigil-test-{}", uuid::Uuid::new_v4()));
        let store = FrameStore::new(dir.clone());
        let mut frame = Frame {
            camera_id: "1".into(),
            captured_at: Utc::now(),
            jpeg_bytes: Bytes::from_static(b"not-really-a-jpeg"),
            url: None,
            base64: None,
            sequence_no: 0,
        };
        store.persist(&mut frame).await;
        assert!(frame.url.is_some());
        assert!(frame.base64.is_some());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn degrades_to_base64_only_when_root_is_unwritable() {
        // A path nested under a file (not a directory) can never be created.
        let blocker = std::env::temp_dir().join(format!("vigil-blocker-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let store = FrameStore::new(blocker.join("nested"));
        let mut frame = Frame {
            camera_id: "1".into(),
            captured_at: Utc::now(),
            jpeg_bytes: Bytes::from_static(b"jpeg"),
            url: None,
            base64: None,
            sequence_no: 0,
        };
        store.persist(&mut frame).await;
        assert!(frame.url.is_none());
        assert!(frame.base64.is_some());
        tokio::fs::remove_file(&blocker).await.ok();
    }
}
