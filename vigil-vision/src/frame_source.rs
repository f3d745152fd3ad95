use crate::error::{Result, VisionError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};
use vigil_core::Frame;

/// Abstraction over a camera. Implementations may wrap a webcam, an RTSP
/// stream, or a file — the surveillance pipeline only ever sees JPEG bytes
/// delivered on a cadence.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn open(&mut self) -> Result<()>;
    async fn next_frame(&mut self) -> Result<Frame>;
    async fn close(&mut self);
}

/// Default implementation: pulls a JPEG snapshot over HTTP from a configured
/// per-camera URL.
pub struct HttpFrameSource {
    camera_id: String,
    snapshot_url: String,
    client: reqwest::Client,
    sequence: AtomicU64,
}

impl HttpFrameSource {
    pub fn new(camera_id: impl Into<String>, snapshot_url: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            snapshot_url: snapshot_url.into(),
            client: reqwest::Client::new(),
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn open(&mut self) -> Result<()> {
        info!(camera_id = %self.camera_id, "opening http frame source");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        let response = self
            .client
            .get(&self.snapshot_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| VisionError::FrameSource(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VisionError::FrameSource(format!(
                "snapshot endpoint returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VisionError::FrameSource(e.to_string()))?;

        let sequence_no = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(Frame {
            camera_id: self.camera_id.clone(),
            captured_at: chrono::Utc::now(),
            jpeg_bytes: Bytes::from(bytes),
            url: None,
            base64: None,
            sequence_no,
        })
    }

    async fn close(&mut self) {
        info!(camera_id = %self.camera_id, "closing http frame source");
    }
}

/// Retry policy: base 1s, exponential backoff, cap 30s, give up after a
/// fixed attempt budget (spec 4.1).
pub async fn next_frame_with_retry(
    source: &mut dyn FrameSource,
    base_delay: Duration,
    cap: Duration,
    max_attempts: u32,
) -> Result<Frame> {
    let mut attempt = 0u32;
    loop {
        match source.next_frame().await {
            Ok(frame) => return Ok(frame),
            Err(VisionError::EndOfStream) => return Err(VisionError::EndOfStream),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(attempts = attempt, error = %e, "frame source retry budget exhausted");
                    return Err(VisionError::FrameSourceExhausted);
                }
                let delay = base_delay
                    .mul_f64(2f64.powi(attempt as i32 - 1))
                    .min(cap);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "frame source transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakySource {
        fail_times: u32,
        calls: u32,
    }

    #[async_trait]
    impl FrameSource for FlakySource {
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Frame> {
            self.calls += 1;
            if self.calls <= self.fail_times {
                return Err(VisionError::FrameSource("transient".into()));
            }
            Ok(Frame {
                camera_id: "cam1".into(),
                captured_at: chrono::Utc::now(),
                jpeg_bytes: Bytes::new(),
                url: None,
                base64: None,
                sequence_no: 0,
            })
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let mut source = FlakySource {
            fail_times: 2,
            calls: 0,
        };
        let frame = next_frame_with_retry(
            &mut source,
            Duration::from_millis(1),
            Duration::from_millis(5),
            6,
        )
        .await
        .unwrap();
        assert_eq!(frame.camera_id, "cam1");
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let mut source = FlakySource {
            fail_times: 100,
            calls: 0,
        };
        let result = next_frame_with_retry(
            &mut source,
            Duration::from_millis(1),
            Duration::from_millis(2),
            3,
        )
        .await;
        assert!(matches!(result, Err(VisionError::FrameSourceExhausted)));
    }
}
