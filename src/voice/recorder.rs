//! Bounded-duration voice capture
//!
//! A capture moves `Idle -> Requesting -> Recording -> Idle`. Recording ends
//! on an explicit stop or after [`MAX_RECORDING`], whichever comes first, and
//! the device stream is released in the same call that ends recording.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::capture::{Microphone, MicrophoneStream, SampleBuffer, samples_to_wav};
use crate::{Error, Result};

/// Hard ceiling on a single capture
pub const MAX_RECORDING: Duration = Duration::from_secs(10);

/// MIME type of encoded recordings
pub const RECORDING_MIME: &str = "audio/wav";

/// File name used when uploading a recording
pub const RECORDING_FILE_NAME: &str = "recording.wav";

/// Capture lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture active
    Idle,
    /// Waiting for the device to be acquired
    Requesting,
    /// Buffering audio
    Recording,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller asked to stop
    User,
    /// The hard ceiling elapsed
    Timeout,
}

/// Encoded audio, consumed by exactly one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRecording {
    bytes: Vec<u8>,
    mime_type: String,
}

impl VoiceRecording {
    /// Wrap already-encoded audio
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Encoded audio bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type of the encoded audio
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the recording into a multipart file part
    ///
    /// # Errors
    ///
    /// Returns error if the MIME type is invalid
    pub fn into_part(self) -> Result<reqwest::multipart::Part> {
        reqwest::multipart::Part::bytes(self.bytes)
            .file_name(RECORDING_FILE_NAME)
            .mime_str(&self.mime_type)
            .map_err(|e| Error::Audio(e.to_string()))
    }
}

struct ActiveCapture {
    stream: Box<dyn MicrophoneStream>,
    buffer: SampleBuffer,
    deadline: Instant,
}

/// Records one bounded utterance at a time from a [`Microphone`]
pub struct VoiceCapture<M: Microphone> {
    microphone: M,
    state: CaptureState,
    active: Option<ActiveCapture>,
}

impl<M: Microphone> VoiceCapture<M> {
    /// Create an idle capture over `microphone`
    #[must_use]
    pub const fn new(microphone: M) -> Self {
        Self {
            microphone,
            state: CaptureState::Idle,
            active: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Whether audio is being buffered
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        matches!(self.state, CaptureState::Recording)
    }

    /// Instant at which the current recording auto-stops
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.deadline)
    }

    /// Acquire the microphone and start recording
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if a capture is already active and
    /// `Error::Device` if the microphone cannot be acquired; in both cases no
    /// device stream is left open
    pub fn start(&mut self) -> Result<()> {
        if self.state != CaptureState::Idle {
            return Err(Error::ClientInput(
                "voice capture already in progress".to_string(),
            ));
        }

        self.state = CaptureState::Requesting;
        let buffer = SampleBuffer::new();

        match self.microphone.acquire(buffer.clone()) {
            Ok(stream) => {
                self.active = Some(ActiveCapture {
                    stream,
                    buffer,
                    deadline: Instant::now() + MAX_RECORDING,
                });
                self.state = CaptureState::Recording;
                tracing::info!(max_secs = MAX_RECORDING.as_secs(), "voice recording started");
                Ok(())
            }
            Err(e) => {
                self.state = CaptureState::Idle;
                tracing::warn!(error = %e, "microphone unavailable");
                Err(match e {
                    Error::Device(_) => e,
                    other => Error::Device(other.to_string()),
                })
            }
        }
    }

    /// Stop recording, release the device and encode the buffered audio
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if nothing is recording, `Error::Device`
    /// if no audio was captured and `Error::Audio` if encoding fails. The
    /// device is released before any of the latter two can occur.
    pub fn stop(&mut self) -> Result<VoiceRecording> {
        self.finish(StopReason::User)
    }

    /// Wait for `stop_signal` or the hard ceiling, then stop
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if nothing is recording, otherwise see
    /// [`Self::stop`]
    pub async fn record_until<F>(&mut self, stop_signal: F) -> Result<VoiceRecording>
    where
        F: Future<Output = ()>,
    {
        let Some(deadline) = self.deadline() else {
            return Err(Error::ClientInput("no recording in progress".to_string()));
        };

        let reason = tokio::select! {
            () = stop_signal => StopReason::User,
            () = tokio::time::sleep_until(deadline) => StopReason::Timeout,
        };

        self.finish(reason)
    }

    /// Start a recording and wait for `stop_signal` or the hard ceiling
    ///
    /// # Errors
    ///
    /// See [`Self::start`] and [`Self::record_until`]
    pub async fn record<F>(&mut self, stop_signal: F) -> Result<VoiceRecording>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        self.record_until(stop_signal).await
    }

    fn finish(&mut self, reason: StopReason) -> Result<VoiceRecording> {
        let Some(active) = self.active.take() else {
            return Err(Error::ClientInput("no recording in progress".to_string()));
        };
        self.state = CaptureState::Idle;
        active.stream.release();

        let mut samples = active.buffer.take();
        let max_samples = self.max_samples();
        if samples.len() > max_samples {
            samples.truncate(max_samples);
        }

        tracing::info!(?reason, samples = samples.len(), "voice recording stopped");

        if samples.is_empty() {
            return Err(Error::Device("no audio captured".to_string()));
        }

        let bytes = samples_to_wav(&samples, self.microphone.sample_rate())?;
        Ok(VoiceRecording::new(bytes, RECORDING_MIME))
    }

    fn max_samples(&self) -> usize {
        let rate = u64::from(self.microphone.sample_rate());
        usize::try_from(rate * MAX_RECORDING.as_secs()).unwrap_or(usize::MAX)
    }
}

impl<M: Microphone> Drop for VoiceCapture<M> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stream.release();
            tracing::debug!("voice capture dropped while recording");
        }
    }
}

impl<M: Microphone> std::fmt::Debug for VoiceCapture<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceCapture")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Delivers a fixed chunk on acquire and counts releases
    struct FakeMicrophone {
        chunk: Vec<f32>,
        deny: bool,
        releases: Arc<AtomicUsize>,
    }

    struct FakeStream {
        releases: Arc<AtomicUsize>,
    }

    impl MicrophoneStream for FakeStream {
        fn release(self: Box<Self>) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Microphone for FakeMicrophone {
        fn sample_rate(&self) -> u32 {
            100
        }

        fn acquire(&self, buffer: SampleBuffer) -> Result<Box<dyn MicrophoneStream>> {
            if self.deny {
                return Err(Error::Device("permission denied".to_string()));
            }
            buffer.push(&self.chunk);
            Ok(Box::new(FakeStream {
                releases: Arc::clone(&self.releases),
            }))
        }
    }

    fn fake(chunk: Vec<f32>) -> (FakeMicrophone, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        (
            FakeMicrophone {
                chunk,
                deny: false,
                releases: Arc::clone(&releases),
            },
            releases,
        )
    }

    #[test]
    fn test_start_stop_releases_once() {
        let (mic, releases) = fake(vec![0.1; 50]);
        let mut capture = VoiceCapture::new(mic);

        capture.start().unwrap();
        assert_eq!(capture.state(), CaptureState::Recording);

        let recording = capture.stop().unwrap();
        assert_eq!(recording.mime_type(), RECORDING_MIME);
        assert_eq!(recording.len(), 44 + 50 * 2);
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        drop(capture);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let (mic, releases) = fake(vec![0.1; 10]);
        let mut capture = VoiceCapture::new(mic);

        capture.start().unwrap();
        let err = capture.start().unwrap_err();
        assert!(matches!(err, Error::ClientInput(_)));
        assert!(capture.is_recording());
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        capture.stop().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_denied_permission_returns_to_idle() {
        let (mut mic, releases) = fake(vec![0.1; 10]);
        mic.deny = true;
        let mut capture = VoiceCapture::new(mic);

        let err = capture.start().unwrap_err();
        assert!(matches!(err, Error::Device(_)));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_without_start() {
        let (mic, _) = fake(vec![]);
        let mut capture = VoiceCapture::new(mic);
        assert!(matches!(capture.stop(), Err(Error::ClientInput(_))));
    }

    #[test]
    fn test_empty_capture_still_releases() {
        let (mic, releases) = fake(vec![]);
        let mut capture = VoiceCapture::new(mic);

        capture.start().unwrap();
        assert!(matches!(capture.stop(), Err(Error::Device(_))));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn test_drop_while_recording_releases() {
        let (mic, releases) = fake(vec![0.1; 10]);
        let mut capture = VoiceCapture::new(mic);
        capture.start().unwrap();
        drop(capture);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_samples_are_capped_at_ceiling() {
        // 100 Hz fake rate: ceiling is 1000 samples
        let (mic, _) = fake(vec![0.1; 1500]);
        let mut capture = VoiceCapture::new(mic);
        capture.start().unwrap();
        let recording = capture.stop().unwrap();
        assert_eq!(recording.len(), 44 + 1000 * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_auto_stops() {
        let (mic, releases) = fake(vec![0.1; 10]);
        let mut capture = VoiceCapture::new(mic);

        let started = Instant::now();
        let recording = capture.record(std::future::pending()).await.unwrap();

        assert!(started.elapsed() >= MAX_RECORDING);
        assert!(!recording.is_empty());
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        drop(capture);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_stop_before_timeout() {
        let (mic, releases) = fake(vec![0.1; 10]);
        let mut capture = VoiceCapture::new(mic);

        let started = Instant::now();
        let recording = capture
            .record(tokio::time::sleep(Duration::from_secs(2)))
            .await
            .unwrap();

        assert!(started.elapsed() < MAX_RECORDING);
        assert!(!recording.is_empty());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
