//! Voice capture to upload, end to end against a mock backend

use std::sync::Arc;

use agentmarket_assistant::voice::{
    CaptureState, Microphone, MicrophoneStream, SAMPLE_RATE, SampleBuffer,
};
use agentmarket_assistant::{AgentApi, AssistantSession, Error, Result, Role, VoiceCapture};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;
use common::{mock_backend, test_transport};

/// Delivers half a second of a 440 Hz tone as soon as it is acquired
struct ToneMicrophone;

struct ToneStream;

impl MicrophoneStream for ToneStream {
    fn release(self: Box<Self>) {}
}

impl Microphone for ToneMicrophone {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    #[allow(clippy::cast_precision_loss)]
    fn acquire(&self, buffer: SampleBuffer) -> Result<Box<dyn MicrophoneStream>> {
        let samples: Vec<f32> = (0..SAMPLE_RATE / 2)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5
            })
            .collect();
        buffer.push(&samples);
        Ok(Box::new(ToneStream))
    }
}

/// Always reports a denied permission
struct DeniedMicrophone;

impl Microphone for DeniedMicrophone {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn acquire(&self, _buffer: SampleBuffer) -> Result<Box<dyn MicrophoneStream>> {
        Err(Error::Device("permission denied".to_string()))
    }
}

#[tokio::test]
async fn test_recording_uploaded_as_wav() {
    let server = mock_backend().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/agent/voice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Looking for running shoes?",
            "intent": "product_search"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = test_transport(&server);
    let sessions = transport.context().sessions();
    let session = AssistantSession::new(Arc::new(AgentApi::new(transport)), sessions.clone());

    let mut capture = VoiceCapture::new(ToneMicrophone);
    let recording = capture.record(async {}).await.unwrap();
    assert_eq!(capture.state(), CaptureState::Idle);
    assert_eq!(recording.mime_type(), "audio/wav");
    assert_eq!(&recording.bytes()[..4], b"RIFF");

    let reply = session.send_voice(recording).await.unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.text, "Looking for running shoes?");
    assert_eq!(session.transcript().len(), 1);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"audio_file\""));
    assert!(body.contains("filename=\"recording.wav\""));
    assert!(body.contains("name=\"session_id\""));
    assert!(body.contains(&sessions.session_id()));
}

#[tokio::test]
async fn test_denied_microphone_sends_nothing() {
    let server = mock_backend().await;

    let mut capture = VoiceCapture::new(DeniedMicrophone);
    let err = capture.record(async {}).await.unwrap_err();

    assert!(matches!(err, Error::Device(_)));
    assert_eq!(capture.state(), CaptureState::Idle);
    assert!(server.received_requests().await.unwrap().is_empty());
}
