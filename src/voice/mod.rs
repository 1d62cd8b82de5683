//! Voice input
//!
//! Microphone acquisition, bounded recording and WAV encoding. Transcription
//! happens server-side: recordings are uploaded by the assistant session.

mod capture;
mod recorder;

pub use capture::{
    CpalMicrophone, Microphone, MicrophoneStream, SAMPLE_RATE, SampleBuffer, samples_to_wav,
};
pub use recorder::{
    CaptureState, MAX_RECORDING, RECORDING_FILE_NAME, RECORDING_MIME, StopReason, VoiceCapture,
    VoiceRecording,
};
