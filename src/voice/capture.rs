//! Microphone acquisition and WAV encoding

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// In-memory buffer the device callback appends samples to
#[derive(Clone, Debug, Default)]
pub struct SampleBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl SampleBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of samples
    pub fn push(&self, chunk: &[f32]) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.extend_from_slice(chunk);
        }
    }

    /// Take all buffered samples, leaving the buffer empty
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Number of buffered samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.lock().map(|buf| buf.len()).unwrap_or_default()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A source of microphone audio
///
/// `acquire` requests the device and starts delivering mono samples into the
/// buffer. Failure to acquire (no device, permission denied, unsupported
/// format) is reported as `Error::Device`.
pub trait Microphone {
    /// Sample rate of the delivered samples
    fn sample_rate(&self) -> u32;

    /// Acquire the device and start streaming into `buffer`
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the device cannot be acquired
    fn acquire(&self, buffer: SampleBuffer) -> Result<Box<dyn MicrophoneStream>>;
}

/// A live device stream; releasing it stops the underlying tracks
pub trait MicrophoneStream {
    /// Stop delivering samples and free the device
    fn release(self: Box<Self>);
}

/// Default input device via cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    /// Create a handle to the default input device
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Microphone for CpalMicrophone {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn acquire(&self, buffer: SampleBuffer) -> Result<Box<dyn MicrophoneStream>> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Device("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.push(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "microphone acquired"
        );

        Ok(Box::new(CpalStream { stream }))
    }
}

struct CpalStream {
    stream: Stream,
}

impl MicrophoneStream for CpalStream {
    fn release(self: Box<Self>) {
        drop(self.stream);
        tracing::debug!("microphone released");
    }
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_take_clears() {
        let buffer = SampleBuffer::new();
        buffer.push(&[0.1, 0.2]);
        buffer.clone().push(&[0.3]);
        assert_eq!(buffer.len(), 3);

        assert_eq!(buffer.take(), vec![0.1, 0.2, 0.3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_wav_header_and_length() {
        let samples = vec![0.0_f32; 1600];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header plus 2 bytes per sample
        assert_eq!(wav.len(), 44 + samples.len() * 2);

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
    }

    #[test]
    fn test_wav_clamps_out_of_range() {
        let wav = samples_to_wav(&[2.0, -2.0], SAMPLE_RATE).unwrap();
        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![32767, -32768]);
    }
}
