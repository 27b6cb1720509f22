//! PCM helpers for the live voice stream.
//!
//! The provider expects **16 kHz mono 16-bit little-endian PCM** in, and
//! sends **24 kHz mono 16-bit PCM** back, both base64-encoded. This module
//! covers the conversions on our side of the relay:
//!
//! 1. [`stereo_to_mono`] and [`StreamResampler`] bring client audio to
//!    16 kHz mono.
//! 2. [`FrameChunker`] cuts the stream into fixed-size frames.
//! 3. [`encode_pcm16_base64`] / [`decode_pcm16_base64`] convert between
//!    `f32` samples and the base64 wire payload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Sample rate the provider expects for microphone audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of the audio the provider sends back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Samples per outbound frame.
pub const FRAME_SAMPLES: usize = 4096;
/// MIME type announced for outbound frames.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

// ---------------------------------------------------------------------------
// Channel mixing and resampling
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// `channels == 1` returns the input unchanged; `channels == 0` yields an
/// empty vector.
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Streaming linear-interpolation resampler.
///
/// The read position is kept as an integer numerator over `target_rate`
/// and carried across calls together with the last input sample, so a
/// stream fed in arbitrary chunks produces exactly the samples the whole
/// buffer would. Each call emits only samples whose right neighbour has
/// already arrived.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    source_rate: u32,
    target_rate: u32,
    /// Source position of the next output sample, times `target_rate`,
    /// relative to the first sample of the next chunk. Never below
    /// `-target_rate`.
    next: i64,
    last: Option<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            source_rate,
            target_rate,
            next: 0,
            last: None,
        }
    }

    /// Resamples the next chunk of the stream.
    ///
    /// Equal rates pass samples through; a zero rate yields nothing.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.source_rate == self.target_rate {
            return samples.to_vec();
        }

        if samples.is_empty() || self.source_rate == 0 || self.target_rate == 0 {
            return Vec::new();
        }

        let step = self.source_rate as i64;
        let scale = self.target_rate as i64;
        let len = samples.len() as i64;
        let capacity = samples.len() as u64 * self.target_rate as u64 / self.source_rate as u64;
        let mut output = Vec::with_capacity(capacity as usize + 1);

        loop {
            let idx = self.next.div_euclid(scale);
            if idx + 1 >= len {
                break;
            }

            let left = if idx < 0 {
                self.last.unwrap_or(samples[0])
            } else {
                samples[idx as usize]
            };
            let right = samples[(idx + 1) as usize];
            let frac = (self.next.rem_euclid(scale) as f64 / scale as f64) as f32;

            output.push(left + (right - left) * frac);
            self.next += step;
        }

        self.next -= len * scale;
        self.last = samples.last().copied();
        output
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Buffers a continuous sample stream and releases fixed-size frames.
#[derive(Debug)]
pub struct FrameChunker {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Adds samples and returns every complete frame now available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_len * self.frame_len;
        if complete == 0 {
            return Vec::new();
        }

        let frames = self.pending[..complete]
            .chunks_exact(self.frame_len)
            .map(<[f32]>::to_vec)
            .collect();
        self.pending.drain(..complete);
        frames
    }

    /// Samples waiting for a full frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Wire encoding
// ---------------------------------------------------------------------------

/// `f32` samples → 16-bit little-endian PCM → base64.
///
/// Samples are scaled by 32768; out-of-range values saturate.
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let value = (s * 32768.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// base64 → 16-bit little-endian PCM → `f32` samples in `[-1, 1)`.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16_base64(data: &str) -> Result<Vec<f32>, base64::DecodeError> {
    let bytes = BASE64.decode(data.trim())?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Converts little-endian `f32` bytes (as sent by the browser) to samples.
pub fn f32_le_bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Playback length of `samples` mono samples at `rate` Hz, in seconds.
pub fn duration_secs(samples: usize, rate: u32) -> f64 {
    if rate == 0 {
        return 0.0;
    }
    samples as f64 / rate as f64
}
