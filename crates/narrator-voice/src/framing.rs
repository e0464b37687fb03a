//! Audio framing: PCM ⇄ WAV, base64 payloads, decoding and resampling.
//!
//! All functions here are pure and CPU-bound. Callers on the async runtime
//! should wrap the heavy ones (`decode`, `normalize`) in `spawn_blocking`.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rodio::Source;
use rubato::{FftFixedIn, Resampler};

use crate::error::AudioError;

/// Frames fed to the FFT resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Interleaved PCM decoded from an audio container.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Length in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Join streamed chunks in arrival order.
pub fn concat_chunks(chunks: &[Vec<f32>]) -> Vec<f32> {
    let total = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}

/// Convert a float sample to 16-bit PCM.
///
/// Negative values scale by 32768 and non-negative values by 32767, so both
/// ends of `[-1, 1]` land exactly on the i16 range.
#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Encode mono samples as a 16-bit PCM WAV container.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| AudioError::Encode(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(to_pcm16(sample))
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::Encode(e.to_string()))?;

    Ok(cursor.into_inner())
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_base64(encoded: &str) -> Result<Vec<u8>, AudioError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| AudioError::Decode(format!("invalid base64 payload: {e}")))
}

/// Decode an audio container (WAV, FLAC or Ogg Vorbis) into interleaved f32.
pub fn decode(bytes: Vec<u8>) -> Result<DecodedAudio, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }

    let decoder =
        rodio::Decoder::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    if samples.is_empty() || channels == 0 {
        return Err(AudioError::Empty);
    }

    tracing::trace!(channels, sample_rate, len = samples.len(), "Decoded audio");
    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

/// Average interleaved channels into one.
#[allow(clippy::cast_precision_loss)]
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = usize::from(channels);
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample a mono signal from `from_rate` to `to_rate`.
///
/// The resampler's group delay is trimmed so the output is time-aligned with
/// the input and exactly `ceil(len × to / from)` samples long.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid sample rates {from_rate} → {to_rate}"
        )));
    }

    let err = |e: &dyn std::fmt::Display| AudioError::Resample(e.to_string());
    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| err(&e))?;

    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let take = resampler.input_frames_next();
        let frames = resampler
            .process(&[&samples[pos..pos + take]], None)
            .map_err(|e| err(&e))?;
        out.extend_from_slice(&frames[0]);
        pos += take;
    }
    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let frames = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| err(&e))?;
        out.extend_from_slice(&frames[0]);
    }

    // Flush the tail still held back by the filter delay.
    while out.len() < delay + expected {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| err(&e))?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);
    Ok(out)
}

/// Decode arbitrary audio bytes into mono samples at `target_rate`.
///
/// Mono input already at the target rate passes through untouched.
pub fn normalize(bytes: Vec<u8>, target_rate: u32) -> Result<Vec<f32>, AudioError> {
    let decoded = decode(bytes)?;
    if decoded.channels == 1 && decoded.sample_rate == target_rate {
        return Ok(decoded.samples);
    }
    let mono = downmix(&decoded.samples, decoded.channels);
    resample(&mono, decoded.sample_rate, target_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn le_i16(bytes: &[u8], at: usize) -> i16 {
        i16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    #[test]
    fn wav_header_describes_mono_pcm16() {
        let wav = encode_wav(&[0.0, 0.5, -0.5], 24_000).unwrap();

        assert_eq!(wav.len(), 44 + 3 * 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(le_u32(&wav, 4), 36 + 6);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(le_u32(&wav, 24), 24_000);
        assert_eq!(le_u32(&wav, 28), 48_000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(le_u32(&wav, 40), 6);
    }

    #[test]
    fn wav_samples_are_clamped_and_asymmetrically_scaled() {
        let wav = encode_wav(&[1.0, -1.0, 2.5, -3.0], 24_000).unwrap();

        assert_eq!(le_i16(&wav, 44), i16::MAX);
        assert_eq!(le_i16(&wav, 46), i16::MIN);
        assert_eq!(le_i16(&wav, 48), i16::MAX);
        assert_eq!(le_i16(&wav, 50), i16::MIN);
    }

    #[test]
    fn decode_reads_back_encoded_wav() {
        let wav = encode_wav(&[0.25; 240], 24_000).unwrap();
        let decoded = decode(wav).unwrap();

        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.frames(), 240);
        assert!((decoded.duration() - 0.01).abs() < 1e-9);
        assert!((decoded.samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(vec![1, 2, 3, 4]), Err(AudioError::Decode(_))));
        assert_eq!(decode(Vec::new()), Err(AudioError::Empty));
    }

    #[test]
    fn downmix_averages_frames() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn resample_output_length_matches_rate_ratio() {
        let input = vec![0.1_f32; 48_000];
        let out = resample(&input, 48_000, 24_000).unwrap();
        assert_eq!(out.len(), 24_000);

        let odd = vec![0.0_f32; 1_000];
        let up = resample(&odd, 16_000, 24_000).unwrap();
        assert_eq!(up.len(), 1_500);
    }

    #[test]
    fn normalize_passes_through_canonical_audio() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 / 100.0) - 0.5).collect();
        let wav = encode_wav(&samples, 24_000).unwrap();
        let out = normalize(wav, 24_000).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn base64_round_trip_preserves_bytes() {
        let bytes = encode_wav(&[0.3, -0.3], 24_000).unwrap();
        assert_eq!(from_base64(&to_base64(&bytes)).unwrap(), bytes);
        assert!(from_base64("***").is_err());
    }

    #[test]
    fn concat_keeps_arrival_order() {
        let chunks = vec![vec![1.0, 2.0], vec![], vec![3.0]];
        assert_eq!(concat_chunks(&chunks), vec![1.0, 2.0, 3.0]);
    }
}
