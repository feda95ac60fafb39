//! Minimal RIFF/WAVE handling for 16-bit PCM.

use super::SAMPLE_RATE;
use crate::error::{MurmurError, Result};

const HEADER_LEN: usize = 44;

/// Encode mono samples as a 16-bit PCM WAV file at [`SAMPLE_RATE`].
pub fn encode_wav(samples: &[f32]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = SAMPLE_RATE * 2;
    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decode a 16-bit PCM WAV file recorded at [`SAMPLE_RATE`].
///
/// Multi-channel audio is downmixed to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<f32>> {
    let invalid = |msg: &str| MurmurError::InvalidParameter(format!("WAV: {}", msg));

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(invalid("not a RIFF/WAVE file"));
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let len = read_u32(bytes, pos + 4).ok_or_else(|| invalid("truncated chunk"))? as usize;
        let body = pos + 8;
        let end = body.saturating_add(len).min(bytes.len());

        match id {
            b"fmt " => {
                let tag = read_u16(bytes, body).ok_or_else(|| invalid("truncated fmt"))?;
                let channels = read_u16(bytes, body + 2).ok_or_else(|| invalid("truncated fmt"))?;
                let rate = read_u32(bytes, body + 4).ok_or_else(|| invalid("truncated fmt"))?;
                let bits = read_u16(bytes, body + 14).ok_or_else(|| invalid("truncated fmt"))?;
                format = Some((tag, channels, rate, bits));
            }
            b"data" => {
                let (tag, channels, rate, bits) =
                    format.ok_or_else(|| invalid("data chunk before fmt chunk"))?;
                if tag != 1 || bits != 16 {
                    return Err(invalid("only 16-bit PCM is supported"));
                }
                if rate != SAMPLE_RATE {
                    return Err(invalid(&format!(
                        "expected {} Hz audio, got {} Hz",
                        SAMPLE_RATE, rate
                    )));
                }
                let channels = channels.max(1) as usize;
                let frames = bytes[body..end].chunks_exact(2 * channels);
                return Ok(frames
                    .map(|frame| {
                        let sum: f32 = frame
                            .chunks_exact(2)
                            .map(|s| i16::from_le_bytes([s[0], s[1]]) as f32 / i16::MAX as f32)
                            .sum();
                        sum / channels as f32
                    })
                    .collect());
            }
            _ => {}
        }
        // Chunks are padded to even length.
        pos = body + len + (len & 1);
    }

    Err(invalid("missing data chunk"))
}
