//! # PCM Audio Helpers
//!
//! The wire carries raw little-endian 16-bit PCM with no container, so the
//! only format work the gateway does is byte-to-sample conversion at the
//! engine boundary and duration math for logging.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

/// Bytes per sample for 16-bit PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Convert raw little-endian PCM bytes into 16-bit samples.
///
/// An empty slice yields an empty sample vector (a session may end before
/// any audio arrives). An odd byte count means the client sent a torn
/// sample and the data cannot be interpreted.
pub fn pcm16_samples(data: &[u8]) -> Result<Vec<i16>, String> {
    if data.len() % BYTES_PER_SAMPLE != 0 {
        return Err(format!(
            "audio data length {} is not a multiple of the 16-bit sample size",
            data.len()
        ));
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / BYTES_PER_SAMPLE);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    Ok(samples)
}

/// Duration in seconds of a raw PCM byte buffer at the given sample rate.
pub fn duration_seconds(byte_len: usize, sample_rate: f32) -> f64 {
    if sample_rate <= 0.0 {
        return 0.0;
    }
    (byte_len / BYTES_PER_SAMPLE) as f64 / sample_rate as f64
}
