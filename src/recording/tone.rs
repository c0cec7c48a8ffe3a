use std::f32::consts::PI;
use std::io::Cursor;

use crate::config::ToneConfig;
use crate::error::ReaderError;

/// Pentatonic scale the placeholder tones cycle through, in Hz.
const BELL_FREQUENCIES: [f32; 5] = [440.0, 493.88, 554.37, 659.25, 739.99];

const BELL_LENGTH_MS: u64 = 400;

/// Envelope decay rate per second.
const BELL_DECAY: f32 = 6.0;

const BELL_ATTACK_MS: u64 = 5;

/// Crossfade between consecutive bells.
const BELL_CROSSFADE_MS: u64 = 10;

/// Mono PCM audio held as f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ToneAudio {
    /// Encode as a 16-bit PCM WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, ReaderError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in &self.samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        Ok(cursor.into_inner())
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Deterministic placeholder audio used when no live capture is available.
///
/// The length is estimated from the text, not measured from the actual
/// speech, so it only roughly matches what the engine spoke.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    config: ToneConfig,
}

impl ToneGenerator {
    pub fn new(config: ToneConfig) -> Self {
        Self { config }
    }

    /// Estimated speaking time for `char_count` characters, in milliseconds.
    pub fn estimate_ms(&self, char_count: usize) -> u64 {
        (char_count as u64)
            .saturating_mul(self.config.ms_per_char)
            .clamp(self.config.min_duration_ms, self.config.max_duration_ms)
    }

    /// Generate a bell sequence lasting the estimated time for `text`.
    pub fn generate(&self, text: &str) -> ToneAudio {
        let rate = self.config.sample_rate;
        let total = ms_to_samples(self.estimate_ms(text.trim().chars().count()), rate);
        let crossfade = ms_to_samples(BELL_CROSSFADE_MS, rate);

        let mut samples = Vec::with_capacity(total.saturating_add(crossfade));
        let mut note = 0usize;
        while samples.len() < total {
            let frequency = BELL_FREQUENCIES[note % BELL_FREQUENCIES.len()];
            let bell = self.bell(frequency);
            let before = samples.len();
            if samples.is_empty() {
                samples.extend_from_slice(&bell);
            } else {
                append_with_crossfade(&mut samples, &bell, crossfade);
            }
            note += 1;
            if samples.len() == before {
                log::warn!("Bell too short at {rate}Hz, padding tone with silence");
                break;
            }
        }
        samples.resize(total, 0.0);

        log::debug!(
            "Generated {} placeholder bells ({} samples @ {}Hz)",
            note,
            samples.len(),
            rate
        );

        ToneAudio {
            samples,
            sample_rate: rate,
        }
    }

    /// One bell: short linear attack, exponential decay.
    fn bell(&self, frequency: f32) -> Vec<f32> {
        let rate = self.config.sample_rate as f32;
        let length = ms_to_samples(BELL_LENGTH_MS, self.config.sample_rate);
        let attack = ms_to_samples(BELL_ATTACK_MS, self.config.sample_rate).max(1);

        (0..length)
            .map(|i| {
                let t = i as f32 / rate;
                let envelope = if i < attack {
                    i as f32 / attack as f32
                } else {
                    (-BELL_DECAY * t).exp()
                };
                (2.0 * PI * frequency * t).sin() * envelope * self.config.amplitude
            })
            .collect()
    }
}

fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    let samples = ms.saturating_mul(u64::from(sample_rate)) / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX)
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    if overlap == 0 {
        dst.extend_from_slice(src);
        return;
    }

    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        dst[dst_start + i] = dst[dst_start + i] * (1.0 - t) + src[i] * t;
    }

    dst.extend_from_slice(&src[overlap..]);
}
