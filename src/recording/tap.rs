//! Analysis tap: a live read-only window into the input stream.
//!
//! The tap keeps the most recent 2048 mono samples pushed from the audio
//! callback and exposes them on demand as byte buffers, either raw
//! time-domain data or an FFT magnitude spectrum.

use rustfft::{num_complex::Complex, FftPlanner};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Analysis window size in samples. Also the length of both byte buffers.
pub const WINDOW_SIZE: usize = 2048;

/// Byte value representing silence in time-domain reads (zero-centered
/// samples map to the middle of the 0-255 range).
pub const SILENCE_BYTE: u8 = 128;

/// Decibel range mapped onto 0-255 for frequency-domain reads.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Live analysis window over an audio input stream.
///
/// Pushed to from the audio callback thread, read from the render thread.
/// Both sides go through internal mutexes; reads copy into caller-owned
/// buffers so no allocation happens per tick.
pub struct AnalysisTap {
    /// Most recent samples, capped at `WINDOW_SIZE`
    ring: Mutex<VecDeque<i16>>,
    /// Reusable FFT planner (plan caching makes repeated reads cheap)
    planner: Mutex<FftPlanner<f32>>,
}

impl AnalysisTap {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Feeds new mono samples into the window, discarding the oldest.
    pub fn push(&self, samples: &[i16]) {
        let mut ring = self.ring.lock().unwrap();

        let len = samples.len();
        if len >= WINDOW_SIZE {
            ring.clear();
            ring.extend(&samples[len - WINDOW_SIZE..]);
            return;
        }

        let overflow = (ring.len() + len).saturating_sub(WINDOW_SIZE);
        if overflow > 0 {
            ring.drain(0..overflow);
        }
        ring.extend(samples);
    }

    /// Copies the current time-domain window into `out` as unsigned bytes.
    ///
    /// Samples are scaled down to 8 bits and re-centered on 128, so silence
    /// reads as a flat line at `SILENCE_BYTE`. When fewer than `WINDOW_SIZE`
    /// samples have arrived, the leading portion is filled with silence.
    pub fn read_time_domain(&self, out: &mut [u8; WINDOW_SIZE]) {
        let ring = self.ring.lock().unwrap();

        let pad = WINDOW_SIZE - ring.len();
        out[..pad].fill(SILENCE_BYTE);
        for (slot, &sample) in out[pad..].iter_mut().zip(ring.iter()) {
            *slot = ((sample >> 8) + 128).clamp(0, 255) as u8;
        }
    }

    /// Copies the current magnitude spectrum into `out` as unsigned bytes.
    ///
    /// A Hanning window is applied before the FFT to reduce spectral leakage,
    /// then each of the `WINDOW_SIZE / 2` unique bins is converted to dBFS and
    /// mapped linearly from the -100..-30 dB range onto 0-255. The upper half
    /// of `out` (mirrored bins) is zeroed.
    pub fn read_frequency_domain(&self, out: &mut [u8; WINDOW_SIZE]) {
        let mut buffer = {
            let ring = self.ring.lock().unwrap();
            if ring.is_empty() {
                out.fill(0);
                return;
            }

            let count = ring.len();
            let mut buffer: Vec<Complex<f32>> = ring
                .iter()
                .enumerate()
                .map(|(i, &s)| {
                    let window = 0.5
                        * (1.0
                            - (2.0 * std::f32::consts::PI * i as f32 / count as f32).cos());
                    Complex::new(s as f32 * window / 32768.0, 0.0)
                })
                .collect();
            buffer.resize(WINDOW_SIZE, Complex::new(0.0, 0.0));
            buffer
        };

        let fft = {
            let mut planner = self.planner.lock().unwrap();
            planner.plan_fft_forward(WINDOW_SIZE)
        };
        fft.process(&mut buffer);

        let half = WINDOW_SIZE / 2;
        for (slot, bin) in out[..half].iter_mut().zip(buffer.iter()) {
            // Normalize by window length so magnitude is independent of size
            let magnitude = bin.norm() / WINDOW_SIZE as f32;
            let db = if magnitude > 1e-10 {
                20.0 * magnitude.log10()
            } else {
                MIN_DECIBELS
            };
            let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0;
            *slot = scaled.clamp(0.0, 255.0) as u8;
        }
        out[half..].fill(0);
    }

    /// Number of samples currently buffered.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().len()
    }
}

impl Default for AnalysisTap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounded() {
        let tap = AnalysisTap::new();

        let samples: Vec<i16> = (0..5000).map(|i| (i % 100) as i16).collect();
        tap.push(&samples);

        assert_eq!(tap.len(), WINDOW_SIZE);
    }

    #[test]
    fn test_incremental_push_keeps_newest() {
        let tap = AnalysisTap::new();

        tap.push(&vec![0i16; WINDOW_SIZE]);
        tap.push(&[i16::MAX; 4]);

        let mut out = [0u8; WINDOW_SIZE];
        tap.read_time_domain(&mut out);

        // The four loud samples must be at the end of the window
        assert!(out[WINDOW_SIZE - 4..].iter().all(|&b| b == 255));
        assert!(out[..WINDOW_SIZE - 4].iter().all(|&b| b == SILENCE_BYTE));
    }

    #[test]
    fn test_time_domain_silence_is_centered() {
        let tap = AnalysisTap::new();
        tap.push(&vec![0i16; WINDOW_SIZE]);

        let mut out = [0u8; WINDOW_SIZE];
        tap.read_time_domain(&mut out);

        assert!(out.iter().all(|&b| b == SILENCE_BYTE));
    }

    #[test]
    fn test_time_domain_pads_short_window_with_silence() {
        let tap = AnalysisTap::new();
        tap.push(&[i16::MIN; 10]);

        let mut out = [1u8; WINDOW_SIZE];
        tap.read_time_domain(&mut out);

        assert!(out[..WINDOW_SIZE - 10].iter().all(|&b| b == SILENCE_BYTE));
        assert!(out[WINDOW_SIZE - 10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_frequency_domain_empty_window_is_zero() {
        let tap = AnalysisTap::new();

        let mut out = [7u8; WINDOW_SIZE];
        tap.read_frequency_domain(&mut out);

        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_frequency_domain_tone_beats_silence() {
        let tap = AnalysisTap::new();

        // 440 Hz-ish tone at 16 kHz
        let tone: Vec<i16> = (0..WINDOW_SIZE)
            .map(|i| {
                ((2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() * 16000.0)
                    as i16
            })
            .collect();
        tap.push(&tone);
        let mut loud = [0u8; WINDOW_SIZE];
        tap.read_frequency_domain(&mut loud);

        let quiet_tap = AnalysisTap::new();
        quiet_tap.push(&vec![0i16; WINDOW_SIZE]);
        let mut quiet = [0u8; WINDOW_SIZE];
        quiet_tap.read_frequency_domain(&mut quiet);

        let loud_sum: u32 = loud.iter().map(|&b| b as u32).sum();
        let quiet_sum: u32 = quiet.iter().map(|&b| b as u32).sum();
        assert!(
            loud_sum > quiet_sum,
            "tone spectrum ({loud_sum}) should outweigh silence ({quiet_sum})"
        );
    }

    #[test]
    fn test_frequency_domain_mirror_half_zeroed() {
        let tap = AnalysisTap::new();
        tap.push(&vec![8000i16; WINDOW_SIZE]);

        let mut out = [255u8; WINDOW_SIZE];
        tap.read_frequency_domain(&mut out);

        assert!(out[WINDOW_SIZE / 2..].iter().all(|&b| b == 0));
    }
}
