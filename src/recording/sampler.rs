//! Per-frame signal sampling that drives the waveform visualization.
//!
//! Once per rendered frame the sampler pulls the latest time-domain and
//! frequency-domain buffers from the analysis tap and reduces each to a
//! single scalar. The scalars are published through atomic cells so the
//! render side never observes a torn value.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::state::RecordingState;
use super::tap::{AnalysisTap, WINDOW_SIZE};

/// Factor applied to the frequency-domain mean before publishing.
pub const FREQUENCY_SCALE: f32 = 10.0;

/// Resting value both signals hold before any audio has been analyzed.
pub const BASELINE: f32 = 40.0;

/// The two scalars that parameterize the waveform.
///
/// Written only by the sampler, read by the UI each frame. Values are stored
/// as f32 bit patterns in atomics; a store is a single word replacement, so
/// readers on other frames never see a partial update.
pub struct DriveSignals {
    amplitude: AtomicU32,
    frequency_amplitude: AtomicU32,
}

impl DriveSignals {
    pub fn new() -> Self {
        Self {
            amplitude: AtomicU32::new(BASELINE.to_bits()),
            frequency_amplitude: AtomicU32::new(BASELINE.to_bits()),
        }
    }

    /// Mean of the time-domain buffer, roughly 0-255.
    pub fn amplitude(&self) -> f32 {
        f32::from_bits(self.amplitude.load(Ordering::Relaxed))
    }

    /// Mean of the frequency-domain buffer, scaled by [`FREQUENCY_SCALE`].
    pub fn frequency_amplitude(&self) -> f32 {
        f32::from_bits(self.frequency_amplitude.load(Ordering::Relaxed))
    }

    fn publish(&self, amplitude: f32, frequency_amplitude: f32) {
        self.amplitude.store(amplitude.to_bits(), Ordering::Relaxed);
        self.frequency_amplitude
            .store(frequency_amplitude.to_bits(), Ordering::Relaxed);
    }
}

impl Default for DriveSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame-synchronized reducer from sample buffers to drive signals.
///
/// Owns its two fixed read buffers; they are overwritten in place each tick
/// and never reallocated. The sampler only computes while it is live and the
/// recording state is exactly `Recording` - paused ticks are free so resuming
/// picks up on the very next frame.
pub struct SignalSampler {
    signals: Arc<DriveSignals>,
    tap: Option<Arc<AnalysisTap>>,
    live: bool,
    time_buf: Box<[u8; WINDOW_SIZE]>,
    freq_buf: Box<[u8; WINDOW_SIZE]>,
}

impl SignalSampler {
    pub fn new(signals: Arc<DriveSignals>) -> Self {
        Self {
            signals,
            tap: None,
            live: false,
            time_buf: Box::new([0u8; WINDOW_SIZE]),
            freq_buf: Box::new([0u8; WINDOW_SIZE]),
        }
    }

    /// Binds the sampler to a session's tap and marks it live.
    pub fn start(&mut self, tap: Arc<AnalysisTap>) {
        self.tap = Some(tap);
        self.live = true;
        tracing::debug!("Sampler started");
    }

    /// Severs the tap reference so further ticks are no-ops.
    pub fn stop(&mut self) {
        self.live = false;
        self.tap = None;
        tracing::debug!("Sampler stopped");
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Runs one sampling tick, called once per render frame.
    ///
    /// Publishes new drive signals only when live, bound to a tap, and the
    /// state is exactly `Recording`. A tick without a tap is a no-op.
    pub fn tick(&mut self, state: &RecordingState) {
        if !self.live {
            return;
        }
        let Some(tap) = self.tap.as_ref() else {
            return;
        };
        if *state != RecordingState::Recording {
            return;
        }

        tap.read_time_domain(&mut self.time_buf);
        let amplitude = mean(&self.time_buf[..]);

        tap.read_frequency_domain(&mut self.freq_buf);
        let frequency_amplitude = mean(&self.freq_buf[..]) * FREQUENCY_SCALE;

        self.signals.publish(amplitude, frequency_amplitude);
    }
}

fn mean(buf: &[u8]) -> f32 {
    let sum: u32 = buf.iter().map(|&b| b as u32).sum();
    sum as f32 / buf.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::tap::SILENCE_BYTE;

    fn sampler_with_tap(samples: &[i16]) -> (SignalSampler, Arc<DriveSignals>) {
        let signals = Arc::new(DriveSignals::new());
        let tap = Arc::new(AnalysisTap::new());
        tap.push(samples);
        let mut sampler = SignalSampler::new(Arc::clone(&signals));
        sampler.start(tap);
        (sampler, signals)
    }

    #[test]
    fn test_signals_start_at_baseline() {
        let signals = DriveSignals::new();
        assert_eq!(signals.amplitude(), BASELINE);
        assert_eq!(signals.frequency_amplitude(), BASELINE);
    }

    #[test]
    fn test_tick_writes_only_while_recording() {
        let (mut sampler, signals) = sampler_with_tap(&vec![0i16; WINDOW_SIZE]);

        sampler.tick(&RecordingState::Idle);
        assert_eq!(signals.amplitude(), BASELINE);

        sampler.tick(&RecordingState::CountingDown(2));
        assert_eq!(signals.amplitude(), BASELINE);

        sampler.tick(&RecordingState::Paused);
        assert_eq!(signals.amplitude(), BASELINE);

        sampler.tick(&RecordingState::Recording);
        assert_eq!(signals.amplitude(), SILENCE_BYTE as f32);
    }

    #[test]
    fn test_paused_tick_keeps_sampler_live() {
        let (mut sampler, signals) = sampler_with_tap(&vec![0i16; WINDOW_SIZE]);

        sampler.tick(&RecordingState::Paused);
        assert!(sampler.is_live());
        assert_eq!(signals.amplitude(), BASELINE);

        // First recording tick after the pause lands immediately
        sampler.tick(&RecordingState::Recording);
        assert_eq!(signals.amplitude(), SILENCE_BYTE as f32);
    }

    #[test]
    fn test_amplitude_is_buffer_mean() {
        let (mut sampler, signals) = sampler_with_tap(&vec![0i16; WINDOW_SIZE]);

        sampler.tick(&RecordingState::Recording);

        let tap = AnalysisTap::new();
        tap.push(&vec![0i16; WINDOW_SIZE]);
        let mut expected = [0u8; WINDOW_SIZE];
        tap.read_time_domain(&mut expected);
        let expected_mean: u32 = expected.iter().map(|&b| b as u32).sum();

        assert_eq!(
            signals.amplitude(),
            expected_mean as f32 / WINDOW_SIZE as f32
        );
    }

    #[test]
    fn test_frequency_amplitude_is_ten_times_mean() {
        let tone: Vec<i16> = (0..WINDOW_SIZE)
            .map(|i| {
                ((2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() * 16000.0)
                    as i16
            })
            .collect();
        let (mut sampler, signals) = sampler_with_tap(&tone);

        sampler.tick(&RecordingState::Recording);

        let tap = AnalysisTap::new();
        tap.push(&tone);
        let mut freq = [0u8; WINDOW_SIZE];
        tap.read_frequency_domain(&mut freq);
        let raw_mean: f32 =
            freq.iter().map(|&b| b as u32).sum::<u32>() as f32 / WINDOW_SIZE as f32;

        assert_eq!(signals.frequency_amplitude(), raw_mean * FREQUENCY_SCALE);
    }

    #[test]
    fn test_stopped_sampler_is_inert() {
        let (mut sampler, signals) = sampler_with_tap(&vec![i16::MAX; WINDOW_SIZE]);

        sampler.stop();
        sampler.tick(&RecordingState::Recording);

        assert!(!sampler.is_live());
        assert_eq!(signals.amplitude(), BASELINE);
    }

    #[test]
    fn test_tick_without_tap_is_noop() {
        let signals = Arc::new(DriveSignals::new());
        let mut sampler = SignalSampler::new(Arc::clone(&signals));

        sampler.tick(&RecordingState::Recording);
        assert_eq!(signals.amplitude(), BASELINE);
    }
}
