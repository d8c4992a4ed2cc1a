//! Capture session: one end-to-end microphone recording.
//!
//! A session owns the live cpal input stream, the analysis tap fed from it,
//! and the ordered buffer of PCM chunks the stream delivers. Opening a
//! session acquires the microphone; stopping it releases the hardware handle
//! immediately and finalizes the chunks into a WAV artifact asynchronously.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::artifact::{Artifact, ArtifactSlot};
use super::tap::AnalysisTap;

type ChunkBuffer = Arc<Mutex<Vec<Vec<u8>>>>;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Failures acquiring or running the capture stream.
///
/// None of these are fatal: every path degrades to "no recording in
/// progress" and the user can retry the start action.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone access denied")]
    PermissionDenied,
    #[error("no usable audio input device: {0}")]
    DeviceUnavailable(String),
    #[error("audio stream failed: {0}")]
    Stream(String),
}

/// One open microphone recording, from acquisition to finalized artifact.
///
/// At most one session exists at a time; the session owns every handle the
/// capture needs, so dropping it can never leak the microphone indicator.
pub struct CaptureSession {
    /// Active input stream; `None` only after teardown
    stream: Option<cpal::Stream>,
    /// Actual device sample rate (may differ from the requested rate)
    sample_rate: u32,
    /// Non-empty PCM chunks in arrival order
    chunks: ChunkBuffer,
    /// Checked in the audio callback; paused chunks are never produced
    paused: Arc<AtomicBool>,
    /// Analysis window fed from the same stream
    tap: Arc<AnalysisTap>,
}

impl CaptureSession {
    /// Acquires the input device and starts capturing.
    ///
    /// Builds a fresh analysis tap bound to the stream; each chunk the
    /// device delivers is downmixed to mono, teed into the tap, and appended
    /// to the chunk buffer unless the session is paused.
    ///
    /// # Errors
    /// - [`CaptureError::DeviceUnavailable`] if no device matches or it
    ///   cannot be configured
    /// - [`CaptureError::PermissionDenied`] if the platform refuses access
    /// - [`CaptureError::Stream`] if the stream cannot be built or started
    pub fn open(device_name: &str, requested_rate: u32) -> Result<Self, CaptureError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if device_name == "default" {
                host.default_input_device().ok_or_else(|| {
                    CaptureError::DeviceUnavailable("no default input device".into())
                })
            } else {
                find_device(&host, device_name)
            }
        })?;

        let label = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Recording device: {}", label);

        let device_config = device
            .default_input_config()
            .map_err(|e| classify_backend_error(&e.to_string()))?;
        let sample_rate = device_config.sample_rate().0;
        let channels = device_config.channels() as usize;

        if sample_rate != requested_rate {
            tracing::warn!(
                "Requested {}Hz but device uses {}Hz. Capturing at device rate.",
                requested_rate,
                sample_rate
            );
        }
        tracing::debug!("Device configuration: {}Hz, {} channels", sample_rate, channels);

        let chunks: ChunkBuffer = Arc::new(Mutex::new(Vec::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let tap = Arc::new(AnalysisTap::new());

        let chunks_arc = Arc::clone(&chunks);
        let paused_arc = Arc::clone(&paused);
        let tap_arc = Arc::clone(&tap);

        let stream = device
            .build_input_stream(
                &device_config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    Self::handle_chunk(data, channels, &paused_arc, &chunks_arc, &tap_arc);
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    CaptureError::DeviceUnavailable("device disappeared".into())
                }
                other => classify_backend_error(&other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        tracing::debug!("Capture stream started");

        Ok(Self {
            stream: Some(stream),
            sample_rate,
            chunks,
            paused,
            tap,
        })
    }

    /// Body of the input stream callback, runs on the audio thread.
    ///
    /// Paused invocations produce nothing at all, so resuming continues the
    /// chunk sequence exactly where pause left it.
    fn handle_chunk(
        data: &[i16],
        channels: usize,
        paused: &AtomicBool,
        chunks: &Mutex<Vec<Vec<u8>>>,
        tap: &AnalysisTap,
    ) {
        if paused.load(Ordering::Relaxed) {
            return;
        }
        let mono = downmix_to_mono(data, channels);
        if mono.is_empty() {
            return;
        }
        tap.push(&mono);

        let mut chunk = Vec::with_capacity(mono.len() * 2);
        for sample in &mono {
            chunk.extend_from_slice(&sample.to_le_bytes());
        }
        chunks.lock().unwrap().push(chunk);
    }

    /// The analysis tap bound to this session's stream.
    pub fn tap(&self) -> Arc<AnalysisTap> {
        Arc::clone(&self.tap)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stops producing chunks without tearing the stream down.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        tracing::debug!("Capture paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        tracing::debug!("Capture resumed");
    }

    /// Tears the capture down and finalizes the artifact.
    ///
    /// The stream (and with it the microphone) is released before this
    /// returns; the chunks are concatenated into a WAV artifact on a spawned
    /// task, so the artifact lands in `slot` shortly after, asynchronously.
    /// The slot ticket is captured here; a delete issued while finalization
    /// is still pending invalidates it, and the finalizer discards the take.
    pub fn stop(mut self, slot: Arc<ArtifactSlot>) {
        // Explicit teardown releases the hardware handle now, not whenever
        // the session happens to be dropped.
        self.stream = None;
        tracing::debug!("Capture stream released");

        let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
        let sample_rate = self.sample_rate;
        let ticket = slot.ticket();
        tokio::spawn(async move {
            finalize_into(chunks, sample_rate, ticket, &slot);
        });
    }

    /// Tears the capture down and discards the take without finalizing.
    ///
    /// Used when the user deletes mid-recording: the microphone is released
    /// but no artifact is ever produced from the buffered chunks.
    pub fn abort(mut self) {
        self.stream = None;
        let discarded = self.chunks.lock().unwrap().len();
        tracing::info!("Capture aborted, {} chunks discarded", discarded);
    }
}

/// Concatenates a session's chunks into an artifact and publishes it.
///
/// The chunk buffer is consumed; a failure leaves the slot untouched, and a
/// stale ticket (the take was deleted while finalization ran) discards the
/// artifact instead of publishing it.
pub fn finalize_into(chunks: Vec<Vec<u8>>, sample_rate: u32, ticket: u64, slot: &ArtifactSlot) {
    let chunk_count = chunks.len();
    match Artifact::from_chunks(chunks, sample_rate) {
        Ok(artifact) => {
            let secs = artifact.duration_secs();
            if slot.publish(ticket, artifact) {
                tracing::info!(
                    "Recording finalized: {:.2}s from {} chunks at {}Hz",
                    secs,
                    chunk_count,
                    sample_rate
                );
            } else {
                tracing::info!("Recording was deleted before finalization, discarding");
            }
        }
        Err(e) => {
            tracing::error!("Failed to finalize recording: {}", e);
        }
    }
}

/// Averages interleaved channels down to mono.
fn downmix_to_mono(data: &[i16], num_channels: usize) -> Vec<i16> {
    match num_channels {
        0 | 1 => data.to_vec(),
        2 => data
            .chunks_exact(2)
            .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
            .collect(),
        n => data
            .chunks_exact(n)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / n as i32) as i16
            })
            .collect(),
    }
}

/// Maps opaque backend error text onto the capture taxonomy.
fn classify_backend_error(message: &str) -> CaptureError {
    let lowered = message.to_lowercase();
    if lowered.contains("denied") || lowered.contains("permission") {
        CaptureError::PermissionDenied
    } else if lowered.contains("not available")
        || lowered.contains("unavailable")
        || lowered.contains("no such device")
    {
        CaptureError::DeviceUnavailable(message.to_string())
    } else {
        CaptureError::Stream(message.to_string())
    }
}

/// Finds an input device by name or numeric index.
fn find_device(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device, CaptureError> {
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        return devices.into_iter().nth(index).ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("device index {index} out of range"))
        });
    }

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n == device_spec).unwrap_or(false))
        .ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!(
                "input device '{device_spec}' not found; see 'babble list-devices'"
            ))
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library
/// warnings on Linux. On other platforms this is a no-op.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let dev_null = match OpenOptions::new().write(true).open("/dev/null") {
        Ok(f) => f,
        Err(_) => return f(),
    };
    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return f();
    }
    if unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(old_stderr) };
        return f();
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::artifact;

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix_to_mono(&[1, 2, 3], 1), vec![1, 2, 3]);
    }

    #[test]
    fn test_downmix_stereo_averages_pairs() {
        assert_eq!(downmix_to_mono(&[100, 200, -50, 50], 2), vec![150, 0]);
    }

    #[test]
    fn test_downmix_multichannel_averages_frames() {
        assert_eq!(downmix_to_mono(&[30, 60, 90, 3, 6, 9], 3), vec![60, 6]);
    }

    #[test]
    fn test_finalize_publishes_artifact_into_slot() {
        let slot = artifact::new_slot();
        let chunks = vec![vec![1u8, 0, 2, 0], vec![], vec![3, 0]];

        finalize_into(chunks, 16000, slot.ticket(), &slot);

        let pcm = slot.pcm_snapshot().expect("artifact should be published");
        assert_eq!(pcm, vec![1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn test_finalize_replaces_previous_artifact() {
        let slot = artifact::new_slot();
        finalize_into(vec![vec![1, 0]], 16000, slot.ticket(), &slot);
        finalize_into(vec![vec![9, 0]], 16000, slot.ticket(), &slot);

        assert_eq!(slot.pcm_snapshot().unwrap(), vec![9, 0]);
    }

    #[test]
    fn test_finalize_after_delete_discards_take() {
        let slot = artifact::new_slot();
        let ticket = slot.ticket();
        slot.clear();

        finalize_into(vec![vec![1, 0]], 16000, ticket, &slot);

        assert!(slot.pcm_snapshot().is_none());
    }

    fn callback_fixture() -> (Arc<AtomicBool>, Mutex<Vec<Vec<u8>>>, AnalysisTap) {
        (
            Arc::new(AtomicBool::new(false)),
            Mutex::new(Vec::new()),
            AnalysisTap::new(),
        )
    }

    #[test]
    fn test_paused_callback_appends_nothing() {
        let (paused, chunks, tap) = callback_fixture();
        paused.store(true, Ordering::Relaxed);

        CaptureSession::handle_chunk(&[100, -100], 1, &paused, &chunks, &tap);

        assert!(chunks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_pause_resume_boundary_preserves_chunk_order() {
        let (paused, chunks, tap) = callback_fixture();

        CaptureSession::handle_chunk(&[1, 2], 1, &paused, &chunks, &tap);

        paused.store(true, Ordering::Relaxed);
        CaptureSession::handle_chunk(&[99, 99], 1, &paused, &chunks, &tap);

        paused.store(false, Ordering::Relaxed);
        CaptureSession::handle_chunk(&[3, 4], 1, &paused, &chunks, &tap);

        // Paused audio is gone; the surviving chunks are intact and in order
        let collected = chunks.lock().unwrap();
        assert_eq!(
            *collected,
            vec![
                vec![1u8, 0, 2, 0],
                vec![3, 0, 4, 0],
            ]
        );
    }

    #[test]
    fn test_callback_feeds_tap_and_downmixes() {
        let (paused, chunks, tap) = callback_fixture();

        // Stereo frames average into mono before hitting the tap or buffer
        CaptureSession::handle_chunk(&[100, 200, -50, 50], 2, &paused, &chunks, &tap);

        assert_eq!(tap.len(), 2);
        assert_eq!(*chunks.lock().unwrap(), vec![vec![150u8, 0, 0, 0]]);
    }

    #[test]
    fn test_backend_error_classification() {
        assert!(matches!(
            classify_backend_error("Access denied by policy"),
            CaptureError::PermissionDenied
        ));
        assert!(matches!(
            classify_backend_error("the requested device is not available"),
            CaptureError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            classify_backend_error("No such device"),
            CaptureError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            classify_backend_error("ALSA underrun"),
            CaptureError::Stream(_)
        ));
    }
}
