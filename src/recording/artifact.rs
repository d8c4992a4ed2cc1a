//! The finalized recording artifact.
//!
//! An artifact is produced when a capture session ends: the session's PCM
//! chunks are concatenated in arrival order and wrapped in a WAV container.
//! At most one artifact is held at a time, in a shared slot the render loop
//! polls, since finalization completes asynchronously after stop. The slot
//! carries a generation counter so a finalizer that completes after the user
//! deleted the take cannot re-publish it.

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Suggested filename when saving an artifact.
pub const DEFAULT_FILENAME: &str = "audio.wav";

pub fn new_slot() -> Arc<ArtifactSlot> {
    Arc::new(ArtifactSlot::new())
}

/// Shared slot holding the most recent artifact, if any.
///
/// Written by the finalizer task after end-of-stream, cleared on delete,
/// replaced by the next successful recording. Every clear bumps the
/// generation; a publish only lands if its ticket still matches, so a stale
/// finalizer observes the delete and discards its artifact.
pub struct ArtifactSlot {
    inner: Mutex<SlotInner>,
}

struct SlotInner {
    generation: u64,
    artifact: Option<Artifact>,
}

impl ArtifactSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                generation: 0,
                artifact: None,
            }),
        }
    }

    /// The current generation, captured when a session stops.
    pub fn ticket(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }

    /// Stores the artifact if `ticket` is still current.
    ///
    /// Returns false when the slot was cleared after the ticket was taken;
    /// the artifact is dropped in that case.
    pub fn publish(&self, ticket: u64, artifact: Artifact) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.generation != ticket {
            return false;
        }
        inner.artifact = Some(artifact);
        true
    }

    /// Discards the held artifact and invalidates outstanding tickets.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        inner.artifact = None;
    }

    /// Duration of the held artifact, if any.
    pub fn duration_secs(&self) -> Option<f32> {
        self.inner
            .lock()
            .unwrap()
            .artifact
            .as_ref()
            .map(Artifact::duration_secs)
    }

    /// Writes the held artifact's WAV image to disk.
    ///
    /// Returns `Ok(false)` without touching the filesystem when the slot is
    /// empty, so a save after delete is a no-op.
    pub fn save_to(&self, path: &Path) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        let Some(artifact) = inner.artifact.as_ref() else {
            return Ok(false);
        };
        artifact.save_to(path)?;
        Ok(true)
    }

    #[cfg(test)]
    pub fn pcm_snapshot(&self) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .artifact
            .as_ref()
            .map(|a| a.pcm.clone())
    }
}

impl Default for ArtifactSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished recording: raw PCM payload plus its WAV encoding.
pub struct Artifact {
    pcm: Vec<u8>,
    wav: Vec<u8>,
    sample_rate: u32,
}

impl Artifact {
    /// Builds an artifact from a session's chunks, concatenated in arrival
    /// order. Empty chunks are dropped. Samples are 16-bit little-endian
    /// mono PCM.
    pub fn from_chunks(chunks: Vec<Vec<u8>>, sample_rate: u32) -> Result<Self> {
        let mut pcm = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in &chunks {
            if !chunk.is_empty() {
                pcm.extend_from_slice(chunk);
            }
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut wav = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut wav), spec)?;
            for pair in pcm.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
            writer.finalize()?;
        }

        Ok(Self {
            pcm,
            wav,
            sample_rate,
        })
    }

    /// The concatenated PCM payload, exactly as the chunks arrived.
    pub fn pcm_bytes(&self) -> &[u8] {
        &self.pcm
    }

    /// The complete WAV file image.
    pub fn wav_bytes(&self) -> &[u8] {
        &self.wav
    }

    pub fn duration_secs(&self) -> f32 {
        (self.pcm.len() / 2) as f32 / self.sample_rate as f32
    }

    /// Writes the WAV image to disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.wav)?;
        tracing::info!(
            "Recording saved: {} ({} bytes, {:.2}s)",
            path.display(),
            self.wav.len(),
            self.duration_secs()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn artifact(samples: &[i16]) -> Artifact {
        Artifact::from_chunks(vec![chunk(samples)], 16000).unwrap()
    }

    #[test]
    fn test_pcm_is_concatenation_in_arrival_order() {
        let a = chunk(&[1, 2, 3]);
        let b = chunk(&[-4, 5]);
        let artifact = Artifact::from_chunks(vec![a.clone(), b.clone()], 16000).unwrap();

        let mut expected = a;
        expected.extend_from_slice(&b);
        assert_eq!(artifact.pcm_bytes(), expected.as_slice());
    }

    #[test]
    fn test_empty_chunks_are_dropped() {
        let a = chunk(&[7, 8]);
        let artifact =
            Artifact::from_chunks(vec![Vec::new(), a.clone(), Vec::new()], 16000).unwrap();
        assert_eq!(artifact.pcm_bytes(), a.as_slice());
    }

    #[test]
    fn test_wav_payload_round_trips_samples() {
        let samples = [100i16, -200, 300, -32768, 32767];
        let artifact = Artifact::from_chunks(vec![chunk(&samples)], 16000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(artifact.wav_bytes())).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16000);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_duration_from_sample_count() {
        let samples = vec![0i16; 16000];
        let artifact = Artifact::from_chunks(vec![chunk(&samples)], 16000).unwrap();
        assert!((artifact.duration_secs() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_no_chunks_yields_empty_payload() {
        let artifact = Artifact::from_chunks(Vec::new(), 16000).unwrap();
        assert!(artifact.pcm_bytes().is_empty());
        // Still a valid, if silent, WAV container
        let reader = hound::WavReader::new(Cursor::new(artifact.wav_bytes())).unwrap();
        assert_eq!(reader.len(), 0);
    }

    #[test]
    fn test_publish_with_current_ticket_lands() {
        let slot = ArtifactSlot::new();
        let ticket = slot.ticket();

        assert!(slot.publish(ticket, artifact(&[1, 2])));
        assert!(slot.duration_secs().is_some());
    }

    #[test]
    fn test_clear_invalidates_outstanding_ticket() {
        let slot = ArtifactSlot::new();
        let ticket = slot.ticket();
        slot.clear();

        // A finalizer that outlived the delete must not resurrect the take
        assert!(!slot.publish(ticket, artifact(&[1, 2])));
        assert!(slot.duration_secs().is_none());
    }

    #[test]
    fn test_save_after_delete_is_noop() {
        let slot = ArtifactSlot::new();
        slot.publish(slot.ticket(), artifact(&[3, 4]));
        slot.clear();

        let path = std::env::temp_dir().join("babble_deleted_take.wav");
        let _ = std::fs::remove_file(&path);

        assert!(!slot.save_to(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_slot_save_writes_wav_to_disk() {
        let slot = ArtifactSlot::new();
        let samples = [10i16, -20, 30];
        slot.publish(slot.ticket(), artifact(&samples));

        let path = std::env::temp_dir().join("babble_saved_take.wav");
        let _ = std::fs::remove_file(&path);

        assert!(slot.save_to(&path).unwrap());
        let mut reader = hound::WavReader::open(&path).unwrap();
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
        std::fs::remove_file(&path).unwrap();
    }
}
