//! The recorder: countdown, capture, live waveform, save/delete.
//!
//! Runs the render loop that drives everything: key presses and countdown
//! ticks become state machine events, the reducer's effects are executed
//! here, and the signal sampler ticks once per frame. Supports an external
//! stop trigger via SIGUSR1.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BabbleConfig;
use crate::recording::{
    artifact, reduce_from, ArtifactSlot, CaptureSession, CountdownTimer, DriveSignals, Effect,
    RecorderCommand, RecorderTui, RecordingEvent, RecordingState, SignalSampler,
};
use crate::ui::ErrorScreen;

/// Target render cadence. Not exact: input polling and draw time shift it.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Runs the interactive recorder until the user quits.
///
/// # Errors
/// - If the configuration file is malformed
/// - If the terminal UI cannot be initialized
pub async fn handle_record() -> Result<(), anyhow::Error> {
    tracing::info!("=== babble recorder started ===");

    let config = match BabbleConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            let message = format!(
                "Configuration Error:\n\n{err}\n\nPlease check your ~/.config/babble/babble.toml file and try again."
            );
            let mut error_screen = ErrorScreen::new()?;
            error_screen.show_error(&message)?;
            error_screen.cleanup()?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, countdown={}s, mode={}",
        config.audio.device,
        config.audio.sample_rate,
        config.recorder.countdown_secs,
        config.recorder.waveform_mode
    );

    let mut tui = RecorderTui::new(config.recorder.waveform_mode)
        .map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;

    // External stop trigger, mirroring a hardware button
    let external_stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&external_stop))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let signals = Arc::new(DriveSignals::new());
    let mut sampler = SignalSampler::new(Arc::clone(&signals));
    let artifact_slot = artifact::new_slot();

    let mut state = RecordingState::Idle;
    let mut countdown: Option<CountdownTimer> = None;
    let mut session: Option<CaptureSession> = None;
    let mut frame_count = 0u64;

    loop {
        if external_stop.swap(false, Ordering::Relaxed)
            && matches!(state, RecordingState::Recording | RecordingState::Paused)
        {
            tracing::info!("Received SIGUSR1: stopping recording via external trigger");
            dispatch(
                RecordingEvent::Stop,
                &mut state,
                &config,
                &mut countdown,
                &mut session,
                &mut sampler,
                &artifact_slot,
                &mut tui,
            );
        }

        let event = match tui.handle_input(&state)? {
            RecorderCommand::Continue => None,
            RecorderCommand::Start => Some(RecordingEvent::Start),
            RecorderCommand::Stop => Some(RecordingEvent::Stop),
            RecorderCommand::TogglePause => Some(if state == RecordingState::Paused {
                RecordingEvent::Resume
            } else {
                RecordingEvent::Pause
            }),
            RecorderCommand::Delete => Some(RecordingEvent::Delete),
            RecorderCommand::ToggleMode => {
                tui.toggle_mode();
                None
            }
            RecorderCommand::Save => {
                save_artifact(&artifact_slot, &config, &mut tui);
                None
            }
            RecorderCommand::Quit => break,
        };

        if let Some(event) = event {
            dispatch(
                event,
                &mut state,
                &config,
                &mut countdown,
                &mut session,
                &mut sampler,
                &artifact_slot,
                &mut tui,
            );
        }

        if countdown.as_mut().is_some_and(|timer| timer.poll()) {
            dispatch(
                RecordingEvent::CountdownTick,
                &mut state,
                &config,
                &mut countdown,
                &mut session,
                &mut sampler,
                &artifact_slot,
                &mut tui,
            );
        }

        sampler.tick(&state);
        tui.set_paused(state == RecordingState::Paused);

        frame_count += 1;
        if frame_count % 600 == 0 && state == RecordingState::Recording {
            tracing::debug!(
                "Recording: amplitude={:.1}, frequency_amplitude={:.1}",
                signals.amplitude(),
                signals.frequency_amplitude()
            );
        }

        let artifact_secs = artifact_slot.duration_secs();
        tui.render(&state, &signals, artifact_secs)
            .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;

        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    // Quitting mid-recording discards the take; saves are always explicit
    sampler.stop();
    if let Some(open) = session.take() {
        open.abort();
    }

    tui.cleanup()
        .map_err(|e| anyhow::anyhow!("Cleanup failed: {e}"))?;
    tracing::info!("=== babble recorder exited ===");
    Ok(())
}

/// Applies one event to the state machine and executes its effects.
#[allow(clippy::too_many_arguments)]
fn dispatch(
    event: RecordingEvent,
    state: &mut RecordingState,
    config: &BabbleConfig,
    countdown: &mut Option<CountdownTimer>,
    session: &mut Option<CaptureSession>,
    sampler: &mut SignalSampler,
    artifact_slot: &Arc<ArtifactSlot>,
    tui: &mut RecorderTui,
) {
    let (next, effects) = reduce_from(*state, event, config.recorder.countdown_secs);
    *state = next;

    for effect in effects {
        match effect {
            Effect::StartCountdown => {
                *countdown = Some(CountdownTimer::start());
            }
            Effect::CancelCountdown => {
                *countdown = None;
            }
            Effect::OpenSession => {
                match CaptureSession::open(&config.audio.device, config.audio.sample_rate) {
                    Ok(opened) => {
                        *session = Some(opened);
                        tui.session_started();
                    }
                    Err(e) => {
                        // Recoverable: log, fall back to Idle, let the user retry
                        tracing::error!("Failed to open capture session: {}", e);
                        tui.set_status(format!("{e}"));
                        *state = RecordingState::Idle;
                    }
                }
            }
            Effect::StartSampler => {
                if let Some(open) = session.as_ref() {
                    sampler.start(open.tap());
                }
            }
            Effect::PauseRecorder => {
                if let Some(open) = session.as_ref() {
                    open.pause();
                }
            }
            Effect::ResumeRecorder => {
                if let Some(open) = session.as_ref() {
                    open.resume();
                }
            }
            Effect::StopSampler => {
                sampler.stop();
            }
            Effect::StopSession => {
                if let Some(open) = session.take() {
                    open.stop(Arc::clone(artifact_slot));
                }
            }
            Effect::AbortSession => {
                if let Some(open) = session.take() {
                    open.abort();
                }
            }
            Effect::ClearArtifact => {
                artifact_slot.clear();
                tracing::debug!("Artifact cleared");
            }
        }
    }
}

/// Writes the current artifact to the configured filename.
///
/// An empty slot (nothing recorded yet, or the take was deleted) makes the
/// save a no-op; the slot decides, this only reports the outcome.
fn save_artifact(artifact_slot: &ArtifactSlot, config: &BabbleConfig, tui: &mut RecorderTui) {
    let path = std::path::Path::new(&config.recorder.output_filename);
    match artifact_slot.save_to(path) {
        Ok(true) => tui.set_status(format!("Saved {}", path.display())),
        Ok(false) => tracing::debug!("Save requested with no artifact present"),
        Err(e) => {
            tracing::error!("Failed to save recording: {}", e);
            tui.set_status(format!("Save failed: {e}"));
        }
    }
}
