//! Terminal user interface for the voice recorder.
//!
//! Renders the live waveform shaped by the drive signals, the countdown
//! digits, and a footer with elapsed time and key hints. Input handling maps
//! key presses onto recorder commands; the state machine decides what they
//! mean.

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    style::{Color, Style},
    widgets::{Paragraph, Sparkline},
};
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

use crate::config::WaveformMode;
use crate::recording::sampler::DriveSignals;
use crate::recording::state::RecordingState;

/// Number of half-waves drawn across the terminal width.
const WAVE_BONES: usize = 5;

/// Phase advance per frame; controls how fast the wave crawls sideways.
const WAVE_SPEED: f32 = 0.25;

/// User input command from the recorder screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    /// No key pressed, keep rendering
    Continue,
    /// Begin the countdown (Enter while idle)
    Start,
    /// Stop the recording (Enter while recording or paused)
    Stop,
    /// Pause or resume (Space)
    TogglePause,
    /// Discard the artifact, or abort an active recording ('d')
    Delete,
    /// Save the artifact to disk ('w')
    Save,
    /// Switch which drive signal shapes the wave ('m')
    ToggleMode,
    /// Leave the recorder ('q', Escape, Ctrl+C)
    Quit,
}

/// Full-screen recorder UI.
pub struct RecorderTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    /// Which drive signal currently shapes the wave
    pub mode: WaveformMode,
    wave_phase: f32,
    wave: Vec<u64>,
    recording_start: Option<Instant>,
    is_paused: bool,
    pause_duration: Duration,
    pause_start_time: Option<Instant>,
    /// Last recoverable error, shown in the footer until the next start
    status_message: Option<String>,
}

impl RecorderTui {
    /// Creates the UI and enters alternate screen mode.
    ///
    /// # Errors
    /// - If raw mode cannot be enabled or the terminal initialized
    pub fn new(mode: WaveformMode) -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(RecorderTui {
            terminal,
            mode,
            wave_phase: 0.0,
            wave: Vec::new(),
            recording_start: None,
            is_paused: false,
            pause_duration: Duration::ZERO,
            pause_start_time: None,
            status_message: None,
        })
    }

    /// Marks the start of a recording session for duration tracking.
    pub fn session_started(&mut self) {
        self.recording_start = Some(Instant::now());
        self.is_paused = false;
        self.pause_duration = Duration::ZERO;
        self.pause_start_time = None;
        self.status_message = None;
    }

    /// Mirrors the machine's pause state, accumulating paused time so the
    /// elapsed display excludes it.
    pub fn set_paused(&mut self, paused: bool) {
        if paused == self.is_paused {
            return;
        }
        if paused {
            self.pause_start_time = Some(Instant::now());
        } else if let Some(start) = self.pause_start_time.take() {
            self.pause_duration += start.elapsed();
        }
        self.is_paused = paused;
    }

    /// Shows a recoverable error or confirmation in the footer.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
    }

    /// Renders one frame for the given state.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(
        &mut self,
        state: &RecordingState,
        signals: &DriveSignals,
        artifact_secs: Option<f32>,
    ) -> anyhow::Result<()> {
        let width = self.terminal.size()?.width as usize;

        // The wave only moves while actually recording
        if *state == RecordingState::Recording {
            self.wave_phase += WAVE_SPEED;
        }
        let drive = match self.mode {
            WaveformMode::Amplitude => signals.amplitude() / 255.0,
            WaveformMode::Frequency => signals.frequency_amplitude() / 2550.0,
        };
        shape_wave(&mut self.wave, width, drive.clamp(0.0, 1.0), self.wave_phase);

        let show_wave = *state == RecordingState::Recording;
        let countdown = match state {
            RecordingState::CountingDown(n) => Some(*n),
            _ => None,
        };
        let elapsed = self.elapsed();
        let is_paused = self.is_paused;
        let mode = self.mode;
        let status = self.status_message.clone();
        let wave = &self.wave;

        self.terminal.draw(|frame| {
            let area = frame.area();
            let footer_height = 1;
            let content_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(footer_height),
            };

            if let Some(n) = countdown {
                let digit = Paragraph::new(format!("{n}"))
                    .alignment(Alignment::Center)
                    .style(
                        Style::default()
                            .fg(Color::Rgb(255, 69, 0))
                            .add_modifier(Modifier::BOLD),
                    );
                let centered = Rect {
                    x: content_area.x,
                    y: content_area.y + content_area.height / 2,
                    width: content_area.width,
                    height: 1,
                };
                frame.render_widget(digit, centered);
            } else if show_wave {
                // Mirrored sparklines fake a filled wave around the midline
                let top_height = content_area.height / 2;
                let top_area = Rect {
                    x: content_area.x,
                    y: content_area.y,
                    width: content_area.width,
                    height: top_height,
                };
                let bottom_area = Rect {
                    x: content_area.x,
                    y: content_area.y + top_height,
                    width: content_area.width,
                    height: content_area.height.saturating_sub(top_height),
                };

                let inverted: Vec<u64> =
                    wave.iter().map(|&v| 100_u64.saturating_sub(v)).collect();
                let top = Sparkline::default().data(&inverted).max(100).style(
                    Style::default()
                        .bg(Color::Rgb(255, 69, 0))
                        .fg(Color::Rgb(0, 0, 0)),
                );
                frame.render_widget(top, top_area);

                let bottom = Sparkline::default().data(wave).max(100).style(
                    Style::default()
                        .bg(Color::Rgb(0, 0, 0))
                        .fg(Color::Rgb(255, 69, 0)),
                );
                frame.render_widget(bottom, bottom_area);
            } else {
                let lines = idle_help(artifact_secs, is_paused);
                let help = Paragraph::new(lines).alignment(Alignment::Center);
                let centered = Rect {
                    x: content_area.x,
                    y: content_area.y + content_area.height / 3,
                    width: content_area.width,
                    height: content_area.height - content_area.height / 3,
                };
                frame.render_widget(help, centered);
            }

            let footer_area = Rect {
                x: area.x,
                y: area.y + area.height.saturating_sub(footer_height),
                width: area.width,
                height: footer_height,
            };

            let indicator = match (countdown.is_some(), is_paused) {
                (true, _) => Span::styled("◌ ", Style::default().fg(Color::Yellow)),
                (_, true) => Span::styled("⏸ ", Style::default().fg(Color::Yellow)),
                _ => Span::styled("● ", Style::default().fg(Color::Red)),
            };

            let duration_secs = elapsed.as_secs();
            let mut footer_spans = vec![
                indicator,
                Span::raw(format!("{}:{:02}", duration_secs / 60, duration_secs % 60)),
                Span::raw(" / "),
                Span::raw(format!("{mode}")),
            ];
            if let Some(message) = &status {
                footer_spans.push(Span::raw(" / "));
                footer_spans.push(Span::styled(
                    message.clone(),
                    Style::default().fg(Color::Yellow),
                ));
            }

            let footer = Paragraph::new(Line::from(footer_spans)).style(
                Style::default()
                    .fg(Color::Rgb(185, 207, 212))
                    .bg(Color::Rgb(0, 0, 0)),
            );
            frame.render_widget(footer, footer_area);
        })?;

        Ok(())
    }

    /// Elapsed recording time, excluding paused spans.
    fn elapsed(&self) -> Duration {
        let Some(start) = self.recording_start else {
            return Duration::ZERO;
        };
        let mut paused = self.pause_duration;
        if self.is_paused {
            if let Some(pause_start) = self.pause_start_time {
                paused += pause_start.elapsed();
            }
        }
        start.elapsed().saturating_sub(paused)
    }

    /// Polls for user input, mapped onto recorder commands.
    ///
    /// Enter means `Start` while idle and `Stop` otherwise; everything else
    /// is state-blind and left to the state machine to accept or ignore.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, state: &RecordingState) -> anyhow::Result<RecorderCommand> {
        if event::poll(Duration::from_millis(15))? {
            if let Event::Key(key) = event::read()? {
                return Ok(match key.code {
                    KeyCode::Enter => {
                        if *state == RecordingState::Idle {
                            RecorderCommand::Start
                        } else {
                            RecorderCommand::Stop
                        }
                    }
                    KeyCode::Char(' ') => RecorderCommand::TogglePause,
                    KeyCode::Char('m') => RecorderCommand::ToggleMode,
                    KeyCode::Char('d') => RecorderCommand::Delete,
                    KeyCode::Char('w') => RecorderCommand::Save,
                    KeyCode::Char('q') | KeyCode::Esc => RecorderCommand::Quit,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        RecorderCommand::Quit
                    }
                    _ => RecorderCommand::Continue,
                });
            }
        }
        Ok(RecorderCommand::Continue)
    }

    /// Cleans up terminal state and exits alternate screen mode.
    ///
    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

/// Recomputes the wave column heights in place.
///
/// A standing sine with [`WAVE_BONES`] half-waves crawls sideways with
/// `phase`; `drive` (0-1) scales its height, so louder input means a taller
/// wave.
fn shape_wave(wave: &mut Vec<u64>, width: usize, drive: f32, phase: f32) {
    wave.resize(width, 0);
    for (i, column) in wave.iter_mut().enumerate() {
        let x = i as f32 / width.max(1) as f32;
        let y = (x * WAVE_BONES as f32 * std::f32::consts::PI + phase).sin();
        *column = (y.abs() * drive * 100.0) as u64;
    }
}

fn idle_help(artifact_secs: Option<f32>, is_paused: bool) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        "babble",
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    lines.push(Line::raw(""));
    if is_paused {
        lines.push(Line::raw("Paused"));
        lines.push(Line::raw(""));
        lines.push(Line::raw("Space resume / Enter done / d discard"));
    } else {
        if let Some(secs) = artifact_secs {
            lines.push(Line::raw(format!("Recording ready ({secs:.1}s)")));
            lines.push(Line::raw(""));
            lines.push(Line::raw("w save / d delete / Enter record again"));
        } else {
            lines.push(Line::raw("Press Enter to record"));
        }
        lines.push(Line::raw(""));
        lines.push(Line::raw("m waveform mode / q quit"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_wave_scales_with_drive() {
        let mut quiet = Vec::new();
        shape_wave(&mut quiet, 80, 0.1, 0.0);
        let mut loud = Vec::new();
        shape_wave(&mut loud, 80, 1.0, 0.0);

        let quiet_peak = quiet.iter().max().copied().unwrap();
        let loud_peak = loud.iter().max().copied().unwrap();
        assert!(loud_peak > quiet_peak);
        assert!(loud_peak <= 100);
    }

    #[test]
    fn test_shape_wave_zero_drive_is_flat() {
        let mut wave = vec![50u64; 10];
        shape_wave(&mut wave, 10, 0.0, 1.5);
        assert!(wave.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_shape_wave_resizes_to_width() {
        let mut wave = Vec::new();
        shape_wave(&mut wave, 120, 0.5, 0.0);
        assert_eq!(wave.len(), 120);
        shape_wave(&mut wave, 40, 0.5, 0.0);
        assert_eq!(wave.len(), 40);
    }
}
