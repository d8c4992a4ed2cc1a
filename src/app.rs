//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to the appropriate
//! command handlers.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process;

/// A terminal voice recorder with real-time waveform visualization
#[derive(Parser)]
#[command(name = "babble")]
#[command(version)]
#[command(about = "Record your voice with a live waveform in the terminal")]
#[command(
    long_about = "A terminal voice recorder with real-time waveform visualization.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n\nEXAMPLES:\n    # Start the recorder\n    $ babble\n    $ babble record\n\n    # List audio input devices\n    $ babble list-devices\n\n    # Edit configuration file\n    $ babble config"
)]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/babble/babble.toml\n    Logs:               ~/.local/state/babble/babble.log.*\n\nKEYS (in the recorder):\n    Enter               start / stop\n    Space               pause / resume\n    m                   switch waveform mode\n    d                   delete recording\n    w                   save recording\n    q / Esc             quit"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record audio with real-time waveform visualization (default)
    ///
    /// Enter starts a 3-second countdown, then recording begins. Space
    /// pauses and resumes, Enter stops, w saves the take, d discards it.
    #[command(visible_alias = "r")]
    Record,

    /// Open configuration file in your preferred editor
    ///
    /// Edit audio device, sample rate, countdown length, and waveform mode.
    /// Uses $EDITOR or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input devices
    ///
    /// Shows device IDs, names, and configurations to help configure the
    /// correct input device in babble.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   babble completions bash > babble.bash
    ///   babble completions zsh > _babble
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the main application based on command-line arguments.
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that don't need logging setup
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "babble", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            return match commands::handle_list_devices() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        Some(Commands::Logs) => {
            return match commands::handle_logs() {
                Ok(()) => Ok(()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            };
        }
        _ => {}
    }

    logging::init_logging()?;

    match cli.command {
        None | Some(Commands::Record) => {
            commands::handle_record().await?;
        }
        Some(Commands::Config) => {
            commands::handle_config()?;
        }
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}
