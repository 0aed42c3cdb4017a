//! bootflash CLI - Command-line tool for flashing firmware through the
//! 8-byte frame serial bootloader.
//!
//! ## Features
//!
//! - Flash raw binary firmware images with optional CRC-32 check
//! - Query bootloader version, product series and product id
//! - Cancel a transfer stuck on the device
//! - Compute the image CRC-32 offline
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use commands::{
    cancel::cmd_cancel,
    completions::cmd_completions,
    crc::cmd_crc,
    flash::cmd_flash,
    info::{cmd_info, cmd_list_ports},
};
use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// bootflash - Flash firmware through the 8-byte frame serial bootloader.
///
/// Environment variables:
///   BOOTFLASH_PORT   - Default serial port
///   BOOTFLASH_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "bootflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if only one is present).
    #[arg(short, long, global = true, env = "BOOTFLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate (default: 115200).
    #[arg(short, long, global = true, env = "BOOTFLASH_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Baud rate from the command line, then the config file, then the default.
    pub(crate) fn effective_baud(&self, config: &Config) -> u32 {
        self.baud
            .or(config.port.connection.baud)
            .unwrap_or(bootflash::port::DEFAULT_BAUD)
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash a raw binary firmware image.
    Flash {
        /// Path to the firmware image.
        firmware: PathBuf,

        /// Do not send the image CRC-32 header.
        #[arg(long)]
        no_crc: bool,

        /// Per-chunk acknowledgement timeout in milliseconds.
        #[arg(long, value_name = "MS")]
        chunk_timeout: Option<u64>,
    },

    /// Query the bootloader version, product series and product id.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Ask the bootloader to abandon a transfer in progress.
    Cancel,

    /// Print the size and CRC-32 of a firmware image.
    Crc {
        /// Path to the firmware image.
        file: PathBuf,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        Some(CliError::Cancelled(_)) => 130,
        None => match err.downcast_ref::<bootflash::Error>() {
            Some(bootflash::Error::Interrupted) => 130,
            _ => 1,
        },
    }
}

fn init_logging(cli: &Cli) {
    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    init_logging(cli);

    debug!(
        "bootflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    bootflash::set_interrupt_checker(was_interrupted);

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            no_crc,
            chunk_timeout,
        } => cmd_flash(cli, &config, firmware, *no_crc, *chunk_timeout),
        Commands::Info { json } => cmd_info(cli, &config, *json),
        Commands::Cancel => cmd_cancel(cli, &config),
        Commands::Crc { file } => cmd_crc(file),
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        // Verifies that all derive macros produce a valid clap Command
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from([
            "bootflash",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "57600",
            "flash",
            "firmware.bin",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.baud, Some(57600));
        assert!(matches!(cli.command, Commands::Flash { .. }));
    }

    #[test]
    fn test_cli_parse_flash_with_all_options() {
        let cli = Cli::try_parse_from([
            "bootflash",
            "flash",
            "fw.bin",
            "--no-crc",
            "--chunk-timeout",
            "250",
        ])
        .unwrap();
        if let Commands::Flash {
            firmware,
            no_crc,
            chunk_timeout,
        } = cli.command
        {
            assert_eq!(firmware.to_str().unwrap(), "fw.bin");
            assert!(no_crc);
            assert_eq!(chunk_timeout, Some(250));
        } else {
            panic!("expected flash command");
        }
    }

    #[test]
    fn test_cli_parse_info_json() {
        let cli = Cli::try_parse_from(["bootflash", "info", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { json: true }));
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bootflash", "cancel", "-p", "COM4", "-vv", "-q"]).unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM4"));
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Cancel));
    }

    #[test]
    fn test_cli_flash_requires_firmware() {
        assert!(Cli::try_parse_from(["bootflash", "flash"]).is_err());
    }

    #[test]
    fn test_effective_baud_priority() {
        let mut config = Config::default();
        let cli = Cli::try_parse_from(["bootflash", "cancel"]).unwrap();
        assert_eq!(cli.effective_baud(&config), 115200);

        config.port.connection.baud = Some(9600);
        assert_eq!(cli.effective_baud(&config), 9600);

        let cli = Cli::try_parse_from(["bootflash", "-b", "38400", "cancel"]).unwrap();
        assert_eq!(cli.effective_baud(&config), 38400);
    }

    // ---- exit codes ----

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(&CliError::Usage("x".into()).into()), 2);
        assert_eq!(exit_code(&CliError::Cancelled("x".into()).into()), 130);
        assert_eq!(exit_code(&bootflash::Error::Interrupted.into()), 130);
        assert_eq!(
            exit_code(&anyhow::Error::from(bootflash::Error::Busy).context("while flashing")),
            1
        );
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
