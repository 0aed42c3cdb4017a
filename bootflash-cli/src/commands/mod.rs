//! Command implementations.
//!
//! Each subcommand is implemented in its own module; port resolution and
//! link setup shared by the device commands live here.

pub(crate) mod cancel;
pub(crate) mod completions;
pub(crate) mod crc;
pub(crate) mod flash;
pub(crate) mod info;

use {
    crate::{Cli, CliError, config::Config, was_interrupted},
    anyhow::{Context, Result},
    bootflash::{Link, NativePort, PortInfo, SerialConfig},
    console::style,
    log::debug,
};

/// Pick the serial port: explicit choice, then config, then the only port present.
pub(crate) fn resolve_port(
    explicit: Option<&str>,
    configured: Option<&str>,
    available: &[PortInfo],
) -> Result<String> {
    if let Some(port) = explicit.or(configured) {
        return Ok(port.to_string());
    }

    match available {
        [only] => {
            debug!("Auto-selected {}", only.name);
            Ok(only.name.clone())
        },
        [] => Err(CliError::Usage(
            "No serial port found; connect the device or pass --port".to_string(),
        )
        .into()),
        many => {
            let names: Vec<&str> = many
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            Err(CliError::Usage(format!(
                "Found multiple serial ports ({}); choose one with --port",
                names.join(", ")
            ))
            .into())
        },
    }
}

/// Get serial port from CLI args, config, or auto-detection.
pub(crate) fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let explicit = cli.port.as_deref();
    let configured = config.port.connection.serial.as_deref();

    let available = if explicit.or(configured).is_some() {
        Vec::new()
    } else {
        bootflash::list_ports().context("Failed to enumerate serial ports")?
    };

    resolve_port(explicit, configured, &available)
}

/// Fail with a cancellation error if Ctrl-C was pressed.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted by user".to_string()).into())
    } else {
        Ok(())
    }
}

/// Resolve, open and wrap the serial port in a live link.
pub(crate) fn open_link(cli: &Cli, config: &Config) -> Result<(Link, String)> {
    let port_name = get_port(cli, config)?;
    let baud = cli.effective_baud(config);

    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port_name).cyan(),
            baud
        );
    }

    let port = NativePort::open(&SerialConfig::new(&port_name, baud))
        .with_context(|| format!("Failed to open serial port {port_name}"))?;
    let link = Link::open(Box::new(port))?;
    ensure_not_interrupted()?;
    Ok((link, port_name))
}
