//! Flash command implementation.

use {
    super::{ensure_not_interrupted, open_link},
    crate::{Cli, CliError, config::Config, use_fancy_output},
    anyhow::{Context, Result},
    bootflash::{FlashConfig, FlashSession, crc32},
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    std::{path::Path, time::Duration},
};

/// Merge command-line flags over the configured transfer defaults.
pub(crate) fn build_flash_config(
    config: &Config,
    no_crc: bool,
    chunk_timeout_ms: Option<u64>,
) -> FlashConfig {
    let skip_crc = no_crc || config.flash.no_crc.unwrap_or(false);
    let mut flash = FlashConfig::default().with_crc(!skip_crc);

    if let Some(ms) = chunk_timeout_ms.or(config.flash.chunk_timeout_ms) {
        flash = flash.with_chunk_timeout(Duration::from_millis(ms));
    }
    if let Some(max) = config.flash.max_size {
        flash = flash.with_max_image_size(max);
    }

    flash
}

/// Headline for a failed transfer; transport faults name the port.
fn failure_context(err: &bootflash::Error, port: &str) -> String {
    if err.is_transport() {
        format!("Flashing failed: lost connection to {port}")
    } else {
        "Flashing failed".to_string()
    }
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    no_crc: bool,
    chunk_timeout_ms: Option<u64>,
) -> Result<()> {
    let image = std::fs::read(firmware)
        .with_context(|| format!("Failed to read firmware {}", firmware.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes, CRC-32 0x{:08X})",
            style("📦").cyan(),
            firmware.display(),
            image.len(),
            crc32(&image)
        );
    }

    let flash_config = build_flash_config(config, no_crc, chunk_timeout_ms);
    let (link, port) = open_link(cli, config)?;

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let mut session = FlashSession::new(&link, flash_config)?;
    let result = session.run(&image, |percent, state| {
        pb.set_position(u64::from(percent));
        pb.set_message(state.to_string());
    });

    match result {
        Ok(()) => pb.finish_with_message("complete"),
        Err(bootflash::Error::Interrupted) => {
            pb.abandon();
            return Err(CliError::Cancelled("Flashing interrupted by user".to_string()).into());
        },
        Err(e) => {
            pb.abandon();
            let context = failure_context(&e, &port);
            return Err(e).context(context);
        },
    }
    drop(session);
    ensure_not_interrupted()?;

    if !cli.quiet {
        eprintln!("\n{} Firmware flashed", style("🎉").green().bold());
    }

    Ok(())
}
