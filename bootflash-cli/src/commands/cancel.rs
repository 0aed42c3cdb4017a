//! Cancel command implementation.

use {
    super::open_link,
    crate::{Cli, config::Config},
    anyhow::Result,
    bootflash::CommandSession,
    console::style,
};

/// Send the transfer cancel frame.
pub(crate) fn cmd_cancel(cli: &Cli, config: &Config) -> Result<()> {
    let (link, _) = open_link(cli, config)?;
    CommandSession::new(&link)?.cancel_transfer()?;

    if !cli.quiet {
        eprintln!("{} Cancel request sent", style("✓").green());
    }

    Ok(())
}
