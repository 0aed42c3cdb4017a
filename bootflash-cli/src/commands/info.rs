//! Bootloader identity and port listing command implementations.

use {
    super::open_link,
    crate::{Cli, config::Config},
    anyhow::Result,
    bootflash::{BootloaderInfo, CommandSession, PortInfo},
    console::style,
};

fn info_json(port: &str, info: &BootloaderInfo) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "data": {
            "port": port,
            "version": info.version_string(),
            "product_series": info.product_series_string(),
            "product_id": info.product_id_string(),
            "raw": info,
        }
    })
}

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let (link, port) = open_link(cli, config)?;
    let info = CommandSession::new(&link)?.query_info()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info_json(&port, &info))?
        );
        return Ok(());
    }

    if !cli.quiet {
        eprintln!(
            "\n{}",
            style("Bootloader information")
                .bold()
                .underlined()
        );
    }
    println!("{info}");

    Ok(())
}

fn describe_port(port: &PortInfo) -> String {
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_deref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!(
        "{} {}{}{}",
        style("•").green(),
        style(&port.name).cyan(),
        vid_pid,
        product
    )
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = bootflash::list_ports()?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports")
            .bold()
            .underlined()
    );

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for port in &ports {
            eprintln!("  {}", describe_port(port));
        }
    }

    Ok(())
}
