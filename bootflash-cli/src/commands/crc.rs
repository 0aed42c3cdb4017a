//! Offline image checksum.

use {
    anyhow::{Context, Result},
    bootflash::crc32,
    std::path::Path,
};

fn describe(data: &[u8]) -> String {
    format!(
        "size:   {} bytes\nchunks: {}\ncrc32:  0x{:08X}",
        data.len(),
        data.len().div_ceil(bootflash::protocol::MAX_PAYLOAD),
        crc32(data)
    )
}

/// Print the size and CRC-32 of `file`.
pub(crate) fn cmd_crc(file: &Path) -> Result<()> {
    let data =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}", describe(&data));
    Ok(())
}
