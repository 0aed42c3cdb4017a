//! Protocol sessions.
//!
//! A session borrows a [`Link`](crate::link::Link) exclusively for one
//! interaction: an identity query ([`CommandSession`]) or a firmware
//! transfer ([`FlashSession`]).

pub mod command;
pub mod flash;

pub use {
    command::{BootloaderInfo, BootloaderVersion, CommandSession, InfoCommand},
    flash::{FlashConfig, FlashSession, FlashState},
};
