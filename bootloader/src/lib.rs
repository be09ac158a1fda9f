// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Second stage bootloader.
//!
//! At power-on it checks slot A for a verified download and resets so the
//! first stage can promote it, or jumps to the verified image in slot B.
//! Without a usable image it fetches one from the peer over the BLE module.
//! Everything here is hardware independent, the binary provides the flash,
//! UART, GPIO and timing implementations.

#![cfg_attr(not(test), no_std)]

// Must stay first, the log macros are used by every other module.
mod fmt;

pub mod at;
pub mod boot;
pub mod config;
pub mod download;
pub mod error;
pub mod flash;
pub mod identity;
pub mod line;
pub mod metadata;
pub mod modem;
pub mod ring;
pub mod transport;
pub mod verify;

#[cfg(test)]
mod tests;
