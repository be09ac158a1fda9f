// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Size of a flash memory page in bytes (4KB).
/// Erase operations always cover whole pages, so every region below starts
/// and ends on a page boundary.
pub const FLASH_PAGE: u32 = 4096;

/// Total amount of flash on the nRF52805 (192KB).
pub const FLASH_SIZE: u32 = 192 * 1024;

/// Total amount of RAM on the nRF52805 (24KB).
pub const RAM_SIZE: u32 = 24 * 1024;

/// Start address of the first stage loader.
/// The first stage loader owns the reset vector and promotes a verified image
/// from slot A into slot B before handing over to this bootloader.
pub const BASE_FIRST_STAGE_ADDR: u32 = 0x0000_0000;

/// Start address of the parameters page.
/// Holds the device identity record assigned by the peer during pairing.
pub const BASE_PARAMS_ADDR: u32 = 0x0000_4000;

/// Size of the parameters page (one flash page).
pub const PARAMS_SIZE: u32 = FLASH_PAGE;

/// Start address of the second stage bootloader.
pub const BASE_BOOTLOADER_ADDR: u32 = 0x0000_5000;

/// Size of the second stage bootloader partition (44KB).
/// The bootloader image ends with its own metadata record, which is where the
/// bootloader version reported to the peer comes from.
pub const BOOTLOADER_SIZE: u32 = 0xB000;

/// Start address of slot B, the image that is currently allowed to run.
pub const BASE_SLOT_B_ADDR: u32 = 0x0001_0000;

/// Start address of slot A, the download target.
pub const BASE_SLOT_A_ADDR: u32 = 0x0002_0000;

/// Size of each image slot (64KB).
/// Both slots have the same size so that an image downloaded into slot A can
/// be copied into slot B unchanged.
pub const SLOT_SIZE: u32 = 0x10000;

/// Capacity of the receive ring buffer filled from the UART interrupt.
pub const RX_BUFFER_SIZE: usize = 4096;

/// Capacity of the line assembler, including room for the terminator.
/// Lines longer than `LINE_BUFFER_SIZE - 1` characters are truncated.
pub const LINE_BUFFER_SIZE: usize = 128;

/// Largest amount of payload handed to a single flash program call.
pub const FLASH_CHUNK_SIZE: usize = 256;

/// Largest AT command response collected before classification.
pub const AT_RESPONSE_SIZE: usize = 256;

/// UART baud rate used towards the BLE module.
pub const UART_BAUDRATE: u32 = 115_200;

/// How long the module is given to accept a connection before the
/// bootloader enters SPP passthrough mode (10 minutes).
pub const CONNECT_WAIT_MS: u64 = 600_000;

/// Number of windows in which the module may print its `ready` banner.
pub const READY_ATTEMPTS: u32 = 10;

/// Length of a single `ready` window.
pub const READY_TIMEOUT_MS: u64 = 10_000;

/// Settling time for the module power and reset lines.
pub const POWER_SETTLE_MS: u32 = 500;

/// Delay after a factory restore before the module accepts commands again.
pub const RESTORE_SETTLE_MS: u32 = 500;

/// Time given to the UART to drain the last diagnostic before a reset.
pub const DYING_GASP_FLUSH_MS: u32 = 100;

/// Timeout for `AT+RESTORE`, which reboots the module.
pub const AT_RESTORE_TIMEOUT_MS: u64 = 5_000;

/// Timeout for the MAC address query.
pub const AT_QUERY_TIMEOUT_MS: u64 = 3_000;

/// Timeout for every other AT command.
pub const AT_TIMEOUT_MS: u64 = 2_000;

/// Name advertised by the BLE module while waiting for a connection.
pub const BLE_NAME: &str = "Stephano-I";

/// Version reported for a component that has no metadata record in flash.
pub const VERSION_NONE: &str = "0.0.0";
