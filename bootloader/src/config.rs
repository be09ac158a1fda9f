// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Run-time settings, defaulting to the device constants.

use crate::flash::Region;
use consts::*;

/// Flash regions used by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// Download target.
    pub slot_a: Region,
    /// Runnable image.
    pub slot_b: Region,
    /// Device identity page.
    pub params: Region,
    /// This bootloader, for its own version.
    pub bootloader: Region,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            slot_a: Region::new(BASE_SLOT_A_ADDR, SLOT_SIZE),
            slot_b: Region::new(BASE_SLOT_B_ADDR, SLOT_SIZE),
            params: Region::new(BASE_PARAMS_ADDR, PARAMS_SIZE),
            bootloader: Region::new(BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub layout: Layout,
    pub ble_name: &'static str,
    pub connect_wait_ms: u64,
    pub ready_attempts: u32,
    pub ready_timeout_ms: u64,
    pub power_settle_ms: u32,
    pub restore_settle_ms: u32,
    pub flush_delay_ms: u32,
    pub at_timeout_ms: u64,
    pub at_restore_timeout_ms: u64,
    pub at_query_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            ble_name: BLE_NAME,
            connect_wait_ms: CONNECT_WAIT_MS,
            ready_attempts: READY_ATTEMPTS,
            ready_timeout_ms: READY_TIMEOUT_MS,
            power_settle_ms: POWER_SETTLE_MS,
            restore_settle_ms: RESTORE_SETTLE_MS,
            flush_delay_ms: DYING_GASP_FLUSH_MS,
            at_timeout_ms: AT_TIMEOUT_MS,
            at_restore_timeout_ms: AT_RESTORE_TIMEOUT_MS,
            at_query_timeout_ms: AT_QUERY_TIMEOUT_MS,
        }
    }
}
