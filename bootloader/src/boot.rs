// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Decide what to do with the images in flash at power-on.

use crate::config::Layout;
use crate::flash::ImageStore;
use crate::metadata::find_metadata;
use crate::verify::{verify_download_state, verify_ready_state};
use app_metadata::{Sha256, State};
use embedded_storage::nor_flash::ReadNorFlash;

/// Initial stack pointer and reset handler of an application, read from the
/// start of its vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppEntry {
    pub vector_table: u32,
    pub stack_pointer: u32,
    pub reset_vector: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decision {
    /// A verified download is waiting in slot A, let the first stage promote it.
    Reset,
    /// Slot B holds a verified image.
    Jump(AppEntry),
    /// Nothing usable, fetch a new image.
    Download,
}

/// Check slot A for a finished download, then slot B for a runnable image.
///
/// A missing, misplaced or corrupted record is never an error, it only makes
/// the check fall through to the next one.
pub fn decide<F, H>(store: &mut ImageStore<F>, layout: &Layout) -> Decision
where
    F: ReadNorFlash,
    H: Sha256 + Default,
{
    if let Some(record) = find_metadata(store, layout.slot_a) {
        info!("slot A record at {=u32:#x}", record.address);
        if record.is_placed(layout.slot_a)
            && record.metadata.state() == State::Download
            && verify_download_state::<F, H>(store, layout.slot_a, &record)
        {
            info!("slot A holds a verified download");
            return Decision::Reset;
        }
        warn!("slot A image rejected");
    }

    if let Some(record) = find_metadata(store, layout.slot_b) {
        info!("slot B record at {=u32:#x}", record.address);
        if record.is_placed(layout.slot_b)
            && record.metadata.state() == State::Ready
            && verify_ready_state::<F, H>(store, layout.slot_b, &record)
        {
            let vector_table = layout.slot_b.start;
            match (
                store.read_u32(vector_table),
                store.read_u32(vector_table + 4),
            ) {
                (Ok(stack_pointer), Ok(reset_vector)) => {
                    return Decision::Jump(AppEntry {
                        vector_table,
                        stack_pointer,
                        reset_vector,
                    })
                }
                _ => warn!("slot B vector table unreadable"),
            }
        } else {
            warn!("slot B image rejected");
        }
    }

    Decision::Download
}

/// What the caller has to do after [`Bootloader::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootAction {
    Reset,
    Jump(AppEntry),
    /// Bring up the module and start a download session.
    StartDownload,
    /// A download session was already started during this power cycle.
    Idle,
}

/// Boot decision state for one power cycle.
#[derive(Debug, Default)]
pub struct Bootloader {
    download_started: bool,
}

impl Bootloader {
    pub const fn new() -> Self {
        Self {
            download_started: false,
        }
    }

    pub fn download_started(&self) -> bool {
        self.download_started
    }

    /// Run the boot decision. Once a download was started, further calls do
    /// nothing.
    pub fn run<F, H>(&mut self, store: &mut ImageStore<F>, layout: &Layout) -> BootAction
    where
        F: ReadNorFlash,
        H: Sha256 + Default,
    {
        if self.download_started {
            return BootAction::Idle;
        }
        match decide::<F, H>(store, layout) {
            Decision::Reset => BootAction::Reset,
            Decision::Jump(entry) => BootAction::Jump(entry),
            Decision::Download => {
                self.download_started = true;
                BootAction::StartDownload
            }
        }
    }
}
