// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Digest checks of the images in flash.

use crate::flash::{ImageStore, Region};
use crate::metadata::Record;
use app_metadata::{DigestLayout, Sha256, State};
use consts::FLASH_CHUNK_SIZE;
use embedded_storage::nor_flash::ReadNorFlash;

/// Verify a freshly downloaded image.
///
/// The image is hashed up to its validation field, followed by the canonical
/// status fields, so the result does not depend on what the pending status
/// bytes currently hold.
pub fn verify_download_state<F, H>(store: &mut ImageStore<F>, region: Region, record: &Record) -> bool
where
    F: ReadNorFlash,
    H: Sha256 + Default,
{
    verify::<F, H>(store, region, record, State::Download)
}

/// Verify an image that is allowed to run. Everything up to the digest field
/// is hashed exactly as stored.
pub fn verify_ready_state<F, H>(store: &mut ImageStore<F>, region: Region, record: &Record) -> bool
where
    F: ReadNorFlash,
    H: Sha256 + Default,
{
    verify::<F, H>(store, region, record, State::Ready)
}

fn verify<F, H>(store: &mut ImageStore<F>, region: Region, record: &Record, state: State) -> bool
where
    F: ReadNorFlash,
    H: Sha256 + Default,
{
    let Some(layout) = DigestLayout::for_state(state, record.metadata.size()) else {
        return false;
    };
    if layout.prefix > region.size {
        return false;
    }

    let mut sha = H::default();
    let mut chunk = [0; FLASH_CHUNK_SIZE];
    let mut offset = 0;
    while offset < layout.prefix {
        let len = (layout.prefix - offset).min(FLASH_CHUNK_SIZE as u32) as usize;
        if store.read(region.start + offset, &mut chunk[..len]).is_err() {
            return false;
        }
        sha.update(&chunk[..len]);
        offset += len as u32;
    }
    if let Some(tail) = &layout.tail {
        sha.update(tail);
    }

    let digest = sha.finalize();
    debug!("digest of {=u32:#x} computed", region.start);
    &digest == record.metadata.digest()
}
