// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trailing metadata record of a bootable image.
//!
//! Every image handled by the bootloaders ends with an 88 byte record that
//! names the image, tells where it runs, how large it is, which lifecycle
//! state it is in and what its SHA-256 digest is. The record is written by
//! the image tooling and by the first stage loader, so the layout here is
//! byte-exact and must not change.

#![no_std]


/// First half of the record signature.
pub const MAGIC: [u8; 8] = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE];

/// Second half of the record signature.
pub const INVERTED_MAGIC: [u8; 8] = [0x21, 0x52, 0x41, 0x10, 0x35, 0x01, 0x45, 0x42];

/// Validation field of an image that was downloaded but not promoted yet.
/// This is the erased flash pattern.
pub const VALIDATION_DOWNLOAD: [u8; 8] = [0xFF; 8];

/// Validation field of an image that is allowed to run.
pub const VALIDATION_READY: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00];

/// Invalidation field of an image that is allowed to run.
pub const INVALIDATION: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];

/// Records are searched for on this alignment.
pub const ALIGNMENT: usize = 8;

/// SHA-256 hash function.
///
/// Images are hashed straight out of flash in small chunks, so the hasher
/// has to be incremental.
pub trait Sha256 {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> [u8; 32];
}

#[cfg(feature = "sha2")]
impl Sha256 for sha2::Sha256 {
    fn update(&mut self, data: &[u8]) {
        <sha2::Sha256 as sha2::Digest>::update(self, data);
    }

    fn finalize(self) -> [u8; 32] {
        <sha2::Sha256 as sha2::Digest>::finalize(self).into()
    }
}

/// Lifecycle state encoded by the validation and invalidation fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Freshly downloaded into slot A, waiting to be promoted.
    Download,
    /// Promoted into slot B and allowed to run.
    Ready,
    /// Anything else, including partially programmed fields.
    Invalid,
}

/// Metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    name: [u8; 8],
    version: [u8; 8],
    dest_address: [u8; 4],
    size: [u8; 4],
    validation: [u8; 8],
    invalidation: [u8; 8],
    sha256: [u8; 32],
}

impl Metadata {
    /// Size of the record in bytes.
    pub const SIZE: usize = 88;

    pub const NAME_OFFSET: usize = 16;
    pub const VERSION_OFFSET: usize = 24;
    pub const DEST_ADDRESS_OFFSET: usize = 32;
    pub const SIZE_OFFSET: usize = 36;
    pub const VALIDATION_OFFSET: usize = 40;
    pub const INVALIDATION_OFFSET: usize = 48;
    pub const SHA256_OFFSET: usize = 56;

    /// Create a new record with an all-zero digest.
    ///
    /// `size` is the size of the whole image including the record, see
    /// [`image_size`].
    pub fn new(
        name: &str,
        version: &str,
        dest_address: u32,
        size: u32,
        state: State,
    ) -> Result<Self, Error> {
        if (size as usize) < Self::SIZE {
            return Err(Error::SizeTooSmall(size));
        }
        let mut metadata = Self {
            name: [0; 8],
            version: [0; 8],
            dest_address: dest_address.to_le_bytes(),
            size: size.to_le_bytes(),
            validation: [0; 8],
            invalidation: [0; 8],
            sha256: [0; 32],
        };
        metadata.name = ascii_field(name).ok_or(Error::NameTooLong)?;
        metadata.version = ascii_field(version).ok_or(Error::VersionTooLong)?;
        metadata.set_state(state);
        Ok(metadata)
    }

    /// Build a record from raw bytes without checking the signature.
    pub fn from_bytes(data: &[u8; Self::SIZE]) -> Self {
        let mut metadata = Self {
            name: [0; 8],
            version: [0; 8],
            dest_address: [0; 4],
            size: [0; 4],
            validation: [0; 8],
            invalidation: [0; 8],
            sha256: [0; 32],
        };
        metadata.name.copy_from_slice(&data[16..24]);
        metadata.version.copy_from_slice(&data[24..32]);
        metadata.dest_address.copy_from_slice(&data[32..36]);
        metadata.size.copy_from_slice(&data[36..40]);
        metadata.validation.copy_from_slice(&data[40..48]);
        metadata.invalidation.copy_from_slice(&data[48..56]);
        metadata.sha256.copy_from_slice(&data[56..88]);
        metadata
    }

    /// Deserialize a record from the start of a buffer.
    ///
    /// Returns `None` if the buffer does not start with the record signature.
    pub fn deserialize(data: &[u8]) -> Result<Option<Self>, Error> {
        if !has_magic(data) {
            return Ok(None);
        }
        let Some(record) = data.get(..Self::SIZE) else {
            return Err(Error::RecordTooShort);
        };
        let mut raw = [0; Self::SIZE];
        raw.copy_from_slice(record);
        Ok(Some(Self::from_bytes(&raw)))
    }

    /// Serialize the record to a buffer. Exactly [`Self::SIZE`] bytes will be
    /// written.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < Self::SIZE {
            return Err(Error::SerializeBufferTooSmall);
        }

        buf[..8].copy_from_slice(&MAGIC);
        buf[8..16].copy_from_slice(&INVERTED_MAGIC);
        buf[16..24].copy_from_slice(&self.name);
        buf[24..32].copy_from_slice(&self.version);
        buf[32..36].copy_from_slice(&self.dest_address);
        buf[36..40].copy_from_slice(&self.size);
        buf[40..48].copy_from_slice(&self.validation);
        buf[48..56].copy_from_slice(&self.invalidation);
        buf[56..88].copy_from_slice(&self.sha256);

        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        // The buffer has exactly the right size.
        let _ = self.serialize(&mut buf);
        buf
    }

    /// Image name.
    pub fn name(&self) -> Result<&str, Error> {
        nul_terminated(&self.name).ok_or(Error::InvalidNameUtf8)
    }

    /// Image version.
    pub fn version(&self) -> Result<&str, Error> {
        nul_terminated(&self.version).ok_or(Error::InvalidVersionUtf8)
    }

    /// Address the image runs from.
    pub fn dest_address(&self) -> u32 {
        u32::from_le_bytes(self.dest_address)
    }

    /// Size of the whole image including this record.
    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.size)
    }

    pub fn validation(&self) -> [u8; 8] {
        self.validation
    }

    pub fn invalidation(&self) -> [u8; 8] {
        self.invalidation
    }

    /// Stored SHA-256 digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.sha256
    }

    /// Classify the validation and invalidation fields.
    ///
    /// A download image is recognized by its validation field alone, since
    /// the invalidation field is only programmed when the image is promoted.
    pub fn state(&self) -> State {
        if self.validation == VALIDATION_DOWNLOAD {
            State::Download
        } else if self.validation == VALIDATION_READY && self.invalidation == INVALIDATION {
            State::Ready
        } else {
            State::Invalid
        }
    }

    /// Program the validation and invalidation fields for `state`.
    pub fn set_state(&mut self, state: State) {
        let (validation, invalidation) = match state {
            State::Download => (VALIDATION_DOWNLOAD, [0xFF; 8]),
            State::Ready => (VALIDATION_READY, INVALIDATION),
            State::Invalid => ([0; 8], [0; 8]),
        };
        self.validation = validation;
        self.invalidation = invalidation;
    }

    pub fn set_digest(&mut self, digest: [u8; 32]) {
        self.sha256 = digest;
    }

    /// Offset of this record inside its image, if the size field is sane.
    pub fn expected_offset(&self) -> Option<u32> {
        self.size().checked_sub(Self::SIZE as u32)
    }
}

/// What a digest covers for a record in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestLayout {
    /// Number of image bytes hashed as stored, starting at the image start.
    pub prefix: u32,
    /// Bytes hashed after the prefix in place of the stored status fields.
    pub tail: Option<[u8; 16]>,
}

impl DigestLayout {
    /// Layout for an image of `size` bytes whose record is in `state`.
    ///
    /// Download images are hashed up to the validation field, followed by the
    /// canonical status fields, so the pending status bytes do not take part
    /// in the digest. Ready images are hashed as stored up to the digest.
    pub fn for_state(state: State, size: u32) -> Option<Self> {
        if (size as usize) < Metadata::SIZE {
            return None;
        }
        let record = size - Metadata::SIZE as u32;
        match state {
            State::Download => Some(Self {
                prefix: record + Metadata::VALIDATION_OFFSET as u32,
                tail: Some(canonical_status()),
            }),
            State::Ready => Some(Self {
                prefix: record + Metadata::SHA256_OFFSET as u32,
                tail: None,
            }),
            State::Invalid => None,
        }
    }

    /// Hash an image that is fully present in memory.
    pub fn digest<H: Sha256 + Default>(&self, image: &[u8]) -> Option<[u8; 32]> {
        let prefix = image.get(..self.prefix as usize)?;
        let mut sha = H::default();
        sha.update(prefix);
        if let Some(tail) = &self.tail {
            sha.update(tail);
        }
        Some(sha.finalize())
    }
}

/// Status fields substituted when hashing a download image.
pub fn canonical_status() -> [u8; 16] {
    let mut status = [0; 16];
    status[..8].copy_from_slice(&VALIDATION_DOWNLOAD);
    status[8..].copy_from_slice(&INVALIDATION);
    status
}

/// Check whether `data` starts with the record signature.
pub fn has_magic(data: &[u8]) -> bool {
    data.len() >= 16 && data[..8] == MAGIC && data[8..16] == INVERTED_MAGIC
}

/// Total image size for a firmware of `firmware_len` bytes.
///
/// The firmware is padded to the record alignment and followed by the
/// record.
pub fn image_size(firmware_len: usize) -> Result<u32, Error> {
    let padded = firmware_len
        .checked_next_multiple_of(ALIGNMENT)
        .ok_or(Error::FirmwareTooLong)?;
    padded
        .checked_add(Metadata::SIZE)
        .and_then(|size| u32::try_from(size).ok())
        .ok_or(Error::FirmwareTooLong)
}

/// Compute and store the digest of a complete image.
///
/// `image` must end with a serialized record. The digest field inside the
/// buffer is updated and the sealed record is returned.
pub fn seal<H: Sha256 + Default>(image: &mut [u8]) -> Result<Metadata, Error> {
    let offset = image
        .len()
        .checked_sub(Metadata::SIZE)
        .ok_or(Error::RecordTooShort)?;
    let mut metadata = Metadata::deserialize(&image[offset..])?.ok_or(Error::RecordMissing)?;
    if metadata.size() as usize != image.len() {
        return Err(Error::RecordMisplaced {
            size: metadata.size(),
            actual: image.len(),
        });
    }
    let layout = DigestLayout::for_state(metadata.state(), metadata.size())
        .ok_or(Error::UnsealableState)?;
    let digest = layout.digest::<H>(image).ok_or(Error::RecordTooShort)?;
    metadata.set_digest(digest);
    image[offset + Metadata::SHA256_OFFSET..].copy_from_slice(&digest);
    Ok(metadata)
}

/// Check the digest of a complete image against its trailing record.
///
/// Returns the record and whether the digest matches, or `None` if the image
/// does not end with a record.
pub fn verify_image<H: Sha256 + Default>(image: &[u8]) -> Option<(Metadata, bool)> {
    let offset = image.len().checked_sub(Metadata::SIZE)?;
    let metadata = Metadata::deserialize(&image[offset..]).ok()??;
    let matches = metadata.size() as usize == image.len()
        && DigestLayout::for_state(metadata.state(), metadata.size())
            .and_then(|layout| layout.digest::<H>(image))
            .is_some_and(|digest| &digest == metadata.digest());
    Some((metadata, matches))
}

fn ascii_field(value: &str) -> Option<[u8; 8]> {
    if value.len() > 8 {
        return None;
    }
    let mut field = [0; 8];
    field[..value.len()].copy_from_slice(value.as_bytes());
    Some(field)
}

fn nul_terminated(field: &[u8]) -> Option<&str> {
    let first_zero = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..first_zero]).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    FirmwareTooLong,
    InvalidNameUtf8,
    InvalidVersionUtf8,
    NameTooLong,
    RecordMisplaced { size: u32, actual: usize },
    RecordMissing,
    RecordTooShort,
    SerializeBufferTooSmall,
    SizeTooSmall(u32),
    UnsealableState,
    VersionTooLong,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FirmwareTooLong => write!(f, "firmware too long"),
            Self::InvalidNameUtf8 => write!(f, "invalid name UTF-8 in metadata"),
            Self::InvalidVersionUtf8 => write!(f, "invalid version UTF-8 in metadata"),
            Self::NameTooLong => write!(f, "name too long to write in metadata"),
            Self::RecordMisplaced { size, actual } => write!(
                f,
                "metadata size field is {size}, but the image is {actual} bytes long"
            ),
            Self::RecordMissing => write!(f, "image does not end with a metadata record"),
            Self::RecordTooShort => write!(f, "metadata record too short"),
            Self::SerializeBufferTooSmall => write!(f, "buffer too small for serialization"),
            Self::SizeTooSmall(size) => {
                write!(f, "image size {size} cannot hold a metadata record")
            }
            Self::UnsealableState => write!(f, "cannot compute the digest of an invalid image"),
            Self::VersionTooLong => write!(f, "version too long to write in metadata"),
        }
    }
}
