// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bootloader to BLE peer download protocol.
//! The peer is the host that owns the firmware images and the bootloader is the target.
//! All control messages are ASCII lines terminated by CR/LF. A `DATA` header is
//! followed by exactly `size` raw payload bytes with no further framing.

#![no_std]

use core::fmt::{self, Display, Write};


/// Prefix of the last line sent before the bootloader resets on a fatal error.
pub const DYING_GASP_PREFIX: &str = "Bootloader Error! ";

/// Line terminator used in both directions.
pub const LINE_END: &str = "\r\n";

/// Largest device identity the peer may assign.
pub const MAX_DEVICE_ID: u32 = 0xFFFF;

/// Firmware component a version or transfer refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Component {
    /// The second stage bootloader itself
    Bootloader,
    /// The application image
    Application,
}

impl Component {
    /// Token used on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            Component::Bootloader => "BL",
            Component::Application => "APP",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BL" => Some(Component::Bootloader),
            "APP" => Some(Component::Application),
            _ => None,
        }
    }
}

impl Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Messages sent by the peer to the bootloader.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeerMessage<'a> {
    /// The reported identity is known
    Okay,
    /// The reported identity is not known, the peer wants the MAC address
    Unknown,
    /// New device identity to persist
    AssignedId(u16),
    /// The reported version of a component is current
    UpToDate(Component),
    /// A new image of a component is available
    Offer { component: Component, version: &'a str, size: u32 },
    /// Header of a binary packet, followed by `size` raw bytes
    Data { component: Component, sequence: u32, size: u32 },
}

impl<'a> PeerMessage<'a> {
    /// Parse a single line without its terminator.
    ///
    /// Lines that do not start with a protocol token are not meant for the
    /// bootloader and yield `None`. Lines that start with a protocol token but
    /// do not parse are errors.
    pub fn parse(line: &'a str) -> Result<Option<Self>, Error> {
        let mut words = line.split_ascii_whitespace();
        let Some(first) = words.next() else {
            return Ok(None);
        };
        let message = match first {
            "OKAY" => PeerMessage::Okay,
            "UNKNOWN" => PeerMessage::Unknown,
            "WSM" => match words.next() {
                Some("ID") => {
                    let id = parse_number(words.next()).ok_or(Error::InvalidId)?;
                    if id > MAX_DEVICE_ID {
                        return Err(Error::IdOutOfRange(id));
                    }
                    PeerMessage::AssignedId(id as u16)
                }
                Some(tag) => {
                    let Some(component) = Component::from_tag(tag) else {
                        return Ok(None);
                    };
                    match (words.next(), words.next()) {
                        (Some("OK"), None) => PeerMessage::UpToDate(component),
                        (Some(version), Some(size)) => {
                            let size = parse_number(Some(size)).ok_or(Error::InvalidOffer)?;
                            if size == 0 {
                                return Err(Error::ZeroSize);
                            }
                            PeerMessage::Offer {
                                component,
                                version,
                                size,
                            }
                        }
                        _ => return Err(Error::InvalidOffer),
                    }
                }
                None => return Ok(None),
            },
            tag => {
                let Some(component) = Component::from_tag(tag) else {
                    return Ok(None);
                };
                if words.next() != Some("DATA") {
                    return Ok(None);
                }
                let sequence = parse_number(words.next()).ok_or(Error::InvalidDataHeader)?;
                let size = parse_number(words.next()).ok_or(Error::InvalidDataHeader)?;
                if size == 0 {
                    return Err(Error::ZeroSize);
                }
                PeerMessage::Data {
                    component,
                    sequence,
                    size,
                }
            }
        };
        if words.next().is_some() {
            return Err(Error::TrailingWords);
        }
        Ok(Some(message))
    }
}

impl Display for PeerMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerMessage::Okay => f.write_str("OKAY"),
            PeerMessage::Unknown => f.write_str("UNKNOWN"),
            PeerMessage::AssignedId(id) => write!(f, "WSM ID {id}"),
            PeerMessage::UpToDate(component) => write!(f, "WSM {component} OK"),
            PeerMessage::Offer {
                component,
                version,
                size,
            } => write!(f, "WSM {component} {version} {size}"),
            PeerMessage::Data {
                component,
                sequence,
                size,
            } => write!(f, "{component} DATA {sequence} {size}"),
        }
    }
}

/// Messages sent by the bootloader to the peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceMessage<'a> {
    /// Persisted device identity
    Id(u16),
    /// MAC address of the BLE module, used for first time pairing
    Mac(&'a str),
    /// Installed version of a component
    Version { component: Component, version: &'a str },
    /// Slot erased, the transfer may start
    DownloadReady(Component),
    /// The offered transfer cannot be accepted
    DownloadError(Component),
    /// Packet written to flash
    DataOkay(Component),
    /// Packet rejected
    DataError(Component),
    /// Diagnostic sent right before a reset
    DyingGasp(&'a str),
}

impl<'a> DeviceMessage<'a> {
    /// Parse a single line without its terminator, as seen by the peer.
    pub fn parse(line: &'a str) -> Result<Option<Self>, Error> {
        if let Some(diagnostic) = line.strip_prefix(DYING_GASP_PREFIX) {
            return Ok(Some(DeviceMessage::DyingGasp(diagnostic)));
        }
        let mut words = line.split_ascii_whitespace();
        let message = match (words.next(), words.next(), words.next()) {
            (Some("WSM"), Some("ID"), id) => {
                let id = parse_number(id).ok_or(Error::InvalidId)?;
                DeviceMessage::Id(u16::try_from(id).map_err(|_| Error::IdOutOfRange(id))?)
            }
            (Some("WSM"), Some("MAC"), Some(mac)) => DeviceMessage::Mac(mac),
            (Some("WSM"), Some(tag), Some(version)) => match Component::from_tag(tag) {
                Some(component) => DeviceMessage::Version { component, version },
                None => return Ok(None),
            },
            (Some(tag), Some(kind), Some(status)) => {
                let Some(component) = Component::from_tag(tag) else {
                    return Ok(None);
                };
                match (kind, status) {
                    ("DL", "READY") => DeviceMessage::DownloadReady(component),
                    ("DL", "ERROR") => DeviceMessage::DownloadError(component),
                    ("DATA", "OKAY") => DeviceMessage::DataOkay(component),
                    ("DATA", "ERROR") => DeviceMessage::DataError(component),
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        if words.next().is_some() {
            return Err(Error::TrailingWords);
        }
        Ok(Some(message))
    }
}

impl Display for DeviceMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMessage::Id(id) => write!(f, "WSM ID {id}"),
            DeviceMessage::Mac(mac) => write!(f, "WSM MAC {mac}"),
            DeviceMessage::Version { component, version } => {
                write!(f, "WSM {component} {version}")
            }
            DeviceMessage::DownloadReady(component) => write!(f, "{component} DL READY"),
            DeviceMessage::DownloadError(component) => write!(f, "{component} DL ERROR"),
            DeviceMessage::DataOkay(component) => write!(f, "{component} DATA OKAY"),
            DeviceMessage::DataError(component) => write!(f, "{component} DATA ERROR"),
            DeviceMessage::DyingGasp(diagnostic) => {
                write!(f, "{DYING_GASP_PREFIX}{diagnostic}")
            }
        }
    }
}

/// Render a message followed by the line terminator.
pub fn encode_line<const N: usize>(message: &impl Display) -> Result<heapless::String<N>, Error> {
    let mut line = heapless::String::new();
    write!(line, "{message}{LINE_END}").map_err(|_| Error::LineTooLong)?;
    Ok(line)
}

fn parse_number(word: Option<&str>) -> Option<u32> {
    let word = word?;
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    word.parse().ok()
}

/// Protocol errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// `WSM ID` without a decimal identity
    InvalidId,
    /// Identity does not fit in 16 bits
    IdOutOfRange(u32),
    /// `WSM <TAG>` that is neither `OK` nor `<version> <size>`
    InvalidOffer,
    /// `<TAG> DATA` without a decimal sequence number and size
    InvalidDataHeader,
    /// Transfer or packet of zero bytes
    ZeroSize,
    /// Extra words after a complete message
    TrailingWords,
    /// Encoded line does not fit in the output buffer
    LineTooLong,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidId => write!(f, "invalid device id"),
            Error::IdOutOfRange(id) => write!(f, "device id {id} out of range"),
            Error::InvalidOffer => write!(f, "invalid version offer"),
            Error::InvalidDataHeader => write!(f, "invalid data header"),
            Error::ZeroSize => write!(f, "zero size transfer"),
            Error::TrailingWords => write!(f, "unexpected trailing words"),
            Error::LineTooLong => write!(f, "line too long"),
        }
    }
}
