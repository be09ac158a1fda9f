// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use host_protocol::{Component, DeviceMessage};

/// Conditions that end a download session with a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The module never printed its ready banner.
    ReadyTimeout,
    /// An AT command did not succeed.
    AtCommand(&'static str),
    /// A power or reset line could not be driven.
    Gpio,
    /// The UART refused to transmit.
    Transport,
    /// A protocol line could not be parsed.
    MalformedLine(host_protocol::Error),
    /// A packet header carried the wrong sequence number.
    UnexpectedPacket {
        component: Component,
        expected: u32,
        received: u32,
    },
    /// The offered image does not fit in slot A.
    TransferTooLarge {
        component: Component,
        size: u32,
        capacity: u32,
    },
    /// A packet would run past the announced image size.
    PacketOverrun {
        component: Component,
        received: u32,
        size: u32,
        total: u32,
    },
    Erase(Component),
    Program(Component),
    /// The assigned device identity could not be stored.
    PersistIdentity,
}

impl Error {
    /// Line sent to the peer before the diagnostic, if the peer is waiting
    /// on an answer to a transfer.
    pub fn peer_notice(&self) -> Option<DeviceMessage<'static>> {
        match *self {
            Error::TransferTooLarge { component, .. } | Error::Erase(component) => {
                Some(DeviceMessage::DownloadError(component))
            }
            Error::UnexpectedPacket { component, .. }
            | Error::PacketOverrun { component, .. }
            | Error::Program(component) => Some(DeviceMessage::DataError(component)),
            Error::ReadyTimeout
            | Error::AtCommand(_)
            | Error::Gpio
            | Error::Transport
            | Error::MalformedLine(_)
            | Error::PersistIdentity => None,
        }
    }
}

impl From<host_protocol::Error> for Error {
    fn from(e: host_protocol::Error) -> Self {
        Error::MalformedLine(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::ReadyTimeout => write!(f, "Module ready timeout"),
            Error::AtCommand(command) => write!(f, "{command} failed"),
            Error::Gpio => write!(f, "Module power control failed"),
            Error::Transport => write!(f, "UART transmit failed"),
            Error::MalformedLine(e) => write!(f, "Malformed line: {e}"),
            Error::UnexpectedPacket {
                expected, received, ..
            } => write!(
                f,
                "Unexpected packet number {received}, expected {expected}"
            ),
            Error::TransferTooLarge { size, capacity, .. } => {
                write!(f, "Image too large: {size} > {capacity}")
            }
            Error::PacketOverrun {
                received,
                size,
                total,
                ..
            } => write!(
                f,
                "Packet of {size} bytes at {received} exceeds image size {total}"
            ),
            Error::Erase(_) => write!(f, "Flash erase failed"),
            Error::Program(_) => write!(f, "Flash program failed"),
            Error::PersistIdentity => write!(f, "Device ID write failed"),
        }
    }
}
