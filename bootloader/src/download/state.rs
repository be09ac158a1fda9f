// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol states and transitions, free of any I/O.

use crate::error::Error;
use crate::modem::Mac;
use host_protocol::{Component, DeviceMessage, PeerMessage};

/// An image transfer in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    pub component: Component,
    /// Announced image size.
    pub total: u32,
    /// Payload bytes accepted so far, also the slot A write offset.
    pub received: u32,
    pub expected_sequence: u32,
    /// Payload bytes still owed by the current packet.
    pub pending: u32,
}

impl Transfer {
    fn new(component: Component, total: u32) -> Self {
        Self {
            component,
            total,
            received: 0,
            expected_sequence: 0,
            pending: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.received >= self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Advertising, waiting for the peer to connect.
    WaitConnect { since_ms: u64 },
    /// Report the device identity, or the MAC address if there is none.
    SendIdentity,
    /// Waiting for the peer to recognize the device.
    AwaitPairing,
    /// MAC address sent, waiting for a new identity.
    AwaitAssignedId,
    /// Report the installed version of a component.
    SendVersion(Component),
    /// Waiting for the peer to accept the version or offer an image.
    AwaitVersion(Component),
    Receiving(Transfer),
    /// Nothing left to do, reboot.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// Time passed.
    Poll { now_ms: u64 },
    /// A protocol line arrived.
    Line(PeerMessage<'a>),
    /// Payload bytes of the current packet were written to the slot.
    Payload(u32),
}

/// Side effect to perform before the reply is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    None,
    /// Switch the module into SPP passthrough.
    EnterPassthrough,
    /// Store a new device identity.
    PersistId(u16),
    /// Erase slot A for a new image.
    BeginTransfer { component: Component, size: u32 },
    /// Write out whatever is still buffered for slot A.
    CommitTransfer(Component),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<'i> {
    pub state: State,
    pub action: Action,
    pub reply: Option<DeviceMessage<'i>>,
}

impl<'i> Transition<'i> {
    fn to(state: State) -> Self {
        Self {
            state,
            action: Action::None,
            reply: None,
        }
    }

    fn reply(mut self, reply: DeviceMessage<'i>) -> Self {
        self.reply = Some(reply);
        self
    }

    fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }
}

/// What the state machine needs to know about the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub device_id: Option<u16>,
    pub mac: Mac,
    pub bootloader_version: heapless::String<8>,
    pub app_version: heapless::String<8>,
    /// Largest image slot A can hold.
    pub capacity: u32,
    pub connect_wait_ms: u64,
}

impl SessionInfo {
    pub fn version(&self, component: Component) -> &str {
        match component {
            Component::Bootloader => self.bootloader_version.as_str(),
            Component::Application => self.app_version.as_str(),
        }
    }
}

impl State {
    pub fn initial(now_ms: u64) -> Self {
        State::WaitConnect { since_ms: now_ms }
    }

    /// Payload bytes the session must route to the slot instead of the line
    /// assembler.
    pub fn pending_payload(&self) -> Option<(Component, u32)> {
        match self {
            State::Receiving(transfer) if transfer.pending > 0 => {
                Some((transfer.component, transfer.pending))
            }
            _ => None,
        }
    }

    /// States whose entry action does not wait for input.
    pub fn is_transient(&self) -> bool {
        matches!(self, State::SendIdentity | State::SendVersion(_))
    }

    /// Compute the next state.
    ///
    /// Messages that do not belong to the current state are ignored. Fatal
    /// conditions are returned before any side effect is requested, so an
    /// oversized offer never erases the slot and a packet out of sequence is
    /// never written.
    pub fn next<'i>(self, event: Event<'_>, info: &'i SessionInfo) -> Result<Transition<'i>, Error> {
        let stay = Transition::to(self);
        let transition = match (self, event) {
            (State::WaitConnect { since_ms }, Event::Poll { now_ms }) => {
                if now_ms.saturating_sub(since_ms) >= info.connect_wait_ms {
                    Transition::to(State::SendIdentity).action(Action::EnterPassthrough)
                } else {
                    stay
                }
            }

            (State::SendIdentity, Event::Poll { .. }) => {
                let reply = match info.device_id {
                    Some(id) => DeviceMessage::Id(id),
                    None => DeviceMessage::Mac(info.mac.as_str()),
                };
                Transition::to(State::AwaitPairing).reply(reply)
            }

            (State::AwaitPairing, Event::Line(PeerMessage::Okay)) => {
                Transition::to(State::SendVersion(Component::Bootloader))
            }
            (State::AwaitPairing, Event::Line(PeerMessage::Unknown)) => {
                Transition::to(State::AwaitAssignedId).reply(DeviceMessage::Mac(info.mac.as_str()))
            }
            (State::AwaitPairing | State::AwaitAssignedId, Event::Line(PeerMessage::AssignedId(id))) => {
                Transition::to(State::SendVersion(Component::Bootloader)).action(Action::PersistId(id))
            }

            (State::SendVersion(component), Event::Poll { .. }) => {
                Transition::to(State::AwaitVersion(component)).reply(DeviceMessage::Version {
                    component,
                    version: info.version(component),
                })
            }

            (State::AwaitVersion(component), Event::Line(PeerMessage::UpToDate(c))) if c == component => {
                match component {
                    Component::Bootloader => Transition::to(State::SendVersion(Component::Application)),
                    Component::Application => Transition::to(State::Complete),
                }
            }
            (
                State::AwaitVersion(component),
                Event::Line(PeerMessage::Offer {
                    component: c,
                    version,
                    size,
                }),
            ) if c == component => {
                if size > info.capacity {
                    return Err(Error::TransferTooLarge {
                        component,
                        size,
                        capacity: info.capacity,
                    });
                }
                info!("{} {=str} offered, {=u32} bytes", component, version, size);
                Transition::to(State::Receiving(Transfer::new(component, size)))
                    .action(Action::BeginTransfer { component, size })
                    .reply(DeviceMessage::DownloadReady(component))
            }

            (
                State::Receiving(transfer),
                Event::Line(PeerMessage::Data {
                    component,
                    sequence,
                    size,
                }),
            ) if transfer.pending == 0 && component == transfer.component => {
                if sequence != transfer.expected_sequence {
                    return Err(Error::UnexpectedPacket {
                        component,
                        expected: transfer.expected_sequence,
                        received: sequence,
                    });
                }
                if transfer.received.saturating_add(size) > transfer.total {
                    return Err(Error::PacketOverrun {
                        component,
                        received: transfer.received,
                        size,
                        total: transfer.total,
                    });
                }
                Transition::to(State::Receiving(Transfer {
                    pending: size,
                    ..transfer
                }))
            }

            (State::Receiving(transfer), Event::Payload(len)) if transfer.pending > 0 => {
                let len = len.min(transfer.pending);
                let transfer = Transfer {
                    pending: transfer.pending - len,
                    received: transfer.received + len,
                    ..transfer
                };
                if transfer.pending > 0 {
                    Transition::to(State::Receiving(transfer))
                } else {
                    let component = transfer.component;
                    let transfer = Transfer {
                        expected_sequence: transfer.expected_sequence + 1,
                        ..transfer
                    };
                    let reply = DeviceMessage::DataOkay(component);
                    if !transfer.is_complete() {
                        Transition::to(State::Receiving(transfer)).reply(reply)
                    } else {
                        info!("{} transfer complete, {=u32} bytes", component, transfer.received);
                        let state = match component {
                            Component::Bootloader => State::SendVersion(Component::Application),
                            Component::Application => State::Complete,
                        };
                        Transition::to(state)
                            .action(Action::CommitTransfer(component))
                            .reply(reply)
                    }
                }
            }

            (state, Event::Line(message)) => {
                debug!("ignored {} in {}", message, state);
                stay
            }
            _ => stay,
        };
        Ok(transition)
    }
}
