// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! WSM download session over the BLE module.
//!
//! The module is first powered and set up to advertise with AT commands. Once
//! the peer connected, the module is switched to SPP passthrough and the
//! session runs a line protocol: pairing, then a version exchange for the
//! bootloader and the application. An offered image is written to slot A,
//! packet by packet. The device reboots once both components are up to date
//! or the application was received, and the first stage takes it from there.

mod session;
mod state;

pub use session::{Session, Status};
pub use state::{Action, Event, SessionInfo, State, Transfer, Transition};

use crate::config::Config;
use crate::error::Error;
use crate::flash::ImageStore;
use crate::modem::{self, ModemPins};
use crate::transport::{Clock, Link, Transport};
use core::fmt::Write;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_storage::nor_flash::NorFlash;
use host_protocol::DeviceMessage;

/// How a session ended. Both cases end with a device reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Exit {
    Reboot,
    Fatal(Error),
}

/// Report a fatal error to the peer and give the UART time to drain.
pub fn dying_gasp<T, C, D, const N: usize>(link: &mut Link<'_, T, C, N>, error: &Error, delay: &mut D, flush_ms: u32)
where
    T: Transport,
    C: Clock,
    D: DelayNs,
{
    error!("download failed: {}", error);
    // The link may be what failed, nothing else to try then.
    if let Some(notice) = error.peer_notice() {
        let _ = link.send_line(notice);
    }
    let mut text = heapless::String::<96>::new();
    let _ = write!(text, "{error}");
    let _ = link.send_line(DeviceMessage::DyingGasp(&text));
    delay.delay_ms(flush_ms);
}

/// Process the session until it reboots or fails.
pub fn drive<F, T, C, D, const N: usize>(session: &mut Session<'_, F, T, C, N>, delay: &mut D, flush_ms: u32) -> Exit
where
    F: NorFlash,
    T: Transport,
    C: Clock,
    D: DelayNs,
{
    loop {
        match session.process() {
            Ok(Status::Busy) => {}
            Ok(Status::Idle) => delay.delay_ms(1),
            Ok(Status::Reboot) => {
                info!("download session complete");
                delay.delay_ms(flush_ms);
                return Exit::Reboot;
            }
            Err(error) => {
                session.abort(&error, delay, flush_ms);
                return Exit::Fatal(error);
            }
        }
    }
}

/// Bring up the module and run a complete session.
pub fn run<F, T, C, P, R, D, const N: usize>(
    store: ImageStore<F>,
    mut link: Link<'_, T, C, N>,
    pins: &mut ModemPins<P, R>,
    delay: &mut D,
    config: &Config,
) -> Exit
where
    F: NorFlash,
    T: Transport,
    C: Clock,
    P: OutputPin,
    R: OutputPin,
    D: DelayNs,
{
    let mac = match modem::bring_up(&mut link, pins, delay, config) {
        Ok(mac) => mac,
        Err(error) => {
            dying_gasp(&mut link, &error, delay, config.flush_delay_ms);
            return Exit::Fatal(error);
        }
    };
    let mut session = Session::new(store, link, config, mac);
    drive(&mut session, delay, config.flush_delay_ms)
}
