// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Power sequencing and AT bring-up of the BLE module.

use crate::at::{AtStatus, Response};
use crate::config::Config;
use crate::error::Error;
use crate::transport::{Clock, Link, Transport};
use core::fmt::Write;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// MAC address as printed by the module, `xx:xx:xx:xx:xx:xx`.
pub type Mac = heapless::String<17>;

/// Reported when the module does not tell its MAC address.
pub const MAC_NONE: &str = "00:00:00:00:00:00";

/// Power enable (active low) and reset (active low) lines of the module.
pub struct ModemPins<P, R> {
    power: P,
    reset: R,
}

impl<P: OutputPin, R: OutputPin> ModemPins<P, R> {
    pub fn new(power: P, reset: R) -> Self {
        Self { power, reset }
    }

    /// Switch the module off and on, then pulse its reset line.
    pub fn power_cycle<D: DelayNs>(&mut self, delay: &mut D, settle_ms: u32) -> Result<(), Error> {
        self.power.set_high().map_err(|_| Error::Gpio)?;
        delay.delay_ms(settle_ms);
        self.power.set_low().map_err(|_| Error::Gpio)?;
        delay.delay_ms(settle_ms);
        self.reset.set_low().map_err(|_| Error::Gpio)?;
        delay.delay_ms(settle_ms);
        self.reset.set_high().map_err(|_| Error::Gpio)
    }
}

/// Wait for the `ready` banner printed by the module after reset.
pub fn wait_ready<T: Transport, C: Clock, const N: usize>(
    link: &mut Link<'_, T, C, N>,
    attempts: u32,
    window_ms: u64,
) -> Result<(), Error> {
    const BANNER: &[u8; 5] = b"ready";
    let mut window = [0u8; 5];
    for attempt in 0..attempts {
        let deadline = link.now_ms().saturating_add(window_ms);
        let mut byte = [0u8; 1];
        loop {
            let remaining = deadline.saturating_sub(link.now_ms());
            if remaining == 0 || link.receive(&mut byte, remaining) == 0 {
                break;
            }
            window.copy_within(1.., 0);
            window[4] = byte[0];
            if &window == BANNER {
                info!("module ready after {} attempts", attempt + 1);
                return Ok(());
            }
        }
    }
    Err(Error::ReadyTimeout)
}

/// Power up the module and configure it to advertise. Returns the module MAC
/// address.
pub fn bring_up<T, C, P, R, D, const N: usize>(
    link: &mut Link<'_, T, C, N>,
    pins: &mut ModemPins<P, R>,
    delay: &mut D,
    config: &Config,
) -> Result<Mac, Error>
where
    T: Transport,
    C: Clock,
    P: OutputPin,
    R: OutputPin,
    D: DelayNs,
{
    pins.power_cycle(delay, config.power_settle_ms)?;
    wait_ready(link, config.ready_attempts, config.ready_timeout_ms)?;

    command(link, "AT+RESTORE", config.at_restore_timeout_ms)?;
    delay.delay_ms(config.restore_settle_ms);
    command(link, "AT+UART_CUR=115200,8,1,0,1", config.at_timeout_ms)?;

    let mut response = Response::new();
    let mac = match link.at_query("AT+CIPSTAMAC?", config.at_query_timeout_ms, &mut response)? {
        AtStatus::Ok => parse_mac(&response),
        _ => None,
    }
    .unwrap_or_else(|| {
        warn!("no MAC address reported");
        let mut mac = Mac::new();
        let _ = mac.push_str(MAC_NONE);
        mac
    });
    info!("module MAC {=str}", mac.as_str());

    command(link, "AT+BLEINIT=2", config.at_timeout_ms)?;
    command(link, "AT+BLEGATTSSRVCRE", config.at_timeout_ms)?;
    command(link, "AT+BLEGATTSSRVSTART", config.at_timeout_ms)?;

    let mut line = heapless::String::<96>::new();
    write!(line, "AT+BLENAME=\"{}\"", config.ble_name).map_err(|_| Error::AtCommand("AT+BLENAME"))?;
    command_named(link, &line, "AT+BLENAME", config.at_timeout_ms)?;

    line.clear();
    let advertising = advertising_data(config.ble_name).ok_or(Error::AtCommand("AT+BLEADVDATA"))?;
    write!(line, "AT+BLEADVDATA=\"{advertising}\"").map_err(|_| Error::AtCommand("AT+BLEADVDATA"))?;
    command_named(link, &line, "AT+BLEADVDATA", config.at_timeout_ms)?;

    command(link, "AT+BLEADVSTART", config.at_timeout_ms)?;
    info!("advertising as {=str}", config.ble_name);
    Ok(mac)
}

/// Switch the module into transparent SPP mode.
pub fn enter_passthrough<T: Transport, C: Clock, const N: usize>(
    link: &mut Link<'_, T, C, N>,
    timeout_ms: u64,
) -> Result<(), Error> {
    command(link, "AT+BLESPP", timeout_ms)
}

fn command<T: Transport, C: Clock, const N: usize>(
    link: &mut Link<'_, T, C, N>,
    command: &'static str,
    timeout_ms: u64,
) -> Result<(), Error> {
    command_named(link, command, command, timeout_ms)
}

fn command_named<T: Transport, C: Clock, const N: usize>(
    link: &mut Link<'_, T, C, N>,
    command: &str,
    name: &'static str,
    timeout_ms: u64,
) -> Result<(), Error> {
    match link.at_command(command, timeout_ms)? {
        AtStatus::Ok => Ok(()),
        status => {
            error!("{=str} returned {}", name, status);
            Err(Error::AtCommand(name))
        }
    }
}

/// Advertising payload in hex: LE general discoverable flags followed by the
/// complete local name.
pub fn advertising_data(name: &str) -> Option<heapless::String<62>> {
    // Flags take 3 bytes and the name header 2, out of 31.
    if name.len() > 26 {
        return None;
    }
    let mut hex = heapless::String::new();
    write!(hex, "020106{:02X}09", name.len() + 1).ok()?;
    for byte in name.bytes() {
        write!(hex, "{byte:02X}").ok()?;
    }
    Some(hex)
}

/// Extract the MAC address from a `+CIPSTAMAC:"..."` response.
pub fn parse_mac(response: &[u8]) -> Option<Mac> {
    let start = response.iter().position(|&b| b == b'"')? + 1;
    let len = response[start..].iter().position(|&b| b == b'"')?;
    let value = core::str::from_utf8(&response[start..start + len]).ok()?;
    if value.len() != 17
        || !value
            .bytes()
            .all(|b| b.is_ascii_hexdigit() || b == b':')
    {
        return None;
    }
    let mut mac = Mac::new();
    mac.push_str(value).ok()?;
    Some(mac)
}
