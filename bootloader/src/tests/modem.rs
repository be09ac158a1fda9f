// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use super::mock::{config, inject, rule, MockFlash, MockPin, Rig};
use crate::at::AtStatus;
use crate::download::{self, Exit};
use crate::error::Error;
use crate::flash::ImageStore;
use crate::modem::{advertising_data, bring_up, parse_mac, wait_ready, ModemPins, MAC_NONE};
use std::cell::RefCell;
use std::rc::Rc;

const MAC_RESPONSE: &[u8] = b"+CIPSTAMAC:\"24:0a:c4:00:01:02\"\r\nOK\r\n";

type PinLog = Rc<RefCell<Vec<(&'static str, bool)>>>;

fn pins() -> (ModemPins<MockPin, MockPin>, PinLog) {
    let log = PinLog::default();
    let power = MockPin {
        name: "power",
        log: log.clone(),
    };
    let reset = MockPin {
        name: "reset",
        log: log.clone(),
    };
    (ModemPins::new(power, reset), log)
}

const BRING_UP: [&str; 9] = [
    "AT+RESTORE",
    "AT+UART_CUR=115200,8,1,0,1",
    "AT+CIPSTAMAC?",
    "AT+BLEINIT=2",
    "AT+BLEGATTSSRVCRE",
    "AT+BLEGATTSSRVSTART",
    "AT+BLENAME=\"Stephano-I\"",
    "AT+BLEADVDATA=\"0201060B095374657068616E6F2D49\"",
    "AT+BLEADVSTART",
];

#[test]
fn classify_responses() {
    assert_eq!(AtStatus::classify(b"AT+BLEINIT=2\r\n\r\nOK\r\n"), AtStatus::Ok);
    assert_eq!(AtStatus::classify(b"\r\nERROR\r\n"), AtStatus::Error);
    assert_eq!(AtStatus::classify(b"+BLENAME:\"x\"\r\n"), AtStatus::Ok);
    assert_eq!(AtStatus::classify(b""), AtStatus::Timeout);
}

/// Power is switched off and on before the reset pulse.
#[test]
fn power_cycle_sequence() {
    let rig = Rig::new();
    let (mut pins, log) = pins();
    let mut delay = rig.delay();
    pins.power_cycle(&mut delay, 500).unwrap();

    assert_eq!(
        *log.borrow(),
        [("power", true), ("power", false), ("reset", false), ("reset", true)]
    );
    assert_eq!(rig.time.get(), 1500);
}

/// The banner may be surrounded by boot noise.
#[test]
fn ready_banner_in_noise() {
    let rig = Rig::new();
    let mut link = rig.link(Vec::new());
    inject(&rig.queue, b"\x00ets Jun  8 2016\r\nrea");
    inject(&rig.queue, b"dy\r\n");
    assert_eq!(wait_ready(&mut link, 1, 100), Ok(()));
}

/// Receive returns what arrived before the timeout.
#[test]
fn receive_until_timeout() {
    let rig = Rig::new();
    let mut link = rig.link(Vec::new());
    inject(&rig.queue, b"abc");
    let mut buf = [0u8; 8];
    assert_eq!(link.receive(&mut buf, 10), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(link.receive(&mut buf, 10), 0);
}

/// Lines that do not fit the transmit buffer are refused, not truncated.
#[test]
fn overlong_line_is_not_sent() {
    let rig = Rig::new();
    let mut link = rig.link(Vec::new());
    let line = "x".repeat(200);
    assert_eq!(
        link.send_line(&line),
        Err(Error::MalformedLine(host_protocol::Error::LineTooLong))
    );
    assert_eq!(link.send_line("WSM ID 7"), Ok(()));
    assert_eq!(rig.lines(), ["WSM ID 7"]);
}

#[test]
fn ready_timeout() {
    let rig = Rig::new();
    let mut link = rig.link(Vec::new());
    inject(&rig.queue, b"reboot\r\n");
    assert_eq!(wait_ready(&mut link, 3, 50), Err(Error::ReadyTimeout));
}

#[test]
fn bring_up_sequence() {
    let rig = Rig::new();
    let (mut pins, _) = pins();
    let mut link = rig.link(vec![rule("AT+CIPSTAMAC?", MAC_RESPONSE)]);
    inject(&rig.queue, b"ready\r\n");

    let mac = bring_up(&mut link, &mut pins, &mut rig.delay(), &config()).unwrap();
    assert_eq!(mac, "24:0a:c4:00:01:02");
    assert_eq!(rig.lines(), BRING_UP);
}

/// A module that does not report its MAC address still comes up.
#[test]
fn bring_up_without_mac() {
    let rig = Rig::new();
    let (mut pins, _) = pins();
    let mut link = rig.link(vec![rule("AT+CIPSTAMAC?", "ERROR\r\n")]);
    inject(&rig.queue, b"ready\r\n");

    let mac = bring_up(&mut link, &mut pins, &mut rig.delay(), &config()).unwrap();
    assert_eq!(mac, MAC_NONE);
}

#[test]
fn bring_up_stops_at_failed_command() {
    let rig = Rig::new();
    let (mut pins, _) = pins();
    let mut link = rig.link(vec![rule("AT+BLEINIT=2", "ERROR\r\n")]);
    inject(&rig.queue, b"ready\r\n");

    let result = bring_up(&mut link, &mut pins, &mut rig.delay(), &config());
    assert_eq!(result, Err(Error::AtCommand("AT+BLEINIT=2")));
    assert_eq!(rig.lines().last().unwrap(), "AT+BLEINIT=2");
}

#[test]
fn advertising_payload() {
    assert_eq!(
        advertising_data("Stephano-I").unwrap(),
        "0201060B095374657068616E6F2D49"
    );
    assert_eq!(advertising_data("A").unwrap(), "020106020941");
    assert!(advertising_data(&"x".repeat(27)).is_none());
}

#[test]
fn mac_from_response() {
    assert_eq!(parse_mac(MAC_RESPONSE).unwrap(), "24:0a:c4:00:01:02");
    assert_eq!(parse_mac(b"OK\r\n"), None);
    assert_eq!(parse_mac(b"+CIPSTAMAC:\"24:0a\"\r\nOK\r\n"), None);
}

/// A full run on a device whose images are current.
#[test]
fn run_until_up_to_date() {
    let rig = Rig::new();
    let (mut pins, _) = pins();
    let rules = vec![
        rule("AT+CIPSTAMAC?", MAC_RESPONSE),
        rule("WSM MAC", "WSM ID 3\r\n"),
        rule("WSM BL", "WSM BL OK\r\n"),
        rule("WSM APP", "WSM APP OK\r\n"),
    ];
    let link = rig.link(rules);
    inject(&rig.queue, b"ready\r\n");

    let store = ImageStore::new(MockFlash::new());
    let exit = download::run(store, link, &mut pins, &mut rig.delay(), &config());
    assert_eq!(exit, Exit::Reboot);

    let lines = rig.lines();
    assert_eq!(lines[..BRING_UP.len()], BRING_UP);
    assert_eq!(
        lines[BRING_UP.len()..],
        [
            "AT+BLESPP",
            "WSM MAC 24:0a:c4:00:01:02",
            "WSM BL 0.0.0",
            "WSM APP 0.0.0"
        ]
    );
}

/// A module that never comes up ends the run with a diagnostic.
#[test]
fn run_without_module() {
    let rig = Rig::new();
    let (mut pins, _) = pins();
    let link = rig.link(Vec::new());
    let mut config = config();
    config.ready_attempts = 2;
    config.ready_timeout_ms = 20;

    let store = ImageStore::new(MockFlash::new());
    let exit = download::run(store, link, &mut pins, &mut rig.delay(), &config);
    assert_eq!(exit, Exit::Fatal(Error::ReadyTimeout));
    assert_eq!(rig.lines(), ["Bootloader Error! Module ready timeout"]);
}
