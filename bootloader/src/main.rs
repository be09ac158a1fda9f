// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]
mod jump_app;

use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use bootloader::boot::{BootAction, Bootloader};
use bootloader::config::Config;
use bootloader::download::{self, Exit};
use bootloader::flash::ImageStore;
use bootloader::modem::ModemPins;
use bootloader::ring::{ByteQueue, Overflow};
use bootloader::transport::{Clock, Link, Transport};
use consts::RX_BUFFER_SIZE;
use cortex_m::peripheral::SCB;
use cortex_m_rt::entry;
use defmt::{error, info, unwrap};
use embassy_executor::InterruptExecutor;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals::{self, UARTE0};
use embassy_nrf::uarte::{self, UarteRxWithIdle, UarteTx};
use embassy_nrf::bind_interrupts;
use embassy_time::{Delay, Instant};
use jump_app::jump_to_app;

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

/// Bytes received from the BLE module, filled by [`uart_rx`].
static RX_QUEUE: ByteQueue<RX_BUFFER_SIZE> = ByteQueue::new();

static EXECUTOR_RX: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI0_EGU0() {
    EXECUTOR_RX.on_interrupt()
}

#[embassy_executor::task]
async fn uart_rx(mut rx: UarteRxWithIdle<'static, UARTE0, peripherals::TIMER0>) {
    let mut buf = [0u8; 64];
    loop {
        match rx.read_until_idle(&mut buf).await {
            Ok(n) => {
                for &byte in &buf[..n] {
                    let _ = RX_QUEUE.push(byte, Overflow::DropNewest);
                }
            }
            Err(e) => error!("UART receive error {}", e),
        }
    }
}

struct UartTransport(UarteTx<'static, UARTE0>);

impl Transport for UartTransport {
    type Error = uarte::Error;

    fn transmit(&mut self, data: &[u8], _timeout_ms: u64) -> Result<(), Self::Error> {
        self.0.blocking_write(data)
    }
}

struct Uptime;

impl Clock for Uptime {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

fn reset() -> ! {
    cortex_m::interrupt::disable();
    SCB::sys_reset()
}

#[entry]
fn main() -> ! {
    let p = embassy_nrf::init(Default::default());
    let config = Config::default();
    info!("Bootloader started");

    let mut store = ImageStore::new(Nvmc::new(p.NVMC));
    let mut bootloader = Bootloader::new();
    match bootloader.run::<_, sha2::Sha256>(&mut store, &config.layout) {
        BootAction::Reset => {
            info!("Download verified, resetting");
            reset();
        }
        BootAction::Jump(entry) => {
            info!("Booting application");
            unsafe { jump_to_app(entry) }
        }
        BootAction::StartDownload => {}
        BootAction::Idle => reset(),
    }

    let mut config_uart = uarte::Config::default();
    config_uart.parity = uarte::Parity::EXCLUDED;
    config_uart.baudrate = uarte::Baudrate::BAUD115200;

    // Uarte config
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_16, p.P0_18, config_uart);
    let (tx, rx) = uart.split_with_idle(p.TIMER0, p.PPI_CH0, p.PPI_CH1);

    interrupt::SWI0_EGU0.set_priority(Priority::P6);
    let spawner = EXECUTOR_RX.start(interrupt::SWI0_EGU0);
    unwrap!(spawner.spawn(uart_rx(rx)));

    // Both lines are active low, start with the module off and out of reset.
    let power = Output::new(p.P0_20, Level::High, OutputDrive::Standard);
    let reset_line = Output::new(p.P0_12, Level::High, OutputDrive::Standard);
    let mut pins = ModemPins::new(power, reset_line);

    let link = Link::new(UartTransport(tx), Uptime, &RX_QUEUE);
    let mut delay = Delay;
    match download::run(store, link, &mut pins, &mut delay, &config) {
        Exit::Reboot => info!("Download finished, resetting"),
        Exit::Fatal(e) => error!("Download failed: {}", e),
    }
    reset()
}
