// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later
use bootloader::boot::AppEntry;
use cortex_m::peripheral::{NVIC, SCB};
use defmt::info;
use embassy_nrf::interrupt::Interrupt;

/// Boots the application in slot B.
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and will run code placed in the active partition.
pub unsafe fn jump_to_app(entry: AppEntry) -> ! {
    // Disable active interrupts
    NVIC::mask(Interrupt::UARTE0_UART0);
    NVIC::mask(Interrupt::SWI0_EGU0);
    NVIC::mask(Interrupt::RTC1);

    info!(
        "vtor = {=u32:x}, msp = {=u32:x}, rv = {=u32:x}",
        entry.vector_table, entry.stack_pointer, entry.reset_vector
    );

    cortex_m::interrupt::disable();
    let scb = &*SCB::PTR;
    scb.vtor.write(entry.vector_table);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
    // Interrupts stay disabled, the application enables them once its vector
    // table and stack are in place.

    // These instructions perform the following operations:
    //
    // * Modify control register to use MSP as stack pointer (clear spsel bit)
    // * Synchronize instruction barrier
    // * Initialize stack pointer from the application vector table
    // * Set link register to not return (0xFF)
    // * Jump to application reset vector
    core::arch::asm!(
        "mrs {tmp}, CONTROL",
        "bics {tmp}, {spsel}",
        "msr CONTROL, {tmp}",
        "isb",
        "msr MSP, {msp}",
        "mov lr, {new_lr}",
        "bx {rv}",
        // `out(reg) _` is not permitted in a `noreturn` asm! call,
        // so instead use `in(reg) 0` and don't restore it afterwards.
        tmp = in(reg) 0,
        spsel = in(reg) 2,
        new_lr = in(reg) 0xFFFFFFFFu32,
        msp = in(reg) entry.stack_pointer,
        rv = in(reg) entry.reset_vector,
        options(noreturn),
    );
}
