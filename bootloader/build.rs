// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! This build script generates the `memory.x` file from the flash layout
//! constants into a directory where the linker can always find it at build
//! time. The linker arguments are only added for the target binary, host
//! builds of the library and its tests do not link against `link.x`.

use consts::{BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE, RAM_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let memory_x_content = format!(
        r##"
        BASE_BOOTLOADER_ADDR = {BASE_BOOTLOADER_ADDR:#X};
        BOOTLOADER_SIZE = {BOOTLOADER_SIZE:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            /* The first stage and the parameters page sit below the bootloader */
            FLASH (rx) : ORIGIN = 0x00000000 + BASE_BOOTLOADER_ADDR, LENGTH = BOOTLOADER_SIZE
            RAM : ORIGIN = 0x20000000, LENGTH = {RAM_SIZE:#X}
        }}
        "##
    );
    // Put `memory.x` in our output directory and ensure it's
    // on the linker search path.
    let out = &PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    File::create(out.join("memory.x"))
        .and_then(|mut file| file.write_all(memory_x_content.as_bytes()))
        .expect("write memory.x");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_NRF52805").is_some() {
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
