use {
    crate::ExitCode,
    app_metadata::{Metadata, State},
    std::io::{Read, Write},
};

/// Raw firmware, 1000 bytes so that no padding is needed.
fn firmware() -> Vec<u8> {
    (0..1000u32).map(|i| (i * 7 + 3) as u8).collect()
}

/// Stamp `firmware` into a new output file.
fn stamp(firmware: &[u8], extra: &[&str]) -> (Output, tempfile::NamedTempFile) {
    let input = create_file(firmware);
    let output_file = tempfile::NamedTempFile::new().unwrap();
    let mut args = vec![
        "stamp",
        "-i",
        input.path().to_str().unwrap(),
        "-o",
        output_file.path().to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    (test(args), output_file)
}

fn read_file(file: &tempfile::NamedTempFile) -> Vec<u8> {
    let mut data = Vec::new();
    std::fs::File::open(file.path())
        .unwrap()
        .read_to_end(&mut data)
        .unwrap();
    data
}

/// Try to dump a file with no metadata record.
#[test]
fn dump_no_record() {
    let file = create_file(b"Hello, world!");
    let output = test(["dump", "-i", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("no metadata record found"));
    assert!(output.stderr.is_empty());
}

/// Stamp a download image and check the record that lands in the file.
#[test]
fn stamp_download_image() {
    let (output, file) = stamp(
        &firmware(),
        &["--name", "wsm-app", "--firmware-version", "1.2.3"],
    );
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("wsm-app"));
    assert!(output.stderr.is_empty());

    let image = read_file(&file);
    assert_eq!(image.len(), 1000 + Metadata::SIZE);
    assert_eq!(&image[..1000], &firmware()[..]);
    let (metadata, valid) = app_metadata::verify_image::<sha2::Sha256>(&image).unwrap();
    assert!(valid);
    assert_eq!(metadata.name(), Ok("wsm-app"));
    assert_eq!(metadata.version(), Ok("1.2.3"));
    assert_eq!(metadata.dest_address(), consts::BASE_SLOT_B_ADDR);
    assert_eq!(metadata.size(), 1088);
    assert_eq!(metadata.state(), State::Download);
}

/// Firmware that does not end on the record alignment is padded with erased
/// bytes.
#[test]
fn stamp_pads_firmware() {
    let (output, file) = stamp(
        b"Hello, world!",
        &["--name", "hello", "--firmware-version", "0.1.0"],
    );
    assert_eq!(output.exit_code, ExitCode(0));

    let image = read_file(&file);
    assert_eq!(image.len(), 16 + Metadata::SIZE);
    assert_eq!(&image[..13], b"Hello, world!");
    assert_eq!(&image[13..16], &[0xFF; 3]);
    assert!(app_metadata::has_magic(&image[16..]));
}

/// Dump a stamped ready image.
#[test]
fn dump_ready_image() {
    let (output, file) = stamp(
        &firmware(),
        &[
            "--name",
            "wsm-app",
            "--firmware-version",
            "2.0.0",
            "--state",
            "ready",
            "--dest-address",
            "0x20000",
        ],
    );
    assert_eq!(output.exit_code, ExitCode(0));

    let output = test(["dump", "-i", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));

    // Prints name and version.
    assert!(output.stdout.contains("wsm-app"));
    assert!(output.stdout.contains("2.0.0"));
    // Prints destination address in hex.
    assert!(output.stdout.contains("0x00020000"));
    // Prints image size, human readable and raw.
    assert!(output.stdout.contains("1.06 KiB (1088)"));
    // Prints state with raw status fields.
    assert!(output.stdout.contains("ready"));
    assert!(output.stdout.contains("ffffffff00000000"));
    assert!(output.stdout.contains("00000000ffffffff"));
    // Prints the digest and its verdict.
    let image = read_file(&file);
    let digest = &image[image.len() - 32..];
    assert!(output.stdout.contains(&hex::encode(digest)));
    assert!(output.stdout.contains("valid"));
    assert!(!output.stdout.contains("INVALID"));
    assert!(output.stderr.is_empty());
}

/// A modified firmware byte is reported when dumping.
#[test]
fn dump_corrupted_image() {
    let (_, file) = stamp(
        &firmware(),
        &["--name", "wsm-app", "--firmware-version", "1.2.3"],
    );
    let mut image = read_file(&file);
    image[100] ^= 0x01;
    let corrupted = create_file(&image);

    let output = test(["dump", "-i", corrupted.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("INVALID"));
    assert!(output.stderr.is_empty());
}

/// Stamp a file in place, then stamp it again.
#[test]
fn stamp_in_place() {
    let file = create_file(&firmware());
    let output = test([
        "stamp",
        "-i",
        file.path().to_str().unwrap(),
        "--in-place",
        "--name",
        "wsm-app",
        "--firmware-version",
        "1.0.0",
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
    let image = read_file(&file);
    let (metadata, valid) = app_metadata::verify_image::<sha2::Sha256>(&image).unwrap();
    assert!(valid);
    assert_eq!(metadata.version(), Ok("1.0.0"));

    let output = test([
        "stamp",
        "-i",
        file.path().to_str().unwrap(),
        "--in-place",
        "--name",
        "wsm-app",
        "--firmware-version",
        "1.0.1",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.contains("already ends with a metadata record"));
    // The file is left untouched.
    assert_eq!(read_file(&file), image);
}

/// Stamp with the name and destination taken from a config file.
#[test]
fn stamp_with_config() {
    let config = create_file(b"name = \"wsm-cfg\"\ndest_address = \"65536\"\nstate = \"ready\"\n");
    let (output, file) = stamp(
        &firmware(),
        &[
            "-c",
            config.path().to_str().unwrap(),
            "--firmware-version",
            "3.1.4",
        ],
    );
    assert_eq!(output.exit_code, ExitCode(0));
    let image = read_file(&file);
    let (metadata, valid) = app_metadata::verify_image::<sha2::Sha256>(&image).unwrap();
    assert!(valid);
    assert_eq!(metadata.name(), Ok("wsm-cfg"));
    assert_eq!(metadata.dest_address(), 0x10000);
    assert_eq!(metadata.state(), State::Ready);
}

/// Fields given both in the config file and on the CLI are rejected.
#[test]
fn stamp_config_and_cli_conflict() {
    let cases = [
        (
            "name = \"wsm-cfg\"\n",
            ["--name", "wsm-app"],
            "name specified in both config and cli",
        ),
        (
            "dest_address = \"0x10000\"\n",
            ["--dest-address", "0x10000"],
            "destination address specified in both config and cli",
        ),
        (
            "name = \"wsm-cfg\"\nstate = \"ready\"\n",
            ["--state", "ready"],
            "state specified in both config and cli",
        ),
    ];
    for (config, cli, message) in cases {
        let config = create_file(config.as_bytes());
        let mut extra = vec![
            "-c",
            config.path().to_str().unwrap(),
            "--firmware-version",
            "1.0.0",
        ];
        if !config_has_name(&config) {
            extra.extend(["--name", "wsm-app"]);
        }
        extra.extend(cli);
        let (output, _) = stamp(&firmware(), &extra);
        assert_eq!(output.exit_code, ExitCode(1));
        assert!(output.stderr.contains(message));
    }
}

fn config_has_name(config: &tempfile::NamedTempFile) -> bool {
    String::from_utf8(read_file(config)).unwrap().contains("name")
}

/// Unknown keys in the config file are reported.
#[test]
fn stamp_config_unknown_field() {
    let config = create_file(b"name = \"wsm-cfg\"\nsize = 12\n");
    let (output, _) = stamp(
        &firmware(),
        &[
            "-c",
            config.path().to_str().unwrap(),
            "--firmware-version",
            "1.0.0",
        ],
    );
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("config file format error"));
}

#[test]
fn stamp_missing_name() {
    let (output, _) = stamp(&firmware(), &["--firmware-version", "1.0.0"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("name must be specified"));
}

#[test]
fn stamp_invalid_state() {
    let (output, _) = stamp(
        &firmware(),
        &[
            "--name",
            "wsm-app",
            "--firmware-version",
            "1.0.0",
            "--state",
            "invalid",
        ],
    );
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains(r#"invalid state: "invalid""#));
}

#[test]
fn stamp_invalid_dest_address() {
    let (output, _) = stamp(
        &firmware(),
        &[
            "--name",
            "wsm-app",
            "--firmware-version",
            "1.0.0",
            "--dest-address",
            "0xZZ",
        ],
    );
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains(r#"invalid destination address: "0xZZ""#));
}

/// Version and name fields hold at most 8 bytes.
#[test]
fn stamp_fields_too_long() {
    let (output, _) = stamp(
        &firmware(),
        &["--name", "wsm-app", "--firmware-version", "10.20.300"],
    );
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("version too long"));

    let (output, _) = stamp(
        &firmware(),
        &["--name", "application", "--firmware-version", "1.0.0"],
    );
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("name too long"));
}

#[test]
fn stamp_invalid_version_semver() {
    let (output, _) = stamp(
        &firmware(),
        &["--name", "wsm-app", "--firmware-version", "1.0"],
    );
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.contains("--firmware-version"));
}

#[test]
fn stamp_in_place_and_output() {
    let input = create_file(&firmware());
    let output = test([
        "stamp",
        "-i",
        input.path().to_str().unwrap(),
        "--in-place",
        "-o",
        "out.bin",
        "--name",
        "wsm-app",
        "--firmware-version",
        "1.0.0",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output
        .stderr
        .contains("cannot specify both --in-place and --output (-o)"));
}

#[test]
fn stamp_output_missing() {
    let input = create_file(&firmware());
    let output = test([
        "stamp",
        "-i",
        input.path().to_str().unwrap(),
        "--name",
        "wsm-app",
        "--firmware-version",
        "1.0.0",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output
        .stderr
        .contains("either --in-place or --output (-o) is required"));
}

fn test<'a>(args: impl IntoIterator<Item = &'a str> + std::fmt::Debug + Clone) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(
        std::iter::once("app-metadata").chain(args.clone()),
        &mut stdout,
        &mut stderr,
    );
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}

fn create_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}
