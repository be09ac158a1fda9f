use {
    app_metadata::{Metadata, State},
    colored::Colorize,
    std::{
        ffi::OsString,
        io::{Read, Seek, Write},
        path::{Path, PathBuf},
    },
};

mod args;

#[cfg(test)]
mod tests;

fn main() -> std::process::ExitCode {
    main_args(
        std::env::args_os(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e @ args::Error::Cli(_))) => {
            // Clap already does the "error: {}" formatting.
            writeln!(stderr, "{e}").expect("write error to stderr");
            ExitCode(1)
        }
        Err(e) => {
            writeln!(stderr, "{} {e}", "error:".bold().red()).expect("write error to stderr");
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match args::args(args)? {
        args::Args::Dump { input } => {
            let mut input_buf = Vec::new();
            std::fs::File::open(input)
                .map_err(Error::OpenInputFile)?
                .read_to_end(&mut input_buf)
                .map_err(Error::ReadInputFile)?;
            match app_metadata::verify_image::<sha2::Sha256>(&input_buf) {
                Some((metadata, valid)) => dump(&mut stdout, &metadata, valid)?,
                None => writeln!(&mut stdout, "{}", "no metadata record found".bold())
                    .map_err(Error::Stdout)?,
            }
        }
        args::Args::Stamp {
            input: input_path,
            output,
            name,
            version,
            dest_address,
            state,
        } => {
            let mut input_options = std::fs::OpenOptions::new();
            input_options.read(true);
            if let args::Output::InPlace = output {
                // When working in-place, the input file will be written to.
                input_options.write(true);
            }
            let mut input = input_options
                .open(&input_path)
                .map_err(Error::OpenInputFile)?;
            let output = match output {
                args::Output::InPlace => OutputFile::InPlace(
                    // When working in-place, first write to a temporary file. The temporary
                    // file will be moved to the input file at the end of the process.
                    tempfile::NamedTempFile::new().map_err(Error::CreateTempFile)?,
                ),
                args::Output::File(path) => {
                    let file = std::fs::OpenOptions::new()
                        // After being written, the output file is read back and verified.
                        .read(true)
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(&path)
                        .map_err(Error::OpenOutputFile)?;
                    OutputFile::File(file, path)
                }
            };

            let mut image = Vec::new();
            input
                .read_to_end(&mut image)
                .map_err(Error::ReadInputFile)?;
            if app_metadata::verify_image::<sha2::Sha256>(&image).is_some() {
                return Err(Error::AlreadyStamped);
            }

            // Pad the firmware to the record alignment with erased flash bytes.
            let size = app_metadata::image_size(image.len())?;
            image.resize(size as usize - Metadata::SIZE, 0xFF);
            let metadata = Metadata::new(&name, &version, dest_address, size, state)?;
            image.extend_from_slice(&metadata.to_bytes());
            let metadata = app_metadata::seal::<sha2::Sha256>(&mut image)?;

            output
                .file()
                .write_all(&image)
                .map_err(Error::WriteOutputFile)?;

            // When working in-place, the output is actually first written to a temporary
            // file. To achieve the effect of in-place editing, the temporary
            // file must be moved to the input file, replacing it.
            if output.is_in_place() {
                move_file(output.file(), output.path(), &input, &input_path)
                    .map_err(Error::MoveTempFile)?;
            }

            // Read the output back, another process may have been writing to it.
            output
                .file()
                .seek(std::io::SeekFrom::Start(0))
                .map_err(Error::SeekOutputFile)?;
            let mut output_buf = Vec::new();
            output
                .file()
                .read_to_end(&mut output_buf)
                .map_err(Error::ReadOutputFile)?;
            match app_metadata::verify_image::<sha2::Sha256>(&output_buf) {
                Some((_, true)) => {}
                _ => return Err(Error::VerifyOutputFile),
            }

            writeln!(
                &mut stdout,
                "{} {} {} ({} bytes, {})",
                "stamped".bold().green(),
                name,
                version,
                metadata.size(),
                state_name(state),
            )
            .map_err(Error::Stdout)?;
        }
    }
    Ok(())
}

fn dump(stdout: &mut impl Write, metadata: &Metadata, valid: bool) -> Result<(), Error> {
    let text = |field: Result<&str, app_metadata::Error>| match field {
        Ok(text) => text.to_owned(),
        Err(e) => format!("<{e}>"),
    };
    writeln!(stdout, "{:12} {}", "name".bold(), text(metadata.name())).map_err(Error::Stdout)?;
    writeln!(stdout, "{:12} {}", "version".bold(), text(metadata.version()))
        .map_err(Error::Stdout)?;
    writeln!(
        stdout,
        "{:12} {:#010x}",
        "destination".bold(),
        metadata.dest_address()
    )
    .map_err(Error::Stdout)?;
    let human_size = humansize::format_size(metadata.size(), humansize::BINARY);
    writeln!(
        stdout,
        "{:12} {human_size} ({})",
        "size".bold(),
        metadata.size()
    )
    .map_err(Error::Stdout)?;
    writeln!(
        stdout,
        "{:12} {} (validation {}, invalidation {})",
        "state".bold(),
        state_name(metadata.state()),
        hex::encode(metadata.validation()),
        hex::encode(metadata.invalidation()),
    )
    .map_err(Error::Stdout)?;
    writeln!(stdout, "{:12} {}", "sha256".bold(), hex::encode(metadata.digest()))
        .map_err(Error::Stdout)?;
    let verdict = if valid {
        "valid".green()
    } else {
        "INVALID".bold().red()
    };
    writeln!(stdout, "{:12} {verdict}", "digest".bold()).map_err(Error::Stdout)
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Download => "download",
        State::Ready => "ready",
        State::Invalid => "invalid",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum OutputFile {
    InPlace(tempfile::NamedTempFile),
    File(std::fs::File, PathBuf),
}

impl OutputFile {
    fn file(&self) -> &std::fs::File {
        match self {
            OutputFile::InPlace(file) => file.as_file(),
            OutputFile::File(file, _) => file,
        }
    }

    fn path(&self) -> &Path {
        match self {
            OutputFile::InPlace(file) => file.path(),
            OutputFile::File(_, path) => path,
        }
    }

    fn is_in_place(&self) -> bool {
        matches!(self, OutputFile::InPlace(_))
    }
}

fn move_file(
    mut from_file: &std::fs::File,
    from_path: &Path,
    mut to_file: &std::fs::File,
    to_path: &Path,
) -> std::io::Result<()> {
    if std::fs::rename(from_path, to_path).is_err() {
        // If rename fails, the files might be on different filesystems.
        // Fall back to copying and removing the original file.
        from_file.seek(std::io::SeekFrom::Start(0))?;
        to_file.seek(std::io::SeekFrom::Start(0))?;
        to_file.set_len(0)?;
        std::io::copy(&mut from_file, &mut to_file)?;
        std::fs::remove_file(from_path)?;
    }
    Ok(())
}

#[derive(Debug)]
enum Error {
    AlreadyStamped,
    Args(args::Error),
    CreateTempFile(std::io::Error),
    Metadata(app_metadata::Error),
    MoveTempFile(std::io::Error),
    OpenInputFile(std::io::Error),
    OpenOutputFile(std::io::Error),
    ReadInputFile(std::io::Error),
    ReadOutputFile(std::io::Error),
    SeekOutputFile(std::io::Error),
    Stdout(std::io::Error),
    VerifyOutputFile,
    WriteOutputFile(std::io::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<app_metadata::Error> for Error {
    fn from(e: app_metadata::Error) -> Self {
        Error::Metadata(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::AlreadyStamped => write!(f, "input file already ends with a metadata record"),
            Error::Args(e) => write!(f, "{e}"),
            Error::CreateTempFile(e) => write!(f, "failed to create temporary file: {e}"),
            Error::Metadata(e) => write!(f, "{e}"),
            Error::MoveTempFile(e) => write!(f, "failed to move temporary file to output: {e}"),
            Error::OpenInputFile(e) => write!(f, "failed to open input file: {e}"),
            Error::OpenOutputFile(e) => write!(f, "failed to open output file: {e}"),
            Error::ReadInputFile(e) => write!(f, "failed to read input file: {e}"),
            Error::ReadOutputFile(e) => write!(f, "failed to read output file: {e}"),
            Error::SeekOutputFile(e) => write!(f, "failed to seek output file: {e}"),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::VerifyOutputFile => write!(
                f,
                "output file does not verify after writing; is another process using it?"
            ),
            Error::WriteOutputFile(e) => write!(f, "failed to write to output file: {e}"),
        }
    }
}

impl std::error::Error for Error {}
