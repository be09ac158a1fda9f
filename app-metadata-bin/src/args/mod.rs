use {app_metadata::State, clap::Parser, std::path::PathBuf};

mod cli;
mod config;

pub use config::Error as ConfigError;

/// Program arguments loaded from the CLI and config file.
#[derive(Debug, Clone)]
pub enum Args {
    /// Dump the metadata record to stdout.
    Dump { input: PathBuf },
    /// Append a metadata record to a firmware file.
    Stamp {
        input: PathBuf,
        output: Output,
        name: String,
        version: String,
        dest_address: u32,
        state: State,
    },
}

#[derive(Debug, Clone)]
pub enum Output {
    InPlace,
    File(PathBuf),
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;
    match cli.command {
        cli::Command::Dump { input } => Ok(Args::Dump { input }),
        cli::Command::Stamp {
            config,
            input,
            in_place,
            output,
            name,
            firmware_version,
            dest_address,
            state,
        } => {
            let config = config
                .map(|c| config::Config::load(&c))
                .transpose()?
                .unwrap_or_default();

            // Anything given both on the CLI and in the config file is an error.
            let name = match (name, config.name) {
                (None, None) => return Err(Error::NameMissing),
                (Some(name), None) | (None, Some(name)) => name,
                (Some(_), Some(_)) => return Err(Error::NameInConfigAndCli),
            };
            let dest_address = match (dest_address, config.dest_address) {
                (None, None) => None,
                (Some(address), None) | (None, Some(address)) => Some(address),
                (Some(_), Some(_)) => return Err(Error::DestAddressInConfigAndCli),
            };
            let state = match (state, config.state) {
                (None, None) => None,
                (Some(state), None) | (None, Some(state)) => Some(state),
                (Some(_), Some(_)) => return Err(Error::StateInConfigAndCli),
            };

            let output = match (in_place, output) {
                (true, None) => Output::InPlace,
                (false, Some(output)) => Output::File(output),
                (true, Some(_)) => return Err(Error::InPlaceAndOutputSpecified),
                (false, None) => return Err(Error::OutputMissing),
            };
            let dest_address = dest_address
                .map(|address| parse_address(&address).ok_or(Error::InvalidDestAddress(address)))
                .transpose()?
                .unwrap_or(consts::BASE_SLOT_B_ADDR);
            let state = match state.as_deref() {
                None | Some("download") => State::Download,
                Some("ready") => State::Ready,
                Some(other) => return Err(Error::InvalidState(other.to_owned())),
            };

            Ok(Args::Stamp {
                input,
                output,
                name,
                version: firmware_version.to_string(),
                dest_address,
                state,
            })
        }
    }
}

fn parse_address(address: &str) -> Option<u32> {
    match address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => address.parse().ok(),
    }
}

#[derive(Debug)]
pub enum Error {
    Cli(clap::Error),
    Config(ConfigError),
    DestAddressInConfigAndCli,
    InPlaceAndOutputSpecified,
    InvalidDestAddress(String),
    InvalidState(String),
    NameInConfigAndCli,
    NameMissing,
    OutputMissing,
    StateInConfigAndCli,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Cli(e) => write!(f, "{}", e.render().ansi()),
            Error::Config(e) => write!(f, "config error: {e}"),
            Error::DestAddressInConfigAndCli => {
                write!(f, "destination address specified in both config and cli")
            }
            Error::InPlaceAndOutputSpecified => {
                write!(f, "cannot specify both --in-place and --output (-o)")
            }
            Error::InvalidDestAddress(address) => {
                write!(f, r#"user specified invalid destination address: "{address}""#)
            }
            Error::InvalidState(state) => {
                write!(
                    f,
                    r#"user specified invalid state: "{state}", expected "download" or "ready""#
                )
            }
            Error::NameInConfigAndCli => write!(f, "name specified in both config and cli"),
            Error::NameMissing => write!(
                f,
                "name must be specified, either with --name or in the config file"
            ),
            Error::OutputMissing => write!(f, "either --in-place or --output (-o) is required"),
            Error::StateInConfigAndCli => write!(f, "state specified in both config and cli"),
        }
    }
}

impl std::error::Error for Error {}
