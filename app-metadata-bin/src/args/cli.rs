//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Dump the metadata record of an image to stdout.
    Dump {
        /// The image file.
        #[clap(short, long)]
        input: PathBuf,
    },
    /// Append a metadata record to a raw firmware file.
    Stamp {
        /// Path to config file.
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// The raw firmware file.
        #[clap(short, long)]
        input: PathBuf,
        /// Update the firmware file in place.
        #[clap(long)]
        in_place: bool,
        /// Path to write the stamped image.
        #[clap(short, long)]
        output: Option<PathBuf>,
        /// Image name, at most 8 characters.
        #[clap(long)]
        name: Option<String>,
        /// Version to write in the record, at most 8 characters.
        #[clap(long)]
        firmware_version: semver::Version,
        /// Address the image runs from, decimal or 0x prefixed hex.
        #[clap(long)]
        dest_address: Option<String>,
        /// Record state. Valid values are "download" and "ready".
        #[clap(long)]
        state: Option<String>,
    },
}
