use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use espwire_frame::Personality;
use espwire_transport::LinkKind;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay recorded demo data and print what the engine reports.
    Replay(ReplayArgs),
    /// Decode frames from hex.
    Decode(DecodeArgs),
    /// Print the wire bytes of a request.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LinkArg {
    Stream,
    Message,
}

impl From<LinkArg> for LinkKind {
    fn from(arg: LinkArg) -> Self {
        match arg {
            LinkArg::Stream => LinkKind::Stream,
            LinkArg::Message => LinkKind::Message,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PersonalityArg {
    Checksum,
    NoChecksum,
    Legacy,
}

impl From<PersonalityArg> for Personality {
    fn from(arg: PersonalityArg) -> Self {
        match arg {
            PersonalityArg::Checksum => Personality::Checksum,
            PersonalityArg::NoChecksum => Personality::NoChecksum,
            PersonalityArg::Legacy => Personality::Legacy,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Demo file: comments, `<label:message>` notifications and hex lines.
    pub file: PathBuf,
    /// Exit after printing N items.
    #[arg(long)]
    pub count: Option<usize>,
    /// Stop after the last line instead of starting over.
    #[arg(long)]
    pub no_repeat: bool,
    /// Delay between replayed data lines, in milliseconds.
    #[arg(long, value_name = "MS", default_value = "68")]
    pub interval: u64,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex input, one delivery per argument (e.g. "7F 0D AA D8 EA ...").
    #[arg(required = true)]
    pub hex: Vec<String>,
    /// Link framing of the input.
    #[arg(long, default_value = "stream")]
    pub link: LinkArg,
    /// Detector personality to decode under.
    #[arg(long, default_value = "checksum")]
    pub personality: PersonalityArg,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Packet kind, by name (REQVERSION) or number (0x01).
    pub kind: String,
    /// Destination device id nibble (hex). Default: the detector.
    #[arg(long, value_name = "ID")]
    pub dest: Option<String>,
    /// Payload bytes in hex.
    #[arg(long, value_name = "HEX")]
    pub payload: Option<String>,
    /// Link framing to encode for.
    #[arg(long, default_value = "stream")]
    pub link: LinkArg,
    /// Detector personality to encode for.
    #[arg(long, default_value = "checksum")]
    pub personality: PersonalityArg,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
