use audioconv_core::{FormatId, TagMap, TargetFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert an audio file to FLAC, Opus, MP3 or Vorbis",
    long_about = "Creates a conversion session for the input, converts it to the \
                 requested format with the given tags, reports progress while the \
                 conversion runs and prints the written path."
)]
pub struct Cli {
    /// Input audio file
    #[arg(help = "Path to the audio file to convert")]
    pub input: PathBuf,

    /// Target format
    #[arg(
        short,
        long,
        value_parser = parse_format,
        help = "Target format: flac, opus, mp3, vorbis (or ogg), or a numeric format id"
    )]
    pub format: FormatId,

    /// Output path
    #[arg(
        short,
        long,
        help = "Where to write the result; the format's extension is appended when missing \
                (default: next to the input)"
    )]
    pub output: Option<PathBuf>,

    /// Metadata tags
    #[arg(
        short = 't',
        long = "tag",
        value_parser = parse_tag,
        help = "Tag to embed in the output as key=value (repeatable)"
    )]
    pub tags: Vec<(String, String)>,

    /// Configuration file
    #[arg(short, long, env = "AUDIOCONV_CONFIG", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Dump metrics on exit
    #[arg(long, help = "Print Prometheus metrics to stdout before exiting")]
    pub metrics: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed logging output")]
    pub verbose: bool,
}

impl Cli {
    /// Requested output path, before extension normalization.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.with_extension(""))
    }

    pub fn tag_map(&self) -> TagMap {
        self.tags.iter().cloned().collect()
    }
}

fn parse_format(value: &str) -> Result<FormatId, String> {
    if let Some(format) = TargetFormat::from_name(value) {
        return Ok(format.id());
    }
    value
        .parse::<u32>()
        .map(FormatId)
        .map_err(|_| format!("unknown format '{}'", value))
}

fn parse_tag(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, tag)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), tag.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}
