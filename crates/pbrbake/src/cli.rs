use std::path::PathBuf;

use bakeconfig::{parse_size, BakeConfig};
use clap::{Parser, Subcommand};
use imagetarget::{FileFormat, NamingConvention};

#[derive(Parser, Debug)]
#[command(
    name = "pbrbake",
    author,
    version,
    about = "Bake PBR material channels from shader graphs into texture images",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Scene description (TOML) listing materials and objects to bake.
    #[arg(value_name = "SCENE")]
    pub scene: Option<PathBuf>,

    /// Bake configuration file; defaults to `bake.toml` in the config directory.
    #[arg(long, value_name = "FILE", env = "PBRBAKE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Channels to bake, by name or key (e.g. `base_color,roughness,normal`).
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub channels: Option<Vec<String>>,

    /// Image resolution (e.g. `2048x2048`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Image naming: `prefix`, `suffix`, `both`, or `map_only`.
    #[arg(long, value_name = "MODE", value_parser = NamingConvention::parse)]
    pub naming: Option<NamingConvention>,

    /// Output directory; a leading `//` is relative to the scene's project file.
    #[arg(long, value_name = "DIR")]
    pub output: Option<String>,

    /// Image file format: `png` or `bmp`.
    #[arg(long, value_name = "FORMAT", value_parser = FileFormat::parse)]
    pub format: Option<FileFormat>,

    /// Cancel the bake after this many steps.
    #[arg(long, value_name = "STEPS")]
    pub cancel_after: Option<usize>,

    /// Write a JSON run report to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl RunArgs {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut BakeConfig) {
        if let Some(channels) = &self.channels {
            config.channels = channels
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }
        if let Some((width, height)) = self.size {
            config.width = width;
            config.height = height;
        }
        if let Some(naming) = self.naming {
            config.naming = naming;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the bakeable channels.
    Channels,
    /// Print resolved configuration and state paths.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}
