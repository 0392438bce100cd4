use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod relay;

use init::InitCommand;
use relay::RelayCommand;

pub const EXAMPLES: &str = r"
  # Write a default configuration
  $ rstream --home data/ init

  # Stream a file through the relay into another file
  $ rstream --home data/ relay --input video.bin --output copy.bin

  # Small chunks and a tight ceiling, printed to stdout
  $ rstream relay --input notes.txt --chunk-size 512 --max-length 4096
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  RSTREAM_HOME    Directory for config\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "copy")]
    Relay(RelayCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_home())]
    #[arg(env = "RSTREAM_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(self.args),
            SubCommands::Relay(relay) => relay.run(self.args).await,
        }
    }
}
