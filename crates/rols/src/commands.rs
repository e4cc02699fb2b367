mod serve;

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::args::Args;

pub trait Command {
    async fn execute(&self, args: &Args) -> Result<ExitCode>;
}

#[derive(Debug, Subcommand)]
pub enum RolsCommand {
    /// Start the LSP server
    Serve(self::serve::Serve),
}

impl Command for RolsCommand {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        match self {
            RolsCommand::Serve(serve) => serve.execute(args).await,
        }
    }
}
