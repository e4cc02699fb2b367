use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;

use crate::args::Args;
use crate::commands::Command;

#[derive(Debug, Parser)]
pub struct Serve {
    #[arg(short, long, default_value_t = ConnectionType::Stdio, value_enum)]
    connection_type: ConnectionType,
}

#[derive(Clone, Debug, ValueEnum)]
enum ConnectionType {
    Stdio,
}

impl Command for Serve {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        match self.connection_type {
            ConnectionType::Stdio => rols_server::run(args.global.log_directive()).await?,
        }
        Ok(ExitCode::SUCCESS)
    }
}
