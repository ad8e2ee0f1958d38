mod cli;
mod process;
mod targets;

use clap::Parser;

fn main() -> anyhow::Result<std::process::ExitCode> {
    match cli::Cli::try_parse() {
        Ok(cli) => cli.run(),
        Err(e) if e.kind() == clap::error::ErrorKind::MissingSubcommand => {
            let _ = e.print();
            Ok(std::process::ExitCode::from(3))
        }
        Err(e) => Err(e.into()),
    }
}
