use std::io;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre;
use jcli::cli::Args;
use jcli::dispatch;
use tracing_subscriber::EnvFilter;

fn main() -> eyre::Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too.
            let code = if e.use_stderr() { 1 } else { 0 };
            e.print()?;
            return Ok(ExitCode::from(code));
        }
    };

    color_eyre::install()?;

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("JCLI_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let code = dispatch::run(args, &mut io::stdout(), &mut io::stderr())?;

    Ok(ExitCode::from(u8::try_from(code)?))
}
