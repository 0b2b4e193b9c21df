//! lsif-bundler CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lsif_bundler::cli::Cli;
use lsif_bundler::convert::{convert, CancelFlag};
use lsif_bundler::gitserver::GitCli;
use lsif_bundler::Result;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "lsif_bundler=debug" } else { "lsif_bundler=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<String> {
    let revision_control = GitCli::new(&cli.repo);
    let cancel = CancelFlag::new();

    let (packages, references) = convert(
        &cli.input,
        &cli.output,
        &cli.root,
        &cli.commit,
        &revision_control,
        &cancel,
    )?;

    Ok(format!(
        "wrote {} ({} packages, {} references)",
        cli.output.display(),
        packages.len(),
        references.len()
    ))
}
