use std::process::ExitCode;

use clap::Parser;

fn main() -> anyhow::Result<ExitCode> {
    let cli = numbered_bookmarks::cli::Cli::parse();
    numbered_bookmarks::init(cli.verbose);

    numbered_bookmarks::cli::run(cli)
}
