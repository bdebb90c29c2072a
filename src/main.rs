use crate::internal::{api, log};
use clap::Parser;

mod cli;
mod internal;

/// Executes autopkg (sub) command by calling the corresponding function from
/// the internal API. Flag-combination validation that clap cannot express
/// lives here, ahead of any backend or filesystem work.
fn execute(args: &cli::Args) -> anyhow::Result<()> {
    match &args.command {
        cli::Commands::Targets(cli::TargetsCommands::Add { names }) => api::targets_add(names),
        cli::Commands::Targets(cli::TargetsCommands::Remove { names }) => api::targets_remove(names),
        cli::Commands::Targets(cli::TargetsCommands::List) => api::targets_list(),

        cli::Commands::Packages(cli::PackagesCommands::Add { paths }) => api::packages_add(paths),
        cli::Commands::Packages(cli::PackagesCommands::Remove { names }) => api::packages_remove(names),
        cli::Commands::Packages(cli::PackagesCommands::List) => api::packages_list(),

        cli::Commands::Git(cli::GitCommands::Add { url, path, branch }) => {
            api::git_add(url.clone(), path.clone(), branch.clone())
        }
        cli::Commands::Git(cli::GitCommands::Remove { indices }) => api::git_remove(indices),
        cli::Commands::Git(cli::GitCommands::List) => api::git_list(),

        cli::Commands::Plan => api::plan(),
        cli::Commands::Update { autoremove } => api::update(*autoremove),
        cli::Commands::Autoremove => api::autoremove(),
    }
}

fn main() {
    let _log_guard = match log::init() {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Cannot initialize logging: {:?}", err);
            None
        }
    };

    if let Err(err) = execute(&cli::Args::parse()) {
        log::error(&format!("{:?}", err));
        std::process::exit(1);
    }
}
