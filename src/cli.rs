#![doc = r"Definition of the command line interface of autopkg"]

use clap::{Parser, Subcommand};
use indoc::indoc;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true,
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = indoc! {"
    autopkg (Personal Package Build Orchestrator)

    autopkg resolves package names against the AUR, GNOME Shell extensions and
    configured git recipes, plans a build order, and publishes the results to a
    signed local pacman repository.
    "}
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(subcommand, name = "targets", about = "Manage the persisted set of target package names")]
    Targets(TargetsCommands),

    #[command(subcommand, name = "packages", about = "Manage package artifacts held in the repository")]
    Packages(PackagesCommands),

    #[command(subcommand, name = "git", about = "Manage git-backed build recipes")]
    Git(GitCommands),

    #[command(
        name = "plan",
        about = "Resolve targets and print the build plan without building",
        long_about = indoc! {"
            Resolves the configured targets through the dependency graph and
            planner, and prints the resulting plan list: one line per recipe,
            showing requisites and the build-vs-keep split. Nothing is built.
        "}
    )]
    Plan,

    #[command(
        name = "update",
        about = "Resolve, plan, build and publish the configured targets",
        long_about = indoc! {"
            Runs the full pipeline: resolve targets through the AUR, GNOME Shell
            and git backends, build the dependency graph, lower it to a plan,
            build whatever the plan decides needs building (in a chroot when
            required), and publish the results into the local repository.
        "}
    )]
    Update {
        #[arg(long = "autoremove", help = "Also remove repository artifacts no longer named by any plan")]
        autoremove: bool,
    },

    #[command(
        name = "autoremove",
        about = "Remove repository artifacts no longer needed by any target",
        long_about = indoc! {"
            Resolves the configured targets through the graph/planner and removes
            every artifact currently in the repository that is not named by any
            resulting plan's build or keep list.
        "}
    )]
    Autoremove,
}

#[derive(Subcommand)]
pub enum TargetsCommands {
    #[command(name = "add", about = "Add package names to the target list")]
    Add { names: Vec<String> },
    #[command(name = "remove", about = "Remove package names from the target list")]
    Remove { names: Vec<String> },
    #[command(name = "list", about = "Print the current target list")]
    List,
}

#[derive(Subcommand)]
pub enum PackagesCommands {
    #[command(
        name = "add",
        about = "Register already-built package artifacts into the repository",
        long_about = indoc! {"
            Copies each given artifact file into the repository, signing it if a
            key is configured, and adds it to the repository database. A no-op
            for an artifact whose exact (pkgname, version) is already present.
        "}
    )]
    Add { paths: Vec<PathBuf> },
    #[command(
        name = "remove",
        about = "Remove packages from the repository by name",
        long_about = indoc! {"
            Removes each given package name's artifact, signature and database
            entry from the repository.
        "}
    )]
    Remove { names: Vec<String> },
    #[command(name = "list", about = "Print the packages currently held in the repository")]
    List,
}

#[derive(Subcommand)]
pub enum GitCommands {
    #[command(name = "add", about = "Add a git-backed build recipe")]
    Add {
        url: String,
        path: Option<String>,
        branch: Option<String>,
    },
    #[command(name = "remove", about = "Remove git-backed recipes by their list index")]
    Remove { indices: Vec<usize> },
    #[command(name = "list", about = "Print the configured git recipes")]
    List,
}
