//! jweave: weave instrumentation hooks into JVM class files
//!
//! ## Subcommands
//!
//! - **weave**: rewrite class files against an advice catalog
//! - **inspect**: dump the parsed structure of a class file
//! - **catalog**: validate an advice catalog
//! - **bundle**: pack class files into a sandbox bundle manifest
//! - **run**: execute a bundled method in the sandbox with weaving enabled
//!
//! ## Example Usage
//!
//! ```bash
//! # Weave every class under build/ into out/
//! jweave weave --catalog hooks.json build/ -o out/
//!
//! # Show what a class file contains
//! jweave inspect build/demo/Foo.class --json
//!
//! # Validate a catalog without weaving anything
//! jweave catalog check hooks.json
//!
//! # Pack classes and run one method in the sandbox
//! jweave bundle build/ -o classes.json
//! jweave run --catalog hooks.json --bundle classes.json demo.Foo work --args 21
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod jweave_cli;

use jweave_cli::{
    bundle::BundleCmd, catalog::CatalogCmd, inspect::InspectCmd, run::RunCmd, weave::WeaveCmd,
};

#[derive(Parser)]
#[command(
    name = "jweave",
    author,
    version,
    about = "Class-file weaving engine for runtime-attached instrumentation",
    long_about = "Weaves advice hooks into JVM class files: batch rewriting for build steps,\n\
                  catalog validation, class inspection, and a small sandbox for exercising\n\
                  woven output."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite class files against an advice catalog
    Weave(WeaveCmd),

    /// Dump the parsed structure of a class file
    Inspect(InspectCmd),

    /// Validate and describe an advice catalog
    Catalog(CatalogCmd),

    /// Pack class files into a sandbox bundle manifest
    Bundle(BundleCmd),

    /// Load a bundle into the sandbox and invoke a static method
    Run(RunCmd),
}

fn main() -> Result<()> {
    let Cli {
        command,
        json,
        verbose,
    } = Cli::parse();

    // RUST_LOG wins; the -v count only sets the default.
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Commands::Weave(cmd) => cmd.execute(json),
        Commands::Inspect(cmd) => cmd.execute(json),
        Commands::Catalog(cmd) => cmd.execute(json),
        Commands::Bundle(cmd) => cmd.execute(json),
        Commands::Run(cmd) => cmd.execute(json),
    }
}
