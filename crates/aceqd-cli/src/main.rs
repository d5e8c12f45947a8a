//! CLI for aceqd: correlation grids for a driven two-level emitter.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aceqd")]
#[command(about = "Multi-time correlation functions via the ACE solver")]
#[command(version = aceqd_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// First-order correlation G1(t, tau); complex-valued grid
    G1 {
        #[command(flatten)]
        args: commands::CorrelateArgs,
    },

    /// Second-order correlation G2(t, tau)
    G2 {
        #[command(flatten)]
        args: commands::CorrelateArgs,
    },

    /// Homodyne-type second-order correlation G2hom(t, tau)
    G2hom {
        #[command(flatten)]
        args: commands::CorrelateArgs,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::G1 { args } => commands::g1::run(&args),
        Commands::G2 { args } => commands::g2::run(&args),
        Commands::G2hom { args } => commands::g2hom::run(&args),
    };
    std::process::exit(code);
}
