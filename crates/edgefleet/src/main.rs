use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "edgefleet")]
#[command(about = "Deploy control planes, agents and applications from YAML manifests")]
#[command(version)]
struct Cli {
    /// Directory holding the namespace store
    #[arg(long, global = true, env = "EDGEFLEET_HOME")]
    home: Option<PathBuf>,

    /// Namespace to operate on
    #[arg(
        short,
        long,
        global = true,
        env = "EDGEFLEET_NAMESPACE",
        default_value = "default"
    )]
    namespace: String,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a manifest
    Deploy {
        /// Manifest file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete every resource declared in a manifest
    Delete {
        /// Manifest file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Manage namespaces
    Namespace {
        #[command(subcommand)]
        command: NamespaceCommands,
    },

    /// Show what the store knows about the namespace
    Get {
        #[command(subcommand)]
        what: GetCommands,
    },
}

#[derive(Subcommand)]
enum NamespaceCommands {
    /// Create a namespace
    Create {
        /// Namespace name
        name: String,
    },

    /// Delete a namespace
    Delete {
        /// Namespace name
        name: String,

        /// Remove its agents and control plane first
        #[arg(short, long)]
        force: bool,
    },

    /// List namespaces
    List,
}

#[derive(Subcommand)]
enum GetCommands {
    /// Agents of the namespace
    Agents,
    /// Control plane of the namespace
    #[command(name = "controlplane")]
    ControlPlane,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        home,
        namespace,
        command,
        ..
    } = cli;

    smol::block_on(async move {
        let home = commands::home_dir(home)?;
        let ns = namespace.as_str();
        match command {
            Commands::Deploy { file } => commands::deploy::run(&home, ns, &file).await,
            Commands::Delete { file } => commands::delete::run(&home, ns, &file).await,
            Commands::Namespace { command } => match command {
                NamespaceCommands::Create { name } => {
                    commands::namespace::create(&home, &name).await
                }
                NamespaceCommands::Delete { name, force } => {
                    commands::namespace::delete(&home, &name, force).await
                }
                NamespaceCommands::List => commands::namespace::list(&home).await,
            },
            Commands::Get { what } => match what {
                GetCommands::Agents => commands::get::agents(&home, ns).await,
                GetCommands::ControlPlane => commands::get::control_plane(&home, ns).await,
            },
        }
    })
}
