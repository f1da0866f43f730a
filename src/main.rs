use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use kiln::{klog, klog_error, Project, Result};

/// Kiln - front-end asset build orchestrator
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    KILN_DEBUG=1       Enable debug logging (alternative to --debug)\n    KILN_LOG_FILE=path Also append log records to a file")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (defaults to <root>/kiln.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Also append log records to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// One-shot release build into the distribution root
    Build,

    /// Build, serve the staging root with live reload, rebuild on change
    Develop {
        /// Dev server port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Release build, then serve the distribution root
    Preview {
        /// Preview server port (overrides server.preview_port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Remove the staging root and empty the distribution root
    Clean,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    kiln::log::init(cli.debug, cli.log_file.clone());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            klog_error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let project = Project::load(&root, cli.config.as_deref())?;
    let command = cli.command;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                klog!("Interrupted, shutting down");
                on_signal.cancel();
            }
        });

        match command {
            Command::Build => project.build().await.map(|_| ()),
            Command::Develop { port } => project.develop(port, cancel).await,
            Command::Preview { port } => project.preview(port, cancel).await,
            Command::Clean => project.clean().await,
        }
    })
}
