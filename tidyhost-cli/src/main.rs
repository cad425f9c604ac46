//! Tidyhost command-line host.
//!
//! Formats files in place through the managed Prettier install.

mod document;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use tidyhost_core::{
    format_document, CommandStatus, ConfigStore, DocumentHost, FormatInvoker, FormatOutcome,
    InstallManager, SessionRegistry, Settings, TokioProcessRunner, VersionKey,
};

use crate::document::FileDocument;

#[derive(Debug, Parser)]
#[command(
    name = "tidyhost",
    version,
    about = "Format files with a managed Prettier install"
)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Formatter version for this run, e.g. "3.3.3" or "latest"
    #[arg(long, global = true, value_name = "VERSION")]
    version_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Format files in place
    Format(FormatArgs),
    /// Install the configured formatter version
    Install,
    /// Show the formatter install state
    Status,
}

#[derive(Debug, Args)]
struct FormatArgs {
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,
    /// Report files that would change without writing them
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tidyhost=debug".parse().unwrap())
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("Starting tidyhost v{}", tidyhost_core::VERSION);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ConfigStore {
    let config = match cli.config.clone().or_else(Settings::default_path) {
        Some(path) => ConfigStore::load(path),
        None => {
            tracing::warn!("No config directory available, using default settings");
            ConfigStore::default()
        }
    };

    if let Some(version) = &cli.version_key {
        config.override_version_key(&VersionKey::new(version));
    }
    config
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Arc::new(load_config(&cli));
    let manager = Arc::new(InstallManager::new(config, Arc::new(TokioProcessRunner)));

    match cli.command {
        Commands::Format(args) => run_format(manager, args).await,
        Commands::Install => run_install(&manager).await,
        Commands::Status => {
            run_status(&manager);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_format(manager: Arc<InstallManager>, args: FormatArgs) -> Result<ExitCode> {
    // Install once up front; concurrent documents would otherwise see "installing".
    match manager.spawn_warm_up().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(
            "Private formatter install unavailable, only project-local formatters will be used"
        ),
        Err(e) => tracing::warn!("Warm-up install task failed: {}", e),
    }

    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        documents.push(FileDocument::open(path, args.check).await?);
    }

    let invoker = FormatInvoker::new(manager);
    let sessions = SessionRegistry::new();

    let runs = documents.iter().map(|doc| {
        let session = sessions.attach(doc.path(), doc.encoding());
        let invoker = &invoker;
        async move { (doc, format_document(invoker, &session, doc).await) }
    });
    let results = join_all(runs).await;

    let mut changed = 0usize;
    let mut failed = 0usize;
    for (doc, result) in results {
        let path = doc.path().display();
        match result {
            Ok(FormatOutcome::Formatted(_)) => {
                changed += 1;
                if args.check {
                    println!("would reformat {path}");
                } else {
                    println!("formatted {path}");
                }
            }
            Ok(FormatOutcome::SkippedUnchanged) => {}
            Ok(FormatOutcome::SkippedNoTool) => {
                failed += 1;
                eprintln!("{path}: no formatter available");
            }
            Ok(FormatOutcome::SkippedNoOutput) => {
                failed += 1;
                eprintln!("{path}: formatter produced no output");
            }
            Ok(FormatOutcome::SkippedReentrant) => {
                tracing::debug!(path = %path, "Skipped, already formatting");
            }
            Err(e) => {
                failed += 1;
                eprintln!("{path}: {e:#}");
            }
        }
        sessions.close(doc.path());
    }

    let total = args.files.len();
    if args.check {
        println!("{changed} of {total} file(s) would be reformatted");
    } else {
        println!("{changed} of {total} file(s) reformatted");
    }

    Ok(if failed > 0 {
        ExitCode::from(2)
    } else if args.check && changed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn run_install(manager: &InstallManager) -> Result<ExitCode> {
    let key = manager.config().version_key();
    if manager.ensure_installed().await {
        // The key may have fallen back to "latest" during the install.
        let install = manager.current_install();
        println!(
            "prettier@{} installed at {}",
            manager.config().version_key(),
            install.executable.display()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("failed to install prettier@{key}, see the log above");
        Ok(ExitCode::FAILURE)
    }
}

fn run_status(manager: &InstallManager) {
    let install = manager.current_install();
    let npm_cli = manager
        .package_manager_cli()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "not found".to_string());

    println!("version:     {}", manager.config().version_key());
    println!("status:      {}", manager.status());
    println!("install dir: {}", install.install_dir.display());
    println!("executable:  {}", install.executable.display());
    println!("runtime:     {}", manager.config().runtime());
    println!("npm-cli.js:  {npm_cli}");
    if let Some(path) = manager.config().path() {
        println!("settings:    {}", path.display());
    }
    println!(
        "command:     {}",
        CommandStatus::for_readiness(manager.is_ready()).label
    );
}
