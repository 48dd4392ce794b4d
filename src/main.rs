// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vmaas::cache::{CacheManager, ModuleStream};
use vmaas::query::{
    EntityKind, PackageTreeRequest, PackagesRequest, QueryService, UpdatesRequest,
    VulnerabilitiesRequest,
};

#[derive(Parser)]
#[command(name = "vmaas")]
#[command(author, version, long_about = None)]
#[command(about = "Query package updates and vulnerabilities from a dataset dump")]
struct Cli {
    /// Dataset dump (.json, .json.gz or .json.zst)
    #[arg(short, long, global = true, env = "VMAAS_DUMP")]
    dump: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available updates for package builds
    Updates {
        /// Package builds (name-[epoch:]version-release.arch)
        #[arg(required = true)]
        packages: Vec<String>,
        /// Restrict to these content-set labels
        #[arg(short, long = "repository")]
        repositories: Vec<String>,
        /// Enabled module streams (name:stream)
        #[arg(short, long = "module", value_parser = parse_module)]
        modules: Vec<ModuleStream>,
        #[arg(long)]
        releasever: Option<String>,
        #[arg(long)]
        basearch: Option<String>,
        /// Only updates shipped by security errata
        #[arg(long)]
        security_only: bool,
    },
    /// Classify CVEs affecting package builds
    Vulnerabilities {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Enabled module streams (name:stream)
        #[arg(short, long = "module", value_parser = parse_module)]
        modules: Vec<ModuleStream>,
    },
    /// Look up CVEs by regular expression
    Cves {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Look up errata by regular expression
    Errata {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Look up repositories by content-set label regular expression
    Repos {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Show metadata of package builds
    Packages {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Show the release history of package names
    Pkgtree {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show the content sets shipping package builds
    PackageRepos {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Show dataset change timestamps
    Dbchange,
    /// Show snapshot entity counts
    Stats,
}

fn parse_module(value: &str) -> std::result::Result<ModuleStream, String> {
    match value.split_once(':') {
        Some((name, stream)) if !name.is_empty() && !stream.is_empty() => {
            Ok(ModuleStream::new(name, stream))
        }
        _ => Err(format!("expected name:stream, got '{}'", value)),
    }
}

/// Load the dump and publish it as the first snapshot
fn load_service(dump: Option<PathBuf>) -> Result<QueryService> {
    let path = dump.context("No dataset dump given (use --dump or VMAAS_DUMP)")?;
    let cache = Arc::new(CacheManager::new());

    let loader_path = path.clone();
    let handle = cache.spawn_refresh(move || vmaas::dump::load_snapshot(&loader_path))?;
    let generation = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Snapshot loader thread panicked"))?
        .with_context(|| format!("Failed to load dataset dump {}", path.display()))?;
    info!("Serving snapshot generation {} from {}", generation, path.display());

    Ok(QueryService::new(cache))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        // No command provided, show help
        println!("VMaaS query engine v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'vmaas --help' for usage information");
        return Ok(());
    };

    let service = load_service(cli.dump)?;
    match command {
        Commands::Updates {
            packages,
            repositories,
            modules,
            releasever,
            basearch,
            security_only,
        } => {
            let request = UpdatesRequest {
                package_list: packages,
                repository_list: (!repositories.is_empty()).then_some(repositories),
                modules_list: modules,
                releasever,
                basearch,
                security_only,
            };
            print_json(&service.updates(&request)?)
        }
        Commands::Vulnerabilities { packages, modules } => {
            let request = VulnerabilitiesRequest {
                package_list: packages,
                modules_list: modules,
            };
            print_json(&service.vulnerabilities(&request)?)
        }
        Commands::Cves { patterns } => {
            print_json(&service.pattern_lookup(EntityKind::Cve, &patterns)?)
        }
        Commands::Errata { patterns } => {
            print_json(&service.pattern_lookup(EntityKind::Erratum, &patterns)?)
        }
        Commands::Repos { patterns } => {
            print_json(&service.pattern_lookup(EntityKind::Repository, &patterns)?)
        }
        Commands::Packages { packages } => print_json(&service.package_info(&PackagesRequest {
            package_list: packages,
        })?),
        Commands::Pkgtree { names } => print_json(&service.package_tree(&PackageTreeRequest {
            package_name_list: names,
        })?),
        Commands::PackageRepos { packages } => {
            print_json(&service.package_repositories(&PackagesRequest {
                package_list: packages,
            })?)
        }
        Commands::Dbchange => print_json(&service.db_change()?),
        Commands::Stats => print_json(&service.stats()?),
    }
}
