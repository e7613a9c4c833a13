//! `ldap-team-sync`: one-shot synchronization of Gitea team memberships with
//! LDAP groups.
//!
//! Usage: `ldap-team-sync [--dry-run] [--check] [--log-level LEVEL] <CONFIG>`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use ldap_team_sync_core::{AppConfig, GiteaClient, LdapDirectory, SyncEngine, SyncReport};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Sync Gitea team members with LDAP groups.
#[derive(Parser, Debug)]
#[command(
    name = "ldap-team-sync",
    version,
    about = "Sync Gitea team members with LDAP groups"
)]
struct Cli {
    /// Path to the JSON (or .toml) configuration file.
    config: PathBuf,

    /// Compute the membership changes without applying them.
    #[arg(long)]
    dry_run: bool,

    /// Only load and validate the configuration.
    #[arg(long, conflicts_with = "dry_run")]
    check: bool,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

async fn run(cli: Cli) -> Result<()> {
    let handle = init_tracing(cli.log_level.as_deref())?;

    let (config, mapping) = AppConfig::load_and_resolve(&cli.config)
        .with_context(|| format!("failed to load configuration from '{}'", cli.config.display()))?;

    if cli.log_level.is_none() {
        if let Some(level) = config.log_level.as_deref() {
            let filter = parse_filter(level).context("invalid LOG_LEVEL in configuration")?;
            handle
                .reload(filter)
                .context("failed to apply LOG_LEVEL from configuration")?;
        }
    }

    if cli.check {
        println!(
            "Configuration OK: {} rule(s) from '{}'",
            mapping.len(),
            cli.config.display()
        );
        return Ok(());
    }

    info!(
        ldap = %config.ldap_host,
        gitea = %config.gitea_host,
        rules = mapping.len(),
        dry_run = cli.dry_run,
        "starting sync run"
    );

    let directory = LdapDirectory::from_config(&config);
    let api = GiteaClient::new(&config.gitea_host, config.gitea_token.clone())
        .context("failed to create Gitea client")?;

    let report = SyncEngine::new(directory, api, mapping)
        .dry_run(cli.dry_run)
        .run()
        .await?;

    print_report(&report);
    Ok(())
}

/// Install the stderr subscriber before the configuration is read.
///
/// Precedence: `--log-level`, then `LOG_LEVEL` from the config (applied
/// later through the returned handle), then `RUST_LOG`, then `info`.
fn init_tracing(level: Option<&str>) -> Result<FilterHandle> {
    let filter = match level {
        Some(level) => parse_filter(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(handle)
}

/// Parse a log level or a full filter directive such as
/// `ldap_team_sync_core=debug`.
///
/// A bare word must be a known level; `EnvFilter` would otherwise take it
/// as a target name and silently log nothing.
fn parse_filter(level: &str) -> Result<EnvFilter> {
    let level = level.trim();
    let is_directive = level.contains(['=', ',', '[']);
    if !is_directive && level.parse::<LevelFilter>().is_err() {
        bail!("unknown log level '{level}' (expected trace, debug, info, warn, error or off)");
    }
    EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{level}'"))
}

fn print_report(report: &SyncReport) {
    let prefix = if report.dry_run { "DRY-RUN" } else { "INFO" };
    for change in &report.changes {
        println!("{prefix}: {change}");
    }
    println!(
        "{prefix}: {} user(s), {} added, {} removed, {} skipped (team not found), {} failed",
        report.users, report.added, report.removed, report.skipped_missing, report.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["ldap-team-sync", "--dry-run", "/etc/sync.json"]);
        assert!(cli.dry_run);
        assert!(!cli.check);
        assert_eq!(cli.config, PathBuf::from("/etc/sync.json"));
    }

    #[test]
    fn test_config_path_is_required() {
        assert!(Cli::try_parse_from(["ldap-team-sync"]).is_err());
    }

    #[test]
    fn test_parse_filter_accepts_levels_and_directives() {
        assert!(parse_filter("debug").is_ok());
        assert!(parse_filter("WARN").is_ok());
        assert!(parse_filter("ldap_team_sync_core=debug,warn").is_ok());
    }

    #[test]
    fn test_parse_filter_rejects_unknown_level() {
        let err = parse_filter("verbose").unwrap_err();
        assert!(err.to_string().contains("unknown log level 'verbose'"));
    }

    #[test]
    fn test_check_conflicts_with_dry_run() {
        assert!(Cli::try_parse_from(["ldap-team-sync", "--check", "--dry-run", "c.json"]).is_err());
    }
}
