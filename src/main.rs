use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use sds_sync::clients::{
    FsDocumentStore, HttpDigestMailer, HttpExtractionClient, HttpHazardRegistryClient,
    HttpMailboxClient, LogAlertSink, SigmaAldrichCatalog, SupplierRegistry, VwrCatalog,
};
use sds_sync::config::{self, EngineConfig};
use sds_sync::db::{count_tables, load_active_tenant_contexts, open_database, schema_version};
use sds_sync::pipeline::{Collaborators, JobReport, Orchestrator};

#[derive(Debug, Parser)]
#[command(name = "sds-sync", version, about = "SDS lifecycle and hazard-sync jobs")]
struct Cli {
    /// TOML settings file.
    #[arg(long, global = true, env = "SDS_SYNC_CONFIG")]
    config: Option<PathBuf>,
    /// SQLite database, overrides the config file.
    #[arg(long, global = true, env = "SDS_SYNC_DB_PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan tenant mailboxes for SDS attachments.
    EmailMonitor,
    /// Check supplier catalogs for newer SDS revisions.
    SupplierPoll,
    /// Re-sync hazard classification from the registry.
    RegistrySync,
    /// Run all three jobs in sequence.
    All,
    /// Create or upgrade the database schema and exit.
    Migrate,
}

fn build_collaborators(config: &EngineConfig) -> anyhow::Result<Collaborators> {
    let e = &config.endpoints;
    let timeout = e.http_timeout_secs;
    let suppliers = SupplierRegistry::new()
        .with(Arc::new(SigmaAldrichCatalog::new(&e.sigma_aldrich_url, timeout)?))
        .with(Arc::new(VwrCatalog::new(&e.vwr_url, timeout)?));

    Ok(Collaborators {
        extraction: Arc::new(HttpExtractionClient::new(&e.extraction_url, timeout)?),
        registry: Arc::new(HttpHazardRegistryClient::new(&e.registry_url, timeout)?),
        suppliers,
        mailbox: Arc::new(HttpMailboxClient::new(&e.mailbox_url, timeout)?),
        store: Arc::new(FsDocumentStore::new(config.storage_root.clone())),
        mailer: Arc::new(HttpDigestMailer::new(&e.mailer_url, timeout)?),
        alerts: Arc::new(LogAlertSink),
    })
}

fn summarize(report: &JobReport) {
    for run in &report.runs {
        info!(
            tenant_id = %run.tenant_id,
            job = %run.job,
            status = %run.status,
            found = run.counts.found,
            settled = run.counts.settled(),
            applied = run.counts.applied,
            queued = run.counts.queued,
            failed = run.counts.failed,
            deferred = run.counts.deferred,
            "Run summary"
        );
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let conn = open_database(&config.db_path)
        .with_context(|| format!("cannot open {}", config.db_path.display()))?;
    if let Command::Migrate = cli.command {
        info!(
            version = schema_version(&conn)?,
            tables = count_tables(&conn)?,
            path = %config.db_path.display(),
            "Schema up to date"
        );
        return Ok(false);
    }

    let services = build_collaborators(&config)?;
    let tenants = load_active_tenant_contexts(&conn)?;
    let orchestrator = Orchestrator::new(&conn, &services, &config);

    let reports = match cli.command {
        Command::EmailMonitor => vec![orchestrator.run_email_monitoring(&tenants)],
        Command::SupplierPoll => vec![orchestrator.run_supplier_polling(&tenants)],
        Command::RegistrySync => vec![orchestrator.run_registry_sync(&tenants)],
        Command::All => vec![
            orchestrator.run_email_monitoring(&tenants),
            orchestrator.run_supplier_polling(&tenants),
            orchestrator.run_registry_sync(&tenants),
        ],
        Command::Migrate => Vec::new(),
    };
    reports.iter().for_each(summarize);
    Ok(reports.iter().any(|r| r.aborted))
}

fn main() -> ExitCode {
    sds_sync::init_tracing();
    info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);

    match run(Cli::parse()) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => {
            tracing::error!("Job aborted on a tenant isolation violation");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "sds-sync failed");
            ExitCode::FAILURE
        }
    }
}
