//! Tenant-scoped job runner.
//!
//! Each job walks the active tenants sequentially, one `SyncRun` per
//! tenant. A tenant's failure is recorded on its run and the job moves on;
//! an isolation violation aborts the whole job and raises an alert.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::{ErrorClass, SyncError};
use super::ingest::{monitor_mailbox, poll_suppliers};
use super::notify::{dispatch, RunInfo};
use super::pacing::{CancelFlag, Deadline, Pacer};
use super::registry_sync::sync_hazards;
use super::run::{Collaborators, TenantRun};
use crate::config::EngineConfig;
use crate::db::repository::{finish_sync_run, start_sync_run};
use crate::models::enums::{JobKind, RunStatus};
use crate::models::{SyncRun, TenantContext};
use crate::tenancy::TenantId;

/// Outcome of one job invocation across all tenants.
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub runs: Vec<SyncRun>,
    /// Tenants not reached before the budget ran out or the job was cancelled.
    pub deferred_tenants: Vec<TenantId>,
    pub aborted: bool,
    pub cancelled: bool,
}

impl JobReport {
    pub fn run_for(&self, tenant: &TenantId) -> Option<&SyncRun> {
        self.runs.iter().find(|r| &r.tenant_id == tenant)
    }
}

pub struct Orchestrator<'a> {
    conn: &'a Connection,
    services: &'a Collaborators,
    config: &'a EngineConfig,
    cancel: CancelFlag,
    clock: Option<DateTime<Utc>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(conn: &'a Connection, services: &'a Collaborators, config: &'a EngineConfig) -> Self {
        Self {
            conn,
            services,
            config,
            cancel: CancelFlag::new(),
            clock: None,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pin the run clock instead of reading the system time.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now).trunc_subsecs(0)
    }

    pub fn run_email_monitoring(&self, tenants: &[TenantContext]) -> JobReport {
        self.run_job(JobKind::EmailMonitor, tenants, monitor_mailbox)
    }

    pub fn run_supplier_polling(&self, tenants: &[TenantContext]) -> JobReport {
        self.run_job(JobKind::SupplierPoll, tenants, poll_suppliers)
    }

    pub fn run_registry_sync(&self, tenants: &[TenantContext]) -> JobReport {
        self.run_job(JobKind::RegistrySync, tenants, sync_hazards)
    }

    fn run_job<F>(&self, job: JobKind, tenants: &[TenantContext], per_tenant: F) -> JobReport
    where
        F: Fn(&mut TenantRun<'_>) -> Result<(), SyncError>,
    {
        let deadline = Deadline::start(self.config.job_budget());
        let mut tenant_pacer = Pacer::new(self.config.tenant_delay(), self.cancel.clone());
        let mut report = JobReport::default();
        tracing::info!(job = %job, tenants = tenants.len(), "Job started");

        for (index, ctx) in tenants.iter().enumerate() {
            if self.cancel.is_cancelled() || deadline.expired() {
                report.cancelled = self.cancel.is_cancelled();
                report.deferred_tenants = tenants[index..].iter().map(|c| c.id().clone()).collect();
                tracing::warn!(
                    job = %job,
                    deferred = report.deferred_tenants.len(),
                    cancelled = report.cancelled,
                    "Job stopped before all tenants were processed"
                );
                break;
            }
            if !ctx.is_active() {
                tracing::debug!(job = %job, tenant_id = %ctx.id(), "Tenant inactive, skipped");
                continue;
            }
            tenant_pacer.wait();

            match self.run_tenant(job, ctx, deadline, &per_tenant) {
                Ok(run) => report.runs.push(run),
                Err((run, message)) => {
                    report.runs.push(run);
                    report.aborted = true;
                    self.services.alerts.raise(ctx.id(), job, &message);
                    break;
                }
            }
        }

        tracing::info!(
            job = %job,
            runs = report.runs.len(),
            aborted = report.aborted,
            "Job finished"
        );
        report
    }

    /// One tenant's run. `Err` carries the aborted run and the alert text.
    fn run_tenant<F>(
        &self,
        job: JobKind,
        ctx: &TenantContext,
        deadline: Deadline,
        per_tenant: &F,
    ) -> Result<SyncRun, (SyncRun, String)>
    where
        F: Fn(&mut TenantRun<'_>) -> Result<(), SyncError>,
    {
        let now = self.now();
        let mut run = SyncRun {
            id: Uuid::new_v4(),
            tenant_id: ctx.id().clone(),
            job,
            started_at: now,
            finished_at: None,
            status: RunStatus::Running,
            counts: Default::default(),
            error: None,
        };
        if let Err(e) = start_sync_run(self.conn, &run) {
            tracing::error!(tenant_id = %ctx.id(), job = %job, error = %e, "Cannot record run start");
            run.status = RunStatus::Failed;
            run.error = Some(e.to_string());
            run.finished_at = Some(now);
            return Ok(run);
        }

        let mut tr = TenantRun::new(
            self.conn,
            self.services,
            self.config,
            ctx,
            run.id,
            now,
            deadline,
            self.cancel.clone(),
        );
        let result = per_tenant(&mut tr);
        run.counts = tr.counts;

        let mut abort = None;
        run.status = match &result {
            Ok(()) if run.counts.failed > 0 || run.counts.deferred > 0 => RunStatus::Partial,
            Ok(()) => RunStatus::Completed,
            Err(e) => {
                run.error = Some(e.to_string());
                match e.class() {
                    ErrorClass::Configuration => {
                        tracing::debug!(tenant_id = %ctx.id(), job = %job, reason = %e, "Tenant skipped");
                        RunStatus::Skipped
                    }
                    ErrorClass::Integrity => {
                        tracing::error!(
                            severity = "critical",
                            tenant_id = %ctx.id(),
                            run_id = %run.id,
                            job = %job,
                            error = %e,
                            "Tenant isolation violated, aborting job"
                        );
                        abort = Some(e.to_string());
                        RunStatus::Aborted
                    }
                    ErrorClass::Cancelled => RunStatus::Partial,
                    _ => {
                        tracing::warn!(tenant_id = %ctx.id(), run_id = %run.id, job = %job, error = %e, "Tenant run failed");
                        RunStatus::Failed
                    }
                }
            }
        };

        if abort.is_none() {
            let info = RunInfo {
                job,
                run_id: run.id,
                counts: run.counts,
            };
            if let Err(e) = dispatch(self.conn, self.services.mailer.as_ref(), &tr.scope, &info, &tr.notices, now) {
                tracing::warn!(tenant_id = %ctx.id(), run_id = %run.id, error = %e, "Notification dispatch failed");
                if let SyncError::DataIntegrityViolation(_) = e {
                    run.status = RunStatus::Aborted;
                    run.error = Some(e.to_string());
                    abort = Some(e.to_string());
                }
            }
        }

        run.finished_at = Some(self.now().max(now));
        if let Err(e) = finish_sync_run(self.conn, &run) {
            tracing::error!(tenant_id = %ctx.id(), run_id = %run.id, error = %e, "Cannot record run result");
        }
        tracing::info!(
            tenant_id = %ctx.id(),
            run_id = %run.id,
            job = %job,
            status = %run.status,
            found = run.counts.found,
            applied = run.counts.applied,
            queued = run.counts.queued,
            discarded = run.counts.discarded,
            failed = run.counts.failed,
            deferred = run.counts.deferred,
            "Tenant run finished"
        );

        match abort {
            Some(message) => Err((run, message)),
            None => Ok(run),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fake::FakeExtraction;
    use crate::clients::SupplierRegistry;
    use crate::db::repository::list_sync_runs;
    use crate::db::repository::test_support::*;
    use crate::models::enums::TenantStatus;
    use crate::pipeline::run::test_support::*;
    use crate::tenancy::{IsolationViolation, TenantScope};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 20, 2, 0, 0).unwrap()
    }

    #[test]
    fn isolation_violation_aborts_job_and_alerts() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let globex = seed_tenant(&conn, "globex");
        let fakes = Fakes::new(FakeExtraction::new());
        let services = fakes.collaborators(SupplierRegistry::new());
        let config = fast_config();
        let tenants = vec![context(&acme), context(&globex)];
        let orchestrator = Orchestrator::new(&conn, &services, &config).at(now());

        let leaked = globex.clone();
        let report = orchestrator.run_job(JobKind::SupplierPoll, &tenants, |tr: &mut TenantRun<'_>| {
            let violation: IsolationViolation = tr.scope.ensure_owned(&leaked, "chemical", "r-1").unwrap_err();
            Err(violation.into())
        });

        assert!(report.aborted);
        assert_eq!(report.runs.len(), 1);
        assert_eq!(report.runs[0].status, RunStatus::Aborted);
        assert_eq!(fakes.alerts.alerts().len(), 1);
        assert!(list_sync_runs(&conn, &globex, JobKind::SupplierPoll).unwrap().is_empty());
    }

    #[test]
    fn configuration_gaps_skip_and_inactive_tenants_are_ignored() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let dormant = seed_tenant(&conn, "dormant");
        let fakes = Fakes::new(FakeExtraction::new());
        let services = fakes.collaborators(SupplierRegistry::new());
        let config = fast_config();
        let mut inactive = context(&dormant);
        inactive.tenant.status = TenantStatus::Suspended;
        let tenants = vec![context(&acme), inactive];

        let report = Orchestrator::new(&conn, &services, &config)
            .at(now())
            .run_email_monitoring(&tenants);

        assert_eq!(report.runs.len(), 1);
        assert_eq!(report.runs[0].status, RunStatus::Skipped);
        let stored = list_sync_runs(&conn, &acme, JobKind::EmailMonitor).unwrap();
        assert_eq!(stored[0].status, RunStatus::Skipped);
        assert!(stored[0].finished_at.is_some());
    }

    #[test]
    fn cancellation_defers_remaining_tenants() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let globex = seed_tenant(&conn, "globex");
        let fakes = Fakes::new(FakeExtraction::new());
        let services = fakes.collaborators(SupplierRegistry::new());
        let config = fast_config();
        let tenants = vec![context(&acme), context(&globex)];
        let cancel = CancelFlag::new();
        let orchestrator = Orchestrator::new(&conn, &services, &config)
            .with_cancel_flag(cancel.clone())
            .at(now());

        let report = orchestrator.run_job(JobKind::RegistrySync, &tenants, |_tr: &mut TenantRun<'_>| {
            cancel.cancel();
            Ok(())
        });

        assert!(report.cancelled);
        assert_eq!(report.runs.len(), 1);
        assert_eq!(report.deferred_tenants, vec![globex]);
    }

    #[test]
    fn failing_tenant_does_not_block_the_next() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let globex = seed_tenant(&conn, "globex");
        let fakes = Fakes::new(FakeExtraction::new());
        let services = fakes.collaborators(SupplierRegistry::new());
        let config = fast_config();
        let tenants = vec![context(&acme), context(&globex)];
        let orchestrator = Orchestrator::new(&conn, &services, &config).at(now());

        let report = orchestrator.run_job(JobKind::SupplierPoll, &tenants, |tr: &mut TenantRun<'_>| {
            if tr.scope == TenantScope::new(TenantId::parse("acme").unwrap()) {
                return Err(SyncError::TransientExternal {
                    service: "vwr".into(),
                    detail: "connection reset".into(),
                });
            }
            tr.counts.found = 3;
            tr.counts.applied = 3;
            Ok(())
        });

        assert!(!report.aborted);
        assert_eq!(report.run_for(&acme).unwrap().status, RunStatus::Failed);
        let globex_run = report.run_for(&globex).unwrap();
        assert_eq!(globex_run.status, RunStatus::Completed);
        assert_eq!(globex_run.counts.applied, 3);
    }
}
