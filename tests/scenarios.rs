//! End-to-end job runs against an in-memory database and fake collaborators.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use sds_sync::clients::fake::{
    FakeAlertSink, FakeDocumentStore, FakeExtraction, FakeMailbox, FakeMailer, FakeRegistry,
    FakeSupplierCatalog,
};
use sds_sync::clients::{MailAttachment, MailMessage, RegistryEntry, SdsInfo, SupplierRegistry};
use sds_sync::config::EngineConfig;
use sds_sync::db::{
    get_chemical, insert_chemical, insert_tenant, insert_user, list_audit_for_record, list_notifications,
    list_pending, load_active_tenant_contexts, open_memory_database, set_mailbox_integration,
    set_supplier_integration,
};
use sds_sync::models::enums::{
    AuditAction, QueueReason, ReasonCode, RunStatus, SubstitutionPriority, TenantStatus, UserRole,
};
use sds_sync::models::{
    ChemicalRecord, ExtractedFields, MailboxCredentials, StructuredExtraction, SupplierCredentials,
    Tenant, TenantUser,
};
use sds_sync::pipeline::{Collaborators, Orchestrator};
use sds_sync::tenancy::TenantId;

const SIGMA_SDS: &[u8] = b"%PDF-1.7 sigma acrylonitrile rev 7";
const VWR_SDS: &[u8] = b"%PDF-1.7 vwr toluene rev 3";
const MAILED_SDS: &[u8] = b"%PDF-1.7 unknown solvent";

fn now() -> DateTime<Utc> {
    // a Monday
    Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        external_call_delay_ms: 0,
        tenant_delay_ms: 0,
        ..Default::default()
    }
}

struct World {
    conn: Connection,
    registry: Arc<FakeRegistry>,
    mailbox: Arc<FakeMailbox>,
    store: Arc<FakeDocumentStore>,
    mailer: Arc<FakeMailer>,
    alerts: Arc<FakeAlertSink>,
    extraction: Arc<FakeExtraction>,
    suppliers: SupplierRegistry,
}

impl World {
    fn new() -> Self {
        Self {
            conn: open_memory_database().unwrap(),
            registry: Arc::new(FakeRegistry::new()),
            mailbox: Arc::new(FakeMailbox::new()),
            store: Arc::new(FakeDocumentStore::new()),
            mailer: Arc::new(FakeMailer::new()),
            alerts: Arc::new(FakeAlertSink::new()),
            extraction: Arc::new(extractions()),
            suppliers: SupplierRegistry::new(),
        }
    }

    fn services(&self) -> Collaborators {
        Collaborators {
            extraction: self.extraction.clone(),
            registry: self.registry.clone(),
            suppliers: self.suppliers.clone(),
            mailbox: self.mailbox.clone(),
            store: self.store.clone(),
            mailer: self.mailer.clone(),
            alerts: self.alerts.clone(),
        }
    }

    fn tenant(&self, id: &str) -> TenantId {
        let tenant = TenantId::parse(id).unwrap();
        insert_tenant(
            &self.conn,
            &Tenant {
                id: tenant.clone(),
                name: format!("Tenant {id}"),
                status: TenantStatus::Active,
            },
        )
        .unwrap();
        tenant
    }

    fn user(&self, tenant: &TenantId, email: &str, role: UserRole, opt_in: bool) {
        insert_user(
            &self.conn,
            &TenantUser {
                id: Uuid::new_v4(),
                tenant_id: tenant.clone(),
                email: email.into(),
                role,
                notifications_opt_in: opt_in,
            },
        )
        .unwrap();
    }

    fn record(&self, tenant: &TenantId, name: &str, cas: &str, supplier: &str, catalog: &str) -> ChemicalRecord {
        let mut r = ChemicalRecord::new(tenant.clone(), name);
        r.cas_number = Some(cas.into());
        r.supplier = Some(supplier.into());
        r.catalog_number = Some(catalog.into());
        r.sds_date = NaiveDate::from_ymd_opt(2022, 5, 1);
        insert_chemical(&self.conn, &r).unwrap();
        r
    }
}

fn extractions() -> FakeExtraction {
    FakeExtraction::new()
        .with(
            SIGMA_SDS,
            StructuredExtraction::new(
                ExtractedFields {
                    product_name: Some("Acrylonitrile".into()),
                    cas_number: Some("107-13-1".into()),
                    sds_version: Some("7.0".into()),
                    sds_date: NaiveDate::from_ymd_opt(2026, 8, 1),
                    hazard_statements: vec!["H225".into(), "H350".into()],
                    ..Default::default()
                },
                0.95,
            ),
        )
        .with(
            VWR_SDS,
            StructuredExtraction::new(
                ExtractedFields {
                    product_name: Some("Toluene".into()),
                    cas_number: Some("108-88-3".into()),
                    sds_version: Some("3.0".into()),
                    sds_date: NaiveDate::from_ymd_opt(2026, 6, 15),
                    hazard_statements: vec!["H225".into(), "H361d".into()],
                    ..Default::default()
                },
                0.92,
            ),
        )
        .with(
            MAILED_SDS,
            StructuredExtraction::new(
                ExtractedFields {
                    product_name: Some("Mystery Solvent".into()),
                    cas_number: Some("64-17-5".into()),
                    ..Default::default()
                },
                0.5,
            ),
        )
}

fn sds(catalog: &str, version: &str, date: (i32, u32, u32)) -> SdsInfo {
    SdsInfo {
        catalog_number: catalog.into(),
        version: Some(version.into()),
        revision_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        download_url: None,
    }
}

fn creds(account: &str) -> SupplierCredentials {
    SupplierCredentials {
        account: account.into(),
        api_key: "key".into(),
    }
}

#[test]
fn confident_supplier_revision_is_applied() {
    let mut world = World::new();
    let acme = world.tenant("acme");
    let record = world.record(&acme, "Acrylonitrile", "107-13-1", "Sigma-Aldrich", "110213");
    world.user(&acme, "hms@acme.test", UserRole::Hms, true);
    set_supplier_integration(&world.conn, &acme, "sigma-aldrich", &creds("acme")).unwrap();
    world.suppliers = SupplierRegistry::new().with(Arc::new(
        FakeSupplierCatalog::new("sigma-aldrich").with_sds(
            "110213",
            sds("110213", "7.0", (2026, 8, 1)),
            SIGMA_SDS.to_vec(),
        ),
    ));

    let services = world.services();
    let config = config();
    let tenants = load_active_tenant_contexts(&world.conn).unwrap();
    let report = Orchestrator::new(&world.conn, &services, &config)
        .at(now())
        .run_supplier_polling(&tenants);

    let run = report.run_for(&acme).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.found, 1);
    assert_eq!(run.counts.applied, 1);

    let stored = get_chemical(&world.conn, &acme, &record.id).unwrap().unwrap();
    assert_eq!(stored.sds_version.as_deref(), Some("7.0"));
    assert_eq!(stored.sds_date, NaiveDate::from_ymd_opt(2026, 8, 1));
    assert_eq!(stored.next_review_date, NaiveDate::from_ymd_opt(2029, 8, 1));
    assert!(stored.is_cmr);
    assert!(stored.sds_storage_key.unwrap().starts_with("sds/acme/"));

    let audit = list_audit_for_record(&world.conn, &acme, &record.id).unwrap();
    assert_eq!(audit[0].action, AuditAction::AutoApply);
    assert_eq!(audit[0].confidence, Some(0.95));

    let notes = list_notifications(&world.conn, &acme).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].reason, ReasonCode::HazardChanged);
    assert_eq!(world.mailer.sent().len(), 1);
}

#[test]
fn unmatched_email_attachment_waits_for_review() {
    let mut world = World::new();
    let acme = world.tenant("acme");
    world.user(&acme, "admin@acme.test", UserRole::Admin, true);
    world.user(&acme, "hms@acme.test", UserRole::Hms, true);
    world.user(&acme, "lab@acme.test", UserRole::Member, true);
    world.user(&acme, "quiet@acme.test", UserRole::Admin, false);
    set_mailbox_integration(
        &world.conn,
        &acme,
        &MailboxCredentials {
            address: "sds@acme.test".into(),
            access_token: "token".into(),
        },
    )
    .unwrap();
    world.mailbox = Arc::new(FakeMailbox::new().with_message(
        "sds@acme.test",
        MailMessage {
            id: "m-1".into(),
            subject: "Updated safety data sheet".into(),
            received_at: now() - Duration::hours(6),
            attachments: vec![MailAttachment {
                filename: "solvent.pdf".into(),
                content_type: "application/pdf".into(),
                bytes: MAILED_SDS.to_vec(),
            }],
        },
    ));

    let services = world.services();
    let config = config();
    let tenants = load_active_tenant_contexts(&world.conn).unwrap();
    let orchestrator = Orchestrator::new(&world.conn, &services, &config).at(now());
    let report = orchestrator.run_email_monitoring(&tenants);

    let run = report.run_for(&acme).unwrap();
    assert_eq!(run.counts.found, 1);
    assert_eq!(run.counts.queued, 1);
    assert_eq!(run.counts.applied, 0);

    let pending = list_pending(&world.conn, &acme).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reason, QueueReason::NoMatchingRecord);
    assert_eq!(pending[0].record_id, None);

    let notes = list_notifications(&world.conn, &acme).unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(|n| n.reason == ReasonCode::ReviewRequired));

    let sent = world.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, vec!["admin@acme.test".to_string(), "hms@acme.test".to_string()]);

    // second pass: the attachment ledger skips the message entirely
    let again = orchestrator.run_email_monitoring(&tenants);
    let run = again.run_for(&acme).unwrap();
    assert_eq!(run.counts.found, 0);
    assert_eq!(list_pending(&world.conn, &acme).unwrap().len(), 1);
    assert_eq!(list_notifications(&world.conn, &acme).unwrap().len(), 2);
    assert_eq!(world.extraction.calls(), 1);
}

#[test]
fn registry_carcinogen_raises_substitution_priority() {
    let mut world = World::new();
    let acme = world.tenant("acme");
    let record = world.record(&acme, "Acrylonitrile", "107-13-1", "Sigma-Aldrich", "110213");
    world.user(&acme, "hms@acme.test", UserRole::Hms, true);
    world.registry = Arc::new(
        FakeRegistry::new()
            .with_entry(
                "107-13-1",
                RegistryEntry {
                    ec_number: Some("203-466-5".into()),
                    is_svhc: false,
                    reach_status: Some("registered".into()),
                    hazard_codes: vec!["H225".into(), "H350".into()],
                },
            )
            .with_alternatives("107-13-1", &["Methacrylonitrile"]),
    );

    let services = world.services();
    let config = config();
    let tenants = load_active_tenant_contexts(&world.conn).unwrap();
    let orchestrator = Orchestrator::new(&world.conn, &services, &config).at(now());
    let report = orchestrator.run_registry_sync(&tenants);

    let run = report.run_for(&acme).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.applied, 1);

    let stored = get_chemical(&world.conn, &acme, &record.id).unwrap().unwrap();
    assert!(stored.is_cmr);
    assert!(stored.substitution_priority >= SubstitutionPriority::Medium);
    assert_eq!(stored.ec_number.as_deref(), Some("203-466-5"));
    assert_eq!(stored.hazard_synced_at, Some(now()));

    let reasons: Vec<ReasonCode> = list_notifications(&world.conn, &acme)
        .unwrap()
        .into_iter()
        .map(|n| n.reason)
        .collect();
    assert!(reasons.contains(&ReasonCode::HazardChanged));
    assert!(reasons.contains(&ReasonCode::SubstitutionReminder));

    // resynced records are not due again
    let lookups = world.registry.lookups();
    let again = orchestrator.run_registry_sync(&tenants);
    assert_eq!(again.run_for(&acme).unwrap().counts.found, 0);
    assert_eq!(world.registry.lookups(), lookups);
    assert_eq!(list_notifications(&world.conn, &acme).unwrap().len(), reasons.len());
}

#[test]
fn supplier_outage_in_one_tenant_does_not_stop_the_next() {
    let mut world = World::new();
    let acme = world.tenant("acme");
    let globex = world.tenant("globex");
    world.record(&acme, "Acrylonitrile", "107-13-1", "Sigma-Aldrich", "110213");
    world.record(&acme, "Acetone", "67-64-1", "Sigma-Aldrich", "179124");
    let toluene = world.record(&globex, "Toluene", "108-88-3", "VWR", "BDH1151");
    set_supplier_integration(&world.conn, &acme, "sigma-aldrich", &creds("acme")).unwrap();
    set_supplier_integration(&world.conn, &globex, "vwr", &creds("globex")).unwrap();

    let sigma = Arc::new(FakeSupplierCatalog::new("sigma-aldrich"));
    sigma.set_down(true);
    let vwr = Arc::new(FakeSupplierCatalog::new("vwr").with_sds(
        "BDH1151",
        sds("BDH1151", "3.0", (2026, 6, 15)),
        VWR_SDS.to_vec(),
    ));
    world.suppliers = SupplierRegistry::new().with(sigma.clone()).with(vwr.clone());

    let services = world.services();
    let config = config();
    let tenants = load_active_tenant_contexts(&world.conn).unwrap();
    let report = Orchestrator::new(&world.conn, &services, &config)
        .at(now())
        .run_supplier_polling(&tenants);

    assert!(!report.aborted);
    let acme_run = report.run_for(&acme).unwrap();
    assert_eq!(acme_run.status, RunStatus::Partial);
    assert_eq!(acme_run.counts.failed, 1);
    assert_eq!(acme_run.counts.deferred, 1);
    assert_eq!(acme_run.counts.applied, 0);

    let globex_run = report.run_for(&globex).unwrap();
    assert_eq!(globex_run.status, RunStatus::Completed);
    assert_eq!(globex_run.counts.found, 1);
    assert_eq!(globex_run.counts.applied, 1);
    let stored = get_chemical(&world.conn, &globex, &toluene.id).unwrap().unwrap();
    assert_eq!(stored.sds_version.as_deref(), Some("3.0"));
}

#[test]
fn artifacts_stay_inside_their_tenant() {
    let mut world = World::new();
    let acme = world.tenant("acme");
    let globex = world.tenant("globex");
    // same product in both tenants
    let a = world.record(&acme, "Acrylonitrile", "107-13-1", "Sigma-Aldrich", "110213");
    let g = world.record(&globex, "Acrylonitrile", "107-13-1", "Sigma-Aldrich", "110213");
    world.user(&acme, "hms@acme.test", UserRole::Hms, true);
    world.user(&globex, "hms@globex.test", UserRole::Hms, true);
    set_supplier_integration(&world.conn, &acme, "sigma-aldrich", &creds("acme")).unwrap();
    set_supplier_integration(&world.conn, &globex, "sigma-aldrich", &creds("globex")).unwrap();
    world.suppliers = SupplierRegistry::new().with(Arc::new(
        FakeSupplierCatalog::new("sigma-aldrich").with_sds(
            "110213",
            sds("110213", "7.0", (2026, 8, 1)),
            SIGMA_SDS.to_vec(),
        ),
    ));

    let services = world.services();
    let config = config();
    let tenants = load_active_tenant_contexts(&world.conn).unwrap();
    let report = Orchestrator::new(&world.conn, &services, &config)
        .at(now())
        .run_supplier_polling(&tenants);
    assert_eq!(report.runs.len(), 2);

    let keys = world.store.keys();
    assert_eq!(keys.len(), 2);
    for key in &keys {
        assert_eq!(key.tenant_segment(), Some(key.tenant().as_str()));
    }

    for (tenant, record) in [(&acme, &a), (&globex, &g)] {
        let stored = get_chemical(&world.conn, tenant, &record.id).unwrap().unwrap();
        let prefix = format!("sds/{tenant}/");
        assert!(stored.sds_storage_key.unwrap().starts_with(&prefix));

        let notes = list_notifications(&world.conn, tenant).unwrap();
        assert!(!notes.is_empty());
        assert!(notes.iter().all(|n| &n.tenant_id == tenant));
        assert!(notes.iter().all(|n| n.record_id == Some(record.id)));
    }
    // cross-tenant lookups see nothing
    assert!(get_chemical(&world.conn, &acme, &g.id).unwrap().is_none());
    assert!(world.alerts.alerts().is_empty());
}
