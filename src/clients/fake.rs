//! In-memory collaborators for tests and dry runs.
//!
//! Every fake records its calls so tests can assert on side effects
//! (how many registry lookups, which storage keys, which digests).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::*;
use crate::models::enums::JobKind;
use crate::models::{MailboxCredentials, RunDigest, StructuredExtraction, SupplierCredentials};
use crate::tenancy::{StorageKey, TenantId};

fn network(service: &'static str) -> ClientError {
    ClientError::Network {
        service,
        detail: "simulated outage".into(),
    }
}

// ═══════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
enum Scripted {
    Ok(StructuredExtraction),
    Transient,
    Rejected,
}

/// Returns a scripted extraction per document body; unknown bodies are rejected.
#[derive(Default)]
pub struct FakeExtraction {
    scripts: HashMap<Vec<u8>, Scripted>,
    calls: AtomicUsize,
}

impl FakeExtraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, document: &[u8], extraction: StructuredExtraction) -> Self {
        self.scripts.insert(document.to_vec(), Scripted::Ok(extraction));
        self
    }

    pub fn with_outage(mut self, document: &[u8]) -> Self {
        self.scripts.insert(document.to_vec(), Scripted::Transient);
        self
    }

    pub fn with_rejection(mut self, document: &[u8]) -> Self {
        self.scripts.insert(document.to_vec(), Scripted::Rejected);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionService for FakeExtraction {
    fn extract(&self, document: &[u8]) -> Result<StructuredExtraction, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(document).cloned().unwrap_or(Scripted::Rejected) {
            Scripted::Ok(extraction) => Ok(extraction),
            Scripted::Transient => Err(network("extraction")),
            Scripted::Rejected => Err(ClientError::Rejected {
                service: "extraction",
                detail: "unreadable document".into(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Hazard registry
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct FakeRegistry {
    entries: HashMap<String, RegistryEntry>,
    alternatives: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    lookups: AtomicUsize,
    alternative_calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, cas_number: &str, entry: RegistryEntry) -> Self {
        self.entries.insert(cas_number.to_string(), entry);
        self
    }

    pub fn with_alternatives(mut self, cas_number: &str, names: &[&str]) -> Self {
        self.alternatives
            .insert(cas_number.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_outage(mut self, cas_number: &str) -> Self {
        self.failing.insert(cas_number.to_string());
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn alternative_calls(&self) -> usize {
        self.alternative_calls.load(Ordering::SeqCst)
    }
}

impl HazardRegistry for FakeRegistry {
    fn lookup(&self, cas_number: &str) -> Result<Option<RegistryEntry>, ClientError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(cas_number) {
            return Err(network("hazard registry"));
        }
        Ok(self.entries.get(cas_number).cloned())
    }

    fn alternatives(&self, cas_number: &str) -> Result<Vec<String>, ClientError> {
        self.alternative_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(cas_number) {
            return Err(network("hazard registry"));
        }
        Ok(self.alternatives.get(cas_number).cloned().unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════
// Supplier catalog
// ═══════════════════════════════════════════════════════════

pub struct FakeSupplierCatalog {
    id: String,
    aliases: Vec<&'static str>,
    sds: HashMap<String, (SdsInfo, Vec<u8>)>,
    down: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSupplierCatalog {
    pub fn new(provider_id: &str) -> Self {
        Self {
            id: provider_id.to_string(),
            aliases: Vec::new(),
            sds: HashMap::new(),
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&'static str]) -> Self {
        self.aliases = aliases.to_vec();
        self
    }

    pub fn with_sds(mut self, catalog_number: &str, info: SdsInfo, document: Vec<u8>) -> Self {
        self.sds.insert(catalog_number.to_string(), (info, document));
        self
    }

    /// Every subsequent call fails with a network error.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            Err(network("supplier catalog"))
        } else {
            Ok(())
        }
    }
}

impl SupplierCatalog for FakeSupplierCatalog {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn aliases(&self) -> &[&'static str] {
        &self.aliases
    }

    fn search_product(
        &self,
        _creds: &SupplierCredentials,
        query: &str,
    ) -> Result<Vec<ProductHit>, ClientError> {
        self.enter()?;
        let needle = query.to_lowercase();
        Ok(self
            .sds
            .keys()
            .filter(|catalog| catalog.to_lowercase().contains(&needle))
            .map(|catalog| ProductHit {
                catalog_number: catalog.clone(),
                product_name: catalog.clone(),
                cas_number: None,
            })
            .collect())
    }

    fn get_sds_info(
        &self,
        _creds: &SupplierCredentials,
        catalog_number: &str,
    ) -> Result<Option<SdsInfo>, ClientError> {
        self.enter()?;
        Ok(self.sds.get(catalog_number).map(|(info, _)| info.clone()))
    }

    fn download_sds(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
        download_url: Option<&str>,
    ) -> Result<Vec<u8>, ClientError> {
        if download_url.is_none() {
            self.get_sds_info(creds, catalog_number)?;
        }
        self.enter()?;
        self.sds
            .get(catalog_number)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(ClientError::Status {
                service: "supplier catalog",
                status: 404,
                body: String::new(),
            })
    }
}

// ═══════════════════════════════════════════════════════════
// Mailbox
// ═══════════════════════════════════════════════════════════

/// Messages keyed by mailbox address.
#[derive(Default)]
pub struct FakeMailbox {
    messages: HashMap<String, Vec<MailMessage>>,
    failing: HashSet<String>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, address: &str, message: MailMessage) -> Self {
        self.messages.entry(address.to_string()).or_default().push(message);
        self
    }

    pub fn with_outage(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }
}

impl MailboxClient for FakeMailbox {
    fn list_recent(
        &self,
        creds: &MailboxCredentials,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailMessage>, ClientError> {
        if self.failing.contains(&creds.address) {
            return Err(network("mailbox"));
        }
        Ok(self
            .messages
            .get(&creds.address)
            .map(|msgs| msgs.iter().filter(|m| m.received_at >= since).cloned().collect())
            .unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════
// Storage and outbound channels
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct FakeDocumentStore {
    stored: Mutex<Vec<StorageKey>>,
}

impl FakeDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<StorageKey> {
        self.stored.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl DocumentStore for FakeDocumentStore {
    fn put(&self, key: &StorageKey, _bytes: &[u8]) -> Result<(), ClientError> {
        if let Ok(mut stored) = self.stored.lock() {
            stored.push(key.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<(Vec<String>, RunDigest)>>,
    failing: AtomicBool,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Vec<String>, RunDigest)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl DigestMailer for FakeMailer {
    fn send_digest(&self, recipients: &[String], digest: &RunDigest) -> Result<(), ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(network("mailer"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipients.to_vec(), digest.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAlertSink {
    raised: Mutex<Vec<(TenantId, JobKind, String)>>,
}

impl FakeAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(TenantId, JobKind, String)> {
        self.raised.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl InternalAlertSink for FakeAlertSink {
    fn raise(&self, tenant_id: &TenantId, job: JobKind, message: &str) {
        if let Ok(mut raised) = self.raised.lock() {
            raised.push((tenant_id.clone(), job, message.to_string()));
        }
    }
}
