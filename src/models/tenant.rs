use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{TenantStatus, UserRole};
use crate::tenancy::TenantId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUser {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: UserRole,
    pub notifications_opt_in: bool,
}

impl TenantUser {
    /// ADMIN and HMS users who opted in receive pipeline notifications.
    pub fn receives_sds_alerts(&self) -> bool {
        self.notifications_opt_in && matches!(self.role, UserRole::Admin | UserRole::Hms)
    }
}

/// Mailbox access for the email watcher.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxCredentials {
    pub address: String,
    pub access_token: String,
}

impl fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("address", &self.address)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SupplierCredentials {
    pub account: String,
    pub api_key: String,
}

impl fmt::Debug for SupplierCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplierCredentials")
            .field("account", &self.account)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything a job needs to know about one tenant, resolved once by the
/// job runner and passed down explicitly.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub mailbox: Option<MailboxCredentials>,
    /// Keyed by supplier provider id (see `SupplierCatalog::provider_id`).
    pub supplier_credentials: HashMap<String, SupplierCredentials>,
}

impl TenantContext {
    pub fn new(tenant: Tenant) -> Self {
        Self {
            tenant,
            mailbox: None,
            supplier_credentials: HashMap::new(),
        }
    }

    pub fn id(&self) -> &TenantId {
        &self.tenant.id
    }

    pub fn is_active(&self) -> bool {
        self.tenant.status == TenantStatus::Active
    }
}
