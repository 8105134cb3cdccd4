use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{parse_tenant, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;
use crate::tenancy::TenantId;

pub fn insert_tenant(conn: &Connection, tenant: &Tenant) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO tenants (id, name, status) VALUES (?1, ?2, ?3)",
        params![tenant.id.as_str(), tenant.name, tenant.status.as_str()],
    )?;
    Ok(())
}

pub fn set_tenant_status(
    conn: &Connection,
    tenant_id: &TenantId,
    status: TenantStatus,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE tenants SET status = ?1 WHERE id = ?2",
        params![status.as_str(), tenant_id.as_str()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "tenant".into(),
            id: tenant_id.to_string(),
        });
    }
    Ok(())
}

/// Active tenants in stable id order.
pub fn list_active_tenants(conn: &Connection) -> Result<Vec<Tenant>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, status FROM tenants WHERE status = 'active' ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut tenants = Vec::new();
    for row in rows {
        let (id, name, status) = row?;
        tenants.push(Tenant {
            id: parse_tenant(&id)?,
            name,
            status: TenantStatus::from_str(&status)?,
        });
    }
    Ok(tenants)
}

pub fn insert_user(conn: &Connection, user: &TenantUser) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, tenant_id, email, role, notifications_opt_in)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.tenant_id.as_str(),
            user.email,
            user.role.as_str(),
            user.notifications_opt_in as i32,
        ],
    )?;
    Ok(())
}

/// Opted-in ADMIN/HMS users of one tenant.
pub fn list_alert_recipients(
    conn: &Connection,
    tenant_id: &TenantId,
) -> Result<Vec<TenantUser>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, email, role, notifications_opt_in
         FROM users
         WHERE tenant_id = ?1
           AND role IN ('admin', 'hms')
           AND notifications_opt_in = 1
         ORDER BY email ASC",
    )?;
    let rows = stmt.query_map(params![tenant_id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i32>(4)?,
        ))
    })?;

    let mut users = Vec::new();
    for row in rows {
        let (id, tenant, email, role, opt_in) = row?;
        users.push(TenantUser {
            id: parse_uuid(&id)?,
            tenant_id: parse_tenant(&tenant)?,
            email,
            role: UserRole::from_str(&role)?,
            notifications_opt_in: opt_in != 0,
        });
    }
    Ok(users)
}

pub fn set_mailbox_integration(
    conn: &Connection,
    tenant_id: &TenantId,
    credentials: &MailboxCredentials,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO tenant_integrations (tenant_id, kind, provider, identity, secret)
         VALUES (?1, 'mailbox', '', ?2, ?3)",
        params![tenant_id.as_str(), credentials.address, credentials.access_token],
    )?;
    Ok(())
}

pub fn set_supplier_integration(
    conn: &Connection,
    tenant_id: &TenantId,
    provider_id: &str,
    credentials: &SupplierCredentials,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO tenant_integrations (tenant_id, kind, provider, identity, secret)
         VALUES (?1, 'supplier', ?2, ?3, ?4)",
        params![tenant_id.as_str(), provider_id, credentials.account, credentials.api_key],
    )?;
    Ok(())
}

/// Resolve a tenant's credentials into a `TenantContext`.
pub fn load_tenant_context(conn: &Connection, tenant: Tenant) -> Result<TenantContext, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT kind, provider, identity, secret
         FROM tenant_integrations WHERE tenant_id = ?1",
    )?;
    let rows = stmt.query_map(params![tenant.id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut context = TenantContext::new(tenant);
    for row in rows {
        let (kind, provider, identity, secret) = row?;
        match kind.as_str() {
            "mailbox" => {
                context.mailbox = Some(MailboxCredentials {
                    address: identity,
                    access_token: secret,
                });
            }
            "supplier" => {
                context.supplier_credentials.insert(
                    provider,
                    SupplierCredentials {
                        account: identity,
                        api_key: secret,
                    },
                );
            }
            other => {
                return Err(DatabaseError::InvalidEnum {
                    field: "tenant_integrations.kind".into(),
                    value: other.into(),
                });
            }
        }
    }
    Ok(context)
}

/// Contexts for every active tenant, in tenant id order.
pub fn load_active_tenant_contexts(conn: &Connection) -> Result<Vec<TenantContext>, DatabaseError> {
    list_active_tenants(conn)?
        .into_iter()
        .map(|tenant| load_tenant_context(conn, tenant))
        .collect()
}
