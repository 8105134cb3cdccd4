use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use super::{
    field_value_to_sql, fmt_date, fmt_ts, parse_opt_date, parse_opt_ts, parse_tenant, parse_uuid,
};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;
use crate::tenancy::TenantId;

const CHEMICAL_COLUMNS: &str = "id, tenant_id, product_name, supplier, catalog_number, cas_number,
     ec_number, signal_word, hazard_statements, is_cmr, is_svhc, reach_status, hazard_level,
     substitution_priority, sds_storage_key, sds_version, sds_date, next_review_date,
     last_synced_at, hazard_synced_at";

pub fn insert_chemical(conn: &Connection, record: &ChemicalRecord) -> Result<(), DatabaseError> {
    let statements = serde_json::to_string(&record.hazard_statements)?;
    conn.execute(
        "INSERT INTO chemicals (id, tenant_id, product_name, supplier, supplier_key, catalog_number,
         cas_number, ec_number, signal_word, hazard_statements, is_cmr, is_svhc, reach_status,
         hazard_level, substitution_priority, sds_storage_key, sds_version, sds_date,
         next_review_date, last_synced_at, hazard_synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                 ?19, ?20, ?21)",
        params![
            record.id.to_string(),
            record.tenant_id.as_str(),
            record.product_name,
            record.supplier,
            record.supplier.as_deref().map(normalize_supplier),
            record.catalog_number,
            record.cas_number,
            record.ec_number,
            record.signal_word,
            statements,
            record.is_cmr as i32,
            record.is_svhc as i32,
            record.reach_status,
            record.hazard_level.as_str(),
            record.substitution_priority.as_str(),
            record.sds_storage_key,
            record.sds_version,
            record.sds_date.map(fmt_date),
            record.next_review_date.map(fmt_date),
            record.last_synced_at.map(fmt_ts),
            record.hazard_synced_at.map(fmt_ts),
        ],
    )?;
    Ok(())
}

pub fn get_chemical(
    conn: &Connection,
    tenant_id: &TenantId,
    id: &Uuid,
) -> Result<Option<ChemicalRecord>, DatabaseError> {
    let sql = format!("SELECT {CHEMICAL_COLUMNS} FROM chemicals WHERE tenant_id = ?1 AND id = ?2");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![tenant_id.as_str(), id.to_string()], read_row)?;
    match rows.next() {
        Some(row) => Ok(Some(chemical_from_row(row?)?)),
        None => Ok(None),
    }
}

/// Records in one tenant carrying the given (normalized) CAS number.
pub fn find_chemicals_by_cas(
    conn: &Connection,
    tenant_id: &TenantId,
    cas_number: &str,
) -> Result<Vec<ChemicalRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals
         WHERE tenant_id = ?1 AND cas_number = ?2
         ORDER BY id ASC"
    );
    query_chemicals(conn, &sql, params![tenant_id.as_str(), cas_number])
}

/// Records in one tenant with the given supplier and catalog number.
pub fn find_chemicals_by_catalog(
    conn: &Connection,
    tenant_id: &TenantId,
    supplier: &str,
    catalog_number: &str,
) -> Result<Vec<ChemicalRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals
         WHERE tenant_id = ?1 AND supplier_key = ?2 AND LOWER(catalog_number) = LOWER(?3)
         ORDER BY id ASC"
    );
    query_chemicals(
        conn,
        &sql,
        params![tenant_id.as_str(), normalize_supplier(supplier), catalog_number.trim()],
    )
}

/// Records with a non-blank supplier and catalog number whose SDS sync is
/// older than `stale_before`, never-synced first, then the longest waiting.
pub fn list_due_for_supplier_poll(
    conn: &Connection,
    tenant_id: &TenantId,
    stale_before: DateTime<Utc>,
) -> Result<Vec<ChemicalRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals
         WHERE tenant_id = ?1
           AND TRIM(COALESCE(supplier, '')) <> ''
           AND TRIM(COALESCE(catalog_number, '')) <> ''
           AND (last_synced_at IS NULL OR last_synced_at < ?2)
         ORDER BY last_synced_at IS NOT NULL, last_synced_at ASC, id ASC"
    );
    query_chemicals(conn, &sql, params![tenant_id.as_str(), fmt_ts(stale_before)])
}

/// Records with a CAS number whose registry sync is older than `stale_before`.
pub fn list_due_for_hazard_sync(
    conn: &Connection,
    tenant_id: &TenantId,
    stale_before: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<ChemicalRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals
         WHERE tenant_id = ?1
           AND cas_number IS NOT NULL
           AND (hazard_synced_at IS NULL OR hazard_synced_at < ?2)
         ORDER BY hazard_synced_at IS NOT NULL, hazard_synced_at ASC, id ASC
         LIMIT ?3"
    );
    query_chemicals(conn, &sql, params![tenant_id.as_str(), fmt_ts(stale_before), limit])
}

/// CMR or SVHC records of one tenant.
pub fn list_substitution_flagged(
    conn: &Connection,
    tenant_id: &TenantId,
) -> Result<Vec<ChemicalRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {CHEMICAL_COLUMNS} FROM chemicals
         WHERE tenant_id = ?1 AND (is_cmr = 1 OR is_svhc = 1)
         ORDER BY product_name ASC, id ASC"
    );
    query_chemicals(conn, &sql, params![tenant_id.as_str()])
}

/// Write only the given columns of one record in a single statement.
///
/// Columns not listed are left untouched, so concurrent edits to other
/// fields survive (field-level last-writer-wins).
pub fn update_chemical_fields(
    conn: &Connection,
    tenant_id: &TenantId,
    id: &Uuid,
    changes: &[FieldChange],
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    if changes.is_empty() {
        return Ok(());
    }

    let mut assignments = Vec::with_capacity(changes.len() + 2);
    let mut values: Vec<Value> = Vec::with_capacity(changes.len() + 4);

    for change in changes {
        values.push(field_value_to_sql(&change.after)?);
        assignments.push(format!("{} = ?{}", change.field.column(), values.len()));

        if change.field == RecordField::Supplier {
            values.push(match change.after.as_text() {
                Some(name) => Value::Text(normalize_supplier(name)),
                None => Value::Null,
            });
            assignments.push(format!("supplier_key = ?{}", values.len()));
        }
    }

    values.push(Value::Text(fmt_ts(now)));
    assignments.push(format!("updated_at = ?{}", values.len()));

    values.push(Value::Text(tenant_id.as_str().to_string()));
    let tenant_idx = values.len();
    values.push(Value::Text(id.to_string()));
    let id_idx = values.len();

    let sql = format!(
        "UPDATE chemicals SET {} WHERE tenant_id = ?{tenant_idx} AND id = ?{id_idx}",
        assignments.join(", ")
    );
    let updated = conn.execute(&sql, params_from_iter(values.iter()))?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "chemical".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct ChemicalRow {
    id: String,
    tenant_id: String,
    product_name: String,
    supplier: Option<String>,
    catalog_number: Option<String>,
    cas_number: Option<String>,
    ec_number: Option<String>,
    signal_word: Option<String>,
    hazard_statements: String,
    is_cmr: i32,
    is_svhc: i32,
    reach_status: Option<String>,
    hazard_level: String,
    substitution_priority: String,
    sds_storage_key: Option<String>,
    sds_version: Option<String>,
    sds_date: Option<String>,
    next_review_date: Option<String>,
    last_synced_at: Option<String>,
    hazard_synced_at: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<ChemicalRow> {
    Ok(ChemicalRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        product_name: row.get(2)?,
        supplier: row.get(3)?,
        catalog_number: row.get(4)?,
        cas_number: row.get(5)?,
        ec_number: row.get(6)?,
        signal_word: row.get(7)?,
        hazard_statements: row.get(8)?,
        is_cmr: row.get(9)?,
        is_svhc: row.get(10)?,
        reach_status: row.get(11)?,
        hazard_level: row.get(12)?,
        substitution_priority: row.get(13)?,
        sds_storage_key: row.get(14)?,
        sds_version: row.get(15)?,
        sds_date: row.get(16)?,
        next_review_date: row.get(17)?,
        last_synced_at: row.get(18)?,
        hazard_synced_at: row.get(19)?,
    })
}

fn chemical_from_row(row: ChemicalRow) -> Result<ChemicalRecord, DatabaseError> {
    Ok(ChemicalRecord {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_tenant(&row.tenant_id)?,
        product_name: row.product_name,
        supplier: row.supplier,
        catalog_number: row.catalog_number,
        cas_number: row.cas_number,
        ec_number: row.ec_number,
        signal_word: row.signal_word,
        hazard_statements: serde_json::from_str(&row.hazard_statements)?,
        is_cmr: row.is_cmr != 0,
        is_svhc: row.is_svhc != 0,
        reach_status: row.reach_status,
        hazard_level: HazardLevel::from_str(&row.hazard_level)?,
        substitution_priority: SubstitutionPriority::from_str(&row.substitution_priority)?,
        sds_storage_key: row.sds_storage_key,
        sds_version: row.sds_version,
        sds_date: parse_opt_date(row.sds_date)?,
        next_review_date: parse_opt_date(row.next_review_date)?,
        last_synced_at: parse_opt_ts(row.last_synced_at)?,
        hazard_synced_at: parse_opt_ts(row.hazard_synced_at)?,
    })
}

fn query_chemicals<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<ChemicalRecord>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_row)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(chemical_from_row(row?)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn chemical(tenant: &TenantId, name: &str) -> ChemicalRecord {
        let mut record = ChemicalRecord::new(tenant.clone(), name);
        record.supplier = Some("Sigma-Aldrich".into());
        record.catalog_number = Some("A1234".into());
        record.cas_number = Some("107-13-1".into());
        record
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let mut record = chemical(&tenant, "Acrylonitrile");
        record.hazard_statements = vec!["H225".into(), "H350".into()];
        record.sds_date = NaiveDate::from_ymd_opt(2022, 1, 10);
        record.last_synced_at = Some(now());
        insert_chemical(&conn, &record).unwrap();

        let loaded = get_chemical(&conn, &tenant, &record.id).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn get_is_tenant_scoped() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let globex = seed_tenant(&conn, "globex");
        let record = chemical(&acme, "Acetone");
        insert_chemical(&conn, &record).unwrap();

        assert!(get_chemical(&conn, &globex, &record.id).unwrap().is_none());
        assert!(find_chemicals_by_cas(&conn, &globex, "107-13-1").unwrap().is_empty());
    }

    #[test]
    fn catalog_lookup_normalizes_supplier() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let record = chemical(&tenant, "Acetone");
        insert_chemical(&conn, &record).unwrap();

        let found = find_chemicals_by_catalog(&conn, &tenant, "sigma aldrich", "a1234").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, record.id);
    }

    #[test]
    fn supplier_poll_skips_fresh_and_blank_records() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");

        let mut fresh = chemical(&tenant, "Fresh");
        fresh.last_synced_at = Some(now() - Duration::days(1));
        insert_chemical(&conn, &fresh).unwrap();

        let mut stale = chemical(&tenant, "Stale");
        stale.last_synced_at = Some(now() - Duration::days(30));
        insert_chemical(&conn, &stale).unwrap();

        let never = chemical(&tenant, "Never");
        insert_chemical(&conn, &never).unwrap();

        let mut no_catalog = chemical(&tenant, "NoCatalog");
        no_catalog.catalog_number = None;
        insert_chemical(&conn, &no_catalog).unwrap();

        let mut blank_supplier = chemical(&tenant, "BlankSupplier");
        blank_supplier.supplier = Some("  ".into());
        insert_chemical(&conn, &blank_supplier).unwrap();

        let due = list_due_for_supplier_poll(&conn, &tenant, now() - Duration::days(7)).unwrap();
        let names: Vec<&str> = due.iter().map(|r| r.product_name.as_str()).collect();
        assert_eq!(names, vec!["Never", "Stale"]);
    }

    #[test]
    fn hazard_sync_requires_cas() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let mut without_cas = chemical(&tenant, "Mystery");
        without_cas.cas_number = None;
        insert_chemical(&conn, &without_cas).unwrap();
        insert_chemical(&conn, &chemical(&tenant, "Acrylonitrile")).unwrap();

        let due = list_due_for_hazard_sync(&conn, &tenant, now() - Duration::days(182), 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].product_name, "Acrylonitrile");
    }

    #[test]
    fn update_writes_only_listed_columns() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let mut record = chemical(&tenant, "Acetone");
        record.signal_word = Some("Danger".into());
        insert_chemical(&conn, &record).unwrap();

        let change = FieldChange::diff(&record, RecordField::SdsVersion, FieldValue::Text("7.1".into()))
            .unwrap();
        update_chemical_fields(&conn, &tenant, &record.id, &[change], now()).unwrap();

        let loaded = get_chemical(&conn, &tenant, &record.id).unwrap().unwrap();
        assert_eq!(loaded.sds_version.as_deref(), Some("7.1"));
        assert_eq!(loaded.signal_word.as_deref(), Some("Danger"));
        assert_eq!(loaded.product_name, "Acetone");
    }

    #[test]
    fn update_supplier_refreshes_lookup_key() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let record = chemical(&tenant, "Acetone");
        insert_chemical(&conn, &record).unwrap();

        let change = FieldChange::diff(&record, RecordField::Supplier, FieldValue::Text("VWR".into()))
            .unwrap();
        update_chemical_fields(&conn, &tenant, &record.id, &[change], now()).unwrap();

        assert_eq!(find_chemicals_by_catalog(&conn, &tenant, "vwr", "A1234").unwrap().len(), 1);
        assert!(find_chemicals_by_catalog(&conn, &tenant, "Sigma-Aldrich", "A1234").unwrap().is_empty());
    }

    #[test]
    fn update_from_wrong_tenant_is_not_found() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let globex = seed_tenant(&conn, "globex");
        let record = chemical(&acme, "Acetone");
        insert_chemical(&conn, &record).unwrap();

        let change = FieldChange::diff(&record, RecordField::IsCmr, FieldValue::Flag(true)).unwrap();
        let err = update_chemical_fields(&conn, &globex, &record.id, &[change], now()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));

        let untouched = get_chemical(&conn, &acme, &record.id).unwrap().unwrap();
        assert!(!untouched.is_cmr);
    }
}
