//! Cached safer-alternative lookups for CMR/SVHC records.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::clients::HazardRegistry;
use crate::db::repository::{get_substitution_suggestions, put_substitution_suggestions};
use crate::models::ChemicalRecord;
use crate::pipeline::error::SyncError;
use crate::pipeline::pacing::{with_retry, Pacer};

/// Alternatives for `record`, served from cache until `cooldown` elapses.
///
/// Records without a CAS number have no alternatives.
pub fn alternatives_for(
    conn: &Connection,
    registry: &dyn HazardRegistry,
    pacer: &mut Pacer,
    record: &ChemicalRecord,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<String>, SyncError> {
    if let Some((cached, generated_at)) =
        get_substitution_suggestions(conn, &record.tenant_id, &record.id)?
    {
        if now < generated_at + cooldown {
            return Ok(cached);
        }
    }

    let Some(cas) = record.cas_number.as_deref() else {
        return Ok(Vec::new());
    };
    pacer.wait();
    let alternatives = with_retry(pacer, || registry.alternatives(cas))?;
    put_substitution_suggestions(conn, &record.tenant_id, &record.id, &alternatives, now)?;
    tracing::debug!(
        tenant_id = %record.tenant_id,
        record_id = %record.id,
        count = alternatives.len(),
        "Refreshed substitution suggestions"
    );
    Ok(alternatives)
}
