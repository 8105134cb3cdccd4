use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use base64::Engine;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::clients::{MailAttachment, MailMessage};
use crate::db::repository::{attachment_ingested, mark_attachment_ingested};
use crate::pipeline::error::SyncError;
use crate::pipeline::pacing::with_retry;
use crate::pipeline::run::TenantRun;
use crate::pipeline::types::{CandidateDocument, CandidateOrigin};

/// SDS naming in English, Norwegian, German and French.
static SDS_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|[^a-z])(m?sds|safety[\s_-]*data[\s_-]*sheets?|sikkerhetsdatablad|sicherheitsdatenblatt|fds)([^a-z]|$)",
    )
    .unwrap()
});

fn is_pdf(attachment: &MailAttachment) -> bool {
    attachment.content_type.eq_ignore_ascii_case("application/pdf")
        || attachment.filename.to_lowercase().ends_with(".pdf")
}

/// A PDF whose file name or message subject names it as a safety data sheet.
pub fn is_sds_attachment(subject: &str, attachment: &MailAttachment) -> bool {
    is_pdf(attachment)
        && (SDS_KEYWORDS.is_match(&attachment.filename) || SDS_KEYWORDS.is_match(subject))
}

pub fn attachment_hash(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

/// SDS attachments not yet ingested, oldest message first.
fn discover(
    tr: &TenantRun<'_>,
    mut messages: Vec<MailMessage>,
) -> Result<Vec<CandidateDocument>, SyncError> {
    messages.sort_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for message in messages {
        for attachment in message.attachments {
            if !is_sds_attachment(&message.subject, &attachment) {
                continue;
            }
            let hash = attachment_hash(&attachment.bytes);
            if !seen.insert((message.id.clone(), hash.clone())) {
                continue;
            }
            if attachment_ingested(tr.conn, tr.scope.tenant(), &message.id, &hash)? {
                continue;
            }
            candidates.push(CandidateDocument::from_email(
                tr.scope.tenant().clone(),
                &message.id,
                &attachment.filename,
                &hash,
                attachment.bytes,
            ));
        }
    }
    Ok(candidates)
}

/// Email monitoring for one tenant.
///
/// Tenants without a mailbox integration are a configuration skip. An
/// attachment is marked ingested only once its candidate settles, so a
/// failed candidate is retried by the next run.
pub fn monitor_mailbox(tr: &mut TenantRun<'_>) -> Result<(), SyncError> {
    let ctx = tr.ctx;
    let Some(creds) = ctx.mailbox.as_ref() else {
        return Err(SyncError::Configuration(format!(
            "tenant {} has no mailbox integration",
            tr.scope.tenant()
        )));
    };

    let since = tr.now - tr.config.email_lookback();
    let mailbox = Arc::clone(&tr.services.mailbox);
    tr.pacer.wait();
    let messages = with_retry(&mut tr.pacer, || mailbox.list_recent(creds, since))?;

    let candidates = discover(tr, messages)?;
    tr.counts.found = candidates.len() as u32;
    tracing::info!(
        tenant_id = %tr.scope.tenant(),
        run_id = %tr.run_id,
        candidates = candidates.len(),
        "Mailbox scanned"
    );

    let total = candidates.len();
    for (index, mut candidate) in candidates.into_iter().enumerate() {
        if tr.should_stop() {
            tr.counts.deferred += (total - index) as u32;
            tracing::info!(
                tenant_id = %tr.scope.tenant(),
                deferred = total - index,
                "Run budget exhausted, deferring remaining attachments"
            );
            break;
        }
        if let Some(outcome) = tr.handle_candidate(&mut candidate)? {
            if let CandidateOrigin::Email {
                message_id,
                attachment_hash,
                ..
            } = &candidate.origin
            {
                mark_attachment_ingested(
                    tr.conn,
                    tr.scope.tenant(),
                    message_id,
                    attachment_hash,
                    outcome.label(),
                    tr.now,
                )?;
            }
        }
    }
    Ok(())
}
