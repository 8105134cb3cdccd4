//! reqwest (blocking) implementations of the external services.

use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

use super::{
    ClientError, DigestMailer, ExtractionService, HazardRegistry, MailAttachment, MailMessage,
    MailboxClient, RegistryEntry,
};
use crate::models::{ExtractedFields, MailboxCredentials, RunDigest, StructuredExtraction};

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ClientError::Setup(e.to_string()))
}

pub(crate) fn transport_error(service: &'static str, e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Network {
            service,
            detail: "request timed out".into(),
        }
    } else if e.is_decode() {
        ClientError::Decode {
            service,
            detail: e.to_string(),
        }
    } else {
        ClientError::Network {
            service,
            detail: e.to_string(),
        }
    }
}

/// Turn a non-success status into `ClientError::Status`.
pub(crate) fn ensure_success(service: &'static str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, ClientError> {
    response.json().map_err(|e| ClientError::Decode {
        service,
        detail: e.to_string(),
    })
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ═══════════════════════════════════════════════════════════
// Extraction service
// ═══════════════════════════════════════════════════════════

pub struct HttpExtractionClient {
    base_url: String,
    client: Client,
}

impl HttpExtractionClient {
    const SERVICE: &'static str = "extraction";

    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: trim_base(base_url),
            client: build_client(timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    fields: ExtractedFields,
    confidence: f64,
}

impl ExtractionService for HttpExtractionClient {
    fn extract(&self, document: &[u8]) -> Result<StructuredExtraction, ClientError> {
        let response = self
            .client
            .post(format!("{}/v1/extract", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(document.to_vec())
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;

        // 400/422: the service could not read the document at all.
        let status = response.status().as_u16();
        if status == 400 || status == 422 {
            return Err(ClientError::Rejected {
                service: Self::SERVICE,
                detail: response.text().unwrap_or_default(),
            });
        }

        let parsed: ExtractResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(StructuredExtraction::new(parsed.fields, parsed.confidence))
    }
}

// ═══════════════════════════════════════════════════════════
// Hazard registry
// ═══════════════════════════════════════════════════════════

pub struct HttpHazardRegistryClient {
    base_url: String,
    client: Client,
}

impl HttpHazardRegistryClient {
    const SERVICE: &'static str = "hazard registry";

    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: trim_base(base_url),
            client: build_client(timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
struct SubstanceResponse {
    ec_number: Option<String>,
    #[serde(default)]
    svhc: bool,
    reach_status: Option<String>,
    #[serde(default)]
    hazard_statements: Vec<String>,
}

#[derive(Deserialize)]
struct AlternativesResponse {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    name: String,
}

impl HazardRegistry for HttpHazardRegistryClient {
    fn lookup(&self, cas_number: &str) -> Result<Option<RegistryEntry>, ClientError> {
        let response = self
            .client
            .get(format!("{}/substances/{}", self.base_url, cas_number))
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let parsed: SubstanceResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(Some(RegistryEntry {
            ec_number: parsed.ec_number,
            is_svhc: parsed.svhc,
            reach_status: parsed.reach_status,
            hazard_codes: parsed.hazard_statements,
        }))
    }

    fn alternatives(&self, cas_number: &str) -> Result<Vec<String>, ClientError> {
        let response = self
            .client
            .get(format!("{}/substances/{}/alternatives", self.base_url, cas_number))
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let parsed: AlternativesResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(parsed.alternatives.into_iter().map(|a| a.name).collect())
    }
}

// ═══════════════════════════════════════════════════════════
// Mailbox gateway
// ═══════════════════════════════════════════════════════════

pub struct HttpMailboxClient {
    base_url: String,
    client: Client,
}

impl HttpMailboxClient {
    const SERVICE: &'static str = "mailbox";

    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: trim_base(base_url),
            client: build_client(timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
struct MessageDto {
    id: String,
    #[serde(default)]
    subject: String,
    received_at: DateTime<Utc>,
    #[serde(default)]
    attachments: Vec<AttachmentDto>,
}

#[derive(Deserialize)]
struct AttachmentDto {
    filename: String,
    #[serde(default)]
    content_type: String,
    content_base64: String,
}

impl MailboxClient for HttpMailboxClient {
    fn list_recent(
        &self,
        creds: &MailboxCredentials,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailMessage>, ClientError> {
        let response = self
            .client
            .get(format!("{}/mailboxes/{}/messages", self.base_url, creds.address))
            .bearer_auth(&creds.access_token)
            .query(&[("since", since.to_rfc3339()), ("has_attachments", "true".into())])
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;

        let messages: Vec<MessageDto> = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;

        let engine = base64::engine::general_purpose::STANDARD;
        let mut out = Vec::with_capacity(messages.len());
        for msg in messages {
            let mut attachments = Vec::with_capacity(msg.attachments.len());
            for att in msg.attachments {
                let bytes = engine.decode(att.content_base64.as_bytes()).map_err(|e| {
                    ClientError::Decode {
                        service: Self::SERVICE,
                        detail: format!("attachment {}: {e}", att.filename),
                    }
                })?;
                attachments.push(MailAttachment {
                    filename: att.filename,
                    content_type: att.content_type,
                    bytes,
                });
            }
            out.push(MailMessage {
                id: msg.id,
                subject: msg.subject,
                received_at: msg.received_at,
                attachments,
            });
        }
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════
// Digest mailer
// ═══════════════════════════════════════════════════════════

pub struct HttpDigestMailer {
    base_url: String,
    client: Client,
}

impl HttpDigestMailer {
    const SERVICE: &'static str = "mailer";

    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: trim_base(base_url),
            client: build_client(timeout_secs)?,
        })
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a [String],
    subject: String,
    text: String,
}

/// Plain-text body of a run digest.
pub fn render_digest(digest: &RunDigest) -> String {
    let c = &digest.counts;
    let mut text = format!(
        "Tenant {} / {}\nfound {}, applied {}, queued {}, discarded {}, failed {}, deferred {}\n",
        digest.tenant_id, digest.job, c.found, c.applied, c.queued, c.discarded, c.failed, c.deferred
    );
    for line in &digest.lines {
        text.push_str(&format!("- [{}] {}\n", line.reason, line.summary));
    }
    text
}

impl DigestMailer for HttpDigestMailer {
    fn send_digest(&self, recipients: &[String], digest: &RunDigest) -> Result<(), ClientError> {
        let body = SendRequest {
            to: recipients,
            subject: digest.subject(),
            text: render_digest(digest),
        };
        let response = self
            .client
            .post(format!("{}/send", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;
        ensure_success(Self::SERVICE, response)?;
        Ok(())
    }
}
