//! Supplier catalog providers and the name → provider registry.
//!
//! Providers answer with different response shapes and date formats; each
//! maps its own payload onto `SdsInfo` / `ProductHit` so orchestration code
//! never sees a provider-specific type.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::http::{build_client, decode_json, ensure_success, transport_error};
use super::{ClientError, ProductHit, SdsInfo, SupplierCatalog};
use crate::models::{normalize_supplier, SupplierCredentials};

// ═══════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════

/// Resolves a record's free-text supplier name to its catalog provider.
#[derive(Default, Clone)]
pub struct SupplierRegistry {
    by_name: HashMap<String, Arc<dyn SupplierCatalog>>,
}

impl SupplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its id and every alias.
    pub fn register(&mut self, provider: Arc<dyn SupplierCatalog>) {
        let names: Vec<String> = std::iter::once(provider.provider_id().to_string())
            .chain(provider.aliases().iter().map(|a| a.to_string()))
            .collect();
        for name in names {
            self.by_name.insert(normalize_supplier(&name), Arc::clone(&provider));
        }
    }

    pub fn with(mut self, provider: Arc<dyn SupplierCatalog>) -> Self {
        self.register(provider);
        self
    }

    pub fn resolve(&self, supplier_name: &str) -> Option<Arc<dyn SupplierCatalog>> {
        self.by_name.get(&normalize_supplier(supplier_name)).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl std::fmt::Debug for SupplierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("SupplierRegistry").field("names", &names).finish()
    }
}

fn fetch_bytes(
    service: &'static str,
    request: reqwest::blocking::RequestBuilder,
) -> Result<Vec<u8>, ClientError> {
    let response = request.send().map_err(|e| transport_error(service, e))?;
    let response = ensure_success(service, response)?;
    let bytes = response.bytes().map_err(|e| transport_error(service, e))?;
    Ok(bytes.to_vec())
}

// ═══════════════════════════════════════════════════════════
// Sigma-Aldrich
// ═══════════════════════════════════════════════════════════

pub struct SigmaAldrichCatalog {
    base_url: String,
    client: Client,
}

impl SigmaAldrichCatalog {
    const SERVICE: &'static str = "sigma-aldrich";

    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SigmaSearchResponse {
    #[serde(default)]
    products: Vec<SigmaProduct>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SigmaProduct {
    product_number: String,
    name: String,
    cas_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SigmaSdsResponse {
    product_number: String,
    sds_version: Option<String>,
    /// ISO date, `2024-03-01`.
    revision_date: Option<String>,
    sds_url: Option<String>,
}

impl SigmaSdsResponse {
    fn into_info(self) -> SdsInfo {
        SdsInfo {
            catalog_number: self.product_number,
            version: self.sds_version,
            revision_date: self
                .revision_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            download_url: self.sds_url,
        }
    }
}

impl SupplierCatalog for SigmaAldrichCatalog {
    fn provider_id(&self) -> &str {
        "sigma-aldrich"
    }

    fn aliases(&self) -> &[&'static str] {
        &["sigma", "aldrich", "merck", "milliporesigma"]
    }

    fn search_product(
        &self,
        creds: &SupplierCredentials,
        query: &str,
    ) -> Result<Vec<ProductHit>, ClientError> {
        let response = self
            .client
            .get(format!("{}/products", self.base_url))
            .header("x-api-key", &creds.api_key)
            .query(&[("q", query)])
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;
        let parsed: SigmaSearchResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(parsed
            .products
            .into_iter()
            .map(|p| ProductHit {
                catalog_number: p.product_number,
                product_name: p.name,
                cas_number: p.cas_number,
            })
            .collect())
    }

    fn get_sds_info(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
    ) -> Result<Option<SdsInfo>, ClientError> {
        let response = self
            .client
            .get(format!("{}/products/{}/sds", self.base_url, catalog_number))
            .header("x-api-key", &creds.api_key)
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed: SigmaSdsResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(Some(parsed.into_info()))
    }

    fn download_sds(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
        download_url: Option<&str>,
    ) -> Result<Vec<u8>, ClientError> {
        let url = match download_url {
            Some(url) => url.to_string(),
            None => match self.get_sds_info(creds, catalog_number)? {
                Some(SdsInfo {
                    download_url: Some(url),
                    ..
                }) => url,
                _ => format!("{}/products/{}/sds/pdf", self.base_url, catalog_number),
            },
        };
        let request = self.client.get(url).header("x-api-key", &creds.api_key);
        fetch_bytes(Self::SERVICE, request)
    }
}

// ═══════════════════════════════════════════════════════════
// VWR / Avantor
// ═══════════════════════════════════════════════════════════

pub struct VwrCatalog {
    base_url: String,
    client: Client,
}

impl VwrCatalog {
    const SERVICE: &'static str = "vwr";

    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
struct VwrSearchResponse {
    #[serde(default)]
    items: Vec<VwrItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VwrItem {
    item_no: String,
    description: String,
    cas: Option<String>,
}

#[derive(Deserialize)]
struct VwrDocumentsResponse {
    #[serde(default)]
    documents: Vec<VwrDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VwrDocument {
    doc_type: String,
    revision: Option<String>,
    /// European date, `01.03.2024`.
    issued: Option<String>,
    href: Option<String>,
}

/// Newest SDS among a VWR document listing.
fn newest_vwr_sds(catalog_number: &str, documents: Vec<VwrDocument>) -> Option<SdsInfo> {
    documents
        .into_iter()
        .filter(|d| d.doc_type.eq_ignore_ascii_case("sds"))
        .map(|d| SdsInfo {
            catalog_number: catalog_number.to_string(),
            version: d.revision,
            revision_date: d
                .issued
                .as_deref()
                .and_then(|s| NaiveDate::parse_from_str(s, "%d.%m.%Y").ok()),
            download_url: d.href,
        })
        .max_by_key(|info| info.revision_date)
}

impl VwrCatalog {
    fn authed(
        &self,
        request: reqwest::blocking::RequestBuilder,
        creds: &SupplierCredentials,
    ) -> reqwest::blocking::RequestBuilder {
        request
            .bearer_auth(&creds.api_key)
            .header("x-vwr-account", &creds.account)
    }
}

impl SupplierCatalog for VwrCatalog {
    fn provider_id(&self) -> &str {
        "vwr"
    }

    fn aliases(&self) -> &[&'static str] {
        &["avantor", "vwr international"]
    }

    fn search_product(
        &self,
        creds: &SupplierCredentials,
        query: &str,
    ) -> Result<Vec<ProductHit>, ClientError> {
        let request = self
            .client
            .get(format!("{}/catalog/search", self.base_url))
            .query(&[("term", query)]);
        let response = self
            .authed(request, creds)
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;
        let parsed: VwrSearchResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(parsed
            .items
            .into_iter()
            .map(|i| ProductHit {
                catalog_number: i.item_no,
                product_name: i.description,
                cas_number: i.cas,
            })
            .collect())
    }

    fn get_sds_info(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
    ) -> Result<Option<SdsInfo>, ClientError> {
        let request = self
            .client
            .get(format!("{}/catalog/items/{}/documents", self.base_url, catalog_number))
            .query(&[("type", "SDS")]);
        let response = self
            .authed(request, creds)
            .send()
            .map_err(|e| transport_error(Self::SERVICE, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed: VwrDocumentsResponse = decode_json(Self::SERVICE, ensure_success(Self::SERVICE, response)?)?;
        Ok(newest_vwr_sds(catalog_number, parsed.documents))
    }

    fn download_sds(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
        download_url: Option<&str>,
    ) -> Result<Vec<u8>, ClientError> {
        let known = download_url.map(str::to_string);
        let url = match known {
            Some(url) => Some(url),
            None => self
                .get_sds_info(creds, catalog_number)?
                .and_then(|info| info.download_url),
        };
        let Some(url) = url else {
            return Err(ClientError::Status {
                service: Self::SERVICE,
                status: 404,
                body: format!("no SDS document for {catalog_number}"),
            });
        };
        let request = self.authed(self.client.get(url), creds);
        fetch_bytes(Self::SERVICE, request)
    }
}
