use crate::source::{CreatedOutcome, ManifestOutcome, TagMetadataSource};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// Manifest media types accepted when fetching by tag
const MANIFEST_ACCEPT: &str =
    "application/vnd.oci.image.manifest.v1+json,application/vnd.docker.distribution.manifest.v2+json";

/// Header carrying the manifest's content digest
const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Result of a manifest delete call that reached the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// 202 Accepted; the tag reference is gone
    Accepted,
    /// Any other status, carried for the caller's error log
    Rejected(StatusCode),
}

/// Client for Docker Registry HTTP v2 endpoints
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl RegistryClient {
    /// Create a new registry client for a base URL like
    /// `https://registry.example.com`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("regprune/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    /// Set HTTP basic auth credentials
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    /// List every repository in the registry catalog.
    ///
    /// Failure here is fatal to the run; the error propagates.
    pub async fn list_catalog(&self) -> Result<Vec<String>> {
        let url = format!("{}/v2/_catalog", self.base_url);
        debug!("Fetching catalog from: {url}");

        let response = self
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to connect to registry at {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Registry returned {status} for {url}: {body}"));
        }

        let catalog: CatalogResponse = response
            .json()
            .await
            .context("Failed to parse catalog response")?;

        trace!("Catalog lists {} repositories", catalog.repositories.len());
        Ok(catalog.repositories)
    }

    /// List all tags for a repository (handles Link-header pagination).
    ///
    /// A registry may report `"tags": null` for an emptied repository; that
    /// is an empty list, not an error.
    pub async fn list_tags(&self, image: &str) -> Result<Vec<String>> {
        let mut all_tags = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list?n=1000", self.base_url, image);

        loop {
            debug!("Listing tags from: {url}");

            let response = self
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Failed to connect to registry at {url}"))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Registry returned {status} for {url}: {body}"));
            }

            let next_url = response
                .headers()
                .get("link")
                .and_then(|h| h.to_str().ok())
                .and_then(|link| parse_link_header(link, &self.base_url));

            let tags: TagsResponse = response
                .json()
                .await
                .context("Failed to parse tags response")?;

            all_tags.extend(tags.tags.unwrap_or_default());

            match next_url {
                Some(next) => url = next,
                None => break,
            }
        }

        trace!("Found {} tags for {image}", all_tags.len());
        Ok(all_tags)
    }

    /// Delete a manifest by digest. Only a 202 Accepted response removes
    /// the tag reference; anything else is surfaced for the caller to log.
    pub async fn delete_manifest(&self, image: &str, digest: &str) -> Result<DeleteOutcome> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, image, digest);
        debug!("Deleting manifest: {url}");

        let builder = self.client.delete(&url);
        let builder = match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to delete manifest at {url}"))?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(DeleteOutcome::Accepted),
            status => Ok(DeleteOutcome::Rejected(status)),
        }
    }
}

#[async_trait]
impl TagMetadataSource for RegistryClient {
    async fn fetch_manifest(&self, image: &str, tag: &str) -> ManifestOutcome {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, image, tag);
        debug!("Fetching manifest from: {url}");

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_ACCEPT));

        let response = match self.get(&url).headers(headers).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Cannot fetch manifest for {image}:{tag}: {e}");
                return ManifestOutcome::Transient;
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Tag {image}:{tag} listed but missing manifest");
            return ManifestOutcome::NotFound;
        }
        if !response.status().is_success() {
            warn!(
                "Cannot fetch manifest for {image}:{tag}: status {}",
                response.status()
            );
            return ManifestOutcome::Transient;
        }

        let digest = match response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|h| h.to_str().ok())
        {
            Some(digest) => digest.to_string(),
            None => {
                warn!("No digest header for {image}:{tag}");
                return ManifestOutcome::Transient;
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Cannot read manifest body for {image}:{tag}: {e}");
                return ManifestOutcome::Transient;
            }
        };

        let manifest: ManifestResponse = match serde_json::from_str(&body) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Manifest for {image}:{tag} is invalid JSON: {e}");
                return ManifestOutcome::Unresolvable;
            }
        };

        match manifest.config.and_then(|c| c.digest) {
            Some(config_digest) => ManifestOutcome::Found {
                digest,
                config_digest,
            },
            None => {
                warn!("No config digest for {image}:{tag}");
                ManifestOutcome::Unresolvable
            }
        }
    }

    async fn fetch_config_created(&self, image: &str, config_digest: &str) -> CreatedOutcome {
        let url = format!("{}/v2/{}/blobs/{}", self.base_url, image, config_digest);
        debug!("Fetching config blob from: {url}");

        let response = match self.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(
                    "Cannot fetch config for {image}@{config_digest}: status {}",
                    response.status()
                );
                return CreatedOutcome::Transient;
            }
            Err(e) => {
                warn!("Cannot fetch config for {image}@{config_digest}: {e}");
                return CreatedOutcome::Transient;
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Cannot read config body for {image}@{config_digest}: {e}");
                return CreatedOutcome::Transient;
            }
        };

        let config: ConfigResponse = match serde_json::from_str(&body) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config for {image}@{config_digest} is invalid JSON: {e}");
                return CreatedOutcome::Unresolvable;
            }
        };

        let Some(created_str) = config.created else {
            warn!("No creation date for {image}@{config_digest}");
            return CreatedOutcome::Unresolvable;
        };

        match parse_created(&created_str) {
            Some(created) => CreatedOutcome::Created(created),
            None => {
                warn!("Unparseable creation date {created_str:?} for {image}@{config_digest}");
                CreatedOutcome::Unresolvable
            }
        }
    }
}

/// Parse an image config `created` timestamp. Accepts RFC 3339 (including
/// `Z` and fractional seconds); a timestamp without zone information is
/// assumed to be UTC.
pub fn parse_created(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse a Link header for pagination.
/// Format: `</v2/repo/tags/list?n=100&last=tag>; rel="next"`
fn parse_link_header(link: &str, base_url: &str) -> Option<String> {
    for part in link.split(',') {
        let part = part.trim();
        if part.contains("rel=\"next\"") {
            if let (Some(start), Some(end)) = (part.find('<'), part.find('>')) {
                let url = &part[start + 1..end];
                if url.starts_with('/') {
                    return Some(format!("{base_url}{url}"));
                }
                return Some(url.to_string());
            }
        }
    }
    None
}

// Internal types for registry API responses

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ManifestResponse {
    #[serde(default)]
    config: Option<ManifestConfig>,
}

#[derive(Debug, Deserialize)]
struct ManifestConfig {
    #[serde(default)]
    digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    #[serde(default)]
    created: Option<String>,
}
