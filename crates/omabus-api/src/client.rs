// Omada OpenAPI HTTP client
//
// Wraps `reqwest::Client` with Omada-specific URL construction and
// envelope unwrapping. Token grants live in `auth.rs`. Every
// authenticated call takes the access token explicitly so that token
// ownership stays with the caller's session.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{Envelope, Page, SiteSummary};
use crate::transport::TransportConfig;

/// Raw HTTP client for the Omada controller's OpenAPI.
///
/// Handles the `{ errorCode, msg, result }` envelope and the
/// `/openapi/v1/{omadacId}/...` path layout. All methods return the
/// unwrapped `result` -- a non-zero `errorCode` becomes [`Error::Api`].
#[derive(Debug, Clone)]
pub struct OmadaClient {
    http: reqwest::Client,
    base_url: Url,
    omadac_id: String,
}

impl OmadaClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the controller root (e.g. `https://10.0.0.2:8043`);
    /// `omadac_id` is the controller instance id shown on the OpenAPI
    /// settings page.
    pub fn new(base_url: Url, omadac_id: String, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            omadac_id,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, omadac_id: String) -> Self {
        Self {
            http,
            base_url,
            omadac_id,
        }
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The controller instance id.
    pub fn omadac_id(&self) -> &str {
        &self.omadac_id
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/openapi/{path}` -- used for the authorization endpoints.
    pub(crate) fn openapi_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/openapi/{path}"))?)
    }

    /// `{base}/openapi/v1/{omadacId}/{path}` -- every resource endpoint.
    pub fn api_url(&self, path: &str) -> Result<Url, Error> {
        let path = path.trim_start_matches('/');
        self.openapi_url(&format!("v1/{}/{path}", self.omadac_id))
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a request and return the envelope's `result`.
    ///
    /// `path` is relative to `/openapi/v1/{omadacId}/`. Fails with
    /// [`Error::MissingResult`] when the controller reports success
    /// without a payload.
    pub async fn fetch<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        token: &SecretString,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let url = self.api_url(path)?;
        let envelope: Envelope<T> = self.send(method, url, query, body, Some(token)).await?;
        envelope.result.ok_or_else(|| Error::MissingResult {
            path: path.to_owned(),
        })
    }

    /// Send a request whose `result` is irrelevant; only `errorCode` is checked.
    pub async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        token: &SecretString,
    ) -> Result<(), Error>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.api_url(path)?;
        let _: Envelope<serde_json::Value> =
            self.send(method, url, query, body, Some(token)).await?;
        Ok(())
    }

    pub(crate) async fn send<T, B>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&B>,
        token: Option<&SecretString>,
    ) -> Result<Envelope<T>, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        debug!("{method} {}", url.path());

        let mut builder = self.http.request(method, url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.header(
                reqwest::header::AUTHORIZATION,
                format!("AccessToken={}", token.expose_secret()),
            );
        }

        let resp = builder.send().await?;
        Self::parse_envelope(resp).await
    }

    /// Parse the `{ errorCode, msg, result }` envelope.
    ///
    /// The controller reports most failures with HTTP 200 and a
    /// non-zero `errorCode`, so the code is checked before `result` is
    /// decoded -- error responses often carry a differently shaped payload.
    async fn parse_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<Envelope<T>, Error> {
        let status = resp.status();
        let body = resp.text().await?;
        trace!(status = status.as_u16(), len = body.len(), "response received");

        let raw: Envelope<serde_json::Value> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(Error::Http {
                    status: status.as_u16(),
                    body: body.chars().take(200).collect(),
                });
            }
            Err(e) => return Err(deserialization_error(&e, body)),
        };

        if raw.error_code != 0 {
            return Err(Error::Api {
                code: raw.error_code,
                message: raw
                    .msg
                    .unwrap_or_else(|| format!("errorCode={}", raw.error_code)),
            });
        }

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let result = match raw.result {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => {
                Some(serde_json::from_value(value).map_err(|e| deserialization_error(&e, body))?)
            }
        };

        Ok(Envelope {
            error_code: raw.error_code,
            msg: raw.msg,
            result,
        })
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// Collect all pages of a `pageSize`/`page` list endpoint.
    pub async fn paginate_all<T: DeserializeOwned>(
        &self,
        path: &str,
        page_size: u32,
        token: &SecretString,
    ) -> Result<Vec<T>, Error> {
        let mut all = Vec::new();
        let mut page: u32 = 1;

        loop {
            let query = [
                ("pageSize", page_size.to_string()),
                ("page", page.to_string()),
            ];
            let current: Page<T> = self
                .fetch::<_, ()>(Method::GET, path, &query, None, token)
                .await?;
            let received = current.data.len();
            all.extend(current.data);

            let collected = u64::try_from(all.len()).unwrap_or(u64::MAX);
            if received == 0
                || received < usize::try_from(page_size).unwrap_or(usize::MAX)
                || collected >= current.total_rows
            {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    // ━━ Typed endpoints ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// `GET /sites?pageSize&page`, all pages.
    pub async fn list_sites(&self, token: &SecretString) -> Result<Vec<SiteSummary>, Error> {
        debug!("listing sites");
        self.paginate_all(paths::SITES, 100, token).await
    }
}

/// Resource paths relative to `/openapi/v1/{omadacId}/`.
pub mod paths {
    pub const SITES: &str = "sites";

    pub fn devices(site_id: &str) -> String {
        format!("sites/{site_id}/devices")
    }

    pub fn switch(site_id: &str, mac: &str) -> String {
        format!("sites/{site_id}/switches/{mac}")
    }

    pub fn port_profile_override(site_id: &str, mac: &str, port: u32) -> String {
        format!("sites/{site_id}/switches/{mac}/ports/{port}/profile-override")
    }

    pub fn port_poe_mode(site_id: &str, mac: &str, port: u32) -> String {
        format!("sites/{site_id}/switches/{mac}/ports/{port}/poe-mode")
    }
}

fn deserialization_error(err: &serde_json::Error, body: String) -> Error {
    let preview: String = body.chars().take(200).collect();
    Error::Deserialization {
        message: format!("{err} (body preview: {preview:?})"),
        body,
    }
}
