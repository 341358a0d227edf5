// OpenAPI authorization
//
// Both grants hit `POST /openapi/authorize/token`. The client-credentials
// grant takes its parameters in the JSON body; the refresh grant takes
// them in the query string with an empty JSON body.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::client::OmadaClient;
use crate::error::Error;
use crate::models::{ClientCredentialsRequest, Envelope, TokenGrant};

/// Client id/secret pair of an OpenAPI application.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// A token pair with the reported lifetime.
///
/// Only produced when the grant response actually carried an access
/// token -- a grant that succeeds without one is an authentication error.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// Lifetime reported by the controller, in seconds.
    pub expires_in: Option<u64>,
}

impl OmadaClient {
    /// Exchange client credentials for a fresh token pair.
    ///
    /// `POST /openapi/authorize/token?grant_type=client_credentials`
    pub async fn client_credentials_grant(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<IssuedTokens, Error> {
        let url = self.openapi_url("authorize/token")?;
        debug!("requesting token (client_credentials)");

        let body = ClientCredentialsRequest {
            omadac_id: self.omadac_id(),
            client_id: &credentials.client_id,
            client_secret: credentials.client_secret.expose_secret(),
        };
        let query = [("grant_type", "client_credentials".to_owned())];

        let envelope: Envelope<TokenGrant> = self
            .send(Method::POST, url, &query, Some(&body), None)
            .await
            .map_err(into_auth_error)?;
        issued_tokens(envelope)
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// `POST /openapi/authorize/token?client_id&client_secret&refresh_token&grant_type=refresh_token`
    pub async fn refresh_token_grant(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &SecretString,
    ) -> Result<IssuedTokens, Error> {
        let url = self.openapi_url("authorize/token")?;
        debug!("requesting token (refresh_token)");

        let query = [
            ("client_id", credentials.client_id.clone()),
            (
                "client_secret",
                credentials.client_secret.expose_secret().to_owned(),
            ),
            ("refresh_token", refresh_token.expose_secret().to_owned()),
            ("grant_type", "refresh_token".to_owned()),
        ];

        let envelope: Envelope<TokenGrant> = self
            .send(Method::POST, url, &query, Some(&json!({})), None)
            .await
            .map_err(into_auth_error)?;
        issued_tokens(envelope)
    }
}

/// Grant-level API errors are authentication failures; transport
/// errors stay transport errors so callers can tell them apart.
fn into_auth_error(err: Error) -> Error {
    match err {
        Error::Api { code, message } => Error::Authentication {
            message: format!("token grant rejected ({code}): {message}"),
        },
        Error::Http { status, body } => Error::Authentication {
            message: format!("token grant failed (HTTP {status}): {body}"),
        },
        other => other,
    }
}

fn issued_tokens(envelope: Envelope<TokenGrant>) -> Result<IssuedTokens, Error> {
    let grant = envelope.result.ok_or_else(|| Error::Authentication {
        message: "token response carried no result".into(),
    })?;
    let access_token = grant.access_token.ok_or_else(|| Error::Authentication {
        message: "token response carried no access token".into(),
    })?;

    Ok(IssuedTokens {
        access_token: SecretString::from(access_token),
        refresh_token: SecretString::from(grant.refresh_token.unwrap_or_default()),
        expires_in: grant.expires_in,
    })
}
