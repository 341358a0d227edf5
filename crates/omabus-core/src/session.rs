// ── Controller session ──
//
// Owns the OpenAPI credentials and tokens, resolves the site id, and
// keeps the access token fresh from a single background renewal task.
// Collaborators only see `request` / `execute` / `paginate`; they never
// handle tokens or build auth headers.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use omabus_api::models::SiteSummary;
use omabus_api::{ClientCredentials, IssuedTokens, Method, OmadaClient};

use crate::config::{ControllerConfig, RenewalPolicy};
use crate::error::CoreError;

/// Lifetime assumed when the grant does not report one.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Subtracted from the reported lifetime when computing expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// How long before expiry the renewal fires.
const RENEWAL_LEAD: Duration = Duration::from_secs(600);
/// Floor between arming and firing, so short-lived tokens cannot spin.
const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

// ── SessionState ─────────────────────────────────────────────────

/// Session lifecycle, observable through [`SessionManager::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Renewing,
    /// Renewal gave up after the configured number of rounds.
    Failed,
}

// ── SessionManager ───────────────────────────────────────────────

struct Tokens {
    access: SecretString,
    refresh: SecretString,
    expires_at: Instant,
}

/// Authenticated access to one controller site.
///
/// Cheaply cloneable via `Arc<SessionInner>`; every clone shares the same
/// tokens and renewal task.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: OmadaClient,
    credentials: ClientCredentials,
    site_name: String,
    renewal: RenewalPolicy,
    tokens: RwLock<Option<Tokens>>,
    site_id: RwLock<Option<String>>,
    /// Serializes grants so concurrent retries do not stampede the controller.
    grant_lock: tokio::sync::Mutex<()>,
    state: watch::Sender<SessionState>,
    /// Next renewal instant; `None` disarms the renewal task.
    deadline: watch::Sender<Option<Instant>>,
    renewal_task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(config: &ControllerConfig) -> Result<Self, CoreError> {
        let client = OmadaClient::new(
            config.url.clone(),
            config.omadac_id.clone(),
            &config.transport(),
        )?;
        Ok(Self::with_client(client, config))
    }

    /// Build a session around a pre-built client.
    pub fn with_client(client: OmadaClient, config: &ControllerConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        let (deadline, _) = watch::channel(None);

        Self {
            inner: Arc::new(SessionInner {
                client,
                credentials: config.credentials(),
                site_name: config.site.clone(),
                renewal: config.renewal,
                tokens: RwLock::new(None),
                site_id: RwLock::new(None),
                grant_lock: tokio::sync::Mutex::new(()),
                state,
                deadline,
                renewal_task: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Run the client-credentials grant, store the tokens, arm renewal,
    /// and resolve the configured site name to a site id.
    pub async fn authenticate(&self) -> Result<(), CoreError> {
        let _grant = self.inner.grant_lock.lock().await;
        self.authenticate_locked().await
    }

    /// Run the refresh-token grant, falling back to a full
    /// authentication on any failure.
    pub async fn renew(&self) -> Result<(), CoreError> {
        let _grant = self.inner.grant_lock.lock().await;
        self.renew_locked().await
    }

    /// (Re)arm the renewal timer at `expiry - RENEWAL_LEAD`.
    ///
    /// An instant already in the past renews after `MIN_RENEWAL_DELAY`.
    /// Re-arming replaces whatever was pending.
    pub fn schedule_renewal(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let Some(expires_at) = self.token_expires_at() else {
            return;
        };
        let earliest = Instant::now() + MIN_RENEWAL_DELAY;
        let at = expires_at
            .checked_sub(RENEWAL_LEAD)
            .map_or(earliest, |at| at.max(earliest));
        self.inner.deadline.send_replace(Some(at));
        debug!(
            in_secs = at.saturating_duration_since(Instant::now()).as_secs(),
            "renewal armed"
        );
        self.ensure_renewal_task();
    }

    /// Stop the renewal task. In-flight grants run to completion.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.deadline.send_replace(None);

        let handle = self
            .inner
            .renewal_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("session shut down");
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The resolved site id, or `None` if the site name did not match.
    pub fn site_id(&self) -> Option<String> {
        self.inner
            .site_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The site id, or [`CoreError::NotReady`] when unresolved.
    pub fn require_site(&self) -> Result<String, CoreError> {
        self.site_id().ok_or_else(CoreError::not_ready_no_site)
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn token_expires_at(&self) -> Option<Instant> {
        self.tokens_read(|t| t.expires_at)
    }

    /// When the renewal task will next fire, if armed.
    pub fn renewal_deadline(&self) -> Option<Instant> {
        *self.inner.deadline.borrow()
    }

    // ── Authenticated requests ───────────────────────────────────

    /// Send an authenticated request and decode the envelope's `result`.
    ///
    /// `path` is relative to `/openapi/v1/{omadacId}/`. An expired or
    /// invalid access token triggers one renewal and one retry.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, CoreError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let token = self.access_token()?;
        match self
            .inner
            .client
            .fetch(method.clone(), path, query, body, &token)
            .await
        {
            Err(e) if e.is_auth_expired() => {
                debug!(path, error = %e, "access token rejected, renewing");
                let token = self.renew_after(&token).await?;
                Ok(self
                    .inner
                    .client
                    .fetch(method, path, query, body, &token)
                    .await?)
            }
            other => Ok(other?),
        }
    }

    /// Like [`request`](Self::request) but only checks `errorCode`.
    pub async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<(), CoreError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.access_token()?;
        match self
            .inner
            .client
            .execute(method.clone(), path, query, body, &token)
            .await
        {
            Err(e) if e.is_auth_expired() => {
                debug!(path, error = %e, "access token rejected, renewing");
                let token = self.renew_after(&token).await?;
                Ok(self
                    .inner
                    .client
                    .execute(method, path, query, body, &token)
                    .await?)
            }
            other => Ok(other?),
        }
    }

    /// Collect every page of a list endpoint.
    pub async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        page_size: u32,
    ) -> Result<Vec<T>, CoreError> {
        let token = self.access_token()?;
        match self.inner.client.paginate_all(path, page_size, &token).await {
            Err(e) if e.is_auth_expired() => {
                debug!(path, error = %e, "access token rejected, renewing");
                let token = self.renew_after(&token).await?;
                Ok(self
                    .inner
                    .client
                    .paginate_all(path, page_size, &token)
                    .await?)
            }
            other => Ok(other?),
        }
    }

    // ── Grants (callers hold `grant_lock`) ───────────────────────

    async fn authenticate_locked(&self) -> Result<(), CoreError> {
        self.set_state(SessionState::Authenticating);
        info!(url = %self.inner.client.base_url(), "authenticating");

        let issued = match self
            .inner
            .client
            .client_credentials_grant(&self.inner.credentials)
            .await
        {
            Ok(issued) => issued,
            Err(e) => {
                self.set_state(SessionState::Unauthenticated);
                return Err(CoreError::Auth {
                    message: e.to_string(),
                });
            }
        };

        let access = issued.access_token.clone();
        self.store_tokens(issued);
        self.set_state(SessionState::Authenticated);
        self.schedule_renewal();

        self.resolve_site(&access).await;
        Ok(())
    }

    async fn renew_locked(&self) -> Result<(), CoreError> {
        let Some(refresh) = self.tokens_read(|t| t.refresh.clone()) else {
            return self.authenticate_locked().await;
        };

        self.set_state(SessionState::Renewing);
        match self
            .inner
            .client
            .refresh_token_grant(&self.inner.credentials, &refresh)
            .await
        {
            Ok(issued) => {
                self.store_tokens(issued);
                self.set_state(SessionState::Authenticated);
                self.schedule_renewal();
                info!("access token renewed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, re-authenticating");
                self.authenticate_locked().await
            }
        }
    }

    /// Renew unless another caller already replaced `stale`, then
    /// return the current access token.
    async fn renew_after(&self, stale: &SecretString) -> Result<SecretString, CoreError> {
        let _grant = self.inner.grant_lock.lock().await;
        let current = self.tokens_read(|t| t.access.clone());
        let replaced = current
            .as_ref()
            .is_some_and(|c| c.expose_secret() != stale.expose_secret());
        if !replaced {
            self.renew_locked().await?;
        }
        self.access_token()
    }

    async fn resolve_site(&self, access: &SecretString) {
        let resolved = match self.inner.client.list_sites(access).await {
            Ok(sites) => match_site(&sites, &self.inner.site_name),
            Err(e) => {
                warn!(error = %e, "failed to list sites");
                return;
            }
        };

        match &resolved {
            Some(id) => info!(site = %self.inner.site_name, site_id = %id, "site resolved"),
            None => warn!(site = %self.inner.site_name, "no site with this name"),
        }
        *self
            .inner
            .site_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = resolved;
    }

    // ── Renewal task ─────────────────────────────────────────────

    fn ensure_renewal_task(&self) {
        let mut slot = self
            .inner
            .renewal_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let session = self.clone();
        let deadline_rx = self.inner.deadline.subscribe();
        let cancel = self.inner.cancel.clone();
        *slot = Some(tokio::spawn(renewal_task(session, deadline_rx, cancel)));
    }

    /// One renewal cycle: up to `max_attempts` rounds with backoff.
    /// Returns `false` if cancelled.
    async fn renew_with_backoff(&self, cancel: &CancellationToken) -> bool {
        let policy = self.inner.renewal;
        for attempt in 1..=policy.max_attempts.max(1) {
            match self.renew().await {
                Ok(()) => return true,
                Err(e) => warn!(attempt, error = %e, "renewal round failed"),
            }
            if attempt < policy.max_attempts {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return false,
                    () = tokio::time::sleep(policy.backoff(attempt)) => {}
                }
            }
        }

        error!(attempts = policy.max_attempts, "giving up on token renewal");
        self.inner.deadline.send_replace(None);
        self.set_state(SessionState::Failed);
        true
    }

    // ── Private helpers ──────────────────────────────────────────

    fn access_token(&self) -> Result<SecretString, CoreError> {
        self.tokens_read(|t| t.access.clone())
            .ok_or_else(|| CoreError::Auth {
                message: "not authenticated".into(),
            })
    }

    fn tokens_read<R>(&self, f: impl FnOnce(&Tokens) -> R) -> Option<R> {
        self.inner
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }

    fn store_tokens(&self, issued: IssuedTokens) {
        let lifetime = issued
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs)
            .saturating_sub(EXPIRY_MARGIN);
        *self
            .inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Tokens {
            access: issued.access_token,
            refresh: issued.refresh_token,
            expires_at: Instant::now() + lifetime,
        });
    }

    fn set_state(&self, state: SessionState) {
        self.inner.state.send_replace(state);
    }
}

/// Exact name match; the controller treats site names as unique.
fn match_site(sites: &[SiteSummary], name: &str) -> Option<String> {
    sites
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.site_id.clone())
}

/// Sleeps until the armed deadline, renews, repeats. A new deadline
/// arriving mid-sleep replaces the pending one.
async fn renewal_task(
    session: SessionManager,
    mut deadline_rx: watch::Receiver<Option<Instant>>,
    cancel: CancellationToken,
) {
    loop {
        let deadline = *deadline_rx.borrow_and_update();
        let Some(at) = deadline else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = deadline_rx.changed() => {
                    if changed.is_err() { break; }
                }
            }
            continue;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = deadline_rx.changed() => {
                if changed.is_err() { break; }
                continue;
            }
            () = tokio::time::sleep_until(at) => {}
        }

        debug!("renewal due");
        if !session.renew_with_backoff(&cancel).await {
            break;
        }
    }
    debug!("renewal task stopped");
}

#[cfg(test)]
mod tests {
    use omabus_api::models::SiteSummary;

    use super::{SessionState, match_site};

    fn site(id: &str, name: &str) -> SiteSummary {
        SiteSummary {
            site_id: id.into(),
            name: name.into(),
        }
    }

    #[test]
    fn site_match_is_exact() {
        let sites = [site("s1", "Default"), site("s2", "Lab")];
        assert_eq!(match_site(&sites, "Lab").as_deref(), Some("s2"));
        assert_eq!(match_site(&sites, "lab"), None);
        assert_eq!(match_site(&[], "Default"), None);
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Renewing.to_string(), "renewing");
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }
}
