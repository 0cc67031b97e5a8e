//! Catalog resolution: candidate `{title, artist}` to a playable track.
//!
//! [`SpotifyCatalog`] does the client-credentials token exchange and the
//! search call and may fail. [`CatalogResolver`] turns every failure into a
//! null-link [`ResolvedTrack`] so one bad lookup never fails a turn.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use cadence_core::config::CatalogConfig;
use cadence_core::events::{DomainEvent, EventBus};
use cadence_core::types::{ResolvedTrack, SongCandidate, Timestamp};

use crate::error::ChatError;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

// =============================================================================
// TokenCache
// =============================================================================

/// A bearer credential as issued by the token endpoint.
#[derive(Clone)]
pub struct IssuedToken {
    pub value: String,
    pub expires_in: Duration,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Holds the catalog bearer token.
///
/// With reuse disabled every call fetches a fresh token and nothing is kept.
/// With reuse enabled the token is kept until `expires_in - margin` and
/// concurrent callers share one in-flight fetch.
pub struct TokenCache {
    reuse: bool,
    margin: Duration,
    slot: AsyncMutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(reuse: bool, margin: Duration) -> Self {
        Self {
            reuse,
            margin,
            slot: AsyncMutex::new(None),
        }
    }

    /// Return a usable token and whether it came from the cache.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<(String, bool), ChatError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, ChatError>>,
    {
        if !self.reuse {
            return fetch().await.map(|t| (t.value, false));
        }

        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok((cached.value.clone(), true));
            }
        }

        let issued = fetch().await?;
        let refresh_at = Instant::now() + issued.expires_in.saturating_sub(self.margin);
        *slot = Some(CachedToken {
            value: issued.value.clone(),
            refresh_at,
        });
        Ok((issued.value, false))
    }

    /// Forget the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }
}

// =============================================================================
// TrackCatalog
// =============================================================================

/// A searchable music catalog.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Catalog id of the best match for `candidate`.
    async fn find_track_id(&self, candidate: &SongCandidate) -> Result<String, ChatError>;
}

/// Search string for a candidate: `<title>[ artist:<artist>]`.
pub fn search_query(candidate: &SongCandidate) -> String {
    if candidate.artist.trim().is_empty() {
        candidate.title.clone()
    } else {
        format!("{} artist:{}", candidate.title, candidate.artist)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: String,
}

/// Spotify Web API catalog (client-credentials flow).
pub struct SpotifyCatalog {
    client: reqwest::Client,
    accounts_url: String,
    api_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    tokens: TokenCache,
    events: EventBus,
}

impl fmt::Debug for SpotifyCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCatalog")
            .field("accounts_url", &self.accounts_url)
            .field("api_url", &self.api_url)
            .field("has_credentials", &self.has_credentials())
            .finish()
    }
}

impl SpotifyCatalog {
    pub fn new(config: &CatalogConfig, events: EventBus) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            ChatError::UpstreamRequestFailure(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            accounts_url: config.accounts_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tokens: TokenCache::new(
                config.reuse_tokens,
                Duration::from_secs(config.token_expiry_margin_secs),
            ),
            events,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Client-credentials exchange against `{accounts_url}/api/token`.
    async fn request_token(&self) -> Result<IssuedToken, ChatError> {
        let id = self
            .client_id
            .as_deref()
            .ok_or(ChatError::MissingCredential("SPOTIFY_CLIENT_ID"))?;
        let secret = self
            .client_secret
            .as_deref()
            .ok_or(ChatError::MissingCredential("SPOTIFY_CLIENT_SECRET"))?;
        let basic = STANDARD.encode(format!("{id}:{secret}"));

        let response = self
            .client
            .post(format!("{}/api/token", self.accounts_url))
            .header(reqwest::header::AUTHORIZATION, format!("Basic {basic}"))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| ChatError::UpstreamAuthFailure(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::UpstreamAuthFailure(format!(
                "token endpoint HTTP {}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ChatError::UpstreamAuthFailure(format!("invalid token response: {e}")))?;

        Ok(IssuedToken {
            value: token.access_token,
            expires_in: Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)),
        })
    }

    /// `GET {api_url}/v1/search?q=..&type=track&limit=1`.
    async fn search(&self, token: &str, query: &str) -> Result<Option<String>, ChatError> {
        let response = self
            .client
            .get(format!("{}/v1/search", self.api_url))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ChatError::UpstreamRequestFailure(format!("search request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(ChatError::UpstreamAuthFailure(
                "search rejected bearer token".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(ChatError::UpstreamRequestFailure(format!(
                "search HTTP {}",
                status.as_u16()
            )));
        }

        let page: SearchResponse = response.json().await.map_err(|e| {
            ChatError::UpstreamRequestFailure(format!("invalid search response: {e}"))
        })?;

        Ok(page
            .tracks
            .and_then(|t| t.items.into_iter().next())
            .map(|item| item.id))
    }
}

#[async_trait]
impl TrackCatalog for SpotifyCatalog {
    async fn find_track_id(&self, candidate: &SongCandidate) -> Result<String, ChatError> {
        let (token, reused) = self.tokens.get_or_fetch(|| self.request_token()).await?;
        self.events.publish(DomainEvent::TokenAcquired {
            reused,
            timestamp: Timestamp::now(),
        });

        let query = search_query(candidate);
        tracing::debug!(query = %query, "searching catalog");
        self.search(&token, &query)
            .await?
            .ok_or(ChatError::NoMatchFound(query))
    }
}

// =============================================================================
// CatalogResolver
// =============================================================================

/// Never-fail resolution on top of a [`TrackCatalog`].
#[derive(Clone)]
pub struct CatalogResolver {
    catalog: Arc<dyn TrackCatalog>,
    events: EventBus,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<dyn TrackCatalog>, events: EventBus) -> Self {
        Self { catalog, events }
    }

    /// Resolve one candidate. Any failure yields a track with no link.
    pub async fn resolve(&self, candidate: &SongCandidate) -> ResolvedTrack {
        let label = candidate.label();
        match self.catalog.find_track_id(candidate).await {
            Ok(track_id) => {
                tracing::debug!(label = %label, track_id = %track_id, "track resolved");
                self.events.publish(DomainEvent::TrackResolved {
                    label: label.clone(),
                    track_id: track_id.clone(),
                    timestamp: Timestamp::now(),
                });
                ResolvedTrack::from_track_id(label, &track_id)
            }
            Err(e) => {
                tracing::warn!(label = %label, error = %e, "track unresolved");
                self.events.publish(DomainEvent::TrackUnresolved {
                    label: label.clone(),
                    reason: e.to_string(),
                    timestamp: Timestamp::now(),
                });
                ResolvedTrack::unresolved(label)
            }
        }
    }

    /// Resolve several candidates concurrently, preserving input order.
    /// Each lookup is independent of the others' outcome.
    pub async fn resolve_all(&self, candidates: &[SongCandidate]) -> Vec<ResolvedTrack> {
        join_all(candidates.iter().map(|c| self.resolve(c))).await
    }
}

// =============================================================================
// Tests
// =============================================================================
