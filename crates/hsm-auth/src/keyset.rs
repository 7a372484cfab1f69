//! The verification key set.
//!
//! A JWKS document fetched from one configured endpoint and cached in
//! memory. The cache is refreshed in two situations:
//!
//! - its TTL has lapsed (TTL comes from `Cache-Control: max-age`, clamped
//!   to `[min_ttl, max_ttl]`, else `default_ttl`)
//! - a token names a `kid` the cached set does not contain (at most once
//!   per `refresh_cooldown`)
//!
//! A failed re-fetch never empties the cache; the previous keys keep
//! serving.

use std::path::PathBuf;
use std::time::Duration;

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::KeySetError;

/// Where the key set lives and how long a fetched copy stays valid.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    pub url: Url,

    /// PEM bundle trusted in addition to the system roots (an in-cluster
    /// CA, for example).
    pub ca_cert: Option<PathBuf>,

    /// File holding a bearer token to present to the endpoint. Re-read on
    /// every fetch since projected service-account tokens rotate.
    pub bearer_token_file: Option<PathBuf>,

    /// TTL when the response has no usable `max-age` (default: 1 hour).
    pub default_ttl: Duration,

    /// Lower bound on any TTL (default: 5 minutes).
    pub min_ttl: Duration,

    /// Upper bound on any TTL (default: 24 hours).
    pub max_ttl: Duration,

    /// Minimum spacing between fetches triggered by an unknown `kid`
    /// (default: 5 minutes).
    pub refresh_cooldown: Duration,

    /// Timeout for one fetch (default: 10 seconds).
    pub request_timeout: Duration,
}

impl KeySetConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ca_cert: None,
            bearer_token_file: None,
            default_ttl: Duration::from_secs(60 * 60),
            min_ttl: Duration::from_secs(5 * 60),
            max_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_cooldown: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    pub fn with_bearer_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.bearer_token_file = Some(path.into());
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_ttl_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_ttl = min;
        self.max_ttl = max;
        self
    }

    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// TTL for a response carrying `cache_control`.
    pub fn ttl_for(&self, cache_control: Option<&str>) -> Duration {
        cache_control
            .and_then(|value| {
                value.split(',').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("max-age=")
                        .and_then(|secs| secs.parse::<u64>().ok())
                })
            })
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl)
            .min(self.max_ttl)
            .max(self.min_ttl)
    }
}

/// One key a token may be verified against.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
    /// The algorithm the key declares, if any. A declared algorithm is the
    /// only one the key may verify.
    pub algorithm: Option<Algorithm>,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Cached {
    jwks: JwkSet,
    /// `None` for a static set, which never expires.
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct Fetcher {
    http: reqwest::Client,
    config: KeySetConfig,
}

impl Fetcher {
    async fn new(config: KeySetConfig) -> Result<Self, KeySetError> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if let Some(path) = &config.ca_cert {
            let pem = tokio::fs::read(path)
                .await
                .map_err(|source| KeySetError::CaCertRead {
                    path: path.clone(),
                    source,
                })?;
            let cert =
                reqwest::Certificate::from_pem(&pem).map_err(|source| KeySetError::CaCertInvalid {
                    path: path.clone(),
                    source,
                })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(KeySetError::Client)?;
        Ok(Self { http, config })
    }

    async fn fetch(&self) -> Result<(JwkSet, Duration), KeySetError> {
        let mut request = self
            .http
            .get(self.config.url.clone())
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(path) = &self.config.bearer_token_file {
            let token = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| KeySetError::BearerTokenFile {
                    path: path.clone(),
                    source,
                })?;
            request = request.bearer_auth(token.trim());
        }

        let response = request.send().await.map_err(KeySetError::Unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::Status {
                status: status.as_u16(),
            });
        }

        let ttl = self.config.ttl_for(
            response
                .headers()
                .get(reqwest::header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok()),
        );
        let jwks: JwkSet = response.json().await.map_err(KeySetError::Decode)?;
        Ok((jwks, ttl))
    }
}

/// The cached key set plus whatever is needed to re-fetch it.
#[derive(Debug)]
pub struct KeySet {
    fetcher: Option<Fetcher>,
    cached: RwLock<Cached>,
    /// Serializes fetches. Holds when the last `kid`-miss fetch started.
    refresh: Mutex<Option<Instant>>,
}

impl KeySet {
    /// Fetch the key set for the first time.
    ///
    /// # Errors
    /// Any [`KeySetError`]; callers treat this as fatal at startup.
    pub async fn fetch(config: KeySetConfig) -> Result<Self, KeySetError> {
        let fetcher = Fetcher::new(config).await?;
        let (jwks, ttl) = fetcher.fetch().await?;
        info!(
            url = %fetcher.config.url,
            keys = jwks.keys.len(),
            ttl_secs = ttl.as_secs(),
            "key set fetched"
        );

        Ok(Self {
            cached: RwLock::new(Cached {
                jwks,
                expires_at: Some(Instant::now() + ttl),
            }),
            fetcher: Some(fetcher),
            refresh: Mutex::new(None),
        })
    }

    /// A fixed key set that is never re-fetched.
    pub fn from_static(jwks: JwkSet) -> Self {
        Self {
            fetcher: None,
            cached: RwLock::new(Cached {
                jwks,
                expires_at: None,
            }),
            refresh: Mutex::new(None),
        }
    }

    /// Number of keys currently cached.
    pub async fn len(&self) -> usize {
        self.cached.read().await.jwks.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cached.read().await.jwks.keys.is_empty()
    }

    /// Keys a token with header `kid` may be verified against.
    ///
    /// With a `kid`, at most the one matching key; an unknown `kid` may
    /// trigger a re-fetch. Without one, every signing key. Encryption keys
    /// and keys the decoder cannot load are never returned.
    pub async fn candidates(&self, kid: Option<&str>) -> Vec<VerificationKey> {
        self.refresh_if_expired().await;

        let found = self.lookup(kid).await;
        match kid {
            Some(kid) if found.is_empty() => {
                if self.refresh_for_unknown_kid(kid).await {
                    self.lookup(Some(kid)).await
                } else {
                    found
                }
            }
            _ => found,
        }
    }

    async fn lookup(&self, kid: Option<&str>) -> Vec<VerificationKey> {
        let cached = self.cached.read().await;
        cached
            .jwks
            .keys
            .iter()
            .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .filter(|jwk| kid.is_none() || jwk.common.key_id.as_deref() == kid)
            .filter_map(verification_key)
            .collect()
    }

    async fn refresh_if_expired(&self) {
        let Some(fetcher) = &self.fetcher else {
            return;
        };
        if !self.is_expired().await {
            return;
        }

        let _gate = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if !self.is_expired().await {
            return;
        }

        debug!(url = %fetcher.config.url, "key set TTL lapsed, re-fetching");
        if let Err(e) = self.install(fetcher).await {
            warn!(error = %e, "key set re-fetch failed, keeping previous keys");
            // Next attempt after the cooldown.
            self.cached.write().await.expires_at =
                Some(Instant::now() + fetcher.config.refresh_cooldown);
        }
    }

    /// Returns `true` if a fetch happened and succeeded.
    async fn refresh_for_unknown_kid(&self, kid: &str) -> bool {
        let Some(fetcher) = &self.fetcher else {
            return false;
        };

        let mut last_forced = self.refresh.lock().await;
        let now = Instant::now();
        if let Some(at) = *last_forced {
            if now.duration_since(at) < fetcher.config.refresh_cooldown {
                debug!(kid, "unknown kid, re-fetch on cooldown");
                return false;
            }
        }
        *last_forced = Some(now);

        debug!(kid, "unknown kid, re-fetching key set");
        match self.install(fetcher).await {
            Ok(()) => true,
            Err(e) => {
                warn!(kid, error = %e, "key set re-fetch failed, keeping previous keys");
                false
            }
        }
    }

    async fn is_expired(&self) -> bool {
        self.cached
            .read()
            .await
            .expires_at
            .is_some_and(|at| Instant::now() >= at)
    }

    async fn install(&self, fetcher: &Fetcher) -> Result<(), KeySetError> {
        let (jwks, ttl) = fetcher.fetch().await?;
        let keys = jwks.keys.len();
        *self.cached.write().await = Cached {
            jwks,
            expires_at: Some(Instant::now() + ttl),
        };
        info!(keys, ttl_secs = ttl.as_secs(), "key set refreshed");
        Ok(())
    }
}

fn verification_key(jwk: &Jwk) -> Option<VerificationKey> {
    match DecodingKey::from_jwk(jwk) {
        Ok(key) => Some(VerificationKey {
            kid: jwk.common.key_id.clone(),
            key,
            algorithm: jwk_algorithm(jwk),
        }),
        Err(e) => {
            debug!(kid = ?jwk.common.key_id, error = %e, "skipping unusable key");
            None
        }
    }
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KeySetConfig {
        KeySetConfig::new(Url::parse("https://issuer.example.invalid/jwks").unwrap())
    }

    fn jwks(value: serde_json::Value) -> JwkSet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_ttl_for_defaults_without_header() {
        assert_eq!(config().ttl_for(None), Duration::from_secs(3600));
        assert_eq!(config().ttl_for(Some("no-store")), Duration::from_secs(3600));
    }

    #[test]
    fn test_ttl_for_reads_max_age_among_directives() {
        assert_eq!(
            config().ttl_for(Some("public, max-age=7200, must-revalidate")),
            Duration::from_secs(7200)
        );
    }

    #[test]
    fn test_ttl_for_clamps_to_bounds() {
        assert_eq!(config().ttl_for(Some("max-age=10")), Duration::from_secs(300));
        assert_eq!(
            config().ttl_for(Some("max-age=999999")),
            Duration::from_secs(86400)
        );
    }

    #[tokio::test]
    async fn test_candidates_by_kid_and_without_kid() {
        let set = KeySet::from_static(jwks(serde_json::json!({
            "keys": [
                { "kty": "oct", "kid": "a", "alg": "HS256", "k": "c2VjcmV0LWFh" },
                { "kty": "oct", "kid": "b", "k": "c2VjcmV0LWJi" },
                { "kty": "oct", "kid": "enc", "use": "enc", "k": "c2VjcmV0LWNj" }
            ]
        })));

        let a = set.candidates(Some("a")).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].algorithm, Some(Algorithm::HS256));

        let b = set.candidates(Some("b")).await;
        assert_eq!(b[0].algorithm, None);

        // Encryption keys never verify signatures.
        assert!(set.candidates(Some("enc")).await.is_empty());
        assert_eq!(set.candidates(None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_static_set_unknown_kid_is_empty() {
        let set = KeySet::from_static(JwkSet { keys: vec![] });
        assert!(set.candidates(Some("missing")).await.is_empty());
        assert!(set.is_empty().await);
    }
}
