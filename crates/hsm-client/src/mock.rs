//! Scripted in-memory [`TokenClient`] for tests.
//!
//! Each method pops its next scripted answer; when nothing is scripted it
//! falls back to a plausible success (or `Pending`, for the device-code
//! exchange). Every call is counted so tests can assert how often the
//! upstream was hit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use hsm_protocol::{
    DeviceAuthorization, GameSession, OAuthSession, Profile, ProfileList, ReleaseManifest,
    SignedUrl, TokenResponse,
};
use time::OffsetDateTime;

use crate::{ClientError, ExchangeOutcome, TokenClient};

/// A scripted exchange answer. `ClientError` is not `Clone`, so failures
/// are scripted as an upstream status code.
#[derive(Debug, Clone)]
enum Exchange {
    Done(OAuthSession),
    Pending,
    Fatal(u16),
}

#[derive(Debug, Default)]
struct State {
    device_authorizations: VecDeque<Result<DeviceAuthorization, u16>>,
    exchanges: VecDeque<Exchange>,
    access_refreshes: VecDeque<Result<OAuthSession, u16>>,
    profiles: Option<ProfileList>,
    creates: VecDeque<Result<GameSession, u16>>,
    session_refreshes: VecDeque<Result<GameSession, u16>>,
    deletes: VecDeque<Result<(), u16>>,
    manifest: Option<ReleaseManifest>,
    calls: HashMap<&'static str, usize>,
    bearer_tokens: Vec<String>,
    issued: usize,
}

impl State {
    fn record(&mut self, method: &'static str) -> usize {
        let count = self.calls.entry(method).or_default();
        *count += 1;
        *count
    }
}

fn scripted_failure(status: u16) -> ClientError {
    ClientError::Status {
        status,
        body: "scripted failure".into(),
    }
}

/// An in-memory [`TokenClient`] driven by per-method scripts.
#[derive(Debug, Default)]
pub struct MockTokenClient {
    state: Mutex<State>,
}

impl MockTokenClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A device authorization with the given lifetime and interval (seconds).
    pub fn device_authorization(expires_in: u64, interval: u64) -> DeviceAuthorization {
        DeviceAuthorization {
            device_code: "device-code".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://example.invalid/device".into(),
            verification_uri_complete: None,
            expires_in,
            interval,
        }
    }

    /// A session issued at `now` with the given tokens and lifetime.
    pub fn oauth_session(
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: u64,
        now: OffsetDateTime,
    ) -> OAuthSession {
        OAuthSession::issue(
            TokenResponse {
                access_token: access_token.into(),
                refresh_token: refresh_token.map(str::to_owned),
                token_type: Some("Bearer".into()),
                scope: None,
                expires_in: Some(expires_in),
                id_token: None,
            },
            now,
        )
    }

    // -----------------------------------------------------------------------
    // Scripting
    // -----------------------------------------------------------------------

    pub fn push_device_authorization(&self, answer: Result<DeviceAuthorization, u16>) {
        self.state().device_authorizations.push_back(answer);
    }

    /// Script `n` consecutive "authorization pending" answers.
    pub fn push_exchange_pending(&self, n: usize) {
        let mut state = self.state();
        state
            .exchanges
            .extend(std::iter::repeat_n(Exchange::Pending, n));
    }

    pub fn push_exchange_done(&self, session: OAuthSession) {
        self.state().exchanges.push_back(Exchange::Done(session));
    }

    pub fn push_exchange_fatal(&self, status: u16) {
        self.state().exchanges.push_back(Exchange::Fatal(status));
    }

    pub fn push_refresh_access_token(&self, answer: Result<OAuthSession, u16>) {
        self.state().access_refreshes.push_back(answer);
    }

    pub fn set_profiles(&self, profiles: ProfileList) {
        self.state().profiles = Some(profiles);
    }

    pub fn push_create_game_session(&self, answer: Result<GameSession, u16>) {
        self.state().creates.push_back(answer);
    }

    pub fn push_refresh_game_session(&self, answer: Result<GameSession, u16>) {
        self.state().session_refreshes.push_back(answer);
    }

    pub fn push_delete_game_session(&self, answer: Result<(), u16>) {
        self.state().deletes.push_back(answer);
    }

    pub fn set_release_manifest(&self, manifest: ReleaseManifest) {
        self.state().manifest = Some(manifest);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// How many times `method` (the trait method name) was called.
    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    /// Every bearer credential presented, in call order.
    pub fn bearer_tokens(&self) -> Vec<String> {
        self.state().bearer_tokens.clone()
    }

    fn next_game_session(state: &mut State, prefix: &str) -> GameSession {
        state.issued += 1;
        GameSession {
            session_token: format!("{prefix}-session-{}", state.issued),
            identity_token: format!("{prefix}-identity-{}", state.issued),
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        }
    }
}

impl TokenClient for MockTokenClient {
    async fn request_device_authorization(&self) -> Result<DeviceAuthorization, ClientError> {
        let mut state = self.state();
        state.record("request_device_authorization");
        match state.device_authorizations.pop_front() {
            Some(answer) => answer.map_err(scripted_failure),
            None => Ok(Self::device_authorization(600, 5)),
        }
    }

    async fn exchange_device_code(&self, _device_code: &str) -> ExchangeOutcome {
        let mut state = self.state();
        state.record("exchange_device_code");
        match state.exchanges.pop_front() {
            Some(Exchange::Done(session)) => ExchangeOutcome::Done(session),
            Some(Exchange::Fatal(status)) => ExchangeOutcome::Fatal(scripted_failure(status)),
            Some(Exchange::Pending) | None => ExchangeOutcome::Pending,
        }
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthSession, ClientError> {
        let mut state = self.state();
        let n = state.record("refresh_access_token");
        state.bearer_tokens.push(refresh_token.to_owned());
        match state.access_refreshes.pop_front() {
            Some(answer) => answer.map_err(scripted_failure),
            None => Ok(Self::oauth_session(
                &format!("refreshed-access-{n}"),
                None,
                3600,
                OffsetDateTime::now_utc(),
            )),
        }
    }

    async fn profiles(&self, access_token: &str) -> Result<ProfileList, ClientError> {
        let mut state = self.state();
        state.record("profiles");
        state.bearer_tokens.push(access_token.to_owned());
        Ok(state.profiles.clone().unwrap_or_else(|| ProfileList {
            owner: "owner-1".into(),
            profiles: vec![Profile {
                uuid: "profile-1".into(),
                username: "player".into(),
            }],
        }))
    }

    async fn create_game_session(
        &self,
        access_token: &str,
        _profile_id: &str,
    ) -> Result<GameSession, ClientError> {
        let mut state = self.state();
        state.record("create_game_session");
        state.bearer_tokens.push(access_token.to_owned());
        match state.creates.pop_front() {
            Some(answer) => answer.map_err(scripted_failure),
            None => Ok(Self::next_game_session(&mut state, "created")),
        }
    }

    async fn refresh_game_session(&self, session_token: &str) -> Result<GameSession, ClientError> {
        let mut state = self.state();
        state.record("refresh_game_session");
        state.bearer_tokens.push(session_token.to_owned());
        match state.session_refreshes.pop_front() {
            Some(answer) => answer.map_err(scripted_failure),
            None => Ok(Self::next_game_session(&mut state, "refreshed")),
        }
    }

    async fn delete_game_session(&self, session_token: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.record("delete_game_session");
        state.bearer_tokens.push(session_token.to_owned());
        match state.deletes.pop_front() {
            Some(answer) => answer.map_err(scripted_failure),
            None => Ok(()),
        }
    }

    async fn signed_url(&self, access_token: &str, path: &str) -> Result<SignedUrl, ClientError> {
        let mut state = self.state();
        state.record("signed_url");
        state.bearer_tokens.push(access_token.to_owned());
        Ok(SignedUrl {
            url: format!("https://signed.example.invalid/{path}"),
        })
    }

    async fn release_manifest(&self, _url: &str) -> Result<ReleaseManifest, ClientError> {
        let mut state = self.state();
        state.record("release_manifest");
        Ok(state.manifest.clone().unwrap_or_else(|| ReleaseManifest {
            download_url: "builds/server.zip".into(),
            version: Some("1.0.0".into()),
        }))
    }
}
