use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use astar_core::{Credentials, RefreshPolicy};
use chrono::Utc;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::endpoint::TokenEndpoint;
use crate::{ClientError, Result};

type RefreshFuture = Shared<BoxFuture<'static, Result<Credentials>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(Credentials),
    Refreshed(Credentials),
    LoggedOut,
}

// ─── Session ──────────────────────────────────────────────────────────────

/// A client-side login session with single-flight token refresh.
///
/// At most one refresh request is outstanding at a time: callers that
/// arrive while one is in flight await the same result. After a successful
/// refresh a timer is armed to refresh again `skew` before expiry (never
/// sooner than `floor`). A failed refresh ends the session.
///
/// Cloning is cheap; clones share state.
///
/// ```rust,ignore
/// let session = Session::new(Arc::new(HttpTokenEndpoint::new(url)), policy);
/// session.login(credentials);
///
/// // Three callers, one network request.
/// let (a, b, c) = tokio::join!(session.refresh(), session.refresh(), session.refresh());
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Arc<dyn TokenEndpoint>,
    policy: RefreshPolicy,
    state: Mutex<State>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Default)]
struct State {
    credentials: Option<Credentials>,
    in_flight: Option<(u64, RefreshFuture)>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on login and logout; a refresh started under an older epoch
    /// must not store its result.
    epoch: u64,
    next_refresh_id: u64,
}

impl State {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Drop credentials, forget any in-flight refresh, stop the timer.
    /// Returns whether there was a session to end.
    fn end(&mut self) -> bool {
        let had_session = self.credentials.take().is_some();
        self.in_flight = None;
        self.epoch += 1;
        self.cancel_timer();
        had_session
    }
}

impl Session {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, policy: RefreshPolicy) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                policy,
                state: Mutex::new(State::default()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.lock().credentials.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().credentials.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    /// Install a credential pair and arm the proactive refresh timer.
    ///
    /// Replaces any previous session; a refresh still in flight for the old
    /// session resolves to [`ClientError::SessionEnded`]. Outside a tokio
    /// runtime no timer is armed until the next successful refresh.
    pub fn login(&self, credentials: Credentials) {
        let delay = self
            .inner
            .policy
            .delay_for(credentials.expires_in(Utc::now()));
        {
            let mut state = self.inner.lock();
            state.end();
            state.credentials = Some(credentials.clone());
            self.inner.schedule(&mut state, delay);
        }
        debug!(delay_secs = delay.as_secs(), "session started");
        let _ = self.inner.events.send(SessionEvent::LoggedIn(credentials));
    }

    pub fn logout(&self) {
        let had_session = self.inner.lock().end();
        if had_session {
            info!("session ended");
            let _ = self.inner.events.send(SessionEvent::LoggedOut);
        }
    }

    /// Refresh the credential pair, joining an in-flight refresh if any.
    pub async fn refresh(&self) -> Result<Credentials> {
        let pending = {
            let mut state = self.inner.lock();
            let existing = state.in_flight.as_ref().map(|(_, pending)| pending.clone());
            match existing {
                Some(pending) => {
                    debug!("joining in-flight refresh");
                    pending
                }
                None => {
                    let refresh_token = state
                        .credentials
                        .as_ref()
                        .map(|c| c.refresh_token.clone())
                        .ok_or(ClientError::NoSession)?;
                    let id = state.next_refresh_id;
                    state.next_refresh_id += 1;
                    let epoch = state.epoch;

                    // Spawned so the request completes even if every caller
                    // is dropped; the state lock is held until the handle is
                    // stored, so the task cannot settle before that.
                    let inner = Arc::clone(&self.inner);
                    let handle = tokio::spawn(async move {
                        inner.run_refresh(id, epoch, refresh_token).await
                    });
                    let pending = async move {
                        handle
                            .await
                            .map_err(|e| ClientError::TaskFailed(e.to_string()))?
                    }
                    .boxed()
                    .shared();
                    state.in_flight = Some((id, pending.clone()));
                    pending
                }
            }
        };
        pending.await
    }

    /// A usable access token, refreshing first when the current one is
    /// within `skew` of expiry.
    pub async fn access_token(&self) -> Result<String> {
        let credentials = self.credentials().ok_or(ClientError::NoSession)?;
        if credentials.is_expiring(Utc::now(), self.inner.policy.skew) {
            debug!("access token expiring; refreshing before use");
            return Ok(self.refresh().await?.access_token);
        }
        Ok(credentials.access_token)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_refresh(
        self: Arc<Self>,
        id: u64,
        epoch: u64,
        refresh_token: String,
    ) -> Result<Credentials> {
        let result = self.endpoint.refresh(refresh_token).await;

        let mut state = self.lock();
        if matches!(&state.in_flight, Some((current, _)) if *current == id) {
            state.in_flight = None;
        }
        if state.epoch != epoch {
            debug!("discarding refresh result for an ended session");
            return Err(ClientError::SessionEnded);
        }

        match result {
            Ok(resp) => {
                let delay = self.policy.delay_for(Duration::from_secs(resp.expires_in));
                let credentials = Credentials::from_response(resp, Utc::now());
                state.credentials = Some(credentials.clone());
                self.schedule(&mut state, delay);
                drop(state);
                info!(delay_secs = delay.as_secs(), "access token refreshed");
                let _ = self
                    .events
                    .send(SessionEvent::Refreshed(credentials.clone()));
                Ok(credentials)
            }
            Err(e) => {
                state.end();
                drop(state);
                warn!(error = %e, "token refresh failed; session ended");
                let _ = self.events.send(SessionEvent::LoggedOut);
                Err(e)
            }
        }
    }

    /// Replace the proactive refresh timer.
    fn schedule(self: &Arc<Self>, state: &mut State, delay: Duration) {
        state.cancel_timer();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime; proactive refresh timer not armed");
            return;
        };
        let weak: Weak<Inner> = Arc::downgrade(self);
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            debug!("proactive refresh timer fired");
            if let Err(e) = (Session { inner }).refresh().await {
                warn!(error = %e, "proactive refresh failed");
            }
        }));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.lock().cancel_timer();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use astar_core::TokenResponse;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts calls; each call takes `latency` and returns a numbered pair.
    struct MockEndpoint {
        calls: AtomicUsize,
        fail: AtomicBool,
        latency: Duration,
        expires_in: u64,
    }

    impl MockEndpoint {
        fn new(latency: Duration, expires_in: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                latency,
                expires_in,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenEndpoint for MockEndpoint {
        fn refresh(&self, _refresh_token: String) -> BoxFuture<'static, Result<TokenResponse>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = self.fail.load(Ordering::SeqCst);
            let latency = self.latency;
            let expires_in = self.expires_in;
            async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                if fail {
                    return Err(ClientError::Rejected {
                        status: 401,
                        message: "refresh token revoked".into(),
                    });
                }
                Ok(TokenResponse {
                    access_token: format!("access-{n}"),
                    refresh_token: format!("refresh-{n}"),
                    token_type: "Bearer".into(),
                    expires_in,
                })
            }
            .boxed()
        }
    }

    fn credentials(expires_in: u64) -> Credentials {
        Credentials::from_response(
            TokenResponse {
                access_token: "access-0".into(),
                refresh_token: "refresh-0".into(),
                token_type: "Bearer".into(),
                expires_in,
            },
            Utc::now(),
        )
    }

    fn session(endpoint: &Arc<MockEndpoint>) -> Session {
        Session::new(endpoint.clone(), RefreshPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_call() {
        let endpoint = MockEndpoint::new(Duration::from_millis(50), 900);
        let s = session(&endpoint);
        s.login(credentials(900));

        let (a, b, c) = tokio::join!(s.refresh(), s.refresh(), s.refresh());
        assert_eq!(endpoint.calls(), 1);
        let a = a.unwrap();
        assert_eq!(a.access_token, "access-1");
        assert_eq!(b.unwrap(), a);
        assert_eq!(c.unwrap(), a);
        assert_eq!(s.credentials().unwrap(), a);
        assert!(!s.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_callers_share_one_call() {
        let endpoint = MockEndpoint::new(Duration::from_millis(50), 900);
        let s = session(&endpoint);
        s.login(credentials(900));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let s = s.clone();
                tokio::spawn(async move { s.refresh().await })
            })
            .collect();
        let mut tokens = Vec::new();
        for h in handles {
            tokens.push(h.await.unwrap().unwrap().access_token);
        }
        assert_eq!(endpoint.calls(), 1);
        assert!(tokens.iter().all(|t| t == "access-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_refreshes_each_hit_the_endpoint() {
        let endpoint = MockEndpoint::new(Duration::from_millis(10), 900);
        let s = session(&endpoint);
        s.login(credentials(900));

        assert_eq!(s.refresh().await.unwrap().access_token, "access-1");
        assert_eq!(s.refresh().await.unwrap().access_token, "access-2");
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(s.credentials().unwrap().refresh_token, "refresh-2");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_ends_session_and_is_not_reused() {
        let endpoint = MockEndpoint::new(Duration::from_millis(50), 900);
        endpoint.fail.store(true, Ordering::SeqCst);
        let s = session(&endpoint);
        let mut events = s.subscribe();
        s.login(credentials(900));

        let (a, b) = tokio::join!(s.refresh(), s.refresh());
        assert_eq!(endpoint.calls(), 1);
        assert!(matches!(a, Err(ClientError::Rejected { status: 401, .. })));
        assert_eq!(a, b);
        assert!(!s.is_authenticated());
        assert!(matches!(events.recv().await, Ok(SessionEvent::LoggedIn(_))));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);

        // No session: fails fast without a network call.
        assert_eq!(s.refresh().await, Err(ClientError::NoSession));
        assert_eq!(endpoint.calls(), 1);

        // A new login starts a fresh attempt.
        endpoint.fail.store(false, Ordering::SeqCst);
        s.login(credentials(900));
        assert_eq!(s.refresh().await.unwrap().access_token, "access-2");
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn proactive_refresh_fires_skew_before_expiry() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 300);
        let s = session(&endpoint);
        // Long-lived initial token so only the post-refresh timer matters.
        s.login(credentials(10_000));
        s.refresh().await.unwrap();
        assert_eq!(endpoint.calls(), 1);

        // expires_in = 300 → max(300 - 120, 30) = 180s
        tokio::time::sleep(Duration::from_secs(179)).await;
        assert_eq!(endpoint.calls(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(s.credentials().unwrap().access_token, "access-2");
    }

    #[tokio::test(start_paused = true)]
    async fn short_lived_tokens_use_the_floor() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 60);
        let s = session(&endpoint);
        s.login(credentials(10_000));
        s.refresh().await.unwrap();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(endpoint.calls(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn login_arms_timer_from_remaining_lifetime() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 900);
        let s = session(&endpoint);
        s.login(credentials(300));

        tokio::time::sleep(Duration::from_secs(170)).await;
        assert_eq!(endpoint.calls(), 0);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_cancels_timer() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 300);
        let s = session(&endpoint);
        s.login(credentials(300));
        s.logout();

        tokio::time::sleep(Duration::from_secs(1_000)).await;
        assert_eq!(endpoint.calls(), 0);
        assert!(!s.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_during_refresh_discards_result() {
        let endpoint = MockEndpoint::new(Duration::from_millis(100), 900);
        let s = session(&endpoint);
        s.login(credentials(900));

        let pending = {
            let s = s.clone();
            tokio::spawn(async move { s.refresh().await })
        };
        tokio::task::yield_now().await;
        assert!(s.is_refreshing());
        s.logout();
        assert!(!s.is_refreshing());

        assert_eq!(pending.await.unwrap(), Err(ClientError::SessionEnded));
        assert!(s.credentials().is_none());
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn relogin_during_refresh_does_not_join_stale_flight() {
        let endpoint = MockEndpoint::new(Duration::from_millis(100), 900);
        let s = session(&endpoint);
        s.login(credentials(900));

        let stale = {
            let s = s.clone();
            tokio::spawn(async move { s.refresh().await })
        };
        tokio::task::yield_now().await;
        s.login(credentials(900));

        let fresh = s.refresh().await.unwrap();
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(stale.await.unwrap(), Err(ClientError::SessionEnded));
        assert_eq!(s.credentials().unwrap(), fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn access_token_refreshes_only_when_expiring() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 900);
        let s = session(&endpoint);

        assert_eq!(s.access_token().await, Err(ClientError::NoSession));

        s.login(credentials(900));
        assert_eq!(s.access_token().await.unwrap(), "access-0");
        assert_eq!(endpoint.calls(), 0);

        s.login(credentials(60));
        assert_eq!(s.access_token().await.unwrap(), "access-1");
        assert_eq!(endpoint.calls(), 1);
    }

    #[test]
    fn login_outside_runtime_skips_timer() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 900);
        let s = session(&endpoint);
        s.login(credentials(900));
        assert!(s.is_authenticated());
        assert!(s.inner.lock().timer.is_none());

        // The first refresh on a runtime arms the timer.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let refreshed = rt.block_on(s.refresh()).unwrap();
        assert_eq!(refreshed.access_token, "access-1");
        assert!(s.inner.lock().timer.is_some());

        s.logout();
        assert!(!s.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_event_carries_new_credentials() {
        let endpoint = MockEndpoint::new(Duration::ZERO, 900);
        let s = session(&endpoint);
        s.login(credentials(900));
        let mut events = s.subscribe();

        let creds = s.refresh().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Refreshed(creds)
        );
    }
}
