//! Reusable test helpers for integration tests.
//!
//! Provides a scripted [`FakeEngine`] standing in for the WebRTC stack, a
//! [`TestApp`] for `tower::ServiceExt::oneshot` requests through the full
//! router, and [`spawn_relay`] for tests that need a real listener and
//! WebSocket clients.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;
use vc_relay::api::{create_router, AppState};
use vc_relay::config::Config;
use vc_relay::voice::{
    CandidateInit, EventSink, PayloadChannel, PayloadHandler, PeerSession, RelayServer,
    SessionDescription, SessionEngine, SessionEvent, SessionState, Signal, VoiceError,
};

/// How long to wait for something asynchronous before failing a test.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Offer SDP the fake engine refuses.
pub const BAD_OFFER: &str = "not an sdp";

// ============================================================================
// Fake engine
// ============================================================================

/// Engine that records what the relay asks of it.
#[derive(Default)]
pub struct FakeEngine {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    /// Delay inside `create_answer`, to hold a client mid-negotiation.
    answer_delay: Mutex<Option<Duration>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_answer_delay(&self, delay: Duration) {
        *self.answer_delay.lock().unwrap() = Some(delay);
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    /// Wait until `count` sessions exist and return the last one.
    pub async fn wait_for_session(&self, count: usize) -> Arc<FakeSession> {
        wait_for(|| self.sessions.lock().unwrap().len() >= count).await;
        self.sessions()[count - 1].clone()
    }
}

#[async_trait]
impl SessionEngine for FakeEngine {
    async fn create_session(&self, events: EventSink) -> Result<Arc<dyn PeerSession>, VoiceError> {
        let delay = *self.answer_delay.lock().unwrap();
        let session = Arc::new(FakeSession::new(events, delay));
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }
}

/// One fake peer session.
pub struct FakeSession {
    events: EventSink,
    answer_delay: Option<Duration>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote_candidates: Mutex<Vec<CandidateInit>>,
    pub requested_channels: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl FakeSession {
    fn new(events: EventSink, answer_delay: Option<Duration>) -> Self {
        Self {
            events,
            answer_delay,
            remote: Mutex::new(None),
            local: Mutex::new(None),
            remote_candidates: Mutex::new(Vec::new()),
            requested_channels: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate the remote side opening a channel with `label`.
    pub async fn open_channel(&self, label: &str) -> Arc<FakeChannel> {
        let channel = Arc::new(FakeChannel::new(label));
        assert!(
            self.events
                .send(SessionEvent::ChannelOpened(channel.clone()))
                .await
        );
        channel
    }

    /// Simulate a connection state change reported by the engine.
    pub async fn report_state(&self, state: SessionState) {
        assert!(self.events.send(SessionEvent::StateChanged(state)).await);
    }
}

pub fn fake_candidate(n: u16) -> CandidateInit {
    CandidateInit {
        candidate: format!("candidate:{n} 1 udp 2130706431 10.0.0.1 5000{n} typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

#[async_trait]
impl PeerSession for FakeSession {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<(), VoiceError> {
        if offer.sdp == BAD_OFFER {
            return Err(VoiceError::WebRtc("unparseable offer".into()));
        }
        *self.remote.lock().unwrap() = Some(offer);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, VoiceError> {
        if let Some(delay) = self.answer_delay {
            tokio::time::sleep(delay).await;
        }
        let offer = self.remote.lock().unwrap().clone();
        let offer_sdp = offer.map(|o| o.sdp).unwrap_or_default();
        Ok(SessionDescription::answer(format!("answer-to:{offer_sdp}")))
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<(), VoiceError> {
        *self.local.lock().unwrap() = Some(answer);
        // Gathering starts once the local description is set.
        for n in 1..=2 {
            let _ = self
                .events
                .send(SessionEvent::LocalCandidate(Some(fake_candidate(n))))
                .await;
        }
        let _ = self.events.send(SessionEvent::LocalCandidate(None)).await;
        Ok(())
    }

    async fn create_payload_channel(&self, label: &str) -> Result<(), VoiceError> {
        self.requested_channels.lock().unwrap().push(label.to_owned());
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), VoiceError> {
        self.remote_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), VoiceError> {
        // Like a real peer connection, closing reports a final state change.
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.events
                .try_send(SessionEvent::StateChanged(SessionState::Closed));
        }
        Ok(())
    }
}

/// Payload channel that records sends and lets tests inject payloads.
pub struct FakeChannel {
    label: String,
    pub sent: Mutex<Vec<Bytes>>,
    handler: Mutex<Option<PayloadHandler>>,
    pub closed: AtomicBool,
}

impl FakeChannel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver a payload as if the client had sent it on this channel.
    pub fn deliver(&self, payload: &'static [u8]) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(Bytes::from_static(payload));
        }
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayloadChannel for FakeChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, payload: &Bytes) -> Result<(), VoiceError> {
        if self.is_closed() {
            return Err(VoiceError::Channel {
                label: self.label.clone(),
                reason: "closed".into(),
            });
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn on_payload(&self, handler: PayloadHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn close(&self) -> Result<(), VoiceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub engine: Arc<FakeEngine>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default_for_test())
    }

    pub fn with_config(config: Config) -> Self {
        let engine = FakeEngine::new();
        let relay = Arc::new(RelayServer::new(&config, engine.clone()));
        let state = AppState::new(config, relay);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            engine,
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

/// Read a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

// ============================================================================
// Test servers
// ============================================================================

/// A relay listening on an ephemeral port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub state: AppState,
    pub engine: Arc<FakeEngine>,
    _handle: JoinHandle<()>,
}

/// Start the full router on `127.0.0.1:0` backed by a [`FakeEngine`].
pub async fn spawn_relay() -> TestRelay {
    let app = TestApp::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let router = app.router;
    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestRelay {
        addr,
        state: app.state,
        engine: app.engine,
        _handle: handle,
    }
}

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl TestRelay {
    pub fn relay(&self) -> &Arc<RelayServer> {
        &self.state.relay
    }

    pub fn connect_url(&self, token: &str) -> String {
        format!("ws://{}/connect?token={token}", self.addr)
    }

    /// Issue a token and open a signaling connection with it.
    ///
    /// Returns once the client is registered.
    pub async fn connect(&self) -> (WsClient, String) {
        let token = self.state.tokens.issue();
        let (ws, _) = tokio_tungstenite::connect_async(self.connect_url(&token))
            .await
            .expect("WebSocket connect failed");
        let relay = Arc::clone(self.relay());
        let id = token.clone();
        wait_for_async(|| {
            let relay = Arc::clone(&relay);
            let id = id.clone();
            async move { relay.registry().get_client(&id).await.is_some() }
        })
        .await;
        (ws, token)
    }
}

// ============================================================================
// WebSocket client helpers
// ============================================================================

pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_owned().into()))
        .await
        .expect("WebSocket send failed");
}

pub async fn send_signal(ws: &mut WsClient, signal: &Signal) {
    send_text(ws, &signal.encode()).await;
}

/// Next signaling message from the server, skipping control frames.
pub async fn recv_signal(ws: &mut WsClient) -> Signal {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for a signal")
            .expect("WebSocket closed")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return Signal::decode(text.as_str())
                .expect("Server sent malformed signal")
                .expect("Server sent unknown signal kind");
        }
    }
}

/// Whether the server closes the socket within [`TIMEOUT`].
pub async fn closed_by_server(ws: &mut WsClient) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return false,
            Ok(None | Some(Err(_) | Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => {}
        }
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met within {TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Async variant of [`wait_for`].
pub async fn wait_for_async<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met within {TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
