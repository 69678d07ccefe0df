//! Coaching comments from the remote inference service.
//!
//! Each request is tagged with a [`Token`]. Round trips run on a worker
//! thread and cannot be cancelled; instead the [`CoachingDesk`] applies a
//! completion only if its token is the most recently issued one. A slow
//! response to an old trigger is dropped even if it lands after the newer
//! one.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use crate::protocol::coaching::{self, CoachingRequest, ShapeError};

/// Default coaching service endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "https://foresights-backend-720652506362.us-central1.run.app/ai/generate-description";

/// Default whole-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum CoachError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Shape(#[from] ShapeError),

    #[error("could not start request: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One request/response exchange with the coaching service.
pub trait CoachTransport: Send + Sync + 'static {
    /// Perform the round trip, returning the description text.
    fn describe(&self, request: &CoachingRequest) -> Result<String, CoachError>;
}

/// JSON-over-HTTP coaching client.
#[derive(Debug, Clone)]
pub struct HttpCoach {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpCoach {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CoachError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CoachTransport for HttpCoach {
    fn describe(&self, request: &CoachingRequest) -> Result<String, CoachError> {
        let response = self.client.post(&self.endpoint).json(request).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(CoachError::Status { status: status.as_u16(), body });
        }
        Ok(coaching::extract_text(&body)?)
    }
}

/// Identifies one coaching trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the coaching area shows.
#[derive(Debug)]
pub enum CoachingState {
    /// Nothing requested yet.
    Idle,
    /// Waiting for the response to `token`.
    Loading { token: Token },
    Ready { token: Token, text: String },
    Failed { token: Token, error: CoachError },
}

impl CoachingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, CoachingState::Loading { .. })
    }

    /// Description text, only in the `Ready` state.
    pub fn text(&self) -> Option<&str> {
        match self {
            CoachingState::Ready { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CoachError> {
        match self {
            CoachingState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

struct Completion {
    token: Token,
    result: Result<String, CoachError>,
}

/// Issues coaching requests and keeps the loading/error/result state for the
/// latest trigger.
///
/// Lives on the presentation thread. Completions are applied only from
/// [`poll()`](Self::poll) and [`wait()`](Self::wait), never from the worker
/// threads.
pub struct CoachingDesk<T: CoachTransport = HttpCoach> {
    transport: Arc<T>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    latest: Option<Token>,
    state: CoachingState,
    strip_quotes: bool,
    stale: u64,
}

impl<T: CoachTransport> CoachingDesk<T> {
    pub fn new(transport: T) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            transport: Arc::new(transport),
            tx,
            rx,
            latest: None,
            state: CoachingState::Idle,
            strip_quotes: false,
            stale: 0,
        }
    }

    /// Strip `"` characters from description text before display.
    pub fn with_strip_quotes(mut self, strip: bool) -> Self {
        self.strip_quotes = strip;
        self
    }

    /// A token greater than any issued so far.
    pub fn next_token(&self) -> Token {
        Token(self.latest.map_or(1, |t| t.0 + 1))
    }

    /// The most recently issued token.
    pub fn latest_token(&self) -> Option<Token> {
        self.latest
    }

    /// Start a request for the given swing. Returns immediately; the state is
    /// `Loading` until this token's response is applied. Any earlier
    /// in-flight request keeps running but its response will be discarded.
    pub fn request(&mut self, speed: f64, angle: f64, token: Token) {
        self.latest = Some(token);
        self.state = CoachingState::Loading { token };

        let body = CoachingRequest { speed, degrees: angle };
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        debug!("coaching request {token}: {body:?}");
        let spawned = thread::Builder::new()
            .name(format!("coach-{}", token.0))
            .spawn(move || {
                let result = transport.describe(&body);
                // The desk may be gone; nothing left to notify.
                let _ = tx.send(Completion { token, result });
            });
        if let Err(e) = spawned {
            self.apply(token, Err(CoachError::Spawn(e)));
        }
    }

    /// Start a request with the next token unless one is already loading.
    ///
    /// Keeps at most one round trip in flight for callers that trigger on
    /// every new reading. Returns the issued token.
    pub fn request_if_idle(&mut self, speed: f64, angle: f64) -> Option<Token> {
        if self.poll().is_loading() {
            return None;
        }
        let token = self.next_token();
        self.request(speed, angle, token);
        Some(token)
    }

    /// Apply every completion that has arrived, without blocking.
    pub fn poll(&mut self) -> &CoachingState {
        while let Ok(c) = self.rx.try_recv() {
            self.apply(c.token, c.result);
        }
        &self.state
    }

    /// Block up to `timeout` for the latest request to resolve.
    ///
    /// Returns the state as of the deadline; it may still be `Loading`.
    pub fn wait(&mut self, timeout: Duration) -> &CoachingState {
        let deadline = Instant::now() + timeout;
        self.poll();
        while self.state.is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(c) => {
                    self.apply(c.token, c.result);
                }
                Err(RecvTimeoutError::Timeout) => break,
                // Unreachable while the desk holds a sender.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        &self.state
    }

    /// Apply a completion for `token`. Returns `false` (and leaves the state
    /// alone) if `token` is not the latest issued token.
    pub fn apply(&mut self, token: Token, result: Result<String, CoachError>) -> bool {
        if self.latest != Some(token) {
            self.stale += 1;
            debug!("discarding stale coaching response {token}");
            return false;
        }
        self.state = match result {
            Ok(text) => {
                let text = if self.strip_quotes { coaching::strip_quotes(&text) } else { text };
                CoachingState::Ready { token, text }
            }
            Err(error) => {
                warn!("coaching request {token} failed: {error}");
                CoachingState::Failed { token, error }
            }
        };
        true
    }

    pub fn state(&self) -> &CoachingState {
        &self.state
    }

    /// Consume the desk, keeping only its current state.
    pub fn into_state(self) -> CoachingState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Number of completions discarded because a newer trigger was issued.
    pub fn stale_discarded(&self) -> u64 {
        self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers "speed <n>" for a request, but only once its gate is opened.
    /// Requests are keyed by their integer speed.
    struct GatedCoach {
        gates: Mutex<HashMap<u64, Receiver<Result<(), ()>>>>,
    }

    impl GatedCoach {
        fn new(keys: &[u64]) -> (Self, HashMap<u64, Sender<Result<(), ()>>>) {
            let mut gates = HashMap::new();
            let mut openers = HashMap::new();
            for &k in keys {
                let (tx, rx) = mpsc::channel();
                gates.insert(k, rx);
                openers.insert(k, tx);
            }
            (Self { gates: Mutex::new(gates) }, openers)
        }
    }

    impl CoachTransport for GatedCoach {
        fn describe(&self, request: &CoachingRequest) -> Result<String, CoachError> {
            let key = request.speed as u64;
            let gate = self.gates.lock().unwrap().remove(&key).expect("unknown request");
            match gate.recv().unwrap() {
                Ok(()) => Ok(format!("speed {key}")),
                Err(()) => Err(CoachError::Status { status: 503, body: "busy".into() }),
            }
        }
    }

    /// Resolves immediately with a fixed answer.
    struct Fixed(&'static str);

    impl CoachTransport for Fixed {
        fn describe(&self, _: &CoachingRequest) -> Result<String, CoachError> {
            Ok(self.0.to_owned())
        }
    }

    fn poll_until<T: CoachTransport>(
        desk: &mut CoachingDesk<T>,
        done: impl Fn(&CoachingDesk<T>) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(&*desk) {
            assert!(Instant::now() < deadline, "timed out");
            desk.poll();
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn idle_before_first_trigger() {
        let desk = CoachingDesk::new(Fixed("x"));
        assert!(matches!(desk.state(), CoachingState::Idle));
        assert_eq!(desk.next_token(), Token(1));
    }

    #[test]
    fn loading_until_response_applied() {
        let (coach, openers) = GatedCoach::new(&[40]);
        let mut desk = CoachingDesk::new(coach);
        desk.request(40.0, 15.0, Token(1));
        assert!(desk.poll().is_loading());

        openers[&40].send(Ok(())).unwrap();
        let state = desk.wait(Duration::from_secs(5));
        assert_eq!(state.text(), Some("speed 40"));
        assert!(!desk.is_loading());
    }

    #[test]
    fn stale_response_discarded() {
        let (coach, openers) = GatedCoach::new(&[1, 2]);
        let mut desk = CoachingDesk::new(coach);
        desk.request(1.0, 10.0, Token(1));
        desk.request(2.0, 10.0, Token(2));

        // T2 resolves first.
        openers[&2].send(Ok(())).unwrap();
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("speed 2"));

        // T1 lands afterwards and must not overwrite T2.
        openers[&1].send(Ok(())).unwrap();
        poll_until(&mut desk, |d| d.stale_discarded() == 1);
        assert_eq!(desk.state().text(), Some("speed 2"));
    }

    #[test]
    fn stale_response_discarded_while_newer_still_loading() {
        let (coach, openers) = GatedCoach::new(&[1, 2]);
        let mut desk = CoachingDesk::new(coach);
        desk.request(1.0, 10.0, Token(1));
        desk.request(2.0, 10.0, Token(2));

        openers[&1].send(Ok(())).unwrap();
        poll_until(&mut desk, |d| d.stale_discarded() == 1);
        assert!(matches!(desk.state(), CoachingState::Loading { token: Token(2) }));

        openers[&2].send(Ok(())).unwrap();
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("speed 2"));
    }

    #[test]
    fn failure_is_a_resolved_state() {
        let (coach, openers) = GatedCoach::new(&[7]);
        let mut desk = CoachingDesk::new(coach);
        desk.request(7.0, 0.0, Token(3));
        openers[&7].send(Err(())).unwrap();

        let state = desk.wait(Duration::from_secs(5));
        assert!(matches!(state, CoachingState::Failed { token: Token(3), .. }));
        assert_eq!(state.text(), None);
        assert_eq!(
            state.error().map(|e| e.to_string()).as_deref(),
            Some("service returned 503: busy")
        );
    }

    #[test]
    fn new_trigger_after_failure_retries() {
        let mut desk = CoachingDesk::new(Fixed("ok"));
        // Nothing issued yet, so nothing can be current.
        assert!(!desk.apply(Token(1), Ok("ignored".into())));
        desk.request(1.0, 1.0, Token(1));
        assert!(desk.apply(Token(1), Err(CoachError::Status { status: 500, body: String::new() })));
        assert!(desk.state().error().is_some());

        let token = desk.next_token();
        assert_eq!(token, Token(2));
        desk.request(1.0, 1.0, token);
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("ok"));
    }

    #[test]
    fn request_if_idle_keeps_one_in_flight() {
        let (coach, openers) = GatedCoach::new(&[1, 2]);
        let mut desk = CoachingDesk::new(coach);
        assert_eq!(desk.request_if_idle(1.0, 10.0), Some(Token(1)));
        // A burst of new readings while loading spawns nothing.
        for _ in 0..10 {
            assert_eq!(desk.request_if_idle(2.0, 10.0), None);
        }
        assert_eq!(desk.latest_token(), Some(Token(1)));

        openers[&1].send(Ok(())).unwrap();
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("speed 1"));

        assert_eq!(desk.request_if_idle(2.0, 10.0), Some(Token(2)));
        openers[&2].send(Ok(())).unwrap();
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("speed 2"));
        assert_eq!(desk.stale_discarded(), 0);
    }

    #[test]
    fn wait_times_out_while_loading() {
        let (coach, openers) = GatedCoach::new(&[5]);
        let mut desk = CoachingDesk::new(coach);
        desk.request(5.0, 0.0, Token(1));
        assert!(desk.wait(Duration::from_millis(20)).is_loading());
        openers[&5].send(Ok(())).unwrap();
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("speed 5"));
    }

    #[test]
    fn text_verbatim_unless_stripping() {
        let mut desk = CoachingDesk::new(Fixed(r#"Try a "square" face"#));
        desk.request(1.0, 1.0, Token(1));
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some(r#"Try a "square" face"#));

        let mut desk = CoachingDesk::new(Fixed(r#"Try a "square" face"#)).with_strip_quotes(true);
        desk.request(1.0, 1.0, Token(1));
        assert_eq!(desk.wait(Duration::from_secs(5)).text(), Some("Try a square face"));
    }
}
