//! Telemetry session: one push connection and the latest snapshot.
//!
//! The session owns the connection and a single snapshot cell. Each inbound
//! message is decoded in full and then applied to the cell in one step:
//!
//! 1. Images always replace the previous ones.
//! 2. `speed` and `launch_angle` replace the previous value only when present
//!    in the message; an absent field keeps its last-known-good value.
//! 3. A message that fails to decode changes nothing.
//!
//! Connection loss is terminal: the connection is released and the caller
//! must open a new session. There is no automatic reconnect.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

use crate::conn::{Feed, Inbound, SessionError, WsFeed};
use crate::metrics;
use crate::protocol::{Frame, Update};

/// The most recent telemetry reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Club-head speed (m/s); `None` until first received.
    pub speed: Option<f64>,
    /// Launch angle (deg); `None` until first received.
    pub launch_angle: Option<f64>,
    pub image: Frame,
    pub depth_image: Frame,
}

impl Snapshot {
    /// Apply `update` on top of `prev`, field by field.
    pub fn merge(prev: Option<&Snapshot>, update: Update) -> Snapshot {
        Snapshot {
            speed: update.stats.speed.or(prev.and_then(|p| p.speed)),
            launch_angle: update.stats.launch_angle.or(prev.and_then(|p| p.launch_angle)),
            image: update.image,
            depth_image: update.depth_image,
        }
    }

    /// Projected ball speed, `None` until a speed has been received.
    pub fn ball_speed(&self) -> Option<f64> {
        metrics::projected_ball_speed(self.speed)
    }

    /// Projected carry (yd), `None` until both stats have been received.
    pub fn carry_distance(&self) -> Option<f64> {
        metrics::projected_carry_distance(self.speed, self.launch_angle)
    }
}

/// Message counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Messages decoded and applied to the snapshot.
    pub applied: u64,
    /// Messages discarded as malformed.
    pub rejected: u64,
}

/// A telemetry session over a push [`Feed`].
///
/// Synchronous, single-threaded. The caller drives delivery with
/// [`recv()`](Self::recv) / [`recv_timeout()`](Self::recv_timeout) or hands
/// control to [`run()`](Self::run); registered callbacks fire from inside
/// those calls.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use foresights::{Session, SessionError};
///
/// let mut session = Session::open(foresights::conn::DEFAULT_ENDPOINT)?;
/// loop {
///     match session.recv_timeout(Duration::from_secs(5)) {
///         Ok(snap) => println!("{:?} -> {:?} yd", snap.speed, snap.carry_distance()),
///         Err(e) if !e.is_terminal() => eprintln!("{e}"),
///         Err(e) => return Err(e),
///     }
/// }
/// # Ok::<(), SessionError>(())
/// ```
pub struct Session<F: Feed = WsFeed> {
    /// `None` once closed, by the caller or by a terminal fault.
    feed: Option<F>,
    latest: Option<Snapshot>,
    stats: SessionStats,
    /// Called with every raw data message before decoding.
    on_message: Option<Box<dyn FnMut(&Inbound)>>,
    /// Called after each applied message with the new snapshot.
    on_snapshot: Option<Box<dyn FnMut(&Snapshot)>>,
    /// Called for every reported fault, terminal or not.
    on_fault: Option<Box<dyn FnMut(&SessionError)>>,
}

impl Session<WsFeed> {
    /// Open a session on a `ws://` endpoint.
    pub fn open(endpoint: &str) -> Result<Self, SessionError> {
        Ok(Self::from_feed(WsFeed::connect(endpoint)?))
    }

    /// Open with an explicit connect + handshake timeout.
    pub fn open_timeout(endpoint: &str, timeout: Duration) -> Result<Self, SessionError> {
        Ok(Self::from_feed(WsFeed::connect_timeout(endpoint, timeout)?))
    }
}

impl<F: Feed> Session<F> {
    /// Wrap an already-open feed.
    pub fn from_feed(feed: F) -> Self {
        Self {
            feed: Some(feed),
            latest: None,
            stats: SessionStats::default(),
            on_message: None,
            on_snapshot: None,
            on_fault: None,
        }
    }

    /// Register a callback invoked with every raw data message.
    pub fn set_on_message(&mut self, f: impl FnMut(&Inbound) + 'static) {
        self.on_message = Some(Box::new(f));
    }

    /// Register a callback invoked after every applied message.
    pub fn set_on_snapshot(&mut self, f: impl FnMut(&Snapshot) + 'static) {
        self.on_snapshot = Some(Box::new(f));
    }

    /// Register a callback invoked for every fault (malformed message,
    /// timeout, connection loss).
    pub fn set_on_fault(&mut self, f: impl FnMut(&SessionError) + 'static) {
        self.on_fault = Some(Box::new(f));
    }

    /// Whether the connection is still held.
    pub fn is_open(&self) -> bool {
        self.feed.is_some()
    }

    /// The last valid snapshot, kept after the session closes.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Block until the next message is applied or a fault occurs.
    pub fn recv(&mut self) -> Result<&Snapshot, SessionError> {
        self.recv_inner(None)
    }

    /// Block up to `timeout` for the next message.
    ///
    /// `SessionError::Timeout` is reported but leaves the session open.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<&Snapshot, SessionError> {
        self.recv_inner(Some(timeout))
    }

    /// Deliver messages until the session terminates; returns the terminal
    /// fault. Malformed messages are reported through `on_fault` and skipped.
    pub fn run(&mut self) -> SessionError {
        loop {
            match self.recv() {
                Ok(_) => {}
                Err(e) if !e.is_terminal() => {}
                Err(e) => return e,
            }
        }
    }

    /// Apply an already-decoded update to the snapshot cell.
    pub fn apply(&mut self, update: Update) -> &Snapshot {
        let merged = Snapshot::merge(self.latest.as_ref(), update);
        self.stats.applied += 1;
        debug!(
            "snapshot #{}: speed={:?} angle={:?} image={:?}",
            self.stats.applied, merged.speed, merged.launch_angle, merged.image,
        );
        let snapshot: &Snapshot = self.latest.insert(merged);
        if let Some(cb) = self.on_snapshot.as_mut() {
            cb(snapshot);
        }
        snapshot
    }

    /// Release the connection. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.close();
            info!(
                "session closed ({} applied, {} rejected)",
                self.stats.applied, self.stats.rejected,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn recv_inner(&mut self, timeout: Option<Duration>) -> Result<&Snapshot, SessionError> {
        let feed = self.feed.as_mut().ok_or(SessionError::Closed)?;
        let inbound = match feed.recv(timeout) {
            Ok(inbound) => inbound,
            Err(e) => return Err(self.fault(e)),
        };
        if let Some(cb) = self.on_message.as_mut() {
            cb(&inbound);
        }

        let decoded = match &inbound {
            Inbound::Text(text) => Update::decode(text),
            Inbound::Binary(data) => Update::decode_bytes(data),
        };
        match decoded {
            Ok(update) => Ok(self.apply(update)),
            Err(e) => {
                self.stats.rejected += 1;
                Err(self.fault(SessionError::Decode(e)))
            }
        }
    }

    /// Report a fault; terminal faults release the connection first.
    fn fault(&mut self, e: SessionError) -> SessionError {
        if e.is_terminal() {
            warn!("session terminated: {e}");
            self.close();
        } else {
            warn!("{e}");
        }
        if let Some(cb) = self.on_fault.as_mut() {
            cb(&e);
        }
        e
    }
}

impl<F: Feed> Drop for Session<F> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<F: Feed> fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("latest", &self.latest)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use crate::error::DecodeError;

    /// Replays a fixed script, then reports the backend as gone.
    struct ScriptedFeed {
        script: VecDeque<Result<Inbound, SessionError>>,
        closes: Rc<Cell<u32>>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Result<Inbound, SessionError>>) -> (Self, Rc<Cell<u32>>) {
            let closes = Rc::new(Cell::new(0));
            let feed = Self { script: script.into(), closes: Rc::clone(&closes) };
            (feed, closes)
        }
    }

    impl Feed for ScriptedFeed {
        fn recv(&mut self, _timeout: Option<Duration>) -> Result<Inbound, SessionError> {
            self.script.pop_front().unwrap_or(Err(SessionError::Disconnected))
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    fn text(json: &str) -> Result<Inbound, SessionError> {
        Ok(Inbound::Text(json.to_owned()))
    }

    fn msg(stats: &str) -> Result<Inbound, SessionError> {
        text(&format!(r#"{{"image":"/9j/4A==","depth_image":"AAEC","stats":{stats}}}"#))
    }

    #[test]
    fn first_message_populates_snapshot() {
        let (feed, _) = ScriptedFeed::new(vec![msg(r#"{"speed":40,"launch_angle":15}"#)]);
        let mut session = Session::from_feed(feed);
        assert!(session.latest().is_none());

        let snap = session.recv().unwrap();
        assert_eq!(snap.speed, Some(40.0));
        assert_eq!(snap.launch_angle, Some(15.0));
        assert_eq!(snap.ball_speed(), Some(26.67));
        assert_eq!(snap.carry_distance(), Some(89.18));
        assert_eq!(snap.image.len(), 4);
    }

    #[test]
    fn omitted_field_keeps_last_known_good() {
        let (feed, _) = ScriptedFeed::new(vec![
            msg(r#"{"speed":10,"launch_angle":5}"#),
            msg(r#"{"speed":12}"#),
            msg(r#"{"launch_angle":7}"#),
            msg("{}"),
        ]);
        let mut session = Session::from_feed(feed);
        session.recv().unwrap();

        let snap = session.recv().unwrap();
        assert_eq!((snap.speed, snap.launch_angle), (Some(12.0), Some(5.0)));
        let snap = session.recv().unwrap();
        assert_eq!((snap.speed, snap.launch_angle), (Some(12.0), Some(7.0)));
        let snap = session.recv().unwrap();
        assert_eq!((snap.speed, snap.launch_angle), (Some(12.0), Some(7.0)));
    }

    #[test]
    fn stats_unset_until_received() {
        let (feed, _) = ScriptedFeed::new(vec![msg(r#"{"launch_angle":5}"#)]);
        let mut session = Session::from_feed(feed);
        let snap = session.recv().unwrap();
        assert_eq!(snap.speed, None);
        assert_eq!(snap.ball_speed(), None);
        assert_eq!(snap.carry_distance(), None);
    }

    #[test]
    fn images_always_replace() {
        let (feed, _) = ScriptedFeed::new(vec![
            msg(r#"{"speed":1}"#),
            text(r#"{"image":"","depth_image":"","stats":{}}"#),
        ]);
        let mut session = Session::from_feed(feed);
        session.recv().unwrap();
        let snap = session.recv().unwrap();
        assert!(snap.image.is_empty());
        assert!(snap.depth_image.is_empty());
        assert_eq!(snap.speed, Some(1.0));
    }

    #[test]
    fn malformed_message_keeps_previous_snapshot() {
        let (feed, closes) = ScriptedFeed::new(vec![
            msg(r#"{"speed":10,"launch_angle":5}"#),
            text("not json"),
            text(r#"{"image":"","stats":{"speed":99}}"#),
            msg(r#"{"speed":11}"#),
        ]);
        let mut session = Session::from_feed(feed);
        let before = session.recv().unwrap().clone();

        let err = session.recv().unwrap_err();
        assert!(matches!(err, SessionError::Decode(DecodeError::Json { .. })));
        assert_eq!(session.latest(), Some(&before));

        let err = session.recv().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Decode(DecodeError::MissingImage { field: "depth_image" })
        ));
        assert_eq!(session.latest(), Some(&before));
        assert!(session.is_open());
        assert_eq!(closes.get(), 0);

        assert_eq!(session.recv().unwrap().speed, Some(11.0));
        assert_eq!(session.stats(), SessionStats { applied: 2, rejected: 2 });
    }

    #[test]
    fn timeout_is_not_terminal() {
        let (feed, closes) = ScriptedFeed::new(vec![
            Err(SessionError::Timeout { timeout: Duration::from_millis(5) }),
            msg(r#"{"speed":3}"#),
        ]);
        let mut session = Session::from_feed(feed);
        assert!(matches!(
            session.recv_timeout(Duration::from_millis(5)),
            Err(SessionError::Timeout { .. })
        ));
        assert!(session.is_open());
        assert_eq!(closes.get(), 0);
        assert_eq!(session.recv().unwrap().speed, Some(3.0));
    }

    #[test]
    fn disconnect_releases_connection_once() {
        let (feed, closes) = ScriptedFeed::new(vec![msg(r#"{"speed":3}"#)]);
        let mut session = Session::from_feed(feed);
        session.recv().unwrap();

        assert!(matches!(session.recv(), Err(SessionError::Disconnected)));
        assert!(!session.is_open());
        assert_eq!(closes.get(), 1);

        // Later calls report the closed session; the snapshot stays readable.
        assert!(matches!(session.recv(), Err(SessionError::Closed)));
        assert_eq!(session.latest().and_then(|s| s.speed), Some(3.0));
        drop(session);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn explicit_close_then_drop_releases_once() {
        let (feed, closes) = ScriptedFeed::new(vec![]);
        let mut session = Session::from_feed(feed);
        session.close();
        session.close();
        drop(session);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn drop_releases_connection() {
        let (feed, closes) = ScriptedFeed::new(vec![]);
        drop(Session::from_feed(feed));
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn callbacks_fire_in_arrival_order() {
        let (feed, closes) = ScriptedFeed::new(vec![
            msg(r#"{"speed":1}"#),
            text("garbage"),
            msg(r#"{"speed":2}"#),
        ]);
        let speeds = Rc::new(RefCell::new(Vec::new()));
        let faults = Rc::new(RefCell::new(Vec::new()));
        let raw = Rc::new(Cell::new(0));

        let mut session = Session::from_feed(feed);
        let s = Rc::clone(&speeds);
        session.set_on_snapshot(move |snap| s.borrow_mut().push(snap.speed));
        let f = Rc::clone(&faults);
        session.set_on_fault(move |e| f.borrow_mut().push(e.is_terminal()));
        let r = Rc::clone(&raw);
        session.set_on_message(move |_| r.set(r.get() + 1));

        let terminal = session.run();
        assert!(matches!(terminal, SessionError::Disconnected));
        assert_eq!(*speeds.borrow(), vec![Some(1.0), Some(2.0)]);
        assert_eq!(*faults.borrow(), vec![false, true]);
        assert_eq!(raw.get(), 3);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn binary_messages_decoded() {
        let (feed, _) = ScriptedFeed::new(vec![Ok(Inbound::Binary(
            br#"{"image":"","depth_image":"","stats":{"speed":4}}"#.to_vec(),
        ))]);
        let mut session = Session::from_feed(feed);
        assert_eq!(session.recv().unwrap().speed, Some(4.0));
    }
}
