pub mod coach;
pub mod config;
pub mod conn;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod store;
pub mod streak;
pub mod view;

pub use coach::{CoachError, CoachTransport, CoachingDesk, CoachingState, HttpCoach, Token};
pub use config::{ClientConfig, ConfigError};
pub use conn::{Feed, Inbound, SessionError, WsFeed};
pub use error::DecodeError;
pub use protocol::{Frame, Stats, Update};
pub use session::{Session, SessionStats, Snapshot};
pub use store::{FileStore, MemoryStore, Store, StoreError};
pub use streak::{DayStatus, StreakLedger};
pub use view::Dashboard;
