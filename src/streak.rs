//! Daily practice streak.
//!
//! A ledger of calendar days on which the simulator was launched, persisted
//! as a JSON object mapping `YYYY-MM-DD` (local time) to `"completed"`:
//!
//! ```json
//! { "2024-10-14": "completed", "2024-10-15": "completed" }
//! ```
//!
//! Per day the state only moves `unset → completed`. The streak length is
//! never stored; it is walked from the ledger on every read.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Days, Local, NaiveDate};
use log::{debug, warn};
use serde_json::Value;

use crate::store::{Store, StoreError};

/// Storage key of the persisted ledger.
pub const STORAGE_KEY: &str = "streakDays";

/// The only value a persisted day can carry.
pub const COMPLETED: &str = "completed";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of "today" in the client's local time zone.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// The system clock, local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

impl<F: Fn() -> NaiveDate> Clock for F {
    fn today(&self) -> NaiveDate {
        self()
    }
}

/// Display status of one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayStatus {
    /// Marked in the ledger.
    Completed,
    /// Today, not yet completed.
    Active,
    /// Any other day not completed, past or future.
    Inactive,
}

impl DayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DayStatus::Completed => "completed",
            DayStatus::Active => "active",
            DayStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of the seven-day strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayEntry {
    pub date: NaiveDate,
    /// Two-letter weekday label ("Mo", "Tu", ...).
    pub label: String,
    pub status: DayStatus,
}

/// Completed days, backed by a [`Store`].
///
/// Construct once per process with [`StreakLedger::load`] and pass it to
/// whoever needs it.
pub struct StreakLedger<S, C = LocalClock> {
    store: S,
    clock: C,
    days: BTreeSet<NaiveDate>,
}

impl<S: Store> StreakLedger<S, LocalClock> {
    /// Load the ledger using the system clock.
    pub fn load(store: S) -> Self {
        Self::load_with_clock(store, LocalClock)
    }
}

impl<S: Store, C: Clock> StreakLedger<S, C> {
    /// Read the persisted ledger once. An absent, unreadable or malformed
    /// value starts an empty ledger.
    pub fn load_with_clock(store: S, clock: C) -> Self {
        let days = match store.read(STORAGE_KEY) {
            Ok(Some(text)) => parse_ledger(&text).unwrap_or_else(|| {
                warn!("persisted streak ledger is malformed; starting empty");
                BTreeSet::new()
            }),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!("could not read streak ledger ({e}); starting empty");
                BTreeSet::new()
            }
        };
        debug!("loaded {} completed day(s)", days.len());
        Self { store, clock, days }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn is_completed(&self, date: NaiveDate) -> bool {
        self.days.contains(&date)
    }

    pub fn day_status(&self, date: NaiveDate) -> DayStatus {
        if self.is_completed(date) {
            DayStatus::Completed
        } else if date == self.today() {
            DayStatus::Active
        } else {
            DayStatus::Inactive
        }
    }

    /// Mark today completed and persist the whole ledger before returning.
    ///
    /// Idempotent. On a storage error the in-memory ledger is left unchanged.
    pub fn mark_today(&mut self) -> Result<(), StoreError> {
        let today = self.today();
        if self.days.contains(&today) {
            return Ok(());
        }

        let mut next = self.days.clone();
        next.insert(today);
        let text = encode_ledger(&next).map_err(|source| StoreError::Encode {
            key: STORAGE_KEY.to_owned(),
            source,
        })?;
        self.store.write(STORAGE_KEY, &text)?;
        self.days = next;
        debug!("marked {today} completed");
        Ok(())
    }

    /// Consecutive completed days ending today; 0 if today is not completed.
    pub fn current_streak(&self) -> u32 {
        let mut streak = 0;
        let mut day = Some(self.today());
        while let Some(d) = day
            && self.days.contains(&d)
        {
            streak += 1;
            day = d.pred_opt();
        }
        streak
    }

    /// The seven dates ending today, oldest first.
    pub fn last_seven_days(&self) -> [NaiveDate; 7] {
        let today = self.today();
        std::array::from_fn(|i| {
            today
                .checked_sub_days(Days::new((6 - i) as u64))
                .unwrap_or(NaiveDate::MIN)
        })
    }

    /// The seven-day strip with labels and statuses.
    pub fn week(&self) -> Vec<DayEntry> {
        self.last_seven_days()
            .into_iter()
            .map(|date| DayEntry {
                date,
                label: date.format("%a").to_string().chars().take(2).collect(),
                status: self.day_status(date),
            })
            .collect()
    }

    /// Completed days, oldest first.
    pub fn completed_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.iter().copied()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Parse a persisted ledger.
///
/// Returns `None` unless the text is a JSON object. Entries whose key is not
/// a `YYYY-MM-DD` date or whose value is not `"completed"` are skipped.
pub fn parse_ledger(text: &str) -> Option<BTreeSet<NaiveDate>> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    let total = map.len();
    let days: BTreeSet<NaiveDate> = map
        .into_iter()
        .filter(|(_, v)| v.as_str() == Some(COMPLETED))
        .filter_map(|(k, _)| NaiveDate::parse_from_str(&k, DATE_FORMAT).ok())
        .collect();
    if days.len() != total {
        debug!("skipped {} unrecognised ledger entr(ies)", total - days.len());
    }
    Some(days)
}

/// Encode completed days in the persisted format.
pub fn encode_ledger(days: &BTreeSet<NaiveDate>) -> Result<String, serde_json::Error> {
    let map: BTreeMap<String, &str> = days
        .iter()
        .map(|d| (d.format(DATE_FORMAT).to_string(), COMPLETED))
        .collect();
    serde_json::to_string(&map)
}
