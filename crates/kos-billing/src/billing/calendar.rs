//! Due-date arithmetic. Everything here is pure apart from [`SystemClock`].

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BillingPeriod, NotificationTier};

/// How day distances map onto notification tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierPolicy {
    /// Fire only on the boundary day itself (d == 7, 3, 0) or once overdue.
    /// A scan that misses a boundary day never emits that tier.
    #[default]
    ExactDay,
    /// Treat each tier as a window so a late scan still emits the current tier.
    CatchUp,
}

impl TierPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exact" | "exact_day" => Some(Self::ExactDay),
            "catch_up" | "range" => Some(Self::CatchUp),
            _ => None,
        }
    }

    pub fn classify(self, days_until_due: i64) -> Option<NotificationTier> {
        match self {
            Self::ExactDay => match days_until_due {
                d if d < 0 => Some(NotificationTier::Overdue),
                0 => Some(NotificationTier::DueToday),
                3 => Some(NotificationTier::DueSoon3),
                7 => Some(NotificationTier::DueSoon7),
                _ => None,
            },
            Self::CatchUp => bucket(days_until_due),
        }
    }
}

/// Due date of a billing period: the last calendar day of its month.
pub fn due_date(period: BillingPeriod) -> NaiveDate {
    period.last_day()
}

/// Whole days from `today` until the period's due date; negative once overdue.
pub fn days_until_due(period: BillingPeriod, today: NaiveDate) -> i64 {
    (due_date(period) - today).num_days()
}

/// Tier a bill is eligible for today under the given policy.
pub fn tier_for(period: BillingPeriod, today: NaiveDate, policy: TierPolicy) -> Option<NotificationTier> {
    policy.classify(days_until_due(period, today))
}

/// Window bucketing used by the dashboard summary and [`TierPolicy::CatchUp`].
pub fn bucket(days_until_due: i64) -> Option<NotificationTier> {
    match days_until_due {
        d if d < 0 => Some(NotificationTier::Overdue),
        0 => Some(NotificationTier::DueToday),
        1..=3 => Some(NotificationTier::DueSoon3),
        4..=7 => Some(NotificationTier::DueSoon7),
        _ => None,
    }
}

/// Source of "now" for components that stamp records or evaluate due dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Civil date used for every day computation.
    fn today(&self) -> NaiveDate;
}

/// Wall clock evaluated in a fixed civil offset (WIB by default).
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        self.offset.from_utc_datetime(&Utc::now().naive_utc()).date_naive()
    }
}

/// Clock pinned to a single civil date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.today
            .and_hms_opt(9, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(Utc::now)
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}
