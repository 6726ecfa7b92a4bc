use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Monetary amounts are whole rupiah.
pub type Amount = i64;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(TenantId);
record_id!(RoomId);
record_id!(
    /// Store-assigned identifier of a [`Bill`].
    BillId
);
record_id!(
    /// Store-assigned identifier of a [`Notification`].
    NotificationId
);

/// Calendar year-month a bill covers, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(ValidationError::InvalidPeriod(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.first_day()
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }
}

impl FromStr for BillingPeriod {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidPeriod(raw.to_string());
        let (year, month) = raw.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(value: BillingPeriod) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl BillStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unpaid => "Unpaid",
            Self::PartiallyPaid => "Partially Paid",
            Self::Paid => "Paid",
        }
    }

    /// Status implied by a paid amount against what is owed.
    pub fn derive(paid: Amount, owed: Amount) -> Self {
        if paid >= owed {
            Self::Paid
        } else if paid > 0 {
            Self::PartiallyPaid
        } else {
            Self::Unpaid
        }
    }

    pub fn agrees_with(self, paid: Amount, owed: Amount) -> bool {
        match self {
            Self::Paid => paid == owed,
            Self::Unpaid => paid == 0,
            Self::PartiallyPaid => paid > 0 && paid < owed,
        }
    }
}

impl FromStr for BillStatus {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "unpaid" | "belum_lunas" => Ok(Self::Unpaid),
            "partially_paid" | "partial" | "installment" | "cicil" => Ok(Self::PartiallyPaid),
            "paid" | "lunas" => Ok(Self::Paid),
            _ => Err(ValidationError::UnknownStatus(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillCategory {
    TenantRent,
    Utility,
}

impl BillCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::TenantRent => "Tenant Rent",
            Self::Utility => "Utility",
        }
    }
}

impl FromStr for BillCategory {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "tenant_rent" | "rent" => Ok(Self::TenantRent),
            "utility" | "utilities" => Ok(Self::Utility),
            _ => Err(ValidationError::UnknownCategory(raw.to_string())),
        }
    }
}

/// One tenant's obligation for one billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub tenant_id: TenantId,
    pub room_id: RoomId,
    pub room_name: String,
    pub period: BillingPeriod,
    pub amount_owed: Amount,
    pub paid: Amount,
    pub status: BillStatus,
    pub category: BillCategory,
    pub received_by: Option<String>,
    pub paid_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn outstanding(&self) -> Amount {
        (self.amount_owed - self.paid).max(0)
    }

    pub fn is_consistent(&self) -> bool {
        self.status.agrees_with(self.paid, self.amount_owed)
    }
}

/// Bill contents before the store assigns an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub tenant_id: TenantId,
    pub room_id: RoomId,
    pub room_name: String,
    pub period: BillingPeriod,
    pub amount_owed: Amount,
    pub category: BillCategory,
    pub created_at: DateTime<Utc>,
}

/// Urgency of an unpaid bill relative to its due date, least urgent first.
///
/// Deserializes through [`FromStr`], so labels (`H-1`) and any letter case are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum NotificationTier {
    #[serde(rename = "due_soon_7")]
    DueSoon7,
    #[serde(rename = "due_soon_3")]
    DueSoon3,
    #[serde(rename = "due_today")]
    DueToday,
    #[serde(rename = "overdue")]
    Overdue,
}

impl NotificationTier {
    pub const fn ordered() -> [Self; 4] {
        [Self::DueSoon7, Self::DueSoon3, Self::DueToday, Self::Overdue]
    }

    /// Tiers a broadcast targets when the caller names none.
    pub const fn most_urgent() -> [Self; 2] {
        [Self::DueToday, Self::Overdue]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::DueSoon7 => "H-7",
            Self::DueSoon3 => "H-3",
            Self::DueToday => "H-1",
            Self::Overdue => "OVERDUE",
        }
    }
}

impl FromStr for NotificationTier {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "due_soon_7" | "h_7" => Ok(Self::DueSoon7),
            "due_soon_3" | "h_3" => Ok(Self::DueSoon3),
            "due_today" | "h_1" => Ok(Self::DueToday),
            "overdue" => Ok(Self::Overdue),
            _ => Err(ValidationError::UnknownTier(raw.to_string())),
        }
    }
}

impl TryFrom<String> for NotificationTier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Read,
}

impl FromStr for DeliveryStatus {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "read" => Ok(Self::Read),
            _ => Err(ValidationError::UnknownDeliveryStatus(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub tier: NotificationTier,
    pub status: DeliveryStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub tier: NotificationTier,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub price: Amount,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub phone: Option<String>,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub room_id: RoomId,
}

/// Renders an amount with `.` thousands separators, e.g. `1.000.000`.
pub fn format_rupiah(amount: Amount) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parses_and_bounds_month() {
        let period: BillingPeriod = "2025-11".parse().expect("valid period");
        assert_eq!(period.year(), 2025);
        assert_eq!(period.month(), 11);
        assert_eq!(period.to_string(), "2025-11");
        assert_eq!(
            period.last_day(),
            NaiveDate::from_ymd_opt(2025, 11, 30).expect("valid date")
        );
    }

    #[test]
    fn period_last_day_handles_february_and_december() {
        let leap: BillingPeriod = "2024-02".parse().expect("valid period");
        assert_eq!(leap.last_day().day(), 29);
        let plain: BillingPeriod = "2025-02".parse().expect("valid period");
        assert_eq!(plain.last_day().day(), 28);
        let december: BillingPeriod = "2025-12".parse().expect("valid period");
        assert_eq!(
            december.last_day(),
            NaiveDate::from_ymd_opt(2025, 12, 31).expect("valid date")
        );
    }

    #[test]
    fn period_rejects_malformed_values() {
        for raw in ["2025-13", "2025-00", "2025/11", "25-11", "2025-1", "november", ""] {
            assert!(
                matches!(
                    raw.parse::<BillingPeriod>(),
                    Err(ValidationError::InvalidPeriod(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn period_serializes_as_string() {
        let period: BillingPeriod = "2025-03".parse().expect("valid period");
        let json = serde_json::to_string(&period).expect("serializes");
        assert_eq!(json, "\"2025-03\"");
        let back: BillingPeriod = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, period);
        assert!(serde_json::from_str::<BillingPeriod>("\"2025-3x\"").is_err());
    }

    #[test]
    fn status_accepts_legacy_labels_and_rejects_free_text() {
        assert_eq!("Lunas".parse::<BillStatus>().ok(), Some(BillStatus::Paid));
        assert_eq!(
            "Belum Lunas".parse::<BillStatus>().ok(),
            Some(BillStatus::Unpaid)
        );
        assert_eq!(
            "installment".parse::<BillStatus>().ok(),
            Some(BillStatus::PartiallyPaid)
        );
        assert!(matches!(
            "settled".parse::<BillStatus>(),
            Err(ValidationError::UnknownStatus(_))
        ));
    }

    #[test]
    fn status_derivation_matches_consistency_rule() {
        assert_eq!(BillStatus::derive(0, 1_000), BillStatus::Unpaid);
        assert_eq!(BillStatus::derive(400, 1_000), BillStatus::PartiallyPaid);
        assert_eq!(BillStatus::derive(1_000, 1_000), BillStatus::Paid);
        assert!(BillStatus::Paid.agrees_with(1_000, 1_000));
        assert!(!BillStatus::Paid.agrees_with(500, 1_000));
        assert!(!BillStatus::PartiallyPaid.agrees_with(0, 1_000));
    }

    #[test]
    fn tier_parses_short_labels() {
        assert_eq!(
            "H-7".parse::<NotificationTier>().ok(),
            Some(NotificationTier::DueSoon7)
        );
        assert_eq!(
            "due_today".parse::<NotificationTier>().ok(),
            Some(NotificationTier::DueToday)
        );
        assert!("H-5".parse::<NotificationTier>().is_err());
        assert!(NotificationTier::Overdue > NotificationTier::DueToday);
    }

    #[test]
    fn rupiah_formatting_groups_thousands() {
        assert_eq!(format_rupiah(0), "0");
        assert_eq!(format_rupiah(950), "950");
        assert_eq!(format_rupiah(1_000_000), "1.000.000");
        assert_eq!(format_rupiah(12_500), "12.500");
        assert_eq!(format_rupiah(-4_000), "-4.000");
    }

    #[test]
    fn tier_deserializes_labels_in_any_case() {
        let tiers: Vec<NotificationTier> =
            serde_json::from_str(r#"["h-1", "OVERDUE", "due_soon_3", "H-7"]"#).expect("tiers");
        assert_eq!(
            tiers,
            vec![
                NotificationTier::DueToday,
                NotificationTier::Overdue,
                NotificationTier::DueSoon3,
                NotificationTier::DueSoon7,
            ]
        );
        assert_eq!(
            serde_json::to_string(&NotificationTier::DueToday).expect("serializes"),
            "\"due_today\""
        );

        let err = serde_json::from_str::<NotificationTier>("\"H-9\"").expect_err("rejected");
        assert!(err.to_string().contains("unrecognized notification tier 'H-9'"));
    }
}
