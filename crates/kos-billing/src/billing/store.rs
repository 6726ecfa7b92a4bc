use std::collections::BTreeSet;

use serde::Deserialize;

use super::domain::{
    Bill, BillCategory, BillId, BillStatus, BillingPeriod, DeliveryStatus, NewBill,
    NewNotification, NewTenant, Notification, NotificationId, NotificationTier, Room, RoomId,
    Tenant, TenantId,
};

/// Error enumeration for persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Bill persistence.
///
/// Implementations must enforce uniqueness of `(tenant, period, category)` inside
/// `insert_bill` itself and answer a duplicate with [`StoreError::Conflict`]. The
/// lookup the generator performs first is an optimization; concurrent generators
/// rely on this constraint alone.
pub trait BillStore: Send + Sync {
    fn insert_bill(&self, bill: NewBill) -> Result<Bill, StoreError>;
    fn update_bill(&self, bill: &Bill) -> Result<(), StoreError>;
    fn bill(&self, id: BillId) -> Result<Option<Bill>, StoreError>;
    fn find_bill(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
        category: BillCategory,
    ) -> Result<Option<Bill>, StoreError>;
    fn bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, StoreError>;
    fn delete_bill(&self, id: BillId) -> Result<(), StoreError>;
}

/// Notification persistence. `insert_notification` must reject a second record
/// for the same `(bill, tier)` with [`StoreError::Conflict`].
pub trait NotificationStore: Send + Sync {
    fn insert_notification(&self, notification: NewNotification)
        -> Result<Notification, StoreError>;
    fn update_notification(&self, notification: &Notification) -> Result<(), StoreError>;
    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, StoreError>;
    fn find_notification(
        &self,
        bill_id: BillId,
        tier: NotificationTier,
    ) -> Result<Option<Notification>, StoreError>;
    /// Matching notifications, newest first unless the filter asks for oldest first.
    fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, StoreError>;
    fn delete_notification(&self, id: NotificationId) -> Result<(), StoreError>;
}

/// Read access to tenants and rooms, plus the writes the billing core needs.
pub trait TenantDirectory: Send + Sync {
    fn tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;
    fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;
    /// Insert the tenant and mark its room occupied as one unit of work.
    fn admit_tenant(&self, tenant: NewTenant) -> Result<Tenant, StoreError>;
    /// Stored contact number of a tenant; `NotFound` when the tenant is unknown.
    fn contact(&self, id: TenantId) -> Result<Option<String>, StoreError> {
        self.tenant(id)?
            .map(|tenant| tenant.phone)
            .ok_or(StoreError::NotFound)
    }
    /// Replace a tenant's contact number and return the updated record.
    fn update_contact(&self, id: TenantId, phone: Option<String>) -> Result<Tenant, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BillFilter {
    #[serde(default)]
    pub period: Option<BillingPeriod>,
    #[serde(default)]
    pub status: Option<BillStatus>,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
}

impl BillFilter {
    pub fn matches(&self, bill: &Bill) -> bool {
        self.period.map_or(true, |period| bill.period == period)
            && self.status.map_or(true, |status| bill.status == status)
            && self.tenant_id.map_or(true, |tenant| bill.tenant_id == tenant)
    }
}

/// Every bill that is not fully paid.
pub fn outstanding_bills<S: BillStore + ?Sized>(store: &S) -> Result<Vec<Bill>, StoreError> {
    Ok(store
        .bills(&BillFilter::default())?
        .into_iter()
        .filter(|bill| bill.status != BillStatus::Paid)
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub statuses: BTreeSet<DeliveryStatus>,
    pub tiers: BTreeSet<NotificationTier>,
    pub bill_id: Option<BillId>,
    pub limit: Option<usize>,
    /// Return the oldest records first instead of the newest.
    pub oldest_first: bool,
}

impl NotificationFilter {
    pub fn pending(tiers: impl IntoIterator<Item = NotificationTier>) -> Self {
        Self {
            statuses: BTreeSet::from([DeliveryStatus::Pending]),
            tiers: tiers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn oldest_first(mut self) -> Self {
        self.oldest_first = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&notification.status))
            && (self.tiers.is_empty() || self.tiers.contains(&notification.tier))
            && self.bill_id.map_or(true, |bill| notification.bill_id == bill)
    }
}
