//! Mutex-backed adapters for the store and directory ports.
//!
//! Uniqueness is checked and the row inserted under one lock, which is the
//! in-process equivalent of a unique index.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Bill, BillCategory, BillId, BillStatus, BillingPeriod, NewBill, NewNotification, NewTenant,
    Notification, NotificationId, NotificationTier, Room, RoomId, RoomStatus, Tenant, TenantId,
    DeliveryStatus,
};
use super::store::{
    BillFilter, BillStore, NotificationFilter, NotificationStore, StoreError, TenantDirectory,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

#[derive(Default)]
struct BillingTables {
    bills: BTreeMap<BillId, Bill>,
    bill_keys: HashMap<(TenantId, BillingPeriod, BillCategory), BillId>,
    notifications: BTreeMap<NotificationId, Notification>,
    notification_keys: HashMap<(BillId, NotificationTier), NotificationId>,
    next_bill: u64,
    next_notification: u64,
}

/// Bill and notification store kept in process memory.
#[derive(Default, Clone)]
pub struct InMemoryBillingStore {
    tables: Arc<Mutex<BillingTables>>,
}

impl BillStore for InMemoryBillingStore {
    fn insert_bill(&self, bill: NewBill) -> Result<Bill, StoreError> {
        let mut tables = lock(&self.tables)?;
        let key = (bill.tenant_id, bill.period, bill.category);
        if tables.bill_keys.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        tables.next_bill += 1;
        let id = BillId(tables.next_bill);
        let record = Bill {
            id,
            tenant_id: bill.tenant_id,
            room_id: bill.room_id,
            room_name: bill.room_name,
            period: bill.period,
            amount_owed: bill.amount_owed,
            paid: 0,
            status: BillStatus::Unpaid,
            category: bill.category,
            received_by: None,
            paid_on: None,
            created_at: bill.created_at,
            updated_at: bill.created_at,
        };
        tables.bill_keys.insert(key, id);
        tables.bills.insert(id, record.clone());
        Ok(record)
    }

    fn update_bill(&self, bill: &Bill) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        match tables.bills.get_mut(&bill.id) {
            Some(existing) => {
                *existing = bill.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn bill(&self, id: BillId) -> Result<Option<Bill>, StoreError> {
        Ok(lock(&self.tables)?.bills.get(&id).cloned())
    }

    fn find_bill(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
        category: BillCategory,
    ) -> Result<Option<Bill>, StoreError> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .bill_keys
            .get(&(tenant_id, period, category))
            .and_then(|id| tables.bills.get(id))
            .cloned())
    }

    fn bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, StoreError> {
        let tables = lock(&self.tables)?;
        let mut bills: Vec<Bill> = tables
            .bills
            .values()
            .filter(|bill| filter.matches(bill))
            .cloned()
            .collect();
        bills.sort_by_key(|bill| (bill.period, bill.id));
        Ok(bills)
    }

    fn delete_bill(&self, id: BillId) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        let bill = tables.bills.remove(&id).ok_or(StoreError::NotFound)?;
        tables
            .bill_keys
            .remove(&(bill.tenant_id, bill.period, bill.category));
        Ok(())
    }
}

impl NotificationStore for InMemoryBillingStore {
    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        let mut tables = lock(&self.tables)?;
        let key = (notification.bill_id, notification.tier);
        if tables.notification_keys.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        tables.next_notification += 1;
        let id = NotificationId(tables.next_notification);
        let record = Notification {
            id,
            tenant_id: notification.tenant_id,
            bill_id: notification.bill_id,
            tier: notification.tier,
            status: DeliveryStatus::Pending,
            message: notification.message,
            created_at: notification.created_at,
            sent_at: None,
            read_at: None,
        };
        tables.notification_keys.insert(key, id);
        tables.notifications.insert(id, record.clone());
        Ok(record)
    }

    fn update_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        match tables.notifications.get_mut(&notification.id) {
            Some(existing) => {
                *existing = notification.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        Ok(lock(&self.tables)?.notifications.get(&id).cloned())
    }

    fn find_notification(
        &self,
        bill_id: BillId,
        tier: NotificationTier,
    ) -> Result<Option<Notification>, StoreError> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .notification_keys
            .get(&(bill_id, tier))
            .and_then(|id| tables.notifications.get(id))
            .cloned())
    }

    fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, StoreError> {
        let tables = lock(&self.tables)?;
        let mut matching: Vec<&Notification> = tables
            .notifications
            .values()
            .filter(|notification| filter.matches(notification))
            .collect();
        if !filter.oldest_first {
            matching.reverse();
        }
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching.into_iter().cloned().collect())
    }

    fn delete_notification(&self, id: NotificationId) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        let notification = tables
            .notifications
            .remove(&id)
            .ok_or(StoreError::NotFound)?;
        tables
            .notification_keys
            .remove(&(notification.bill_id, notification.tier));
        Ok(())
    }
}

#[derive(Default)]
struct DirectoryTables {
    tenants: BTreeMap<TenantId, Tenant>,
    rooms: BTreeMap<RoomId, Room>,
}

/// Tenant and room directory kept in process memory.
#[derive(Default, Clone)]
pub struct InMemoryTenantDirectory {
    tables: Arc<Mutex<DirectoryTables>>,
}

impl InMemoryTenantDirectory {
    /// Insert or replace a room.
    pub fn upsert_room(&self, room: Room) -> Result<(), StoreError> {
        lock(&self.tables)?.rooms.insert(room.id, room);
        Ok(())
    }

    /// Insert or replace a tenant without touching room occupancy.
    pub fn upsert_tenant(&self, tenant: Tenant) -> Result<(), StoreError> {
        lock(&self.tables)?.tenants.insert(tenant.id, tenant);
        Ok(())
    }

    pub fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(lock(&self.tables)?.rooms.values().cloned().collect())
    }
}

impl TenantDirectory for InMemoryTenantDirectory {
    fn tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        Ok(lock(&self.tables)?.tenants.values().cloned().collect())
    }

    fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(lock(&self.tables)?.tenants.get(&id).cloned())
    }

    fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(lock(&self.tables)?.rooms.get(&id).cloned())
    }

    fn admit_tenant(&self, tenant: NewTenant) -> Result<Tenant, StoreError> {
        let mut tables = lock(&self.tables)?;
        let room = tables
            .rooms
            .get_mut(&tenant.room_id)
            .ok_or(StoreError::NotFound)?;
        if room.status != RoomStatus::Available {
            return Err(StoreError::Conflict);
        }
        room.status = RoomStatus::Occupied;

        let next = tables
            .tenants
            .keys()
            .next_back()
            .map_or(1, |id| id.0 + 1);
        let record = Tenant {
            id: TenantId(next),
            name: tenant.name,
            phone: tenant.phone,
            room_id: tenant.room_id,
        };
        tables.tenants.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_contact(&self, id: TenantId, phone: Option<String>) -> Result<Tenant, StoreError> {
        let mut tables = lock(&self.tables)?;
        let tenant = tables.tenants.get_mut(&id).ok_or(StoreError::NotFound)?;
        tenant.phone = phone;
        Ok(tenant.clone())
    }
}
