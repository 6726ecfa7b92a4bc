#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use kos_billing::billing::domain::{NewBill, NewNotification};
use kos_billing::billing::memory::{InMemoryBillingStore, InMemoryTenantDirectory};
use kos_billing::billing::{
    Bill, BillCategory, BillFilter, BillId, BillStore, BillingPeriod, BillingService,
    DeliveryError, DeliveryReceipt, FixedClock, MessageSender, Notification, NotificationFilter,
    NotificationId, NotificationStore, NotificationTier, Room, RoomId, RoomStatus, StoreError,
    Tenant, TenantId,
};
use kos_billing::config::BillingConfig;

pub type MemoryService = BillingService<InMemoryBillingStore, InMemoryTenantDirectory, RecordingSender>;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn november() -> BillingPeriod {
    "2025-11".parse().expect("valid period")
}

pub struct Occupant {
    pub id: u64,
    pub name: &'static str,
    pub phone: Option<&'static str>,
    pub price: i64,
}

impl Occupant {
    pub fn new(id: u64, name: &'static str, phone: Option<&'static str>, price: i64) -> Self {
        Self {
            id,
            name,
            phone,
            price,
        }
    }
}

/// One room per occupant, sharing the occupant's id.
pub fn directory(occupants: &[Occupant]) -> InMemoryTenantDirectory {
    let directory = InMemoryTenantDirectory::default();
    for occupant in occupants {
        directory
            .upsert_room(Room {
                id: RoomId(occupant.id),
                name: format!("Room {}", occupant.id),
                price: occupant.price,
                status: RoomStatus::Occupied,
            })
            .expect("room stored");
        directory
            .upsert_tenant(Tenant {
                id: TenantId(occupant.id),
                name: occupant.name.to_string(),
                phone: occupant.phone.map(str::to_string),
                room_id: RoomId(occupant.id),
            })
            .expect("tenant stored");
    }
    directory
}

pub struct Harness {
    pub store: Arc<InMemoryBillingStore>,
    pub directory: Arc<InMemoryTenantDirectory>,
    pub sender: Arc<RecordingSender>,
    pub service: MemoryService,
}

pub fn harness(occupants: &[Occupant], today: NaiveDate) -> Harness {
    harness_with(occupants, today, BillingConfig::default(), RecordingSender::default())
}

pub fn harness_with(
    occupants: &[Occupant],
    today: NaiveDate,
    config: BillingConfig,
    sender: RecordingSender,
) -> Harness {
    let store = Arc::new(InMemoryBillingStore::default());
    let directory = Arc::new(directory(occupants));
    let sender = Arc::new(sender);
    let service = BillingService::new(
        store.clone(),
        directory.clone(),
        sender.clone(),
        Arc::new(FixedClock::new(today)),
        &config,
    );
    Harness {
        store,
        directory,
        sender,
        service,
    }
}

/// Records every accepted message and rejects configured addresses.
#[derive(Default)]
pub struct RecordingSender {
    rejected: HashSet<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn rejecting(address: &str) -> Self {
        Self {
            rejected: HashSet::from([address.to_string()]),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sender lock").clone()
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, address: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        if self.rejected.contains(address) {
            return Err(DeliveryError::Rejected(format!("{address} is not on WhatsApp")));
        }
        let mut sent = self.sent.lock().expect("sender lock");
        sent.push((address.to_string(), body.to_string()));
        Ok(DeliveryReceipt {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

/// Delegates to an in-memory store but loses its connection after a number of writes.
pub struct FlakyStore {
    inner: InMemoryBillingStore,
    writes_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryBillingStore, writes_before_outage: usize) -> Self {
        Self {
            inner,
            writes_left: AtomicUsize::new(writes_before_outage),
        }
    }

    fn write(&self) -> Result<(), StoreError> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StoreError::Unavailable("connection reset".to_string()))
    }
}

impl BillStore for FlakyStore {
    fn insert_bill(&self, bill: NewBill) -> Result<Bill, StoreError> {
        self.write()?;
        self.inner.insert_bill(bill)
    }

    fn update_bill(&self, bill: &Bill) -> Result<(), StoreError> {
        self.write()?;
        self.inner.update_bill(bill)
    }

    fn bill(&self, id: BillId) -> Result<Option<Bill>, StoreError> {
        self.inner.bill(id)
    }

    fn find_bill(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
        category: BillCategory,
    ) -> Result<Option<Bill>, StoreError> {
        self.inner.find_bill(tenant_id, period, category)
    }

    fn bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, StoreError> {
        self.inner.bills(filter)
    }

    fn delete_bill(&self, id: BillId) -> Result<(), StoreError> {
        self.write()?;
        self.inner.delete_bill(id)
    }
}

impl NotificationStore for FlakyStore {
    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        self.write()?;
        self.inner.insert_notification(notification)
    }

    fn update_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.write()?;
        self.inner.update_notification(notification)
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        self.inner.notification(id)
    }

    fn find_notification(
        &self,
        bill_id: BillId,
        tier: NotificationTier,
    ) -> Result<Option<Notification>, StoreError> {
        self.inner.find_notification(bill_id, tier)
    }

    fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, StoreError> {
        self.inner.notifications(filter)
    }

    fn delete_notification(&self, id: NotificationId) -> Result<(), StoreError> {
        self.write()?;
        self.inner.delete_notification(id)
    }
}
