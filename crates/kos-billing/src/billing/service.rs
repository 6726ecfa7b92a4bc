use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::calendar::Clock;
use super::dispatcher::{
    BroadcastReport, ContactSettings, DispatchOutcome, DispatchSettings, MessageSender,
    NotificationDispatcher, ReminderOutcome, TestMessageOutcome,
};
use super::domain::{
    Amount, Bill, BillCategory, BillId, BillingPeriod, DeliveryStatus, NewBill, NewTenant,
    Notification, NotificationId, NotificationTier, Tenant, TenantId,
};
use super::error::{BillingError, ValidationError};
use super::generator::{BillingGenerator, GenerationReport};
use super::reconciler::{PaymentReconciler, PaymentUpdate, Reconciliation, RepairReport};
use super::scheduler::{DueSummary, NotificationScheduler, ScanReport};
use super::store::{
    BillFilter, BillStore, NotificationFilter, NotificationStore, StoreError, TenantDirectory,
};
use crate::config::BillingConfig;

/// Largest page the notification listing returns.
pub const MAX_NOTIFICATION_PAGE: usize = 50;

/// Administrative bill insert, typically a utility charge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BillDraft {
    pub tenant_id: TenantId,
    pub period: BillingPeriod,
    pub amount_owed: Amount,
    #[serde(default = "utility_category")]
    pub category: BillCategory,
}

fn utility_category() -> BillCategory {
    BillCategory::Utility
}

/// Notification joined with the bill and tenant it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub tier_label: &'static str,
    pub tenant_name: Option<String>,
    pub period: Option<BillingPeriod>,
    pub amount_owed: Option<Amount>,
}

/// Facade over the billing components sharing one store, directory and clock.
pub struct BillingService<S, D, M> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
    generator: BillingGenerator<S, D>,
    reconciler: PaymentReconciler<S>,
    scheduler: NotificationScheduler<S, D>,
    dispatcher: NotificationDispatcher<S, D, M>,
}

impl<S, D, M> BillingService<S, D, M>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        sender: Arc<M>,
        clock: Arc<dyn Clock>,
        config: &BillingConfig,
    ) -> Self {
        let generator = BillingGenerator::new(store.clone(), directory.clone(), clock.clone());
        let reconciler = PaymentReconciler::new(store.clone(), clock.clone());
        let scheduler = NotificationScheduler::new(
            store.clone(),
            directory.clone(),
            clock.clone(),
            config.tier_policy,
        );
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            directory.clone(),
            sender,
            clock.clone(),
            DispatchSettings {
                country_prefix: config.country_prefix.clone(),
                broadcast_limit: config.broadcast_limit,
            },
        );

        Self {
            store,
            directory,
            clock,
            generator,
            reconciler,
            scheduler,
            dispatcher,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn generate_bills(&self, period: BillingPeriod) -> Result<GenerationReport, BillingError> {
        self.generator.generate(period)
    }

    /// Bills matching `filter`, ordered by period then id.
    pub fn bills(&self, filter: &BillFilter) -> Result<Vec<Bill>, BillingError> {
        let mut bills = self.store.bills(filter)?;
        bills.sort_by_key(|bill| (bill.period, bill.id));
        Ok(bills)
    }

    pub fn bill(&self, id: BillId) -> Result<Bill, BillingError> {
        self.store
            .bill(id)
            .map_err(|err| BillingError::from_store("bill", id, err))?
            .ok_or_else(|| BillingError::not_found("bill", id))
    }

    pub fn create_bill(&self, draft: BillDraft) -> Result<Bill, BillingError> {
        if draft.amount_owed <= 0 {
            return Err(ValidationError::NonPositiveAmount(draft.amount_owed).into());
        }
        let tenant = self
            .directory
            .tenant(draft.tenant_id)?
            .ok_or_else(|| BillingError::not_found("tenant", draft.tenant_id))?;
        let room = self
            .directory
            .room(tenant.room_id)?
            .ok_or_else(|| BillingError::not_found("room", tenant.room_id))?;

        let bill = self
            .store
            .insert_bill(NewBill {
                tenant_id: tenant.id,
                room_id: room.id,
                room_name: room.name,
                period: draft.period,
                amount_owed: draft.amount_owed,
                category: draft.category,
                created_at: self.clock.now(),
            })
            .map_err(|err| match err {
                StoreError::Conflict => BillingError::Conflict(format!(
                    "{} bill for tenant {} in {}",
                    draft.category.label(),
                    draft.tenant_id,
                    draft.period
                )),
                other => BillingError::from(other),
            })?;

        info!(bill = %bill.id, tenant = %bill.tenant_id, period = %bill.period, "bill created");
        Ok(bill)
    }

    pub fn delete_bill(&self, id: BillId) -> Result<(), BillingError> {
        self.store
            .delete_bill(id)
            .map_err(|err| BillingError::from_store("bill", id, err))?;
        info!(bill = %id, "bill deleted");
        Ok(())
    }

    pub fn reconcile_payment(
        &self,
        id: BillId,
        update: &PaymentUpdate,
    ) -> Result<Reconciliation, BillingError> {
        self.reconciler.reconcile(id, update)
    }

    pub fn repair_payments(&self) -> Result<RepairReport, BillingError> {
        self.reconciler.repair_all()
    }

    pub fn run_notification_scan(&self) -> Result<ScanReport, BillingError> {
        self.scheduler.run_scan()
    }

    pub fn due_summary(&self) -> Result<DueSummary, BillingError> {
        self.scheduler.due_summary()
    }

    /// Pending notifications in `tiers` (every tier when empty), newest first.
    pub fn pending_notifications(
        &self,
        tiers: &[NotificationTier],
    ) -> Result<Vec<Notification>, BillingError> {
        let filter = NotificationFilter::pending(tiers.iter().copied());
        Ok(self.store.notifications(&filter)?)
    }

    /// Newest-first page of notifications, capped at [`MAX_NOTIFICATION_PAGE`].
    pub fn notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationView>, BillingError> {
        let limit = filter
            .limit
            .map_or(MAX_NOTIFICATION_PAGE, |limit| limit.min(MAX_NOTIFICATION_PAGE));
        let filter = NotificationFilter {
            limit: Some(limit),
            ..filter.clone()
        };

        self.store
            .notifications(&filter)?
            .into_iter()
            .map(|notification| self.view(notification))
            .collect()
    }

    pub fn dispatch_notification(
        &self,
        id: NotificationId,
    ) -> Result<DispatchOutcome, BillingError> {
        self.dispatcher.dispatch(id)
    }

    pub fn broadcast(&self, tiers: &[NotificationTier]) -> Result<BroadcastReport, BillingError> {
        self.dispatcher.broadcast(tiers)
    }

    pub fn send_reminder(
        &self,
        bill_id: BillId,
        message: &str,
    ) -> Result<ReminderOutcome, BillingError> {
        self.dispatcher.send_reminder(bill_id, message)
    }

    pub fn send_test_message(
        &self,
        to: &str,
        message: &str,
    ) -> Result<TestMessageOutcome, BillingError> {
        self.dispatcher.send_test_message(to, message)
    }

    pub fn contact_settings(&self, tenant_id: TenantId) -> Result<ContactSettings, BillingError> {
        self.dispatcher.contact_settings(tenant_id)
    }

    pub fn update_contact(
        &self,
        tenant_id: TenantId,
        phone: &str,
    ) -> Result<ContactSettings, BillingError> {
        self.dispatcher.update_contact(tenant_id, phone)
    }

    /// Mark a notification read. Already-read records are returned unchanged.
    pub fn acknowledge_notification(
        &self,
        id: NotificationId,
    ) -> Result<Notification, BillingError> {
        let mut notification = self
            .store
            .notification(id)
            .map_err(|err| BillingError::from_store("notification", id, err))?
            .ok_or_else(|| BillingError::not_found("notification", id))?;
        if notification.status == DeliveryStatus::Read {
            return Ok(notification);
        }

        notification.status = DeliveryStatus::Read;
        notification.read_at = Some(self.clock.now());
        self.store
            .update_notification(&notification)
            .map_err(|err| BillingError::from_store("notification", id, err))?;
        Ok(notification)
    }

    pub fn delete_notification(&self, id: NotificationId) -> Result<(), BillingError> {
        self.store
            .delete_notification(id)
            .map_err(|err| BillingError::from_store("notification", id, err))?;
        info!(notification = %id, "notification deleted");
        Ok(())
    }

    /// Register a tenant and occupy their room in one step.
    pub fn admit_tenant(&self, tenant: NewTenant) -> Result<Tenant, BillingError> {
        if tenant.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        let room_id = tenant.room_id;
        let admitted = self
            .directory
            .admit_tenant(tenant)
            .map_err(|err| match err {
                StoreError::NotFound => BillingError::not_found("room", room_id),
                StoreError::Conflict => {
                    BillingError::Conflict(format!("occupant for room {room_id}"))
                }
                other => BillingError::from(other),
            })?;
        info!(tenant = %admitted.id, room = %room_id, "tenant admitted");
        Ok(admitted)
    }

    fn view(&self, notification: Notification) -> Result<NotificationView, BillingError> {
        let tenant_name = self
            .directory
            .tenant(notification.tenant_id)?
            .map(|tenant| tenant.name);
        let bill = self.store.bill(notification.bill_id)?;
        Ok(NotificationView {
            tier_label: notification.tier.label(),
            tenant_name,
            period: bill.as_ref().map(|bill| bill.period),
            amount_owed: bill.map(|bill| bill.amount_owed),
            notification,
        })
    }
}
