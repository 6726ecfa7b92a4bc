use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::calendar::Clock;
use super::domain::{
    BillId, BillStatus, DeliveryStatus, Notification, NotificationId, NotificationTier, Tenant,
    TenantId,
};
use super::error::{BillingError, ValidationError};
use super::messages::reminder_envelope;
use super::outcome::{Completion, ItemFailure};
use super::store::{BillStore, NotificationFilter, NotificationStore, StoreError, TenantDirectory};

/// Why the delivery channel did not take a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("tenant {0} has no usable contact number")]
    MissingContact(TenantId),
    #[error("tenant {0} is not in the directory")]
    UnknownRecipient(TenantId),
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("delivery timed out")]
    Timeout,
}

/// Channel acknowledgement for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

/// Outbound messaging hook (WhatsApp, SMS, ...). Addresses arrive already in
/// international `+<country><number>` form.
pub trait MessageSender: Send + Sync {
    fn send(&self, address: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Normalizes a stored phone number to `+<country><subscriber>`.
///
/// A leading `0` is replaced by the country prefix, a number already carrying the
/// country code gains a `+`, and anything else is prefixed. Returns `None` when
/// nothing dialable remains.
pub fn format_contact(raw: &str, country_prefix: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let (explicit_plus, digits) = match cleaned.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if explicit_plus {
        return Some(format!("+{digits}"));
    }

    let country = country_prefix.trim_start_matches('+');
    let subscriber = match digits.strip_prefix('0') {
        Some(rest) => rest,
        None if digits.starts_with(country) && digits.len() > country.len() + 6 => {
            &digits[country.len()..]
        }
        None => digits,
    };
    if subscriber.is_empty() {
        return None;
    }
    Some(format!("+{country}{subscriber}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub notification_id: NotificationId,
    pub status: DeliveryStatus,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub completion: Completion,
    pub tiers: Vec<NotificationTier>,
    pub success: usize,
    pub failed: usize,
    /// Notifications attempted in this run.
    pub total: usize,
    /// Pending notifications whose bill was paid or removed after the scan.
    pub skipped: usize,
    /// Pending notifications left for a later run once the batch limit was reached.
    pub remaining: usize,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderOutcome {
    pub bill_id: BillId,
    pub address: String,
    pub message_id: String,
    /// Pending notification marked sent by this reminder, if any.
    pub notification_marked: Option<NotificationId>,
}

/// Delivery settings of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactSettings {
    pub tenant_id: TenantId,
    pub name: String,
    pub phone: Option<String>,
    /// Whether `phone` normalizes to a dialable address.
    pub has_phone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestMessageOutcome {
    pub address: String,
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub country_prefix: String,
    pub broadcast_limit: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            country_prefix: "+62".to_string(),
            broadcast_limit: 200,
        }
    }
}

enum BroadcastStep {
    Sent,
    Skipped,
    Failed(ItemFailure),
}

enum Attempt {
    Delivered {
        address: String,
        receipt: DeliveryReceipt,
    },
    Failed(DeliveryError),
}

/// Hands pending notifications to the delivery collaborator and records the outcome.
pub struct NotificationDispatcher<S, D, M> {
    store: Arc<S>,
    directory: Arc<D>,
    sender: Arc<M>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl<S, D, M> NotificationDispatcher<S, D, M>
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
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            directory,
            sender,
            clock,
            settings,
        }
    }

    /// Deliver one pending notification. A delivery failure is not an error: the
    /// record stays pending and the outcome carries the reason.
    pub fn dispatch(&self, id: NotificationId) -> Result<DispatchOutcome, BillingError> {
        let notification = self
            .store
            .notification(id)
            .map_err(|err| BillingError::from_store("notification", id, err))?
            .ok_or_else(|| BillingError::not_found("notification", id))?;
        if notification.status != DeliveryStatus::Pending {
            return Err(ValidationError::NotificationNotPending(id.0).into());
        }
        let bill_id = notification.bill_id;
        let bill = self
            .store
            .bill(bill_id)
            .map_err(|err| BillingError::from_store("bill", bill_id, err))?
            .ok_or_else(|| BillingError::not_found("bill", bill_id))?;
        if bill.status == BillStatus::Paid {
            return Err(ValidationError::BillAlreadyPaid(bill_id.0).into());
        }

        match self.attempt(&notification)? {
            Attempt::Delivered { address, receipt } => {
                let sent = self
                    .mark_sent(notification)
                    .map_err(|err| BillingError::from_store("notification", id, err))?;
                info!(notification = %id, %address, "notification delivered");
                Ok(DispatchOutcome {
                    notification_id: id,
                    status: sent.status,
                    delivered: true,
                    address: Some(address),
                    message_id: Some(receipt.message_id),
                    error: None,
                })
            }
            Attempt::Failed(err) => {
                warn!(notification = %id, error = %err, "notification delivery failed");
                Ok(DispatchOutcome {
                    notification_id: id,
                    status: notification.status,
                    delivered: false,
                    address: None,
                    message_id: None,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    /// Deliver every pending notification in `tiers` (due-today and overdue when empty).
    pub fn broadcast(&self, tiers: &[NotificationTier]) -> Result<BroadcastReport, BillingError> {
        let tiers: BTreeSet<NotificationTier> = if tiers.is_empty() {
            NotificationTier::most_urgent().into_iter().collect()
        } else {
            tiers.iter().copied().collect()
        };
        if let Some(tier) = tiers
            .iter()
            .find(|tier| !NotificationTier::most_urgent().contains(*tier))
        {
            return Err(ValidationError::TierNotBroadcastable(tier.label()).into());
        }

        let filter = NotificationFilter::pending(tiers.iter().copied()).oldest_first();
        let mut queue = self.store.notifications(&filter)?.into_iter();
        let limit = self.settings.broadcast_limit;
        let mut report = BroadcastReport {
            completion: Completion::Succeeded,
            tiers: tiers.into_iter().collect(),
            success: 0,
            failed: 0,
            total: 0,
            skipped: 0,
            remaining: 0,
            failures: Vec::new(),
        };
        let mut aborted = false;

        while report.total < limit {
            let Some(notification) = queue.next() else {
                break;
            };
            let id = notification.id;
            match self.broadcast_one(notification) {
                Ok(BroadcastStep::Sent) => {
                    report.total += 1;
                    report.success += 1;
                }
                Ok(BroadcastStep::Skipped) => report.skipped += 1,
                Ok(BroadcastStep::Failed(failure)) => {
                    report.total += 1;
                    report.failures.push(failure);
                }
                Err(failure) => {
                    error!(
                        notification = %id,
                        reason = %failure.reason,
                        "broadcast aborted by store failure"
                    );
                    report.total += 1;
                    report.failures.push(failure);
                    aborted = true;
                    break;
                }
            }
        }

        report.remaining = queue.count();
        report.failed = report.failures.len();
        report.completion = match Completion::from_parts(&report.failures, aborted) {
            Completion::Succeeded if report.remaining > 0 => Completion::PartiallySucceeded,
            completion => completion,
        };
        info!(
            success = report.success,
            failed = report.failed,
            skipped = report.skipped,
            total = report.total,
            remaining = report.remaining,
            "broadcast reminder finished"
        );
        Ok(report)
    }

    /// One broadcast item. `Err` carries the failure that aborts the batch.
    fn broadcast_one(&self, notification: Notification) -> Result<BroadcastStep, ItemFailure> {
        let id = notification.id;
        let subject = || format!("notification {id}");

        if !self
            .still_owed(&notification)
            .map_err(|err| ItemFailure::new(subject(), err))?
        {
            debug!(
                notification = %id,
                bill = %notification.bill_id,
                "bill settled, reminder skipped"
            );
            return Ok(BroadcastStep::Skipped);
        }

        match self
            .attempt(&notification)
            .map_err(|err| ItemFailure::new(subject(), err))?
        {
            Attempt::Delivered { .. } => match self.mark_sent(notification) {
                Ok(_) => Ok(BroadcastStep::Sent),
                Err(StoreError::Unavailable(reason)) => Err(ItemFailure::new(
                    subject(),
                    format!("delivered but not recorded: {reason}"),
                )),
                Err(err) => Ok(BroadcastStep::Failed(ItemFailure::new(
                    subject(),
                    format!("delivered but not recorded: {err}"),
                ))),
            },
            Attempt::Failed(err) => {
                warn!(notification = %id, error = %err, "broadcast item failed");
                Ok(BroadcastStep::Failed(ItemFailure::new(subject(), err)))
            }
        }
    }

    /// Send a free-form reminder about one bill to its tenant.
    pub fn send_reminder(
        &self,
        bill_id: BillId,
        message: &str,
    ) -> Result<ReminderOutcome, BillingError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let bill = self
            .store
            .bill(bill_id)
            .map_err(|err| BillingError::from_store("bill", bill_id, err))?
            .ok_or_else(|| BillingError::not_found("bill", bill_id))?;
        let tenant = self
            .directory
            .tenant(bill.tenant_id)?
            .ok_or_else(|| BillingError::not_found("tenant", bill.tenant_id))?;
        let address = self.address_for(&tenant)?;

        let body = reminder_envelope(&tenant.name, message, bill.period, bill.amount_owed);
        let receipt = self.sender.send(&address, &body)?;

        let pending = self.store.notifications(&NotificationFilter {
            bill_id: Some(bill_id),
            ..NotificationFilter::pending([])
        })?;
        let notification_marked = match pending.into_iter().max_by_key(|n| n.tier) {
            Some(notification) => Some(self.mark_sent(notification)?.id),
            None => None,
        };

        info!(bill = %bill_id, %address, "custom reminder delivered");
        Ok(ReminderOutcome {
            bill_id,
            address,
            message_id: receipt.message_id,
            notification_marked,
        })
    }

    /// Send an ad-hoc message to any number, normalized like tenant contacts.
    pub fn send_test_message(
        &self,
        to: &str,
        message: &str,
    ) -> Result<TestMessageOutcome, BillingError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let address = format_contact(to, &self.settings.country_prefix)
            .ok_or_else(|| ValidationError::InvalidContact(to.trim().to_string()))?;

        let receipt = self.sender.send(&address, message)?;
        info!(%address, message_id = %receipt.message_id, "test message delivered");
        Ok(TestMessageOutcome {
            address,
            message_id: receipt.message_id,
        })
    }

    pub fn contact_settings(&self, tenant_id: TenantId) -> Result<ContactSettings, BillingError> {
        let tenant = self
            .directory
            .tenant(tenant_id)?
            .ok_or_else(|| BillingError::not_found("tenant", tenant_id))?;
        Ok(self.settings_for(tenant))
    }

    /// Replace a tenant's contact number. The number must normalize to a dialable address.
    pub fn update_contact(
        &self,
        tenant_id: TenantId,
        phone: &str,
    ) -> Result<ContactSettings, BillingError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ValidationError::MissingField("phone").into());
        }
        if format_contact(phone, &self.settings.country_prefix).is_none() {
            return Err(ValidationError::InvalidContact(phone.to_string()).into());
        }

        let tenant = self
            .directory
            .update_contact(tenant_id, Some(phone.to_string()))
            .map_err(|err| BillingError::from_store("tenant", tenant_id, err))?;
        info!(tenant = %tenant_id, "contact number updated");
        Ok(self.settings_for(tenant))
    }

    fn settings_for(&self, tenant: Tenant) -> ContactSettings {
        let address = self.address_for(&tenant).ok();
        ContactSettings {
            tenant_id: tenant.id,
            name: tenant.name,
            phone: tenant.phone,
            has_phone: address.is_some(),
            address,
        }
    }

    fn address_for(&self, tenant: &Tenant) -> Result<String, DeliveryError> {
        tenant
            .phone
            .as_deref()
            .and_then(|phone| format_contact(phone, &self.settings.country_prefix))
            .ok_or(DeliveryError::MissingContact(tenant.id))
    }

    fn still_owed(&self, notification: &Notification) -> Result<bool, StoreError> {
        Ok(self
            .store
            .bill(notification.bill_id)?
            .is_some_and(|bill| bill.status != BillStatus::Paid))
    }

    fn attempt(&self, notification: &Notification) -> Result<Attempt, StoreError> {
        let Some(tenant) = self.directory.tenant(notification.tenant_id)? else {
            return Ok(Attempt::Failed(DeliveryError::UnknownRecipient(
                notification.tenant_id,
            )));
        };
        let address = match self.address_for(&tenant) {
            Ok(address) => address,
            Err(err) => return Ok(Attempt::Failed(err)),
        };

        Ok(match self.sender.send(&address, &notification.message) {
            Ok(receipt) => Attempt::Delivered { address, receipt },
            Err(err) => Attempt::Failed(err),
        })
    }

    fn mark_sent(&self, mut notification: Notification) -> Result<Notification, StoreError> {
        notification.status = DeliveryStatus::Sent;
        notification.sent_at = Some(self.clock.now());
        self.store.update_notification(&notification)?;
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_numbers_gain_country_prefix() {
        assert_eq!(
            format_contact("081234567890", "+62").as_deref(),
            Some("+6281234567890")
        );
        assert_eq!(
            format_contact("0812-3456-7890", "+62").as_deref(),
            Some("+6281234567890")
        );
        assert_eq!(
            format_contact("81234567890", "+62").as_deref(),
            Some("+6281234567890")
        );
    }

    #[test]
    fn international_numbers_are_kept() {
        assert_eq!(
            format_contact("+6281234567890", "+62").as_deref(),
            Some("+6281234567890")
        );
        assert_eq!(
            format_contact("6281234567890", "+62").as_deref(),
            Some("+6281234567890")
        );
        assert_eq!(
            format_contact("+60 12 345 6789", "+62").as_deref(),
            Some("+60123456789")
        );
    }

    #[test]
    fn unusable_numbers_are_rejected() {
        assert_eq!(format_contact("", "+62"), None);
        assert_eq!(format_contact("   ", "+62"), None);
        assert_eq!(format_contact("0", "+62"), None);
        assert_eq!(format_contact("call me", "+62"), None);
    }
}
