use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use super::calendar::Clock;
use super::domain::{Amount, Bill, BillId, BillStatus};
use super::error::{BillingError, ValidationError};
use super::outcome::{Completion, ItemFailure};
use super::store::{BillFilter, BillStore, StoreError};

/// A payment event against one bill. At least one of `status` and `paid_amount` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaymentUpdate {
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: Option<BillStatus>,
    #[serde(default)]
    pub paid_amount: Option<Amount>,
    #[serde(default)]
    pub received_by: Option<String>,
    #[serde(default)]
    pub paid_on: Option<NaiveDate>,
}

impl PaymentUpdate {
    pub fn amount(paid_amount: Amount) -> Self {
        Self {
            paid_amount: Some(paid_amount),
            ..Self::default()
        }
    }

    pub fn status(status: BillStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<BillStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| value.parse().map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub bill: Bill,
    pub previous_status: BillStatus,
    /// Amount received beyond what was owed; `paid` itself never exceeds the bill.
    pub overpayment: Amount,
}

/// Applies `update` to a copy of `bill`. Pure; the result always satisfies
/// [`Bill::is_consistent`].
pub fn apply_payment(
    bill: &Bill,
    update: &PaymentUpdate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(Bill, Amount), ValidationError> {
    if let Some(amount) = update.paid_amount {
        if amount < 0 {
            return Err(ValidationError::NegativeAmount(amount));
        }
    }

    let owed = bill.amount_owed;
    let (status, paid, overpayment) = match (update.status, update.paid_amount) {
        (None, None) => return Err(ValidationError::MissingField("status or paid_amount")),
        (Some(BillStatus::Paid), _) => (BillStatus::Paid, owed, 0),
        (Some(BillStatus::Unpaid), _) => (BillStatus::Unpaid, 0, 0),
        (Some(BillStatus::PartiallyPaid), amount) => {
            let paid = amount.unwrap_or(bill.paid);
            if paid <= 0 || paid >= owed {
                return Err(ValidationError::InstallmentOutOfRange { paid, owed });
            }
            (BillStatus::PartiallyPaid, paid, 0)
        }
        (None, Some(amount)) => {
            let paid = amount.min(owed);
            (BillStatus::derive(paid, owed), paid, amount - paid)
        }
    };

    let mut updated = bill.clone();
    updated.status = status;
    updated.paid = paid;
    if status == BillStatus::Unpaid {
        updated.received_by = None;
        updated.paid_on = None;
    } else {
        if let Some(receiver) = update.received_by.as_ref().filter(|name| !name.trim().is_empty()) {
            updated.received_by = Some(receiver.trim().to_string());
        }
        updated.paid_on = update.paid_on.or(bill.paid_on).or(Some(today));
    }
    updated.updated_at = now;

    Ok((updated, overpayment))
}

/// Result of the mass consistency repair.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub completion: Completion,
    pub repaired: usize,
    pub total: usize,
    pub repaired_ids: Vec<BillId>,
    pub failures: Vec<ItemFailure>,
}

/// Keeps each bill's `paid` amount and status in agreement.
pub struct PaymentReconciler<B> {
    bills: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B> PaymentReconciler<B>
where
    B: BillStore + 'static,
{
    pub fn new(bills: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self { bills, clock }
    }

    pub fn reconcile(
        &self,
        bill_id: BillId,
        update: &PaymentUpdate,
    ) -> Result<Reconciliation, BillingError> {
        let bill = self
            .bills
            .bill(bill_id)
            .map_err(|err| BillingError::from_store("bill", bill_id, err))?
            .ok_or_else(|| BillingError::not_found("bill", bill_id))?;

        let (updated, overpayment) =
            apply_payment(&bill, update, self.clock.today(), self.clock.now())?;

        self.bills
            .update_bill(&updated)
            .map_err(|err| BillingError::from_store("bill", bill_id, err))?;

        info!(
            bill = %bill_id,
            from = bill.status.label(),
            to = updated.status.label(),
            paid = updated.paid,
            overpayment,
            "payment reconciled"
        );

        Ok(Reconciliation {
            previous_status: bill.status,
            bill: updated,
            overpayment,
        })
    }

    /// Force `paid = owed` on paid bills and `paid = 0` on unpaid ones.
    /// Installments are left alone whatever their amount.
    pub fn repair_all(&self) -> Result<RepairReport, BillingError> {
        let bills = self.bills.bills(&BillFilter::default())?;
        let total = bills.len();
        let now = self.clock.now();
        let mut repaired_ids = Vec::new();
        let mut failures = Vec::new();
        let mut aborted = false;

        for bill in bills {
            let corrected = match bill.status {
                BillStatus::Paid if bill.paid != bill.amount_owed => bill.amount_owed,
                BillStatus::Unpaid if bill.paid != 0 => 0,
                _ => continue,
            };

            let mut fixed = bill;
            fixed.paid = corrected;
            fixed.updated_at = now;

            match self.bills.update_bill(&fixed) {
                Ok(()) => repaired_ids.push(fixed.id),
                Err(StoreError::Unavailable(reason)) => {
                    error!(bill = %fixed.id, %reason, "payment repair aborted by store failure");
                    failures.push(ItemFailure::new(
                        format!("bill {}", fixed.id),
                        StoreError::Unavailable(reason),
                    ));
                    aborted = true;
                    break;
                }
                Err(err) => {
                    warn!(bill = %fixed.id, error = %err, "bill could not be repaired");
                    failures.push(ItemFailure::new(format!("bill {}", fixed.id), err));
                }
            }
        }

        info!(repaired = repaired_ids.len(), total, "payment consistency repair finished");

        Ok(RepairReport {
            completion: Completion::from_parts(&failures, aborted),
            repaired: repaired_ids.len(),
            total,
            repaired_ids,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::domain::{BillCategory, BillingPeriod, RoomId, TenantId};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 10).expect("valid date")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 10, 3, 0, 0).unwrap()
    }

    fn bill(owed: Amount, paid: Amount, status: BillStatus) -> Bill {
        Bill {
            id: BillId(1),
            tenant_id: TenantId(1),
            room_id: RoomId(1),
            room_name: "A1".to_string(),
            period: "2025-11".parse::<BillingPeriod>().expect("valid period"),
            amount_owed: owed,
            paid,
            status,
            category: BillCategory::TenantRent,
            received_by: None,
            paid_on: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn amount_only_derives_status() {
        let base = bill(1_000_000, 0, BillStatus::Unpaid);

        let (partial, _) =
            apply_payment(&base, &PaymentUpdate::amount(400_000), today(), now()).expect("valid");
        assert_eq!(partial.status, BillStatus::PartiallyPaid);
        assert_eq!(partial.paid, 400_000);
        assert_eq!(partial.paid_on, Some(today()));

        let (full, over) =
            apply_payment(&base, &PaymentUpdate::amount(1_000_000), today(), now()).expect("valid");
        assert_eq!(full.status, BillStatus::Paid);
        assert_eq!(over, 0);

        let (none, _) =
            apply_payment(&partial, &PaymentUpdate::amount(0), today(), now()).expect("valid");
        assert_eq!(none.status, BillStatus::Unpaid);
        assert_eq!(none.paid_on, None);
    }

    #[test]
    fn overpayment_is_clamped_and_reported() {
        let base = bill(1_000_000, 0, BillStatus::Unpaid);
        let (paid, over) =
            apply_payment(&base, &PaymentUpdate::amount(1_250_000), today(), now()).expect("valid");
        assert_eq!(paid.paid, 1_000_000);
        assert_eq!(paid.status, BillStatus::Paid);
        assert_eq!(over, 250_000);
    }

    #[test]
    fn explicit_status_wins_over_amount() {
        let base = bill(1_000_000, 400_000, BillStatus::PartiallyPaid);
        let update = PaymentUpdate {
            status: Some(BillStatus::Paid),
            paid_amount: Some(10),
            ..PaymentUpdate::default()
        };
        let (paid, _) = apply_payment(&base, &update, today(), now()).expect("valid");
        assert_eq!(paid.paid, 1_000_000);

        let (unpaid, _) =
            apply_payment(&paid, &PaymentUpdate::status(BillStatus::Unpaid), today(), now())
                .expect("valid");
        assert_eq!(unpaid.paid, 0);
    }

    #[test]
    fn installment_without_amount_keeps_valid_prior_amount() {
        let base = bill(1_000_000, 300_000, BillStatus::PartiallyPaid);
        let (kept, _) = apply_payment(
            &base,
            &PaymentUpdate::status(BillStatus::PartiallyPaid),
            today(),
            now(),
        )
        .expect("prior amount is a valid installment");
        assert_eq!(kept.paid, 300_000);
    }

    #[test]
    fn installment_outside_open_range_is_rejected() {
        let unpaid = bill(1_000_000, 0, BillStatus::Unpaid);
        assert_eq!(
            apply_payment(
                &unpaid,
                &PaymentUpdate::status(BillStatus::PartiallyPaid),
                today(),
                now()
            )
            .map(|_| ()),
            Err(ValidationError::InstallmentOutOfRange {
                paid: 0,
                owed: 1_000_000
            })
        );

        let update = PaymentUpdate {
            status: Some(BillStatus::PartiallyPaid),
            paid_amount: Some(1_000_000),
            ..PaymentUpdate::default()
        };
        assert!(apply_payment(&unpaid, &update, today(), now()).is_err());
    }

    #[test]
    fn rejects_negative_and_empty_updates() {
        let base = bill(1_000, 0, BillStatus::Unpaid);
        assert_eq!(
            apply_payment(&base, &PaymentUpdate::amount(-5), today(), now()).map(|_| ()),
            Err(ValidationError::NegativeAmount(-5))
        );
        assert!(matches!(
            apply_payment(&base, &PaymentUpdate::default(), today(), now()),
            Err(ValidationError::MissingField(_))
        ));
    }

    #[test]
    fn payment_update_parses_legacy_status_labels() {
        let update: PaymentUpdate =
            serde_json::from_str(r#"{"status": "Lunas"}"#).expect("legacy label accepted");
        assert_eq!(update.status, Some(BillStatus::Paid));
        assert!(serde_json::from_str::<PaymentUpdate>(r#"{"status": "done"}"#).is_err());
    }

    fn any_status() -> impl Strategy<Value = BillStatus> {
        prop_oneof![
            Just(BillStatus::Unpaid),
            Just(BillStatus::PartiallyPaid),
            Just(BillStatus::Paid),
        ]
    }

    proptest! {
        /// Property: any accepted reconciliation leaves status and paid in agreement.
        #[test]
        fn reconciliation_preserves_consistency(
            owed in 1i64..5_000_000,
            prior_paid in 0i64..6_000_000,
            prior_status in any_status(),
            status in proptest::option::of(any_status()),
            amount in proptest::option::of(0i64..6_000_000),
        ) {
            let base = bill(owed, prior_paid, prior_status);
            let update = PaymentUpdate { status, paid_amount: amount, ..PaymentUpdate::default() };

            if let Ok((updated, overpayment)) = apply_payment(&base, &update, today(), now()) {
                prop_assert!(updated.is_consistent());
                prop_assert!(updated.paid >= 0 && updated.paid <= owed);
                prop_assert!(overpayment >= 0);
            }
        }
    }
}
