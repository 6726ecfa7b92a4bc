use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::calendar::{bucket, days_until_due, tier_for, Clock, TierPolicy};
use super::domain::{Amount, Bill, NewNotification, NotificationId, NotificationTier};
use super::error::BillingError;
use super::messages::tier_message;
use super::outcome::{Completion, ItemFailure};
use super::store::{outstanding_bills, BillStore, NotificationStore, StoreError, TenantDirectory};

/// Result of one notification scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub as_of: NaiveDate,
    pub completion: Completion,
    /// Unpaid bills inspected.
    pub evaluated: usize,
    pub created: usize,
    pub already_notified: usize,
    pub created_ids: Vec<NotificationId>,
    pub failures: Vec<ItemFailure>,
}

/// Count and money held in one due bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DueBucket {
    pub count: usize,
    pub amount_owed: Amount,
    pub outstanding: Amount,
}

impl DueBucket {
    fn add(&mut self, bill: &Bill) {
        self.count += 1;
        self.amount_owed += bill.amount_owed;
        self.outstanding += bill.outstanding();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueBucketEntry {
    pub tier: NotificationTier,
    pub label: &'static str,
    #[serde(flatten)]
    pub totals: DueBucket,
}

/// Dashboard projection of unpaid bills by urgency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueSummary {
    pub as_of: NaiveDate,
    pub buckets: Vec<DueBucketEntry>,
    pub total: DueBucket,
}

impl DueSummary {
    pub fn bucket(&self, tier: NotificationTier) -> Option<&DueBucket> {
        self.buckets
            .iter()
            .find(|entry| entry.tier == tier)
            .map(|entry| &entry.totals)
    }
}

/// Turns unpaid bills into tiered notification records, at most one per (bill, tier).
///
/// Holds no state between scans; every run re-reads the store, so invoking it twice
/// on the same day creates nothing the second time.
pub struct NotificationScheduler<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
    policy: TierPolicy,
}

enum Step {
    Created(NotificationId),
    AlreadyNotified,
    Ineligible,
    Failed(ItemFailure),
}

impl<S, D> NotificationScheduler<S, D>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, clock: Arc<dyn Clock>, policy: TierPolicy) -> Self {
        Self {
            store,
            directory,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> TierPolicy {
        self.policy
    }

    pub fn run_scan(&self) -> Result<ScanReport, BillingError> {
        let today = self.clock.today();
        let bills = outstanding_bills(self.store.as_ref())?;
        let mut report = ScanReport {
            as_of: today,
            completion: Completion::Succeeded,
            evaluated: bills.len(),
            created: 0,
            already_notified: 0,
            created_ids: Vec::new(),
            failures: Vec::new(),
        };
        let mut aborted = false;

        for bill in &bills {
            match self.scan_bill(bill, today) {
                Ok(Step::Created(id)) => report.created_ids.push(id),
                Ok(Step::AlreadyNotified) => report.already_notified += 1,
                Ok(Step::Ineligible) => {}
                Ok(Step::Failed(failure)) => report.failures.push(failure),
                Err(err) => {
                    error!(bill = %bill.id, error = %err, "notification scan aborted by store failure");
                    report
                        .failures
                        .push(ItemFailure::new(format!("bill {}", bill.id), err));
                    aborted = true;
                    break;
                }
            }
        }

        report.created = report.created_ids.len();
        report.completion = Completion::from_parts(&report.failures, aborted);
        info!(
            as_of = %today,
            policy = ?self.policy,
            evaluated = report.evaluated,
            created = report.created,
            already_notified = report.already_notified,
            "notification scan finished"
        );
        Ok(report)
    }

    fn scan_bill(&self, bill: &Bill, today: NaiveDate) -> Result<Step, StoreError> {
        let Some(tier) = tier_for(bill.period, today, self.policy) else {
            return Ok(Step::Ineligible);
        };

        if self.store.find_notification(bill.id, tier)?.is_some() {
            return Ok(Step::AlreadyNotified);
        }

        let Some(tenant) = self.directory.tenant(bill.tenant_id)? else {
            warn!(bill = %bill.id, tenant = %bill.tenant_id, "bill references unknown tenant");
            return Ok(Step::Failed(ItemFailure::new(
                format!("bill {}", bill.id),
                format!("tenant {} not found", bill.tenant_id),
            )));
        };

        let notification = NewNotification {
            tenant_id: bill.tenant_id,
            bill_id: bill.id,
            tier,
            message: tier_message(tier, &tenant.name, bill.period, bill.amount_owed),
            created_at: self.clock.now(),
        };

        match self.store.insert_notification(notification) {
            Ok(created) => {
                debug!(bill = %bill.id, tier = tier.label(), notification = %created.id, "notification created");
                Ok(Step::Created(created.id))
            }
            Err(StoreError::Conflict) => Ok(Step::AlreadyNotified),
            Err(StoreError::NotFound) => Ok(Step::Failed(ItemFailure::new(
                format!("bill {}", bill.id),
                StoreError::NotFound,
            ))),
            Err(err) => Err(err),
        }
    }

    /// Counts and totals of unpaid bills per due bucket.
    ///
    /// Buckets are windows (overdue, today, within 3 days, within 7 days) whatever
    /// the scheduling policy, so the dashboard shows everything due this week.
    pub fn due_summary(&self) -> Result<DueSummary, BillingError> {
        let today = self.clock.today();
        let bills = outstanding_bills(self.store.as_ref())?;

        let mut buckets: Vec<DueBucketEntry> = NotificationTier::ordered()
            .into_iter()
            .map(|tier| DueBucketEntry {
                tier,
                label: tier.label(),
                totals: DueBucket::default(),
            })
            .collect();
        let mut total = DueBucket::default();

        for bill in &bills {
            let Some(tier) = bucket(days_until_due(bill.period, today)) else {
                continue;
            };
            if let Some(entry) = buckets.iter_mut().find(|entry| entry.tier == tier) {
                entry.totals.add(bill);
                total.add(bill);
            }
        }

        Ok(DueSummary {
            as_of: today,
            buckets,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::calendar::FixedClock;
    use crate::billing::domain::{
        BillCategory, BillStatus, BillingPeriod, NewBill, Room, RoomId, RoomStatus, Tenant,
        TenantId,
    };
    use crate::billing::memory::{InMemoryBillingStore, InMemoryTenantDirectory};
    use crate::billing::store::NotificationFilter;
    use chrono::Utc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn seeded(periods: &[&str]) -> (Arc<InMemoryBillingStore>, Arc<InMemoryTenantDirectory>) {
        let store = Arc::new(InMemoryBillingStore::default());
        let directory = Arc::new(InMemoryTenantDirectory::default());
        directory
            .upsert_room(Room {
                id: RoomId(1),
                name: "A1".to_string(),
                price: 1_000_000,
                status: RoomStatus::Occupied,
            })
            .expect("room");
        for (index, period) in periods.iter().enumerate() {
            let tenant = TenantId(index as u64 + 1);
            directory
                .upsert_tenant(Tenant {
                    id: tenant,
                    name: format!("Tenant {}", tenant),
                    phone: Some("0812000".to_string()),
                    room_id: RoomId(1),
                })
                .expect("tenant");
            store
                .insert_bill(NewBill {
                    tenant_id: tenant,
                    room_id: RoomId(1),
                    room_name: "A1".to_string(),
                    period: period.parse::<BillingPeriod>().expect("valid period"),
                    amount_owed: 1_000_000,
                    category: BillCategory::TenantRent,
                    created_at: Utc::now(),
                })
                .expect("bill");
        }
        (store, directory)
    }

    fn scheduler(
        store: &Arc<InMemoryBillingStore>,
        directory: &Arc<InMemoryTenantDirectory>,
        today: NaiveDate,
        policy: TierPolicy,
    ) -> NotificationScheduler<InMemoryBillingStore, InMemoryTenantDirectory> {
        NotificationScheduler::new(
            store.clone(),
            directory.clone(),
            Arc::new(FixedClock::new(today)),
            policy,
        )
    }

    #[test]
    fn scan_is_idempotent_within_a_day() {
        let (store, directory) = seeded(&["2025-11"]);
        let scheduler = scheduler(&store, &directory, day(2025, 11, 23), TierPolicy::ExactDay);

        let first = scheduler.run_scan().expect("first scan");
        let second = scheduler.run_scan().expect("second scan");

        assert_eq!(first.created, 1);
        assert_eq!(second.created, 0);
        assert_eq!(second.already_notified, 1);
        let stored = store
            .notifications(&NotificationFilter::default())
            .expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tier, NotificationTier::DueSoon7);
        assert!(stored[0].message.contains("Tenant 1"));
    }

    #[test]
    fn bills_accumulate_one_record_per_tier_as_they_age() {
        let (store, directory) = seeded(&["2025-11"]);
        for today in [day(2025, 11, 23), day(2025, 11, 27), day(2025, 11, 30), day(2025, 12, 2), day(2025, 12, 3)] {
            scheduler(&store, &directory, today, TierPolicy::ExactDay)
                .run_scan()
                .expect("scan");
        }
        let mut tiers: Vec<NotificationTier> = store
            .notifications(&NotificationFilter::default())
            .expect("list")
            .into_iter()
            .map(|notification| notification.tier)
            .collect();
        tiers.sort();
        assert_eq!(tiers, NotificationTier::ordered().to_vec());
    }

    #[test]
    fn paid_bills_and_off_boundary_days_are_ignored() {
        let (store, directory) = seeded(&["2025-11", "2025-11"]);
        let mut paid = store.bill(crate::billing::domain::BillId(1)).expect("get").expect("bill");
        paid.status = BillStatus::Paid;
        paid.paid = paid.amount_owed;
        store.update_bill(&paid).expect("update");

        let report = scheduler(&store, &directory, day(2025, 11, 30), TierPolicy::ExactDay)
            .run_scan()
            .expect("scan");
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.created, 1);

        let quiet = scheduler(&store, &directory, day(2025, 11, 25), TierPolicy::ExactDay)
            .run_scan()
            .expect("scan");
        assert_eq!(quiet.created, 0);
    }

    #[test]
    fn exact_policy_misses_a_skipped_boundary_but_catch_up_recovers_it() {
        let (store, directory) = seeded(&["2025-11"]);
        // Scanner was down on the 23rd; d = 6 on the 24th.
        let exact = scheduler(&store, &directory, day(2025, 11, 24), TierPolicy::ExactDay)
            .run_scan()
            .expect("scan");
        assert_eq!(exact.created, 0);

        let catch_up = scheduler(&store, &directory, day(2025, 11, 24), TierPolicy::CatchUp)
            .run_scan()
            .expect("scan");
        assert_eq!(catch_up.created, 1);
        assert!(store
            .find_notification(crate::billing::domain::BillId(1), NotificationTier::DueSoon7)
            .expect("lookup")
            .is_some());
    }

    #[test]
    fn unknown_tenant_is_reported_per_item() {
        let (store, _) = seeded(&["2025-11"]);
        let empty = Arc::new(InMemoryTenantDirectory::default());
        let report = scheduler(&store, &empty, day(2025, 11, 30), TierPolicy::ExactDay)
            .run_scan()
            .expect("scan");
        assert_eq!(report.completion, Completion::PartiallySucceeded);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.created, 0);
    }

    #[test]
    fn due_summary_buckets_by_window() {
        let (store, directory) = seeded(&["2025-11", "2025-10", "2026-01"]);
        let mut partial = store.bill(crate::billing::domain::BillId(2)).expect("get").expect("bill");
        partial.status = BillStatus::PartiallyPaid;
        partial.paid = 400_000;
        store.update_bill(&partial).expect("update");

        let summary = scheduler(&store, &directory, day(2025, 11, 28), TierPolicy::ExactDay)
            .due_summary()
            .expect("summary");

        let soon = summary.bucket(NotificationTier::DueSoon3).expect("bucket");
        assert_eq!(soon.count, 1);
        assert_eq!(soon.amount_owed, 1_000_000);
        let overdue = summary.bucket(NotificationTier::Overdue).expect("bucket");
        assert_eq!(overdue.count, 1);
        assert_eq!(overdue.outstanding, 600_000);
        assert_eq!(summary.total.count, 2, "January bill is not due yet");
        assert_eq!(summary.bucket(NotificationTier::DueToday).map(|b| b.count), Some(0));
    }
}
