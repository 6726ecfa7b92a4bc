use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::calendar::Clock;
use super::domain::{Bill, BillCategory, BillingPeriod, NewBill, Room, Tenant};
use super::error::BillingError;
use super::outcome::{Completion, ItemFailure};
use super::store::{BillStore, StoreError, TenantDirectory};

/// Result of generating rent bills for one period.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub period: BillingPeriod,
    pub completion: Completion,
    pub created_count: usize,
    pub skipped_count: usize,
    pub created: Vec<Bill>,
    /// Names of tenants that already had a bill for the period.
    pub skipped: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl GenerationReport {
    fn new(period: BillingPeriod) -> Self {
        Self {
            period,
            completion: Completion::Succeeded,
            created_count: 0,
            skipped_count: 0,
            created: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn finish(mut self, aborted: bool) -> Self {
        self.created_count = self.created.len();
        self.skipped_count = self.skipped.len();
        self.completion = Completion::from_parts(&self.failures, aborted);
        self
    }
}

/// Creates one tenant-rent bill per tenant for a period, skipping tenants already billed.
pub struct BillingGenerator<B, D> {
    bills: Arc<B>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
}

enum Step {
    Created(Bill),
    Skipped,
    Failed(ItemFailure),
}

impl<B, D> BillingGenerator<B, D>
where
    B: BillStore + 'static,
    D: TenantDirectory + 'static,
{
    pub fn new(bills: Arc<B>, directory: Arc<D>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bills,
            directory,
            clock,
        }
    }

    /// Bill every tenant in the directory for `period`.
    ///
    /// An unresolvable room fails the whole call with [`BillingError::UnresolvedRoom`];
    /// bills created before that tenant are kept. A store outage mid-batch ends the
    /// batch with [`Completion::Aborted`].
    pub fn generate(&self, period: BillingPeriod) -> Result<GenerationReport, BillingError> {
        let tenants = self.directory.tenants().map_err(BillingError::from)?;
        let mut report = GenerationReport::new(period);

        for tenant in tenants {
            let room = match self.directory.room(tenant.room_id) {
                Ok(Some(room)) => room,
                Ok(None) | Err(StoreError::NotFound) => {
                    error!(
                        tenant = %tenant.id,
                        room = %tenant.room_id,
                        created = report.created.len(),
                        "bill generation aborted: room cannot be resolved"
                    );
                    return Err(BillingError::UnresolvedRoom {
                        tenant_id: tenant.id,
                        tenant_name: tenant.name,
                        room_id: tenant.room_id,
                        created: report.created.len(),
                    });
                }
                Err(err) => return Ok(abort(report, &tenant, err)),
            };

            match self.bill_tenant(period, &tenant, &room) {
                Ok(Step::Created(bill)) => report.created.push(bill),
                Ok(Step::Skipped) => report.skipped.push(tenant.name),
                Ok(Step::Failed(failure)) => report.failures.push(failure),
                Err(err) => return Ok(abort(report, &tenant, err)),
            }
        }

        let report = report.finish(false);
        info!(
            period = %period,
            created = report.created_count,
            skipped = report.skipped_count,
            failed = report.failures.len(),
            "monthly bills generated"
        );
        Ok(report)
    }

    fn bill_tenant(
        &self,
        period: BillingPeriod,
        tenant: &Tenant,
        room: &Room,
    ) -> Result<Step, StoreError> {
        if self
            .bills
            .find_bill(tenant.id, period, BillCategory::TenantRent)?
            .is_some()
        {
            debug!(tenant = %tenant.id, %period, "tenant already billed");
            return Ok(Step::Skipped);
        }

        if room.price <= 0 {
            warn!(tenant = %tenant.id, room = %room.id, price = room.price, "room has no usable price");
            return Ok(Step::Failed(ItemFailure::new(
                tenant.name.clone(),
                format!("room {} has non-positive price {}", room.name, room.price),
            )));
        }

        let new_bill = NewBill {
            tenant_id: tenant.id,
            room_id: room.id,
            room_name: room.name.clone(),
            period,
            amount_owed: room.price,
            category: BillCategory::TenantRent,
            created_at: self.clock.now(),
        };

        match self.bills.insert_bill(new_bill) {
            Ok(bill) => Ok(Step::Created(bill)),
            // Another generator won the race; the uniqueness constraint did its job.
            Err(StoreError::Conflict) => Ok(Step::Skipped),
            Err(StoreError::NotFound) => Ok(Step::Failed(ItemFailure::new(
                tenant.name.clone(),
                StoreError::NotFound,
            ))),
            Err(err) => Err(err),
        }
    }
}

fn abort(report: GenerationReport, tenant: &Tenant, err: StoreError) -> GenerationReport {
    error!(
        tenant = %tenant.id,
        error = %err,
        created = report.created.len(),
        "bill generation aborted by store failure"
    );
    let mut report = report;
    report
        .failures
        .push(ItemFailure::new(tenant.name.clone(), err));
    report.finish(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::calendar::FixedClock;
    use crate::billing::domain::{BillStatus, RoomId, RoomStatus, TenantId};
    use crate::billing::memory::{InMemoryBillingStore, InMemoryTenantDirectory};
    use crate::billing::store::BillFilter;
    use chrono::NaiveDate;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2025, 11, 1).expect("valid date"),
        ))
    }

    fn directory_with(rooms: &[(u64, i64)], tenants: &[(u64, &str, u64)]) -> InMemoryTenantDirectory {
        let directory = InMemoryTenantDirectory::default();
        for (id, price) in rooms {
            directory
                .upsert_room(Room {
                    id: RoomId(*id),
                    name: format!("Room {id}"),
                    price: *price,
                    status: RoomStatus::Occupied,
                })
                .expect("room stored");
        }
        for (id, name, room) in tenants {
            directory
                .upsert_tenant(Tenant {
                    id: TenantId(*id),
                    name: name.to_string(),
                    phone: None,
                    room_id: RoomId(*room),
                })
                .expect("tenant stored");
        }
        directory
    }

    fn period() -> BillingPeriod {
        "2025-11".parse().expect("valid period")
    }

    #[test]
    fn creates_unpaid_rent_bill_priced_from_room() {
        let store = Arc::new(InMemoryBillingStore::default());
        let directory = Arc::new(directory_with(&[(1, 1_000_000)], &[(1, "Andi", 1)]));
        let generator = BillingGenerator::new(store.clone(), directory, clock());

        let report = generator.generate(period()).expect("generation runs");

        assert_eq!(report.completion, Completion::Succeeded);
        assert_eq!(report.created_count, 1);
        let bill = &report.created[0];
        assert_eq!(bill.amount_owed, 1_000_000);
        assert_eq!(bill.paid, 0);
        assert_eq!(bill.status, BillStatus::Unpaid);
        assert_eq!(bill.category, BillCategory::TenantRent);
        assert_eq!(bill.room_name, "Room 1");
    }

    #[test]
    fn second_run_skips_every_tenant() {
        let store = Arc::new(InMemoryBillingStore::default());
        let directory = Arc::new(directory_with(
            &[(1, 1_000_000), (2, 800_000)],
            &[(1, "Andi", 1), (2, "Sari", 2)],
        ));
        let generator = BillingGenerator::new(store.clone(), directory, clock());

        let first = generator.generate(period()).expect("first run");
        let second = generator.generate(period()).expect("second run");

        assert_eq!(first.created_count + first.skipped_count, 2);
        assert_eq!(first.created_count, 2);
        assert_eq!(second.created_count, 0);
        assert_eq!(second.skipped, vec!["Andi".to_string(), "Sari".to_string()]);
        assert_eq!(store.bills(&BillFilter::default()).expect("list").len(), 2);
    }

    #[test]
    fn unresolved_room_aborts_but_keeps_earlier_bills() {
        let store = Arc::new(InMemoryBillingStore::default());
        let directory = Arc::new(directory_with(
            &[(1, 1_000_000)],
            &[(1, "Andi", 1), (2, "Budi", 42), (3, "Citra", 1)],
        ));
        let generator = BillingGenerator::new(store.clone(), directory, clock());

        match generator.generate(period()) {
            Err(BillingError::UnresolvedRoom {
                tenant_name,
                room_id,
                created,
                ..
            }) => {
                assert_eq!(tenant_name, "Budi");
                assert_eq!(room_id, RoomId(42));
                assert_eq!(created, 1);
            }
            other => panic!("expected unresolved room, got {other:?}"),
        }
        assert_eq!(store.bills(&BillFilter::default()).expect("list").len(), 1);
    }

    #[test]
    fn zero_priced_room_is_an_item_failure() {
        let store = Arc::new(InMemoryBillingStore::default());
        let directory = Arc::new(directory_with(
            &[(1, 0), (2, 700_000)],
            &[(1, "Andi", 1), (2, "Sari", 2)],
        ));
        let generator = BillingGenerator::new(store, directory, clock());

        let report = generator.generate(period()).expect("generation runs");
        assert_eq!(report.completion, Completion::PartiallySucceeded);
        assert_eq!(report.created_count, 1);
        assert_eq!(report.failures[0].subject, "Andi");
    }
}
