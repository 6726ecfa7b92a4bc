use crate::infra::{build_service, load_directory, parse_date, parse_period};
use chrono::NaiveDate;
use clap::Args;
use kos_billing::billing::calendar::{days_until_due, due_date, tier_for};
use kos_billing::billing::{
    format_rupiah, BillStatus, BillingError, BillingPeriod, Clock, FixedClock, PaymentUpdate,
    SystemClock, TenantDirectory, TierPolicy,
};
use kos_billing::config::AppConfig;
use kos_billing::error::AppError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DueArgs {
    /// Billing period (YYYY-MM)
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: BillingPeriod,
    /// Evaluation date (YYYY-MM-DD). Defaults to today in the configured offset.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Tenant directory CSV. A three-tenant sample is used when omitted.
    #[arg(long)]
    pub(crate) directory: Option<PathBuf>,
    /// Billing period to generate (YYYY-MM). Defaults to the current month.
    #[arg(long, value_parser = parse_period)]
    pub(crate) period: Option<BillingPeriod>,
    /// Date the demo runs as (YYYY-MM-DD). Defaults to the period's due date.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_due(args: DueArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let today = args
        .today
        .unwrap_or_else(|| SystemClock::new(config.billing.utc_offset()).today());
    let period = args.period;
    let days = days_until_due(period, today);

    println!("Billing period {period}");
    println!("- Due date: {}", due_date(period));
    println!("- As of: {today}");
    println!("- Days until due: {days}");
    for policy in [TierPolicy::ExactDay, TierPolicy::CatchUp] {
        let tier = tier_for(period, today, policy)
            .map(|tier| tier.label())
            .unwrap_or("no reminder");
        let marker = if policy == config.billing.tier_policy {
            " (configured)"
        } else {
            ""
        };
        println!("- Tier under {policy:?}{marker}: {tier}");
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        directory,
        period,
        today,
    } = args;

    let config = AppConfig::load()?;
    let period = period.unwrap_or_else(|| {
        BillingPeriod::containing(SystemClock::new(config.billing.utc_offset()).today())
    });
    let today = today.unwrap_or_else(|| due_date(period));

    let directory = load_directory(directory.as_deref())?;
    let tenant_names = directory
        .tenants()
        .map_err(BillingError::from)?
        .into_iter()
        .map(|tenant| (tenant.id, tenant.name))
        .collect::<HashMap<_, _>>();
    let service = build_service(
        directory,
        Arc::new(FixedClock::new(today)),
        &config.billing,
    );

    println!("Kos billing demo for {period} (as of {today}, due {})", due_date(period));

    let generation = service.generate_bills(period)?;
    println!(
        "\nGenerated {} bill(s), skipped {}",
        generation.created_count, generation.skipped_count
    );
    for bill in &generation.created {
        let name = tenant_names
            .get(&bill.tenant_id)
            .map(String::as_str)
            .unwrap_or("unknown tenant");
        println!(
            "  - #{} {} ({}): Rp {}",
            bill.id,
            name,
            bill.room_name,
            format_rupiah(bill.amount_owed)
        );
    }

    println!("\nPayments");
    let mut bills = generation.created.iter();
    if let Some(bill) = bills.next() {
        let half = bill.amount_owed / 2;
        let result = service.reconcile_payment(
            bill.id,
            &PaymentUpdate {
                received_by: Some("front desk".to_string()),
                ..PaymentUpdate::amount(half)
            },
        )?;
        println!(
            "  - #{} installment Rp {} -> {} (outstanding Rp {})",
            bill.id,
            format_rupiah(half),
            result.bill.status.label(),
            format_rupiah(result.bill.outstanding())
        );
    }
    if let Some(bill) = bills.next() {
        let result = service.reconcile_payment(bill.id, &PaymentUpdate::status(BillStatus::Paid))?;
        println!(
            "  - #{} settled -> {} (paid Rp {})",
            bill.id,
            result.bill.status.label(),
            format_rupiah(result.bill.paid)
        );
    }

    let scan = service.run_notification_scan()?;
    println!(
        "\nReminder scan ({:?} policy): {} created, {} already notified, {} unpaid bill(s) evaluated",
        config.billing.tier_policy, scan.created, scan.already_notified, scan.evaluated
    );

    let summary = service.due_summary()?;
    println!("\nDue summary");
    for entry in &summary.buckets {
        println!(
            "  - {:<8} {} bill(s) | owed Rp {} | outstanding Rp {}",
            entry.label,
            entry.totals.count,
            format_rupiah(entry.totals.amount_owed),
            format_rupiah(entry.totals.outstanding)
        );
    }
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("  JSON payload:\n{json}"),
        Err(err) => println!("  JSON payload unavailable: {err}"),
    }

    let broadcast = service.broadcast(&[])?;
    println!(
        "\nBroadcast to H-1/OVERDUE: {} sent, {} failed, {} skipped, {} left for later ({:?})",
        broadcast.success,
        broadcast.failed,
        broadcast.skipped,
        broadcast.remaining,
        broadcast.completion
    );
    for failure in &broadcast.failures {
        println!("  - {}: {}", failure.subject, failure.reason);
    }

    Ok(())
}
