use super::calendar::due_date;
use super::domain::{format_rupiah, Amount, BillingPeriod, NotificationTier};

/// Body stored on a notification when its tier is first reached.
pub fn tier_message(
    tier: NotificationTier,
    tenant_name: &str,
    period: BillingPeriod,
    amount_owed: Amount,
) -> String {
    let amount = format_rupiah(amount_owed);
    let due = due_date(period).format("%d %b %Y");
    match tier {
        NotificationTier::DueSoon7 => format!(
            "Reminder: {tenant_name}, your {period} bill of Rp {amount} is due in 7 days ({due})."
        ),
        NotificationTier::DueSoon3 => format!(
            "Attention: {tenant_name}, your {period} bill of Rp {amount} is due in 3 days ({due})."
        ),
        NotificationTier::DueToday => format!(
            "Urgent: {tenant_name}, your {period} bill of Rp {amount} is due today ({due})."
        ),
        NotificationTier::Overdue => format!(
            "Overdue: {tenant_name}, your {period} bill of Rp {amount} was due on {due}."
        ),
    }
}

/// Wraps a free-form reminder with the greeting and bill details.
pub fn reminder_envelope(
    tenant_name: &str,
    message: &str,
    period: BillingPeriod,
    amount_owed: Amount,
) -> String {
    format!(
        "Hello {tenant_name},\n\n{message}\n\nBilling period: {period}\nAmount: Rp {}\n\nPlease complete your payment.\n\nThank you.",
        format_rupiah(amount_owed)
    )
}
