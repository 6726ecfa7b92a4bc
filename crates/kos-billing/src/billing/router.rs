use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::dispatcher::{
    BroadcastReport, ContactSettings, DispatchOutcome, MessageSender, ReminderOutcome,
    TestMessageOutcome,
};
use super::domain::{
    Bill, BillId, BillingPeriod, DeliveryStatus, Notification, NotificationId, NotificationTier,
    TenantId,
};
use super::error::ValidationError;
use super::generator::GenerationReport;
use super::reconciler::{PaymentUpdate, Reconciliation, RepairReport};
use super::scheduler::{DueSummary, ScanReport};
use super::service::{BillDraft, BillingService, NotificationView};
use super::store::{BillFilter, BillStore, NotificationFilter, NotificationStore, TenantDirectory};
use crate::error::AppError;

type SharedService<S, D, M> = Arc<BillingService<S, D, M>>;

/// Router builder exposing the billing and notification operations.
pub fn billing_router<S, D, M>(service: SharedService<S, D, M>) -> Router
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Router::new()
        .route(
            "/api/v1/bills",
            get(list_bills_handler::<S, D, M>).post(create_bill_handler::<S, D, M>),
        )
        .route("/api/v1/bills/generate", post(generate_handler::<S, D, M>))
        .route("/api/v1/bills/repair", post(repair_handler::<S, D, M>))
        .route(
            "/api/v1/bills/:bill_id",
            get(get_bill_handler::<S, D, M>).delete(delete_bill_handler::<S, D, M>),
        )
        .route(
            "/api/v1/bills/:bill_id/payment",
            put(payment_handler::<S, D, M>),
        )
        .route(
            "/api/v1/bills/:bill_id/reminder",
            post(reminder_handler::<S, D, M>),
        )
        .route(
            "/api/v1/notifications",
            get(list_notifications_handler::<S, D, M>),
        )
        .route("/api/v1/notifications/scan", post(scan_handler::<S, D, M>))
        .route(
            "/api/v1/notifications/summary",
            get(summary_handler::<S, D, M>),
        )
        .route(
            "/api/v1/notifications/pending",
            get(pending_handler::<S, D, M>),
        )
        .route(
            "/api/v1/notifications/broadcast",
            post(broadcast_handler::<S, D, M>),
        )
        .route(
            "/api/v1/notifications/:notification_id",
            axum::routing::delete(delete_notification_handler::<S, D, M>),
        )
        .route(
            "/api/v1/notifications/:notification_id/dispatch",
            post(dispatch_handler::<S, D, M>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            put(acknowledge_handler::<S, D, M>),
        )
        .route(
            "/api/v1/tenants/:tenant_id/contact",
            get(contact_handler::<S, D, M>).put(update_contact_handler::<S, D, M>),
        )
        .route("/api/v1/messages/test", post(test_message_handler::<S, D, M>))
        .with_state(service)
}

/// JSON body extraction whose rejection is answered with the `AppError` envelope.
type JsonBody<T> = Result<Json<T>, JsonRejection>;

fn json_body<T>(payload: JsonBody<T>) -> Result<T, ValidationError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ValidationError::MalformedBody(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateRequest {
    pub(crate) period: BillingPeriod,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BillQuery {
    #[serde(default)]
    pub(crate) period: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) tenant_id: Option<u64>,
}

impl BillQuery {
    fn into_filter(self) -> Result<BillFilter, ValidationError> {
        Ok(BillFilter {
            period: self.period.as_deref().map(str::parse).transpose()?,
            status: self.status.as_deref().map(str::parse).transpose()?,
            tenant_id: self.tenant_id.map(TenantId),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotificationQuery {
    /// Comma-separated delivery statuses.
    #[serde(default)]
    pub(crate) status: Option<String>,
    /// Comma-separated tiers (`overdue`, `H-1`, ...).
    #[serde(default)]
    pub(crate) tier: Option<String>,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

impl NotificationQuery {
    fn into_filter(self) -> Result<NotificationFilter, ValidationError> {
        Ok(NotificationFilter {
            statuses: parse_list::<DeliveryStatus>(self.status.as_deref())?
                .into_iter()
                .collect(),
            tiers: parse_list::<NotificationTier>(self.tier.as_deref())?
                .into_iter()
                .collect(),
            limit: self.limit,
            ..NotificationFilter::default()
        })
    }
}

fn parse_list<T>(raw: Option<&str>) -> Result<Vec<T>, ValidationError>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse)
        .collect()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReminderRequest {
    pub(crate) message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BroadcastRequest {
    #[serde(default)]
    pub(crate) tiers: Vec<NotificationTier>,
}

impl BroadcastRequest {
    /// An empty body selects the default tiers.
    fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|err| ValidationError::MalformedBody(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactUpdate {
    #[serde(alias = "no_hp")]
    pub(crate) phone: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TestMessageRequest {
    pub(crate) to_number: String,
    pub(crate) message: String,
}

pub(crate) async fn generate_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    payload: JsonBody<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerationReport>), AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let request = json_body(payload)?;
    let report = service.generate_bills(request.period)?;
    let status = if report.created_count > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

pub(crate) async fn list_bills_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Query(query): Query<BillQuery>,
) -> Result<Json<Vec<Bill>>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let filter = query.into_filter()?;
    Ok(Json(service.bills(&filter)?))
}

pub(crate) async fn create_bill_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    payload: JsonBody<BillDraft>,
) -> Result<(StatusCode, Json<Bill>), AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let bill = service.create_bill(json_body(payload)?)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

pub(crate) async fn get_bill_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(bill_id): Path<u64>,
) -> Result<Json<Bill>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(service.bill(BillId(bill_id))?))
}

pub(crate) async fn delete_bill_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(bill_id): Path<u64>,
) -> Result<StatusCode, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    service.delete_bill(BillId(bill_id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn payment_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(bill_id): Path<u64>,
    payload: JsonBody<PaymentUpdate>,
) -> Result<Json<Reconciliation>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let update = json_body(payload)?;
    Ok(Json(service.reconcile_payment(BillId(bill_id), &update)?))
}

pub(crate) async fn repair_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
) -> Result<Json<RepairReport>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(service.repair_payments()?))
}

pub(crate) async fn reminder_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(bill_id): Path<u64>,
    payload: JsonBody<ReminderRequest>,
) -> Result<Json<ReminderOutcome>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let request = json_body(payload)?;
    Ok(Json(service.send_reminder(BillId(bill_id), &request.message)?))
}

pub(crate) async fn scan_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
) -> Result<Json<ScanReport>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(service.run_notification_scan()?))
}

pub(crate) async fn summary_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
) -> Result<Json<DueSummary>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(service.due_summary()?))
}

pub(crate) async fn list_notifications_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationView>>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let filter = query.into_filter()?;
    Ok(Json(service.notifications(&filter)?))
}

pub(crate) async fn pending_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let tiers = parse_list::<NotificationTier>(query.tier.as_deref())?;
    Ok(Json(service.pending_notifications(&tiers)?))
}

pub(crate) async fn dispatch_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(notification_id): Path<u64>,
) -> Result<Json<DispatchOutcome>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(
        service.dispatch_notification(NotificationId(notification_id))?,
    ))
}

pub(crate) async fn acknowledge_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(notification_id): Path<u64>,
) -> Result<Json<Notification>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(
        service.acknowledge_notification(NotificationId(notification_id))?,
    ))
}

pub(crate) async fn delete_notification_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(notification_id): Path<u64>,
) -> Result<StatusCode, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    service.delete_notification(NotificationId(notification_id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn broadcast_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    body: Bytes,
) -> Result<Json<BroadcastReport>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let request = BroadcastRequest::from_body(&body)?;
    Ok(Json(service.broadcast(&request.tiers)?))
}

pub(crate) async fn contact_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(tenant_id): Path<u64>,
) -> Result<Json<ContactSettings>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    Ok(Json(service.contact_settings(TenantId(tenant_id))?))
}

pub(crate) async fn update_contact_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    Path(tenant_id): Path<u64>,
    payload: JsonBody<ContactUpdate>,
) -> Result<Json<ContactSettings>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let update = json_body(payload)?;
    Ok(Json(
        service.update_contact(TenantId(tenant_id), &update.phone)?,
    ))
}

pub(crate) async fn test_message_handler<S, D, M>(
    State(service): State<SharedService<S, D, M>>,
    payload: JsonBody<TestMessageRequest>,
) -> Result<Json<TestMessageOutcome>, AppError>
where
    S: BillStore + NotificationStore + 'static,
    D: TenantDirectory + 'static,
    M: MessageSender + 'static,
{
    let request = json_body(payload)?;
    Ok(Json(
        service.send_test_message(&request.to_number, &request.message)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_query_accepts_labels_and_lists() {
        let filter = NotificationQuery {
            status: Some("pending, sent".to_string()),
            tier: Some("H-1,overdue".to_string()),
            limit: Some(10),
        }
        .into_filter()
        .expect("valid query");

        assert_eq!(filter.statuses.len(), 2);
        assert!(filter.tiers.contains(&NotificationTier::DueToday));
        assert!(filter.tiers.contains(&NotificationTier::Overdue));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let result = NotificationQuery {
            tier: Some("H-5".to_string()),
            ..NotificationQuery::default()
        }
        .into_filter();
        assert_eq!(
            result,
            Err(ValidationError::UnknownTier("H-5".to_string()))
        );
    }

    #[test]
    fn bill_query_parses_status_aliases() {
        let filter = BillQuery {
            period: Some("2025-11".to_string()),
            status: Some("lunas".to_string()),
            tenant_id: Some(4),
        }
        .into_filter()
        .expect("valid query");
        assert_eq!(filter.status, Some(crate::billing::BillStatus::Paid));
        assert_eq!(filter.tenant_id, Some(TenantId(4)));
    }

    #[test]
    fn broadcast_body_is_optional() {
        let empty = BroadcastRequest::from_body(b"").expect("empty body");
        assert!(empty.tiers.is_empty());
        let blank = BroadcastRequest::from_body(b" \n").expect("blank body");
        assert!(blank.tiers.is_empty());

        let named = BroadcastRequest::from_body(br#"{"tiers":["overdue"]}"#).expect("tiers");
        assert_eq!(named.tiers, vec![NotificationTier::Overdue]);

        let err = BroadcastRequest::from_body(br#"{"tiers":["H-9"]}"#).expect_err("rejected");
        assert!(matches!(err, ValidationError::MalformedBody(ref reason) if reason.contains("H-9")));
    }
}
