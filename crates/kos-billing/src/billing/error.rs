use super::dispatcher::DeliveryError;
use super::domain::{Amount, RoomId, TenantId};
use super::store::StoreError;

/// Rejected caller input. Returned before any side effect happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("billing period '{0}' must use the YYYY-MM format")]
    InvalidPeriod(String),
    #[error("unrecognized bill status '{0}'")]
    UnknownStatus(String),
    #[error("unrecognized notification tier '{0}'")]
    UnknownTier(String),
    #[error("unrecognized bill category '{0}'")]
    UnknownCategory(String),
    #[error("unrecognized delivery status '{0}'")]
    UnknownDeliveryStatus(String),
    #[error("amount {0} must not be negative")]
    NegativeAmount(Amount),
    #[error("amount {0} must be greater than zero")]
    NonPositiveAmount(Amount),
    #[error("an installment needs a paid amount between 0 and {owed} (exclusive), got {paid}")]
    InstallmentOutOfRange { paid: Amount, owed: Amount },
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("reminder message must not be empty")]
    EmptyMessage,
    #[error("notification {0} is no longer pending")]
    NotificationNotPending(u64),
    #[error("tier {0} cannot be broadcast; only H-1 and OVERDUE reminders go out in bulk")]
    TierNotBroadcastable(&'static str),
    #[error("bill {0} is already paid; its reminders are no longer sent")]
    BillAlreadyPaid(u64),
    #[error("'{0}' is not a dialable phone number")]
    InvalidContact(String),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Error raised by the billing components.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(
        "room {room_id} assigned to tenant '{tenant_name}' ({tenant_id}) could not be resolved; \
         {created} bill(s) created earlier in the batch were kept"
    )]
    UnresolvedRoom {
        tenant_id: TenantId,
        tenant_name: String,
        room_id: RoomId,
        created: usize,
    },
}

impl BillingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wraps a store failure outside the batch paths, where a conflict is a real error.
    pub fn from_store(entity: &'static str, id: impl ToString, error: StoreError) -> Self {
        match error {
            StoreError::NotFound => Self::not_found(entity, id),
            StoreError::Conflict => Self::Conflict(format!("{entity} {}", id.to_string())),
            StoreError::Unavailable(reason) => Self::Storage(reason),
        }
    }
}

impl From<StoreError> for BillingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Self::not_found("record", "(unknown)"),
            StoreError::Conflict => Self::Conflict("record".to_string()),
            StoreError::Unavailable(reason) => Self::Storage(reason),
        }
    }
}
