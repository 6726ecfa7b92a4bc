pub mod calendar;
mod directory;
mod dispatcher;
pub mod domain;
mod error;
mod generator;
pub mod memory;
mod messages;
mod outcome;
mod reconciler;
mod router;
mod scheduler;
mod service;
pub mod store;

pub use calendar::{Clock, FixedClock, SystemClock, TierPolicy};
pub use directory::{DirectoryImportError, DirectoryImporter};
pub use dispatcher::{
    format_contact, BroadcastReport, ContactSettings, DeliveryError, DeliveryReceipt,
    DispatchOutcome, DispatchSettings, MessageSender, NotificationDispatcher, ReminderOutcome,
    TestMessageOutcome,
};
pub use domain::{
    format_rupiah, Amount, Bill, BillCategory, BillId, BillStatus, BillingPeriod, DeliveryStatus,
    NewTenant, Notification, NotificationId, NotificationTier, Room, RoomId, RoomStatus, Tenant,
    TenantId,
};
pub use error::{BillingError, ValidationError};
pub use generator::{BillingGenerator, GenerationReport};
pub use messages::{reminder_envelope, tier_message};
pub use outcome::{Completion, ItemFailure};
pub use reconciler::{
    apply_payment, PaymentReconciler, PaymentUpdate, Reconciliation, RepairReport,
};
pub use router::billing_router;
pub use scheduler::{DueBucket, DueBucketEntry, DueSummary, NotificationScheduler, ScanReport};
pub use service::{BillDraft, BillingService, NotificationView, MAX_NOTIFICATION_PAGE};
pub use store::{
    BillFilter, BillStore, NotificationFilter, NotificationStore, StoreError, TenantDirectory,
};
