use chrono::NaiveDate;
use kos_billing::billing::memory::{InMemoryBillingStore, InMemoryTenantDirectory};
use kos_billing::billing::{
    BillingPeriod, BillingService, Clock, DeliveryError, DeliveryReceipt, DirectoryImporter,
    MessageSender,
};
use kos_billing::config::BillingConfig;
use kos_billing::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Directory used when no CSV is supplied.
const SAMPLE_DIRECTORY: &str = "\
tenant_id,name,phone,room_id,room_name,price
1,Andi Pratama,081234567890,1,A1,1000000
2,Sari Wulandari,0813-2222-3333,2,A2,950000
3,Budi Santoso,,3,B1,850000
";

pub(crate) type InMemoryBillingService =
    BillingService<InMemoryBillingStore, InMemoryTenantDirectory, LoggingMessageSender>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Sender that writes each reminder to the log and reports it delivered.
#[derive(Default)]
pub(crate) struct LoggingMessageSender {
    sequence: AtomicU64,
}

impl MessageSender for LoggingMessageSender {
    fn send(&self, address: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = format!("log-{id:06}");
        info!(%address, %message_id, %body, "reminder handed to logging sender");
        Ok(DeliveryReceipt { message_id })
    }
}

pub(crate) fn load_directory(path: Option<&Path>) -> Result<InMemoryTenantDirectory, AppError> {
    let directory = match path {
        Some(path) => DirectoryImporter::from_path(path)?,
        None => DirectoryImporter::from_reader(SAMPLE_DIRECTORY.as_bytes())?,
    };
    Ok(directory)
}

pub(crate) fn build_service(
    directory: InMemoryTenantDirectory,
    clock: Arc<dyn Clock>,
    config: &BillingConfig,
) -> Arc<InMemoryBillingService> {
    Arc::new(BillingService::new(
        Arc::new(InMemoryBillingStore::default()),
        Arc::new(directory),
        Arc::new(LoggingMessageSender::default()),
        clock,
        config,
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_period(raw: &str) -> Result<BillingPeriod, String> {
    raw.parse::<BillingPeriod>().map_err(|err| err.to_string())
}
