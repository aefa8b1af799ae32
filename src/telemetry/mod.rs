pub mod alert;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod store;

pub use ingest::{IngestError, IngestReceipt, IngestionPipeline};
pub use notify::{NotificationDispatcher, NotificationSink, NotifyError};
pub use store::{StoreError, TelemetryStore};
