pub mod event;
pub mod outcome;
pub mod service;
pub mod sink;
pub mod store;

pub use event::{Channel, SensorEvent, SensorRecord, ValidationError};
pub use outcome::{Backend, DualWriteResult, WriteOutcome};
pub use service::IngestService;
pub use sink::{MetricsSink, PrometheusMetrics};
pub use store::{AdapterError, RelationalStore, TimeSeriesStore};
