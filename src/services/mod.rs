//! Service layer: analysis pipeline, scheduling, and alerting.

pub mod alerts;
pub mod analyzer;
pub mod completion;
pub mod jobs;
pub mod parser;
pub mod scheduler;
pub mod templates;
pub mod warehouse;

pub use alerts::{AlertDispatcher, AlertSink, WebhookAlertSink};
pub use analyzer::{BatchAnalyzer, CompletionService};
pub use completion::CompletionClient;
pub use jobs::JobLifecycleManager;
pub use scheduler::ScheduleRegistry;
pub use templates::{DbTemplateStore, TemplateStore};
pub use warehouse::{SampleFetcher, WarehouseClient};
