pub mod analysis;
pub mod pipeline;
pub mod scheduler;
pub mod stages;
pub mod tools;

pub use pipeline::{reset_item, Pipeline, PipelineTools};
pub use scheduler::{
    RecurringJob, Scheduler, SchedulerError, SchedulerMetrics, StageError, StageProcessor,
    StageReport,
};
