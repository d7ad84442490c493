mod queue_processor;

pub use queue_processor::{ProcessorConfig, QueueProcessor, TickSummary};
