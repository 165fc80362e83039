pub mod data_source;
pub mod event_publisher;
pub mod stage_processor;

pub use data_source::*;
pub use event_publisher::*;
pub use stage_processor::*;
