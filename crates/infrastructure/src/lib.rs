pub mod event_bus;
pub mod observability;
pub mod sources;
pub mod timeout_handler;

pub use event_bus::{EventBus, EventBusStats};
pub use observability::*;
pub use sources::OpenWeatherSource;
pub use timeout_handler::{TimeoutConfig, TimeoutHandler};
