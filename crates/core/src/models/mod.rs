pub mod collection;
pub mod event;
pub mod reading;
pub mod schedule;
pub mod stage;

pub use collection::*;
pub use event::*;
pub use reading::*;
pub use schedule::*;
pub use stage::*;
