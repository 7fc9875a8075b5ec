pub mod alarm;
pub mod flags;
pub mod phase;
pub mod rack;
pub mod snapshot;
pub mod telemetry;

pub use alarm::*;
pub use flags::*;
pub use phase::*;
pub use rack::*;
pub use snapshot::*;
pub use telemetry::*;
