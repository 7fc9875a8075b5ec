//! Serial bus access: lock, transport, block decoder and module reader.

pub mod bus_lock;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod reader;
pub mod transport;

pub use bus_lock::{BusLease, BusLock, BusLockConfig};
pub use error::{BusError, DecodeError};
pub use metrics::{BusMetrics, BusStats};
pub use reader::{ModuleReader, ModuleSource, ReaderConfig};
pub use transport::{build_transport, RegisterTransport};
