// Backend transport and same-origin cross-tab bus.

pub mod bus;
pub mod transport;

pub use bus::{BroadcastHub, TabBus};
pub use transport::{HttpTransport, Routes, Transport, DEFAULT_REQUEST_TIMEOUT};
