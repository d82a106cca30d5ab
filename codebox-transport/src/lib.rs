//! codebox-transport implements the secure framed-message transport that
//! codebox-gateway uses to talk to codebox-backend.

pub mod framing;
pub mod pool;
pub mod secure;

pub use pool::{BackendPool, Lease};
pub use secure::SecureChannel;
