//! codebox-protocol defines the wire types shared between the codebox
//! gateway and backend processes. You almost certainly don't need to use
//! it directly.

pub mod errors;
pub mod frame;
pub mod rpc;
pub mod tree;
pub mod user;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
