//! fleetward-exec: Remote execution abstraction
//!
//! Runs ordered command batches on a host, either over an SSH session or
//! through a local shell, and reports one `CommandResult` per command.

pub mod batch;
pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use batch::{BatchResult, execute_batch};
pub use error::ExecError;
pub use keys::{KeyError, KeySource, PrivateKey};
pub use local::LocalExecutor;
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
