pub mod classify;
pub mod keys;
pub mod ssh;

pub use classify::classify_output;
pub use ssh::{SshExecutor, SshSession};
