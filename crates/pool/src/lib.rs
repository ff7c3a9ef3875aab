pub mod artifacts;
mod allocate;
mod pool;
mod reclaim;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use pool::SlotPool;
pub use registry::Registry;
