pub mod spinlock;
pub use spinlock::{SpinLock, SpinLockGuard};

#[cfg(feature = "std")]
pub mod completion;
#[cfg(feature = "std")]
pub use completion::Completion;
