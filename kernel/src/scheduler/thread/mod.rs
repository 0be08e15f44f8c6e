//! Thread module

pub mod stack;
pub mod state;
pub mod table;
pub mod thread;

pub use stack::{StackAllocator, ThreadStack, STACK_FENCEPOST};
pub use state::ThreadState;
pub use table::ThreadTable;
pub use thread::{BurstStats, ChildSlot, Pid, Thread};
