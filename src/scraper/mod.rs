pub mod id;
pub mod pool;
pub mod resume;
pub mod session_pool;
pub mod task;

// Re-export common types
pub use pool::{RoundStats, WorkPool};
pub use resume::ResumeTracker;
pub use session_pool::SessionPool;
pub use task::{TaskOutcome, TaskRunner};
