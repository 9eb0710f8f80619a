pub mod agent_loop;
pub mod dispatch;
pub mod retry;

pub use agent_loop::{Agent, IterationContext, RunOptions, RunOutcome, TruncatedResult};
pub use dispatch::{ToolCallOutcome, ToolDispatcher};
pub use retry::BackoffPolicy;
