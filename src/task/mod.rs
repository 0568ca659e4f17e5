//! Task execution core.
//!
//! - `provider`: produces one value off the caller's path (`Provider`, `Delivery`)
//! - `filter`: intercepting filters and the chain manager driving them
//! - `pipeline`: `Task`, one provider bound to a filter chain and a handler
//! - `container`: `ExecutableContainer`, bounded concurrent batches of tasks

pub mod container;
pub mod filter;
pub mod pipeline;
pub mod provider;

pub use container::{DEFAULT_POOL_SIZE, ExecutableContainer};
pub use filter::{Filter, FilterChain, FilterChainManager};
pub use pipeline::{Executable, Handler, Task, TaskBuilder};
pub use provider::{Delivered, Delivery, Provider, Resolver};
