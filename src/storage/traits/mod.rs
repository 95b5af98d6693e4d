//! Storage backend traits.

mod queue;
mod registration;
mod task;

pub use queue::QueueStore;
pub use registration::RegistrationStore;
pub use task::TaskStore;
