//! Data models for hookrelay.
//!
//! Events and their payloads, webhook registrations, and delivery tasks.

mod event;
mod registration;
mod task;

pub use event::{
    Commit, CommitAuthor, EventSource, HookEventType, HookPayload, IssuePayload, OwnerRef,
    PullRequestPayload, PushPayload, RefPayload, RefType, ReleasePayload, RepositoryRef, UserRef,
    BRANCH_REF_PREFIX,
};
pub use registration::{
    ContentType, EventSubscription, HookId, HttpMethod, ProviderKind, Registration,
    RegistrationScope,
};
pub use task::{DeliveryOutcome, DeliveryTask, NewTask, TaskId};
