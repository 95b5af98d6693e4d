//! Domain events and their generic payloads.
//!
//! Every feature area of the platform describes what happened with a
//! [`HookEventType`] and a [`HookPayload`], and says where it happened with an
//! [`EventSource`]. Payloads are provider-neutral; the native wire format is
//! their JSON serialisation.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Git ref prefix for branches.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Kinds of events a registration can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventType {
    /// A branch or tag was created.
    Create,
    /// A branch or tag was deleted.
    Delete,
    /// The repository was forked.
    Fork,
    /// Commits were pushed.
    Push,
    /// An issue was opened, edited, closed, ...
    Issues,
    /// A comment was added to an issue or pull request.
    IssueComment,
    /// A pull request was opened, edited, closed, merged, ...
    PullRequest,
    /// A pull request review was submitted.
    PullRequestReview,
    /// A pull request's head branch was updated.
    PullRequestSync,
    /// A release was published, updated or deleted.
    Release,
    /// A repository was created or deleted.
    Repository,
    /// A wiki page changed.
    Wiki,
    /// A package was published or deleted.
    Package,
}

impl HookEventType {
    /// All event types, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Create,
        Self::Delete,
        Self::Fork,
        Self::Push,
        Self::Issues,
        Self::IssueComment,
        Self::PullRequest,
        Self::PullRequestReview,
        Self::PullRequestSync,
        Self::Release,
        Self::Repository,
        Self::Wiki,
        Self::Package,
    ];

    /// Returns the wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Fork => "fork",
            Self::Push => "push",
            Self::Issues => "issues",
            Self::IssueComment => "issue_comment",
            Self::PullRequest => "pull_request",
            Self::PullRequestReview => "pull_request_review",
            Self::PullRequestSync => "pull_request_sync",
            Self::Release => "release",
            Self::Repository => "repository",
            Self::Wiki => "wiki",
            Self::Package => "package",
        }
    }
}

impl fmt::Display for HookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown event type: {s}")))
    }
}

/// A user or organization acting in or owning something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Numeric identity.
    pub id: i64,
    /// Login name.
    pub login: String,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
}

impl UserRef {
    /// Creates a user reference.
    #[must_use]
    pub fn new(id: i64, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            full_name: String::new(),
        }
    }

    /// Returns the display name, falling back to the login.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.login
        } else {
            &self.full_name
        }
    }
}

/// Owner identity used for scope resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Numeric identity of the user or organization.
    pub id: i64,
    /// Login name.
    pub login: String,
}

/// The repository an event happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Repository ID.
    pub id: i64,
    /// ID of the owning user or organization.
    pub owner_id: i64,
    /// Short name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Browser URL.
    #[serde(default)]
    pub html_url: String,
}

/// Where an event originated. Repository and/or owner may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    /// Source repository.
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    /// Source owner, when the event is not tied to a repository or to
    /// override the repository owner.
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

impl EventSource {
    /// Source for a repository event.
    #[must_use]
    pub const fn repository(repository: RepositoryRef) -> Self {
        Self {
            repository: Some(repository),
            owner: None,
        }
    }

    /// Source for an owner-level event (e.g. a package published by a user).
    #[must_use]
    pub const fn owner(owner: OwnerRef) -> Self {
        Self {
            repository: None,
            owner: Some(owner),
        }
    }

    /// The owner whose registrations apply.
    ///
    /// A repository's owner takes precedence over an explicit owner.
    #[must_use]
    pub fn owner_id(&self) -> Option<i64> {
        self.repository
            .as_ref()
            .map(|repo| repo.owner_id)
            .or_else(|| self.owner.as_ref().map(|owner| owner.id))
    }
}

/// Commit author signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    /// Author name.
    pub name: String,
    /// Author email.
    #[serde(default)]
    pub email: String,
}

/// One commit carried by a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit SHA.
    pub id: String,
    /// Commit message.
    pub message: String,
    /// Browser URL.
    #[serde(default)]
    pub url: String,
    /// Author.
    pub author: CommitAuthor,
    /// Author timestamp.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Commit {
    /// First line of the commit message.
    #[must_use]
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    /// Abbreviated SHA.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..10).unwrap_or(&self.id)
    }
}

/// Payload of a push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Full ref name (`refs/heads/main`, `refs/tags/v1`).
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// SHA before the push.
    #[serde(default)]
    pub before: String,
    /// SHA after the push.
    #[serde(default)]
    pub after: String,
    /// Compare view URL.
    #[serde(default)]
    pub compare_url: String,
    /// Pushed commits.
    #[serde(default)]
    pub commits: Vec<Commit>,
    /// Total number of commits, may exceed `commits.len()` for large pushes.
    #[serde(default)]
    pub total_commits: usize,
    /// Repository pushed to.
    pub repository: RepositoryRef,
    /// Who pushed.
    pub pusher: UserRef,
}

impl PushPayload {
    /// Branch name when the push targets a branch ref.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix(BRANCH_REF_PREFIX)
    }
}

/// Whether a created or deleted ref is a branch or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    /// A branch.
    Branch,
    /// A tag.
    Tag,
}

impl RefType {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
        }
    }
}

/// Payload of create and delete events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPayload {
    /// Short ref name (`main`, `v1.0`).
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Branch or tag.
    pub ref_type: RefType,
    /// Commit SHA the ref points (or pointed) at.
    #[serde(default)]
    pub sha: String,
    /// Repository.
    pub repository: RepositoryRef,
    /// Who performed the action.
    pub sender: UserRef,
}

/// Payload of issue and issue comment events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    /// What happened (`opened`, `closed`, `created`, ...).
    pub action: String,
    /// Issue number.
    pub number: i64,
    /// Issue title.
    pub title: String,
    /// Issue body or, for comment events, the comment body.
    #[serde(default)]
    pub body: String,
    /// Browser URL.
    #[serde(default)]
    pub html_url: String,
    /// Repository.
    pub repository: RepositoryRef,
    /// Who performed the action.
    pub sender: UserRef,
}

/// Payload of pull request events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestPayload {
    /// What happened (`opened`, `closed`, `synchronized`, `reviewed`, ...).
    pub action: String,
    /// Pull request number.
    pub number: i64,
    /// Title.
    pub title: String,
    /// Body or review content.
    #[serde(default)]
    pub body: String,
    /// Browser URL.
    #[serde(default)]
    pub html_url: String,
    /// Head branch.
    pub head_branch: String,
    /// Base branch.
    pub base_branch: String,
    /// Whether the pull request was merged.
    #[serde(default)]
    pub merged: bool,
    /// Repository.
    pub repository: RepositoryRef,
    /// Who performed the action.
    pub sender: UserRef,
}

/// Payload of release events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    /// What happened (`published`, `updated`, `deleted`).
    pub action: String,
    /// Tag name.
    pub tag_name: String,
    /// Release title.
    #[serde(default)]
    pub name: String,
    /// Browser URL.
    #[serde(default)]
    pub html_url: String,
    /// Whether this is a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Repository.
    pub repository: RepositoryRef,
    /// Who performed the action.
    pub sender: UserRef,
}

/// Generic payload of a domain event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookPayload {
    /// Push event.
    Push(PushPayload),
    /// Create or delete event.
    Ref(RefPayload),
    /// Issue or issue comment event.
    Issue(IssuePayload),
    /// Pull request, review or sync event.
    PullRequest(PullRequestPayload),
    /// Release event.
    Release(ReleasePayload),
    /// Any other event, passed through as-is.
    Other(serde_json::Value),
}

impl HookPayload {
    /// Parses a JSON document into the payload shape used by `event`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the document does not match the shape.
    pub fn parse(event: HookEventType, value: serde_json::Value) -> Result<Self> {
        let invalid = |e: serde_json::Error| {
            Error::InvalidInput(format!("Invalid {event} payload: {e}"))
        };
        let payload = match event {
            HookEventType::Push => Self::Push(serde_json::from_value(value).map_err(invalid)?),
            HookEventType::Create | HookEventType::Delete => {
                Self::Ref(serde_json::from_value(value).map_err(invalid)?)
            },
            HookEventType::Issues | HookEventType::IssueComment => {
                Self::Issue(serde_json::from_value(value).map_err(invalid)?)
            },
            HookEventType::PullRequest
            | HookEventType::PullRequestReview
            | HookEventType::PullRequestSync => {
                Self::PullRequest(serde_json::from_value(value).map_err(invalid)?)
            },
            HookEventType::Release => Self::Release(serde_json::from_value(value).map_err(invalid)?),
            HookEventType::Fork
            | HookEventType::Repository
            | HookEventType::Wiki
            | HookEventType::Package => Self::Other(value),
        };
        Ok(payload)
    }

    /// Branch the event refers to, if any.
    ///
    /// Only branch creation/deletion and pushes to `refs/heads/*` carry a
    /// branch; tags, issues, releases, ... never do.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Push(push) => push.branch(),
            Self::Ref(r) if r.ref_type == RefType::Branch => Some(&r.git_ref),
            _ => None,
        }
    }

    /// Number of commits for push payloads.
    #[must_use]
    pub fn commit_count(&self) -> Option<usize> {
        match self {
            Self::Push(push) => Some(push.commits.len()),
            _ => None,
        }
    }

    /// Repository the payload refers to.
    #[must_use]
    pub const fn repository(&self) -> Option<&RepositoryRef> {
        match self {
            Self::Push(p) => Some(&p.repository),
            Self::Ref(p) => Some(&p.repository),
            Self::Issue(p) => Some(&p.repository),
            Self::PullRequest(p) => Some(&p.repository),
            Self::Release(p) => Some(&p.repository),
            Self::Other(_) => None,
        }
    }

    /// Who triggered the event.
    #[must_use]
    pub const fn sender(&self) -> Option<&UserRef> {
        match self {
            Self::Push(p) => Some(&p.pusher),
            Self::Ref(p) => Some(&p.sender),
            Self::Issue(p) => Some(&p.sender),
            Self::PullRequest(p) => Some(&p.sender),
            Self::Release(p) => Some(&p.sender),
            Self::Other(_) => None,
        }
    }

    /// Serialises the payload to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if serialisation fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::OperationFailed {
            operation: "serialize_payload".to_string(),
            cause: e.to_string(),
        })
    }

    /// Sample push payload used for test deliveries.
    #[must_use]
    pub fn sample_push(repository: RepositoryRef) -> Self {
        let sender = UserRef {
            id: 0,
            login: "hookrelay".to_string(),
            full_name: "Hookrelay".to_string(),
        };
        let commit = Commit {
            id: "0000000000000000000000000000000000000000".to_string(),
            message: "Test delivery".to_string(),
            url: repository.html_url.clone(),
            author: CommitAuthor {
                name: sender.full_name.clone(),
                email: String::new(),
            },
            timestamp: Some(Utc::now()),
        };
        Self::Push(PushPayload {
            git_ref: format!("{BRANCH_REF_PREFIX}main"),
            before: commit.id.clone(),
            after: commit.id.clone(),
            compare_url: String::new(),
            commits: vec![commit],
            total_commits: 1,
            repository,
            pusher: sender,
        })
    }
}
