//! Provider-neutral text summary of an event.
//!
//! Chat providers all render the same information: a title linking to the
//! event, a few detail lines (commits, issue body, ...) and an accent color.
//! Each provider only decides the markup.

use crate::models::{HookEventType, HookPayload, RefType};

pub const GREEN: u32 = 0x001a_c600;
pub const GREY: u32 = 0x00c3_c3c3;
pub const PURPLE: u32 = 0x0072_89da;
pub const ORANGE: u32 = 0x00eb_6420;
pub const BLUE: u32 = 0x0066_aee8;
pub const YELLOW: u32 = 0x00ff_d930;
pub const RED: u32 = 0x00ff_3232;

/// Detail lines kept for very large pushes.
const MAX_LINES: usize = 10;

/// One detail line, optionally linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub url: Option<String>,
}

/// What every chat message says about an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// One-line headline.
    pub title: String,
    /// Where the headline links to; may be empty.
    pub url: String,
    /// Detail lines.
    pub lines: Vec<Line>,
    /// Accent color as `0xRRGGBB`.
    pub color: u32,
    /// Who triggered the event.
    pub sender: Option<String>,
}

impl Summary {
    /// Color as `#rrggbb`.
    pub fn color_hex(&self) -> String {
        format!("#{:06x}", self.color)
    }

    /// Title and lines as plain text.
    pub fn plain(&self) -> String {
        let mut text = self.title.clone();
        for line in &self.lines {
            text.push('\n');
            text.push_str(&line.text);
        }
        text
    }

    /// Title and lines as Markdown, links rendered inline.
    pub fn markdown(&self) -> String {
        let mut text = link_markdown(&self.title, &self.url);
        for line in &self.lines {
            text.push_str("\n\n");
            text.push_str(&line.url.as_deref().map_or_else(
                || line.text.clone(),
                |url| link_markdown(&line.text, url),
            ));
        }
        text
    }

    /// Title and lines as minimal HTML.
    pub fn html(&self) -> String {
        let mut text = link_html(&self.title, &self.url);
        for line in &self.lines {
            text.push_str("<br>");
            text.push_str(&line.url.as_deref().map_or_else(
                || escape_html(&line.text),
                |url| link_html(&line.text, url),
            ));
        }
        text
    }
}

fn link_markdown(text: &str, url: &str) -> String {
    if url.is_empty() {
        text.to_string()
    } else {
        format!("[{text}]({url})")
    }
}

fn link_html(text: &str, url: &str) -> String {
    if url.is_empty() {
        escape_html(text)
    } else {
        format!("<a href=\"{}\">{}</a>", escape_html(url), escape_html(text))
    }
}

/// Escapes `&`, `<`, `>` and `"`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn action_color(action: &str) -> u32 {
    match action {
        "opened" | "reopened" | "published" | "created" | "approved" => GREEN,
        "closed" | "deleted" | "rejected" => RED,
        "merged" => PURPLE,
        "edited" | "updated" | "synchronized" => YELLOW,
        _ => GREY,
    }
}

/// Builds the summary of an event.
pub fn summarize(payload: &HookPayload, event: HookEventType) -> Summary {
    match payload {
        HookPayload::Push(push) => {
            let repo = &push.repository.full_name;
            let target = push.branch().unwrap_or(&push.git_ref);
            let count = push.total_commits.max(push.commits.len());
            let lines = push
                .commits
                .iter()
                .take(MAX_LINES)
                .map(|commit| Line {
                    text: format!(
                        "{}: {} - {}",
                        commit.short_id(),
                        commit.title(),
                        commit.author.name
                    ),
                    url: (!commit.url.is_empty()).then(|| commit.url.clone()),
                })
                .collect();
            let url = if push.compare_url.is_empty() {
                push.repository.html_url.clone()
            } else {
                push.compare_url.clone()
            };
            Summary {
                title: format!("[{repo}:{target}] {} pushed", plural(count, "new commit")),
                url,
                lines,
                color: GREEN,
                sender: Some(push.pusher.display_name().to_string()),
            }
        },
        HookPayload::Ref(r) => {
            let verb = if event == HookEventType::Delete {
                "deleted"
            } else {
                "created"
            };
            let color = match (event, r.ref_type) {
                (HookEventType::Delete, _) => GREY,
                (_, RefType::Tag) => BLUE,
                (_, RefType::Branch) => GREEN,
            };
            Summary {
                title: format!(
                    "[{}] {} {} {verb}",
                    r.repository.full_name,
                    r.ref_type.as_str(),
                    r.git_ref
                ),
                url: r.repository.html_url.clone(),
                lines: Vec::new(),
                color,
                sender: Some(r.sender.display_name().to_string()),
            }
        },
        HookPayload::Issue(issue) => {
            let title = if event == HookEventType::IssueComment {
                format!(
                    "[{}] New comment on issue #{}: {}",
                    issue.repository.full_name, issue.number, issue.title
                )
            } else {
                format!(
                    "[{}] Issue {}: #{} {}",
                    issue.repository.full_name, issue.action, issue.number, issue.title
                )
            };
            Summary {
                title,
                url: issue.html_url.clone(),
                lines: body_lines(&issue.body),
                color: if event == HookEventType::IssueComment {
                    BLUE
                } else {
                    action_color(&issue.action)
                },
                sender: Some(issue.sender.display_name().to_string()),
            }
        },
        HookPayload::PullRequest(pr) => {
            let action = if pr.merged { "merged" } else { pr.action.as_str() };
            let kind = match event {
                HookEventType::PullRequestReview => "Pull request review",
                _ => "Pull request",
            };
            let mut lines = vec![Line {
                text: format!("{} → {}", pr.head_branch, pr.base_branch),
                url: None,
            }];
            lines.extend(body_lines(&pr.body));
            Summary {
                title: format!(
                    "[{}] {kind} {action}: #{} {}",
                    pr.repository.full_name, pr.number, pr.title
                ),
                url: pr.html_url.clone(),
                lines,
                color: if event == HookEventType::PullRequestSync {
                    ORANGE
                } else {
                    action_color(action)
                },
                sender: Some(pr.sender.display_name().to_string()),
            }
        },
        HookPayload::Release(release) => {
            let name = if release.name.is_empty() {
                &release.tag_name
            } else {
                &release.name
            };
            let mut title = format!(
                "[{}] Release {}: {name}",
                release.repository.full_name, release.action
            );
            if release.prerelease {
                title.push_str(" (pre-release)");
            }
            Summary {
                title,
                url: release.html_url.clone(),
                lines: vec![Line {
                    text: format!("tag {}", release.tag_name),
                    url: None,
                }],
                color: action_color(&release.action),
                sender: Some(release.sender.display_name().to_string()),
            }
        },
        HookPayload::Other(value) => {
            let repo = value
                .pointer("/repository/full_name")
                .and_then(serde_json::Value::as_str);
            let url = value
                .pointer("/repository/html_url")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let sender = value
                .pointer("/sender/login")
                .and_then(serde_json::Value::as_str);
            let action = value
                .get("action")
                .and_then(serde_json::Value::as_str)
                .map(|a| format!(" {a}"))
                .unwrap_or_default();
            Summary {
                title: repo.map_or_else(
                    || format!("{event} event{action}"),
                    |repo| format!("[{repo}] {event} event{action}"),
                ),
                url: url.to_string(),
                lines: Vec::new(),
                color: GREY,
                sender: sender.map(str::to_string),
            }
        },
    }
}

fn body_lines(body: &str) -> Vec<Line> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .take(MAX_LINES)
        .map(|line| Line {
            text: line.to_string(),
            url: None,
        })
        .collect()
}
