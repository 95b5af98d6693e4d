//! Provider wire formats.
//!
//! Every transform is a pure function of the generic payload, the event type
//! and the registration's provider metadata. Providers whose endpoint depends
//! on metadata also supply a delivery target.

// Every transform shares the registry's signature, fallible or not
#![allow(clippy::unnecessary_wraps)]

use super::DeliveryTarget;
use super::summary::{Summary, summarize};
use crate::models::{HookEventType, HookPayload, HttpMethod, ProviderKind, Registration, TaskId};
use crate::{Error, Result};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

fn shaping_error(provider: ProviderKind, cause: impl Into<String>) -> Error {
    Error::PayloadShaping {
        provider: provider.as_str().to_string(),
        cause: cause.into(),
    }
}

/// Parses provider metadata; absent metadata yields the defaults.
fn parse_meta<T: DeserializeOwned + Default>(provider: ProviderKind, meta: &Value) -> Result<T> {
    if meta.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(meta.clone())
        .map_err(|e| shaping_error(provider, format!("invalid metadata: {e}")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackMeta {
    channel: String,
    username: String,
    icon_url: String,
    color: String,
}

/// Slack escapes only `&`, `<` and `>`.
fn escape_slack(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn link_slack(text: &str, url: &str) -> String {
    if url.is_empty() {
        escape_slack(text)
    } else {
        format!("<{url}|{}>", escape_slack(text))
    }
}

pub fn slack(payload: &HookPayload, event: HookEventType, meta: &Value) -> Result<Value> {
    let meta: SlackMeta = parse_meta(ProviderKind::Slack, meta)?;
    let channel = meta.channel.trim();
    if channel.is_empty() {
        return Err(shaping_error(ProviderKind::Slack, "channel is required"));
    }

    let summary = summarize(payload, event);
    let text = summary
        .lines
        .iter()
        .map(|line| link_slack(&line.text, line.url.as_deref().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n");
    let color = if meta.color.is_empty() {
        summary.color_hex()
    } else {
        meta.color.clone()
    };

    let mut body = json!({
        "channel": channel,
        "text": link_slack(&summary.title, &summary.url),
        "attachments": [{
            "color": color,
            "fallback": summary.plain(),
            "text": text,
        }],
    });
    if !meta.username.is_empty() {
        body["username"] = json!(meta.username);
    }
    if !meta.icon_url.is_empty() {
        body["icon_url"] = json!(meta.icon_url);
    }
    Ok(body)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiscordMeta {
    username: String,
    icon_url: String,
}

pub fn discord(payload: &HookPayload, event: HookEventType, meta: &Value) -> Result<Value> {
    let meta: DiscordMeta = parse_meta(ProviderKind::Discord, meta)?;
    let summary = summarize(payload, event);
    let description = summary
        .lines
        .iter()
        .map(|line| line.text.clone())
        .collect::<Vec<_>>()
        .join("\n");

    let mut embed = json!({
        "title": truncate(&summary.title, 256),
        "description": truncate(&description, 4096),
        "color": summary.color,
    });
    if !summary.url.is_empty() {
        embed["url"] = json!(summary.url);
    }
    if let Some(sender) = &summary.sender {
        embed["author"] = json!({ "name": sender });
    }

    let mut body = json!({ "embeds": [embed] });
    if !meta.username.is_empty() {
        body["username"] = json!(meta.username);
    }
    if !meta.icon_url.is_empty() {
        body["avatar_url"] = json!(meta.icon_url);
    }
    Ok(body)
}

pub fn msteams(payload: &HookPayload, event: HookEventType, _meta: &Value) -> Result<Value> {
    let summary = summarize(payload, event);
    let mut facts = vec![json!({ "name": "Event", "value": event.as_str() })];
    if let Some(repo) = payload.repository() {
        facts.push(json!({ "name": "Repository", "value": repo.full_name }));
    }
    let text = summary
        .lines
        .iter()
        .map(|line| line.text.clone())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut body = json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "themeColor": format!("{:06x}", summary.color),
        "title": summary.title,
        "summary": summary.title,
        "sections": [{
            "activityTitle": summary.sender.clone().unwrap_or_default(),
            "text": text,
            "facts": facts,
        }],
    });
    if !summary.url.is_empty() {
        body["potentialAction"] = json!([{
            "@type": "OpenUri",
            "name": "View in browser",
            "targets": [{ "os": "default", "uri": summary.url }],
        }]);
    }
    Ok(body)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TelegramMeta {
    chat_id: String,
    thread_id: String,
}

pub fn telegram(payload: &HookPayload, event: HookEventType, meta: &Value) -> Result<Value> {
    let meta: TelegramMeta = parse_meta(ProviderKind::Telegram, meta)?;
    let summary = summarize(payload, event);
    let mut body = json!({
        "text": summary.html(),
        "parse_mode": "HTML",
        "disable_web_page_preview": true,
    });
    if !meta.chat_id.is_empty() {
        body["chat_id"] = json!(meta.chat_id);
    }
    if !meta.thread_id.is_empty() {
        body["message_thread_id"] = json!(meta.thread_id);
    }
    Ok(body)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MatrixMeta {
    room_id: String,
    message_type: String,
}

pub fn matrix(payload: &HookPayload, event: HookEventType, meta: &Value) -> Result<Value> {
    let meta: MatrixMeta = parse_meta(ProviderKind::Matrix, meta)?;
    let msgtype = match meta.message_type.as_str() {
        "" | "m.notice" | "notice" => "m.notice",
        "m.text" | "text" => "m.text",
        other => {
            return Err(shaping_error(
                ProviderKind::Matrix,
                format!("unknown message type '{other}'"),
            ));
        },
    };
    let summary = summarize(payload, event);
    Ok(json!({
        "msgtype": msgtype,
        "body": summary.plain(),
        "format": "org.matrix.custom.html",
        "formatted_body": summary.html(),
    }))
}

/// Room send endpoint below the homeserver URL, sent with `PUT`.
///
/// The task id is the Matrix transaction id, so a retried request for the
/// same task is not posted twice.
pub fn matrix_target(registration: &Registration, task_id: TaskId) -> Option<DeliveryTarget> {
    let meta: MatrixMeta = parse_meta(ProviderKind::Matrix, &registration.meta).ok()?;
    let room = meta.room_id.trim();
    if room.is_empty() {
        return None;
    }
    let mut url = Url::parse(&registration.url).ok()?;
    let txn_id = task_id.to_string();
    url.path_segments_mut().ok()?.pop_if_empty().extend([
        "_matrix",
        "client",
        "v3",
        "rooms",
        room,
        "send",
        "m.room.message",
        txn_id.as_str(),
    ]);
    Some(DeliveryTarget {
        url: url.into(),
        method: HttpMethod::Put,
    })
}

pub fn dingtalk(payload: &HookPayload, event: HookEventType, _meta: &Value) -> Result<Value> {
    let summary = summarize(payload, event);
    let mut card = json!({
        "title": summary.title,
        "text": summary.markdown(),
        "hideAvatar": "0",
    });
    if !summary.url.is_empty() {
        card["singleTitle"] = json!("view");
        card["singleURL"] = json!(summary.url);
    }
    Ok(json!({ "msgtype": "actionCard", "actionCard": card }))
}

pub fn feishu(payload: &HookPayload, event: HookEventType, _meta: &Value) -> Result<Value> {
    let summary = summarize(payload, event);
    let mut text = summary.plain();
    if !summary.url.is_empty() {
        text.push('\n');
        text.push_str(&summary.url);
    }
    Ok(json!({ "msg_type": "text", "content": { "text": text } }))
}

pub fn wechatwork(payload: &HookPayload, event: HookEventType, _meta: &Value) -> Result<Value> {
    let summary = summarize(payload, event);
    Ok(json!({
        "msgtype": "markdown",
        "markdown": { "content": render_wechat(&summary) },
    }))
}

fn render_wechat(summary: &Summary) -> String {
    let mut content = format!("# {}", summary.markdown());
    if let Some(sender) = &summary.sender {
        content.push_str("\n\n> by ");
        content.push_str(sender);
    }
    content
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackagistMeta {
    username: String,
    api_token: String,
    package_url: String,
}

/// Packagist only needs to know which package to re-crawl.
pub fn packagist(_payload: &HookPayload, _event: HookEventType, meta: &Value) -> Result<Value> {
    let meta: PackagistMeta = parse_meta(ProviderKind::Packagist, meta)?;
    if meta.package_url.trim().is_empty() {
        return Err(shaping_error(ProviderKind::Packagist, "package_url is required"));
    }
    if meta.username.trim().is_empty() != meta.api_token.trim().is_empty() {
        return Err(shaping_error(
            ProviderKind::Packagist,
            "username and api_token must be set together",
        ));
    }
    Ok(json!({ "repository": { "url": meta.package_url.trim() } }))
}

/// Update-package endpoint with the API credentials in the query.
pub fn packagist_target(registration: &Registration) -> Option<DeliveryTarget> {
    let meta: PackagistMeta = parse_meta(ProviderKind::Packagist, &registration.meta).ok()?;
    let (username, api_token) = (meta.username.trim(), meta.api_token.trim());
    if username.is_empty() || api_token.is_empty() {
        return None;
    }
    let mut url = Url::parse(&registration.url).ok()?;
    url.query_pairs_mut()
        .append_pair("username", username)
        .append_pair("apiToken", api_token);
    Some(DeliveryTarget {
        url: url.into(),
        method: registration.http_method,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
