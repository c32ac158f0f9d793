//! Hacker News payload types and normalization into the common model

use crate::model::{Comment, ForumPost, Metadata, Platform, User};
use crate::HarvestError;
use chrono::{DateTime, TimeZone, Utc};
use scraper::Html;
use serde::Deserialize;
use serde_json::json;

const SITE: &str = "https://news.ycombinator.com";

/// Item from `item/{id}.json` (stories, comments, jobs, polls)
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub by: Option<String>,
    pub time: Option<i64>,
    pub text: Option<String>,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub deleted: bool,
    pub parent: Option<u64>,
    #[serde(default)]
    pub kids: Vec<u64>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub title: Option<String>,
    pub descendants: Option<u64>,
}

impl Item {
    /// Deleted and dead items are skipped everywhere
    pub fn is_visible(&self) -> bool {
        !self.deleted && !self.dead
    }

    pub fn is_comment(&self) -> bool {
        self.kind.as_deref() == Some("comment")
    }

    pub fn kid_ids(&self) -> Vec<String> {
        self.kids.iter().map(u64::to_string).collect()
    }
}

/// User from `user/{name}.json`
#[derive(Debug, Clone, Deserialize)]
pub struct HnUser {
    pub id: String,
    pub created: Option<i64>,
    #[serde(default)]
    pub karma: i64,
    pub about: Option<String>,
    #[serde(default)]
    pub submitted: Vec<u64>,
}

/// Algolia search response
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub points: Option<i64>,
    pub num_comments: Option<u64>,
    pub created_at_i: Option<i64>,
    pub story_text: Option<String>,
    #[serde(rename = "_tags", default)]
    pub tags: Vec<String>,
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}

fn item_url(id: impl std::fmt::Display) -> String {
    format!("{}/item?id={}", SITE, id)
}

/// Converts an HN HTML body into plain text
///
/// Paragraphs (`<p>`) become blank-line separated blocks; tags are stripped
/// and entities decoded.
pub fn html_to_text(html: &str) -> String {
    html.split("<p>")
        .map(|block| {
            Html::parse_fragment(block)
                .root_element()
                .text()
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Story, job or poll as a post; `None` for comments and invisible items
pub fn item_to_post(item: Item, category: Option<&str>) -> Option<ForumPost> {
    if !item.is_visible() || item.is_comment() {
        return None;
    }

    let kind = item.kind.clone().unwrap_or_else(|| "story".to_string());
    let discussion = item_url(item.id);

    let mut metadata = Metadata::new();
    metadata.insert("type".to_string(), json!(kind));
    metadata.insert("discussion_url".to_string(), json!(discussion));
    metadata.insert("kids".to_string(), json!(item.kids.len()));

    Some(ForumPost {
        id: item.id.to_string(),
        platform: Platform::HackerNews,
        title: item.title.unwrap_or_default(),
        content: item.text.as_deref().map(html_to_text),
        author: item.by.unwrap_or_else(|| "[deleted]".to_string()),
        author_id: None,
        url: item.url.filter(|u| !u.is_empty()).unwrap_or(discussion),
        score: item.score.unwrap_or(0),
        comment_count: item.descendants.unwrap_or(0),
        created_at: timestamp(item.time.unwrap_or(0)),
        updated_at: None,
        category: category.map(str::to_string),
        tags: Some(vec![kind]),
        metadata,
    })
}

/// Comment item; parent and depth are assigned by the thread traversal
pub fn item_to_comment(item: &Item, post_id: &str) -> Option<Comment> {
    if !item.is_visible() || !item.is_comment() {
        return None;
    }

    Some(Comment {
        id: item.id.to_string(),
        post_id: post_id.to_string(),
        parent_id: item.parent.map(|p| p.to_string()),
        depth: 0,
        author: item.by.clone().unwrap_or_else(|| "[deleted]".to_string()),
        author_id: None,
        content: item.text.as_deref().map(html_to_text).unwrap_or_default(),
        score: item.score.unwrap_or(0),
        created_at: timestamp(item.time.unwrap_or(0)),
        updated_at: None,
        platform: Platform::HackerNews,
    })
}

pub fn hn_user(user: HnUser) -> User {
    let mut metadata = Metadata::new();
    metadata.insert("submitted".to_string(), json!(user.submitted.len()));
    if let Some(about) = &user.about {
        metadata.insert("about".to_string(), json!(html_to_text(about)));
    }

    User {
        username: user.id.clone(),
        id: user.id,
        karma: user.karma,
        created_at: user.created.map(timestamp),
        platform: Platform::HackerNews,
        metadata,
    }
}

pub fn hit_to_post(hit: SearchHit) -> ForumPost {
    let discussion = item_url(&hit.object_id);
    let kind = hit
        .tags
        .iter()
        .find(|t| matches!(t.as_str(), "story" | "job" | "poll" | "ask_hn" | "show_hn"))
        .cloned()
        .unwrap_or_else(|| "story".to_string());

    let mut metadata = Metadata::new();
    metadata.insert("discussion_url".to_string(), json!(discussion));
    metadata.insert("source".to_string(), json!("algolia"));

    ForumPost {
        id: hit.object_id,
        platform: Platform::HackerNews,
        title: hit.title.unwrap_or_default(),
        content: hit.story_text.as_deref().map(html_to_text),
        author: hit.author.unwrap_or_else(|| "[deleted]".to_string()),
        author_id: None,
        url: hit.url.filter(|u| !u.is_empty()).unwrap_or(discussion),
        score: hit.points.unwrap_or(0),
        comment_count: hit.num_comments.unwrap_or(0),
        created_at: timestamp(hit.created_at_i.unwrap_or(0)),
        updated_at: None,
        category: None,
        tags: Some(vec![kind]),
        metadata,
    }
}

/// Item ids are positive integers
pub fn validate_item_id(id: &str) -> Result<u64, HarvestError> {
    id.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| HarvestError::Validation(format!("item id '{}' is not numeric", id)))
}

/// Usernames are case-sensitive, 2-15 characters of letters, digits, `-`, `_`
pub fn validate_username(name: &str) -> Result<String, HarvestError> {
    let name = name.trim();
    let valid = (2..=15).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name.to_string())
    } else {
        Err(HarvestError::Validation(format!("invalid username '{}'", name)))
    }
}

/// Maps a category name onto a story-list endpoint
pub fn story_list(category: &str) -> Result<&'static str, HarvestError> {
    let name = category.trim().to_ascii_lowercase();
    let name = name.trim_end_matches("stories");
    match name {
        "top" | "front" | "frontpage" => Ok("topstories"),
        "new" => Ok("newstories"),
        "best" => Ok("beststories"),
        "ask" => Ok("askstories"),
        "show" => Ok("showstories"),
        "job" | "jobs" => Ok("jobstories"),
        _ => Err(HarvestError::Validation(format!(
            "unknown Hacker News category '{}'",
            category
        ))),
    }
}
