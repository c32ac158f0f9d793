//! Reddit payload types and normalization into the common model

use crate::model::{Comment, ForumPost, Metadata, Platform, User};
use crate::thread::CommentTreeBuilder;
use crate::HarvestError;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;

const SITE: &str = "https://www.reddit.com";

/// `{kind, data}` envelope wrapping every Reddit object
#[derive(Debug, Clone, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Listing<T> {
    #[serde(default)]
    pub children: Vec<T>,
    pub after: Option<String>,
    pub before: Option<String>,
}

/// A listing whose children are decoded lazily by kind
pub type RawListing = Thing<Listing<Thing<Value>>>;

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default = "deleted_author")]
    author: String,
    author_fullname: Option<String>,
    url: Option<String>,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    created_utc: f64,
    #[serde(default)]
    edited: Value,
    subreddit: Option<String>,
    link_flair_text: Option<String>,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    is_self: bool,
    upvote_ratio: Option<f64>,
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default = "deleted_author")]
    author: String,
    author_fullname: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
    created_utc: f64,
    #[serde(default)]
    edited: Value,
    /// Empty string when there are no replies, a listing otherwise
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    name: String,
    #[serde(default)]
    link_karma: i64,
    #[serde(default)]
    comment_karma: i64,
    total_karma: Option<i64>,
    created_utc: Option<f64>,
    #[serde(default)]
    is_gold: bool,
    #[serde(default)]
    is_mod: bool,
    #[serde(default)]
    verified: bool,
}

fn deleted_author() -> String {
    "[deleted]".to_string()
}

fn timestamp(seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds.trunc() as i64, 0)
        .single()
        .unwrap_or_default()
}

/// `edited` is `false` or the edit time in epoch seconds
fn edited_at(edited: &Value) -> Option<DateTime<Utc>> {
    edited.as_f64().map(timestamp)
}

fn decode_error(url: &str, what: &str, error: serde_json::Error) -> HarvestError {
    HarvestError::Decode {
        url: url.to_string(),
        message: format!("{}: {}", what, error),
    }
}

/// Posts of a listing; malformed children are returned as errors
pub fn listing_posts(listing: RawListing, url: &str) -> (Vec<ForumPost>, Vec<HarvestError>) {
    let mut posts = Vec::new();
    let mut failures = Vec::new();

    for child in listing.data.children {
        if child.kind != "t3" {
            continue;
        }
        match post_from_value(child.data) {
            Ok(post) => posts.push(post),
            Err(e) => failures.push(decode_error(url, "post", e)),
        }
    }

    (posts, failures)
}

fn post_from_value(value: Value) -> Result<ForumPost, serde_json::Error> {
    let data: PostData = serde_json::from_value(value)?;
    let permalink = format!("{}{}", SITE, data.permalink);

    let mut metadata = Metadata::new();
    metadata.insert("fullname".to_string(), json!(data.name));
    metadata.insert("permalink".to_string(), json!(permalink));
    metadata.insert("nsfw".to_string(), json!(data.over_18));
    metadata.insert("stickied".to_string(), json!(data.stickied));
    if let Some(ratio) = data.upvote_ratio {
        metadata.insert("upvote_ratio".to_string(), json!(ratio));
    }
    if let Some(domain) = &data.domain {
        metadata.insert("domain".to_string(), json!(domain));
    }

    let url = match data.url {
        Some(url) if !data.is_self && !url.is_empty() => url,
        _ => permalink,
    };

    Ok(ForumPost {
        id: data.id,
        platform: Platform::Reddit,
        title: data.title,
        content: (!data.selftext.is_empty()).then_some(data.selftext),
        author: data.author,
        author_id: data.author_fullname,
        url,
        score: data.score,
        comment_count: data.num_comments,
        created_at: timestamp(data.created_utc),
        updated_at: edited_at(&data.edited),
        category: data.subreddit,
        tags: data.link_flair_text.map(|flair| vec![flair]),
        metadata,
    })
}

/// First post of a `by_id` listing
pub fn single_post(listing: RawListing, url: &str) -> Result<Option<ForumPost>, HarvestError> {
    let (mut posts, mut failures) = listing_posts(listing, url);
    if posts.is_empty() {
        if let Some(failure) = failures.pop() {
            return Err(failure);
        }
        return Ok(None);
    }
    Ok(Some(posts.swap_remove(0)))
}

/// Comments of a `[post, comments]` response, in thread order
///
/// Replies deeper than `max_depth` are dropped and `more` placeholders are
/// skipped.
pub fn thread_comments(
    mut response: Vec<RawListing>,
    post_id: &str,
    max_depth: u32,
    url: &str,
) -> Result<(Vec<Comment>, Vec<HarvestError>), HarvestError> {
    if response.len() < 2 {
        return Err(HarvestError::Decode {
            url: url.to_string(),
            message: format!("expected [post, comments], got {} listings", response.len()),
        });
    }
    let comments = response.swap_remove(1);

    let mut builder = CommentTreeBuilder::new();
    let mut failures = Vec::new();
    let mut queue: VecDeque<(Thing<Value>, Option<String>, u32)> = comments
        .data
        .children
        .into_iter()
        .map(|child| (child, None, 0))
        .collect();

    while let Some((child, parent_id, depth)) = queue.pop_front() {
        if child.kind != "t1" {
            continue;
        }

        let data: CommentData = match serde_json::from_value(child.data) {
            Ok(data) => data,
            Err(e) => {
                failures.push(decode_error(url, "comment", e));
                continue;
            }
        };

        if depth < max_depth {
            match reply_listing(data.replies) {
                Ok(replies) => queue.extend(
                    replies
                        .into_iter()
                        .map(|reply| (reply, Some(data.id.clone()), depth + 1)),
                ),
                Err(e) => failures.push(decode_error(url, "replies", e)),
            }
        }

        builder.insert(Comment {
            id: data.id,
            post_id: post_id.to_string(),
            parent_id,
            depth,
            author: data.author,
            author_id: data.author_fullname,
            content: data.body,
            score: data.score,
            created_at: timestamp(data.created_utc),
            updated_at: edited_at(&data.edited),
            platform: Platform::Reddit,
        });
    }

    Ok((builder.build(), failures))
}

fn reply_listing(replies: Value) -> Result<Vec<Thing<Value>>, serde_json::Error> {
    match replies {
        Value::Object(_) => {
            let listing: RawListing = serde_json::from_value(replies)?;
            Ok(listing.data.children)
        }
        _ => Ok(Vec::new()),
    }
}

/// Profile from a `/user/{name}/about` response
pub fn user_about(thing: Thing<Value>, url: &str) -> Result<User, HarvestError> {
    let data: UserData =
        serde_json::from_value(thing.data).map_err(|e| decode_error(url, "user", e))?;

    let mut metadata = Metadata::new();
    metadata.insert("link_karma".to_string(), json!(data.link_karma));
    metadata.insert("comment_karma".to_string(), json!(data.comment_karma));
    metadata.insert("is_gold".to_string(), json!(data.is_gold));
    metadata.insert("is_mod".to_string(), json!(data.is_mod));
    metadata.insert("verified".to_string(), json!(data.verified));

    Ok(User {
        id: data.id,
        karma: data
            .total_karma
            .unwrap_or(data.link_karma + data.comment_karma),
        username: data.name,
        created_at: data.created_utc.map(timestamp),
        platform: Platform::Reddit,
        metadata,
    })
}

/// Normalizes `r/name` and checks Reddit's subreddit naming rules
pub fn validate_subreddit(name: &str) -> Result<String, HarvestError> {
    let name = name.trim().trim_start_matches("/r/").trim_start_matches("r/");
    let valid = (2..=21).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(HarvestError::Validation(format!(
            "invalid subreddit name '{}'",
            name
        )))
    }
}

/// Normalizes `t3_` fullnames and checks for a base-36 id
pub fn validate_post_id(id: &str) -> Result<String, HarvestError> {
    let id = id.trim().trim_start_matches("t3_");
    let valid = (1..=13).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase());
    if valid {
        Ok(id.to_string())
    } else {
        Err(HarvestError::Validation(format!("invalid post id '{}'", id)))
    }
}

/// Normalizes `u/name` and checks Reddit's username rules
pub fn validate_username(name: &str) -> Result<String, HarvestError> {
    let name = name.trim().trim_start_matches("/u/").trim_start_matches("u/");
    let valid = (3..=20).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name.to_string())
    } else {
        Err(HarvestError::Validation(format!("invalid username '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": "someone",
                "body": format!("body {}", id),
                "score": 3,
                "created_utc": 1_700_000_000.0,
                "edited": false,
                "replies": replies,
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"children": children, "after": null, "before": null}})
    }

    #[test]
    fn test_post_normalization() {
        let raw: RawListing = serde_json::from_value(listing(vec![json!({
            "kind": "t3",
            "data": {
                "id": "abc123",
                "name": "t3_abc123",
                "title": "Hello",
                "selftext": "",
                "author": "poster",
                "author_fullname": "t2_xyz",
                "url": "https://example.com/article",
                "permalink": "/r/rust/comments/abc123/hello/",
                "score": 42,
                "num_comments": 7,
                "created_utc": 1_700_000_000.0,
                "edited": 1_700_000_500.0,
                "subreddit": "rust",
                "link_flair_text": "News",
                "is_self": false
            }
        })]))
        .unwrap();

        let (posts, failures) = listing_posts(raw, "https://oauth.reddit.com/r/rust/hot");
        assert!(failures.is_empty());
        let post = &posts[0];
        assert_eq!(post.id, "abc123");
        assert_eq!(post.content, None);
        assert_eq!(post.url, "https://example.com/article");
        assert_eq!(post.category.as_deref(), Some("rust"));
        assert_eq!(post.tags, Some(vec!["News".to_string()]));
        assert_eq!(post.created_at.timestamp(), 1_700_000_000);
        assert_eq!(post.updated_at.map(|t| t.timestamp()), Some(1_700_000_500));
        assert_eq!(post.metadata["fullname"], json!("t3_abc123"));
    }

    #[test]
    fn test_malformed_post_collected() {
        let raw: RawListing = serde_json::from_value(listing(vec![
            json!({"kind": "t3", "data": {"title": "no id"}}),
            json!({"kind": "t5", "data": {}}),
        ]))
        .unwrap();

        let (posts, failures) = listing_posts(raw, "url");
        assert!(posts.is_empty());
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_listing_without_children() {
        let raw: RawListing =
            serde_json::from_value(json!({"kind": "Listing", "data": {"after": "t3_z"}})).unwrap();
        assert!(raw.data.children.is_empty());
        assert_eq!(raw.data.after.as_deref(), Some("t3_z"));
        assert_eq!(raw.data.before, None);
    }

    #[test]
    fn test_thread_order_and_depth() {
        let response: Vec<RawListing> = serde_json::from_value(json!([
            listing(vec![]),
            listing(vec![
                comment("a", listing(vec![comment("c", json!(""))])),
                comment("b", json!("")),
                json!({"kind": "more", "data": {"count": 10, "children": ["x", "y"]}}),
            ]),
        ]))
        .unwrap();

        let (comments, failures) = thread_comments(response, "post", 10, "url").unwrap();
        assert!(failures.is_empty());
        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        let depths: Vec<u32> = comments.iter().map(|c| c.depth).collect();
        assert_eq!(depths, vec![0, 1, 0]);
        assert_eq!(comments[1].parent_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_thread_respects_max_depth() {
        let response: Vec<RawListing> = serde_json::from_value(json!([
            listing(vec![]),
            listing(vec![comment(
                "a",
                listing(vec![comment("b", listing(vec![comment("c", json!(""))]))]),
            )]),
        ]))
        .unwrap();

        let (comments, _) = thread_comments(response, "post", 1, "url").unwrap();
        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_thread_requires_two_listings() {
        let response: Vec<RawListing> = serde_json::from_value(json!([listing(vec![])])).unwrap();
        assert!(matches!(
            thread_comments(response, "post", 10, "url"),
            Err(HarvestError::Decode { .. })
        ));
    }

    #[test]
    fn test_user_karma() {
        let thing: Thing<Value> = serde_json::from_value(json!({
            "kind": "t2",
            "data": {"id": "1w72", "name": "spez", "link_karma": 10, "comment_karma": 5, "created_utc": 1_118_030_400.0}
        }))
        .unwrap();

        let user = user_about(thing, "url").unwrap();
        assert_eq!(user.username, "spez");
        assert_eq!(user.karma, 15);
        assert!(user.created_at.is_some());
    }

    #[test]
    fn test_validation() {
        assert_eq!(validate_subreddit("r/rust").unwrap(), "rust");
        assert!(validate_subreddit("no spaces").is_err());
        assert!(validate_subreddit("x").is_err());

        assert_eq!(validate_post_id("t3_abc123").unwrap(), "abc123");
        assert!(validate_post_id("ABC!").is_err());

        assert_eq!(validate_username("u/spez").unwrap(), "spez");
        assert!(validate_username("a").is_err());
    }
}
