use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NAME_MAX_CHARS: usize = 50;
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    // Unknown values fall back to newest-first.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub likes: i64,
    pub created_at: NaiveDateTime,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub message_id: i64,
    pub name: String,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// One row of the listing as stored in the cache.
///
/// `time_display` is computed when the record is built and is served as-is
/// on a cache hit, so it can lag by up to one TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub likes: i64,
    pub created_at: String,
    pub time_display: String,
}

impl MessageView {
    pub fn from_message(msg: &Message, now: DateTime<Utc>) -> Self {
        Self {
            id: msg.id,
            name: msg.name.clone(),
            content: msg.content.clone(),
            likes: msg.likes,
            created_at: msg.created_at.format(DISPLAY_FORMAT).to_string(),
            time_display: time_ago(msg.created_at, now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub message_id: i64,
    pub name: String,
    pub content: String,
    pub created_at: String,
    pub time_display: String,
}

impl CommentView {
    pub fn from_comment(comment: &Comment, now: DateTime<Utc>) -> Self {
        Self {
            id: comment.id,
            message_id: comment.message_id,
            name: comment.name.clone(),
            content: comment.content.clone(),
            created_at: comment.created_at.format(DISPLAY_FORMAT).to_string(),
            time_display: time_ago(comment.created_at, now),
        }
    }
}

// What the pages and the JSON API render: a cached message plus its comments.
#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    #[serde(flatten)]
    pub message: MessageView,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub cache: String,
    pub timestamp: f64,
}

/// Human relative time, e.g. "just now" or "5 minutes ago". Anything a week
/// old or more is shown as an absolute date.
pub fn time_ago(created_at: NaiveDateTime, now: DateTime<Utc>) -> String {
    let delta = now.naive_utc() - created_at;

    if delta.num_seconds() < 60 {
        "just now".to_string()
    } else if delta.num_minutes() < 60 {
        plural(delta.num_minutes(), "minute")
    } else if delta.num_hours() < 24 {
        plural(delta.num_hours(), "hour")
    } else if delta.num_days() < 7 {
        plural(delta.num_days(), "day")
    } else {
        created_at.format("%Y-%m-%d %H:%M").to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 29, 12, 0, 0).unwrap()
    }

    fn ago(d: Duration) -> NaiveDateTime {
        now().naive_utc() - d
    }

    #[test]
    fn relative_time_buckets() {
        assert_eq!(time_ago(ago(Duration::seconds(5)), now()), "just now");
        assert_eq!(time_ago(ago(Duration::seconds(59)), now()), "just now");
        assert_eq!(time_ago(ago(Duration::seconds(60)), now()), "1 minute ago");
        assert_eq!(time_ago(ago(Duration::minutes(5)), now()), "5 minutes ago");
        assert_eq!(time_ago(ago(Duration::minutes(59)), now()), "59 minutes ago");
        assert_eq!(time_ago(ago(Duration::hours(1)), now()), "1 hour ago");
        assert_eq!(time_ago(ago(Duration::hours(23)), now()), "23 hours ago");
        assert_eq!(time_ago(ago(Duration::days(1)), now()), "1 day ago");
        assert_eq!(time_ago(ago(Duration::days(6)), now()), "6 days ago");
    }

    #[test]
    fn older_than_a_week_shows_date() {
        let created = NaiveDate::from_ymd_opt(2025, 10, 1)
            .unwrap()
            .and_hms_opt(8, 30, 15)
            .unwrap();
        assert_eq!(time_ago(created, now()), "2025-10-01 08:30");
    }

    #[test]
    fn clock_skew_reads_as_just_now() {
        assert_eq!(time_ago(ago(Duration::seconds(-30)), now()), "just now");
    }

    #[test]
    fn view_serializes_with_contract_keys() {
        let msg = Message {
            id: 7,
            name: "Alice".into(),
            content: "hi".into(),
            likes: 2,
            created_at: ago(Duration::minutes(5)),
            user_id: None,
        };
        let json = serde_json::to_value(MessageView::from_message(&msg, now())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "name": "Alice",
                "content": "hi",
                "likes": 2,
                "created_at": "2025-10-29 11:55:00",
                "time_display": "5 minutes ago",
            })
        );
    }

    #[test]
    fn sort_order_is_lenient() {
        assert_eq!(SortOrder::parse_lenient(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse_lenient(Some("ASC")), SortOrder::Asc);
        assert_eq!(SortOrder::parse_lenient(Some("desc")), SortOrder::Desc);
        assert_eq!(SortOrder::parse_lenient(Some("sideways")), SortOrder::Desc);
        assert_eq!(SortOrder::parse_lenient(None), SortOrder::Desc);
    }
}
