use crate::cache::CacheLayer;
use crate::error::{AppError, AppResult};
use crate::models::{
    CommentView, ListingEntry, Message, MessageView, SortOrder, User, NAME_MAX_CHARS,
};
use crate::store::Store;
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};

/// Cache key of the newest-first listing.
pub const LISTING_CACHE_KEY: &str = "messages_cache";

/// The message board: store access with the listing cache in front of it.
///
/// Reads of the newest-first listing go through the cache. Every mutation
/// drops the cached listing once the store has accepted the write.
pub struct Board {
    store: Store,
    cache: Arc<CacheLayer>,
    ttl_secs: u64,
}

impl Board {
    pub fn new(store: Store, cache: Arc<CacheLayer>, ttl_secs: u64) -> Self {
        Self {
            store,
            cache,
            ttl_secs,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// Messages in the requested order, without comments.
    pub async fn messages(&self, sort: SortOrder) -> AppResult<Vec<MessageView>> {
        // --- Step 1: newest-first may come straight from the cache ---
        if sort == SortOrder::Desc {
            if let Some(cached) = self.cached_listing().await {
                debug!("Listing served from cache ({} messages)", cached.len());
                return Ok(cached);
            }
        }

        // --- Step 2: miss, disabled cache or ascending order: ask the store ---
        let now = Utc::now();
        let views: Vec<MessageView> = self
            .store
            .list_messages(sort)
            .await?
            .iter()
            .map(|msg| MessageView::from_message(msg, now))
            .collect();

        // --- Step 3: repopulate. Only the newest-first orientation is ever cached ---
        if sort == SortOrder::Desc {
            let payload = serde_json::to_vec(&views)?;
            if self.cache.set(LISTING_CACHE_KEY, payload, self.ttl_secs).await {
                debug!("Listing loaded from database and cached");
            }
        }

        Ok(views)
    }

    /// Messages with their comments attached, as the pages render them.
    pub async fn listing(&self, sort: SortOrder) -> AppResult<Vec<ListingEntry>> {
        let messages = self.messages(sort).await?;

        let now = Utc::now();
        let mut by_message: HashMap<i64, Vec<CommentView>> = HashMap::new();
        for comment in self.store.list_comments().await? {
            by_message
                .entry(comment.message_id)
                .or_default()
                .push(CommentView::from_comment(&comment, now));
        }

        Ok(messages
            .into_iter()
            .map(|message| ListingEntry {
                comments: by_message.remove(&message.id).unwrap_or_default(),
                message,
            })
            .collect())
    }

    /// Returns `None` when name or content is blank; nothing is stored then.
    pub async fn post_message(
        &self,
        name: &str,
        content: &str,
        author: Option<&User>,
    ) -> AppResult<Option<Message>> {
        let Some((name, content)) = clean_post(name, content)? else {
            return Ok(None);
        };

        let msg = self
            .store
            .create_message(name, content, author.map(|u| u.id))
            .await?;
        info!("New message {} from {}", msg.id, msg.name);
        self.invalidate_listing("new message").await;
        Ok(Some(msg))
    }

    pub async fn delete_message(&self, id: i64) -> AppResult<bool> {
        let deleted = self.store.delete_message(id).await?;
        if !deleted {
            warn!("delete_message: message {} not found", id);
        }
        self.invalidate_listing("message deleted").await;
        Ok(deleted)
    }

    pub async fn like_message(&self, id: i64) -> AppResult<bool> {
        let liked = self.store.like_message(id).await?;
        if !liked {
            warn!("like_message: message {} not found", id);
        }
        self.invalidate_listing("message liked").await;
        Ok(liked)
    }

    pub async fn clear_messages(&self) -> AppResult<u64> {
        let removed = self.store.clear_messages().await?;
        info!("Cleared {} messages", removed);
        self.invalidate_listing("all messages cleared").await;
        Ok(removed)
    }

    pub async fn add_comment(
        &self,
        message_id: i64,
        name: &str,
        content: &str,
        author: Option<&User>,
    ) -> AppResult<bool> {
        if self.store.get_message(message_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        let Some((name, content)) = clean_post(name, content)? else {
            return Ok(false);
        };

        self.store
            .create_comment(message_id, name, content, author.map(|u| u.id))
            .await?;
        self.invalidate_listing("new comment").await;
        Ok(true)
    }

    pub async fn delete_comment(&self, id: i64) -> AppResult<bool> {
        let deleted = self.store.delete_comment(id).await?;
        self.invalidate_listing("comment deleted").await;
        Ok(deleted)
    }

    /// Deleting an account rewrites the owner column of its messages.
    pub async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let deleted = self.store.delete_user(id).await?;
        self.invalidate_listing("user deleted").await;
        Ok(deleted)
    }

    async fn cached_listing(&self) -> Option<Vec<MessageView>> {
        let bytes = self.cache.get(LISTING_CACHE_KEY).await?;
        match serde_json::from_slice(&bytes) {
            Ok(views) => Some(views),
            Err(e) => {
                warn!("Ignoring unreadable cached listing: {}", e);
                None
            }
        }
    }

    // Best effort: a failed invalidation is logged by the cache layer and the
    // stale entry lives out its TTL.
    async fn invalidate_listing(&self, reason: &str) {
        if self.cache.invalidate(LISTING_CACHE_KEY).await {
            debug!("Listing cache invalidated ({})", reason);
        }
    }
}

// Trims both fields. Blank input is silently ignored, an over-long name is an error.
fn clean_post<'a>(name: &'a str, content: &'a str) -> AppResult<Option<(&'a str, &'a str)>> {
    let (name, content) = (name.trim(), content.trim());
    if name.is_empty() || content.is_empty() {
        return Ok(None);
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "name must be at most {} characters",
            NAME_MAX_CHARS
        )));
    }
    Ok(Some((name, content)))
}
