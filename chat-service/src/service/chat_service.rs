//! # Chat Query Service
//!
//! Read-side operations for the REST surface (conversation lists, history
//! pages, group listings) plus group creation and membership. The write
//! path for messages lives in the websocket router; this service never
//! fans out frames.

use shared::errors::ApiError;
use tracing::info;
use uuid::Uuid;

use crate::domain::{ConversationSummary, DirectMessageWithSender, Group, GroupMember, GroupMessage};
use crate::repository::{GroupRepository, MessageRepository, UserRepository};

/// History page size bounds; requests outside them are clamped.
pub const MIN_PAGE_SIZE: i64 = 1;
pub const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 50;

/// Clamps a requested limit into the allowed page-size range.
fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// Query service over the durable log.
#[derive(Clone)]
pub struct ChatService {
    users: UserRepository,
    messages: MessageRepository,
    groups: GroupRepository,
}

impl ChatService {
    pub fn new(users: UserRepository, messages: MessageRepository, groups: GroupRepository) -> Self {
        Self {
            users,
            messages,
            groups,
        }
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// One row per conversation peer with last-message preview and the
    /// caller's unread count.
    pub async fn conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>, ApiError> {
        self.messages.conversation_summaries(user_id).await
    }

    /// A page of the conversation with `peer_id`, newest first.
    ///
    /// Returns the page plus the total count for pagination. The peer
    /// must exist; limit is clamped to [1, 100].
    pub async fn conversation_with(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<(Vec<DirectMessageWithSender>, i64, i64), ApiError> {
        if !self.users.exists(peer_id).await? {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", peer_id),
            });
        }

        let limit = clamp_limit(limit);
        let offset = offset.unwrap_or(0).max(0);

        let page = self
            .messages
            .conversation_page(user_id, peer_id, limit, offset)
            .await?;
        let total = self.messages.conversation_count(user_id, peer_id).await?;

        Ok((page, total, limit))
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Creates a group; the creator becomes an admin member. Additional
    /// members may be added in the same call.
    pub async fn create_group(
        &self,
        creator_id: Uuid,
        name: &str,
        member_ids: &[Uuid],
    ) -> Result<Group, ApiError> {
        let group = self.groups.create_group(name, creator_id).await?;

        for member_id in member_ids {
            if *member_id == creator_id {
                continue;
            }
            if !self.users.exists(*member_id).await? {
                return Err(ApiError::NotFound {
                    resource: format!("user:{}", member_id),
                });
            }
            self.groups
                .add_member(group.group_id, *member_id, "member")
                .await?;
        }

        info!(group_id = %group.group_id, creator_id = %creator_id, "Group created");

        Ok(group)
    }

    /// Adds a member to a group. Only group admins may add members.
    pub async fn add_member(
        &self,
        group_id: Uuid,
        acting_user: Uuid,
        new_member: Uuid,
    ) -> Result<GroupMember, ApiError> {
        if self.groups.find_group(group_id).await?.is_none() {
            return Err(ApiError::NotFound {
                resource: format!("group:{}", group_id),
            });
        }

        if !self.groups.is_admin(group_id, acting_user).await? {
            return Err(ApiError::Forbidden);
        }

        if !self.users.exists(new_member).await? {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", new_member),
            });
        }

        let member = self.groups.add_member(group_id, new_member, "member").await?;

        info!(group_id = %group_id, user_id = %new_member, "Member added to group");

        Ok(member)
    }

    /// All groups the caller belongs to.
    pub async fn my_groups(&self, user_id: Uuid) -> Result<Vec<Group>, ApiError> {
        self.groups.groups_for_user(user_id).await
    }

    /// A page of a group's messages, newest first. Caller must be a
    /// member.
    pub async fn group_messages(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<(Vec<GroupMessage>, i64, i64), ApiError> {
        if !self.groups.is_member(group_id, user_id).await? {
            return Err(ApiError::NotGroupMember);
        }

        let limit = clamp_limit(limit);
        let offset = offset.unwrap_or(0).max(0);

        let page = self.groups.messages_page(group_id, limit, offset).await?;
        let total = self.groups.messages_count(group_id).await?;

        Ok((page, total, limit))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit_defaults() {
        assert_eq!(clamp_limit(None), 50);
    }

    #[test]
    fn test_clamp_limit_bounds() {
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(1)), 1);
        assert_eq!(clamp_limit(Some(100)), 100);
        assert_eq!(clamp_limit(Some(500)), 100);
    }
}
