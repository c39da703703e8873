//! 会话列表投影模块
//!
//! 把单聊会话集合与已加入房间集合合并为一条有序、过滤后的 feed：
//! - 合并：房间合成 Conversation 形状的条目（以最近动态充当预览）
//! - 过滤："聊天" 视图排除已归档与消息请求；"请求" 视图是互斥列表；
//!   搜索对显示名或预览文案做大小写不敏感的子串匹配
//! - 排序：置顶优先（置顶条目之间保持原有相对顺序），其余按最近消息时间倒序
//! - 预览：普通消息带发送者前缀（本地用户为 "You: "）；
//!   反馈 / 主题变更 / 成员变更使用类型图标 + 服务端预渲染文案

use crate::models::{ActivityKind, Conversation, ConversationKind, RoomSummary};

/// 收件箱视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxView {
    /// 常规聊天列表（排除已归档与消息请求）
    Chats,
    /// 消息请求列表（与聊天列表互斥）
    Requests,
}

/// 收件箱过滤条件
#[derive(Debug, Clone)]
pub struct InboxFilter {
    pub view: InboxView,
    /// 搜索关键字（None 表示不过滤）
    pub search: Option<String>,
}

impl Default for InboxFilter {
    fn default() -> Self {
        Self {
            view: InboxView::Chats,
            search: None,
        }
    }
}

/// 会话列表投影器
pub struct ConversationListProjector {
    local_user_id: String,
}

impl ConversationListProjector {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
        }
    }

    /// 产出合并、过滤、排序后的 feed
    pub fn project(
        &self,
        conversations: &[Conversation],
        rooms: &[RoomSummary],
        filter: &InboxFilter,
    ) -> Vec<Conversation> {
        // 1. 合并：单聊在前，房间合成同构条目在后
        let mut feed: Vec<Conversation> = conversations.to_vec();
        feed.extend(rooms.iter().cloned().map(RoomSummary::into_conversation));

        // 2. 视图过滤
        feed.retain(|item| match filter.view {
            InboxView::Chats => !item.is_archived && !item.is_request,
            InboxView::Requests => item.is_request && !item.is_archived,
        });

        // 3. 搜索过滤（显示名或预览文案，大小写不敏感子串）
        if let Some(query) = filter.search.as_deref() {
            let query = query.trim().to_lowercase();
            if !query.is_empty() {
                feed.retain(|item| {
                    item.counterpart.display_name.to_lowercase().contains(&query)
                        || self.preview_text(item).to_lowercase().contains(&query)
                });
            }
        }

        // 4. 排序：置顶条目保持原有相对顺序排在前，其余按最近时间倒序
        let (pinned, mut rest): (Vec<Conversation>, Vec<Conversation>) =
            feed.into_iter().partition(|item| item.is_pinned);
        rest.sort_by(|a, b| b.last_timestamp().cmp(&a.last_timestamp()));

        let mut result = pinned;
        result.extend(rest);
        result
    }

    /// 派生会话条目的预览文案
    ///
    /// 最近动态比最后消息新时按动态渲染，否则按消息渲染。
    pub fn preview_text(&self, item: &Conversation) -> String {
        let msg_ts = item.last_message.as_ref().map(|m| m.timestamp).unwrap_or(0);

        if let Some(activity) = item
            .last_activity
            .as_ref()
            .filter(|a| a.kind != ActivityKind::Message && a.timestamp >= msg_ts)
        {
            let icon = match activity.kind {
                ActivityKind::Reaction => "❤️ ",
                ActivityKind::ThemeChange => "🎨 ",
                ActivityKind::MembershipChange => "👥 ",
                ActivityKind::Message => "",
            };
            // 仅本地用户触发的反馈带 "You " 前缀
            let prefix = if activity.kind == ActivityKind::Reaction
                && activity.actor_id == self.local_user_id
            {
                "You "
            } else {
                ""
            };
            return format!("{}{}{}", icon, prefix, activity.summary);
        }

        match &item.last_message {
            Some(message) => {
                if message.sender_id == self.local_user_id {
                    format!("You: {}", message.content)
                } else if item.kind == ConversationKind::Direct {
                    format!("{}: {}", item.counterpart.display_name, message.content)
                } else {
                    message.content.clone()
                }
            }
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counterpart, LastActivity, LastMessage, MessageType};

    fn conversation(id: &str, name: &str, ts: i64, pinned: bool) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::Direct,
            counterpart: Counterpart {
                id: format!("user-{}", id),
                display_name: name.to_string(),
                avatar_url: None,
            },
            last_message: Some(LastMessage {
                id: format!("m-{}", id),
                content: "hello".to_string(),
                sender_id: format!("user-{}", id),
                timestamp: ts,
                message_type: MessageType::Text,
                is_read: false,
            }),
            last_activity: None,
            is_pinned: pinned,
            is_archived: false,
            is_muted: false,
            is_request: false,
            unread_count: 0,
        }
    }

    fn room(id: &str, name: &str, ts: i64) -> RoomSummary {
        RoomSummary {
            id: id.to_string(),
            name: name.to_string(),
            avatar_url: None,
            member_count: 5,
            last_message: Some(LastMessage {
                id: format!("m-{}", id),
                content: "room talk".to_string(),
                sender_id: "u9".to_string(),
                timestamp: ts,
                message_type: MessageType::Text,
                is_read: true,
            }),
            last_activity: None,
            is_pinned: false,
            is_archived: false,
            is_muted: false,
            unread_count: 0,
        }
    }

    fn projector() -> ConversationListProjector {
        ConversationListProjector::new("me")
    }

    #[test]
    fn test_pinned_precedes_newer_unpinned() {
        // A 置顶但更旧，B 未置顶但更新，A 仍在前
        let a = conversation("a", "Alice", 10, true);
        let b = conversation("b", "Bob", 20, false);

        let feed = projector().project(&[a, b], &[], &InboxFilter::default());
        assert_eq!(feed[0].id, "a");
        assert_eq!(feed[1].id, "b");
    }

    #[test]
    fn test_pinned_stable_among_themselves_and_rest_by_recency() {
        let p1 = conversation("p1", "P1", 5, true);
        let p2 = conversation("p2", "P2", 50, true);
        let c1 = conversation("c1", "C1", 10, false);
        let c2 = conversation("c2", "C2", 30, false);

        let feed = projector().project(&[p1, c1, p2, c2], &[], &InboxFilter::default());
        let ids: Vec<&str> = feed.iter().map(|c| c.id.as_str()).collect();
        // 置顶保持输入相对顺序（p1 在 p2 前），未置顶按时间倒序
        assert_eq!(ids, vec!["p1", "p2", "c2", "c1"]);
    }

    #[test]
    fn test_rooms_are_merged_into_feed() {
        let c = conversation("c1", "Alice", 10, false);
        let r = room("r1", "周末爬山群", 20);

        let feed = projector().project(&[c], &[r], &InboxFilter::default());
        assert_eq!(feed.len(), 2);
        // 房间消息更新，排在前面
        assert_eq!(feed[0].id, "r1");
        assert_eq!(feed[0].kind, ConversationKind::Group);
    }

    #[test]
    fn test_chats_view_excludes_archived_and_requests() {
        let normal = conversation("c1", "Alice", 10, false);
        let mut archived = conversation("c2", "Bob", 20, false);
        archived.is_archived = true;
        let mut request = conversation("c3", "Carol", 30, false);
        request.is_request = true;

        let chats = projector().project(
            &[normal.clone(), archived.clone(), request.clone()],
            &[],
            &InboxFilter::default(),
        );
        let ids: Vec<&str> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1"]);

        // 请求视图与聊天视图互斥
        let requests = projector().project(
            &[normal, archived, request],
            &[],
            &InboxFilter {
                view: InboxView::Requests,
                search: None,
            },
        );
        let ids: Vec<&str> = requests.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c3"]);
    }

    #[test]
    fn test_search_matches_name_or_preview() {
        let mut a = conversation("a", "Alice", 10, false);
        a.last_message.as_mut().unwrap().content = "去吃火锅吗".to_string();
        let b = conversation("b", "Bob", 20, false);

        let filter = |q: &str| InboxFilter {
            view: InboxView::Chats,
            search: Some(q.to_string()),
        };

        // 按显示名匹配（大小写不敏感）
        let feed = projector().project(&[a.clone(), b.clone()], &[], &filter("alice"));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "a");

        // 按预览文案匹配
        let feed = projector().project(&[a.clone(), b.clone()], &[], &filter("火锅"));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "a");

        // 无匹配
        let feed = projector().project(&[a, b], &[], &filter("zzz"));
        assert!(feed.is_empty());
    }

    #[test]
    fn test_preview_prefixes_for_messages() {
        let projector = projector();

        // 对方发的消息：对方名字前缀
        let theirs = conversation("a", "Alice", 10, false);
        assert_eq!(projector.preview_text(&theirs), "Alice: hello");

        // 本地用户发的消息："You: " 前缀
        let mut mine = conversation("b", "Bob", 10, false);
        mine.last_message.as_mut().unwrap().sender_id = "me".to_string();
        assert_eq!(projector.preview_text(&mine), "You: hello");
    }

    #[test]
    fn test_preview_for_activities() {
        let projector = projector();

        // 对方的反馈：图标 + 服务端文案，无 "You " 前缀
        let mut item = conversation("a", "Alice", 10, false);
        item.last_activity = Some(LastActivity {
            kind: ActivityKind::Reaction,
            summary: "liked a message".to_string(),
            actor_id: "user-a".to_string(),
            timestamp: 20,
        });
        assert_eq!(projector.preview_text(&item), "❤️ liked a message");

        // 本地用户的反馈：带 "You " 前缀
        item.last_activity.as_mut().unwrap().actor_id = "me".to_string();
        assert_eq!(projector.preview_text(&item), "❤️ You liked a message");

        // 主题变更：主题图标
        item.last_activity = Some(LastActivity {
            kind: ActivityKind::ThemeChange,
            summary: "changed the theme to Sunset".to_string(),
            actor_id: "user-a".to_string(),
            timestamp: 20,
        });
        assert_eq!(
            projector.preview_text(&item),
            "🎨 changed the theme to Sunset"
        );

        // 动态比消息旧时回退到消息预览
        item.last_activity.as_mut().unwrap().timestamp = 5;
        assert_eq!(projector.preview_text(&item), "Alice: hello");
    }
}
