//! 数据模型 - 会话、消息与动态的类型定义
//!
//! 本模块提供：
//! - 统一收件箱中的会话条目（单聊 + 群房间）
//! - 消息与表情反馈
//! - 最近动态（消息 / 反馈 / 主题变更 / 成员变更）的标签联合类型
//! - 缓存快照条目
//! - 同步作用域（Scope）定义

use serde::{Deserialize, Serialize};

/// 会话类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationKind {
    /// 单聊
    Direct,
    /// 群房间
    Group,
}

/// 会话对端描述（单聊为对方用户，群聊为房间本身）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterpart {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    Image,
    Voice,
    File,
    System,
}

/// 表情反馈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// 消息实体
///
/// 消息 ID 由服务端分配；仅未确认的本地附件消息使用 `local-` 前缀的临时 ID，
/// 这类消息属于待上传状态，不会写入缓存快照，下一次全量刷新时被整体替换。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息 ID（服务端分配；`local-` 前缀表示未确认的本地消息）
    pub id: String,
    /// 发送者用户 ID
    pub sender_id: String,
    /// 消息内容
    pub content: String,
    /// 消息类型
    pub message_type: MessageType,
    /// 创建时间（UNIX 毫秒时间戳，UTC）
    pub created_at: i64,
    /// 表情反馈列表
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// 回复的消息 ID（可选）
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Message {
    /// 本地临时消息 ID 前缀
    pub const LOCAL_ID_PREFIX: &'static str = "local-";

    /// 创建一条本地临时消息（未经服务端确认）
    pub fn new_local(sender_id: impl Into<String>, content: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: format!("{}{}", Self::LOCAL_ID_PREFIX, uuid::Uuid::new_v4()),
            sender_id: sender_id.into(),
            content: content.into(),
            message_type,
            created_at: chrono::Utc::now().timestamp_millis(),
            reactions: Vec::new(),
            reply_to: None,
        }
    }

    /// 是否是仅存在于本地的临时消息（尚未获得服务端 ID）
    pub fn is_local_only(&self) -> bool {
        self.id.starts_with(Self::LOCAL_ID_PREFIX)
    }
}

/// 会话的最后一条消息摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    /// 发送时间（UNIX 毫秒时间戳，UTC）
    pub timestamp: i64,
    pub message_type: MessageType,
    pub is_read: bool,
}

/// 最近动态类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    /// 普通消息
    Message,
    /// 表情反馈
    Reaction,
    /// 主题变更
    ThemeChange,
    /// 成员变更（加入 / 离开 / 管理员变更）
    MembershipChange,
}

/// 会话最近一次非消息动态
///
/// `summary` 为服务端预渲染的展示文案，客户端不二次拼装，仅按 `kind` 选择图标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastActivity {
    pub kind: ActivityKind,
    /// 服务端渲染好的摘要文案
    pub summary: String,
    /// 触发动态的用户 ID
    pub actor_id: String,
    /// 动态时间（UNIX 毫秒时间戳，UTC）
    pub timestamp: i64,
}

/// 统一收件箱中的会话条目
///
/// 单聊会话与群房间合并进同一个 feed 后都表现为此类型；
/// 会话 ID 在两种类型之间全局唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub counterpart: Counterpart,
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub last_activity: Option<LastActivity>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_muted: bool,
    /// 是否是"消息请求"（未建立关系的来信，展示在独立列表）
    #[serde(default)]
    pub is_request: bool,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// 排序用的最近时间（优先取最后一条消息，其次取最近动态）
    pub fn last_timestamp(&self) -> i64 {
        let msg_ts = self.last_message.as_ref().map(|m| m.timestamp).unwrap_or(0);
        let act_ts = self.last_activity.as_ref().map(|a| a.timestamp).unwrap_or(0);
        msg_ts.max(act_ts)
    }
}

/// 已加入的群房间摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub member_count: u32,
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub last_activity: Option<LastActivity>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub unread_count: u32,
}

impl RoomSummary {
    /// 合成统一收件箱中的会话条目（房间以最近动态合成 lastMessage 等价的预览）
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.id.clone(),
            kind: ConversationKind::Group,
            counterpart: Counterpart {
                id: self.id,
                display_name: self.name,
                avatar_url: self.avatar_url,
            },
            last_message: self.last_message,
            last_activity: self.last_activity,
            is_pinned: self.is_pinned,
            is_archived: self.is_archived,
            is_muted: self.is_muted,
            is_request: false,
            unread_count: self.unread_count,
        }
    }
}

/// 缓存快照条目
///
/// 每次成功的全量刷新后整体覆盖写入，从不做增量修补。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// 写入时间（UNIX 毫秒时间戳，UTC）
    pub saved_at: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            saved_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 同步作用域
///
/// 一个作用域是一个独立的同步单元：单个单聊会话、单个群房间，或聚合会话列表。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// 单个单聊会话
    Direct(String),
    /// 单个群房间
    Room(String),
    /// 聚合会话列表（收件箱）
    Inbox,
}

impl Scope {
    /// 缓存键（用户维度的隔离在 KV 层完成，这里仅区分作用域）
    pub fn cache_key(&self) -> String {
        match self {
            Scope::Direct(id) => format!("conv_{}", id),
            Scope::Room(id) => format!("room_{}", id),
            Scope::Inbox => "inbox".to_string(),
        }
    }

    /// 作用域对应的会话 / 房间 ID（聚合列表无 ID）
    pub fn scope_id(&self) -> Option<&str> {
        match self {
            Scope::Direct(id) | Scope::Room(id) => Some(id),
            Scope::Inbox => None,
        }
    }

    pub fn is_room(&self) -> bool {
        matches!(self, Scope::Room(_))
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Direct(id) => write!(f, "direct:{}", id),
            Scope::Room(id) => write!(f, "room:{}", id),
            Scope::Inbox => write!(f, "inbox"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_message(ts: i64) -> LastMessage {
        LastMessage {
            id: "m1".to_string(),
            content: "hi".to_string(),
            sender_id: "u2".to_string(),
            timestamp: ts,
            message_type: MessageType::Text,
            is_read: false,
        }
    }

    #[test]
    fn test_local_message_id_prefix() {
        let msg = Message::new_local("u1", "photo", MessageType::Image);
        assert!(msg.is_local_only());
        assert!(msg.id.starts_with("local-"));

        let confirmed = Message {
            id: "srv-9".to_string(),
            ..msg
        };
        assert!(!confirmed.is_local_only());
    }

    #[test]
    fn test_room_into_conversation() {
        let room = RoomSummary {
            id: "r1".to_string(),
            name: "周末爬山群".to_string(),
            avatar_url: None,
            member_count: 8,
            last_message: Some(last_message(100)),
            last_activity: None,
            is_pinned: true,
            is_archived: false,
            is_muted: true,
            unread_count: 3,
        };

        let conv = room.into_conversation();
        assert_eq!(conv.kind, ConversationKind::Group);
        assert_eq!(conv.id, "r1");
        assert_eq!(conv.counterpart.display_name, "周末爬山群");
        assert!(conv.is_pinned);
        assert!(conv.is_muted);
        assert!(!conv.is_request);
        assert_eq!(conv.unread_count, 3);
    }

    #[test]
    fn test_last_timestamp_prefers_newest() {
        let mut conv = Conversation {
            id: "c1".to_string(),
            kind: ConversationKind::Direct,
            counterpart: Counterpart {
                id: "u2".to_string(),
                display_name: "小美".to_string(),
                avatar_url: None,
            },
            last_message: Some(last_message(100)),
            last_activity: Some(LastActivity {
                kind: ActivityKind::Reaction,
                summary: "对消息做出了回应".to_string(),
                actor_id: "u2".to_string(),
                timestamp: 200,
            }),
            is_pinned: false,
            is_archived: false,
            is_muted: false,
            is_request: false,
            unread_count: 0,
        };

        // 动态更新时取动态时间
        assert_eq!(conv.last_timestamp(), 200);

        // 消息更新时取消息时间
        conv.last_message = Some(last_message(300));
        assert_eq!(conv.last_timestamp(), 300);
    }

    #[test]
    fn test_scope_cache_keys() {
        assert_eq!(Scope::Direct("c1".to_string()).cache_key(), "conv_c1");
        assert_eq!(Scope::Room("r1".to_string()).cache_key(), "room_r1");
        assert_eq!(Scope::Inbox.cache_key(), "inbox");
        assert_eq!(Scope::Inbox.scope_id(), None);
        assert_eq!(Scope::Room("r1".to_string()).scope_id(), Some("r1"));
    }
}
