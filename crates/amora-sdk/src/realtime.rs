//! 实时通道抽象 - 推送事件的观察者接口
//!
//! 把底层长连接（socket）抽象为：
//! - 类型化的推送事件流（broadcast 订阅，丢弃接收端即取消订阅）
//! - 连接状态信号（watch）
//! - 房间 / 会话维度的 join / leave（join 幂等，重复 leave 安全）
//! - 正在输入状态上行
//!
//! 同步核心只依赖本模块的 trait，传输层可被测试替身替换。

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::connection_state::{ConnectionStateManager, ConnectionStatus};
use crate::error::Result;
use crate::models::{Conversation, LastActivity, Message, RoomSummary, Scope};

/// 实时推送事件（完整线上事件面）
///
/// 房间维度的事件都携带房间 ID；同步引擎会忽略与当前活跃作用域不匹配的事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RealtimeEvent {
    /// 单聊新消息
    MessageNew { conversation_id: String, message: Message },
    /// 单聊消息表情反馈（携带合并后的完整消息）
    MessageReaction { conversation_id: String, message: Message },
    /// 单聊对方开始输入
    TypingStart { conversation_id: String, user_id: String },
    /// 单聊对方停止输入
    TypingStop { conversation_id: String, user_id: String },
    /// 会话元数据更新（归档 / 置顶 / 静音 / 已读状态等）
    ConversationUpdated { conversation: Conversation },
    /// 房间新消息
    RoomMessageNew { room_id: String, message: Message },
    /// 房间内用户开始输入
    RoomTypingStart { room_id: String, user_id: String },
    /// 房间内用户停止输入
    RoomTypingStop { room_id: String, user_id: String },
    /// 房间主题变更
    RoomThemeChanged { room_id: String, activity: LastActivity },
    /// 房间元数据更新
    RoomUpdated { room: RoomSummary },
    /// 房间被解散
    RoomDeleted { room_id: String },
    /// 成员离开房间
    RoomMemberLeft { room_id: String, user_id: String },
    /// 房间管理员变更
    RoomAdminChanged { room_id: String, user_id: String },
}

impl RealtimeEvent {
    /// 线上事件名
    pub fn event_name(&self) -> &'static str {
        match self {
            RealtimeEvent::MessageNew { .. } => "message:new",
            RealtimeEvent::MessageReaction { .. } => "message:reaction",
            RealtimeEvent::TypingStart { .. } => "typing:start",
            RealtimeEvent::TypingStop { .. } => "typing:stop",
            RealtimeEvent::ConversationUpdated { .. } => "conversation:updated",
            RealtimeEvent::RoomMessageNew { .. } => "message:new_room",
            RealtimeEvent::RoomTypingStart { .. } => "typing:start_room",
            RealtimeEvent::RoomTypingStop { .. } => "typing:stop_room",
            RealtimeEvent::RoomThemeChanged { .. } => "theme:changed_room",
            RealtimeEvent::RoomUpdated { .. } => "room:updated",
            RealtimeEvent::RoomDeleted { .. } => "room:deleted",
            RealtimeEvent::RoomMemberLeft { .. } => "member:left_room",
            RealtimeEvent::RoomAdminChanged { .. } => "admin:changed_room",
        }
    }

    /// 事件指向的同步作用域
    pub fn scope(&self) -> Scope {
        match self {
            RealtimeEvent::MessageNew { conversation_id, .. }
            | RealtimeEvent::MessageReaction { conversation_id, .. }
            | RealtimeEvent::TypingStart { conversation_id, .. }
            | RealtimeEvent::TypingStop { conversation_id, .. } => {
                Scope::Direct(conversation_id.clone())
            }
            RealtimeEvent::ConversationUpdated { conversation } => {
                Scope::Direct(conversation.id.clone())
            }
            RealtimeEvent::RoomMessageNew { room_id, .. }
            | RealtimeEvent::RoomTypingStart { room_id, .. }
            | RealtimeEvent::RoomTypingStop { room_id, .. }
            | RealtimeEvent::RoomThemeChanged { room_id, .. }
            | RealtimeEvent::RoomDeleted { room_id }
            | RealtimeEvent::RoomMemberLeft { room_id, .. }
            | RealtimeEvent::RoomAdminChanged { room_id, .. } => Scope::Room(room_id.clone()),
            RealtimeEvent::RoomUpdated { room } => Scope::Room(room.id.clone()),
        }
    }

    /// 是否是 typing 类事件（由 TypingCoordinator 处理，不进入同步引擎）
    pub fn is_typing(&self) -> bool {
        matches!(
            self,
            RealtimeEvent::TypingStart { .. }
                | RealtimeEvent::TypingStop { .. }
                | RealtimeEvent::RoomTypingStart { .. }
                | RealtimeEvent::RoomTypingStop { .. }
        )
    }
}

/// 实时通道抽象
///
/// 约定：join 幂等（同一作用域重复 join 只生效一次），leave 对未 join 的作用域安全。
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// 订阅推送事件流（丢弃接收端即取消订阅）
    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent>;

    /// 当前是否已连接
    fn is_connected(&self) -> bool;

    /// 订阅连接状态变更
    fn watch_connection(&self) -> watch::Receiver<ConnectionStatus>;

    /// 加入作用域（房间 / 会话），幂等
    async fn join_scope(&self, scope: &Scope) -> Result<()>;

    /// 离开作用域，对未加入的作用域安全
    async fn leave_scope(&self, scope: &Scope) -> Result<()>;

    /// 上行本地正在输入状态
    async fn send_typing(&self, scope: &Scope, typing: bool) -> Result<()>;
}

/// 进程内实时通道实现
///
/// 供测试与本地嵌入使用：外部可注入事件（模拟服务端推送）、切换连接状态，
/// 并检查 join 集合与 typing 上行记录。
pub struct MemoryRealtimeChannel {
    sender: broadcast::Sender<RealtimeEvent>,
    connection: ConnectionStateManager,
    joined: Mutex<HashSet<Scope>>,
    typing_log: Mutex<Vec<(Scope, bool)>>,
}

impl MemoryRealtimeChannel {
    /// 创建新的进程内通道（初始状态已连接）
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            sender,
            connection: ConnectionStateManager::new(ConnectionStatus::Connected),
            joined: Mutex::new(HashSet::new()),
            typing_log: Mutex::new(Vec::new()),
        })
    }

    /// 注入一条推送事件（模拟服务端）
    pub fn push(&self, event: RealtimeEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("No receivers for pushed event: {}", e);
        }
    }

    /// 切换连接状态
    pub fn set_connected(&self, connected: bool) {
        self.connection.set(if connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        });
    }

    /// 当前已加入的作用域集合
    pub fn joined_scopes(&self) -> Vec<Scope> {
        self.joined.lock().iter().cloned().collect()
    }

    /// typing 上行记录（按时间顺序）
    pub fn typing_emissions(&self) -> Vec<(Scope, bool)> {
        self.typing_log.lock().clone()
    }
}

#[async_trait]
impl RealtimeChannel for MemoryRealtimeChannel {
    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn watch_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch()
    }

    async fn join_scope(&self, scope: &Scope) -> Result<()> {
        let mut joined = self.joined.lock();
        if !joined.insert(scope.clone()) {
            debug!("join_scope ignored, already joined: {}", scope);
        }
        Ok(())
    }

    async fn leave_scope(&self, scope: &Scope) -> Result<()> {
        let mut joined = self.joined.lock();
        if !joined.remove(scope) {
            debug!("leave_scope ignored, not joined: {}", scope);
        }
        Ok(())
    }

    async fn send_typing(&self, scope: &Scope, typing: bool) -> Result<()> {
        self.typing_log.lock().push((scope.clone(), typing));
        Ok(())
    }
}
