//! 事件系统模块 - SDK 对外的统一事件出口
//!
//! 功能包括：
//! - 收件箱 / 消息列表变更事件
//! - 正在输入状态变更事件
//! - 作用域消失（应离开当前界面）事件
//! - 连接状态变更事件
//! - 用户操作失败事件
//! - 事件广播和订阅机制

use crate::connection_state::ConnectionStatus;
use crate::models::{Message, Scope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 状态更新来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateSource {
    /// 本地缓存（首屏）
    Cache,
    /// 网络刷新
    Network,
    /// 实时推送
    Push,
    /// 轮询回退
    Poll,
}

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SdkEvent {
    /// 收件箱（聚合会话列表）已更新
    InboxUpdated {
        source: UpdateSource,
        timestamp: i64,
    },
    /// 某个作用域的消息列表已更新
    MessagesUpdated {
        scope: Scope,
        source: UpdateSource,
        timestamp: i64,
    },
    /// 收到一条远端新消息（已通过去重）
    MessageReceived {
        scope: Scope,
        message: Message,
    },
    /// 某个作用域的正在输入用户集合变更
    TypingChanged {
        scope: Scope,
        user_ids: Vec<String>,
    },
    /// 作用域已在服务端消失（会话被删除 / 房间被解散），调用方应离开对应界面
    ScopeRemoved {
        scope: Scope,
        reason: String,
    },
    /// 连接状态变更
    ConnectionChanged {
        old_status: ConnectionStatus,
        new_status: ConnectionStatus,
        timestamp: i64,
    },
    /// 用户主动操作失败（发送 / 反馈 / 归档 / 退出等），应以临时提示方式呈现
    ActionFailed {
        action: String,
        scope: Option<Scope>,
        error: String,
        timestamp: i64,
    },
}

impl SdkEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SdkEvent::InboxUpdated { .. } => "inbox_updated",
            SdkEvent::MessagesUpdated { .. } => "messages_updated",
            SdkEvent::MessageReceived { .. } => "message_received",
            SdkEvent::TypingChanged { .. } => "typing_changed",
            SdkEvent::ScopeRemoved { .. } => "scope_removed",
            SdkEvent::ConnectionChanged { .. } => "connection_changed",
            SdkEvent::ActionFailed { .. } => "action_failed",
        }
    }

    /// 获取事件关联的作用域
    pub fn scope(&self) -> Option<Scope> {
        match self {
            SdkEvent::InboxUpdated { .. } => Some(Scope::Inbox),
            SdkEvent::MessagesUpdated { scope, .. } => Some(scope.clone()),
            SdkEvent::MessageReceived { scope, .. } => Some(scope.clone()),
            SdkEvent::TypingChanged { scope, .. } => Some(scope.clone()),
            SdkEvent::ScopeRemoved { scope, .. } => Some(scope.clone()),
            SdkEvent::ConnectionChanged { .. } => None,
            SdkEvent::ActionFailed { scope, .. } => scope.clone(),
        }
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SdkEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 监听器数量
    pub listener_count: usize,
}

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SdkEvent>,
    /// 事件监听器映射
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    /// 事件统计
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SdkEvent) {
        debug!("Emitting event: {}", event.event_type());

        // 更新统计
        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
        }

        // 广播事件（无订阅者时 send 会失败，属正常场景，仅打 debug）
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        // 调用监听器
        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }

        // 调用通用监听器
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }

    /// 添加事件监听器（`"*"` 匹配所有事件类型）
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SdkEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_type.to_string())
            .or_insert_with(Vec::new)
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    /// 移除所有监听器
    pub async fn clear_listeners(&self) {
        let mut listeners = self.listeners.write().await;
        listeners.clear();

        let mut stats = self.stats.write().await;
        stats.listener_count = 0;

        info!("Cleared all event listeners");
    }

    /// 获取事件统计
    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
