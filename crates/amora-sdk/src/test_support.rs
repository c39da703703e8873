//! 测试支撑 - 内存 REST 替身与数据构造器
//!
//! 同步引擎 / 轮询 / SDK 门面的测试共用：可注入失败、延迟、挂起与
//! 作用域消失，并统计并发在途请求数（验证轮询不堆叠请求）。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{AmoraSDKError, Result};
use crate::models::{
    Conversation, ConversationKind, Counterpart, LastMessage, Message, MessageType, Reaction,
    RoomSummary, Scope,
};
use crate::rest::RestApi;

/// 构造一条测试消息
pub fn message(id: &str, sender: &str, content: &str, ts: i64) -> Message {
    Message {
        id: id.to_string(),
        sender_id: sender.to_string(),
        content: content.to_string(),
        message_type: MessageType::Text,
        created_at: ts,
        reactions: Vec::new(),
        reply_to: None,
    }
}

/// 构造一个测试会话
pub fn conversation(id: &str, name: &str, last_content: &str, ts: i64) -> Conversation {
    Conversation {
        id: id.to_string(),
        kind: ConversationKind::Direct,
        counterpart: Counterpart {
            id: format!("user-{}", id),
            display_name: name.to_string(),
            avatar_url: None,
        },
        last_message: Some(LastMessage {
            id: format!("lm-{}", id),
            content: last_content.to_string(),
            sender_id: format!("user-{}", id),
            timestamp: ts,
            message_type: MessageType::Text,
            is_read: false,
        }),
        last_activity: None,
        is_pinned: false,
        is_archived: false,
        is_muted: false,
        is_request: false,
        unread_count: 0,
    }
}

/// 构造一个测试房间
pub fn room(id: &str, name: &str, ts: i64) -> RoomSummary {
    RoomSummary {
        id: id.to_string(),
        name: name.to_string(),
        avatar_url: None,
        member_count: 4,
        last_message: Some(LastMessage {
            id: format!("lm-{}", id),
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

/// 内存 REST 替身
pub struct FakeRestApi {
    /// 本地用户 ID（send_message 以此作为发送者）
    pub local_user_id: String,
    conversations: Mutex<Vec<Conversation>>,
    rooms: Mutex<Vec<RoomSummary>>,
    messages: Mutex<HashMap<Scope, Vec<Message>>>,
    gone_scopes: Mutex<HashSet<Scope>>,
    fail_all: AtomicBool,
    never_resolve: AtomicBool,
    response_delay: Mutex<Option<Duration>>,
    send_seq: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetch_count: AtomicUsize,
    invalidations: Mutex<Vec<String>>,
}

impl FakeRestApi {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            conversations: Mutex::new(Vec::new()),
            rooms: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            gone_scopes: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            never_resolve: AtomicBool::new(false),
            response_delay: Mutex::new(None),
            send_seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fetch_count: AtomicUsize::new(0),
            invalidations: Mutex::new(Vec::new()),
        }
    }

    // ---------- 服务端状态注入 ----------

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *self.conversations.lock() = conversations;
    }

    pub fn set_rooms(&self, rooms: Vec<RoomSummary>) {
        *self.rooms.lock() = rooms;
    }

    pub fn set_messages(&self, scope: Scope, messages: Vec<Message>) {
        self.messages.lock().insert(scope, messages);
    }

    /// 在服务端"另一个客户端"追加一条消息
    pub fn server_append_message(&self, scope: Scope, message: Message) {
        self.messages.lock().entry(scope).or_default().push(message);
    }

    pub fn set_scope_gone(&self, scope: Scope) {
        self.gone_scopes.lock().insert(scope);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// 所有请求永不返回（验证缓存优先）
    pub fn set_never_resolve(&self, pending: bool) {
        self.never_resolve.store(pending, Ordering::SeqCst);
    }

    /// 每个请求附加固定延迟（验证轮询不堆叠）
    pub fn set_response_delay(&self, delay: Option<Duration>) {
        *self.response_delay.lock() = delay;
    }

    // ---------- 观测 ----------

    /// 历史最大并发在途请求数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 总拉取次数（list / get_messages）
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> Vec<String> {
        self.invalidations.lock().clone()
    }

    // ---------- 内部 ----------

    fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// 公共前置：挂起 / 延迟 / 失败注入
    async fn gate(&self) -> Result<()> {
        if self.never_resolve.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.response_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AmoraSDKError::Transport("fake: 注入的网络失败".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RestApi for FakeRestApi {
    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<Conversation>> {
        self.enter();
        let result = async {
            self.gate().await?;
            let conversations = self.conversations.lock().clone();
            Ok(if include_archived {
                conversations
            } else {
                conversations.into_iter().filter(|c| !c.is_archived).collect()
            })
        }
        .await;
        self.exit();
        result
    }

    async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        self.enter();
        let result = async {
            self.gate().await?;
            Ok(self.rooms.lock().clone())
        }
        .await;
        self.exit();
        result
    }

    async fn get_or_create_conversation(&self, other_user_id: &str) -> Result<Conversation> {
        self.gate().await?;
        let id = format!("conv-with-{}", other_user_id);
        let existing = self.conversations.lock().iter().find(|c| c.id == id).cloned();
        match existing {
            Some(conversation) => Ok(conversation),
            None => {
                let created = conversation(&id, other_user_id, "", 0);
                self.conversations.lock().push(created.clone());
                Ok(created)
            }
        }
    }

    async fn get_messages(&self, scope: &Scope) -> Result<Vec<Message>> {
        self.enter();
        let result = async {
            self.gate().await?;
            if self.gone_scopes.lock().contains(scope) {
                return Err(AmoraSDKError::ScopeGone("fake: scope gone".to_string()));
            }
            Ok(self.messages.lock().get(scope).cloned().unwrap_or_default())
        }
        .await;
        self.exit();
        result
    }

    async fn send_message(&self, scope: &Scope, content: &str) -> Result<Message> {
        self.gate().await?;
        if self.gone_scopes.lock().contains(scope) {
            return Err(AmoraSDKError::ScopeGone("fake: scope gone".to_string()));
        }
        let seq = self.send_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let confirmed = message(
            &format!("srv-{}", seq),
            &self.local_user_id,
            content,
            chrono::Utc::now().timestamp_millis(),
        );
        self.messages
            .lock()
            .entry(scope.clone())
            .or_default()
            .push(confirmed.clone());
        Ok(confirmed)
    }

    async fn react_to_message(&self, message_id: &str, emoji: &str) -> Result<Message> {
        self.gate().await?;
        let mut messages = self.messages.lock();
        for list in messages.values_mut() {
            if let Some(msg) = list.iter_mut().find(|m| m.id == message_id) {
                msg.reactions.push(Reaction {
                    user_id: self.local_user_id.clone(),
                    emoji: emoji.to_string(),
                });
                return Ok(msg.clone());
            }
        }
        Err(AmoraSDKError::NotFound(format!("消息不存在: {}", message_id)))
    }

    async fn set_archived(&self, scope: &Scope, archived: bool) -> Result<()> {
        self.gate().await?;
        match scope {
            Scope::Direct(id) => {
                if let Some(c) = self.conversations.lock().iter_mut().find(|c| c.id == *id) {
                    c.is_archived = archived;
                }
            }
            Scope::Room(id) => {
                if let Some(r) = self.rooms.lock().iter_mut().find(|r| r.id == *id) {
                    r.is_archived = archived;
                }
            }
            Scope::Inbox => {
                return Err(AmoraSDKError::InvalidArgument("聚合列表不能归档".to_string()))
            }
        }
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<()> {
        self.gate().await?;
        self.rooms.lock().retain(|r| r.id != room_id);
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.gate().await?;
        self.conversations.lock().retain(|c| c.id != conversation_id);
        Ok(())
    }

    fn invalidate(&self, name: &str) {
        self.invalidations.lock().push(name.to_string());
    }
}
