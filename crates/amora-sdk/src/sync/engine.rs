//! 同步引擎
//!
//! 职责：
//! - 作用域激活：先同步发布缓存快照（首屏），并发发起网络刷新，成功后整体覆盖
//! - 推送事件调和：新增按身份去重、更新原地替换、删除移除或通知离开界面
//! - 消息列表在任何插入后保持按创建时间升序
//! - 激活代的取消令牌保证已卸载作用域的迟到响应被丢弃
//!
//! 失败语义：后台刷新的网络错误被本地吞掉（缓存获胜）；指向未激活作用域的
//! 推送被忽略；本地用户自己发出的消息推送被忽略（发送响应路径已经入列）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{EventManager, SdkEvent, UpdateSource};
use crate::models::{Conversation, LastActivity, LastMessage, Message, RoomSummary, Scope};
use crate::realtime::RealtimeEvent;
use crate::rest::RestApi;
use crate::storage::CacheStore;
use crate::sync::{DeduplicationManager, SyncState};

/// 聚合列表的缓存快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxSnapshot {
    pub conversations: Vec<Conversation>,
    pub rooms: Vec<RoomSummary>,
}

/// 作用域的内存状态
#[derive(Debug, Clone)]
pub enum ScopeState {
    /// 聚合会话列表
    Inbox {
        conversations: Vec<Conversation>,
        rooms: Vec<RoomSummary>,
    },
    /// 单个会话 / 房间的消息列表（按创建时间升序）
    Messages(Vec<Message>),
}

/// 活跃作用域（一次激活 = 一代）
struct ActiveScope {
    state: RwLock<ScopeState>,
    sync_state: RwLock<SyncState>,
    /// 首屏是否仍在加载（缓存命中或网络返回后置 false）
    loading: AtomicBool,
    /// 是否已向外发布过任何状态（决定失败时是否静默）
    has_published: AtomicBool,
    /// 激活代取消令牌：deactivate 后迟到的响应 / 事件全部丢弃
    token: CancellationToken,
    /// 刷新单飞锁：上一次请求未返回时新的轮询 tick 是 no-op
    refresh_lock: Mutex<()>,
}

impl ActiveScope {
    fn new(scope: &Scope) -> Self {
        let state = match scope {
            Scope::Inbox => ScopeState::Inbox {
                conversations: Vec::new(),
                rooms: Vec::new(),
            },
            _ => ScopeState::Messages(Vec::new()),
        };
        Self {
            state: RwLock::new(state),
            sync_state: RwLock::new(SyncState::Loading),
            loading: AtomicBool::new(true),
            has_published: AtomicBool::new(false),
            token: CancellationToken::new(),
            refresh_lock: Mutex::new(()),
        }
    }
}

/// 同步引擎
pub struct SyncEngine {
    /// REST 访问层
    rest: Arc<dyn RestApi>,

    /// 快照缓存
    cache: Arc<CacheStore>,

    /// 事件出口
    events: Arc<EventManager>,

    /// 本地用户 ID（用于忽略自己消息的推送回声）
    local_user_id: String,

    /// 活跃作用域表
    scopes: RwLock<HashMap<Scope, Arc<ActiveScope>>>,

    /// 消息去重
    dedup: DeduplicationManager,
}

impl SyncEngine {
    /// 创建同步引擎
    pub fn new(
        rest: Arc<dyn RestApi>,
        cache: Arc<CacheStore>,
        events: Arc<EventManager>,
        local_user_id: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            cache,
            events,
            local_user_id: local_user_id.into(),
            scopes: RwLock::new(HashMap::new()),
            dedup: DeduplicationManager::new(),
        }
    }

    // ============================================================
    // 激活 / 停用
    // ============================================================

    /// 激活作用域：同步发布缓存（若有），并发发起网络刷新后立即返回
    pub async fn activate(self: &Arc<Self>, scope: &Scope) {
        let active = Arc::new(ActiveScope::new(scope));
        {
            let mut scopes = self.scopes.write().await;
            if let Some(old) = scopes.insert(scope.clone(), active.clone()) {
                // 重复激活：旧的一代作废
                old.token.cancel();
            }
        }

        info!("激活作用域: {}", scope);

        // 1. 缓存优先：命中则立即发布，首屏不等网络
        self.publish_from_cache(scope, &active).await;

        // 2. 并发网络刷新（激活立即返回）
        let engine = self.clone();
        let scope = scope.clone();
        tokio::spawn(async move {
            engine.refresh(&scope, UpdateSource::Network).await;
        });
    }

    /// 停用作用域：取消激活代，此后该作用域的迟到响应 / 推送全部丢弃
    pub async fn deactivate(&self, scope: &Scope) {
        let removed = {
            let mut scopes = self.scopes.write().await;
            scopes.remove(scope)
        };
        if let Some(active) = removed {
            active.token.cancel();
            info!("停用作用域: {}", scope);
        }
    }

    /// 停用全部作用域（SDK 关闭）
    pub async fn deactivate_all(&self) {
        let mut scopes = self.scopes.write().await;
        for (_, active) in scopes.drain() {
            active.token.cancel();
        }
    }

    /// 作用域是否处于活跃状态
    pub async fn is_active(&self, scope: &Scope) -> bool {
        self.scopes.read().await.contains_key(scope)
    }

    async fn get_active(&self, scope: &Scope) -> Option<Arc<ActiveScope>> {
        self.scopes.read().await.get(scope).cloned()
    }

    /// 从缓存发布首屏状态
    async fn publish_from_cache(&self, scope: &Scope, active: &Arc<ActiveScope>) {
        match scope {
            Scope::Inbox => {
                if let Some(entry) = self.cache.read::<InboxSnapshot>(scope).await {
                    {
                        let mut state = active.state.write().await;
                        *state = ScopeState::Inbox {
                            conversations: entry.data.conversations,
                            rooms: entry.data.rooms,
                        };
                    }
                    active.loading.store(false, Ordering::SeqCst);
                    active.has_published.store(true, Ordering::SeqCst);
                    self.events
                        .emit(SdkEvent::InboxUpdated {
                            source: UpdateSource::Cache,
                            timestamp: now_ms(),
                        })
                        .await;
                }
            }
            _ => {
                if let Some(entry) = self.cache.read::<Vec<Message>>(scope).await {
                    let mut messages = entry.data;
                    messages.sort_by_key(|m| m.created_at);
                    {
                        let mut state = active.state.write().await;
                        *state = ScopeState::Messages(messages);
                    }
                    active.loading.store(false, Ordering::SeqCst);
                    active.has_published.store(true, Ordering::SeqCst);
                    self.events
                        .emit(SdkEvent::MessagesUpdated {
                            scope: scope.clone(),
                            source: UpdateSource::Cache,
                            timestamp: now_ms(),
                        })
                        .await;
                }
            }
        }
    }

    // ============================================================
    // 网络刷新
    // ============================================================

    /// 执行一次网络刷新（整体覆盖内存状态与缓存）
    ///
    /// 上一次刷新未返回时本次调用是 no-op（轮询不堆叠请求）；
    /// 激活代被取消后返回的响应被丢弃。
    pub async fn refresh(&self, scope: &Scope, source: UpdateSource) {
        let active = match self.get_active(scope).await {
            Some(active) => active,
            None => return,
        };

        // 单飞：已有请求在途则放弃本次 tick
        let _guard = match active.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Refresh already in flight for {}, tick is a no-op", scope);
                return;
            }
        };

        match scope {
            Scope::Inbox => self.refresh_inbox(&active, source).await,
            _ => self.refresh_messages(scope, &active, source).await,
        }
    }

    async fn refresh_inbox(&self, active: &Arc<ActiveScope>, source: UpdateSource) {
        let conversations = self.rest.list_conversations(true).await;
        let rooms = self.rest.list_rooms().await;

        if active.token.is_cancelled() {
            debug!("Discarding late inbox response for deactivated scope");
            return;
        }

        match (conversations, rooms) {
            (Ok(conversations), Ok(rooms)) => {
                {
                    let mut state = active.state.write().await;
                    *state = ScopeState::Inbox {
                        conversations: conversations.clone(),
                        rooms: rooms.clone(),
                    };
                }
                active.loading.store(false, Ordering::SeqCst);
                active.has_published.store(true, Ordering::SeqCst);
                *active.sync_state.write().await = SyncState::Synced;

                self.cache
                    .write(&Scope::Inbox, &InboxSnapshot { conversations, rooms })
                    .await;

                self.events
                    .emit(SdkEvent::InboxUpdated {
                        source,
                        timestamp: now_ms(),
                    })
                    .await;
            }
            (Err(e), _) | (_, Err(e)) => {
                self.handle_refresh_failure(&Scope::Inbox, active, e, source).await;
            }
        }
    }

    async fn refresh_messages(&self, scope: &Scope, active: &Arc<ActiveScope>, source: UpdateSource) {
        match self.rest.get_messages(scope).await {
            Ok(mut messages) => {
                if active.token.is_cancelled() {
                    debug!("Discarding late message response for deactivated scope {}", scope);
                    return;
                }

                messages.sort_by_key(|m| m.created_at);
                // 服务端确认过的消息全部进入去重集合，后续推送回声直接丢弃
                for message in &messages {
                    self.dedup.mark_processed(&message.id);
                }
                {
                    let mut state = active.state.write().await;
                    *state = ScopeState::Messages(messages.clone());
                }
                active.loading.store(false, Ordering::SeqCst);
                active.has_published.store(true, Ordering::SeqCst);
                *active.sync_state.write().await = SyncState::Synced;

                // 本地未确认消息不写缓存（待上传状态，刷新后整体替换）
                let persistable: Vec<Message> = messages
                    .into_iter()
                    .filter(|m| !m.is_local_only())
                    .collect();
                self.cache.write(scope, &persistable).await;

                self.events
                    .emit(SdkEvent::MessagesUpdated {
                        scope: scope.clone(),
                        source,
                        timestamp: now_ms(),
                    })
                    .await;
            }
            Err(e) => {
                self.handle_refresh_failure(scope, active, e, source).await;
            }
        }
    }

    /// 刷新失败处理：缓存获胜则静默，无缓存则发布空态；作用域消失则通知离开
    async fn handle_refresh_failure(
        &self,
        scope: &Scope,
        active: &Arc<ActiveScope>,
        error: crate::error::AmoraSDKError,
        source: UpdateSource,
    ) {
        if active.token.is_cancelled() {
            return;
        }

        if error.is_scope_gone() {
            info!("作用域已在服务端消失: {} ({})", scope, error);
            self.remove_scope(scope, &error.to_string()).await;
            return;
        }

        if active.has_published.load(Ordering::SeqCst) {
            // 已有可展示内容（缓存或上一次刷新），后台失败静默吞掉
            warn!("后台刷新失败（继续展示现有内容）: scope={}, error={}", scope, error);
            *active.sync_state.write().await = SyncState::Failed {
                error: error.to_string(),
            };
            return;
        }

        // 无缓存的首次加载失败：发布空态，结束 loading
        warn!("首次加载失败（发布空态）: scope={}, error={}", scope, error);
        active.loading.store(false, Ordering::SeqCst);
        active.has_published.store(true, Ordering::SeqCst);
        *active.sync_state.write().await = SyncState::Failed {
            error: error.to_string(),
        };

        match scope {
            Scope::Inbox => {
                self.events
                    .emit(SdkEvent::InboxUpdated {
                        source,
                        timestamp: now_ms(),
                    })
                    .await;
            }
            _ => {
                self.events
                    .emit(SdkEvent::MessagesUpdated {
                        scope: scope.clone(),
                        source,
                        timestamp: now_ms(),
                    })
                    .await;
            }
        }
    }

    // ============================================================
    // 推送事件调和
    // ============================================================

    /// 将一条实时推送事件并入内存状态
    ///
    /// typing 类事件不在此处理（TypingCoordinator 负责）。
    pub async fn handle_event(self: &Arc<Self>, event: RealtimeEvent) {
        match event {
            RealtimeEvent::MessageNew {
                conversation_id,
                message,
            } => {
                self.apply_new_message(Scope::Direct(conversation_id), message)
                    .await;
            }
            RealtimeEvent::RoomMessageNew { room_id, message } => {
                self.apply_new_message(Scope::Room(room_id), message).await;
            }
            RealtimeEvent::MessageReaction {
                conversation_id,
                message,
            } => {
                self.apply_message_update(Scope::Direct(conversation_id), message)
                    .await;
            }
            RealtimeEvent::ConversationUpdated { conversation } => {
                self.apply_conversation_update(conversation).await;
            }
            RealtimeEvent::RoomUpdated { room } => {
                self.apply_room_update(room).await;
            }
            RealtimeEvent::RoomThemeChanged { room_id, activity } => {
                self.apply_room_activity(&room_id, activity).await;
            }
            RealtimeEvent::RoomDeleted { room_id } => {
                self.remove_scope(&Scope::Room(room_id), "房间已被解散").await;
            }
            RealtimeEvent::RoomMemberLeft { room_id, user_id } => {
                if user_id == self.local_user_id {
                    // 本端（其他设备）退出了房间
                    self.remove_scope(&Scope::Room(room_id), "已退出房间").await;
                } else {
                    self.apply_member_left(&room_id).await;
                }
            }
            RealtimeEvent::RoomAdminChanged { room_id, .. } => {
                // 管理员变更影响房间元数据，按名称失效后重新拉取
                debug!("Room admin changed in {}, invalidating rooms/my", room_id);
                self.rest.invalidate("rooms/my");
                if self.is_active(&Scope::Inbox).await {
                    let engine = self.clone();
                    tokio::spawn(async move {
                        engine.refresh(&Scope::Inbox, UpdateSource::Push).await;
                    });
                }
            }
            // typing 事件由 TypingCoordinator 消费
            RealtimeEvent::TypingStart { .. }
            | RealtimeEvent::TypingStop { .. }
            | RealtimeEvent::RoomTypingStart { .. }
            | RealtimeEvent::RoomTypingStop { .. } => {}
        }
    }

    /// 新消息推送：按身份去重后追加，并保持升序
    async fn apply_new_message(&self, scope: Scope, message: Message) {
        // 本地用户自己的消息：发送响应路径已经入列，忽略推送回声
        if message.sender_id == self.local_user_id {
            debug!("Ignoring push echo of own message {}", message.id);
            return;
        }

        if self.dedup.is_duplicate(&message.id) {
            return;
        }
        // 先标记再应用：同一身份的推送只会被处理一次（含预览 / 未读数更新）
        self.dedup.mark_processed(&message.id);

        let applied = if let Some(active) = self.get_active(&scope).await {
            let mut state = active.state.write().await;
            match &mut *state {
                ScopeState::Messages(messages) => {
                    if messages.iter().any(|m| m.id == message.id) {
                        false
                    } else {
                        messages.push(message.clone());
                        messages.sort_by_key(|m| m.created_at);
                        true
                    }
                }
                _ => false,
            }
        } else {
            // 指向未激活作用域的推送忽略（聚合列表的预览仍会更新）
            debug!("Push for inactive scope {} ignored", scope);
            false
        };

        if applied {
            self.events
                .emit(SdkEvent::MessageReceived {
                    scope: scope.clone(),
                    message: message.clone(),
                })
                .await;
            self.events
                .emit(SdkEvent::MessagesUpdated {
                    scope: scope.clone(),
                    source: UpdateSource::Push,
                    timestamp: now_ms(),
                })
                .await;
        }

        // 聚合列表激活时同步更新对应条目的预览
        self.update_inbox_preview(&scope, &message, !applied).await;
    }

    /// 消息更新推送（表情反馈 / 编辑）：按身份原地替换
    async fn apply_message_update(&self, scope: Scope, message: Message) {
        let replaced = if let Some(active) = self.get_active(&scope).await {
            let mut state = active.state.write().await;
            match &mut *state {
                ScopeState::Messages(messages) => {
                    match messages.iter_mut().find(|m| m.id == message.id) {
                        Some(slot) => {
                            *slot = message;
                            true
                        }
                        None => false,
                    }
                }
                _ => false,
            }
        } else {
            false
        };

        if replaced {
            self.events
                .emit(SdkEvent::MessagesUpdated {
                    scope,
                    source: UpdateSource::Push,
                    timestamp: now_ms(),
                })
                .await;
        }
    }

    /// 会话元数据更新推送：聚合列表中按身份替换（不存在则追加）
    async fn apply_conversation_update(&self, conversation: Conversation) {
        let Some(active) = self.get_active(&Scope::Inbox).await else {
            return;
        };
        {
            let mut state = active.state.write().await;
            if let ScopeState::Inbox { conversations, .. } = &mut *state {
                match conversations.iter_mut().find(|c| c.id == conversation.id) {
                    Some(slot) => *slot = conversation,
                    None => conversations.push(conversation),
                }
            }
        }
        self.events
            .emit(SdkEvent::InboxUpdated {
                source: UpdateSource::Push,
                timestamp: now_ms(),
            })
            .await;
    }

    /// 房间元数据更新推送
    async fn apply_room_update(&self, room: RoomSummary) {
        let Some(active) = self.get_active(&Scope::Inbox).await else {
            return;
        };
        {
            let mut state = active.state.write().await;
            if let ScopeState::Inbox { rooms, .. } = &mut *state {
                match rooms.iter_mut().find(|r| r.id == room.id) {
                    Some(slot) => *slot = room,
                    None => rooms.push(room),
                }
            }
        }
        self.events
            .emit(SdkEvent::InboxUpdated {
                source: UpdateSource::Push,
                timestamp: now_ms(),
            })
            .await;
    }

    /// 房间主题变更：更新聚合列表条目的最近动态
    async fn apply_room_activity(&self, room_id: &str, activity: LastActivity) {
        let Some(active) = self.get_active(&Scope::Inbox).await else {
            return;
        };
        let changed = {
            let mut state = active.state.write().await;
            if let ScopeState::Inbox { rooms, .. } = &mut *state {
                match rooms.iter_mut().find(|r| r.id == room_id) {
                    Some(room) => {
                        room.last_activity = Some(activity);
                        true
                    }
                    None => false,
                }
            } else {
                false
            }
        };
        if changed {
            self.events
                .emit(SdkEvent::InboxUpdated {
                    source: UpdateSource::Push,
                    timestamp: now_ms(),
                })
                .await;
        }
    }

    /// 其他成员离开房间：更新成员数
    async fn apply_member_left(&self, room_id: &str) {
        let Some(active) = self.get_active(&Scope::Inbox).await else {
            return;
        };
        let changed = {
            let mut state = active.state.write().await;
            if let ScopeState::Inbox { rooms, .. } = &mut *state {
                match rooms.iter_mut().find(|r| r.id == room_id) {
                    Some(room) => {
                        room.member_count = room.member_count.saturating_sub(1);
                        true
                    }
                    None => false,
                }
            } else {
                false
            }
        };
        if changed {
            self.events
                .emit(SdkEvent::InboxUpdated {
                    source: UpdateSource::Push,
                    timestamp: now_ms(),
                })
                .await;
        }
    }

    /// 作用域在服务端消失：从聚合列表移除、停用作用域、清缓存、通知离开界面
    async fn remove_scope(&self, scope: &Scope, reason: &str) {
        // 从聚合列表移除对应条目
        if let Some(inbox) = self.get_active(&Scope::Inbox).await {
            let mut state = inbox.state.write().await;
            if let ScopeState::Inbox {
                conversations,
                rooms,
            } = &mut *state
            {
                match scope {
                    Scope::Direct(id) => conversations.retain(|c| c.id != *id),
                    Scope::Room(id) => rooms.retain(|r| r.id != *id),
                    Scope::Inbox => {}
                }
            }
            drop(state);
            self.events
                .emit(SdkEvent::InboxUpdated {
                    source: UpdateSource::Push,
                    timestamp: now_ms(),
                })
                .await;
        }

        let was_active = self.is_active(scope).await;
        self.deactivate(scope).await;
        self.cache.remove(scope).await;

        if was_active {
            self.events
                .emit(SdkEvent::ScopeRemoved {
                    scope: scope.clone(),
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    /// 聚合列表激活时更新对应条目的预览（unread_only 表示消息没进开着的列表）
    async fn update_inbox_preview(&self, scope: &Scope, message: &Message, unread: bool) {
        let Some(active) = self.get_active(&Scope::Inbox).await else {
            return;
        };
        let changed = {
            let mut state = active.state.write().await;
            let last_message = LastMessage {
                id: message.id.clone(),
                content: message.content.clone(),
                sender_id: message.sender_id.clone(),
                timestamp: message.created_at,
                message_type: message.message_type,
                is_read: !unread,
            };
            match (&mut *state, scope) {
                (ScopeState::Inbox { conversations, .. }, Scope::Direct(id)) => {
                    match conversations.iter_mut().find(|c| c.id == *id) {
                        Some(conversation) => {
                            conversation.last_message = Some(last_message);
                            if unread {
                                conversation.unread_count += 1;
                            }
                            true
                        }
                        None => false,
                    }
                }
                (ScopeState::Inbox { rooms, .. }, Scope::Room(id)) => {
                    match rooms.iter_mut().find(|r| r.id == *id) {
                        Some(room) => {
                            room.last_message = Some(last_message);
                            if unread {
                                room.unread_count += 1;
                            }
                            true
                        }
                        None => false,
                    }
                }
                _ => false,
            }
        };
        if changed {
            self.events
                .emit(SdkEvent::InboxUpdated {
                    source: UpdateSource::Push,
                    timestamp: now_ms(),
                })
                .await;
        }
    }

    // ============================================================
    // 用户操作
    // ============================================================

    /// 发送消息：服务端确认后入列（推送回声通过去重抑制）
    pub async fn send_message(&self, scope: &Scope, content: &str) -> Result<Message> {
        match self.rest.send_message(scope, content).await {
            Ok(message) => {
                // 确认的 ID 先进去重集合：稍后到达的推送回声被丢弃
                self.dedup.mark_processed(&message.id);

                if let Some(active) = self.get_active(scope).await {
                    let mut state = active.state.write().await;
                    if let ScopeState::Messages(messages) = &mut *state {
                        if !messages.iter().any(|m| m.id == message.id) {
                            messages.push(message.clone());
                            messages.sort_by_key(|m| m.created_at);
                        }
                    }
                    drop(state);
                    self.events
                        .emit(SdkEvent::MessagesUpdated {
                            scope: scope.clone(),
                            source: UpdateSource::Network,
                            timestamp: now_ms(),
                        })
                        .await;
                }

                self.update_inbox_preview(scope, &message, false).await;
                Ok(message)
            }
            Err(e) => {
                self.emit_action_failed("send_message", Some(scope.clone()), &e)
                    .await;
                Err(e)
            }
        }
    }

    /// 表情反馈：服务端返回合并后的消息，原地替换
    pub async fn react_to_message(
        &self,
        scope: &Scope,
        message_id: &str,
        emoji: &str,
    ) -> Result<Message> {
        match self.rest.react_to_message(message_id, emoji).await {
            Ok(message) => {
                self.apply_message_update(scope.clone(), message.clone()).await;
                Ok(message)
            }
            Err(e) => {
                self.emit_action_failed("react_to_message", Some(scope.clone()), &e)
                    .await;
                Err(e)
            }
        }
    }

    /// 设置归档状态
    pub async fn set_archived(&self, scope: &Scope, archived: bool) -> Result<()> {
        match self.rest.set_archived(scope, archived).await {
            Ok(()) => {
                if let Some(active) = self.get_active(&Scope::Inbox).await {
                    let mut state = active.state.write().await;
                    if let ScopeState::Inbox {
                        conversations,
                        rooms,
                    } = &mut *state
                    {
                        match scope {
                            Scope::Direct(id) => {
                                if let Some(c) = conversations.iter_mut().find(|c| c.id == *id) {
                                    c.is_archived = archived;
                                }
                            }
                            Scope::Room(id) => {
                                if let Some(r) = rooms.iter_mut().find(|r| r.id == *id) {
                                    r.is_archived = archived;
                                }
                            }
                            Scope::Inbox => {}
                        }
                    }
                    drop(state);
                    self.events
                        .emit(SdkEvent::InboxUpdated {
                            source: UpdateSource::Network,
                            timestamp: now_ms(),
                        })
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                self.emit_action_failed("set_archived", Some(scope.clone()), &e)
                    .await;
                Err(e)
            }
        }
    }

    /// 退出房间
    pub async fn leave_room(&self, room_id: &str) -> Result<()> {
        match self.rest.leave_room(room_id).await {
            Ok(()) => {
                self.remove_scope(&Scope::Room(room_id.to_string()), "已退出房间")
                    .await;
                Ok(())
            }
            Err(e) => {
                self.emit_action_failed(
                    "leave_room",
                    Some(Scope::Room(room_id.to_string())),
                    &e,
                )
                .await;
                Err(e)
            }
        }
    }

    /// 删除单聊会话
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        match self.rest.delete_conversation(conversation_id).await {
            Ok(()) => {
                self.remove_scope(
                    &Scope::Direct(conversation_id.to_string()),
                    "会话已删除",
                )
                .await;
                Ok(())
            }
            Err(e) => {
                self.emit_action_failed(
                    "delete_conversation",
                    Some(Scope::Direct(conversation_id.to_string())),
                    &e,
                )
                .await;
                Err(e)
            }
        }
    }

    async fn emit_action_failed(
        &self,
        action: &str,
        scope: Option<Scope>,
        error: &crate::error::AmoraSDKError,
    ) {
        warn!("用户操作失败: action={}, error={}", action, error);
        self.events
            .emit(SdkEvent::ActionFailed {
                action: action.to_string(),
                scope,
                error: error.to_string(),
                timestamp: now_ms(),
            })
            .await;
    }

    // ============================================================
    // 状态读取
    // ============================================================

    /// 某个作用域当前的消息列表（未激活返回 None）
    pub async fn messages(&self, scope: &Scope) -> Option<Vec<Message>> {
        let active = self.get_active(scope).await?;
        let state = active.state.read().await;
        match &*state {
            ScopeState::Messages(messages) => Some(messages.clone()),
            _ => None,
        }
    }

    /// 聚合列表当前的会话与房间（未激活返回 None）
    pub async fn inbox_parts(&self) -> Option<(Vec<Conversation>, Vec<RoomSummary>)> {
        let active = self.get_active(&Scope::Inbox).await?;
        let state = active.state.read().await;
        match &*state {
            ScopeState::Inbox {
                conversations,
                rooms,
            } => Some((conversations.clone(), rooms.clone())),
            _ => None,
        }
    }

    /// 首屏是否仍在加载
    pub async fn is_loading(&self, scope: &Scope) -> bool {
        match self.get_active(scope).await {
            Some(active) => active.loading.load(Ordering::SeqCst),
            None => false,
        }
    }

    /// 作用域当前的同步状态
    pub async fn sync_state(&self, scope: &Scope) -> Option<SyncState> {
        let active = self.get_active(scope).await?;
        let state = active.sync_state.read().await.clone();
        Some(state)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
