//! 统一 SDK 接口 - AmoraSDK 主入口
//!
//! 分层架构设计：
//! ```text
//! AmoraSDK (门面层)
//!   ├── SyncEngine (同步调和层)
//!   ├── PollingFallback (轮询回退层)
//!   ├── TypingCoordinator (输入状态层)
//!   ├── RealtimeChannel (实时通道抽象)
//!   ├── RestApi (REST 访问层)
//!   ├── CacheStore / KvStore (存储层)
//!   └── EventManager (事件系统层)
//! ```
//!
//! 设计原则：
//! - 异步优先：主要 API 使用 async/await
//! - 依赖注入：REST 与实时通道都是 trait，测试可替换
//! - 事件驱动：统一的事件出口，UI 只消费 SdkEvent
//! - 生命周期明确：open/close 成对出现，关闭时回收全部定时器与订阅

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection_state::ConnectionStatus;
use crate::error::{AmoraSDKError, Result};
use crate::events::{EventManager, SdkEvent};
use crate::models::{Conversation, Message, Scope};
use crate::projector::{ConversationListProjector, InboxFilter};
use crate::realtime::{RealtimeChannel, RealtimeEvent};
use crate::rest::RestApi;
use crate::storage::{cache_keys, CacheStore, KvStore};
use crate::sync::{PollingConfig, PollingFallback, SyncEngine};
use crate::typing::{TypingConfig, TypingCoordinator};

/// SDK 配置
#[derive(Debug, Clone)]
pub struct AmoraConfig {
    /// 数据目录（KV / 缓存落盘位置）
    pub data_dir: PathBuf,
    /// 本地用户 ID
    pub user_id: String,
    /// 输入状态配置
    pub typing: TypingConfig,
    /// 轮询配置
    pub polling: PollingConfig,
    /// 事件通道容量
    pub event_capacity: usize,
}

impl AmoraConfig {
    /// 创建配置构建器
    pub fn builder() -> AmoraConfigBuilder {
        AmoraConfigBuilder::default()
    }
}

/// SDK 配置构建器
#[derive(Debug, Default)]
pub struct AmoraConfigBuilder {
    data_dir: Option<PathBuf>,
    user_id: Option<String>,
    typing: Option<TypingConfig>,
    polling: Option<PollingConfig>,
    event_capacity: Option<usize>,
}

impl AmoraConfigBuilder {
    /// 设置数据目录
    pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// 设置本地用户 ID
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 自定义输入状态配置
    pub fn typing(mut self, typing: TypingConfig) -> Self {
        self.typing = Some(typing);
        self
    }

    /// 自定义轮询配置
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// 自定义事件通道容量
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// 构建配置
    pub fn build(self) -> Result<AmoraConfig> {
        let data_dir = self
            .data_dir
            .ok_or_else(|| AmoraSDKError::Config("缺少 data_dir".to_string()))?;
        let user_id = self
            .user_id
            .ok_or_else(|| AmoraSDKError::Config("缺少 user_id".to_string()))?;
        Ok(AmoraConfig {
            data_dir,
            user_id,
            typing: self.typing.unwrap_or_default(),
            polling: self.polling.unwrap_or_default(),
            event_capacity: self.event_capacity.unwrap_or(256),
        })
    }
}

/// Amora SDK 主入口
pub struct AmoraSDK {
    config: AmoraConfig,
    kv: Arc<KvStore>,
    events: Arc<EventManager>,
    rest: Arc<dyn RestApi>,
    channel: Arc<dyn RealtimeChannel>,
    typing: Arc<TypingCoordinator>,
    engine: Arc<SyncEngine>,
    polling: Arc<PollingFallback>,
    projector: ConversationListProjector,
    /// 后台任务（事件泵 / 连接观察者）
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl AmoraSDK {
    /// 初始化 SDK
    ///
    /// REST 与实时通道通过依赖注入传入（生产环境用 `HttpRestApi` 与
    /// socket 实现，测试用内存替身）。
    pub async fn initialize(
        config: AmoraConfig,
        rest: Arc<dyn RestApi>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> Result<Arc<Self>> {
        // 1. 存储层
        let kv = Arc::new(KvStore::new(&config.data_dir).await?);
        kv.switch_user(&config.user_id).await?;
        let cache = Arc::new(CacheStore::new(kv.clone()));

        // 2. 事件系统
        let events = Arc::new(EventManager::new(config.event_capacity));

        // 3. 同步核心
        let engine = Arc::new(SyncEngine::new(
            rest.clone(),
            cache,
            events.clone(),
            &config.user_id,
        ));
        let typing = Arc::new(TypingCoordinator::new(
            channel.clone(),
            events.clone(),
            config.typing.clone(),
        ));
        let polling = Arc::new(PollingFallback::new(
            engine.clone(),
            channel.clone(),
            config.polling.clone(),
        ));
        let projector = ConversationListProjector::new(&config.user_id);

        let sdk = Arc::new(Self {
            config,
            kv,
            events,
            rest,
            channel,
            typing,
            engine,
            polling,
            projector,
            tasks: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        });

        // 4. 后台任务
        sdk.spawn_event_pump();
        sdk.spawn_connection_watcher();

        info!(
            "🚀 Amora SDK 初始化完成: user={}, version={}",
            sdk.config.user_id,
            crate::version::SDK_VERSION
        );

        Ok(sdk)
    }

    /// 事件泵：把实时推送分发给同步引擎与输入状态协调器
    fn spawn_event_pump(self: &Arc<Self>) {
        let engine = self.engine.clone();
        let typing = self.typing.clone();
        let mut rx = self.channel.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match event {
                        RealtimeEvent::TypingStart {
                            conversation_id,
                            user_id,
                        } => {
                            typing
                                .handle_remote_start(&Scope::Direct(conversation_id), &user_id)
                                .await;
                        }
                        RealtimeEvent::TypingStop {
                            conversation_id,
                            user_id,
                        } => {
                            typing
                                .handle_remote_stop(&Scope::Direct(conversation_id), &user_id)
                                .await;
                        }
                        RealtimeEvent::RoomTypingStart { room_id, user_id } => {
                            typing
                                .handle_remote_start(&Scope::Room(room_id), &user_id)
                                .await;
                        }
                        RealtimeEvent::RoomTypingStop { room_id, user_id } => {
                            typing
                                .handle_remote_stop(&Scope::Room(room_id), &user_id)
                                .await;
                        }
                        other => engine.handle_event(other).await,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("事件消费滞后，丢弃 {} 条推送", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// 连接观察者：把连接状态变更转发给事件出口
    fn spawn_connection_watcher(self: &Arc<Self>) {
        let events = self.events.clone();
        let mut rx = self.channel.watch_connection();

        let handle = tokio::spawn(async move {
            let mut last = *rx.borrow();
            while rx.changed().await.is_ok() {
                let new_status = *rx.borrow();
                events
                    .emit(SdkEvent::ConnectionChanged {
                        old_status: last,
                        new_status,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    })
                    .await;
                last = new_status;
            }
        });
        self.tasks.lock().push(handle);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(AmoraSDKError::ShuttingDown("SDK 正在关闭".to_string()));
        }
        Ok(())
    }

    // ============================================================
    // 事件订阅
    // ============================================================

    /// 订阅 SDK 事件流
    pub fn subscribe_events(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }

    /// 注册事件监听器（`"*"` 匹配所有事件）
    pub async fn add_event_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SdkEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(event_type, listener).await;
    }

    // ============================================================
    // 作用域生命周期
    // ============================================================

    /// 打开收件箱（聚合会话列表）：缓存先行 + 网络刷新 + 固定节奏后台轮询
    pub async fn open_inbox(&self) -> Result<()> {
        self.ensure_running()?;
        self.activate_engine(&Scope::Inbox).await;
        self.polling.start(Scope::Inbox);
        Ok(())
    }

    /// 关闭收件箱
    pub async fn close_inbox(&self) {
        self.polling.stop(&Scope::Inbox);
        self.engine.deactivate(&Scope::Inbox).await;
    }

    /// 打开单聊会话（join 通道、激活同步、断连轮询回退）
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        self.open_scope(Scope::Direct(conversation_id.to_string())).await
    }

    /// 打开群房间
    pub async fn open_room(&self, room_id: &str) -> Result<()> {
        self.open_scope(Scope::Room(room_id.to_string())).await
    }

    async fn open_scope(&self, scope: Scope) -> Result<()> {
        self.ensure_running()?;
        // join 与 open 一一对应（通道实现保证幂等）
        self.channel.join_scope(&scope).await?;
        self.activate_engine(&scope).await;
        self.polling.start(scope);
        Ok(())
    }

    /// 关闭会话 / 房间界面：回收定时器、停止轮询、停用同步、离开通道
    pub async fn close_scope(&self, scope: &Scope) {
        self.typing.scope_closed(scope).await;
        self.polling.stop(scope);
        self.engine.deactivate(scope).await;
        if let Err(e) = self.channel.leave_scope(scope).await {
            warn!("leave_scope 失败（忽略）: scope={}, error={}", scope, e);
        }
    }

    async fn activate_engine(&self, scope: &Scope) {
        self.engine.activate(scope).await;
    }

    // ============================================================
    // 数据读取
    // ============================================================

    /// 投影后的收件箱 feed（合并 / 过滤 / 排序）
    pub async fn inbox(&self, filter: &InboxFilter) -> Option<Vec<Conversation>> {
        let (conversations, rooms) = self.engine.inbox_parts().await?;
        Some(self.projector.project(&conversations, &rooms, filter))
    }

    /// 会话条目的预览文案
    pub fn preview_text(&self, conversation: &Conversation) -> String {
        self.projector.preview_text(conversation)
    }

    /// 某个作用域当前的消息列表
    pub async fn messages(&self, scope: &Scope) -> Option<Vec<Message>> {
        self.engine.messages(scope).await
    }

    /// 某个作用域正在输入的远端用户
    pub async fn typing_users(&self, scope: &Scope) -> Vec<String> {
        self.typing.typing_users(scope).await
    }

    /// 当前连接状态
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.channel.watch_connection().borrow()
    }

    // ============================================================
    // 用户操作
    // ============================================================

    /// 发送消息（先停掉本地输入状态，再走发送确认路径）
    pub async fn send_message(&self, scope: &Scope, content: &str) -> Result<Message> {
        self.ensure_running()?;
        self.typing.message_sent(scope).await;
        self.engine.send_message(scope, content).await
    }

    /// 对消息做表情反馈
    pub async fn react_to_message(
        &self,
        scope: &Scope,
        message_id: &str,
        emoji: &str,
    ) -> Result<Message> {
        self.ensure_running()?;
        self.engine.react_to_message(scope, message_id, emoji).await
    }

    /// 设置归档状态
    pub async fn set_archived(&self, scope: &Scope, archived: bool) -> Result<()> {
        self.ensure_running()?;
        self.engine.set_archived(scope, archived).await
    }

    /// 退出房间（同时关闭本地界面状态）
    pub async fn leave_room(&self, room_id: &str) -> Result<()> {
        self.ensure_running()?;
        let scope = Scope::Room(room_id.to_string());
        self.engine.leave_room(room_id).await?;
        self.polling.stop(&scope);
        self.typing.scope_closed(&scope).await;
        if let Err(e) = self.channel.leave_scope(&scope).await {
            warn!("leave_scope 失败（忽略）: scope={}, error={}", scope, e);
        }
        Ok(())
    }

    /// 删除单聊会话
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.ensure_running()?;
        let scope = Scope::Direct(conversation_id.to_string());
        self.engine.delete_conversation(conversation_id).await?;
        self.polling.stop(&scope);
        self.typing.scope_closed(&scope).await;
        Ok(())
    }

    /// 获取或创建与某个用户的单聊会话
    pub async fn get_or_create_conversation(&self, other_user_id: &str) -> Result<Conversation> {
        self.ensure_running()?;
        match self.rest.get_or_create_conversation(other_user_id).await {
            Ok(conversation) => Ok(conversation),
            Err(e) => {
                self.events
                    .emit(SdkEvent::ActionFailed {
                        action: "get_or_create_conversation".to_string(),
                        scope: None,
                        error: e.to_string(),
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// 按名称使服务端列表缓存失效（如 "rooms/my"）
    pub fn invalidate(&self, name: &str) {
        self.rest.invalidate(name);
    }

    // ============================================================
    // 输入状态
    // ============================================================

    /// 输入框内容变化
    pub async fn input_changed(&self, scope: &Scope, content: &str) {
        self.typing.input_changed(scope, content).await;
    }

    /// 输入框失焦
    pub async fn input_blurred(&self, scope: &Scope) {
        self.typing.input_blurred(scope).await;
    }

    // ============================================================
    // 偏好
    // ============================================================

    /// 读取最后活跃的标签页（独立于同步核心的偏好项）
    pub async fn last_active_tab(&self) -> Option<String> {
        self.kv
            .get::<_, String>(cache_keys::LAST_ACTIVE_TAB)
            .await
            .ok()
            .flatten()
    }

    /// 持久化最后活跃的标签页
    pub async fn set_last_active_tab(&self, tab: &str) -> Result<()> {
        self.kv.set(cache_keys::LAST_ACTIVE_TAB, &tab.to_string()).await
    }

    // ============================================================
    // 关闭
    // ============================================================

    /// 关闭 SDK：停掉事件泵、轮询与全部定时器，刷盘后返回
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Amora SDK 正在关闭: user={}", self.config.user_id);

        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        self.polling.stop_all();
        self.typing.shutdown().await;
        self.engine.deactivate_all().await;
        self.kv.flush().await?;

        info!("✅ Amora SDK 已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::MemoryRealtimeChannel;
    use crate::test_support::{conversation, message, FakeRestApi};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    struct TestHarness {
        sdk: Arc<AmoraSDK>,
        rest: Arc<FakeRestApi>,
        channel: Arc<MemoryRealtimeChannel>,
        _dir: TempDir,
    }

    async fn harness() -> TestHarness {
        let dir = TempDir::new().unwrap();
        let config = AmoraConfig::builder()
            .data_dir(dir.path())
            .user_id("me")
            .typing(TypingConfig {
                debounce: Duration::from_millis(20),
                idle_stop: Duration::from_millis(100),
                remote_expiry: Duration::from_millis(80),
            })
            .polling(PollingConfig {
                inbox_interval: Duration::from_millis(50),
                conversation_interval: Duration::from_millis(50),
            })
            .build()
            .unwrap();

        let rest = Arc::new(FakeRestApi::new("me"));
        let channel = MemoryRealtimeChannel::new(64);
        let sdk = AmoraSDK::initialize(config, rest.clone(), channel.clone())
            .await
            .unwrap();
        TestHarness {
            sdk,
            rest,
            channel,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_builder_requires_data_dir_and_user() {
        assert!(AmoraConfig::builder().build().is_err());
        assert!(AmoraConfig::builder().data_dir("/tmp/x").build().is_err());
        assert!(AmoraConfig::builder()
            .data_dir("/tmp/x")
            .user_id("me")
            .build()
            .is_ok());
    }

    #[tokio::test]
    async fn test_open_inbox_and_project_feed() {
        let h = harness().await;
        h.rest
            .set_conversations(vec![conversation("c1", "Alice", "hi", 10)]);

        h.sdk.open_inbox().await.unwrap();
        sleep(Duration::from_millis(80)).await;

        let feed = h.sdk.inbox(&InboxFilter::default()).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(h.sdk.preview_text(&feed[0]), "Alice: hi");
    }

    #[tokio::test]
    async fn test_open_conversation_joins_channel_scope() {
        let h = harness().await;
        let scope = Scope::Direct("c1".to_string());

        h.sdk.open_conversation("c1").await.unwrap();
        assert_eq!(h.channel.joined_scopes(), vec![scope.clone()]);

        h.sdk.close_scope(&scope).await;
        assert!(h.channel.joined_scopes().is_empty());
    }

    #[tokio::test]
    async fn test_pushed_message_flows_into_open_conversation() {
        let h = harness().await;
        let scope = Scope::Direct("c1".to_string());

        h.sdk.open_conversation("c1").await.unwrap();
        sleep(Duration::from_millis(30)).await;

        h.channel.push(RealtimeEvent::MessageNew {
            conversation_id: "c1".to_string(),
            message: message("m1", "u2", "你好呀", 100),
        });
        sleep(Duration::from_millis(50)).await;

        let messages = h.sdk.messages(&scope).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "你好呀");
    }

    #[tokio::test]
    async fn test_remote_typing_flows_through_pump() {
        let h = harness().await;
        let scope = Scope::Direct("c1".to_string());

        h.sdk.open_conversation("c1").await.unwrap();

        h.channel.push(RealtimeEvent::TypingStart {
            conversation_id: "c1".to_string(),
            user_id: "u2".to_string(),
        });
        sleep(Duration::from_millis(30)).await;
        assert_eq!(h.sdk.typing_users(&scope).await, vec!["u2"]);

        h.channel.push(RealtimeEvent::TypingStop {
            conversation_id: "c1".to_string(),
            user_id: "u2".to_string(),
        });
        sleep(Duration::from_millis(30)).await;
        assert!(h.sdk.typing_users(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_stops_local_typing() {
        let h = harness().await;
        let scope = Scope::Direct("c1".to_string());

        h.sdk.open_conversation("c1").await.unwrap();
        sleep(Duration::from_millis(30)).await;

        h.sdk.input_changed(&scope, "ok").await;
        sleep(Duration::from_millis(40)).await; // start 已上行

        let sent = h.sdk.send_message(&scope, "ok").await.unwrap();
        assert!(sent.id.starts_with("srv-"));

        let emissions = h.channel.typing_emissions();
        assert_eq!(emissions.last(), Some(&(scope.clone(), false)));

        let messages = h.sdk.messages(&scope).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_last_active_tab_round_trip() {
        let h = harness().await;

        assert!(h.sdk.last_active_tab().await.is_none());
        h.sdk.set_last_active_tab("requests").await.unwrap();
        assert_eq!(h.sdk.last_active_tab().await.unwrap(), "requests");
    }

    #[tokio::test]
    async fn test_shutdown_rejects_further_actions() {
        let h = harness().await;
        let scope = Scope::Direct("c1".to_string());

        h.sdk.shutdown().await.unwrap();
        let result = h.sdk.send_message(&scope, "ok").await;
        assert!(matches!(result, Err(AmoraSDKError::ShuttingDown(_))));

        // 重复关闭是 no-op
        h.sdk.shutdown().await.unwrap();
    }
}
