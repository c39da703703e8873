//! 输入状态协调模块
//!
//! 功能包括：
//! - 本地方向：输入防抖后上行 typing:start，空闲自动上行 typing:stop
//! - 远端方向：聚合各作用域正在输入的用户集合，强制过期兜底
//! - 所有定时器可取消，作用域关闭时统一回收
//!
//! 输入指示属于尽力而为的 UX 信号：即使 stop 事件丢失，
//! 过期定时器也会限定陈旧状态的最坏持续时间。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{EventManager, SdkEvent};
use crate::models::Scope;
use crate::realtime::RealtimeChannel;

/// 输入状态配置
#[derive(Debug, Clone)]
pub struct TypingConfig {
    /// 本地输入防抖窗口 - 首次键入后多久上行 typing:start
    pub debounce: Duration,
    /// 本地空闲窗口 - 停止键入多久后自动上行 typing:stop
    pub idle_stop: Duration,
    /// 远端状态强制过期时间 - 未收到 stop 时的兜底清除
    pub remote_expiry: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            idle_stop: Duration::from_millis(2000),
            remote_expiry: Duration::from_millis(4000),
        }
    }
}

/// 本地方向的单作用域状态
struct LocalTyping {
    /// typing:start 是否已上行（决定 stop 是否需要上行）
    started: bool,
    /// 待触发的防抖任务
    debounce: Option<JoinHandle<()>>,
    /// 待触发的空闲自动 stop 任务
    idle: Option<JoinHandle<()>>,
}

/// 远端方向的单用户状态
struct RemoteTyping {
    /// 过期兜底任务
    expiry: JoinHandle<()>,
}

type LocalMap = Mutex<HashMap<Scope, LocalTyping>>;
type RemoteMap = Mutex<HashMap<Scope, HashMap<String, RemoteTyping>>>;

/// 输入状态协调器
pub struct TypingCoordinator {
    channel: Arc<dyn RealtimeChannel>,
    events: Arc<EventManager>,
    config: TypingConfig,
    local: Arc<LocalMap>,
    remote: Arc<RemoteMap>,
}

impl TypingCoordinator {
    /// 创建新的输入状态协调器
    pub fn new(
        channel: Arc<dyn RealtimeChannel>,
        events: Arc<EventManager>,
        config: TypingConfig,
    ) -> Self {
        Self {
            channel,
            events,
            config,
            local: Arc::new(Mutex::new(HashMap::new())),
            remote: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ============================================================
    // 本地 → 远端
    // ============================================================

    /// 本地输入框内容变化
    ///
    /// 非空内容：防抖后上行 start，并重置空闲自动 stop 定时器；
    /// 空内容：立即上行 stop。
    pub async fn input_changed(&self, scope: &Scope, content: &str) {
        if content.trim().is_empty() {
            self.stop_local(scope, "content emptied").await;
            return;
        }

        let mut local = self.local.lock().await;
        let entry = local.entry(scope.clone()).or_insert_with(|| LocalTyping {
            started: false,
            debounce: None,
            idle: None,
        });

        // 每次键入重置空闲定时器
        if let Some(handle) = entry.idle.take() {
            handle.abort();
        }
        entry.idle = Some(self.spawn_idle_stop(scope.clone()));

        // 已在输入中或防抖已挂起时不再重复安排 start
        if !entry.started && entry.debounce.is_none() {
            entry.debounce = Some(self.spawn_debounced_start(scope.clone()));
        }
    }

    /// 消息已发送（立即 stop）
    pub async fn message_sent(&self, scope: &Scope) {
        self.stop_local(scope, "message sent").await;
    }

    /// 输入框失焦（立即 stop）
    pub async fn input_blurred(&self, scope: &Scope) {
        self.stop_local(scope, "input blurred").await;
    }

    /// 作用域关闭（界面卸载）：立即 stop 并清理该作用域的全部远端状态
    pub async fn scope_closed(&self, scope: &Scope) {
        self.stop_local(scope, "scope closed").await;

        let mut remote = self.remote.lock().await;
        if let Some(users) = remote.remove(scope) {
            for (_, entry) in users {
                entry.expiry.abort();
            }
        }
    }

    /// 立即上行 stop（仅当 start 已上行过；取消挂起的定时器）
    async fn stop_local(&self, scope: &Scope, reason: &str) {
        let emit = {
            let mut local = self.local.lock().await;
            match local.remove(scope) {
                Some(mut entry) => {
                    if let Some(handle) = entry.debounce.take() {
                        handle.abort();
                    }
                    if let Some(handle) = entry.idle.take() {
                        handle.abort();
                    }
                    entry.started
                }
                None => false,
            }
        };

        if emit {
            debug!("Emitting typing:stop for {} ({})", scope, reason);
            if let Err(e) = self.channel.send_typing(scope, false).await {
                debug!("typing:stop emit failed (best effort): {}", e);
            }
        }
    }

    /// 安排防抖后的 start 上行
    fn spawn_debounced_start(&self, scope: Scope) -> JoinHandle<()> {
        let local = self.local.clone();
        let channel = self.channel.clone();
        let delay = self.config.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let should_emit = {
                let mut map = local.lock().await;
                match map.get_mut(&scope) {
                    Some(entry) if !entry.started => {
                        entry.started = true;
                        entry.debounce = None;
                        true
                    }
                    Some(entry) => {
                        entry.debounce = None;
                        false
                    }
                    // 条目已被 stop 清理，放弃上行
                    None => false,
                }
            };

            if should_emit {
                debug!("Emitting typing:start for {}", scope);
                if let Err(e) = channel.send_typing(&scope, true).await {
                    debug!("typing:start emit failed (best effort): {}", e);
                }
            }
        })
    }

    /// 安排空闲自动 stop
    fn spawn_idle_stop(&self, scope: Scope) -> JoinHandle<()> {
        let local = self.local.clone();
        let channel = self.channel.clone();
        let delay = self.config.idle_stop;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // 注意：此处不能 abort idle 句柄（就是当前任务自身）
            let emit = {
                let mut map = local.lock().await;
                match map.remove(&scope) {
                    Some(mut entry) => {
                        if let Some(handle) = entry.debounce.take() {
                            handle.abort();
                        }
                        entry.started
                    }
                    None => false,
                }
            };

            if emit {
                debug!("Emitting typing:stop for {} (idle)", scope);
                if let Err(e) = channel.send_typing(&scope, false).await {
                    debug!("typing:stop emit failed (best effort): {}", e);
                }
            }
        })
    }

    // ============================================================
    // 远端 → 本地
    // ============================================================

    /// 处理远端 typing:start：加入可见集合并（重新）启动过期定时器
    pub async fn handle_remote_start(&self, scope: &Scope, user_id: &str) {
        {
            let mut remote = self.remote.lock().await;
            let users = remote.entry(scope.clone()).or_default();

            // 重复 start 时重置过期定时器
            if let Some(prev) = users.remove(user_id) {
                prev.expiry.abort();
            }
            let expiry = self.spawn_remote_expiry(scope.clone(), user_id.to_string());
            users.insert(user_id.to_string(), RemoteTyping { expiry });
        }

        self.emit_typing_changed(scope).await;
    }

    /// 处理远端 typing:stop：移出可见集合并取消过期定时器
    pub async fn handle_remote_stop(&self, scope: &Scope, user_id: &str) {
        let removed = {
            let mut remote = self.remote.lock().await;
            match remote.get_mut(scope) {
                Some(users) => {
                    let removed = users.remove(user_id);
                    if let Some(entry) = &removed {
                        entry.expiry.abort();
                    }
                    if users.is_empty() {
                        remote.remove(scope);
                    }
                    removed.is_some()
                }
                None => false,
            }
        };

        if removed {
            self.emit_typing_changed(scope).await;
        }
    }

    /// 某个作用域当前正在输入的远端用户（按 ID 排序）
    pub async fn typing_users(&self, scope: &Scope) -> Vec<String> {
        let remote = self.remote.lock().await;
        let mut users: Vec<String> = remote
            .get(scope)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// 过期兜底：覆盖 stop 事件丢失的情况
    fn spawn_remote_expiry(&self, scope: Scope, user_id: String) -> JoinHandle<()> {
        let remote = self.remote.clone();
        let events = self.events.clone();
        let delay = self.config.remote_expiry;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let (removed, user_ids) = {
                let mut map = remote.lock().await;
                match map.get_mut(&scope) {
                    Some(users) => {
                        // 不 abort 自身句柄，直接移除
                        let removed = users.remove(&user_id).is_some();
                        let mut ids: Vec<String> = users.keys().cloned().collect();
                        ids.sort();
                        if users.is_empty() {
                            map.remove(&scope);
                        }
                        (removed, ids)
                    }
                    None => (false, Vec::new()),
                }
            };

            if removed {
                debug!("Typing state expired for user {} in {}", user_id, scope);
                events
                    .emit(SdkEvent::TypingChanged {
                        scope: scope.clone(),
                        user_ids,
                    })
                    .await;
            }
        })
    }

    async fn emit_typing_changed(&self, scope: &Scope) {
        let user_ids = self.typing_users(scope).await;
        self.events
            .emit(SdkEvent::TypingChanged {
                scope: scope.clone(),
                user_ids,
            })
            .await;
    }

    /// 回收全部定时器（SDK 关闭时调用）
    pub async fn shutdown(&self) {
        let mut local = self.local.lock().await;
        for (_, mut entry) in local.drain() {
            if let Some(handle) = entry.debounce.take() {
                handle.abort();
            }
            if let Some(handle) = entry.idle.take() {
                handle.abort();
            }
        }
        drop(local);

        let mut remote = self.remote.lock().await;
        for (_, users) in remote.drain() {
            for (_, entry) in users {
                entry.expiry.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::MemoryRealtimeChannel;
    use tokio::time::sleep;

    fn test_config() -> TypingConfig {
        TypingConfig {
            debounce: Duration::from_millis(30),
            idle_stop: Duration::from_millis(120),
            remote_expiry: Duration::from_millis(80),
        }
    }

    fn coordinator() -> (TypingCoordinator, Arc<MemoryRealtimeChannel>) {
        let channel = MemoryRealtimeChannel::new(64);
        let events = Arc::new(EventManager::new(64));
        let coordinator = TypingCoordinator::new(channel.clone(), events, test_config());
        (coordinator, channel)
    }

    #[tokio::test]
    async fn test_start_is_debounced_and_emitted_once() {
        let (coordinator, channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        // 连续键入不会重复安排 start
        coordinator.input_changed(&scope, "h").await;
        coordinator.input_changed(&scope, "he").await;
        coordinator.input_changed(&scope, "hel").await;

        sleep(Duration::from_millis(60)).await;

        let emissions = channel.typing_emissions();
        assert_eq!(emissions, vec![(scope.clone(), true)]);
    }

    #[tokio::test]
    async fn test_idle_stop_emitted_exactly_once() {
        let (coordinator, channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        coordinator.input_changed(&scope, "你好").await;

        // 停止键入并等待空闲窗口走完
        sleep(Duration::from_millis(300)).await;

        let emissions = channel.typing_emissions();
        assert_eq!(
            emissions,
            vec![(scope.clone(), true), (scope.clone(), false)]
        );

        // 继续等待，stop 不会重复上行
        sleep(Duration::from_millis(200)).await;
        assert_eq!(channel.typing_emissions().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_content_stops_immediately() {
        let (coordinator, channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        coordinator.input_changed(&scope, "hi").await;
        sleep(Duration::from_millis(50)).await; // start 已上行

        coordinator.input_changed(&scope, "").await;

        let emissions = channel.typing_emissions();
        assert_eq!(
            emissions,
            vec![(scope.clone(), true), (scope.clone(), false)]
        );
    }

    #[tokio::test]
    async fn test_no_stop_if_start_never_emitted() {
        let (coordinator, channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        // 防抖窗口内就发送，start 从未上行，stop 也不应上行
        coordinator.input_changed(&scope, "ok").await;
        coordinator.message_sent(&scope).await;

        sleep(Duration::from_millis(80)).await;
        assert!(channel.typing_emissions().is_empty());
    }

    #[tokio::test]
    async fn test_send_stops_typing() {
        let (coordinator, channel) = coordinator();
        let scope = Scope::Room("r1".to_string());

        coordinator.input_changed(&scope, "出发吗？").await;
        sleep(Duration::from_millis(50)).await;

        coordinator.message_sent(&scope).await;

        let emissions = channel.typing_emissions();
        assert_eq!(
            emissions,
            vec![(scope.clone(), true), (scope.clone(), false)]
        );
    }

    #[tokio::test]
    async fn test_remote_start_then_forced_expiry() {
        let (coordinator, _channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        coordinator.handle_remote_start(&scope, "u2").await;
        assert_eq!(coordinator.typing_users(&scope).await, vec!["u2"]);

        // 没有 stop 事件，过期定时器兜底清除
        sleep(Duration::from_millis(160)).await;
        assert!(coordinator.typing_users(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_stop_clears_before_expiry() {
        let (coordinator, _channel) = coordinator();
        let scope = Scope::Room("r1".to_string());

        coordinator.handle_remote_start(&scope, "u2").await;
        coordinator.handle_remote_start(&scope, "u3").await;
        assert_eq!(
            coordinator.typing_users(&scope).await,
            vec!["u2", "u3"]
        );

        coordinator.handle_remote_stop(&scope, "u2").await;
        assert_eq!(coordinator.typing_users(&scope).await, vec!["u3"]);
    }

    #[tokio::test]
    async fn test_repeated_remote_start_extends_expiry() {
        let (coordinator, _channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        coordinator.handle_remote_start(&scope, "u2").await;
        sleep(Duration::from_millis(50)).await;
        // 再次 start 重置过期窗口
        coordinator.handle_remote_start(&scope, "u2").await;
        sleep(Duration::from_millis(50)).await;

        // 距第二次 start 只过了 50ms（< 80ms），仍应可见
        assert_eq!(coordinator.typing_users(&scope).await, vec!["u2"]);

        sleep(Duration::from_millis(60)).await;
        assert!(coordinator.typing_users(&scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_scope_closed_clears_everything() {
        let (coordinator, channel) = coordinator();
        let scope = Scope::Direct("c1".to_string());

        coordinator.input_changed(&scope, "打字中").await;
        sleep(Duration::from_millis(50)).await;
        coordinator.handle_remote_start(&scope, "u2").await;

        coordinator.scope_closed(&scope).await;

        // 本地 stop 已上行，远端集合已清空
        let emissions = channel.typing_emissions();
        assert_eq!(emissions.last(), Some(&(scope.clone(), false)));
        assert!(coordinator.typing_users(&scope).await.is_empty());
    }
}
