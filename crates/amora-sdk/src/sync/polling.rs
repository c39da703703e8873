//! 轮询回退模块
//!
//! 实时通道断连时的兜底数据通道：
//! - 聚合列表按固定节奏后台刷新（无论连接状态，列表界面保底新鲜度）
//! - 打开的单个会话 / 房间仅在断连期间轮询
//! - 上一次请求未返回时新的 tick 是 no-op（引擎内单飞锁保证，不堆叠请求）
//! - 作用域停用时立即停止（取消令牌）

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::UpdateSource;
use crate::models::Scope;
use crate::realtime::RealtimeChannel;
use crate::sync::engine::SyncEngine;

/// 轮询配置
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// 聚合列表后台刷新间隔
    pub inbox_interval: Duration,
    /// 单个会话断连轮询间隔
    pub conversation_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            inbox_interval: Duration::from_millis(4000),
            conversation_interval: Duration::from_millis(6000),
        }
    }
}

/// 轮询回退管理器
pub struct PollingFallback {
    engine: Arc<SyncEngine>,
    channel: Arc<dyn RealtimeChannel>,
    config: PollingConfig,
    /// 作用域 -> 轮询任务取消令牌
    tasks: Mutex<HashMap<Scope, CancellationToken>>,
}

impl PollingFallback {
    /// 创建轮询回退管理器
    pub fn new(
        engine: Arc<SyncEngine>,
        channel: Arc<dyn RealtimeChannel>,
        config: PollingConfig,
    ) -> Self {
        Self {
            engine,
            channel,
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// 启动某个作用域的轮询（重复启动是 no-op）
    pub fn start(&self, scope: Scope) {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&scope) {
            debug!("Polling already running for {}", scope);
            return;
        }

        let token = CancellationToken::new();
        tasks.insert(scope.clone(), token.clone());
        drop(tasks);

        let engine = self.engine.clone();
        let channel = self.channel.clone();
        let is_inbox = scope == Scope::Inbox;
        let period = if is_inbox {
            self.config.inbox_interval
        } else {
            self.config.conversation_interval
        };

        info!("启动轮询: scope={}, interval={:?}", scope, period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval 的第一个 tick 立即完成，跳过（激活路径已经刷新过一次）
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Polling cancelled for {}", scope);
                        break;
                    }
                    _ = ticker.tick() => {
                        // 单个会话 / 房间仅在断连时轮询；聚合列表始终刷新
                        if !is_inbox && channel.is_connected() {
                            continue;
                        }
                        engine.refresh(&scope, UpdateSource::Poll).await;
                    }
                }
            }
        });
    }

    /// 停止某个作用域的轮询
    pub fn stop(&self, scope: &Scope) {
        if let Some(token) = self.tasks.lock().remove(scope) {
            token.cancel();
            info!("停止轮询: scope={}", scope);
        }
    }

    /// 停止全部轮询（SDK 关闭）
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock();
        for (_, token) in tasks.drain() {
            token.cancel();
        }
    }

    /// 当前活跃的轮询任务数
    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }
}
