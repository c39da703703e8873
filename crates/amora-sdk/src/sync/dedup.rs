//! 消息去重管理器
//!
//! 网络响应与推送事件可能以任意顺序到达同一条消息（发送确认 + 推送回声、
//! 刷新与推送交错），按消息身份去重是强制性的调和前置条件。

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 消息去重管理器
///
/// 基于消息 ID 实现去重，防止重复消息处理
pub struct DeduplicationManager {
    /// 已处理的消息集合 (message_id -> 处理时间)
    processed_messages: Mutex<HashMap<String, Instant>>,

    /// 消息保留时间
    message_retention: Duration,

    /// 清理阈值（当缓存大小超过此值时触发清理）
    cleanup_threshold: usize,
}

impl DeduplicationManager {
    /// 创建新的消息去重管理器
    pub fn new() -> Self {
        Self::with_config(Duration::from_secs(3600), 10000)
    }

    /// 使用自定义配置创建消息去重管理器
    pub fn with_config(message_retention: Duration, max_cache_size: usize) -> Self {
        Self {
            processed_messages: Mutex::new(HashMap::new()),
            message_retention,
            cleanup_threshold: max_cache_size * 4 / 5, // 80% 阈值
        }
    }

    /// 检查消息是否已处理（去重检查）
    ///
    /// 返回 true 如果消息已处理过（重复消息），false 如果未处理过
    pub fn is_duplicate(&self, message_id: &str) -> bool {
        let processed = self.processed_messages.lock();

        if processed.contains_key(message_id) {
            debug!("🔄 检测到重复消息: message_id={}", message_id);
            return true;
        }

        false
    }

    /// 标记消息为已处理
    pub fn mark_processed(&self, message_id: &str) {
        let mut processed = self.processed_messages.lock();
        processed.insert(message_id.to_string(), Instant::now());

        // 检查是否需要清理
        if processed.len() > self.cleanup_threshold {
            self.cleanup_expired_internal(&mut processed);
        }
    }

    /// 内部清理方法（需要已持有锁）
    fn cleanup_expired_internal(&self, processed: &mut HashMap<String, Instant>) {
        let now = Instant::now();
        let initial_count = processed.len();

        processed.retain(|_, timestamp| now.duration_since(*timestamp) <= self.message_retention);

        let removed_count = initial_count - processed.len();
        if removed_count > 0 {
            info!(
                "🧹 清理过期消息记录: 移除了 {} 条，剩余 {} 条",
                removed_count,
                processed.len()
            );
        }
    }

    /// 清理过期的消息记录（外部调用）
    pub fn cleanup_expired(&self) {
        let mut processed = self.processed_messages.lock();
        self.cleanup_expired_internal(&mut processed);
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.processed_messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空所有记录
    pub fn clear(&self) {
        let mut processed = self.processed_messages.lock();
        processed.clear();
        info!("消息去重缓存已清空");
    }
}

impl Default for DeduplicationManager {
    fn default() -> Self {
        Self::new()
    }
}
