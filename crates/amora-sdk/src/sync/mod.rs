//! 同步模块
//!
//! 职责：
//! - 缓存优先的作用域激活（先画缓存，再刷网络，后覆盖）
//! - 实时推送事件的调和（按身份去重、原地替换、移除）
//! - 断连时的轮询回退
//! - 激活代与取消令牌保证迟到响应不污染已卸载的界面

pub mod dedup;
pub mod engine;
pub mod polling;

pub use dedup::DeduplicationManager;
pub use engine::{InboxSnapshot, ScopeState, SyncEngine};
pub use polling::{PollingConfig, PollingFallback};

/// 作用域同步状态
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SyncState {
    /// 正在首次加载（无缓存且网络未返回）
    Loading,
    /// 已同步（最近一次网络刷新成功）
    Synced,
    /// 刷新失败（继续展示缓存或空态）
    Failed {
        /// 错误消息
        error: String,
    },
}
