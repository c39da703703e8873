//! 存储模块 - 本地持久化层
//!
//! 分层设计：
//! - KvStore: 基于 sled 的键值存储，用户维度隔离
//! - CacheStore: 快照缓存层，冷启动先读缓存再刷新网络
//!
//! 缓存条目每次成功刷新后整体覆盖，不做增量修补；
//! 损坏或缺失的条目一律按缓存未命中处理，绝不向调用方抛错。

pub mod cache;
pub mod kv;

pub use cache::CacheStore;
pub use kv::KvStore;

/// 缓存键常量
pub mod cache_keys {
    /// 快照条目前缀
    pub const SNAPSHOT_PREFIX: &str = "snapshot_";
    /// 最后活跃标签页偏好（独立于同步核心）
    pub const LAST_ACTIVE_TAB: &str = "pref_last_active_tab";
}
