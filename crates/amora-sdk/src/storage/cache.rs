//! 快照缓存层
//!
//! 冷启动与离线场景的首屏数据来源：读不经网络，写在每次成功的网络刷新后
//! 整体覆盖。损坏或缺失的条目按未命中处理，任何存储错误都不会传染给调用方，
//! 缓存层最坏的结果只是"没有缓存"。无 TTL：陈旧可以容忍，因为每次读取之后
//! 都会跟随一次网络刷新。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{CacheEntry, Scope};
use crate::storage::cache_keys;
use crate::storage::kv::KvStore;

/// 快照缓存
pub struct CacheStore {
    kv: Arc<KvStore>,
}

impl CacheStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    fn key(scope: &Scope) -> String {
        format!("{}{}", cache_keys::SNAPSHOT_PREFIX, scope.cache_key())
    }

    /// 读取作用域的缓存快照
    ///
    /// 缺失、损坏、存储层错误一律返回 None，绝不抛错。
    pub async fn read<T: DeserializeOwned>(&self, scope: &Scope) -> Option<CacheEntry<T>> {
        match self.kv.get::<_, CacheEntry<T>>(Self::key(scope)).await {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => None,
            Err(e) => {
                // 损坏的条目视为未命中
                debug!("缓存读取失败，按未命中处理: scope={}, error={}", scope, e);
                None
            }
        }
    }

    /// 整体覆盖写入作用域的缓存快照
    ///
    /// 写入失败仅记录日志（下一次成功刷新会再次覆盖）。
    pub async fn write<T: Serialize>(&self, scope: &Scope, data: &T) {
        let entry = CacheEntry {
            data,
            saved_at: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.kv.set(Self::key(scope), &entry).await {
            warn!("缓存写入失败: scope={}, error={}", scope, e);
        }
    }

    /// 删除作用域的缓存快照（会话删除 / 退出房间后调用）
    pub async fn remove(&self, scope: &Scope) {
        if let Err(e) = self.kv.delete(Self::key(scope)).await {
            warn!("缓存删除失败: scope={}, error={}", scope, e);
        }
    }
}
