//! Amora SDK - 社交客户端的会话同步核心
//!
//! 本 SDK 提供统一收件箱（单聊 + 群房间）的同步能力，包括：
//! - 💾 缓存优先加载：先画本地快照，再并发刷新网络并整体覆盖
//! - 📡 实时推送调和：按消息身份去重、原地替换、按创建时间保持有序
//! - ⌨️ 输入状态协调：本地防抖上行、远端聚合与强制过期兜底
//! - 🔁 轮询回退：断连期间的兜底拉取，列表界面的固定节奏后台刷新
//! - 🗂️ 会话列表投影：合并 / 过滤 / 置顶排序 / 预览派生
//! - ⚙️ 事件系统：统一的事件出口与回调机制
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use amora_sdk::{AmoraConfig, AmoraSDK, HttpConfig, HttpRestApi, InboxFilter, MemoryRealtimeChannel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 配置 SDK
//!     let config = AmoraConfig::builder()
//!         .data_dir("/path/to/data")
//!         .user_id("user123")
//!         .build()?;
//!
//!     // REST 与实时通道依赖注入（实时通道可换成 socket 实现）
//!     let rest = Arc::new(HttpRestApi::new(&HttpConfig::new("https://api.amora.app"))?);
//!     let channel = MemoryRealtimeChannel::new(256);
//!
//!     // 初始化 SDK
//!     let sdk = AmoraSDK::initialize(config, rest, channel).await?;
//!
//!     // 订阅事件
//!     let mut events = sdk.subscribe_events();
//!
//!     // 打开收件箱：缓存立即可见，网络结果随后覆盖
//!     sdk.open_inbox().await?;
//!     if let Some(feed) = sdk.inbox(&InboxFilter::default()).await {
//!         println!("会话数: {}", feed.len());
//!     }
//!
//!     // 打开会话并发送消息
//!     sdk.open_conversation("conv-1").await?;
//!     let message = sdk
//!         .send_message(&amora_sdk::Scope::Direct("conv-1".to_string()), "Hello!")
//!         .await?;
//!     println!("已发送: {}", message.id);
//!
//!     let _ = events.recv().await;
//!
//!     // 关闭 SDK
//!     sdk.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod connection_state;
pub mod error;
pub mod events;
pub mod models;
pub mod projector;
pub mod realtime;
pub mod rest;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod typing;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出核心类型，方便使用
pub use connection_state::{ConnectionStateManager, ConnectionStatus};
pub use error::{AmoraSDKError, Result};
pub use events::{EventManager, EventStats, SdkEvent, UpdateSource};
pub use models::{
    ActivityKind, CacheEntry, Conversation, ConversationKind, Counterpart, LastActivity,
    LastMessage, Message, MessageType, Reaction, RoomSummary, Scope,
};
pub use projector::{ConversationListProjector, InboxFilter, InboxView};
pub use realtime::{MemoryRealtimeChannel, RealtimeChannel, RealtimeEvent};
pub use rest::{HttpConfig, HttpRestApi, RestApi};
pub use sdk::{AmoraConfig, AmoraConfigBuilder, AmoraSDK};
pub use storage::{CacheStore, KvStore};
pub use sync::{
    DeduplicationManager, InboxSnapshot, PollingConfig, PollingFallback, ScopeState, SyncEngine,
    SyncState,
};
pub use typing::{TypingConfig, TypingCoordinator};
pub use version::{BUILD_TIME, GIT_SHA, SDK_VERSION};
