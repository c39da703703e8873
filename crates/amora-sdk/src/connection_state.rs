//! 连接状态管理
//!
//! 实时通道的连接状态信号，供轮询回退与 UI 订阅使用。

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// 未连接
    Disconnected,
    /// 连接中
    Connecting,
    /// 已连接
    Connected,
    /// 重连中
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "未连接"),
            ConnectionStatus::Connecting => write!(f, "连接中"),
            ConnectionStatus::Connected => write!(f, "已连接"),
            ConnectionStatus::Reconnecting => write!(f, "重连中"),
        }
    }
}

/// 连接状态管理器
///
/// 基于 watch 通道，任意数量的订阅方都能观察到最新状态及其变更。
#[derive(Debug)]
pub struct ConnectionStateManager {
    sender: watch::Sender<ConnectionStatus>,
}

impl ConnectionStateManager {
    /// 创建新的连接状态管理器
    pub fn new(initial: ConnectionStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// 更新连接状态
    pub fn set(&self, status: ConnectionStatus) {
        let old = *self.sender.borrow();
        if old == status {
            return;
        }
        info!("连接状态变更: {} -> {}", old, status);
        self.sender.send_replace(status);
    }

    /// 当前连接状态
    pub fn current(&self) -> ConnectionStatus {
        *self.sender.borrow()
    }

    /// 是否已连接
    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionStatus::Connected
    }

    /// 订阅连接状态变更
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.sender.subscribe()
    }
}

impl Default for ConnectionStateManager {
    fn default() -> Self {
        Self::new(ConnectionStatus::Disconnected)
    }
}
