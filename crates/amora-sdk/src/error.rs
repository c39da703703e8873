use std::fmt;

#[derive(Debug)]
pub enum AmoraSDKError {
    JsonError(String),
    InvalidArgument(String),
    NotFound(String),
    KvStore(String),
    Serialization(String),
    IO(String),
    NotConnected,
    Transport(String),
    Timeout(String),
    // SDK 相关错误
    Runtime(String),        // 运行时错误
    Config(String),         // 配置错误
    NotInitialized(String), // 未初始化错误
    ShuttingDown(String),   // 正在关闭错误
    ServerError(String),    // 服务器错误
    InvalidData(String),    // 无效数据错误
    // 会话/房间已在服务端消失（客户端应离开当前界面）
    ScopeGone(String),
}

impl fmt::Display for AmoraSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmoraSDKError::JsonError(e) => write!(f, "JSON error: {}", e),
            AmoraSDKError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            AmoraSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            AmoraSDKError::KvStore(e) => write!(f, "KV store error: {}", e),
            AmoraSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            AmoraSDKError::IO(e) => write!(f, "IO error: {}", e),
            AmoraSDKError::NotConnected => write!(f, "Not connected"),
            AmoraSDKError::Transport(e) => write!(f, "Transport error: {}", e),
            AmoraSDKError::Timeout(e) => write!(f, "Timeout: {}", e),
            AmoraSDKError::Runtime(e) => write!(f, "Runtime error: {}", e),
            AmoraSDKError::Config(e) => write!(f, "Config error: {}", e),
            AmoraSDKError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            AmoraSDKError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
            AmoraSDKError::ServerError(e) => write!(f, "Server error: {}", e),
            AmoraSDKError::InvalidData(e) => write!(f, "Invalid data: {}", e),
            AmoraSDKError::ScopeGone(e) => write!(f, "Scope gone: {}", e),
        }
    }
}

impl std::error::Error for AmoraSDKError {}

impl From<serde_json::Error> for AmoraSDKError {
    fn from(error: serde_json::Error) -> Self {
        AmoraSDKError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for AmoraSDKError {
    fn from(error: std::io::Error) -> Self {
        AmoraSDKError::IO(error.to_string())
    }
}

impl AmoraSDKError {
    /// 判断是否是"作用域已消失"错误（会话被删除 / 房间被解散）
    ///
    /// 调用方收到此错误时应当离开当前界面，而非重试。
    pub fn is_scope_gone(&self) -> bool {
        matches!(self, AmoraSDKError::ScopeGone(_))
    }

    /// 判断是否是可恢复的瞬时网络错误（下一次轮询 / 重连后自然恢复）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AmoraSDKError::Transport(_) | AmoraSDKError::Timeout(_) | AmoraSDKError::NotConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, AmoraSDKError>;
