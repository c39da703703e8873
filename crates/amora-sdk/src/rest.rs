//! REST 接口模块 - 会话 / 房间 / 消息的 HTTP 访问层
//!
//! 本模块提供：
//! - `RestApi` trait：同步核心依赖的全部服务端读写面（可被测试替身替换）
//! - `HttpRestApi`：基于 reqwest 的实现，支持连接 / 请求超时配置
//! - 按名称的缓存失效钩子（如 "rooms/my"），强制下一次匹配的请求绕过 HTTP 缓存

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::{AmoraSDKError, Result};
use crate::models::{Conversation, Message, RoomSummary, Scope};

/// HTTP 层错误（折叠进 SDK 错误前的中间类型）
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpApiError {
    #[error("HTTP 状态码 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("传输失败: {0}")]
    Transport(String),
    #[error("响应解析失败: {0}")]
    Decode(String),
}

impl From<HttpApiError> for AmoraSDKError {
    fn from(error: HttpApiError) -> Self {
        match error {
            // 404/410 表示会话或房间已在服务端消失
            HttpApiError::Status { status: 404 | 410, body } => AmoraSDKError::ScopeGone(body),
            HttpApiError::Status { status, body } => {
                AmoraSDKError::ServerError(format!("HTTP {}: {}", status, body))
            }
            HttpApiError::Transport(e) => AmoraSDKError::Transport(e),
            HttpApiError::Decode(e) => AmoraSDKError::Serialization(e),
        }
    }
}

/// 服务端 REST 读写面
///
/// 形状与服务端契约一致；同步引擎只通过本 trait 访问网络。
#[async_trait]
pub trait RestApi: Send + Sync {
    /// 拉取单聊会话列表
    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<Conversation>>;

    /// 拉取已加入的房间列表
    async fn list_rooms(&self) -> Result<Vec<RoomSummary>>;

    /// 获取或创建与某个用户的单聊会话
    async fn get_or_create_conversation(&self, other_user_id: &str) -> Result<Conversation>;

    /// 拉取某个作用域的消息列表
    async fn get_messages(&self, scope: &Scope) -> Result<Vec<Message>>;

    /// 发送消息（返回服务端确认后的消息）
    async fn send_message(&self, scope: &Scope, content: &str) -> Result<Message>;

    /// 对消息做表情反馈（返回合并反馈后的完整消息）
    async fn react_to_message(&self, message_id: &str, emoji: &str) -> Result<Message>;

    /// 设置归档状态
    async fn set_archived(&self, scope: &Scope, archived: bool) -> Result<()>;

    /// 退出房间
    async fn leave_room(&self, room_id: &str) -> Result<()>;

    /// 删除单聊会话
    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    /// 按名称使缓存失效，下一次匹配的拉取绕过 HTTP 层缓存
    fn invalidate(&self, name: &str);
}

/// HTTP 客户端配置
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// 服务端基础 URL
    pub base_url: String,
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// 基于 reqwest 的 REST 实现
pub struct HttpRestApi {
    client: Client,
    base_url: String,
    /// 已失效的命名缓存（下一次匹配请求带 no-cache 后移除）
    invalidated: Mutex<HashSet<String>>,
}

impl HttpRestApi {
    /// 创建新的 HTTP REST 客户端
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| AmoraSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!("✅ HTTP REST 客户端已创建 (base_url: {})", base_url);

        Ok(Self {
            client,
            base_url,
            invalidated: Mutex::new(HashSet::new()),
        })
    }

    /// 取出并清除命名缓存的失效标记
    fn take_invalidation(&self, name: &str) -> bool {
        self.invalidated.lock().remove(name)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, bypass_cache: bool) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if bypass_cache {
            debug!("Bypassing HTTP cache for {}", path);
            request = request.header("Cache-Control", "no-cache");
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpApiError::Transport(e.to_string()))?;

        Self::decode(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| HttpApiError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    /// 发送无业务返回值的请求（仅校验状态码，忽略响应体）
    async fn send_unit(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| HttpApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误信息".to_string());
            error!("❌ 请求失败，HTTP 状态码: {}, 错误: {}", status, body);
            return Err(HttpApiError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误信息".to_string());
            error!("❌ 请求失败，HTTP 状态码: {}, 错误: {}", status, body);
            return Err(HttpApiError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let value = response
            .json::<T>()
            .await
            .map_err(|e| HttpApiError::Decode(e.to_string()))?;
        Ok(value)
    }

    fn messages_path(scope: &Scope) -> Result<String> {
        match scope {
            Scope::Direct(id) => Ok(format!("/api/conversations/{}/messages", id)),
            Scope::Room(id) => Ok(format!("/api/rooms/{}/messages", id)),
            Scope::Inbox => Err(AmoraSDKError::InvalidArgument(
                "聚合列表没有消息接口".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RestApi for HttpRestApi {
    async fn list_conversations(&self, include_archived: bool) -> Result<Vec<Conversation>> {
        let bypass = self.take_invalidation("conversations");
        self.get_json(
            &format!("/api/conversations?include_archived={}", include_archived),
            bypass,
        )
        .await
    }

    async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        let bypass = self.take_invalidation("rooms/my");
        self.get_json("/api/rooms/my", bypass).await
    }

    async fn get_or_create_conversation(&self, other_user_id: &str) -> Result<Conversation> {
        let url = format!("{}/api/conversations", self.base_url);
        self.send_json(
            self.client
                .post(&url)
                .json(&serde_json::json!({ "other_user_id": other_user_id })),
        )
        .await
    }

    async fn get_messages(&self, scope: &Scope) -> Result<Vec<Message>> {
        self.get_json(&Self::messages_path(scope)?, false).await
    }

    async fn send_message(&self, scope: &Scope, content: &str) -> Result<Message> {
        let url = format!("{}{}", self.base_url, Self::messages_path(scope)?);
        self.send_json(
            self.client
                .post(&url)
                .json(&serde_json::json!({ "content": content })),
        )
        .await
    }

    async fn react_to_message(&self, message_id: &str, emoji: &str) -> Result<Message> {
        let url = format!("{}/api/messages/{}/reactions", self.base_url, message_id);
        self.send_json(
            self.client
                .post(&url)
                .json(&serde_json::json!({ "emoji": emoji })),
        )
        .await
    }

    async fn set_archived(&self, scope: &Scope, archived: bool) -> Result<()> {
        let path = match scope {
            Scope::Direct(id) => format!("/api/conversations/{}/archive", id),
            Scope::Room(id) => format!("/api/rooms/{}/archive", id),
            Scope::Inbox => {
                return Err(AmoraSDKError::InvalidArgument(
                    "聚合列表不能归档".to_string(),
                ))
            }
        };
        let url = format!("{}{}", self.base_url, path);
        self.send_unit(
            self.client
                .put(&url)
                .json(&serde_json::json!({ "archived": archived })),
        )
        .await
    }

    async fn leave_room(&self, room_id: &str) -> Result<()> {
        let url = format!("{}/api/rooms/{}/leave", self.base_url, room_id);
        self.send_unit(self.client.post(&url)).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let url = format!("{}/api/conversations/{}", self.base_url, conversation_id);
        self.send_unit(self.client.delete(&url)).await
    }

    fn invalidate(&self, name: &str) {
        debug!("Invalidating named cache: {}", name);
        self.invalidated.lock().insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_gone_mapping() {
        let err: AmoraSDKError = HttpApiError::Status {
            status: 404,
            body: "conversation deleted".to_string(),
        }
        .into();
        assert!(err.is_scope_gone());

        let err: AmoraSDKError = HttpApiError::Status {
            status: 500,
            body: "boom".to_string(),
        }
        .into();
        assert!(!err.is_scope_gone());

        let err: AmoraSDKError = HttpApiError::Transport("connection refused".to_string()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalidation_is_consumed_once() {
        let api = HttpRestApi::new(&HttpConfig::new("http://localhost:9000")).unwrap();

        api.invalidate("rooms/my");
        assert!(api.take_invalidation("rooms/my"));
        // 第二次取不到（已消费）
        assert!(!api.take_invalidation("rooms/my"));
        // 未失效的名称取不到
        assert!(!api.take_invalidation("conversations"));
    }

    #[test]
    fn test_messages_path_per_scope() {
        assert_eq!(
            HttpRestApi::messages_path(&Scope::Direct("c1".to_string())).unwrap(),
            "/api/conversations/c1/messages"
        );
        assert_eq!(
            HttpRestApi::messages_path(&Scope::Room("r1".to_string())).unwrap(),
            "/api/rooms/r1/messages"
        );
        assert!(HttpRestApi::messages_path(&Scope::Inbox).is_err());
    }
}
