//! Amora SDK 演示
//!
//! 连接本地开发服务端，打开收件箱并打印事件流。
//!
//! ```bash
//! cargo run --example demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use amora_sdk::{
    AmoraConfig, AmoraSDK, HttpConfig, HttpRestApi, InboxFilter, MemoryRealtimeChannel, Scope,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let data_dir = std::env::temp_dir().join("amora-demo");
    let config = AmoraConfig::builder()
        .data_dir(&data_dir)
        .user_id("demo-user")
        .build()?;

    let rest = Arc::new(HttpRestApi::new(&HttpConfig::new("http://localhost:9080"))?);
    let channel = MemoryRealtimeChannel::new(256);

    let sdk = AmoraSDK::initialize(config, rest, channel.clone()).await?;

    // 订阅事件流
    let mut events = sdk.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[event] {}", event.event_type());
        }
    });

    // 打开收件箱：有缓存时立即可见，网络刷新随后覆盖
    sdk.open_inbox().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    match sdk.inbox(&InboxFilter::default()).await {
        Some(feed) => {
            println!("收件箱会话数: {}", feed.len());
            for item in &feed {
                println!("  {} - {}", item.counterpart.display_name, sdk.preview_text(item));
            }
        }
        None => println!("收件箱尚未激活"),
    }

    // 模拟服务端推送一条对方正在输入
    channel.push(amora_sdk::RealtimeEvent::TypingStart {
        conversation_id: "conv-1".to_string(),
        user_id: "user-2".to_string(),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!(
        "conv-1 正在输入: {:?}",
        sdk.typing_users(&Scope::Direct("conv-1".to_string())).await
    );

    tokio::time::sleep(Duration::from_secs(2)).await;

    sdk.shutdown().await?;
    printer.abort();
    Ok(())
}
