use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// RUST_LOG 优先，否则使用配置里的级别
pub fn init(default_level: &str) {
    let tracing_subscriber = tracing_subscriber::registry();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_target(false);
    // 重复初始化（例如测试里）直接忽略
    let _ = tracing_subscriber.with(filter).with(fmt).try_init();
}
