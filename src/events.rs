use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Std,
    Err,
}

/// 推送给界面的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Event {
    InitProgress { max: usize },
    UpdateProgress { current: usize, percent: u8 },
    UpdateLog { severity: Severity, text: String },
    AuthErr { text: String },
    DownloadComplete { text: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);

    fn init_progress(&self, max: usize) {
        self.emit(Event::InitProgress { max });
    }

    fn update_progress(&self, current: usize, total: usize) {
        self.emit(Event::UpdateProgress {
            current,
            percent: percent(current, total),
        });
    }

    fn log(&self, severity: Severity, text: &str) {
        self.emit(Event::UpdateLog {
            severity,
            text: text.to_owned(),
        });
    }

    fn auth_required(&self, text: &str) {
        self.emit(Event::AuthErr {
            text: text.to_owned(),
        });
    }

    fn complete(&self, text: &str) {
        self.emit(Event::DownloadComplete {
            text: text.to_owned(),
        });
    }
}

pub fn percent(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (current.min(total) * 100 / total) as u8
}

/// 命令行下直接把事件写进日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        match event {
            Event::InitProgress { max } => info!("共 {} 章", max),
            Event::UpdateProgress { current, percent } => {
                info!("进度: {} 章 ({}%)", current, percent)
            }
            Event::UpdateLog {
                severity: Severity::Std,
                text,
            } => info!("{}", text),
            Event::UpdateLog {
                severity: Severity::Err,
                text,
            } => error!("{}", text),
            Event::AuthErr { text } => warn!("{}", text),
            Event::DownloadComplete { text } => info!("✅ {}", text),
        }
    }
}

/// 通过通道把事件交给界面（例如 websocket 推送）
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        // 接收端已关闭时事件只能落到日志里
        if let Err(e) = self.tx.send(event) {
            warn!("事件通道已关闭: {:?}", e.0);
        }
    }
}
