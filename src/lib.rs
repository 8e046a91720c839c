pub mod archive;
pub mod config;
pub mod crawler;
pub mod events;
pub mod history;
pub mod logger;
pub mod models;
pub mod utils;

pub use archive::{Archiver, CbzArchiver};
pub use config::Config;
pub use crawler::{Downloader, ReadmangaCrawler};
pub use events::{ChannelSink, Event, EventSink, TracingSink};
pub use history::{HistoryStore, JsonHistory};
pub use models::{DownloadRequest, SelectionMode};
