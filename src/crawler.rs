pub mod catalog;
pub mod chapter;
pub mod downloader;
pub mod fetcher;
pub mod mirror;
pub mod parser;
pub mod processor;
#[cfg(test)]
pub mod testing;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, instrument};

pub use catalog::{Catalog, CatalogResolver};
pub use chapter::{ChapterError, ChapterResolver};
pub use downloader::{Downloader, FetchFailure, PageFetcher};
pub use fetcher::{ImageError, ImageFetcher};
pub use processor::Processor;

use crate::archive::Archiver;
use crate::config::Config;
use crate::events::{EventSink, Severity};
use crate::history::{self, HistoryStore};
use crate::models::{ChapterEntry, ChapterResult, DownloadRequest, SelectionMode};
use crate::utils::safe_file_name;

static AUTH_MESSAGE: &str = "下载这部作品需要先在网站上登录！";
static COMPLETE_MESSAGE: &str = "下载完成！";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Listing,
    Chapter(usize),
    Archiving,
    Complete,
    Aborted,
}

#[derive(Debug)]
pub struct JobReport {
    pub state: JobState,
    pub job_dir: PathBuf,
    pub chapters: Vec<ChapterResult>,
    /// 已尝试下载的章节，与单页成败无关
    pub attempted: Vec<String>,
    pub volumes: BTreeMap<String, Vec<PathBuf>>,
}

impl JobReport {
    fn new() -> Self {
        Self {
            state: JobState::Pending,
            job_dir: PathBuf::new(),
            chapters: Vec::new(),
            attempted: Vec::new(),
            volumes: BTreeMap::new(),
        }
    }

    fn enter(&mut self, state: JobState) {
        debug!("任务状态: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

pub struct ReadmangaCrawler<F: PageFetcher, A: Archiver, H: HistoryStore> {
    config: Config,
    fetcher: F,
    archiver: A,
    history: H,
}

impl<F: PageFetcher, A: Archiver, H: HistoryStore> ReadmangaCrawler<F, A, H> {
    pub fn new(config: Config, fetcher: F, archiver: A, history: H) -> Self {
        Self {
            config,
            fetcher,
            archiver,
            history,
        }
    }

    pub async fn catalog(&self, manga_url: &str) -> Result<Catalog, FetchFailure> {
        CatalogResolver::new(&self.fetcher, &self.config.markup)
            .resolve(manga_url)
            .await
    }

    /// 按顺序逐章下载。遇到登录限制时整个任务中止，其余章节错误只记录。
    #[instrument(skip_all, fields(url = %request.manga_url))]
    pub async fn download(
        &self,
        request: &DownloadRequest,
        events: &dyn EventSink,
    ) -> Result<JobReport> {
        let mut report = JobReport::new();

        report.enter(JobState::Listing);
        let catalog = self.catalog(&request.manga_url).await.inspect_err(|e| {
            events.log(Severity::Err, &format!("获取章节列表失败: {}", e));
        })?;
        let chapters = select_chapters(&request.mode, &catalog);
        report.job_dir = self.job_dir(request, &catalog);

        let total = chapters.len();
        events.init_progress(total);

        let resolver =
            ChapterResolver::new(&self.fetcher, &self.archiver, &self.config, events);

        for (index, chapter) in chapters.iter().enumerate() {
            report.enter(JobState::Chapter(index));

            match resolver.resolve(request, &report.job_dir, chapter).await {
                Ok(result) => {
                    report
                        .volumes
                        .entry(chapter.volume().to_string())
                        .or_default()
                        .extend(result.files.iter().cloned());
                    report.chapters.push(result);
                }
                Err(ChapterError::AuthRequired) => {
                    events.auth_required(AUTH_MESSAGE);
                    self.record_history(request, &report.attempted, events).await;
                    report.enter(JobState::Aborted);
                    return Ok(report);
                }
                Err(e) => {
                    events.log(Severity::Err, &format!("-- 下载章节失败: {}", e));
                }
            }

            report.attempted.push(chapter.path.clone());
            tokio::time::sleep(self.config.chapter_delay()).await;
            events.update_progress(index + 1, total);
        }

        if request.volume_archive {
            report.enter(JobState::Archiving);
            events.log(Severity::Std, "打包卷 CBZ");
            let packaging = self
                .archiver
                .package_volumes(&report.job_dir, &report.volumes, request.delete_after)
                .await;
            for error in &packaging.errors {
                events.log(Severity::Err, &format!("-- {}", error));
            }
        }

        self.record_history(request, &report.attempted, events).await;

        report.enter(JobState::Complete);
        events.complete(COMPLETE_MESSAGE);
        Ok(report)
    }

    async fn record_history(
        &self,
        request: &DownloadRequest,
        chapters: &[String],
        events: &dyn EventSink,
    ) {
        let id = history::title_id(&request.manga_url);
        if let Err(e) = self.history.record(&id, chapters).await {
            events.log(Severity::Err, &format!("保存历史记录失败: {}", e));
        }
    }

    fn job_dir(&self, request: &DownloadRequest, catalog: &Catalog) -> PathBuf {
        if !request.save_path.as_os_str().is_empty() {
            return self.config.save_path.join(&request.save_path);
        }
        let title = safe_file_name(&catalog.info.title_orig);
        if title.is_empty() {
            self.config
                .save_path
                .join(history::title_id(&request.manga_url)[..16].to_string())
        } else {
            self.config.save_path.join(title)
        }
    }
}

/// 指定章节时从完整目录里补上标题，保持请求中的顺序
fn select_chapters(mode: &SelectionMode, catalog: &Catalog) -> Vec<ChapterEntry> {
    match mode {
        SelectionMode::All => catalog.chapters.clone(),
        SelectionMode::Chapters(paths) => paths
            .iter()
            .map(|path| ChapterEntry {
                path: path.clone(),
                title: catalog.title_of(path).unwrap_or_default().to_string(),
            })
            .collect(),
    }
}
