use std::collections::HashSet;

use scraper::Html;
use tracing::{debug, info, instrument};

use super::downloader::{FetchFailure, PageFetcher};
use super::parser;
use crate::config::Markup;
use crate::models::{ChapterEntry, TitleInfo, Translator};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub info: TitleInfo,
    /// 旧 -> 新
    pub chapters: Vec<ChapterEntry>,
    pub translators: Vec<Translator>,
    pub machine_translated: bool,
}

impl Catalog {
    pub fn title_of(&self, path: &str) -> Option<&str> {
        self.chapters
            .iter()
            .find(|c| c.path == path)
            .map(|c| c.title.as_str())
    }
}

pub struct CatalogResolver<'a, F: PageFetcher> {
    fetcher: &'a F,
    markup: &'a Markup,
}

impl<'a, F: PageFetcher> CatalogResolver<'a, F> {
    pub fn new(fetcher: &'a F, markup: &'a Markup) -> Self {
        Self { fetcher, markup }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, manga_url: &str) -> Result<Catalog, FetchFailure> {
        let html = self.fetcher.page(manga_url).await?;
        let catalog = self.parse(&html);
        info!(
            "章节 {} 个, 翻译组 {} 个",
            catalog.chapters.len(),
            catalog.translators.len()
        );
        Ok(catalog)
    }

    pub fn parse(&self, html: &str) -> Catalog {
        let document = Html::parse_document(html);

        // 页面上最新的章节在前
        let mut seen = HashSet::new();
        let chapters: Vec<ChapterEntry> = parser::chapter_links(&document, self.markup)
            .into_iter()
            .rev()
            .filter(|c| seen.insert(c.path.clone()))
            .collect();
        debug!("章节列表: {:?}", chapters);

        Catalog {
            info: parser::title_info(&document, self.markup),
            chapters,
            translators: parser::translators(&document, self.markup),
            machine_translated: parser::is_machine_translated(&document, self.markup),
        }
    }
}
