use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, instrument, warn};

use crate::config::Markup;
use crate::models::{ChapterEntry, MirrorServer, TitleInfo, Translator};

static READER_INIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rm_h\.readerDoInit\(\[\[(.+)\]\],\s(false|true),\s(\[.+\]).+\);")
        .expect("readerDoInit 正则无效")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EmbeddedDataError {
    #[error("页面中没有 readerDoInit 数据")]
    Missing,
    #[error("第 {0} 页的数据格式不正确")]
    MalformedPage(usize),
    #[error("页面列表为空")]
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterPages {
    pub images: Vec<String>,
    pub servers: Vec<MirrorServer>,
    /// 镜像列表无法解析时的原因，此时 `servers` 为空，不能换源
    pub servers_error: Option<String>,
}

/// 从章节页面的 `rm_h.readerDoInit(...)` 调用里取出图片地址和镜像服务器
#[instrument(skip_all)]
pub fn chapter_pages(html: &str) -> Result<ChapterPages, EmbeddedDataError> {
    let caps = READER_INIT
        .captures(html)
        .ok_or(EmbeddedDataError::Missing)?;
    let (Some(pages), Some(servers)) = (caps.get(1), caps.get(3)) else {
        return Err(EmbeddedDataError::Missing);
    };

    let mut images = Vec::new();
    for (index, triple) in pages
        .as_str()
        .trim_matches(|c| c == '[' || c == ']')
        .split("],[")
        .enumerate()
    {
        let parts: Vec<&str> = triple.split(',').collect();
        if parts.len() < 3 {
            return Err(EmbeddedDataError::MalformedPage(index + 1));
        }
        let url = format!("{}{}", unquote(parts[0]), unquote(parts[2]));
        if url.is_empty() {
            return Err(EmbeddedDataError::MalformedPage(index + 1));
        }
        images.push(url);
    }
    if images.is_empty() {
        return Err(EmbeddedDataError::Empty);
    }

    let (servers, servers_error) =
        match serde_json::from_str::<Vec<MirrorServer>>(servers.as_str()) {
            Ok(servers) => (servers, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

    debug!("解析到 {} 页, {} 个镜像", images.len(), servers.len());
    Ok(ChapterPages {
        images,
        servers,
        servers_error,
    })
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'')
}

pub fn is_auth_wall(document: &Html, markup: &Markup) -> bool {
    document
        .select(&markup.auth_alert)
        .any(|e| !e.text().collect::<String>().trim().is_empty())
}

fn text_of(document: &Html, selector: &scraper::Selector) -> String {
    document
        .select(selector)
        .map(|e| e.text().collect::<String>())
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn title_info(document: &Html, markup: &Markup) -> TitleInfo {
    let name = text_of(document, &markup.name);
    let mut title_orig = text_of(document, &markup.original_name);
    if title_orig.is_empty() {
        title_orig = text_of(document, &markup.eng_name);
    }
    if title_orig.is_empty() {
        title_orig = name.clone();
    }
    TitleInfo {
        title_orig,
        title_ru: name,
    }
}

pub fn is_machine_translated(document: &Html, markup: &Markup) -> bool {
    document.select(&markup.mtr_banner).next().is_some()
}

/// 按页面顺序（新→旧）提取章节
pub fn chapter_links(document: &Html, markup: &Markup) -> Vec<ChapterEntry> {
    let mut chapters = Vec::new();
    for link in document.select(&markup.chapter_link) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(path) = chapter_path(href) else {
            warn!("无法识别的章节链接: {}", href);
            continue;
        };
        let title = link.text().collect::<String>();
        chapters.push(ChapterEntry {
            path,
            title: title.trim_matches(|c| c == '\n' || c == ' ').to_string(),
        });
    }
    chapters
}

/// `/manga_name/vol1/12?mtr=1` -> `vol1/12`
fn chapter_path(href: &str) -> Option<String> {
    let segments: Vec<&str> = href.trim_matches('/').split('/').collect();
    if segments.len() < 3 {
        return None;
    }
    let chapter = segments[2].split('?').next().unwrap_or_default();
    if segments[1].is_empty() || chapter.is_empty() {
        return None;
    }
    Some(format!("{}/{}", segments[1], chapter))
}

pub fn translators(document: &Html, markup: &Markup) -> Vec<Translator> {
    let mut translators = Vec::new();

    // readmanga: <select id="translation"><option value=..>
    for option in document.select(&markup.translator_option) {
        translators.push(Translator {
            id: option.value().attr("value").unwrap_or_default().to_string(),
            name: option.text().collect::<String>().trim().to_string(),
        });
    }

    // mintmanga: <div class="translator-selection-item" id="tr-123">
    for item in document.select(&markup.translator_item) {
        let id = item.value().attr("id").unwrap_or_default();
        translators.push(Translator {
            id: id.strip_prefix("tr-").unwrap_or(id).to_string(),
            name: item_name(item, markup),
        });
    }

    translators
}

fn item_name(item: ElementRef, markup: &Markup) -> String {
    item.select(&markup.translator_item_name)
        .map(|e| e.text().collect::<String>())
        .collect::<String>()
        .trim()
        .to_string()
}
