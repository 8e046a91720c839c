use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleInfo {
    pub title_orig: String,
    pub title_ru: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    /// 形如 `vol1/12` 的相对路径
    pub path: String,
    pub title: String,
}

impl ChapterEntry {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
        }
    }

    /// 卷名取路径的第一段
    pub fn volume(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translator {
    pub id: String,
    pub name: String,
}

/// 站点页面中内嵌的镜像服务器
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MirrorServer {
    pub path: String,
    #[serde(default)]
    pub res: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    All,
    Chapters(Vec<String>),
}

impl SelectionMode {
    /// 解析章节列表，支持 `["vol1/1","vol1/2"]` 与空白分隔两种写法
    pub fn parse_chapters(raw: &str) -> Self {
        let chapters: Vec<String> = raw
            .trim()
            .trim_matches(|c| c == '[' || c == ']')
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|s| s.trim_matches(|c| c == '"' || c == '\''))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        if chapters.is_empty() {
            SelectionMode::All
        } else {
            SelectionMode::Chapters(chapters)
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub manga_url: String,
    pub mode: SelectionMode,
    pub pref_translator: Option<String>,
    pub mtr: bool,
    pub chapter_archive: bool,
    pub volume_archive: bool,
    pub delete_after: bool,
    /// 相对于配置中 save_path 的目录，为空时使用作品原名
    pub save_path: PathBuf,
}

impl DownloadRequest {
    pub fn new(manga_url: impl Into<String>) -> Self {
        Self {
            manga_url: manga_url.into(),
            mode: SelectionMode::All,
            pref_translator: None,
            mtr: false,
            chapter_archive: false,
            volume_archive: false,
            delete_after: false,
            save_path: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterResult {
    pub path: String,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}
