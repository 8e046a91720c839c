use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, instrument};
use url::Url;

static DEFAULT_EXTENSION: &str = "jpg";

#[derive(Clone, Copy, Default)]
pub struct Processor;

impl Processor {
    fn last_segment(url: &Url) -> Option<&str> {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
    }

    /// 取地址最后一段作为文件名，拿不到时用地址哈希
    pub fn file_name(url: &Url) -> String {
        match Self::last_segment(url) {
            Some(name) => name.to_string(),
            None => Self::hashed_name(url),
        }
    }

    /// 地址哈希加原扩展名
    pub fn hashed_name(url: &Url) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        let extension = Self::last_segment(url)
            .and_then(|name| Path::new(name).extension())
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        format!("{}.{}", &hash[..16], extension)
    }

    /// 不同页面的地址最后一段可能相同，已占用的路径改用哈希名
    pub fn image_path(url: &Url, dir: &Path, taken: &[PathBuf]) -> PathBuf {
        let path = dir.join(Self::file_name(url));
        if !taken.contains(&path) {
            return path;
        }

        let hashed = Self::hashed_name(url);
        let mut path = dir.join(&hashed);
        let mut n = 1;
        while taken.contains(&path) {
            path = dir.join(format!("{}_{}", n, hashed));
            n += 1;
        }
        path
    }

    #[instrument(skip_all)]
    pub async fn write_image(
        &self,
        image_bytes: Bytes,
        url: &Url,
        dir: &Path,
        taken: &[PathBuf],
    ) -> std::io::Result<PathBuf> {
        let image_path = Self::image_path(url, dir, taken);
        fs::write(&image_path, &image_bytes).await?;
        debug!("图片已保存到: {}", image_path.display());
        Ok(image_path)
    }
}
