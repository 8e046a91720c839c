use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use tokio::fs::{self, File};
use tracing::{error, info, instrument};

/// 按卷打包的结果。某一卷失败不影响其他卷
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VolumePackaging {
    pub written: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// 把下载好的图片打成压缩包
#[allow(async_fn_in_trait)]
pub trait Archiver {
    /// `files` 按页码顺序排列
    async fn package_chapter(&self, dir: &Path, files: &[PathBuf]) -> Result<PathBuf>;

    async fn package_volumes(
        &self,
        base_dir: &Path,
        volumes: &BTreeMap<String, Vec<PathBuf>>,
        delete_after: bool,
    ) -> VolumePackaging;
}

#[derive(Default, Clone, Copy)]
pub struct CbzArchiver;

impl CbzArchiver {
    pub fn new() -> Self {
        Self
    }

    /// 包内文件名带上序号，阅读器按名字排序时页序不乱
    fn entry_name(index: usize, file: &Path) -> String {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{:04}_{}", index + 1, name)
    }

    async fn write_cbz(cbz_path: &Path, files: &[PathBuf]) -> Result<()> {
        let file = File::create(cbz_path).await?;
        let mut writer = ZipFileWriter::with_tokio(file);

        for (index, image) in files.iter().enumerate() {
            let content = fs::read(image).await?;
            // 图片本身已压缩，直接存储
            let name = Self::entry_name(index, image);
            let entry = ZipEntryBuilder::new(name.as_str().into(), Compression::Stored);
            writer.write_entry_whole(entry, &content).await?;
        }

        writer.close().await?;
        Ok(())
    }
}

impl Archiver for CbzArchiver {
    #[instrument(skip_all)]
    async fn package_chapter(&self, dir: &Path, files: &[PathBuf]) -> Result<PathBuf> {
        let Some(name) = dir.file_name() else {
            anyhow::bail!("无效的章节目录: {}", dir.display());
        };
        // 目录名里可能带点号，不能用 with_extension
        let cbz_path = dir.with_file_name(format!("{}.cbz", name.to_string_lossy()));

        info!("正在生成章节 CBZ: {}", cbz_path.display());
        Self::write_cbz(&cbz_path, files).await?;
        Ok(cbz_path)
    }

    #[instrument(skip_all)]
    async fn package_volumes(
        &self,
        base_dir: &Path,
        volumes: &BTreeMap<String, Vec<PathBuf>>,
        delete_after: bool,
    ) -> VolumePackaging {
        let mut packaging = VolumePackaging::default();

        for (volume, files) in volumes {
            if files.is_empty() {
                continue;
            }
            let cbz_path = base_dir.join(format!("{}.cbz", volume));
            info!("正在生成卷 CBZ: {}", cbz_path.display());
            if let Err(e) = Self::write_cbz(&cbz_path, files).await {
                error!("生成卷 CBZ 失败: {}: {}", cbz_path.display(), e);
                packaging
                    .errors
                    .push(format!("打包卷 {} 失败: {}", volume, e));
                // 不留下写了一半的压缩包
                if let Err(e) = fs::remove_file(&cbz_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        packaging
                            .errors
                            .push(format!("删除不完整的 {} 失败: {}", cbz_path.display(), e));
                    }
                }
                continue;
            }
            packaging.written.push(cbz_path);

            if delete_after {
                let mut dirs: Vec<&Path> = Vec::new();
                for dir in files.iter().filter_map(|f| f.parent()) {
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
                for dir in dirs {
                    match fs::remove_dir_all(dir).await {
                        Ok(_) => info!("已删除: {}", dir.display()),
                        Err(e) => {
                            error!("删除章节目录时出错: {}: {}", dir.display(), e);
                            packaging
                                .errors
                                .push(format!("删除章节目录失败 {}: {}", dir.display(), e));
                        }
                    }
                }
            }
        }

        packaging
    }
}


#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn entry_names(cbz: &Path) -> Vec<String> {
        // 按中央目录记录读取文件名
        let mut raw = Vec::new();
        std::fs::File::open(cbz).unwrap().read_to_end(&mut raw).unwrap();
        let mut names = Vec::new();
        let mut i = 0;
        while i + 46 <= raw.len() {
            if raw[i..i + 4] == [0x50, 0x4b, 0x01, 0x02] {
                let len = u16::from_le_bytes([raw[i + 28], raw[i + 29]]) as usize;
                names.push(String::from_utf8_lossy(&raw[i + 46..i + 46 + len]).to_string());
                i += 46 + len;
            } else {
                i += 1;
            }
        }
        names
    }

    fn write_pages(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        std::fs::create_dir_all(dir).unwrap();
        names
            .iter()
            .map(|n| {
                let p = dir.join(n);
                std::fs::write(&p, n.as_bytes()).unwrap();
                p
            })
            .collect()
    }

    #[tokio::test]
    async fn chapter_cbz_keeps_page_order() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("vol1").join("001 Начало");
        let files = write_pages(&dir, &["b.jpg", "a.jpg", "c.png"]);

        let cbz = CbzArchiver::new().package_chapter(&dir, &files).await.unwrap();

        assert_eq!(cbz, root.path().join("vol1").join("001 Начало.cbz"));
        assert_eq!(entry_names(&cbz), vec!["0001_b.jpg", "0002_a.jpg", "0003_c.png"]);
    }

    #[tokio::test]
    async fn volume_cbz_and_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let mut files = write_pages(&root.path().join("vol1/001"), &["1.jpg"]);
        files.extend(write_pages(&root.path().join("vol1/002"), &["1.jpg", "2.jpg"]));

        let mut volumes = BTreeMap::new();
        volumes.insert("vol1".to_string(), files);
        volumes.insert("vol2".to_string(), Vec::new());

        let packaging = CbzArchiver::new()
            .package_volumes(root.path(), &volumes, true)
            .await;

        assert!(packaging.errors.is_empty());
        assert_eq!(packaging.written, vec![root.path().join("vol1.cbz")]);
        assert_eq!(
            entry_names(&packaging.written[0]),
            vec!["0001_1.jpg", "0002_1.jpg", "0003_2.jpg"]
        );
        assert!(!root.path().join("vol1/001").exists());
        assert!(!root.path().join("vol1/002").exists());
    }

    #[tokio::test]
    async fn failed_volume_does_not_stop_later_volumes() {
        let root = tempfile::tempdir().unwrap();
        let vol2 = write_pages(&root.path().join("vol2/003"), &["1.jpg"]);

        let mut volumes = BTreeMap::new();
        volumes.insert(
            "vol1".to_string(),
            vec![root.path().join("vol1/001/missing.jpg")],
        );
        volumes.insert("vol2".to_string(), vol2);

        let packaging = CbzArchiver::new()
            .package_volumes(root.path(), &volumes, true)
            .await;

        assert_eq!(packaging.written, vec![root.path().join("vol2.cbz")]);
        assert_eq!(packaging.errors.len(), 1);
        assert!(packaging.errors[0].contains("vol1"));
        assert!(!root.path().join("vol1.cbz").exists());
        assert!(!root.path().join("vol2/003").exists());
    }
}
