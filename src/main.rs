use std::time::Instant;

use anyhow::Result;
use tracing::error;

use readmanga_fetch::utils::{confirm, display_elapsed_time, prompt};
use readmanga_fetch::{
    CbzArchiver, Config, DownloadRequest, Downloader, JsonHistory, ReadmangaCrawler,
    SelectionMode, TracingSink, logger,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logger::init(&config.log_level);

    let history = JsonHistory::new(&config.save_path);
    let fetcher = Downloader::new(&config)?;
    let crawler = ReadmangaCrawler::new(config, fetcher, CbzArchiver::new(), history);

    loop {
        println!("\n=== readmanga-fetch ===");
        let manga_url = prompt("请输入作品地址: ")?;
        if manga_url.is_empty() {
            continue;
        }

        let catalog = match crawler.catalog(&manga_url).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("获取作品信息失败: {}", e);
                if !confirm("\n是否继续下载其他作品?")? {
                    break;
                }
                continue;
            }
        };
        println!(
            "{} / {}，共 {} 章",
            catalog.info.title_ru,
            catalog.info.title_orig,
            catalog.chapters.len()
        );
        for translator in &catalog.translators {
            println!("  翻译组 [{}] {}", translator.id, translator.name);
        }

        let mut request = DownloadRequest::new(manga_url);
        request.mode =
            SelectionMode::parse_chapters(&prompt("要下载的章节（空格分隔，留空下载全部）: ")?);
        let translator = prompt("翻译组 ID（留空跳过）: ")?;
        request.pref_translator = (!translator.is_empty()).then_some(translator);
        request.mtr = catalog.machine_translated;
        request.chapter_archive = confirm("为每章生成 CBZ?")?;
        request.volume_archive = confirm("为每卷生成 CBZ?")?;
        if request.chapter_archive || request.volume_archive {
            request.delete_after = confirm("打包后删除图片?")?;
        }

        let start = Instant::now();
        match crawler.download(&request, &TracingSink).await {
            Ok(_) => display_elapsed_time(start.elapsed()),
            Err(e) => error!("下载失败: {}", e),
        }

        if !confirm("\n是否继续下载其他作品?")? {
            break;
        }
    }

    println!("程序结束。");
    Ok(())
}
