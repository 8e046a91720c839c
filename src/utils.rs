use std::io::{self, Write};

use anyhow::Result;
use tracing::{debug, info, instrument};

pub fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    debug!("用户输入: {}", input.trim());
    Ok(input.trim().to_owned())
}

pub fn confirm(message: &str) -> Result<bool> {
    let answer = prompt(&format!("{} (y/n): ", message))?;
    Ok(answer.eq_ignore_ascii_case("y"))
}

/// 替换文件系统不允许的字符
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_end_matches('.')
        .to_string()
}

#[instrument]
pub fn display_elapsed_time(duration: std::time::Duration) {
    let total_ms = duration.as_millis();

    if total_ms >= 60000 {
        let mins = total_ms / 60000;
        let secs = (total_ms % 60000) / 1000;
        info!("✅ 下载完成！耗时: {}分{}秒", mins, secs);
    } else if total_ms >= 1000 {
        let secs = total_ms / 1000;
        let ms_remaining = total_ms % 1000;

        if ms_remaining > 0 {
            info!("✅ 下载完成！耗时: {}秒{}毫秒", secs, ms_remaining);
        } else {
            info!("✅ 下载完成！耗时: {}秒", secs);
        }
    } else {
        info!("✅ 下载完成！耗时: {}毫秒", total_ms);
    }
}
