use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use scraper::Selector;
use serde::{Deserialize, Deserializer};

static CONFIG_FILE: &str = "config";
static ENV_PREFIX: &str = "READMANGA";

#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,
    /// 每张图片之间的等待时间（毫秒）
    #[serde(default = "default_timeout_image")]
    pub timeout_image: u64,
    /// 每章之间的等待时间（毫秒）
    #[serde(default = "default_timeout_chapter")]
    pub timeout_chapter: u64,
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub markup: Markup,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            save_path: default_save_path(),
            timeout_image: default_timeout_image(),
            timeout_chapter: default_timeout_chapter(),
            max_retry: default_max_retry(),
            log_level: default_log_level(),
            markup: Markup::default(),
        }
    }
}

impl Config {
    /// 读取 config.toml（可选）并叠加 READMANGA__ 前缀的环境变量
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(
                config::File::with_name(CONFIG_FILE)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("配置文件反序列化失败: {}", e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("配置反序列化失败: {}", e))
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.timeout_image)
    }

    pub fn chapter_delay(&self) -> Duration {
        Duration::from_millis(self.timeout_chapter)
    }
}

/// 站点模板中用到的选择器，两种模板（readmanga / mintmanga）共用一套
#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct Markup {
    #[serde(deserialize_with = "deserialize_selector")]
    pub original_name: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub eng_name: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub name: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub chapter_link: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub mtr_banner: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub auth_alert: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub translator_option: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub translator_item: Selector,
    #[serde(deserialize_with = "deserialize_selector")]
    pub translator_item_name: Selector,
}

impl Default for Markup {
    fn default() -> Self {
        Self {
            original_name: selector(".original-name"),
            eng_name: selector(".eng-name"),
            name: selector(".name"),
            chapter_link: selector(".chapters a.chapter-link"),
            mtr_banner: selector(".mtr-message"),
            auth_alert: selector(".auth-page .alert"),
            translator_option: selector("#translation > option"),
            translator_item: selector(".translator-selection-item"),
            translator_item_name: selector(".translator-selection-name"),
        }
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("内置选择器无效")
}

fn deserialize_selector<'de, D>(deserializer: D) -> Result<Selector, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Selector::parse(&s).map_err(|e| serde::de::Error::custom(format!("Invalid selector: {}", e)))
}

fn default_user_agent() -> String {
    ua_generator::ua::spoof_ua().to_string()
}

fn default_save_path() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_timeout_image() -> u64 {
    500
}

fn default_timeout_chapter() -> u64 {
    1000
}

fn default_max_retry() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_falls_back_to_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.timeout_image, 500);
        assert_eq!(config.timeout_chapter, 1000);
        assert_eq!(config.save_path, PathBuf::from("downloads"));
        assert!(!config.user_agent.is_empty());
    }

    #[test]
    fn overrides_delays_and_selectors() {
        let config = Config::from_toml(
            r#"
            timeout_image = 0
            timeout_chapter = 10
            save_path = "/tmp/manga"

            [markup]
            auth_alert = ".login-required"
            "#,
        )
        .unwrap();
        assert_eq!(config.image_delay(), Duration::ZERO);
        assert_eq!(config.chapter_delay(), Duration::from_millis(10));
        assert_eq!(config.save_path, PathBuf::from("/tmp/manga"));

        let html = scraper::Html::parse_document(
            r#"<div class="login-required">x</div><div class="chapters"></div>"#,
        );
        assert_eq!(html.select(&config.markup.auth_alert).count(), 1);
        // 未覆盖的选择器保持默认
        assert_eq!(html.select(&config.markup.mtr_banner).count(), 0);
    }

    #[test]
    fn invalid_selector_is_rejected() {
        let result = Config::from_toml(
            r#"
            [markup]
            chapter_link = "a[["
            "#,
        );
        assert!(result.is_err());
    }
}
