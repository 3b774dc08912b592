//! 文件名过滤器

use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;

/// 默认包含模式：可加载的源文件和清单文件
pub const DEFAULT_INCLUDE: &str = r"\.(rs|toml|json)$";

/// 默认排除模式：仅声明文件（如 `foo.d.toml`）
pub const DEFAULT_EXCLUDE: &str = r"\.d\.(rs|toml|json)$";

static DEFAULT_INCLUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(DEFAULT_INCLUDE).expect("constant pattern"));
static DEFAULT_EXCLUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(DEFAULT_EXCLUDE).expect("constant pattern"));

/// 区分可加载文件的文件名过滤器
#[derive(Debug, Clone)]
pub struct NameFilter {
    include: Regex,
    exclude: Option<Regex>,
}

impl NameFilter {
    /// 从包含/排除模式创建过滤器
    pub fn new(include: &str, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: Regex::new(include)?,
            exclude: exclude.map(Regex::new).transpose()?,
        })
    }

    /// 文件名是否可加载
    pub fn matches(&self, file_name: &str) -> bool {
        self.include.is_match(file_name)
            && !self
                .exclude
                .as_ref()
                .map(|exclude| exclude.is_match(file_name))
                .unwrap_or(false)
    }

    /// 去掉包含模式匹配到的部分，得到 Piece 的默认名称（小写）
    pub fn strip(&self, file_name: &str) -> String {
        self.include.replace(file_name, "").to_lowercase()
    }

    pub fn include(&self) -> &str {
        self.include.as_str()
    }

    pub fn exclude(&self) -> Option<&str> {
        self.exclude.as_ref().map(Regex::as_str)
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        Self {
            include: DEFAULT_INCLUDE_RE.clone(),
            exclude: Some(DEFAULT_EXCLUDE_RE.clone()),
        }
    }
}
