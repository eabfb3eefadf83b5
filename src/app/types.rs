use std::fmt;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://www.shl.com";
pub const DEFAULT_LISTING_PATH: &str = "/solutions/products/product-catalog/";
pub const DEFAULT_PAGE_COUNT: usize = 32;
pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 5;
pub const MAX_FETCH_CONCURRENCY: usize = 64;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MODEL_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "assessment-scout",
    version,
    about = "Scrape an assessment catalog and recommend products for a job description"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Walk the catalog, enrich every product and write the dataset
    Scrape(ScrapeArgs),
    /// Ask the completion model for assessments matching a query or job posting URL
    Recommend(RecommendArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ScrapeArgs {
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Csv)]
    pub format: FileFormatArg,

    #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, value_name = "PATH", default_value = DEFAULT_LISTING_PATH)]
    pub listing_path: String,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_PAGE_COUNT)]
    pub pages: usize,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_FETCH_CONCURRENCY)]
    pub fetch_concurrency: usize,

    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RecommendArgs {
    #[arg(long, value_name = "FILE")]
    pub catalog: String,

    #[arg(long, value_name = "TEXT", required_unless_present = "url")]
    pub query: Option<String>,

    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, value_name = "URL", default_value = DEFAULT_MODEL_ENDPOINT)]
    pub model_endpoint: String,

    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum FileFormatArg {
    Csv,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub listing_path: String,
    pub pages: usize,
    pub page_size: usize,
    pub fetch_concurrency: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            listing_path: DEFAULT_LISTING_PATH.to_string(),
            pages: DEFAULT_PAGE_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&ScrapeArgs> for ScrapeConfig {
    fn from(args: &ScrapeArgs) -> Self {
        Self {
            base_url: args.base_url.clone(),
            listing_path: args.listing_path.clone(),
            pages: args.pages,
            page_size: args.page_size.max(1),
            fetch_concurrency: sanitize_fetch_concurrency(args.fetch_concurrency),
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            user_agent: args
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

pub fn sanitize_fetch_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_FETCH_CONCURRENCY)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Support {
    Yes,
    No,
    #[default]
    Unknown,
}

impl Support {
    pub fn as_str(self) -> &'static str {
        match self {
            Support::Yes => "Yes",
            Support::No => "No",
            Support::Unknown => "Unknown",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Yes" => Support::Yes,
            "No" => Support::No,
            _ => Support::Unknown,
        }
    }
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStub {
    pub name: String,
    pub url: String,
}

pub const NO_DESCRIPTION: &str = "No description available";
pub const DURATION_VARIES: &str = "Varies";
pub const UNKNOWN: &str = "Unknown";
pub const FETCH_FAILED_DESCRIPTION: &str = "Error retrieving details";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedDetail {
    pub description: String,
    pub duration: String,
    pub test_type: String,
    pub remote_support: Support,
    pub adaptive_support: Support,
}

impl EnrichedDetail {
    pub fn sentinel() -> Self {
        Self {
            description: FETCH_FAILED_DESCRIPTION.to_string(),
            duration: UNKNOWN.to_string(),
            test_type: UNKNOWN.to_string(),
            remote_support: Support::Unknown,
            adaptive_support: Support::Unknown,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub name: String,
    pub url: String,
    pub description: String,
    pub duration: String,
    pub test_type: String,
    pub remote_support: Support,
    pub adaptive_support: Support,
}

impl CatalogRecord {
    pub fn merge(stub: CatalogStub, detail: EnrichedDetail) -> Self {
        Self {
            name: stub.name,
            url: stub.url,
            description: detail.description,
            duration: detail.duration,
            test_type: detail.test_type,
            remote_support: detail.remote_support,
            adaptive_support: detail.adaptive_support,
        }
    }

    pub fn detail(&self) -> EnrichedDetail {
        EnrichedDetail {
            description: self.description.clone(),
            duration: self.duration.clone(),
            test_type: self.test_type.clone(),
            remote_support: self.remote_support,
            adaptive_support: self.adaptive_support,
        }
    }

    pub fn is_unretrieved(&self) -> bool {
        self.detail().is_sentinel()
    }
}
