use serde_derive::Deserialize;

fn default_api_base() -> String {
    String::from(whoop_client::API_BASE)
}

fn default_redirect_uri() -> String {
    String::from(whoop_client::DEFAULT_REDIRECT_URI)
}

fn default_token_file() -> String {
    String::from(".tokens/whoop_token.json")
}

fn default_page_limit() -> u32 {
    whoop_client::MAX_PAGE_LIMIT
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_file")]
    pub token_file: String,
}

impl Default for TokenConfig {
    fn default() -> TokenConfig {
        TokenConfig {
            token_file: default_token_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DataConfig {
    /// Empty means no lower bound.
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_true")]
    pub all_pages: bool,
    #[serde(default)]
    pub localize_timestamps: bool,
}

impl Default for DataConfig {
    fn default() -> DataConfig {
        DataConfig {
            start_date: String::new(),
            end_date: String::new(),
            page_limit: default_page_limit(),
            all_pages: true,
            localize_timestamps: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub file_base_path: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct EnabledStats {
    #[serde(default)]
    pub profile: bool,
    #[serde(default)]
    pub body_measurements: bool,
    #[serde(default)]
    pub cycle: bool,
    #[serde(default)]
    pub sleep: bool,
    #[serde(default)]
    pub recovery: bool,
    #[serde(default)]
    pub workout: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct WhoopConfig {
    pub whoop: AppConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub data: DataConfig,
    pub file: FileConfig,
    #[serde(default)]
    pub enabled_stats: EnabledStats,
}
