use crate::datastream::Granularity;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{NodewatcherError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_url_template, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodewatcherConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// 每個事件接收器的設定表，以名稱為鍵
    #[serde(default)]
    pub event_sinks: HashMap<String, toml::Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 遙測網址樣板，`{address}` 會替換為節點位址
    pub telemetry_url: Option<String>,
    pub concurrent_requests: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub interval_seconds: Option<u64>,
    pub highest_granularity: Option<Granularity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub superusers: Vec<String>,
}

const DEFAULT_TELEMETRY_URL: &str = "http://{address}/telemetry.json";

impl NodewatcherConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| NodewatcherError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${WEBHOOK_URL})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
            NodewatcherError::ConfigError {
                message: format!("Invalid substitution pattern: {}", e),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn data_dir(&self) -> &str {
        &self.storage.data_dir
    }

    pub fn telemetry_url(&self) -> &str {
        self.monitor
            .telemetry_url
            .as_deref()
            .unwrap_or(DEFAULT_TELEMETRY_URL)
    }

    pub fn concurrent_requests(&self) -> usize {
        self.monitor.concurrent_requests.unwrap_or(5)
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.monitor.timeout_seconds.unwrap_or(10)
    }

    pub fn interval_seconds(&self) -> u64 {
        self.monitor.interval_seconds.unwrap_or(300)
    }

    pub fn highest_granularity(&self) -> Granularity {
        self.monitor
            .highest_granularity
            .unwrap_or(Granularity::Minutes)
    }

    pub fn superusers(&self) -> &[String] {
        &self.permissions.superusers
    }
}

impl ConfigProvider for NodewatcherConfig {
    fn telemetry_url(&self) -> &str {
        self.telemetry_url()
    }

    fn concurrent_requests(&self) -> usize {
        self.concurrent_requests()
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds()
    }

    fn highest_granularity(&self) -> Granularity {
        self.highest_granularity()
    }
}

impl Validate for NodewatcherConfig {
    fn validate(&self) -> Result<()> {
        // 驗證資料目錄
        validate_path("storage.data_dir", &self.storage.data_dir)?;

        // 驗證遙測網址樣板
        validate_url_template("monitor.telemetry_url", self.telemetry_url(), "address")?;

        // 驗證並發請求數
        validate_positive_number("monitor.concurrent_requests", self.concurrent_requests(), 1)?;
        validate_range("monitor.timeout_seconds", self.timeout_seconds(), 1, 300)?;
        validate_range("monitor.interval_seconds", self.interval_seconds(), 1, 86_400)?;

        for user in &self.permissions.superusers {
            validate_non_empty_string("permissions.superusers", user)?;
        }

        Ok(())
    }
}
