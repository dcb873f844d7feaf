use crate::adapters::json_file::DEFAULT_FILE_NAME;
use crate::core::engine::EngineConfig;
use crate::utils::error::{Result, RosterError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
const STORE_TYPES: [&str; 3] = ["memory", "json", "rest"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub r#type: String,
    /// JSON 儲存：資料目錄
    pub path: Option<String>,
    /// JSON 儲存：文件名稱
    pub file: Option<String>,
    /// REST 儲存：API 根路徑，例如 https://xyz.supabase.co/rest/v1
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Json,
    Rest,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(RosterError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RosterError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SUPABASE_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RosterError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        match self.store_kind()? {
            StoreKind::Memory => {}
            StoreKind::Json => {
                validation::validate_path("store.path", self.store.data_dir())?;
                validation::validate_non_empty_string("store.file", self.store.file_name())?;
            }
            StoreKind::Rest => {
                let endpoint = validation::validate_required_field("store.endpoint", &self.store.endpoint)?;
                validation::validate_url("store.endpoint", endpoint)?;
                let api_key = validation::validate_required_field("store.api_key", &self.store.api_key)?;
                validation::validate_non_empty_string("store.api_key", api_key)?;
                if api_key.contains("${") {
                    return Err(RosterError::ConfigValidationError {
                        field: "store.api_key".to_string(),
                        message: "environment variable placeholder was not resolved".to_string(),
                    });
                }
            }
        }

        validation::validate_range("store.timeout_seconds", self.store.timeout_seconds(), 1, 300)?;
        validation::validate_one_of("logging.level", self.log_level(), &LOG_LEVELS)?;

        let notes = &self.engine.default_notes;
        validation::validate_non_empty_string("engine.default_notes.enroll", &notes.enroll)?;
        validation::validate_non_empty_string("engine.default_notes.transfer", &notes.transfer)?;
        validation::validate_non_empty_string("engine.default_notes.remove", &notes.remove)?;

        Ok(())
    }

    pub fn store_kind(&self) -> Result<StoreKind> {
        validation::validate_one_of("store.type", &self.store.r#type, &STORE_TYPES)?;
        Ok(match self.store.r#type.as_str() {
            "json" => StoreKind::Json,
            "rest" => StoreKind::Rest,
            _ => StoreKind::Memory,
        })
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or("info")
    }

    pub fn json_logs(&self) -> bool {
        self.logging.json.unwrap_or(false)
    }
}

impl StoreConfig {
    pub fn data_dir(&self) -> &str {
        self.path.as_deref().unwrap_or("./data")
    }

    pub fn file_name(&self) -> &str {
        self.file.as_deref().unwrap_or(DEFAULT_FILE_NAME)
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_json_store_config() {
        let config = TomlConfig::from_toml_str(
            r#"
[engine]
enforce_level_cap = false

[engine.default_notes]
enroll = "Inscripción manual desde panel de gestión"

[store]
type = "json"
path = "/var/lib/roster"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert!(!config.engine.enforce_level_cap);
        assert_eq!(
            config.engine.default_notes.enroll,
            "Inscripción manual desde panel de gestión"
        );
        assert_eq!(
            config.engine.default_notes.remove,
            "Manual removal from management panel"
        );
        assert_eq!(config.store_kind().unwrap(), StoreKind::Json);
        assert_eq!(config.store.data_dir(), "/var/lib/roster");
        assert_eq!(config.store.file_name(), "roster.json");
        assert_eq!(config.log_level(), "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_section_is_optional() {
        let config = TomlConfig::from_toml_str("[store]\ntype = \"memory\"\n").unwrap();
        assert!(config.engine.enforce_level_cap);
        assert!(!config.json_logs());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SMALL_ROSTER_TEST_ENDPOINT", "https://db.example.com/rest/v1");
        let config = TomlConfig::from_toml_str(
            r#"
[store]
type = "rest"
endpoint = "${SMALL_ROSTER_TEST_ENDPOINT}"
api_key = "anon-key"
"#,
        )
        .unwrap();

        assert_eq!(
            config.store.endpoint.as_deref(),
            Some("https://db.example.com/rest/v1")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unresolved_api_key_is_rejected() {
        let config = TomlConfig::from_toml_str(
            r#"
[store]
type = "rest"
endpoint = "https://db.example.com/rest/v1"
api_key = "${SMALL_ROSTER_TEST_UNSET_KEY}"
"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(RosterError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_rest_store_requires_endpoint() {
        let config = TomlConfig::from_toml_str("[store]\ntype = \"rest\"\napi_key = \"k\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(RosterError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_unknown_store_type_is_rejected() {
        let config = TomlConfig::from_toml_str("[store]\ntype = \"sqlite\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_out_of_range() {
        let config =
            TomlConfig::from_toml_str("[store]\ntype = \"memory\"\ntimeout_seconds = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[store]\ntype = \"json\"\nfile = \"algebra.json\"").unwrap();

        let config = TomlConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store.file_name(), "algebra.json");
    }

    #[test]
    fn test_invalid_toml() {
        let result = TomlConfig::from_toml_str("[store\ntype = ");
        assert!(matches!(
            result,
            Err(RosterError::ConfigValidationError { .. })
        ));
    }
}
