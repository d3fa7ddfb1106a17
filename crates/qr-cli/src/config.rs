//! Layered configuration.
//!
//! Priority (highest to lowest):
//! 1. Command-line flags
//! 2. `QR_`-prefixed environment variables (`QR_LLM__MODEL`, `QR_SERVER__BIND`, ...)
//! 3. `./qr.toml`
//! 4. `~/.config/qr/config.toml`
//! 5. `OPENAI_API_KEY` for `llm.api_key`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Retries of network, rate-limit and timeout failures per model call.
    pub max_retries: u32,
    /// Corrective re-prompts when a JSON answer does not parse.
    pub json_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: "ollama".to_string(),
            model: "llama3.2:3b".to_string(),
            temperature: None,
            max_retries: 2,
            json_retries: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Loop-backs allowed per chain.
    pub max_iterations: u32,
    pub results_per_query: usize,
    pub max_source_chars: usize,
    pub dedup_capacity: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            results_per_query: 3,
            max_source_chars: 20_000,
            dedup_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngineKind {
    #[default]
    DuckDuckGo,
    Searxng,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub engine: SearchEngineKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searxng_url: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine: SearchEngineKind::DuckDuckGo,
            searxng_url: None,
            timeout_secs: 20,
            user_agent: concat!("Mozilla/5.0 (compatible; quick-research/", env!("CARGO_PKG_VERSION"), ")")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Report directory (supports $VAR, ${VAR}, ~)
    pub reports_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reports_dir: "~/.local/share/qr/reports".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Values given on the command line. `None` leaves the layered value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub reports_dir: Option<String>,
    pub bind: Option<String>,
}

impl Overrides {
    fn apply(&self, mut figment: Figment) -> Figment {
        if let Some(v) = &self.base_url {
            figment = figment.merge(Serialized::default("llm.base_url", v));
        }
        if let Some(v) = &self.model {
            figment = figment.merge(Serialized::default("llm.model", v));
        }
        if let Some(v) = self.max_iterations {
            figment = figment.merge(Serialized::default("research.max_iterations", v));
        }
        if let Some(v) = &self.reports_dir {
            figment = figment.merge(Serialized::default("storage.reports_dir", v));
        }
        if let Some(v) = &self.bind {
            figment = figment.merge(Serialized::default("server.bind", v));
        }
        figment
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return PathBuf::from(result);
    };
    let expanded = re.replace_all(&result, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

impl Config {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let user = Self::config_path().ok();
        Self::load_from(user.as_deref(), Path::new("qr.toml"), overrides)
    }

    pub fn load_from(user: Option<&Path>, local: &Path, overrides: &Overrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default())).merge(
            Env::raw()
                .only(&["OPENAI_API_KEY"])
                .map(|_| "llm.api_key".into()),
        );

        if let Some(user) = user.filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(user));
        }
        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }
        figment = figment.merge(Env::prefixed("QR_").split("__"));
        figment = overrides.apply(figment);

        let config: Config = figment.extract().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("qr"))
    }

    pub fn reports_dir(&self) -> PathBuf {
        expand_path(&self.storage.reports_dir)
    }

    fn validate(&self) -> Result<()> {
        if self.search.engine == SearchEngineKind::Searxng && self.search.searxng_url.is_none() {
            anyhow::bail!("search.engine = \"searxng\" requires search.searxng_url");
        }
        if self.research.results_per_query == 0 {
            anyhow::bail!("research.results_per_query must be at least 1");
        }
        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.llm.api_key.is_empty() {
            config.llm.api_key = "********".to_string();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
        assert_eq!(config.llm.model, "llama3.2:3b");
        assert_eq!(config.research.max_iterations, 3);
        assert_eq!(config.research.results_per_query, 3);
        assert_eq!(config.search.engine, SearchEngineKind::DuckDuckGo);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
            [llm]
            model = "qwen2.5:7b"

            [search]
            engine = "searxng"
            searxng_url = "http://localhost:8888"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.llm.model, "qwen2.5:7b");
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
        assert_eq!(config.search.engine, SearchEngineKind::Searxng);
        assert_eq!(config.research.max_iterations, 3);
    }

    #[test]
    fn test_local_file_overrides_user_file_and_flags_override_both() {
        let tmp = TempDir::new().unwrap();
        let user = tmp.path().join("config.toml");
        let local = tmp.path().join("qr.toml");
        std::fs::write(&user, "[llm]\nmodel = \"user-model\"\n[research]\nmax_iterations = 5\n")
            .unwrap();
        std::fs::write(&local, "[research]\nmax_iterations = 7\n").unwrap();

        let config = Config::load_from(Some(&user), &local, &Overrides::default()).unwrap();
        assert_eq!(config.llm.model, "user-model");
        assert_eq!(config.research.max_iterations, 7);

        let overrides = Overrides {
            max_iterations: Some(1),
            bind: Some("0.0.0.0:8080".to_string()),
            ..Default::default()
        };
        let config = Config::load_from(Some(&user), &local, &overrides).unwrap();
        assert_eq!(config.research.max_iterations, 1);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_searxng_requires_url() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("qr.toml");
        std::fs::write(&local, "[search]\nengine = \"searxng\"\n").unwrap();

        assert!(Config::load_from(None, &local, &Overrides::default()).is_err());
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let mut config = Config::default();
        config.llm.api_key = "sk-secret".to_string();
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_expand_path() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_path("~/reports"), home.join("reports"));
        assert_eq!(expand_path("/tmp/reports"), PathBuf::from("/tmp/reports"));
        assert_eq!(
            expand_path("$QR_TEST_SURELY_UNSET/x"),
            PathBuf::from("$QR_TEST_SURELY_UNSET/x")
        );
    }
}
