//! Configuração do casegen carregada a partir de `casegen.toml`.
//!
//! A struct [`CasegenConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `ANTHROPIC_API_KEY` e `CASEGEN_DATABASE_URL` têm
//! precedência sobre o arquivo.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generation::API_URL;
use crate::logging::LOG_FORMATS;

pub const DEFAULT_CONFIG_FILE: &str = "casegen.toml";

/// Configuração de nível superior carregada de `casegen.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CasegenConfig {
    /// Chave da API Anthropic.
    pub api_key: String,

    /// Endpoint da Messages API.
    pub api_base_url: String,

    pub model: String,

    pub max_tokens: u32,

    /// Timeout de cada chamada HTTP ao backend de geração.
    pub request_timeout_secs: u64,

    /// URL do banco SQLite, por exemplo `sqlite://casegen.db`.
    pub database_url: String,

    pub max_connections: u32,

    /// Índice direto: id da cláusula → cláusula.
    pub compliance_index_path: PathBuf,

    /// Índice reverso: tag → ids das cláusulas.
    pub compliance_reverse_index_path: PathBuf,

    /// Diretório opcional com `functional.md`, `compliance_tags.md` e
    /// `compliance_cases.md`.
    pub instructions_dir: Option<PathBuf>,

    /// Prazo da etapa de geração concorrente de um item.
    pub invocation_timeout_secs: u64,

    /// Itens processados em paralelo pelo worker.
    pub worker_concurrency: usize,

    pub poll_interval_ms: u64,

    /// Por quanto tempo uma mensagem recebida fica invisível antes de ser reentregue.
    pub visibility_timeout_secs: u64,

    pub log_level: String,

    /// `pretty` ou `json`.
    pub log_format: String,
}

impl Default for CasegenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: API_URL.to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 8192,
            request_timeout_secs: 120,
            database_url: "sqlite://casegen.db".to_string(),
            max_connections: 8,
            compliance_index_path: PathBuf::from("data/compliance_index.json"),
            compliance_reverse_index_path: PathBuf::from("data/compliance_reverse_index.json"),
            instructions_dir: None,
            invocation_timeout_secs: 540,
            worker_concurrency: 4,
            poll_interval_ms: 500,
            visibility_timeout_secs: 600,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl CasegenConfig {
    /// Carrega a configuração de `path`. Usa valores padrão se o arquivo não
    /// existir; variáveis de ambiente são aplicadas por cima.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<CasegenConfig>(&contents)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            self.api_key = key;
        }
        if let Some(url) = lookup("CASEGEN_DATABASE_URL")
            && !url.is_empty()
        {
            self.database_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_concurrency == 0 {
            bail!("worker_concurrency must be at least 1");
        }
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.request_timeout_secs == 0 || self.invocation_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.visibility_timeout_secs == 0 {
            bail!("visibility_timeout_secs must be greater than zero");
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            bail!(
                "unknown log_format '{}', expected one of {LOG_FORMATS:?}",
                self.log_format
            );
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = CasegenConfig::default();
        assert_eq!(config.api_base_url, "https://api.anthropic.com/v1/messages");
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.log_format, "pretty");
        assert!(config.api_key.is_empty());
        assert!(config.instructions_dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_key = "sk-test-123"
            worker_concurrency = 8
            instructions_dir = "prompts"
        "#;
        let config: CasegenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "sk-test-123");
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.instructions_dir, Some(PathBuf::from("prompts")));
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.database_url, "sqlite://casegen.db");
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config: CasegenConfig = toml::from_str(r#"api_key = "from-file""#).unwrap();
        config.apply_env(|name| match name {
            "ANTHROPIC_API_KEY" => Some("from-env".to_string()),
            "CASEGEN_DATABASE_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_key, "from-env");
        // Valor vazio não sobrescreve.
        assert_eq!(config.database_url, "sqlite://casegen.db");
    }

    #[test]
    fn load_reads_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casegen.toml");
        std::fs::write(&path, "log_format = \"json\"\nmax_connections = 2\n").unwrap();

        let config = CasegenConfig::load(&path).unwrap();
        assert_eq!(config.log_format, "json");
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CasegenConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = CasegenConfig {
            worker_concurrency: 0,
            ..CasegenConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CasegenConfig {
            log_format: "xml".into(),
            ..CasegenConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("xml"));

        let config = CasegenConfig {
            invocation_timeout_secs: 0,
            ..CasegenConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casegen.toml");
        std::fs::write(&path, "worker_concurrency = \"many\"").unwrap();
        assert!(CasegenConfig::load(&path).is_err());
    }
}
