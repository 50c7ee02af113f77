//! Configuração do ytauto carregada a partir de `ytauto.toml`.
//!
//! A struct [`Settings`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente (`DRY_RUN`, `YTAUTO_MAX_CONCURRENT`, `YTAUTO_MAX_RETRIES`)
//! têm precedência sobre o arquivo.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelType;
use crate::error::YtAutoError;
use crate::logging::LogFormat;
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::CommandSpec;
use crate::scheduler::Schedule;
use crate::state_machine::RetryPolicy;

const DEFAULT_PATH: &str = "ytauto.toml";

/// Configuração de nível superior carregada de `ytauto.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Número máximo de pipelines executando ao mesmo tempo.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Número de workers; quando ausente, igual a `max_concurrent`.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Máximo de retentativas antes de marcar um job como falho.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em segundos para o backoff linear.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,

    /// Modo de simulação: nenhum pipeline real é executado.
    #[serde(default)]
    pub dry_run: bool,

    /// Latência simulada de cada job em modo dry-run.
    #[serde(default = "default_dry_run_delay_ms")]
    pub dry_run_delay_ms: u64,

    /// Intervalo de polling dos workers e do agendador.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Horário diário por canal (`HH:MM`).
    #[serde(default = "default_schedule")]
    pub schedule: BTreeMap<String, String>,

    /// Comando externo de cada canal.
    #[serde(default)]
    pub pipelines: BTreeMap<String, CommandSpec>,
}

// Valor padrão para concorrência: 2.
fn default_max_concurrent() -> usize {
    2
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o atraso base: 60s.
fn default_retry_delay_secs() -> f64 {
    60.0
}

fn default_dry_run_delay_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

// Um horário por canal, espalhados ao longo do dia.
fn default_schedule() -> BTreeMap<String, String> {
    ChannelType::ALL
        .into_iter()
        .map(|c| (c.to_string(), c.default_slot().format("%H:%M").to_string()))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            workers: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            dry_run: false,
            dry_run_delay_ms: default_dry_run_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            schedule: default_schedule(),
            pipelines: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Carrega a configuração de `path`, ou de `ytauto.toml` no diretório atual.
    /// Sem caminho explícito, usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_PATH).exists() => Self::from_file(Path::new(DEFAULT_PATH))?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings = toml::from_str::<Settings>(&contents)
            .map_err(YtAutoError::from)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    /// Aplica overrides de ambiente obtidos via `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // DRY_RUN só liga o modo de simulação, nunca desliga.
        if let Some(value) = lookup("DRY_RUN") {
            if matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes") {
                self.dry_run = true;
            }
        }
        if let Some(n) = lookup("YTAUTO_MAX_CONCURRENT").and_then(|v| v.trim().parse().ok()) {
            self.max_concurrent = n;
        }
        if let Some(n) = lookup("YTAUTO_MAX_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.max_retries = n;
        }
    }

    /// Comando configurado para `channel`, se houver.
    pub fn pipeline_spec(&self, channel: ChannelType) -> Option<&CommandSpec> {
        self.pipelines.get(channel.as_str())
    }

    /// Converte para a configuração do orquestrador, validando os campos.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, YtAutoError> {
        let retry_delay = Duration::try_from_secs_f64(self.retry_delay_secs).map_err(|e| {
            YtAutoError::Config(format!(
                "retry_delay_secs must be a non-negative number of seconds, got {}: {e}",
                self.retry_delay_secs
            ))
        })?;
        for name in self.pipelines.keys() {
            name.parse::<ChannelType>()?;
        }

        let schedule =
            Schedule::parse(self.schedule.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        Ok(OrchestratorConfig {
            max_concurrent: self.max_concurrent,
            workers: self.workers,
            retry: RetryPolicy::new(self.max_retries, retry_delay),
            dry_run: self.dry_run,
            dry_run_delay: Duration::from_millis(self.dry_run_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            schedule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let settings = Settings::default();
        assert_eq!(settings.max_concurrent, 2);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay_secs, 60.0);
        assert!(!settings.dry_run);
        assert_eq!(settings.log_format, LogFormat::Console);
        assert_eq!(settings.schedule["horror"], "09:00");
        assert_eq!(settings.schedule["facts"], "12:00");
        assert_eq!(settings.schedule["finance"], "15:00");
        assert!(settings.pipelines.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            max_retries = 5
            retry_delay_secs = 2.5
            log_format = "json"

            [schedule]
            horror = "21:30"

            [pipelines.horror]
            program = "python3"
            args = ["-m", "channels.run", "{channel}"]
            timeout_secs = 3600
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.max_concurrent, 2);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.schedule.len(), 1);

        let spec = settings.pipeline_spec(ChannelType::Horror).unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.timeout_secs, Some(3600));
        assert!(settings.pipeline_spec(ChannelType::Facts).is_none());

        let config = settings.orchestrator_config().unwrap();
        assert_eq!(config.retry.base_delay, Duration::from_millis(2500));
        assert_eq!(config.schedule.len(), 1);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DRY_RUN", "yes"),
            ("YTAUTO_MAX_CONCURRENT", "4"),
            ("YTAUTO_MAX_RETRIES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert!(settings.dry_run);
        assert_eq!(settings.max_concurrent, 4);
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn dry_run_env_false_keeps_file_value() {
        let mut settings = Settings {
            dry_run: true,
            ..Default::default()
        };
        settings.apply_env(|key| (key == "DRY_RUN").then(|| "0".to_string()));
        assert!(settings.dry_run);
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        let mut settings = Settings::default();
        settings.schedule.insert("facts".into(), "noon".into());
        assert!(matches!(
            settings.orchestrator_config(),
            Err(YtAutoError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn unknown_pipeline_channel_is_rejected() {
        let mut settings = Settings::default();
        settings.pipelines.insert(
            "gaming".into(),
            CommandSpec {
                program: "true".into(),
                args: vec![],
                env: BTreeMap::new(),
                timeout_secs: None,
            },
        );
        assert!(matches!(
            settings.orchestrator_config(),
            Err(YtAutoError::UnknownChannel(_))
        ));
    }

    #[test]
    fn negative_retry_delay_is_rejected() {
        let settings = Settings {
            retry_delay_secs: -1.0,
            ..Default::default()
        };
        assert!(settings.orchestrator_config().is_err());
    }

    #[test]
    fn oversized_retry_delay_is_rejected() {
        for retry_delay_secs in [1e30, f64::INFINITY, f64::NAN] {
            let settings = Settings {
                retry_delay_secs,
                ..Default::default()
            };
            assert!(matches!(
                settings.orchestrator_config(),
                Err(YtAutoError::Config(_))
            ));
        }
    }

    #[test]
    fn load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent = 3\ndry_run_delay_ms = 10").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.max_concurrent, 3);
        assert_eq!(settings.dry_run_delay_ms, 10);
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent = \"many\"").unwrap();
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("TOML parse error"));
    }
}
