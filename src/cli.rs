//! Interface de linha de comando do ytauto baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, schedule, status, config)
//! e flags globais (--config, --max-concurrent, --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ytauto::ChannelType;

/// ytauto: orquestrador de canais faceless do YouTube.
#[derive(Debug, Parser)]
#[command(name = "ytauto", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./ytauto.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Número máximo de pipelines simultâneos.
    #[arg(long, global = true)]
    pub max_concurrent: Option<usize>,

    /// Número máximo de retentativas em caso de falha.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Canal aceito pela CLI, mapeado para [`ChannelType`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    /// Histórias de terror (Dark Tales).
    Horror,
    /// Curiosidades (Mind Blown Facts).
    Facts,
    /// Finanças pessoais (Wealth Insights).
    Finance,
    /// Todos os canais.
    All,
}

impl ChannelArg {
    /// Canal único, ou `None` para `all`.
    pub fn channel(self) -> Option<ChannelType> {
        match self {
            ChannelArg::Horror => Some(ChannelType::Horror),
            ChannelArg::Facts => Some(ChannelType::Facts),
            ChannelArg::Finance => Some(ChannelType::Finance),
            ChannelArg::All => None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o pipeline de um canal (ou de todos) e espera terminar.
    Run {
        /// Canal a executar.
        #[arg(long, short, value_enum, default_value_t = ChannelArg::All)]
        channel: ChannelArg,

        /// Simula a execução sem chamar pipelines reais.
        #[arg(long, short, default_value_t = false)]
        dry_run: bool,
    },

    /// Controla o agendador diário.
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Mostra o status atual do orquestrador.
    Status {
        /// Saída em JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Inspeciona a configuração efetiva.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// Inicia workers e agendador até receber Ctrl-C.
    Start {
        /// Simula a execução sem chamar pipelines reais.
        #[arg(long, short, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Imprime a configuração carregada.
    Show,
}
