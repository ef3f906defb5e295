//! Interface de linha de comando do casegen baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (dispatch, worker,
//! process, index) e flags globais (--config, --verbose).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::state_machine::SourceType;

/// casegen: geração de casos de teste de QA a partir de requisitos.
#[derive(Debug, Parser)]
#[command(name = "casegen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Origem dos itens aceita pela CLI, mapeada para [`SourceType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// Issues sincronizadas do tracker.
    Tracked,
    /// Requisitos enviados diretamente.
    Standalone,
}

impl From<SourceArg> for SourceType {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Tracked => SourceType::Tracked,
            SourceArg::Standalone => SourceType::Standalone,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publica uma mensagem por item do job na fila.
    Dispatch {
        #[arg(long, required_unless_present = "request")]
        job_id: Option<String>,

        #[arg(long, value_enum, default_value_t = SourceArg::Tracked)]
        source: SourceArg,

        /// Corpo JSON completo, por exemplo `{"jobId":"j1","issueIds":["i1"]}`.
        #[arg(long, conflicts_with_all = ["job_id", "items"])]
        request: Option<String>,

        /// Ids dos itens do job.
        #[arg(required_unless_present = "request")]
        items: Vec<String>,
    },

    /// Consome a fila até receber Ctrl-C.
    Worker,

    /// Processa um único payload de mensagem e imprime o relatório.
    Process {
        /// Payload JSON, por exemplo `{"jobId":"j1","issueId":"i1","source":"jira"}`.
        payload: String,
    },

    /// Operações sobre o índice de compliance.
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Gera os arquivos de índice a partir de arquivos de corpus JSON.
    Build {
        /// Diretório de saída.
        #[arg(long)]
        out: PathBuf,

        /// Arquivos JSON, cada um com uma lista de cláusulas.
        #[arg(required = true)]
        corpus: Vec<PathBuf>,
    },

    /// Lista o vocabulário de tags do índice configurado.
    Tags,
}
