//! Interface de terminal do casegen: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`ItemProgress`] acompanha visualmente
//! o processamento de um item no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::dispatch::DispatchOutcome;
use crate::state_machine::{ItemOutcome, ItemReport};

/// Indicador visual de progresso para o processamento de um item.
///
/// Exibe um spinner animado durante a geração e mensagens coloridas para
/// concluído (verde), falha (vermelho) e ignorado ou expirado (amarelo).
pub struct ItemProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl ItemProgress {
    /// Inicia o spinner para o item e retorna a instância de progresso.
    pub fn start(item_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Generating test cases for {item_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o resultado do item.
    pub fn complete(&self, report: &ItemReport) {
        self.pb.finish_and_clear();
        match &report.outcome {
            ItemOutcome::Completed { test_cases } => println!(
                "  {} {} completed: {test_cases} test cases ({} functional, {} compliance)",
                self.green.apply_to("✓"),
                report.item_id,
                report.functional_cases,
                report.compliance_cases
            ),
            ItemOutcome::Failed { reason } => {
                println!("  {} {} failed: {reason}", self.red.apply_to("✗"), report.item_id)
            }
            ItemOutcome::Skipped => println!(
                "  {} {} is not pending, nothing to do",
                self.yellow.apply_to("↷"),
                report.item_id
            ),
            ItemOutcome::TimedOut => println!(
                "  {} {} timed out and remains in progress",
                self.yellow.apply_to("⧗"),
                report.item_id
            ),
        }
    }

    /// Para o spinner sem mensagem, quando o processamento falha antes do relatório.
    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }

    /// Imprime o relatório do item em JSON.
    pub fn print_report(&self, report: &ItemReport) {
        let style = match report.outcome {
            ItemOutcome::Completed { .. } => &self.green,
            ItemOutcome::Failed { .. } => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", style.apply_to("─── Item Report ───"));
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
    }
}

/// Resumo colorido do dispatch seguido do resultado em JSON.
pub fn print_dispatch(job_id: &str, total: usize, outcome: &DispatchOutcome) {
    let failed = outcome.unprocessed_issues.len();
    if failed == 0 {
        println!(
            "  {} job {job_id}: {total} items queued",
            Style::new().green().bold().apply_to("✓")
        );
    } else {
        println!(
            "  {} job {job_id}: {} of {total} items queued, {failed} failed",
            Style::new().yellow().bold().apply_to("!"),
            total - failed
        );
        for (item_id, error) in &outcome.unprocessed_issues {
            println!("    {} {item_id}: {error}", Style::new().red().apply_to("✗"));
        }
    }
    println!("{}", serde_json::to_string_pretty(outcome).unwrap_or_default());
}
