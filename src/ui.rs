//! Interface de terminal do ytauto: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente
//! a execução de `ytauto run` no terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use ytauto::{JobRecord, JobStatus, Schedule, Settings, StatusSnapshot};

/// Indicador visual de progresso para uma execução no terminal.
pub struct RunProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl RunProgress {
    /// Inicia o spinner com a descrição da execução.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Finaliza o spinner e resume o resultado dos jobs.
    pub fn finish(&self, jobs: &[JobRecord]) {
        self.pb.finish_and_clear();
        let failed = jobs.iter().filter(|j| j.status == JobStatus::Failed).count();
        if failed == 0 {
            println!("  {} {} job(s) completed", self.green.apply_to("✓"), jobs.len());
        } else {
            println!(
                "  {} {failed} of {} job(s) failed",
                self.red.apply_to("✗"),
                jobs.len()
            );
        }
    }
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Completed => Style::new().green(),
        JobStatus::Failed => Style::new().red(),
        JobStatus::Running => Style::new().cyan(),
        JobStatus::Retrying => Style::new().yellow(),
        JobStatus::Pending => Style::new().dim(),
    }
}

/// Imprime uma tabela de jobs (id curto, canal, status, duração).
pub fn print_jobs(jobs: &[JobRecord]) {
    let header = Style::new().bold();
    println!(
        "{}",
        header.apply_to(format!(
            "{:<10} {:<10} {:<10} {:>8} {:>9}  ERROR",
            "ID", "CHANNEL", "STATUS", "RETRIES", "DURATION"
        ))
    );
    for job in jobs {
        let duration = job
            .duration()
            .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        // Padding antes de colorir, senão os códigos ANSI quebram o alinhamento.
        let status = format!("{:<10}", job.status.to_string());
        println!(
            "{:<10} {:<10} {} {:>8} {:>9}  {}",
            job.id.short(),
            job.channel.to_string(),
            status_style(job.status).apply_to(status),
            job.retries,
            duration,
            job.error.as_deref().unwrap_or("")
        );
    }
}

/// Imprime o status do orquestrador e as estatísticas por canal.
pub fn print_status(status: &StatusSnapshot) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to("─── Orchestrator ───"));
    println!("  state:          {}", status.state);
    println!("  dry run:        {}", status.dry_run);
    println!("  workers:        {}", status.workers);
    println!("  max concurrent: {}", status.max_concurrent);
    println!("  queue size:     {}", status.queue_size);
    println!(
        "  jobs:           {} total, {} pending, {} running, {} retrying",
        status.total_jobs, status.pending_jobs, status.running_jobs, status.retrying_jobs
    );

    if status.stats.is_empty() {
        return;
    }
    println!();
    println!(
        "{}",
        bold.apply_to(format!(
            "{:<10} {:>9} {:>7} {:>6}",
            "CHANNEL", "COMPLETED", "FAILED", "TOTAL"
        ))
    );
    for (channel, stats) in &status.stats {
        println!(
            "{:<10} {:>9} {:>7} {:>6}",
            channel.to_string(),
            stats.completed,
            stats.failed,
            stats.total
        );
    }
}

/// Imprime o horário diário de cada canal.
pub fn print_schedule(schedule: &Schedule) {
    println!("{}", Style::new().bold().apply_to("─── Schedule ───"));
    for (channel, at) in schedule.slots() {
        println!(
            "  {:<8} {}  ({})",
            channel.to_string(),
            at.format("%H:%M"),
            channel.display_name()
        );
    }
}

/// Imprime a configuração efetiva. Valores de `env` dos pipelines são omitidos.
pub fn print_settings(settings: &Settings) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to("─── Settings ───"));
    println!("  max_concurrent:   {}", settings.max_concurrent);
    println!(
        "  workers:          {}",
        settings
            .workers
            .map(|w| w.to_string())
            .unwrap_or_else(|| format!("{} (= max_concurrent)", settings.max_concurrent))
    );
    println!("  max_retries:      {}", settings.max_retries);
    println!("  retry_delay_secs: {}", settings.retry_delay_secs);
    println!("  dry_run:          {}", settings.dry_run);
    println!("  dry_run_delay_ms: {}", settings.dry_run_delay_ms);
    println!("  poll_interval_ms: {}", settings.poll_interval_ms);
    println!("  log_level:        {}", settings.log_level);

    println!();
    println!("{}", bold.apply_to("─── Schedule ───"));
    for (channel, at) in &settings.schedule {
        println!("  {channel:<8} {at}");
    }

    println!();
    println!("{}", bold.apply_to("─── Pipelines ───"));
    if settings.pipelines.is_empty() {
        println!("  (none configured)");
    }
    for (channel, spec) in &settings.pipelines {
        let mut line = format!("  {channel:<8} {}", spec.program);
        for arg in &spec.args {
            line.push(' ');
            line.push_str(arg);
        }
        if !spec.env.is_empty() {
            let keys: Vec<&str> = spec.env.keys().map(String::as_str).collect();
            line.push_str(&format!("  [env: {}]", keys.join(", ")));
        }
        if let Some(secs) = spec.timeout_secs {
            line.push_str(&format!("  [timeout: {secs}s]"));
        }
        println!("{line}");
    }
}
