mod cli;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, ConfigCommand, ScheduleCommand};
use tracing::info;
use ytauto::{AppContext, Orchestrator, Schedule, Settings, logging};

const RECENT_JOBS: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(n) = cli.max_concurrent {
        settings.max_concurrent = n;
    }
    if let Some(n) = cli.max_retries {
        settings.max_retries = n;
    }
    match &cli.command {
        Command::Run { dry_run: true, .. }
        | Command::Schedule(ScheduleCommand::Start { dry_run: true }) => settings.dry_run = true,
        _ => {}
    }

    let quiet = std::env::var("QUIET").is_ok_and(|v| v == "1");
    logging::init(
        settings.log_format,
        &logging::effective_level(&settings.log_level, cli.verbose, quiet),
    );

    let ctx = AppContext::new(settings);

    match cli.command {
        Command::Run { channel, .. } => {
            let orchestrator = ctx.orchestrator()?;
            let progress = ui::RunProgress::start(&format!(
                "Running {}",
                channel
                    .channel()
                    .map(|c| c.display_name().to_string())
                    .unwrap_or_else(|| "all channels".to_string())
            ));

            let ids = match channel.channel() {
                Some(channel) => {
                    let id = orchestrator.run_once(channel).await;
                    drain(&orchestrator).await;
                    vec![id]
                }
                None => orchestrator.run_all().await,
            };

            let jobs: Vec<_> = ids.iter().filter_map(|id| orchestrator.get_job(*id)).collect();
            progress.finish(&jobs);
            println!();
            ui::print_jobs(&orchestrator.get_recent_jobs(RECENT_JOBS));
        }
        Command::Schedule(ScheduleCommand::Start { .. }) => {
            let orchestrator = ctx.orchestrator()?;
            ui::print_schedule(&orchestrator.config().schedule);
            orchestrator.start(None).await;

            shutdown_signal().await.context("waiting for shutdown signal")?;
            info!("Shutdown signal received");
            orchestrator.stop().await;
        }
        Command::Status { json } => {
            let status = ctx.orchestrator()?.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                ui::print_status(&status);
            }
        }
        Command::Config(ConfigCommand::Show) => {
            let settings = ctx.settings();
            // Surface invalid schedule times or channel names before printing.
            settings.orchestrator_config()?;
            ui::print_settings(&settings);
        }
    }

    Ok(())
}

/// Let a retrying `run_once` job finish its remaining attempts.
async fn drain(orchestrator: &Orchestrator) {
    if orchestrator.status().retrying_jobs == 0 && orchestrator.status().pending_jobs == 0 {
        return;
    }
    orchestrator.start(Some(Schedule::empty())).await;
    orchestrator.wait_idle().await;
    orchestrator.stop().await;
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
