//! Operator front end for the Zio Booster updater.
//!
//! Tracing output goes to stderr; command results go to stdout.

use std::sync::Arc;

use anyhow::{Context, bail};
use zio::scheduler::UpdateScheduler;
use zio::update::{CheckOutcome, NoUpdateReason, UpdateManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zio=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "check" => check(&open_manager()?).await,
        "status" => {
            status(&open_manager()?);
            Ok(())
        }
        "auto" => match args.get(1).map(String::as_str) {
            Some("on") => open_manager()?.set_auto_update_enabled(true).map_err(Into::into),
            Some("off") => open_manager()?.set_auto_update_enabled(false).map_err(Into::into),
            _ => bail!("auto requires `on` or `off`"),
        },
        "interval" => {
            let hours = args
                .get(1)
                .context("interval requires a number of hours")?
                .parse::<f64>()
                .context("interval must be a number of hours")?;
            open_manager()?.set_check_interval_hours(hours)?;
            println!("check interval set to {hours}h");
            Ok(())
        }
        "watch" => watch(open_manager()?).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("unknown subcommand `{other}`")
        }
    }
}

fn open_manager() -> anyhow::Result<UpdateManager> {
    UpdateManager::from_env().context("cannot open update state")
}

async fn check(manager: &UpdateManager) -> anyhow::Result<()> {
    match manager.manual_check().await? {
        CheckOutcome::Updated {
            from,
            to,
            backup_dir,
        } => {
            println!("updated {from} -> {to}");
            println!("previous version saved in {}", backup_dir.display());
        }
        CheckOutcome::NoUpdate(NoUpdateReason::UpToDate) => {
            println!("already up to date ({})", manager.current_version());
        }
        CheckOutcome::NoUpdate(NoUpdateReason::NoReleases) => {
            println!("no releases published for {}", manager.repository());
        }
        CheckOutcome::NoUpdate(NoUpdateReason::InProgress) => {
            println!("another update check is running");
        }
        CheckOutcome::NoUpdate(NoUpdateReason::NotDue) => {
            println!("no update check due");
        }
    }
    Ok(())
}

fn status(manager: &UpdateManager) {
    let config = manager.config();
    println!("version:        {}", config.current_version);
    println!("repository:     {}", manager.repository());
    println!("install path:   {}", manager.install_path().display());
    println!("config file:    {}", manager.config_path().display());
    println!("auto update:    {}", config.auto_update_enabled);
    println!("interval:       {}h", config.check_interval_hours);
    println!("last check:     {}", config.last_update_check.to_rfc3339());
    println!("check due:      {}", manager.is_check_due());
}

async fn watch(manager: UpdateManager) -> anyhow::Result<()> {
    let mut scheduler = UpdateScheduler::new(Arc::new(manager));
    scheduler.start()?;
    println!(
        "watching for updates every {}s, press Ctrl+C to stop",
        scheduler.interval().as_secs()
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl+C")?;
    tracing::info!("received Ctrl+C, shutting down...");
    scheduler.stop().await;
    Ok(())
}

fn print_usage() {
    println!("usage: zio-update <check|status|auto <on|off>|interval <hours>|watch>");
}
