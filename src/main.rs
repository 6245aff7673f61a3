use std::fs::OpenOptions;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use vmcore_report::cli::Cli;
use vmcore_report::report::{display_results, ReportError, VmcoreReport};
use vmcore_report::util::{install_panic_hook, Ui};
use vmcore_report::{plugins, Config};

fn list_plugins(ui: &Ui) {
    ui.info("The following plugins are available:");
    ui.info("");
    for plugin in plugins::discover() {
        let mut flags = Vec::new();
        if !plugin.default_enabled {
            flags.push("optional");
        }
        if plugin.experimental {
            flags.push("experimental");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        ui.info(format!(" {:<24}{}{}", plugin.name, plugin.description, flags));
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.quiet, cli.batch, cli.verbose);

    if cli.list_plugins {
        list_plugins(&ui);
        return Ok(ExitCode::SUCCESS);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            ui.error(e.to_string());
            return Ok(ExitCode::from(1));
        }
    };
    let opts = cli.report_options(&config);

    let report = match VmcoreReport::new(opts, ui) {
        Ok(report) => report,
        Err(e) => {
            ui.error(e.to_string());
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    // Initialize logging to the run's working directory; attached to the report at the end
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(report.log_path())
        .context("failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(cli.log_directive(&config).parse()?),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    install_panic_hook();

    ui.info(format!(
        "\nvmcore-report ({})\n",
        env!("CARGO_PKG_VERSION")
    ));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            signal_token.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || report.execute(cancel)).await?;

    match result {
        Ok(summary) => {
            display_results(&summary, &ui);
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ ReportError::Cancelled) => {
            ui.error("\nExiting on user cancel");
            Ok(ExitCode::from(e.exit_code()))
        }
        Err(ReportError::Fatal { source, workdir }) => {
            ui.error(format!("\n{source}"));
            ui.error(format!("Data collected still available at {}", workdir.display()));
            Ok(ExitCode::from(1))
        }
        Err(e) => {
            tracing::error!(error = %e, "Report failed");
            ui.error(e.to_string());
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
