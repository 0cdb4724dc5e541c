use relay_core::config::{AppConfig, LoadOptions};
use relay_db::migrations::MigrationReport;

use crate::commands::{open_database, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let (pool, report) = open_database(&config).await?;
        pool.close().await;
        Ok::<MigrationReport, CommandFailure>(report)
    });

    match result {
        Ok(report) => CommandResult::success("migrate", describe(&report)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

fn describe(report: &MigrationReport) -> String {
    if report.newly_applied.is_empty() {
        return format!(
            "schema up to date ({} migrations previously applied)",
            report.previously_applied
        );
    }
    let applied: Vec<String> = report
        .newly_applied
        .iter()
        .map(|migration| format!("{:04} {}", migration.version, migration.description))
        .collect();
    format!("applied {}: {}", plural(applied.len()), applied.join(", "))
}

fn plural(count: usize) -> String {
    if count == 1 {
        "1 migration".to_string()
    } else {
        format!("{count} migrations")
    }
}
