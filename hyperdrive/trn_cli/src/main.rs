use anyhow::{Context, Result};
use clap::Parser;
use hyperdrive_learning::{
    classical_ml::ml::{DEFAULT_C, DEFAULT_MAX_ITER},
    DataSource, LearningTelemetry, RawTable, TrialConfig, TrialPipeline, TrialReport,
    TrialSettings, SETTINGS_FILE,
};
use serde_json::json;
use shared_logging::{JsonRunLogger, LogLevel};
use tokio::runtime::Runtime;
use uuid::Uuid;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "trn",
    version,
    about = "Trains one bank-marketing logistic regression trial"
)]
struct Cli {
    /// Inverse of regularization strength. Smaller values mean stronger regularization.
    #[arg(long = "C", default_value_t = DEFAULT_C)]
    c: f64,
    /// Maximum number of solver iterations.
    #[arg(long = "max_iter", default_value_t = DEFAULT_MAX_ITER)]
    max_iter: usize,
}

impl Cli {
    fn trial_config(&self, settings: &TrialSettings) -> TrialConfig {
        TrialConfig::new(self.c, self.max_iter)
            .with_output_dir(&settings.output_dir)
            .with_calendar_policy(settings.calendar_policy)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = TrialSettings::load_or_default(SETTINGS_FILE)
        .with_context(|| format!("loading {SETTINGS_FILE}"))?;
    let report = handle_trial(&cli, &settings)?;
    println!("{}", report.summary());
    Ok(())
}

fn handle_trial(cli: &Cli, settings: &TrialSettings) -> Result<TrialReport> {
    let run_id = format!("run-{}", Uuid::new_v4());
    let telemetry = LearningTelemetry::builder("trn")
        .log_path(settings.telemetry_path())
        .console(true)
        .build()?;
    let run_logger = JsonRunLogger::new(settings.metrics_path(), run_id.clone())?;
    let source = settings.data_source();

    log_trial_event(
        &telemetry,
        LogLevel::Info,
        "trial started",
        json!({ "run_id": run_id, "C": cli.c, "max_iter": cli.max_iter, "source": source.describe() }),
    );

    let outcome = fetch_table(&source).and_then(|table| {
        TrialPipeline.run_with_telemetry(
            &table,
            &cli.trial_config(settings),
            &run_logger,
            Some(&telemetry),
        )
    });

    match outcome {
        Ok(report) => {
            log_trial_event(
                &telemetry,
                LogLevel::Info,
                "trial completed",
                json!({ "run_id": run_id, "report": &report }),
            );
            Ok(report)
        }
        Err(err) => {
            log_trial_event(
                &telemetry,
                LogLevel::Error,
                "trial failed",
                json!({ "run_id": run_id, "error": format!("{err:#}") }),
            );
            Err(err)
        }
    }
}

fn fetch_table(source: &DataSource) -> Result<RawTable> {
    let runtime = Runtime::new().context("starting async runtime")?;
    runtime
        .block_on(source.fetch())
        .with_context(|| format!("loading dataset from {}", source.describe()))
}

fn log_trial_event(
    telemetry: &LearningTelemetry,
    level: LogLevel,
    message: &str,
    metadata: serde_json::Value,
) {
    if let Err(err) = telemetry.log(level, message, metadata) {
        eprintln!("[trn] telemetry write failed: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperdrive_learning::CalendarPolicy;
    use std::{fmt::Write as _, fs, path::Path};
    use tempfile::tempdir;

    #[test]
    fn flags_default_to_one_and_one_hundred() {
        let cli = Cli::parse_from(["trn"]);
        assert_eq!(cli, Cli { c: 1.0, max_iter: 100 });
    }

    #[test]
    fn flags_use_scripting_style_names() {
        let cli = Cli::parse_from(["trn", "--C", "0.5", "--max_iter", "50"]);
        assert_eq!(cli, Cli { c: 0.5, max_iter: 50 });
        assert!(Cli::try_parse_from(["trn", "--c", "0.5"]).is_err());
        assert!(Cli::try_parse_from(["trn", "--max_iter", "many"]).is_err());
        assert!(Cli::try_parse_from(["trn", "--epochs", "3"]).is_err());
    }

    #[test]
    fn trial_config_takes_directories_from_settings() {
        let settings = TrialSettings::from_toml_str(
            "output_dir = \"artifacts\"\ncalendar_policy = \"drop_row\"\n",
        )
        .unwrap();
        let config = Cli { c: 0.5, max_iter: 50 }.trial_config(&settings);
        assert_eq!(config.output_dir, Path::new("artifacts"));
        assert_eq!(config.calendar_policy, CalendarPolicy::DropRow);
        assert!((config.trainer.c - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.trainer.max_iter, 50);
    }

    #[test]
    fn local_trial_writes_artifact_and_metrics() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("bank.csv");
        fs::write(&data, small_bank_csv(120)).unwrap();
        let settings = TrialSettings {
            data_path: Some(data),
            output_dir: dir.path().join("outputs"),
            log_dir: dir.path().join("outputs/logs"),
            ..TrialSettings::default()
        };

        let report = handle_trial(&Cli { c: 1.0, max_iter: 100 }, &settings).unwrap();
        assert_eq!(
            report.artifact,
            dir.path().join("outputs/hyperDrive_1.0_100.json")
        );
        assert!(report.artifact.is_file());

        let metrics = fs::read_to_string(settings.metrics_path()).unwrap();
        assert_eq!(metrics.lines().count(), 3);
        let telemetry = fs::read_to_string(settings.telemetry_path()).unwrap();
        assert!(telemetry.contains("trial completed"));
    }

    #[test]
    fn missing_local_dataset_fails_without_artifact() {
        let dir = tempdir().unwrap();
        let settings = TrialSettings {
            data_path: Some(dir.path().join("absent.csv")),
            output_dir: dir.path().join("outputs"),
            log_dir: dir.path().join("logs"),
            ..TrialSettings::default()
        };
        let err = handle_trial(&Cli { c: 1.0, max_iter: 100 }, &settings).unwrap_err();
        assert!(format!("{err:#}").contains("absent.csv"));
        assert!(!dir.path().join("outputs").exists());
        let telemetry = fs::read_to_string(settings.telemetry_path()).unwrap();
        assert!(telemetry.contains("trial failed"));
    }

    fn small_bank_csv(rows: usize) -> String {
        let mut out = String::from(
            "age,job,marital,education,default,housing,loan,contact,month,day_of_week,duration,campaign,pdays,previous,poutcome,emp.var.rate,cons.price.idx,cons.conf.idx,euribor3m,nr.employed,y\n",
        );
        let jobs = ["admin.", "technician", "services"];
        let months = ["may", "jun", "jul"];
        let days = ["mon", "wed", "fri"];
        for row in 0..rows {
            let duration = (row * 37) % 900;
            let label = if (duration + row % 7 * 40) > 500 { "yes" } else { "no" };
            writeln!(
                out,
                "{},{},married,high.school,no,{},no,{},{},{},{},{},999,0,nonexistent,1.1,93.994,-36.4,4.857,5191.0,{}",
                25 + row % 40,
                jobs[row % jobs.len()],
                if row % 2 == 0 { "yes" } else { "no" },
                if row % 3 == 0 { "telephone" } else { "cellular" },
                months[row % months.len()],
                days[row % days.len()],
                duration,
                1 + row % 4,
                label,
            )
            .unwrap();
        }
        out
    }
}
