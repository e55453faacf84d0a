use std::path::Path;
use std::process::Command;

use hvac_cosim::config::ScenarioConfig;
use hvac_cosim::control::ThermostatMode;
use hvac_cosim::error::ControlError;
use hvac_cosim::runner::{RunError, run_scenario};
use hvac_cosim::sim::kpi::RunSummary;
use hvac_cosim::sim::record::{Decision, HistoricalRecord};

fn load(path: &str) -> ScenarioConfig {
    let cfg = ScenarioConfig::from_toml_file(Path::new(path)).expect("scenario parses");
    let errors = cfg.validate();
    assert!(errors.is_empty(), "{path} should be valid: {errors:?}");
    cfg
}

fn run(cfg: &ScenarioConfig) -> Vec<HistoricalRecord> {
    run_scenario(cfg)
        .expect("scenario runs")
        .into_iter()
        .map(|o| o.result.expect("session ok"))
        .collect()
}

#[test]
fn baseline_scenario_runs_via_cli() {
    let output = Command::new(env!("CARGO_BIN_EXE_hvac-cosim"))
        .args(["--scenario", "scenarios/baseline.toml", "--steps", "120"])
        .output()
        .expect("hvac-cosim process should run");

    assert!(
        output.status.success(),
        "scenario run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.contains("[house-0]"), "stdout: {stdout}");
    assert!(stdout.contains("--- Run Summary ---"));
    let steps = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Steps:"))
        .map(str::trim);
    assert_eq!(steps, Some("120"));
}

#[test]
fn verbose_flag_routes_logs_to_stderr() {
    let output = Command::new(env!("CARGO_BIN_EXE_hvac-cosim"))
        .args(["--preset", "manual_deadband", "--steps", "3", "--verbose"])
        .output()
        .expect("hvac-cosim process should run");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[INFO hvac_cosim::runner]"), "stderr: {stderr}");
    assert!(stderr.contains("[DEBUG "), "stderr: {stderr}");

    let quiet = Command::new(env!("CARGO_BIN_EXE_hvac-cosim"))
        .args(["--preset", "manual_deadband", "--steps", "3"])
        .output()
        .expect("hvac-cosim process should run");
    assert!(!String::from_utf8_lossy(&quiet.stderr).contains("[DEBUG "));
}

#[test]
fn cli_rejects_unknown_preset() {
    let output = Command::new(env!("CARGO_BIN_EXE_hvac-cosim"))
        .args(["--preset", "greenhouse"])
        .output()
        .expect("hvac-cosim process should run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

#[test]
fn experiment_scenario_rotates_with_precool_and_setback() {
    let mut cfg = load("scenarios/experiment.toml");
    // keep the thermostat out of manual mode
    cfg.occupant.threshold_upper = 1e9;
    cfg.occupant.threshold_lower = -1e9;
    assert_eq!(cfg.total_steps(), 4 * 96);

    let records = run(&cfg);
    assert_eq!(records.len(), 2);
    for record in &records {
        for row in record.rows() {
            let expected = if row.step < 2 * 96 { "precool" } else { "setback" };
            assert_eq!(
                row.info.thermostat_schedule.as_deref(),
                Some(expected),
                "step {}",
                row.step
            );
        }
        let summary = RunSummary::from_record(record, "LIVING ZONE");
        // 13:00-16:00 on days 1-2, 09:00-17:00 on days 3-4, in 15 min steps
        assert_eq!(summary.thermostat_mode_steps, [4 * 96 - 24 - 64, 0, 24, 64]);
    }

    let first = &records[0].rows()[13 * 4];
    assert_eq!(first.info.thermostat_mode, Some(ThermostatMode::Precool));
    // 74 °F rounded
    assert_eq!(first.info.cooling_setpoint_new, Some(23.0));
}

#[test]
fn schedule_scenario_follows_uploaded_rows() {
    let cfg = load("scenarios/schedule.toml");
    let records = run(&cfg);
    let record = &records[0];
    assert_eq!(record.len(), 288);
    for row in record.rows() {
        let hour = row.step / 12;
        let expected = if (6..22).contains(&hour) { 21.0 } else { 18.0 };
        assert_eq!(row.info.heating_setpoint_new, Some(expected), "step {}", row.step);
        assert_eq!(row.info.cooling_setpoint_new, Some(26.0));
        assert!(matches!(row.decision, Decision::Applied(_)));
    }
}

#[test]
fn unknown_mode_in_toml_is_rejected() {
    let toml = r#"
[control]
mode = "model predictive"
"#;
    let cfg = ScenarioConfig::from_toml_str(toml).expect("toml parses");
    assert!(cfg.validate().iter().any(|e| e.field == "control.mode"));
    let err = run_scenario(&cfg).unwrap_err();
    assert!(matches!(
        err,
        RunError::Build(ControlError::UnsupportedControlMode(ref name)) if name == "model predictive"
    ));
}
