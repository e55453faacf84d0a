mod common;

use std::path::Path;

use common::{NoOccupants, Scripted, ZONE, agent, loopback, session_settings, started_session};
use hvac_cosim::control::schedule_file::ScheduleUpload;
use hvac_cosim::control::{
    ControlMode, CoolingInversionPolicy, SetpointCommand, SetpointRequest, ThermostatMode,
};
use hvac_cosim::error::ControlError;
use hvac_cosim::sim::keys;
use hvac_cosim::sim::record::{Decision, HistoricalRecord};
use hvac_cosim::sim::session::SessionError;

fn sensor(record: &HistoricalRecord, key: &str, step: usize) -> Option<f64> {
    let i = record
        .sensor_columns()
        .iter()
        .position(|c| c.key == key)
        .expect("tracked key");
    record.rows()[step].sensors[i]
}

#[test]
fn passthrough_never_writes_setpoints() {
    let mut session = started_session(
        loopback(1),
        NoOccupants,
        CoolingInversionPolicy::default(),
        session_settings(ControlMode::Passthrough, 1),
    );
    session.run(30).expect("run");
    let record = session.finish().expect("finish");
    for row in record.rows() {
        assert_eq!(row.decision, Decision::NoCommand);
    }
    assert_eq!(sensor(&record, keys::HEATING_SETPOINT, 29), Some(20.0));
    assert_eq!(sensor(&record, keys::COOLING_SETPOINT, 29), Some(25.0));
}

#[test]
fn manual_heating_holds_the_deadband() {
    let plant = hvac_cosim::sim::loopback::LoopbackSettings {
        outdoor_mean: 12.0,
        outdoor_amplitude: 0.0,
        noise_std: 0.0,
        ..loopback(1)
    };
    let mut settings = session_settings(ControlMode::ManualSetpoints, 1);
    settings.manual.heating = Some(SetpointRequest::new(20.0, 0.5, 0.5));
    let mut session = started_session(plant, NoOccupants, CoolingInversionPolicy::default(), settings);
    session.run(400).expect("run");
    let record = session.finish().expect("finish");

    let mut saw_lower = false;
    let mut saw_upper = false;
    for row in record.rows() {
        let Decision::Applied(SetpointCommand { heating: Some(h), cooling }) = row.decision else {
            panic!("step {} should apply a heating setpoint", row.step);
        };
        assert_eq!(cooling, None);
        assert!(
            (h - 19.5).abs() < 1e-9 || (h - 20.5).abs() < 1e-9,
            "step {}: heating {h} is not a band edge",
            row.step
        );
        saw_lower |= (h - 19.5).abs() < 1e-9;
        saw_upper |= (h - 20.5).abs() < 1e-9;
    }
    assert!(saw_lower && saw_upper);

    let zone_key = keys::zone_air_temperature(ZONE);
    for step in 200..400 {
        let t = sensor(&record, &zone_key, step).expect("zone temperature");
        assert!((19.0..=21.0).contains(&t), "step {step}: zone at {t}");
    }
}

const SCHEDULE_HEADER: &str = "datetime,Heating Setpoint (New),Heating Deadband Up,Heating Deadband Down,Cooling Setpoint (New),Cooling Deadband Up,Cooling Deadband Down\n";

#[test]
fn schedule_rows_apply_at_their_minute() {
    let csv = format!(
        "{SCHEDULE_HEADER}\
         6/30  24:00:00,19,0,0,,,\n\
         7/1  00:05:00,21,0.5,0.5,,,\n"
    );
    let mut settings = session_settings(ControlMode::Schedule, 1);
    settings.schedule = Some(ScheduleUpload::csv(csv));
    let mut session = started_session(loopback(1), NoOccupants, CoolingInversionPolicy::default(), settings);
    session.run(10).expect("run");
    let record = session.finish().expect("finish");
    let rows = record.rows();

    // hour 24 of June 30 is midnight of July 1
    assert_eq!(rows[0].info.heating_setpoint_new, Some(19.0));
    assert_eq!(
        rows[0].decision,
        Decision::Applied(SetpointCommand {
            heating: Some(19.0),
            cooling: None
        })
    );

    // zone well above the band: heating coasts at the lower edge
    assert_eq!(rows[5].info.heating_setpoint_new, Some(21.0));
    assert_eq!(rows[5].info.heating_deadband_up, Some(0.5));
    assert_eq!(
        rows[5].decision,
        Decision::Applied(SetpointCommand {
            heating: Some(20.5),
            cooling: None
        })
    );

    for step in [1, 2, 3, 4, 6, 7, 8, 9] {
        assert_eq!(rows[step].decision, Decision::NoCommand, "step {step}");
        assert_eq!(rows[step].info.heating_setpoint_new, None);
    }
}

#[test]
fn schedule_mode_without_upload_skips_but_keeps_recording() {
    let mut session = started_session(
        loopback(1),
        NoOccupants,
        CoolingInversionPolicy::default(),
        session_settings(ControlMode::Schedule, 1),
    );
    session.run(5).expect("non-fatal errors do not stop the session");
    let record = session.finish().expect("finish");
    assert_eq!(record.len(), 5);
    for row in record.rows() {
        assert!(matches!(row.decision, Decision::Skipped(_)));
    }
}

#[test]
fn spreadsheet_schedule_applies_its_rows() {
    let mut settings = session_settings(ControlMode::Schedule, 1);
    settings.schedule = Some(
        ScheduleUpload::from_path(Path::new("tests/fixtures/schedule.xlsx")).expect("read workbook"),
    );
    let mut session = started_session(loopback(1), NoOccupants, CoolingInversionPolicy::default(), settings);
    session.run(6).expect("run");
    let record = session.finish().expect("finish");
    let rows = record.rows();

    assert_eq!(rows[2].info.heating_setpoint_new, Some(21.0));
    assert_eq!(rows[2].info.cooling_setpoint_new, Some(26.0));
    let Decision::Applied(command) = &rows[2].decision else {
        panic!("expected an applied command at 00:02");
    };
    assert!(command.heating.is_some() && command.cooling.is_some());

    // serial-dated row with a blank cooling side
    assert_eq!(rows[4].info.heating_setpoint_new, Some(22.0));
    assert_eq!(rows[4].info.cooling_setpoint_new, None);

    for step in [0, 1, 3, 5] {
        assert_eq!(rows[step].decision, Decision::NoCommand, "step {step}");
    }
}

#[test]
fn occupant_mode_sends_agent_setpoints() {
    let mut session = started_session(
        loopback(1),
        Scripted::new(vec![agent(21.0, 24.0, false)]),
        CoolingInversionPolicy::default(),
        session_settings(ControlMode::OccupantModel, 1),
    );
    session.run(3).expect("run");
    let record = session.finish().expect("finish");
    for row in record.rows() {
        assert_eq!(
            row.decision,
            Decision::Applied(SetpointCommand {
                heating: Some(21.0),
                cooling: Some(24.0)
            })
        );
        assert!(row.info.occupant_motion);
        assert_eq!(row.info.occupant_thermal_frustration, 1.5);
        assert_eq!(row.info.thermostat_mode, None);
    }
    assert_eq!(sensor(&record, keys::HEATING_SETPOINT, 2), Some(21.0));
}

#[test]
fn combined_mode_follows_default_schedule() {
    let mut session = started_session(
        loopback(60),
        NoOccupants,
        CoolingInversionPolicy::default(),
        session_settings(ControlMode::ScheduleAndOccupantModel, 60),
    );
    session.run(24).expect("run");
    let record = session.finish().expect("finish");

    for (hour, row) in record.rows().iter().enumerate() {
        let awake = (6..22).contains(&hour);
        let (label, heat, cool) = if awake {
            ("home", 21.0, 26.0)
        } else {
            ("sleep", 19.0, 27.0)
        };
        assert_eq!(row.info.thermostat_schedule.as_deref(), Some(label), "hour {hour}");
        assert_eq!(row.info.thermostat_mode, Some(ThermostatMode::Auto));
        assert_eq!(row.info.heating_setpoint_new, Some(heat), "hour {hour}");
        assert_eq!(row.info.cooling_setpoint_new, Some(cool), "hour {hour}");
    }
}

#[test]
fn override_expires_after_three_hours() {
    let mut session = started_session(
        loopback(15),
        Scripted::new(vec![agent(22.0, 25.0, true), agent(22.0, 25.0, false)]),
        CoolingInversionPolicy::default(),
        session_settings(ControlMode::ScheduleAndOccupantModel, 15),
    );
    session.run(14).expect("run");
    let record = session.finish().expect("finish");
    let rows = record.rows();

    assert!(rows[0].info.occupant_habitual_override);
    for step in 0..12 {
        assert_eq!(rows[step].info.thermostat_mode, Some(ThermostatMode::Manual), "step {step}");
        assert_eq!(rows[step].info.heating_setpoint_new, Some(22.0));
    }
    // 12 * 15 min = 3 h after the override
    assert_eq!(rows[12].info.thermostat_mode, Some(ThermostatMode::Auto));
    assert_eq!(rows[12].info.heating_setpoint_new, Some(19.0));
}

#[test]
fn inverted_override_raises_cooling() {
    let mut session = started_session(
        loopback(1),
        Scripted::new(vec![agent(24.0, 22.0, true)]),
        CoolingInversionPolicy::RaiseCooling { margin: 2.0 },
        session_settings(ControlMode::ScheduleAndOccupantModel, 1),
    );
    let row = session.step().expect("recovered step");
    assert_eq!(row.info.thermostat_mode, Some(ThermostatMode::Manual));
    assert_eq!(row.info.cooling_setpoint_new, Some(26.0));
    let anomaly = row.info.anomaly.expect("anomaly recorded");
    assert_eq!(anomaly.requested_cooling, 22.0);
    assert_eq!(anomaly.applied_cooling, 26.0);
}

#[test]
fn inverted_override_is_fatal_when_rejected() {
    let mut session = started_session(
        loopback(1),
        Scripted::new(vec![agent(24.0, 22.0, true)]),
        CoolingInversionPolicy::Reject,
        session_settings(ControlMode::ScheduleAndOccupantModel, 1),
    );
    let err = session.run(5).unwrap_err();
    match err {
        SessionError::Control { alias, source } => {
            assert_eq!(alias, "house-0");
            assert!(matches!(source, ControlError::InvalidSetpointOrdering { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(session.record().is_empty());
}

#[test]
fn stepping_before_start_is_an_error() {
    let thermostat = hvac_cosim::control::Thermostat::with_default_schedule(
        hvac_cosim::control::TemperatureUnit::Celsius,
        0.0,
    )
    .expect("thermostat");
    let mut session = hvac_cosim::sim::session::Session::new(
        hvac_cosim::sim::loopback::LoopbackEngine::new(loopback(1)),
        hvac_cosim::control::ControlDispatcher::new(
            thermostat,
            NoOccupants,
            CoolingInversionPolicy::default(),
        ),
        session_settings(ControlMode::Passthrough, 1),
    );
    assert!(matches!(session.step(), Err(SessionError::NotStarted(_))));
}
