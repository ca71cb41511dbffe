use rdb_tui::{App, Config, ExecutionStatus, TuiConfig};
use rdb_common::{types::StepCommand, FrameReport, SourceFile};
use std::{path::PathBuf, time::Duration};

#[test]
fn test_default_tui_config() {
    let config = TuiConfig::default();

    assert_eq!(config.program, PathBuf::new());
    assert_eq!(config.refresh_interval, Duration::from_millis(100));
}

#[test]
fn test_custom_tui_config() {
    let config = TuiConfig {
        program: PathBuf::from("/tmp/prog.pyl"),
        refresh_interval: Duration::from_millis(500),
    };

    assert_eq!(config.program, PathBuf::from("/tmp/prog.pyl"));
    assert_eq!(config.refresh_interval, Duration::from_millis(500));
}

#[test]
fn test_tui_config_for_program() {
    let config = TuiConfig::new("prog.pyl");
    let cloned = config.clone();

    assert_eq!(cloned.program, PathBuf::from("prog.pyl"));
    assert_eq!(config.refresh_interval, cloned.refresh_interval);
}

#[test]
fn test_app_starts_waiting_for_player() {
    let mut app = App::new(SourceFile::from_text("prog.pyl", "x = 1\n"), Config::default());
    assert_eq!(app.status(), &ExecutionStatus::Starting);
    assert!(app.current_frame().is_none());

    app.begin_step(StepCommand::Line);
    app.apply_report(Ok(FrameReport::Aborted { reason: "record log exhausted".into() }));
    assert_eq!(app.status_text(), "player terminated: record log exhausted");
    assert_eq!(app.steps(), 0);
}
