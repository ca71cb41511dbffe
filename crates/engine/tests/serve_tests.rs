#![cfg(unix)]

use std::{io::Cursor, os::unix::net::UnixStream, thread};

use rdb_common::{
    types::{RecordEntry, RecordedValue, StepCommand},
    ChannelError, ControlClient, ControlServer, FrameReport, MAX_MESSAGE_SIZE,
};
use rdb_engine::{
    Player, Program, RecordLogError, RecordReader, RecordWriter, ReplayError,
};
use tracing::info;

fn log_of(entries: &[RecordEntry]) -> Vec<u8> {
    let mut writer = RecordWriter::new(Vec::new());
    for entry in entries {
        writer.append(entry).unwrap();
    }
    writer.finish().unwrap()
}

/// Drive `steps` requests from a client thread and collect the reports
fn serve(
    program: &Program,
    log: Vec<u8>,
    steps: Vec<StepCommand>,
) -> (Result<(), ReplayError>, Vec<FrameReport>) {
    let (server_end, client_end) = UnixStream::pair().unwrap();

    let client = thread::spawn(move || {
        let mut client = ControlClient::new(client_end.try_clone().unwrap(), client_end);
        let mut reports = Vec::new();
        for step in steps {
            let report = client.step(step).unwrap();
            let done = report.is_final();
            reports.push(report);
            if done {
                break;
            }
        }
        reports
    });

    let mut player = Player::new(
        program,
        program.new_context().with_sink(),
        RecordReader::new(Cursor::new(log)),
    );
    let mut server = ControlServer::new(server_end.try_clone().unwrap(), server_end);
    let result = player.serve(&mut server);
    drop(server);

    (result, client.join().unwrap())
}

#[test]
fn test_serve_until_end_of_stream() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let program = Program::from_source("/tmp/serve.pyl", "x = 1\nprint(x)\n").unwrap();
    let log = log_of(&[RecordEntry::Normal(RecordedValue::None)]);

    let (result, reports) = serve(&program, log, vec![StepCommand::Line; 5]);
    assert!(result.is_ok());
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].frame().unwrap().line, Some(1));
    assert_eq!(reports[1].frame().unwrap().locals["x"], "1");
    assert_eq!(reports[2], FrameReport::EndOfStream { uncaught: None });
}

#[test]
fn test_serve_reports_uncaught_error() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let program = Program::from_source("/tmp/serve_raise.pyl", "x = [1]\ny = x[3]\n").unwrap();

    let (result, reports) = serve(&program, Vec::new(), vec![StepCommand::Line; 5]);
    assert!(result.is_ok());
    assert_eq!(
        reports.last().unwrap(),
        &FrameReport::EndOfStream {
            uncaught: Some("line 2: IndexError: list index out of range".to_string())
        }
    );
}

#[test]
fn test_serve_aborts_on_underrun() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let program = Program::from_source("/tmp/serve_underrun.pyl", "x = 1\nprint(x)\n").unwrap();

    let (result, reports) = serve(&program, Vec::new(), vec![StepCommand::Line; 5]);
    assert!(matches!(result, Err(ReplayError::RecordLog(RecordLogError::Underrun { consumed: 0 }))));
    let FrameReport::Aborted { reason } = reports.last().unwrap() else {
        panic!("expected an aborted report, got {reports:?}");
    };
    assert!(reason.contains("exhausted after 0 entries"));
}

#[test]
fn test_client_leaving_ends_serve_quietly() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let program = Program::from_source("/tmp/serve_leave.pyl", "x = 1\ny = 2\nz = 3\n").unwrap();

    let (result, reports) = serve(&program, Vec::new(), vec![StepCommand::Opcode]);
    assert!(result.is_ok());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].frame().unwrap().instruction_offset, 0);
}

#[test]
fn test_oversized_frame_aborts_replay() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let program = Program::from_source("/tmp/serve_large.pyl", "x = 'a' * 40000\ny = 1\n").unwrap();

    let (result, reports) = serve(&program, Vec::new(), vec![StepCommand::Line; 5]);
    assert!(matches!(
        result,
        Err(ReplayError::Channel(ChannelError::MessageTooLarge { size, limit }))
            if size > limit && limit == MAX_MESSAGE_SIZE
    ));
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].frame().unwrap().line, Some(1));
    let FrameReport::Aborted { reason } = &reports[1] else {
        panic!("expected an aborted report, got {reports:?}");
    };
    assert!(reason.contains(&format!("exceeds the {MAX_MESSAGE_SIZE} byte channel limit")));
}
