use rdb_engine::{Engine, EngineConfig, Program};
use tracing::info;

#[test]
fn test_default_config() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = EngineConfig::default();

    assert!(!config.trace_events);
    assert_eq!(config.seed, None);
}

#[test]
fn test_config_with_custom_values() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = EngineConfig::default().with_trace_events(true).with_seed(Some(42));

    assert!(config.trace_events);
    assert_eq!(config.seed, Some(42));
}

#[test]
fn test_config_clone() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = EngineConfig { trace_events: false, seed: Some(7) };

    let cloned = config.clone();

    assert_eq!(config.trace_events, cloned.trace_events);
    assert_eq!(config.seed, cloned.seed);
}

#[test]
fn test_seeded_contexts_agree() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let program = Program::from_source("/tmp/seeded.pyl", "x = randint(1, 1000000)\n").unwrap();
    let engine = Engine::new(EngineConfig::default().with_seed(Some(3)));

    let first = engine.trace(&program, engine.context(&program)).unwrap();
    let second = engine.trace(&program, engine.context(&program)).unwrap();

    let last = |snapshots: &[rdb_common::types::FrameSnapshot]| snapshots.last().unwrap().clone();
    assert_eq!(last(&first.snapshots).globals["x"], last(&second.snapshots).globals["x"]);
}
