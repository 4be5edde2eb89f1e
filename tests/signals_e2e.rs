use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tagex::data_mgmt::TagValue;
use tagex::node_mgmt::{config, Config, Flag};
use tagex::readers::simulator::SimDevice;
use tagex::Engine;

mod stubs;
use stubs::forwarders::Recorder;
use stubs::{eventually, tag};

fn signal_line() -> Config {
    config::from_str(stubs::config::SIGNAL_LINE).unwrap()
}

async fn start(config: &Config) -> (Engine, Arc<SimDevice>, Arc<Recorder>, CancellationToken) {
    let (registry, factory) = stubs::simulator_registry();
    let plc = factory.device(2);
    for (name, value) in [
        ("Alive", TagValue::Bool(true)),
        ("Temperature", TagValue::Int16(20)),
        ("Setpoint", TagValue::Int16(22)),
        ("Recording", TagValue::Bool(false)),
        ("Pressure", TagValue::Float32(1.5)),
    ] {
        plc.set_value(&tag(config, name), &value).unwrap();
    }

    let recorder = Recorder::new();
    let token = CancellationToken::new();
    let engine = Engine::build(config.clone(), registry, recorder.forwarders(), token.clone())
        .await
        .unwrap();
    engine.start().await.unwrap();
    (engine, plc, recorder, token)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn heartbeat_is_acknowledged_and_reported() {
    let config = signal_line();
    let (engine, plc, recorder, token) = start(&config).await;
    let alive = tag(&config, "Alive");
    eventually("initial acknowledge", || {
        plc.value(&alive) == Some(TagValue::Bool(false))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for round in 2..=3 {
        plc.set_value(&alive, &TagValue::Bool(true)).unwrap();
        eventually("heartbeat acknowledge", || {
            plc.value(&alive) == Some(TagValue::Bool(false))
        })
        .await;
        eventually("connectivity report", || {
            recorder.connectivity.lock().unwrap().len() >= round
        })
        .await;
        // let the poller read the acknowledged value back
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let reports = recorder.connectivity.lock().unwrap().clone();
    assert!(reports.iter().all(|(name, online)| name == "Alive" && *online));
    assert!(plc
        .writes()
        .iter()
        .all(|(address, value)| address == &alive.address && *value == TagValue::Bool(false)));

    engine.shutdown().await;
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signal_only_heartbeat_is_not_reported() {
    let mut config = signal_line();
    config.channels[0].devices[0].tags[0].signal_only = true;
    let (engine, plc, recorder, token) = start(&config).await;
    let alive = tag(&config, "Alive");

    plc.set_value(&alive, &TagValue::Bool(true)).unwrap();
    eventually("heartbeat acknowledge", || {
        plc.value(&alive) == Some(TagValue::Bool(false))
    })
    .await;
    assert!(recorder.connectivity.lock().unwrap().is_empty());

    engine.shutdown().await;
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn notice_publishes_changes_with_previous_value() {
    let config = signal_line();
    let (engine, plc, recorder, token) = start(&config).await;

    eventually("first notice", || !recorder.notices.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    // unchanged value, nothing new
    assert_eq!(recorder.notices.lock().unwrap().len(), 1);

    plc.set_value(&tag(&config, "Temperature"), &TagValue::Int16(25))
        .unwrap();
    eventually("second notice", || recorder.notices.lock().unwrap().len() == 2).await;

    let notices = recorder.notices.lock().unwrap().clone();
    let (first, first_previous) = &notices[0];
    assert_eq!(first.flag, Flag::Notice);
    assert!(first_previous.is_none());

    let (second, previous) = &notices[1];
    assert_eq!(previous, &Some(TagValue::Int16(20)));
    assert_eq!(second.value_of("Temperature"), Some(&TagValue::Int16(25)));
    assert_eq!(second.value_of("Setpoint"), Some(&TagValue::Int16(22)));
    assert_eq!(
        engine.snapshot().get(31).map(|e| e.payload.value),
        Some(TagValue::Int16(22))
    );

    engine.shutdown().await;
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switch_streams_samples_between_start_and_stop() {
    let config = signal_line();
    let (engine, plc, recorder, token) = start(&config).await;
    let recording = tag(&config, "Recording");

    tokio::time::sleep(Duration::from_millis(50)).await;
    plc.set_value(&recording, &TagValue::Bool(true)).unwrap();
    eventually("a few samples", || {
        recorder
            .stream_kinds()
            .iter()
            .filter(|k| **k == "sample")
            .count()
            >= 3
    })
    .await;

    plc.set_value(&recording, &TagValue::Bool(false)).unwrap();
    eventually("stream stop", || recorder.stream_kinds().contains(&"stop")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let kinds = recorder.stream_kinds();
    assert_eq!(kinds.first(), Some(&"start"));
    assert_eq!(kinds.last(), Some(&"stop"));
    assert_eq!(kinds.iter().filter(|k| **k == "stop").count(), 1);

    let stream = recorder.stream.lock().unwrap().clone();
    let (_, sample) = stream.iter().find(|(k, _)| *k == "sample").unwrap();
    assert_eq!(sample.tag, "Recording");
    assert_eq!(sample.value_of("Pressure"), Some(&TagValue::Float32(1.5)));

    engine.shutdown().await;
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_replaces_topology_and_clears_snapshot() {
    let config = signal_line();
    let (engine, _plc, recorder, token) = start(&config).await;
    eventually("first notice", || !recorder.notices.lock().unwrap().is_empty()).await;
    assert!(engine.snapshot().get(30).is_some());

    let trigger_line = config::from_str(stubs::config::TRIGGER_LINE).unwrap();
    engine.reload(trigger_line).await.unwrap();

    assert!(engine.is_running().await);
    assert!(engine.snapshot().get(30).is_none());
    let pools: Vec<String> = engine.pool_stats().await.into_iter().map(|(n, _)| n).collect();
    assert_eq!(pools, vec!["line1/plc1".to_string()]);

    engine.shutdown().await;
    assert!(!engine.is_running().await);
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn heartbeat_change_is_reported_after_failed_acknowledge() {
    let config = signal_line();
    let (engine, plc, recorder, token) = start(&config).await;
    let alive = tag(&config, "Alive");
    eventually("initial acknowledge", || {
        plc.value(&alive) == Some(TagValue::Bool(false))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let reported = recorder.connectivity.lock().unwrap().len();

    plc.set_fail_writes(true);
    plc.set_value(&alive, &TagValue::Bool(true)).unwrap();
    eventually("online report", || {
        recorder.connectivity.lock().unwrap().len() == reported + 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(plc.value(&alive), Some(TagValue::Bool(true)));

    plc.set_fail_writes(false);
    plc.set_value(&alive, &TagValue::Bool(false)).unwrap();
    eventually("offline report", || {
        recorder
            .connectivity
            .lock()
            .unwrap()
            .iter()
            .any(|(_, online)| !online)
    })
    .await;

    engine.shutdown().await;
    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pollers_keep_running_through_read_failures() {
    let config = signal_line();
    let (engine, plc, recorder, token) = start(&config).await;
    eventually("first notice", || !recorder.notices.lock().unwrap().is_empty()).await;
    let opened = plc.open_count();

    plc.set_fail_reads(true);
    tokio::time::sleep(Duration::from_millis(50)).await;
    plc.set_value(&tag(&config, "Temperature"), &TagValue::Int16(25))
        .unwrap();
    // a failed read drops its connection; the next one opens a fresh one
    eventually("replacement connections", || plc.open_count() >= opened + 3).await;
    assert_eq!(recorder.notices.lock().unwrap().len(), 1);

    plc.set_fail_reads(false);
    eventually("notice after recovery", || {
        recorder.notices.lock().unwrap().len() == 2
    })
    .await;
    let notices = recorder.notices.lock().unwrap().clone();
    assert_eq!(notices[1].0.value_of("Temperature"), Some(&TagValue::Int16(25)));
    assert_eq!(notices[1].1, Some(TagValue::Int16(20)));

    engine.shutdown().await;
    token.cancel();
}

#[tokio::test]
async fn unknown_driver_kind_is_rejected() {
    let mut config = signal_line();
    config.channels[0].driver = "s7".into();
    let (registry, _) = stubs::simulator_registry();
    let result = Engine::build(config, registry, Recorder::new().forwarders(), CancellationToken::new()).await;
    let message = result.err().unwrap().to_string();
    assert!(message.contains("unknown driver kind 's7'"), "{message}");
}
