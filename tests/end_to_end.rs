//! Full embedder flow: pump, viewport, slide deck, wire-level interaction.

use std::io::Write;
use std::time::{Duration, Instant};

use serde_json::json;
use stagecast::{
    load_slide_file, InboundMessage, MusicMixer, OutboundCall, Runtime, SlideManager, Viewport,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn presentation_runs_over_the_wire() {
    init_tracing();

    let mut deck_file = tempfile::NamedTempFile::new().unwrap();
    write!(
        deck_file,
        r#"{{
            "intro": {{"text": "Hello", "buttons": {{"Start": "quiz"}}}},
            "quiz": {{"delay": {{"duration": 5000, "complete": "intro", "style": "hidden"}}}}
        }}"#
    )
    .unwrap();

    let (runtime, host) = Runtime::new();
    let viewport = Viewport::new(runtime.bridge());
    let music = MusicMixer::new(runtime.bridge());
    let manager = SlideManager::new(
        runtime.bridge(),
        runtime.scheduler(),
        viewport,
        &music,
    );
    manager.add_slides(load_slide_file(deck_file.path()).unwrap());

    // Host signals readiness; the sandbox acknowledges.
    host.inbound.send(InboundMessage::Start).unwrap();
    runtime.tick(Instant::now());
    let setup: Vec<OutboundCall> = host.outbound.try_iter().collect();
    assert!(setup
        .iter()
        .any(|c| c.module == "Basic" && c.op == "started"));

    // Deliver the initial window size through the standing resize handler.
    let resize_token = setup
        .iter()
        .find(|c| c.op == "addResizeHandler")
        .unwrap()
        .args[0]
        .as_str()
        .unwrap()
        .to_string();
    host.inbound
        .send(
            InboundMessage::from_value(&json!([
                "callback",
                resize_token,
                [{"width": 1024.0, "height": 768.0}]
            ]))
            .unwrap(),
        )
        .unwrap();
    runtime.tick(Instant::now());
    host.outbound.try_iter().count();

    // First slide: a greeting and one button.
    manager.go("intro").unwrap();
    let calls: Vec<OutboundCall> = host.outbound.try_iter().collect();
    assert!(calls
        .iter()
        .any(|c| c.op == "setInnerText" && c.args[1] == json!("Hello")));
    let click_token = calls.iter().find(|c| c.op == "bind").unwrap().args[2]
        .as_str()
        .unwrap()
        .to_string();

    // The user presses the button.
    host.inbound
        .send(InboundMessage::from_value(&json!(["callback", click_token, []])).unwrap())
        .unwrap();
    runtime.tick(Instant::now());
    assert_eq!(manager.current_name().as_deref(), Some("quiz"));
    host.outbound.try_iter().count();

    // The quiz slide's delay expires and navigates back on its own.
    runtime.tick(Instant::now() + Duration::from_secs(6));
    assert_eq!(manager.current_name().as_deref(), Some("intro"));
    let calls: Vec<OutboundCall> = host.outbound.try_iter().collect();
    assert!(calls
        .iter()
        .any(|c| c.op == "setInnerText" && c.args[1] == json!("Hello")));
}
