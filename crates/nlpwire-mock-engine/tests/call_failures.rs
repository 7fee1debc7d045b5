#![cfg(unix)]

mod common;

use std::thread;
use std::time::Duration;

use nlpwire_worker::{Client, Response, TransportKind, Verb, WorkerState, DEFAULT_RETRY_CEILING};
use serde_json::json;

use common::{mock_config, pid_alive, ALL_TRANSPORTS};

#[test]
fn crash_every_time_gives_up_after_the_ceiling() {
    for kind in ALL_TRANSPORTS {
        let (config, _dir) = mock_config(kind, &[("mock.behavior", "crash_on_parse")]);
        let mut client = Client::new(config).expect("client should start");

        assert_eq!(client.parse_doc("Doomed."), Response::Null, "{kind}");
        assert_eq!(
            client.spawn_count(),
            1 + DEFAULT_RETRY_CEILING,
            "{kind}: exactly ceiling restarts"
        );
        assert_eq!(client.retry_count(), DEFAULT_RETRY_CEILING);
        assert_eq!(client.state(), WorkerState::Crashed, "{kind}");
    }
}

#[test]
fn custom_ceiling_is_respected() {
    let (mut config, _dir) =
        mock_config(TransportKind::Socket, &[("mock.behavior", "crash_on_parse")]);
    config.policy.retry_ceiling = 0;
    let mut client = Client::new(config).expect("client should start");

    assert_eq!(client.parse_doc("Doomed."), Response::Null);
    assert_eq!(client.spawn_count(), 1);
}

#[test]
fn crash_verb_counts_as_a_crash() {
    let (config, _dir) = mock_config(TransportKind::Pipe, &[]);
    let mut client = Client::new(config).expect("client should start");

    let reply = client.call(Verb::Crash, "", Duration::from_secs(10));
    assert_eq!(reply, Response::Null);
    assert_eq!(client.spawn_count(), 1 + DEFAULT_RETRY_CEILING);

    // The next call brings a fresh worker up.
    assert_eq!(client.ping(), Response::Decoded(json!("PONG")));
    assert_eq!(client.state(), WorkerState::Ready);
    assert_eq!(client.retry_count(), 0);
}

#[test]
fn single_crash_is_retried_transparently() {
    for kind in ALL_TRANSPORTS {
        let (mut config, dir) = mock_config(kind, &[]);
        let marker = dir.path().join("crashed-once");
        config
            .engine
            .settings
            .insert("mock.crash_marker".to_string(), marker.display().to_string());
        let mut client = Client::new(config).expect("client should start");
        let first = client.worker_pid().expect("pid");

        let value = client
            .parse_doc("Hello world.")
            .into_value()
            .unwrap_or_else(|| panic!("{kind}: retry should succeed"));
        assert_eq!(value["sentences"][0]["tokens"], json!(["Hello", "world", "."]));
        assert!(marker.exists());
        assert_eq!(client.spawn_count(), 2, "{kind}");
        assert_ne!(client.worker_pid(), Some(first));
        assert_eq!(client.retry_count(), 0, "{kind}: clean read resets the counter");
    }
}

#[test]
fn timeout_returns_null_without_restarting() {
    let hang = Duration::from_millis(1200);
    for kind in ALL_TRANSPORTS {
        let (config, _dir) = mock_config(
            kind,
            &[("mock.behavior", "hang_on_parse"), ("mock.hang_ms", "1200")],
        );
        let mut client = Client::new(config).expect("client should start");
        let pid = client.worker_pid().expect("pid");

        let reply = client.parse_doc_with_timeout("Too slow.", Duration::from_millis(200));
        assert_eq!(reply, Response::Null, "{kind}");
        assert_eq!(client.worker_pid(), Some(pid), "{kind}: timeout must not restart");
        assert!(pid_alive(pid));
        assert_eq!(client.state(), WorkerState::Ready);
        assert_eq!(client.spawn_count(), 1);
        assert_eq!(client.retry_count(), 0);

        // Let the late reply land so it cannot be mistaken for the next one.
        thread::sleep(hang + Duration::from_millis(300));
        assert_eq!(client.ping(), Response::Decoded(json!("PONG")), "{kind}");
        assert_eq!(client.worker_pid(), Some(pid));
    }
}

#[test]
fn malformed_payload_is_null_and_client_stays_ready() {
    for kind in ALL_TRANSPORTS {
        let (config, _dir) = mock_config(kind, &[("mock.behavior", "garbage_on_parse")]);
        let mut client = Client::new(config).expect("client should start");
        let pid = client.worker_pid();

        assert_eq!(client.parse_doc("Anything."), Response::Null, "{kind}");
        assert_eq!(client.state(), WorkerState::Ready, "{kind}");
        assert_eq!(client.worker_pid(), pid);
        assert_eq!(client.spawn_count(), 1);

        let raw = client
            .parse_doc_raw("Anything.", Duration::from_secs(10))
            .into_raw()
            .expect("raw payload");
        assert_eq!(&raw[..], b"{not json", "{kind}");
        assert_eq!(client.ping(), Response::Decoded(json!("PONG")));
    }
}

#[test]
fn raw_call_returns_the_undecoded_payload() {
    let (config, _dir) = mock_config(TransportKind::Sentinel, &[]);
    let mut client = Client::new(config).expect("client should start");
    let pid = client.worker_pid();

    let reply = client.call_raw(Verb::Ping, "", Duration::from_secs(10));
    assert_eq!(reply.into_raw().as_deref(), Some(&b"\"PONG\""[..]));
    assert_eq!(client.worker_pid(), pid);
}
