//! Binary-level tests: argument handling, config errors, and a live run against a local receiver.
use assert_cmd::prelude::*;
use std::io::Read;
use std::net::TcpListener;
use std::process::Command;
use std::time::{Duration, Instant};

fn sensor() -> Command {
    Command::cargo_bin("procfs_sensor").expect("binary exists")
}

fn text(out: &std::process::Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

#[test]
fn help_prints_usage() {
    let out = sensor().arg("--help").output().expect("run --help");
    assert!(out.status.success());
    let t = text(&out);
    assert!(t.contains("Usage:") && t.contains("--config") && t.contains("-c"), "{t}");
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let out = sensor().arg("--bogus").output().expect("run");
    assert_eq!(out.status.code(), Some(2));
    assert!(text(&out).contains("Usage:"));
}

#[test]
fn config_errors_exit_non_zero() {
    let dir = tempfile::tempdir().unwrap();

    let out = sensor()
        .arg(dir.path().join("absent.json"))
        .output()
        .expect("run");
    assert!(!out.status.success());
    assert!(text(&out).contains("cannot read"), "{}", text(&out));

    let yaml = dir.path().join("sensor.yaml");
    std::fs::write(&yaml, "{}").unwrap();
    let out = sensor().arg("-c").arg(&yaml).output().expect("run");
    assert!(!out.status.success());
    assert!(text(&out).contains(".json"), "{}", text(&out));
}

fn write_config(dir: &std::path::Path, port: u16) -> std::path::PathBuf {
    let cfg = serde_json::json!({
        "name": "cli-test",
        "target": ["ghost"],
        "sampling-interval": 100,
        "output": {"uri": "127.0.0.1", "port": port},
        "verbose": true,
        "stat-command": {"program": "true"},
        "cgroup-root": dir.join("cgroup"),
        "framing": "newline"
    });
    let path = dir.join("sensor.json");
    std::fs::write(&path, serde_json::to_vec(&cfg).unwrap()).unwrap();
    path
}

#[test]
fn unreachable_output_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let out = sensor()
        .arg(write_config(dir.path(), port))
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(1));
    assert!(text(&out).contains("cannot connect"), "{}", text(&out));
}

#[cfg(unix)]
#[test]
fn streams_reports_and_stops_cleanly_on_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = write_config(dir.path(), listener.local_addr().unwrap().port());

    let mut child = sensor().arg(&config).spawn().expect("spawn sensor");
    let (mut conn, _) = listener.accept().unwrap();
    conn.set_read_timeout(Some(Duration::from_millis(200))).unwrap();

    // wait for two reports so the signal handler is surely installed
    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while received.iter().filter(|b| **b == b'\n').count() < 2 && Instant::now() < deadline {
        let mut buf = [0u8; 4096];
        match conn.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(_) => continue,
        }
    }

    let first = received.split(|b| *b == b'\n').next().unwrap();
    let report: serde_json::Value = serde_json::from_slice(first).expect("report json");
    assert_eq!(report["sensor"], "cli-test");
    assert_eq!(report["target"], serde_json::json!(["ghost"]));
    assert_eq!(report["usage"]["ghost"], 0.0);
    assert_eq!(report["global_cpu_usage"], 0.0);
    assert!(report["timestamp"].as_str().unwrap().contains('T'));

    Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .status()
        .expect("send SIGTERM");
    let status = child.wait().expect("wait sensor");
    assert!(status.success(), "exit status {status}");
}
