//! Event loop tests.
//!
//! A Unix socket pair stands in for `/dev/kmsg`: the test writes records to
//! one end and the loop reads the other through the reactor.

use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use kmsieve_core::config::FilterMode;
use kmsieve_daemon::device::KmsgDevice;
use kmsieve_daemon::event_loop::{StopReason, run_event_loop};
use kmsieve_pipeline::{
    CheckpointStore, KmsgPipeline, KmsgPipelineBuilder, PipelineConfig, RuleLoader,
};

type TestPipeline<K = Vec<u8>> = KmsgPipeline<K, Vec<u8>>;

fn socket_device() -> (KmsgDevice, UnixStream) {
    let (reader, writer) = UnixStream::pair().expect("socket pair");
    reader.set_nonblocking(true).expect("non-blocking");
    let file = File::from(OwnedFd::from(reader));
    let device = KmsgDevice::from_file(file, "<socketpair>").expect("register device");
    (device, writer)
}

fn pipeline_with<K: Write>(
    dir: &Path,
    rules: Option<&str>,
    mode: FilterMode,
    keep: K,
) -> TestPipeline<K> {
    KmsgPipelineBuilder::new()
        .config(PipelineConfig {
            mode,
            ..PipelineConfig::default()
        })
        .engine(rules.map(|r| RuleLoader::parse_str(r, "rules").expect("valid rules")))
        .checkpoint(CheckpointStore::open(dir.join("checkpoint")).expect("open checkpoint"))
        .keep_sink(keep)
        .dump_sink(Some(Vec::new()))
        .build()
        .expect("build pipeline")
}

fn pipeline(dir: &Path, rules: Option<&str>, mode: FilterMode) -> TestPipeline {
    pipeline_with(dir, rules, mode, Vec::new())
}

fn kept(p: &TestPipeline) -> String {
    String::from_utf8(p.forwarder().sinks().keep_ref().clone()).expect("utf8")
}

fn record(seq: u64, body: &str) -> String {
    format!("6,{seq},{},-;{body}\n", seq * 1000)
}

async fn never() -> &'static str {
    std::future::pending().await
}

#[tokio::test]
async fn test_end_of_stream_flushes_and_advances_checkpoint() {
    // Given: Three records, the last one cut short, then the writer closes
    let dir = tempfile::tempdir().expect("tempdir");
    let (device, mut writer) = socket_device();
    let mut p = pipeline(dir.path(), None, FilterMode::LeadingLine);
    let input = format!("{}{}6,2,0,-;trunc", record(0, "a"), record(1, "b"));
    writer.write_all(input.as_bytes()).expect("write");
    drop(writer);

    // When: Running the loop
    let outcome = run_event_loop(&device, &mut p, 8192, never())
        .await
        .expect("loop should stop cleanly");

    // Then: Everything is forwarded and the checkpoint points past the last record
    assert_eq!(outcome.reason, StopReason::EndOfStream);
    assert_eq!(kept(&p), input);
    assert_eq!(outcome.stats.checkpoint, 3);
    assert_eq!(
        CheckpointStore::read(dir.path().join("checkpoint")).expect("read"),
        3
    );
}

#[tokio::test]
async fn test_small_read_buffer_reassembles_lines() {
    // Given: A read buffer far smaller than one record
    let dir = tempfile::tempdir().expect("tempdir");
    let (device, mut writer) = socket_device();
    let mut p = pipeline(dir.path(), Some("e /drop me/\n"), FilterMode::LeadingLine);
    let input = [record(0, "keep this"), record(1, "drop me"), record(2, "and this")].concat();
    writer.write_all(input.as_bytes()).expect("write");
    drop(writer);

    // When: Reading 5 bytes at a time
    let outcome = run_event_loop(&device, &mut p, 5, never())
        .await
        .expect("loop should stop cleanly");

    // Then: Lines are reassembled before the rules see them
    assert_eq!(kept(&p), [record(0, "keep this"), record(2, "and this")].concat());
    assert_eq!(outcome.stats.dumped, 1);
    assert_eq!(outcome.stats.lines_read, 3);
}

#[tokio::test]
async fn test_shutdown_flushes_buffered_whole_message() {
    // Given: Whole-message mode with a message still waiting for its successor
    let dir = tempfile::tempdir().expect("tempdir");
    let (device, mut writer) = socket_device();
    let mut p = pipeline(dir.path(), None, FilterMode::WholeMessage);
    let input = format!("{} SUBSYSTEM=usb\n", record(0, "usb"));
    writer.write_all(input.as_bytes()).expect("write");

    // When: A shutdown signal arrives while the writer is still open
    let shutdown = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        "SIGTERM"
    };
    let outcome = run_event_loop(&device, &mut p, 8192, shutdown)
        .await
        .expect("loop should stop cleanly");

    // Then: The buffered message is emitted and the checkpoint advances past it
    assert_eq!(outcome.reason, StopReason::Signal("SIGTERM"));
    assert_eq!(kept(&p), input);
    assert_eq!(outcome.stats.checkpoint, 1);
    drop(writer);
}

#[tokio::test]
async fn test_pending_shutdown_wins_over_ready_data() {
    // Given: Data ready on the device and a shutdown that has already fired
    let dir = tempfile::tempdir().expect("tempdir");
    let (device, mut writer) = socket_device();
    let mut p = pipeline(dir.path(), None, FilterMode::LeadingLine);
    writer.write_all(record(0, "late").as_bytes()).expect("write");

    // When: Running the loop
    let outcome = run_event_loop(&device, &mut p, 8192, std::future::ready("SIGINT"))
        .await
        .expect("loop should stop cleanly");

    // Then: Nothing was read; the record stays for the next run
    assert_eq!(outcome.reason, StopReason::Signal("SIGINT"));
    assert_eq!(outcome.stats.lines_read, 0);
    assert_eq!(kept(&p), "");
}

#[tokio::test]
async fn test_restart_resumes_from_checkpoint() {
    // Given: A first run that handled records 0..4
    let dir = tempfile::tempdir().expect("tempdir");
    let all: Vec<String> = (0..8).map(|i| record(i, &format!("m{i}"))).collect();

    let (device, mut writer) = socket_device();
    let mut first = pipeline(dir.path(), None, FilterMode::LeadingLine);
    writer.write_all(all[..4].concat().as_bytes()).expect("write");
    drop(writer);
    run_event_loop(&device, &mut first, 8192, never())
        .await
        .expect("first run");
    drop(first);

    // When: The kernel replays its whole ring buffer to the second run
    let (device, mut writer) = socket_device();
    let mut second = pipeline(dir.path(), None, FilterMode::LeadingLine);
    writer.write_all(all.concat().as_bytes()).expect("write");
    drop(writer);
    let outcome = run_event_loop(&device, &mut second, 8192, never())
        .await
        .expect("second run");

    // Then: Only the unseen records are forwarded
    assert_eq!(kept(&second), all[4..].concat());
    assert_eq!(outcome.stats.replay_skipped, 4);
    assert_eq!(outcome.stats.checkpoint, 8);
}

/// Keep sink whose reader has gone away.
struct BrokenStdout;

impl Write for BrokenStdout {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_keep_sink_failure_is_run_loop_error() {
    // Given: A keep sink whose reader went away
    let dir = tempfile::tempdir().expect("tempdir");
    let (device, mut writer) = socket_device();
    let mut p = pipeline_with(dir.path(), None, FilterMode::LeadingLine, BrokenStdout);
    writer.write_all(record(0, "x").as_bytes()).expect("write");

    // When: The loop forwards the record
    let err = run_event_loop(&device, &mut p, 8192, never())
        .await
        .expect_err("write failure must stop the loop");

    // Then: It maps to the run-loop exit code
    assert_eq!(err.exit_code(), 2);
    drop(writer);
}
