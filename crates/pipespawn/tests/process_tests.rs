use pipespawn::{Child, ProcessError, SpawnConfig};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

const CHILD_BIN: &str = env!("CARGO_BIN_EXE_pipespawn-child");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_thread_ids(false)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

/// Tests that mutate the parent environment serialize on this lock; the
/// harness runs tests on multiple threads.
fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

fn child_argv(rest: &[&str]) -> Vec<String> {
    let mut argv = vec![CHILD_BIN.to_string()];
    argv.extend(rest.iter().map(|s| s.to_string()));
    argv
}

fn fixture(rest: &[&str]) -> SpawnConfig {
    SpawnConfig::builder().argv(child_argv(rest)).build().unwrap()
}

#[test]
fn exit_code_round_trips_through_join() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["exit-code", "42"])).unwrap();
    assert_ne!(child.pid(), 0);
    let status = child.join().unwrap();
    assert_eq!(status.code(), 42);
    assert!(!status.success());
    child.destroy().unwrap();
}

#[test]
fn exit_code_bounds_round_trip() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["exit-code", "0"])).unwrap();
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();

    let mut child = Child::spawn(&fixture(&["exit-code", "255"])).unwrap();
    assert_eq!(child.join().unwrap().code(), 255);
    child.destroy().unwrap();
}

#[test]
fn argument_count_observed_by_child() {
    init_tracing();
    let mut child =
        Child::spawn(&fixture(&["return-argc", "foo", "bar", "baz", "faz"])).unwrap();
    assert_eq!(child.join().unwrap().code(), 4);
    child.destroy().unwrap();
}

#[test]
fn argument_bytes_survive_transmission() {
    init_tracing();
    let special = [
        "foo\nbar",
        "\"baz\"",
        "faz\\\"faz",
        "with space",
        "tab\there",
        "trailing\\",
    ];
    let mut rest = vec!["echo-argv"];
    rest.extend(special);
    let mut child = Child::spawn(&fixture(&rest)).unwrap();
    assert_eq!(child.join().unwrap().code(), 0);

    let mut data = Vec::new();
    child.stdout().unwrap().read_to_end(&mut data).unwrap();
    let got: Vec<&[u8]> = data.split(|b| *b == 0).filter(|s| !s.is_empty()).collect();
    let expected: Vec<&[u8]> = special.iter().map(|s| s.as_bytes()).collect();
    assert_eq!(got, expected);
    child.destroy().unwrap();
}

#[test]
fn stdin_bytes_reach_the_child() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["stdin-count"])).unwrap();
    child
        .stdin()
        .unwrap()
        .write_all(b"abba are great!")
        .unwrap();
    // join closes stdin, the child sees end of input and reports the count.
    assert_eq!(child.join().unwrap().code(), 15);
    child.destroy().unwrap();
}

#[test]
fn stdin_unavailable_after_close() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["stdin-count"])).unwrap();
    child.close_stdin();
    assert!(child.stdin().is_none());
    child.close_stdin();
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
}

#[test]
fn separate_streams_do_not_intermingle() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["stream-split"])).unwrap();
    assert_eq!(child.join().unwrap().code(), 0);

    let mut out = String::new();
    child.stdout().unwrap().read_to_string(&mut out).unwrap();
    assert_eq!(out, "out-data");

    let mut err = String::new();
    child.stderr().unwrap().read_to_string(&mut err).unwrap();
    assert_eq!(err, "err-data");
    child.destroy().unwrap();
}

#[test]
fn combined_streams_preserve_program_order() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(child_argv(&["interleave"]))
        .combined_stdout_stderr(true)
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();
    assert!(child.stderr().is_none());
    assert_eq!(child.join().unwrap().code(), 0);

    let mut merged = String::new();
    child.stdout().unwrap().read_to_string(&mut merged).unwrap();
    assert_eq!(merged, "Hello,It's me!world!Yay!");
    child.destroy().unwrap();
}

#[test]
fn async_read_accumulates_full_stream_before_eof() {
    init_tracing();
    const TOTAL: usize = 1_048_576;
    let config = SpawnConfig::builder()
        .argv(child_argv(&["stdout-data", "1048576"]))
        .async_io(true)
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();

    let mut data = Vec::with_capacity(TOTAL);
    let mut buf = [0u8; 65536];
    loop {
        let n = child.read_stdout(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    assert_eq!(data.len(), TOTAL);

    let table = b"0123456789abcdef";
    for (index, byte) in data.iter().enumerate() {
        assert_eq!(*byte, table[index % 16], "mismatch at byte {index}");
    }

    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
}

#[test]
fn sync_read_stdout_also_drains_to_eof() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["stdout-data", "212992"])).unwrap();

    let mut total = 0;
    let mut buf = [0u8; 4096];
    loop {
        let n = child.read_stdout(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(total, 212_992);
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
}

#[test]
fn async_stdout_read_returns_while_child_still_running() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(child_argv(&["stdout-poll"]))
        .async_io(true)
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();

    let mut data = Vec::new();
    let mut buf = [0u8; 256];
    let n = child.read_stdout(&mut buf).unwrap();
    assert_ne!(n, 0);
    data.extend_from_slice(&buf[..n]);
    // The child is blocked on our go-ahead, so the read above was
    // necessarily served before end of stream.
    assert!(child.alive());

    let stdin = child.stdin().unwrap();
    stdin.write_all(b"s").unwrap();
    stdin.flush().unwrap();

    loop {
        let n = child.read_stdout(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    assert_eq!(data, b"Hello, world!Goodbye, world!");
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
}

#[test]
fn async_stderr_read_returns_while_child_still_running() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(child_argv(&["stderr-poll"]))
        .async_io(true)
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();

    let mut data = Vec::new();
    let mut buf = [0u8; 256];
    let n = child.read_stderr(&mut buf).unwrap();
    assert_ne!(n, 0);
    data.extend_from_slice(&buf[..n]);

    let stdin = child.stdin().unwrap();
    stdin.write_all(b"s").unwrap();
    stdin.flush().unwrap();

    loop {
        let n = child.read_stderr(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    assert_eq!(data, b"Hello, world!Goodbye, world!");
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
}

#[test]
fn destroy_is_idempotent() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["exit-code", "0"])).unwrap();
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
    child.destroy().unwrap();
}

#[test]
fn alive_reports_running_then_exited() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["sleep-ms", "400"])).unwrap();
    assert!(child.alive());
    assert_eq!(child.join().unwrap().code(), 0);
    assert!(!child.alive());
    child.destroy().unwrap();
}

#[test]
fn alive_polling_composes_with_join() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["exit-code", "7"])).unwrap();
    while child.alive() {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(child.join().unwrap().code(), 7);
    child.destroy().unwrap();
}

#[test]
fn terminate_ends_a_hung_child() {
    init_tracing();
    let mut child = Child::spawn(&fixture(&["hang"])).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(child.alive());
    child.terminate().unwrap();
    let status = child.join().unwrap();
    assert_ne!(status.code(), 0);
    child.destroy().unwrap();
}

#[test]
fn environment_not_inherited_by_default() {
    init_tracing();
    let _guard = env_lock();
    unsafe { std::env::set_var("PIPESPAWN_ENV_TEST", "1") };
    let mut child =
        Child::spawn(&fixture(&["env-probe", "PIPESPAWN_ENV_TEST"])).unwrap();
    assert_eq!(child.join().unwrap().code(), 0);
    child.destroy().unwrap();
}

#[test]
fn environment_inherited_when_requested() {
    init_tracing();
    let _guard = env_lock();
    unsafe { std::env::set_var("PIPESPAWN_ENV_TEST", "42") };
    let config = SpawnConfig::builder()
        .argv(child_argv(&["env-probe", "PIPESPAWN_ENV_TEST"]))
        .inherit_environment(true)
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();
    assert_eq!(child.join().unwrap().code(), 42);
    child.destroy().unwrap();
}

#[test]
fn explicit_environment_used_verbatim() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(child_argv(&["env-probe", "PIPESPAWN_EXPLICIT"]))
        .env("PIPESPAWN_EXPLICIT", "42")
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();
    assert_eq!(child.join().unwrap().code(), 42);
    child.destroy().unwrap();
}

#[test]
fn inherit_with_explicit_environment_is_rejected() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(child_argv(&["exit-code", "0"]))
        .inherit_environment(true)
        .env("FOO", "BAR")
        .build()
        .unwrap();
    let err = Child::spawn(&config).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn inherit_with_empty_environment_is_rejected() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(child_argv(&["exit-code", "0"]))
        .inherit_environment(true)
        .env_clear()
        .build()
        .unwrap();
    let err = Child::spawn(&config).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn explicit_environment_path_drives_resolution() {
    init_tracing();
    let dir = Path::new(CHILD_BIN).parent().unwrap();
    let config = SpawnConfig::builder()
        .argv(["pipespawn-child", "exit-code", "42"])
        .env("PATH", dir.to_str().unwrap())
        .build()
        .unwrap();
    let mut child = Child::spawn(&config).unwrap();
    assert_eq!(child.join().unwrap().code(), 42);
    child.destroy().unwrap();
}

#[test]
fn search_user_path_uses_parent_path() {
    init_tracing();
    let _guard = env_lock();
    let dir = Path::new(CHILD_BIN).parent().unwrap().to_path_buf();
    let old_path = std::env::var_os("PATH").unwrap_or_default();
    let mut paths: Vec<_> = std::env::split_paths(&old_path).collect();
    paths.push(dir);
    let new_path = std::env::join_paths(paths).unwrap();
    unsafe { std::env::set_var("PATH", &new_path) };

    let config = SpawnConfig::builder()
        .argv(["pipespawn-child", "exit-code", "5"])
        .search_user_path(true)
        .build()
        .unwrap();
    let spawned = Child::spawn(&config);

    unsafe { std::env::set_var("PATH", &old_path) };

    let mut child = spawned.unwrap();
    assert_eq!(child.join().unwrap().code(), 5);
    child.destroy().unwrap();
}

#[test]
fn spawn_failure_reports_error_and_no_handle() {
    init_tracing();
    let config = SpawnConfig::builder()
        .argv(["/definitely/not/here/pipespawn-missing"])
        .build()
        .unwrap();
    let err = Child::spawn(&config).unwrap_err();
    assert!(matches!(err, ProcessError::Spawn(_)));
}
