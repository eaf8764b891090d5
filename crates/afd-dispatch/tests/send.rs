mod common;

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use afd_dispatch::{DispatchContext, SendDispatcher};
use afd_olog::Selection;
use common::{Fixture, JOB};

/// Runs the tool as `sh -f <script> <manifest>`: `sh` reads `<script>` from
/// the font slot and gets the manifest as `$1`.
fn context(fx: &Fixture, grant: &str) -> DispatchContext {
    let script = fx.root().join("record_send.sh");
    fs::write(
        &script,
        "printf '%s\\n' \"$1\" \"$WORK_DIR_ID\" > \"$WORK_DIR_ID/send_args\"\n",
    )
    .unwrap();
    let mut config = fx.config.clone();
    config.send.tool = "sh".to_string();
    config.send.font = script.display().to_string();
    config.permissions.grant = grant.to_string();
    DispatchContext::new(config).unwrap()
}

#[test]
fn test_manifest_and_tool_arguments() {
    let mut fx = Fixture::new();
    let a = fx.add("a.txt", 10, JOB, true);
    let skipped = fx.add("b.txt", 10, JOB, false);
    let ctx = context(&fx, "all");
    let index = fx.index();
    let mut selection = Selection::all(&index);

    let mut send = SendDispatcher::new(&ctx);
    let report = send.send(&index, &mut selection).unwrap();
    let status = send.wait().unwrap().unwrap();
    assert!(status.success());

    assert_eq!(report.sent, 1);
    assert_eq!(report.not_archived, 1);
    assert_eq!(selection.positions(), vec![skipped]);

    let manifest = report.manifest.unwrap();
    assert!(manifest.starts_with(fx.work.tmp_dir()));
    assert_eq!(
        fs::read_to_string(&manifest).unwrap(),
        format!("{}|a.txt\n", fx.archive_path(a).display())
    );

    let args = fs::read_to_string(fx.root().join("send_args")).unwrap();
    assert_eq!(
        args,
        format!("{}\n{}\n", manifest.display(), fx.root().display())
    );
}

#[test]
fn test_send_limit() {
    let mut fx = Fixture::new();
    for i in 0..3 {
        fx.add(&format!("f{}", i), 10, JOB, true);
    }
    let ctx = context(&fx, "send:1");
    let index = fx.index();
    let mut selection = Selection::all(&index);

    let mut send = SendDispatcher::new(&ctx);
    let report = send.send(&index, &mut selection).unwrap();
    send.wait().unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(report.limit_reached, Some(1));
    assert_eq!(selection.len(), 2);
    let lines = fs::read_to_string(report.manifest.unwrap()).unwrap();
    assert_eq!(lines.lines().count(), 1);
}

#[test]
fn test_nothing_sendable_starts_nothing() {
    let mut fx = Fixture::new();
    fx.add("a", 10, JOB, false);
    let ctx = context(&fx, "all");
    let index = fx.index();
    let mut send = SendDispatcher::new(&ctx);
    let report = send.send(&index, &mut Selection::all(&index)).unwrap();
    assert_eq!(report.manifest, None);
    assert!(send.wait().unwrap().is_none());
}

/// True once `pid` is a zombie or gone.
fn exited(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .map_or(false, |(_, rest)| rest.starts_with('Z')),
        Err(_) => true,
    }
}

#[test]
fn test_earlier_tool_is_reaped_on_reuse() {
    let mut fx = Fixture::new();
    fx.add("a", 10, JOB, true);
    let ctx = context(&fx, "all");
    let index = fx.index();
    let mut send = SendDispatcher::new(&ctx);

    let first = send.send(&index, &mut Selection::all(&index)).unwrap();
    let first_pid = first.pid.unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !exited(first_pid) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(exited(first_pid));

    let second = send.send(&index, &mut Selection::all(&index)).unwrap();
    assert_ne!(second.pid, first.pid);
    assert!(!Path::new(&format!("/proc/{}", first_pid)).exists());
    assert!(send.in_flight() <= 1);

    assert!(send.wait().unwrap().unwrap().success());
    assert_eq!(send.in_flight(), 0);
}
