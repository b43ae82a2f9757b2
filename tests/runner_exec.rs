use std::path::Path;

use userland_exec as ulx;
use ulx::{ExecError, OutputSink, ProcessRunner, ProcessSpec, Settings, Transcript};

fn have_sh() -> bool {
    Path::new("/bin/sh").exists()
}

fn runner(files_dir: &Path) -> ProcessRunner {
    let mut s = Settings::with_files_dir(files_dir);
    s.shell_launcher = vec!["/bin/sh".to_string(), "-c".to_string()];
    s.external_storage = "/mnt/external".into();
    ProcessRunner::new(s)
}

#[test]
fn test_diagnostic_first_then_output_in_order() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut t = Transcript::new();
    let res = r
        .run(
            ProcessSpec::new(td.path(), ["/bin/sh", "-c", "echo one; echo two >&2; echo three"]),
            &mut t,
        )
        .expect("run");
    assert!(res.success());
    let lines = t.into_lines();
    assert!(
        lines[0].starts_with("Running: [/bin/sh, -c, echo one; echo two >&2; echo three]"),
        "unexpected first line: {:?}",
        lines
    );
    assert!(lines[0].ends_with("with env {}"), "unwrapped run must not carry an overlay: {}", lines[0]);
    assert_eq!(&lines[1..], &["one", "two", "three"]);
}

#[test]
fn test_many_lines_are_not_dropped() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut count = 0usize;
    let mut last = String::new();
    {
        let mut sink = |l: &str| {
            count += 1;
            last = l.to_string();
        };
        r.run(
            ProcessSpec::new(
                td.path(),
                ["/bin/sh", "-c", "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"],
            ),
            &mut sink,
        )
        .expect("run");
    }
    // diagnostic + 20000 output lines
    assert_eq!(count, 20001);
    assert_eq!(last, "line-19999");
}

#[test]
fn test_missing_program_is_launch_error() {
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut t = Transcript::new();
    let res = r.run(
        ProcessSpec::new(td.path(), ["/definitely/not/a/real/binary-xyz"]),
        &mut t,
    );
    match res {
        Err(ExecError::Launch { source, .. }) => {
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            assert_eq!(
                ulx::exit_code_for_exec_error(&ExecError::Launch {
                    command: String::new(),
                    source
                }),
                127
            );
        }
        other => panic!("expected launch error, got {:?}", other.map(|r| r.code())),
    }
    assert!(t.lines().iter().any(|l| l.starts_with("Exec: ")));
}

#[test]
fn test_non_zero_exit_is_reported_not_raised() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut t = Transcript::new();
    let res = r
        .run(ProcessSpec::new(td.path(), ["/bin/sh", "-c", "exit 4"]), &mut t)
        .expect("a failing command still returns a result");
    assert_eq!(res.code(), Some(4));
    assert!(t.contains("Exec: Failed to execute command [/bin/sh, -c, exit 4]"));
    match res.check() {
        Err(ExecError::CommandFailed { code, .. }) => assert_eq!(code, Some(4)),
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[test]
fn test_wrapped_run_sees_overlay() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut t = Transcript::new();
    let res = r
        .run_in_userland(
            "3",
            "echo \"$ROOTFS_PATH|$PROOT_DEBUG_LEVEL|$EXTRA_BINDINGS\"; pwd",
            &mut t,
            true,
        )
        .expect("run");
    assert!(res.success());
    let root = td.path().display().to_string();
    assert!(
        t.contains(&format!("{root}/3|-1|-b /mnt/external:/sdcard")),
        "overlay not visible: {:?}",
        t.lines()
    );
    assert!(t.lines().last().map(|l| l.ends_with("/3")).unwrap_or(false));
    assert!(td.path().join("3").is_dir());
}

#[test]
fn test_non_blocking_run_hands_stream_to_caller() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut t = Transcript::new();
    let mut res = r
        .run(
            ProcessSpec::new(td.path(), ["/bin/sh", "-c", "echo later; exit 2"]).wait(false),
            &mut t,
        )
        .expect("run");
    // Only the diagnostic line was delivered; the output belongs to the caller.
    assert_eq!(t.lines().len(), 1);
    assert!(res.status().is_none());
    assert!(matches!(res.check(), Err(ExecError::NotWaited { .. })));

    let mut out = res.take_output().expect("stream left for caller");
    let mut rest = Transcript::new();
    out.drain_to(&mut rest).expect("drain");
    assert_eq!(rest.lines(), &["later".to_string()]);
    let status = res.wait().expect("wait");
    assert_eq!(status.code(), Some(2));
    assert!(res.check().is_err());
}

#[test]
fn test_discarded_output_never_blocks_child() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let marker = td.path().join("done");
    let script = format!(
        "sleep 0.2; i=0; while [ $i -lt 20000 ]; do echo noise-$i; i=$((i+1)); done; touch {}",
        ulx::shell_escape(&marker.display().to_string())
    );
    let mut res = r
        .run(
            ProcessSpec::new(td.path(), ["/bin/sh", "-c", script.as_str()])
                .wait(false)
                .discard_output(true),
            &mut ulx::NullSink,
        )
        .expect("run");
    assert!(res.take_output().is_none());
    // Far more than a pipe buffer and nobody reads it, yet the child runs to completion.
    let status = res.wait().expect("wait");
    assert!(status.success());
    assert!(marker.exists());
}

#[test]
fn test_terminate_stops_long_running_process() {
    if !have_sh() {
        eprintln!("skipping: /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let r = runner(td.path());
    let mut res = r
        .run(
            ProcessSpec::new(td.path(), ["/bin/sh", "-c", "exec sleep 30"]).wait(false),
            &mut ulx::NullSink,
        )
        .expect("run");
    res.terminate().expect("terminate");
    let status = res.finish(&mut ulx::NullSink).expect("wait");
    assert!(!status.success());
}

#[test]
fn test_closure_listener_is_an_output_sink() {
    let mut got = Vec::new();
    {
        let mut f = |l: &str| got.push(l.to_uppercase());
        OutputSink::line(&mut f, "abc");
    }
    assert_eq!(got, vec!["ABC"]);
}
