use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use userland_exec as ulx;
use ulx::{ArchiveManager, BackupJob, ExecError, LocalArchive, ProcessRunner, RestoreJob, Settings, Transcript};

fn have_tools() -> bool {
    which::which("tar").is_ok() && Path::new("/bin/sh").exists()
}

fn settings(files_dir: &Path) -> Settings {
    let mut s = Settings::with_files_dir(files_dir);
    s.shell_launcher = vec!["/bin/sh".to_string(), "-c".to_string()];
    s
}

fn populate(root: &Path) {
    fs::create_dir_all(root.join("etc")).unwrap();
    fs::write(root.join("etc").join("hostname"), "userland\n").unwrap();
    fs::write(root.join("etc").join("mtab"), "stale\n").unwrap();
    fs::create_dir_all(root.join("home").join("my user")).unwrap();
    fs::write(root.join("home").join("my user").join("notes.txt"), "a b c\n").unwrap();
    fs::create_dir_all(root.join("proc").join("1")).unwrap();
    fs::write(root.join("proc").join("1").join("status"), "x").unwrap();
    fs::create_dir_all(root.join("sys")).unwrap();
    fs::write(root.join("sys").join("kernel"), "x").unwrap();
}

fn listing(archive: &Path) -> Vec<String> {
    let out = Command::new("tar")
        .arg("-tzf")
        .arg(archive)
        .output()
        .expect("run tar -t");
    assert!(out.status.success());
    let mut v: Vec<String> = String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(|l| l.trim_end_matches('/').to_string())
        .collect();
    v.sort();
    v
}

/// Relative path and content of every file under `root`, skipping top-level excluded paths.
fn tree(root: &Path) -> Vec<(String, Vec<u8>)> {
    let excluded = ulx::BACKUP_EXCLUSIONS;
    let mut out: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(root).ok()?.to_string_lossy().into_owned();
            let skip = excluded
                .iter()
                .any(|x| rel == *x || rel.starts_with(&format!("{x}/")));
            (!skip).then(|| (rel, fs::read(e.path()).unwrap_or_default()))
        })
        .collect();
    out.sort();
    out
}

fn backup(files_dir: &Path, dest: &Path) -> PathBuf {
    let runner = ProcessRunner::new(settings(files_dir));
    let job = BackupJob::new("1", "rootfs.tar.gz", dest).unwrap();
    let mut t = Transcript::new();
    ArchiveManager::new(&runner)
        .backup(&job, &mut t)
        .unwrap_or_else(|e| panic!("backup failed: {e}; transcript: {:?}", t.lines()))
}

#[test]
fn test_backup_then_restore_round_trip() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let files = td.path().join("files");
    let dest = td.path().join("backups");
    populate(&files.join("1"));

    let copied = backup(&files, &dest);
    assert!(copied.starts_with(&dest));
    let name = copied.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("rootfs.") && name.ends_with(".tar.gz"), "{name}");
    // No temp file left behind; the finished archive stays in the storage root.
    assert!(!files.join("rootfs.tar.gz.tmp").exists());
    assert!(files.join("rootfs.tar.gz").is_file());

    let entries = listing(&copied);
    assert!(entries.iter().any(|e| e == "./etc/hostname"), "{entries:?}");
    assert!(!entries.iter().any(|e| e.contains("proc")), "{entries:?}");
    assert!(!entries.iter().any(|e| e.starts_with("./sys")), "{entries:?}");
    assert!(!entries.iter().any(|e| e == "./etc/mtab"), "{entries:?}");

    // Restore into a different userland id and compare.
    let runner = ProcessRunner::new(settings(&files));
    let job = RestoreJob::new("2").unwrap();
    let mut t = Transcript::new();
    let live = ArchiveManager::new(&runner)
        .restore(&job, &LocalArchive::new(&copied), &mut t)
        .unwrap_or_else(|e| panic!("restore failed: {e}; transcript: {:?}", t.lines()));
    assert_eq!(live, files.join("2"));
    assert_eq!(
        fs::read_to_string(live.join("etc").join("hostname")).unwrap(),
        "userland\n"
    );
    assert_eq!(
        fs::read_to_string(live.join("home").join("my user").join("notes.txt")).unwrap(),
        "a b c\n"
    );
    assert!(!live.join("proc").exists());
    assert!(!live.join("etc").join("mtab").exists());
    assert_eq!(tree(&files.join("1")), tree(&live));
    assert!(!files.join("2.restore.tmp").exists());
    assert!(!files.join(RestoreJob::import_name(&copied.file_name().unwrap().to_string_lossy())).exists());
    assert!(t.lines().iter().any(|l| l == "Archive step 5/5: discard"));
}

#[test]
fn test_backup_twice_produces_same_archive() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let files = td.path().join("files");
    populate(&files.join("1"));
    let first = backup(&files, &td.path().join("a"));
    let second = backup(&files, &td.path().join("b"));
    assert_eq!(listing(&first), listing(&second));
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_backup_never_replaces_another_userland() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let files = td.path().join("files");
    populate(&files.join("1"));
    populate(&files.join("2"));

    let runner = ProcessRunner::new(settings(&files));
    let job = BackupJob::new("1", "2", td.path().join("out")).unwrap();
    let err = ArchiveManager::new(&runner)
        .backup(&job, &mut ulx::NullSink)
        .expect_err("finalize must refuse a directory");
    assert!(matches!(err, ExecError::CommandFailed { .. }), "{err:?}");
    assert!(files.join("2").is_dir());
    assert_eq!(
        fs::read_to_string(files.join("2").join("etc").join("hostname")).unwrap(),
        "userland\n"
    );

    assert!(BackupJob::new("1", "1", td.path().join("out")).is_err());
}

#[test]
fn test_failed_compress_keeps_previous_archive() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let files = td.path().join("files");
    let dest = td.path().join("backups");
    populate(&files.join("1"));
    fs::write(files.join("rootfs.tar.gz"), "previous archive").unwrap();

    let mut s = settings(&files);
    s.tar_program = "false".to_string();
    let runner = ProcessRunner::new(s);
    let job = BackupJob::new("1", "rootfs.tar.gz", &dest).unwrap();
    let mut t = Transcript::new();
    let err = ArchiveManager::new(&runner)
        .backup(&job, &mut t)
        .expect_err("compress must fail");
    assert!(matches!(err, ExecError::CommandFailed { .. }), "{err:?}");
    assert_eq!(
        fs::read_to_string(files.join("rootfs.tar.gz")).unwrap(),
        "previous archive"
    );
    assert!(!dest.exists() || fs::read_dir(&dest).unwrap().next().is_none());
    assert!(!t.lines().iter().any(|l| l.starts_with("Archive step 2/")));
}

#[test]
fn test_backup_of_missing_userland_is_io_error() {
    let td = tempfile::tempdir().expect("tmpdir");
    let runner = ProcessRunner::new(settings(td.path()));
    let job = BackupJob::new("9", "rootfs.tar.gz", td.path().join("out")).unwrap();
    let err = ArchiveManager::new(&runner)
        .backup(&job, &mut ulx::NullSink)
        .expect_err("no source");
    assert!(matches!(err, ExecError::Io(_)), "{err:?}");
    assert!(!td.path().join("9").exists());
}

#[test]
fn test_corrupt_archive_leaves_live_tree() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let files = td.path().join("files");
    populate(&files.join("2"));
    let bad = td.path().join("broken.tar.gz");
    fs::write(&bad, b"this is not a gzip stream").unwrap();

    let runner = ProcessRunner::new(settings(&files));
    let job = RestoreJob::new("2").unwrap();
    let err = ArchiveManager::new(&runner)
        .restore(&job, &LocalArchive::new(&bad), &mut ulx::NullSink)
        .expect_err("extract must fail");
    assert!(matches!(err, ExecError::CommandFailed { .. }), "{err:?}");
    assert_eq!(
        fs::read_to_string(files.join("2").join("etc").join("hostname")).unwrap(),
        "userland\n"
    );
}

#[test]
fn test_legacy_archive_root_is_lifted() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let stage = td.path().join("stage");
    fs::create_dir_all(stage.join("1").join("etc")).unwrap();
    fs::write(stage.join("1").join("etc").join("os-release"), "ID=debian\n").unwrap();
    let legacy = td.path().join("legacy.tar.gz");
    let st = Command::new("tar")
        .arg("-czf")
        .arg(&legacy)
        .arg("-C")
        .arg(&stage)
        .arg("1")
        .status()
        .expect("tar");
    assert!(st.success());

    let files = td.path().join("files");
    let runner = ProcessRunner::new(settings(&files));
    let job = RestoreJob::new("4").unwrap();
    let mut t = Transcript::new();
    let live = ArchiveManager::new(&runner)
        .restore(&job, &LocalArchive::new(&legacy), &mut t)
        .expect("restore");
    assert_eq!(
        fs::read_to_string(live.join("etc").join("os-release")).unwrap(),
        "ID=debian\n"
    );
    assert!(!live.join("1").exists());
    assert!(t.contains("lifted legacy top-level directory"));
}

#[test]
fn test_restore_replaces_previous_contents() {
    if !have_tools() {
        eprintln!("skipping: tar or /bin/sh not found");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let files = td.path().join("files");
    populate(&files.join("1"));
    let copied = backup(&files, &td.path().join("out"));

    fs::create_dir_all(files.join("2")).unwrap();
    fs::write(files.join("2").join("leftover"), "old").unwrap();
    let runner = ProcessRunner::new(settings(&files));
    let job = RestoreJob::new("2").unwrap();
    ArchiveManager::new(&runner)
        .restore(&job, &LocalArchive::new(&copied), &mut ulx::NullSink)
        .expect("restore");
    assert!(!files.join("2").join("leftover").exists());
    assert!(files.join("2").join("etc").join("hostname").is_file());
}
