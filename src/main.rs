mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use cli::{Cli, Cmd};
use userland_exec::{
    acquire_userland_lock, color_enabled_stderr, exit_code_for_exec_error, host_abis,
    log_error_stderr, log_info_stderr, resolve_architecture, timestamp_now, ArchiveManager,
    ArchiveSource, ArchiveStep, BackupJob, ExecError, LocalArchive, ProcessRunner, ProcessSpec,
    RestoreJob, Settings, StderrSink, UserlandFs,
};

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(dir) = &cli.files_dir {
        settings.files_dir = dir.clone();
    }
    if cli.debug {
        settings.debug_enabled = true;
    }
    Ok(settings)
}

fn print_plan(steps: &[ArchiveStep], tar: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(steps)?);
        return Ok(());
    }
    for (i, step) in steps.iter().enumerate() {
        match step.script(tar) {
            Some(script) => println!("{}. {}: sh -c {}", i + 1, step.label(), script?),
            None => println!("{}. {}: {}", i + 1, step.label(), serde_json::to_string(step)?),
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<u8, ExecError> {
    let use_err = color_enabled_stderr();
    let settings = load_settings(&cli).map_err(|e| ExecError::Config(format!("{e:#}")))?;
    if cli.verbose {
        log_info_stderr(
            use_err,
            &format!(
                "userland-exec: files dir: {}; debug capture: {}",
                settings.files_dir.display(),
                settings.debug_enabled
            ),
        );
    }
    let runner = ProcessRunner::new(settings);
    let mut listener = StderrSink::default();

    match cli.command {
        Cmd::Exec {
            dir,
            wrap,
            no_wait,
            command,
        } => {
            let cwd = UserlandFs::new(&runner).create_and_get_directory(&dir)?;
            // A detached child outlives this process, so it cannot write into a pipe we own.
            let spec = ProcessSpec::new(cwd, command)
                .wrap(wrap)
                .wait(!no_wait)
                .discard_output(no_wait);
            let mut res = runner.run(spec, &mut listener)?;
            if no_wait {
                println!("{}", res.id());
                return Ok(0);
            }
            if let Some(rec) = res.take_recording() {
                let outcome = rec.join();
                if cli.verbose {
                    log_info_stderr(
                        use_err,
                        &format!(
                            "userland-exec: debug log {} ({} lines)",
                            runner.settings().debug_log_path().display(),
                            outcome.lines_written
                        ),
                    );
                }
            }
            res.check()?;
            Ok(0)
        }
        Cmd::Shell { dir, script } => {
            let res = runner.run_in_userland(&dir, &script, &mut listener, true)?;
            res.check()?;
            Ok(0)
        }
        Cmd::Backup {
            dir,
            name,
            destination,
            dry_run,
            json,
        } => {
            let job = BackupJob::new(dir.as_str(), name, destination)?;
            let manager = ArchiveManager::new(&runner);
            if dry_run {
                let steps = manager.plan_backup(&job, &timestamp_now());
                print_plan(&steps, &runner.settings().tar_program, json)
                    .map_err(|e| ExecError::Config(e.to_string()))?;
                return Ok(0);
            }
            let _lock = acquire_userland_lock(runner.settings(), &dir)?;
            let out = manager.backup(&job, &mut listener)?;
            println!("{}", out.display());
            Ok(0)
        }
        Cmd::Restore {
            archive,
            dir,
            dry_run,
            json,
        } => {
            let job = RestoreJob::new(dir.as_str())?;
            let source = LocalArchive::new(archive);
            let manager = ArchiveManager::new(&runner);
            if dry_run {
                let steps = manager.plan_restore(&job, &source.name());
                print_plan(&steps, &runner.settings().tar_program, json)
                    .map_err(|e| ExecError::Config(e.to_string()))?;
                return Ok(0);
            }
            let _lock = acquire_userland_lock(runner.settings(), &dir)?;
            let live = manager.restore(&job, &source, &mut listener)?;
            println!("{}", live.display());
            Ok(0)
        }
        Cmd::Arch { abis, json } => {
            let abis = if abis.is_empty() { host_abis() } else { abis };
            let arch = resolve_architecture(&abis)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "architecture": arch, "reported": abis })
                );
            } else {
                println!("{arch}");
            }
            Ok(0)
        }
        Cmd::Extract { dir } => {
            let fs = UserlandFs::new(&runner);
            let mut res = fs.extract_filesystem(&dir, &mut listener)?;
            if let Some(rec) = res.take_recording() {
                rec.join();
            }
            res.check()?;
            Ok(0)
        }
        Cmd::Assets { dir, prune } => {
            let fs = UserlandFs::new(&runner);
            let present = fs.assets_present(&dir);
            println!("{}", if present { "present" } else { "missing" });
            if prune {
                let n = fs.remove_rootfs_archives(&dir)?;
                if cli.verbose {
                    log_info_stderr(use_err, &format!("userland-exec: removed {n} rootfs archive(s)"));
                }
            }
            Ok(if present { 0 } else { 1 })
        }
        Cmd::Delete { dir } => {
            let fs = UserlandFs::new(&runner);
            Ok(if fs.delete_filesystem(&dir)? { 0 } else { 1 })
        }
    }
}

fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        userland_exec::set_color_mode(mode);
    }
    userland_exec::telemetry_init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log_error_stderr(color_enabled_stderr(), &format!("userland-exec: {e}"));
            ExitCode::from(exit_code_for_exec_error(&e))
        }
    }
}
