//! safe-clean: guarded deletion of caches, logs and build artifacts
//!
//! Thin front-end over the library for cleanup recipes.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use safe_clean::cli::{command_words, CliArgs, Commands};
use safe_clean::config::Config;
use safe_clean::engine::{BatchReport, Deletion, FindSpec};
use safe_clean::error::DeleteError;
use safe_clean::init::run_init;
use safe_clean::size::{format_kb, size_kb, total_size_kb};
use safe_clean::supervisor::{TimeoutOutcome, TimeoutSupervisor};
use safe_clean::Core;

fn main() -> ExitCode {
    let args = CliArgs::parse_args();
    init_logging(args.verbose);

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("safe-clean: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "safe_clean=debug" } else { "safe_clean=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Main execution logic; returns the process exit status
fn run(args: CliArgs) -> Result<u8> {
    if let Commands::Init = args.command {
        let report = run_init(args.config).map_err(anyhow::Error::msg)?;
        for path in &report.created {
            println!("created: {}", path.display());
        }
        for path in &report.existing {
            println!("exists: {}", path.display());
        }
        return Ok(0);
    }

    let config = Config::load_from_path(args.config.clone().or_else(Config::config_path));
    let mut settings = config.settings();
    settings.dry_run |= args.dry_run;
    let core = Core::new(settings);

    match args.command {
        Commands::Check { paths } => Ok(check(&core, &paths)),
        Commands::Rm { paths, elevated } => Ok(remove_all(&core, &paths, elevated)),
        Commands::FindDelete {
            root,
            name,
            older_than,
            entry_type,
            elevated,
        } => {
            let spec = FindSpec::new(name, older_than, entry_type.into());
            let result = if elevated {
                core.engine.elevated_find_delete_report(&root, &spec)
            } else {
                core.engine.find_delete_report(&root, &spec)
            };
            Ok(report_batch(&core, &root, result))
        }
        Commands::Size { paths } => {
            for path in &paths {
                println!("{}\t{}", size_kb(path), path.display());
            }
            if paths.len() > 1 {
                println!("{}\ttotal", total_size_kb(&paths));
            }
            Ok(0)
        }
        Commands::Scan { roots, delete } => Ok(scan(&core, &roots, delete)),
        Commands::Timeout { seconds, command } => timeout(&core, seconds, &command),
        Commands::Init => unreachable!("handled above"),
    }
}

fn check(core: &Core, paths: &[PathBuf]) -> u8 {
    let mut status = 0;
    for path in paths {
        match core.validator.validate(path) {
            Ok(_) => println!("ok: {}", path.display()),
            Err(rejection) => {
                println!("refused: {}: {}", path.display(), rejection);
                status = 2;
            }
        }
    }
    status
}

fn remove_all(core: &Core, paths: &[PathBuf], elevated: bool) -> u8 {
    let verb = if core.engine.is_dry_run() { "would remove" } else { "removed" };
    let mut succeeded = 0;
    let mut worst = 0;

    for path in paths {
        let result = if elevated {
            core.engine.elevated_remove(path)
        } else {
            core.engine.remove(path)
        };
        match result {
            Ok(Deletion::Removed) => {
                println!("{}: {}", verb, path.display());
                succeeded += 1;
            }
            Ok(Deletion::Missing) => succeeded += 1,
            Err(e) => {
                eprintln!("safe-clean: {}: {}", path.display(), e);
                worst = worst.max(e.exit_code());
            }
        }
    }

    // partial success is still success; only a total failure raises the status
    if succeeded > 0 {
        0
    } else {
        worst
    }
}

fn report_batch(core: &Core, root: &Path, result: Result<BatchReport, DeleteError>) -> u8 {
    match result {
        Ok(report) => {
            let verb = if core.engine.is_dry_run() { "would remove" } else { "removed" };
            println!(
                "{} {} entr{} under {} ({} failed, {} refused)",
                verb,
                report.removed,
                if report.removed == 1 { "y" } else { "ies" },
                root.display(),
                report.failed,
                report.refused
            );
            if report.removed == 0 && report.attempted() > 0 {
                if report.failed > 0 {
                    1
                } else {
                    2
                }
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("safe-clean: {}: {}", root.display(), e);
            e.exit_code()
        }
    }
}

fn scan(core: &Core, roots: &[PathBuf], delete: bool) -> u8 {
    let report = core.scanner.scan(roots);

    for candidate in &report.eligible {
        println!("{}\t{}", format_kb(candidate.size_kb), candidate.path.display());
    }
    for candidate in &report.recent {
        println!(
            "{}\t{}\t(recently modified, kept)",
            format_kb(candidate.size_kb),
            candidate.path.display()
        );
    }
    println!(
        "{} eligible, {} reclaimable",
        report.eligible.len(),
        format_kb(report.eligible_kb())
    );

    if !delete {
        return 0;
    }
    let paths: Vec<PathBuf> = report.eligible.iter().map(|c| c.path.clone()).collect();
    remove_all(core, &paths, false)
}

fn timeout(core: &Core, seconds: f64, command: &[String]) -> Result<u8> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("timeout must be a positive number of seconds, got {}", seconds);
    }
    let bound = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("timeout of {} seconds is out of range", seconds))?;
    let words = command_words(command).context("cannot parse command")?;
    let Some((program, rest)) = words.split_first() else {
        bail!("empty command");
    };

    let supervisor = TimeoutSupervisor::detect().with_kill_grace(core.settings.kill_grace);
    let outcome = supervisor.run_with_timeout(bound, program, rest);
    if let TimeoutOutcome::SupervisorError(msg) = &outcome {
        eprintln!("safe-clean: {}", msg);
    }
    Ok(outcome.exit_code().clamp(0, 255) as u8)
}
