// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Binary entry point: bootstrap the CLI, wire the infrastructure
//! adapters to the orchestrator, and map the outcome onto the exit-code
//! contract (0 ok, 1 volume failures, 2 fatal, 3 usage).

use std::path::Path;

use anyhow::Context;

use diskharvest_bootstrap::logger::{self, LogFormat};
use diskharvest_bootstrap::shutdown::ShutdownCoordinator;
use diskharvest_bootstrap::{platform, signals, ExitCode, ValidatedCli};
use diskharvest_domain::{ChunkTransport, HostToken, WorkerCount};

use diskharvest::application::{Orchestrator, RunOptions, RunOutcome};
use diskharvest::infrastructure::chunker::select_compressor;
use diskharvest::infrastructure::config::{Config, TokenSource};
use diskharvest::infrastructure::enumerate::Overrides;
use diskharvest::infrastructure::exec::Shell;
use diskharvest::infrastructure::inspect::LsblkInspector;
use diskharvest::infrastructure::mount::HelperMounter;
use diskharvest::infrastructure::shipper::{LocalDirTransport, RsyncTransport};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match diskharvest_bootstrap::bootstrap_cli() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("diskharvest: {}", err);
            return ExitCode::Usage.into();
        }
    };

    logger::init(
        if cli.plain_logs {
            LogFormat::Plain
        } else {
            LogFormat::Json
        },
        cli.verbose,
    );

    if let Some(bundle_bin) = platform::apply_bundle_path_overlay() {
        tracing::info!(bundle_bin = %bundle_bin.display(), "bundle PATH overlay applied");
    }
    if !platform::is_elevated() && !cli.list {
        tracing::warn!("not running as root; mounts and layer activation will likely fail");
    }

    let coordinator = ShutdownCoordinator::default();
    tokio::spawn(signals::watch(coordinator.clone()));

    // Grace-period enforcement: once shutdown is initiated the workers get
    // a bounded window to kill their helpers and release their mounts.
    let watchdog = coordinator.clone();
    tokio::spawn(async move {
        watchdog.token().cancelled().await;
        if !watchdog.wait_for_drain().await {
            tracing::error!("graceful drain timed out, forcing exit");
            std::process::exit(1);
        }
    });

    let worker_coordinator = coordinator.clone();
    let result =
        tokio::task::spawn_blocking(move || run(cli, worker_coordinator)).await;
    coordinator.mark_drained();

    match result {
        Ok(Ok(exit)) => exit.into(),
        Ok(Err(err)) => {
            tracing::error!(error = %format!("{:#}", err), "run aborted");
            ExitCode::Fatal.into()
        }
        Err(join_err) => {
            tracing::error!(error = %join_err, "run thread panicked");
            ExitCode::Fatal.into()
        }
    }
}

/// The synchronous run: everything below the signal watcher.
fn run(cli: ValidatedCli, coordinator: ShutdownCoordinator) -> anyhow::Result<ExitCode> {
    let (config, origin) =
        Config::load(cli.config.as_deref()).context("loading configuration")?;
    match &origin {
        Some(path) => tracing::info!(config = %path.display(), "configuration loaded"),
        None => tracing::info!("no configuration file found, using defaults"),
    }

    let host_token = derive_host_token(&config);
    let cpu_count = platform::cpu_count();
    let workers = WorkerCount::derive(
        cli.workers.unwrap_or(config.runtime.workers),
        cpu_count,
    );
    let threads_per_worker = workers.threads_per_worker(cpu_count);
    tracing::info!(
        workers = workers.count(),
        threads_per_worker,
        cpu_count,
        host_token = %host_token,
        "runtime derived"
    );

    let compressor = match select_compressor(
        config.archive.compressor,
        config.archive.level,
        threads_per_worker,
    ) {
        Ok(spec) => Some(spec),
        Err(err) => {
            tracing::warn!(error = %err, "no usable compressor; volumes will fail");
            None
        }
    };

    let transport = build_transport(&config)?;
    let inspector = LsblkInspector::new();
    let mounter = HelperMounter::new(Shell::new(cli.dry_run));

    let orchestrator = Orchestrator {
        config: &config,
        inspector: &inspector,
        mounter: &mounter,
        transport: transport.as_ref(),
        compressor,
        workers,
        host_token: host_token.to_string(),
        hostname: platform::hostname(),
        token: coordinator.token(),
    };
    let options = RunOptions {
        list_only: cli.list,
        dry_run: cli.dry_run,
        overrides: Overrides {
            only: cli.only,
            exclude: cli.exclude_dev,
        },
    };

    match orchestrator.run(&options)? {
        RunOutcome::Planned(rendered) => {
            println!("{}", rendered);
            Ok(ExitCode::Success)
        }
        RunOutcome::Completed(record) => {
            tracing::info!(
                ok = record.totals.ok,
                skipped = record.totals.skipped,
                failed = record.totals.failed,
                bytes_out = record.totals.bytes_out,
                "run complete"
            );
            Ok(ExitCode::from_failed_volumes(record.totals.failed))
        }
    }
}

/// Transport selection: `user@host:/path` ships over rsync/ssh, a bare
/// absolute path ships into a locally mounted archival prefix. With no
/// remote configured (`--list`, smoke tests) a spool-local placeholder is
/// wired up; the orchestrator refuses to ship before it is ever touched.
fn build_transport(config: &Config) -> anyhow::Result<Box<dyn ChunkTransport>> {
    let remote = config.server.remote.trim();
    if remote.is_empty() {
        return Ok(Box::new(LocalDirTransport::new(
            config.archive.spool_dir.join(".unconfigured-remote"),
        )));
    }
    if remote.contains(':') {
        let transport = RsyncTransport::new(
            Shell::new(false),
            remote,
            config.server.port,
            config.server.credential.clone(),
            config.server.bwlimit_kbps,
        )
        .context("parsing server.remote")?;
        Ok(Box::new(transport))
    } else {
        Ok(Box::new(LocalDirTransport::new(remote.into())))
    }
}

/// Host token derivation chain: machine-id, then hostname + stable MAC,
/// then a random token persisted next to the spool so re-runs on the same
/// live USB stay stable.
fn derive_host_token(config: &Config) -> HostToken {
    let from_machine_id = || platform::machine_id().map(|id| HostToken::from_machine_id(&id));
    let from_identity = || {
        platform::first_stable_mac()
            .map(|mac| HostToken::from_host_identity(&platform::hostname(), &mac))
    };

    let derived = match config.naming.token_source {
        TokenSource::MachineId => from_machine_id().or_else(from_identity),
        TokenSource::Hostname => from_identity(),
        TokenSource::Random => None,
    };
    derived.unwrap_or_else(|| persistent_random_token(&config.archive.spool_dir))
}

fn persistent_random_token(spool_dir: &Path) -> HostToken {
    let path = spool_dir.join(".host-token");
    if let Ok(saved) = std::fs::read_to_string(&path) {
        if let Some(token) = HostToken::parse(&saved) {
            return token;
        }
    }
    let token = HostToken::random();
    if std::fs::create_dir_all(spool_dir).is_ok() {
        if let Err(err) = std::fs::write(&path, format!("{}\n", token)) {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "could not persist host token; it will change on the next run"
            );
        }
    }
    token
}
