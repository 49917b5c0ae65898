use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use std::process;
use std::sync::Arc;

use rotor_lib::blacklist::BlacklistRegistry;
use rotor_lib::command_runner::ShellCommandRunner;
use rotor_lib::endpoint::EndpointCatalog;
use rotor_lib::probe::HttpReachabilityProbe;
use rotor_lib::rng::OsRng;
use rotor_lib::routing::ip_route_ops::ShellIpRouteOps;
use rotor_lib::routing::iptables_ops::RealIptablesOps;
use rotor_lib::routing::RoutingSwitcher;
use rotor_lib::rotation::{Config, RotationManager};
use rotor_lib::tunnel::{SystemUidResolver, TunnelController, UidResolver};

mod cli;
mod logging;

// Avoid musl's default allocator due to degraded performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

async fn shutdown_signal(cancel: CancellationToken) -> Result<(), exitcode::ExitCode> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|error| {
        tracing::error!(?error, "error setting up SIGINT handler");
        exitcode::IOERR
    })?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|error| {
        tracing::error!(?error, "error setting up SIGTERM handler");
        exitcode::IOERR
    })?;

    tokio::spawn(async move {
        tokio::select! {
            Some(_) = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
            Some(_) = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}

async fn daemon(args: cli::Cli) -> Result<(), exitcode::ExitCode> {
    let catalog = EndpointCatalog::discover(&args.config_dir).map_err(|error| {
        tracing::error!(?error, "failed to load endpoint catalog");
        exitcode::NOINPUT
    })?;

    let protected_uid = SystemUidResolver.resolve(&args.protected_user).ok_or_else(|| {
        tracing::error!(user = %args.protected_user, "protected user account does not exist");
        exitcode::NOUSER
    })?;

    let runner: Arc<dyn rotor_lib::command_runner::CommandRunner> = Arc::new(ShellCommandRunner);
    let tunnel = TunnelController::new(runner.clone(), args.tunnel_client.clone(), args.connect_timeout);
    let probe = Box::new(HttpReachabilityProbe::new(runner.clone()));
    let iptables = RealIptablesOps::new().map_err(|error| {
        tracing::error!(%error, "failed to open iptables handle");
        exitcode::UNAVAILABLE
    })?;
    let ip_route = ShellIpRouteOps::new(runner.clone());
    let routing = RoutingSwitcher::new(Box::new(iptables), Box::new(ip_route), protected_uid);

    let config = Config {
        rotation_interval: args.rotation_interval,
        health_check_interval: args.health_check_interval,
        blacklist_ttl: args.blacklist_ttl,
        connect_timeout: args.connect_timeout,
    };

    let manager = RotationManager::new(
        catalog,
        BlacklistRegistry::new(args.blacklist_ttl),
        tunnel,
        probe,
        routing,
        Box::new(OsRng),
        config,
    );

    let cancel = CancellationToken::new();
    shutdown_signal(cancel.clone()).await?;

    manager.run(cancel).await.map_err(|error| {
        tracing::error!(%error, "rotation manager exited with an error");
        exitcode::SOFTWARE
    })
}

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    if let Err(error) = logging::init(&args.log_file, &args.log_filter) {
        eprintln!("failed to initialize logging at {}: {error}", args.log_file.display());
        process::exit(exitcode::IOERR);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting {}", env!("CARGO_PKG_NAME"));

    match daemon(args).await {
        Ok(()) => (),
        Err(code) => {
            tracing::warn!("abnormal exit");
            process::exit(code);
        }
    }
}
