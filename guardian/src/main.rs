// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use fastcrypto::traits::KeyPair;
use guardian::config::GuardianNodeConfig;
use guardian::node::run_guardian_node;
use guardian::server::GuardianNodePublicMetadata;
use guardian_config::Config;
use guardian_types::Environment;
use std::path::PathBuf;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// We already force devnet defaults to prevent security risks from operator
// error, but an extra warning won't hurt.
const DEV_WARNING: &str = r#"
        +++++++++++++++++++++++++++++++++++++++++++++++++++
        |   NODE IS RUNNING IN INSECURE DEVELOPMENT MODE  |
        |                                                 |
        |      Do not use unsafe-dev-net in prod.         |
        +++++++++++++++++++++++++++++++++++++++++++++++++++
"#;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version = VERSION)]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = GuardianNodeConfig::load(&args.config_path)
        .map_err(|e| anyhow::anyhow!("failed to load config {:?}: {e}", args.config_path))?;

    match config.environment {
        Environment::UnsafeDevNet => {
            println!("{DEV_WARNING}");
            println!("Not locking in memory.");
        }
        Environment::TestNet => {
            println!("Not locking in memory.");
        }
        Environment::MainNet => {
            // Refuse to run as root, and keep key material off swap.
            // Safety: plain libc calls with no memory arguments.
            unsafe {
                if libc::geteuid() == 0 {
                    eprintln!("can't run as uid 0");
                    std::process::exit(1);
                }
                if libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) != 0 {
                    eprintln!("failed to lock memory");
                    std::process::exit(1);
                }
            }
        }
    }

    let prometheus_registry = prometheus::Registry::new();

    // Init logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = VERSION, environment = %config.environment, "starting guardian node");

    let runtime = config.validate()?;
    // The node identity key doubles as the public metadata key.
    let metadata =
        GuardianNodePublicMetadata::new(VERSION, runtime.network_key.public().clone());

    let handles = run_guardian_node(runtime, metadata, prometheus_registry).await?;

    // Shut down cleanly on SIGTERM/ctrl-c.
    let shutdown = handles.shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal, exiting...");
        shutdown.cancel();
    });

    match handles.processor.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("processor exited with error: {e:?}")),
        Err(e) => Err(anyhow::anyhow!("Task join error: {e}")),
    }
}
