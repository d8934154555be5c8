use avl_ingest::cmd::{Args, Command};
use avl_ingest::avl::server::{self, ServerConfig};
use avl_ingest::registry::{self, RegistryTx};
use avl_ingest::simulate::{self, SimulateOpts};
use avl_ingest::{Result, alerts, tracer};
use clap::Parser;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _ = tracer::setup_simple_tracing();

    match args.cmd {
        Command::Serve {
            port,
            bind,
            devices,
            idle_timeout_secs,
            strict_handshake,
            no_auto_register,
            speed_alert_kmh,
        } => {
            let seeds = match devices {
                Some(path) => registry::load_seeds(&path)?,
                None => Vec::new(),
            };
            let registry = RegistryTx::with_seeds(!no_auto_register, seeds)?;
            if let Some(threshold) = speed_alert_kmh {
                alerts::spawn_speed_monitor(&registry, threshold);
            }
            let cfg = ServerConfig {
                idle_timeout: Duration::from_secs(idle_timeout_secs),
                strict_handshake,
            };
            server::run(&bind, port, cfg, registry).await?;
        }
        Command::Simulate {
            host,
            port,
            identity,
            count,
            records,
            extended,
            interval_ms,
        } => {
            simulate::run(SimulateOpts {
                host,
                port,
                identity,
                units: count,
                records_per_unit: records,
                extended,
                interval: Duration::from_millis(interval_ms),
            })
            .await?;
        }
    }

    Ok(())
}
