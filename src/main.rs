use std::sync::Arc;

use anyhow::Context;

use mail2item::config::{Config, HostConfig};
use mail2item::mail::EmlDirectoryFolder;
use mail2item::pipeline::{Instance, Runner, RunnerSettings};
use mail2item::routing::MessageRouter;
use mail2item::workitems::{SimulatedWorkItemStore, WorkItemStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let host = HostConfig::from_env().context("reading host settings")?;
    let config = Config::load(&host.config_path)
        .with_context(|| format!("loading {}", host.config_path.display()))?;

    eprintln!("mail2item v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", host.config_path.display());
    eprintln!("   Mail dir: {}", host.mail_dir.display());
    eprintln!("   Instances: {}", config.instances.len());
    eprintln!(
        "   Iterations: {} every {:?} (timeout {:?}, threads: {})\n",
        host.iterations, host.interval, host.timeout_per_iteration, host.use_threads
    );

    let folder = EmlDirectoryFolder::open(&host.mail_dir)
        .with_context(|| format!("opening mail folder {}", host.mail_dir.display()))?;
    let router = Arc::new(MessageRouter::new(Arc::new(folder)));

    if let Some(dir) = &host.snapshot_path {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
    }

    let mut instances = Vec::with_capacity(config.instances.len());
    for instance_config in config.instances {
        let mut store =
            SimulatedWorkItemStore::new(instance_config.work_items.conversation_index_field.clone());
        if let Some(dir) = &host.snapshot_path {
            store = store.with_snapshot_path(dir.join(format!("{}.json", instance_config.name)));
        }
        let store: Arc<dyn WorkItemStore> = Arc::new(store);

        let name = instance_config.name.clone();
        let instance = Instance::new(instance_config, Arc::clone(&router), store)
            .with_context(|| format!("registering instance {name}"))?;
        instances.push(instance);
    }

    let runner = Runner::new(router, instances, RunnerSettings::from(&host));
    runner.run().await.context("running instances")?;

    tracing::info!("mail2item finished");
    Ok(())
}
