//! Process startup: config → providers → memory → agents → networks.

use std::sync::Arc;

use anyhow::{Context, bail};
use conclave_agent::{AgentFactory, AgentRegistry, RuntimeLimits};
use conclave_config::AppConfig;
use conclave_core::error::BuildError;
use conclave_core::event::EventBus;
use conclave_core::thread::ThreadStore;
use conclave_core::tool::ToolRegistry;
use conclave_memory::{FileThreadStore, InMemoryThreadStore, ThreadManager};
use tracing::{error, info};

/// Everything built at startup.
pub struct Runtime {
    pub config: AppConfig,
    pub registry: Arc<AgentRegistry>,
    pub threads: Arc<ThreadManager>,
    /// Agents and networks that failed to build, by id or name
    pub failures: Vec<(String, BuildError)>,
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

/// Build the runtime. Individual agent or network failures are collected,
/// not fatal.
pub fn build(config: AppConfig) -> anyhow::Result<Runtime> {
    let events = Arc::new(EventBus::default());

    let store: Arc<dyn ThreadStore> = match config.memory.backend.as_str() {
        "memory" => Arc::new(InMemoryThreadStore::new()),
        "file" => Arc::new(FileThreadStore::open(config.memory.resolved_path())),
        other => bail!("Unknown memory backend '{other}' (expected \"memory\" or \"file\")"),
    };
    let threads = Arc::new(ThreadManager::new(store).with_events(events.clone()));

    let providers = conclave_providers::build_from_config(&config);
    let factory = AgentFactory::new(Arc::new(ToolRegistry::new()), Arc::new(providers))
        .with_events(events)
        .with_limits(RuntimeLimits::from(&config.runtime));

    let (mut registry, mut failures) = factory.build_all(&config.agents, threads.clone());

    for network in &config.networks {
        let model = config.network_model(network);
        match factory.build_network(network, &model, &registry, threads.clone()) {
            Ok(router) => registry.register_network(router),
            Err(e) => {
                error!(network = %network.name, error = %e, "Network construction failed");
                failures.push((network.name.clone(), e));
            }
        }
    }

    info!(
        agents = registry.len(),
        networks = registry.networks().len(),
        failures = failures.len(),
        memory = threads.store_name(),
        "Runtime ready"
    );

    Ok(Runtime {
        config,
        registry: Arc::new(registry),
        threads,
        failures,
    })
}
