//! `conclave serve` — Start the HTTP API server.

use crate::bootstrap;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = bootstrap::load_config()?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let runtime = bootstrap::build(config)?;
    for (id, err) in &runtime.failures {
        eprintln!("  skipped {id}: {err}");
    }

    println!("Conclave Gateway");
    println!(
        "   Listening: {}:{}",
        runtime.config.gateway.host, runtime.config.gateway.port
    );
    println!(
        "   Agents: {}  Networks: {}",
        runtime.registry.len(),
        runtime.registry.networks().len()
    );

    conclave_gateway::start(&runtime.config.gateway, runtime.registry, runtime.threads).await?;
    Ok(())
}
