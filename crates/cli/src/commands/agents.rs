//! `conclave agents` — Build every configured agent and network and report.

use crate::bootstrap;

pub async fn run() -> anyhow::Result<()> {
    let runtime = bootstrap::build(bootstrap::load_config()?)?;

    println!("Agents ({})", runtime.registry.len());
    for agent in runtime.registry.list() {
        let tools = agent.tool_ids();
        println!(
            "  {:<20} {}/{}  tools: {}",
            agent.id(),
            agent.config().model.provider,
            agent.model().model,
            if tools.is_empty() {
                "-".to_string()
            } else {
                tools.join(", ")
            }
        );
    }

    let networks = runtime.registry.networks();
    if !networks.is_empty() {
        println!();
        println!("Networks ({})", networks.len());
        for network in networks {
            println!(
                "  {:<20} roster: {}  fallback: {}",
                network.name(),
                network.roster_ids().join(", "),
                network.fallback().as_str()
            );
        }
    }

    if !runtime.failures.is_empty() {
        println!();
        println!("Failed ({})", runtime.failures.len());
        for (id, err) in &runtime.failures {
            println!("  {id:<20} {err}");
        }
        anyhow::bail!("{} definition(s) failed to build", runtime.failures.len());
    }

    Ok(())
}
