//! `conclave route` — Route one task through a network.

use conclave_agent::InvokeOptions;

use crate::bootstrap;
use crate::commands::ask::print_response;

pub async fn run(network: &str, task: &str, resource: Option<String>) -> anyhow::Result<()> {
    let runtime = bootstrap::build(bootstrap::load_config()?)?;

    let options = InvokeOptions {
        thread_id: None,
        resource_id: resource,
    };

    eprint!("  Routing...");
    let response = runtime.registry.route(network, task, options).await;
    eprint!("\r             \r");

    let response = response?;
    if let Some(agents) = response.metadata.get("agents_invoked") {
        eprintln!("  agents: {agents}");
    }
    print_response(&response);
    Ok(())
}
