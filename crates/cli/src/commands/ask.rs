//! `conclave ask` — Send one message to an agent.

use conclave_agent::{InvokeOptions, InvokeRequest};
use conclave_core::response::AgentResponse;

use crate::bootstrap;

pub async fn run(
    agent_id: &str,
    message: String,
    resource: Option<String>,
    thread: Option<String>,
) -> anyhow::Result<()> {
    let runtime = bootstrap::build(bootstrap::load_config()?)?;

    let options = InvokeOptions {
        thread_id: thread.map(Into::into),
        resource_id: resource,
    };

    eprint!("  Thinking...");
    let response = runtime
        .registry
        .invoke(agent_id, InvokeRequest::user(message), options)
        .await;
    eprint!("\r              \r");

    print_response(&response?);
    Ok(())
}

pub fn print_response(response: &AgentResponse) {
    if response.has_text() {
        println!("{}", response.text);
    }
    if let Some(object) = response.object.as_ref().filter(|_| response.has_object()) {
        println!(
            "{}",
            serde_json::to_string_pretty(object).unwrap_or_else(|_| object.to_string())
        );
    }
    if let Some(thread_id) = &response.thread_id {
        eprintln!("  thread: {thread_id}");
    }
    if let Some(error) = &response.error {
        eprintln!("  error: {error}");
    }
}
