//! Lookup table for built agents and networks.

use std::collections::HashMap;
use std::sync::Arc;

use conclave_core::error::InvocationError;
use conclave_core::message::Message;
use conclave_core::response::AgentResponse;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, InvokeOptions};
use crate::network::NetworkRouter;

/// The body of an agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub messages: Vec<Message>,
}

impl InvokeRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// A single user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(vec![Message::user(content)])
    }
}

/// Agents by id and networks by name. Listing order is registration order.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<Agent>>,
    order: Vec<String>,
    networks: HashMap<String, Arc<NetworkRouter>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any previous one with the same id.
    pub fn register(&mut self, agent: Arc<Agent>) {
        let id = agent.id().to_string();
        if self.agents.insert(id.clone(), agent).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Agent>> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect()
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn register_network(&mut self, network: NetworkRouter) {
        self.networks
            .insert(network.name().to_string(), Arc::new(network));
    }

    pub fn network(&self, name: &str) -> Option<Arc<NetworkRouter>> {
        self.networks.get(name).cloned()
    }

    /// All networks, sorted by name.
    pub fn networks(&self) -> Vec<Arc<NetworkRouter>> {
        let mut networks: Vec<_> = self.networks.values().cloned().collect();
        networks.sort_by(|a, b| a.name().cmp(b.name()));
        networks
    }

    /// Invoke an agent by id.
    ///
    /// Only caller errors surface as `Err`; everything else comes back as a
    /// safe response.
    pub async fn invoke(
        &self,
        agent_id: &str,
        request: InvokeRequest,
        options: InvokeOptions,
    ) -> Result<AgentResponse, InvocationError> {
        let agent = self
            .get(agent_id)
            .ok_or_else(|| InvocationError::UnknownAgent(agent_id.to_string()))?;
        agent.generate(request.messages, &options).await
    }

    /// Route a task through a named network.
    pub async fn route(
        &self,
        network: &str,
        task: &str,
        options: InvokeOptions,
    ) -> Result<AgentResponse, InvocationError> {
        let router = self
            .network(network)
            .ok_or_else(|| InvocationError::UnknownNetwork(network.to_string()))?;
        if task.trim().is_empty() {
            return Err(InvocationError::EmptyMessages);
        }
        Ok(router
            .route(task, options.thread_id, options.resource_id)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::AgentFactory;
    use crate::test_helpers::SequentialMockProvider;
    use conclave_config::NetworkConfig;
    use conclave_core::agent::{AgentConfig, ModelParams};
    use conclave_core::tool::ToolRegistry;
    use conclave_memory::ThreadManager;
    use conclave_providers::ProviderRouter;

    fn registry_with(provider: SequentialMockProvider, ids: &[&str]) -> AgentRegistry {
        let mut providers = ProviderRouter::new();
        providers.register("mock", Arc::new(provider));
        let factory = AgentFactory::new(Arc::new(ToolRegistry::new()), Arc::new(providers));
        let configs: Vec<AgentConfig> = ids
            .iter()
            .map(|id| AgentConfig::new(*id, *id, "Help.").with_model("mock", "m"))
            .collect();
        let memory = Arc::new(ThreadManager::in_memory());
        let (mut registry, failures) = factory.build_all(&configs, memory.clone());
        assert!(failures.is_empty());

        let network = NetworkConfig {
            name: "team".into(),
            instructions: String::new(),
            agents: ids.iter().map(|s| s.to_string()).collect(),
            model: None,
            fallback: "none".into(),
            response_validation: None,
        };
        let model = ModelParams {
            provider: "mock".into(),
            ..ModelParams::default()
        };
        let router = factory
            .build_network(&network, &model, &registry, memory)
            .unwrap();
        registry.register_network(router);
        registry
    }

    #[test]
    fn list_keeps_registration_order() {
        let registry = registry_with(SequentialMockProvider::new(vec![]), &["zeta", "alpha"]);
        assert_eq!(registry.agent_ids(), vec!["zeta", "alpha"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.networks().len(), 1);
    }

    #[tokio::test]
    async fn invoke_unknown_agent() {
        let registry = registry_with(SequentialMockProvider::new(vec![]), &["a"]);
        let err = registry
            .invoke("ghost", InvokeRequest::user("hi"), InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownAgent(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn invoke_empty_messages() {
        let registry = registry_with(SequentialMockProvider::new(vec![]), &["a"]);
        let err = registry
            .invoke("a", InvokeRequest::new(vec![]), InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::EmptyMessages));
    }

    #[tokio::test]
    async fn invoke_known_agent() {
        let registry = registry_with(
            SequentialMockProvider::single_text("A perfectly adequate answer."),
            &["a"],
        );
        let response = registry
            .invoke("a", InvokeRequest::user("hi"), InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text, "A perfectly adequate answer.");
    }

    #[tokio::test]
    async fn route_unknown_network() {
        let registry = registry_with(SequentialMockProvider::new(vec![]), &["a"]);
        let err = registry
            .route("nope", "do things", InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownNetwork(_)));
        assert!(err.is_caller_error());
    }
}
