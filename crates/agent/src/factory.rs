//! Agent factory — turns `AgentConfig` records into runnable agents.
//!
//! Construction is fail-fast and side-effect free: no network calls, and
//! an agent either builds completely or not at all.

use std::sync::Arc;

use conclave_config::NetworkConfig;
use conclave_core::agent::{AgentConfig, ModelParams};
use conclave_core::error::BuildError;
use conclave_core::event::EventBus;
use conclave_core::tool::ToolRegistry;
use conclave_memory::ThreadManager;
use conclave_providers::ProviderRouter;
use tracing::{error, info};

use crate::agent::{Agent, AgentParts, RuntimeLimits};
use crate::error_handler::{ErrorHandler, RoutingErrorHandler, SafeErrorHandler};
use crate::hook::{HookOptions, ResponseValidationHook};
use crate::network::{NetworkRouter, RoutingFallback, composite_instructions, network_decorator};
use crate::registry::AgentRegistry;

/// Builds agents and networks against shared tool and provider registries.
pub struct AgentFactory {
    tools: Arc<ToolRegistry>,
    providers: Arc<ProviderRouter>,
    events: Arc<EventBus>,
    limits: RuntimeLimits,
}

impl AgentFactory {
    pub fn new(tools: Arc<ToolRegistry>, providers: Arc<ProviderRouter>) -> Self {
        Self {
            tools,
            providers,
            events: Arc::new(EventBus::default()),
            limits: RuntimeLimits::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_limits(mut self, limits: RuntimeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Build one agent.
    ///
    /// Checks run in order: required fields, tools (every missing id is
    /// reported), then the model provider.
    pub fn build(
        &self,
        config: &AgentConfig,
        memory: Arc<ThreadManager>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Result<Agent, BuildError> {
        for (field, value) in [
            ("id", &config.id),
            ("name", &config.name),
            ("instructions", &config.instructions),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::empty_field(field));
            }
        }

        let resolution = self.tools.resolve(&config.tools);
        if !resolution.is_complete() {
            return Err(BuildError::MissingTools {
                agent_id: config.id.clone(),
                missing: resolution.missing,
            });
        }

        let model = self.providers.model_handle(&config.model)?;

        let hook = ResponseValidationHook::new(
            config
                .response_validation
                .map(HookOptions::from)
                .unwrap_or_else(HookOptions::generic),
        );

        let error_handler = error_handler.unwrap_or_else(|| {
            Arc::new(SafeErrorHandler::new().with_events(self.events.clone()))
        });

        info!(
            agent_id = %config.id,
            provider = %config.model.provider,
            model = %config.model.model,
            tools = resolution.found.len(),
            "Agent built"
        );

        Ok(Agent::from_parts(AgentParts {
            config: config.clone(),
            model,
            tools: resolution.found,
            hook,
            error_handler,
            memory,
            events: self.events.clone(),
            limits: self.limits,
        }))
    }

    /// Build every config independently.
    ///
    /// A failing config is logged and reported but never blocks the others.
    /// Later duplicates of an id are rejected.
    pub fn build_all(
        &self,
        configs: &[AgentConfig],
        memory: Arc<ThreadManager>,
    ) -> (AgentRegistry, Vec<(String, BuildError)>) {
        let mut registry = AgentRegistry::new();
        let mut failures = Vec::new();

        for config in configs {
            let result = if registry.get(&config.id).is_some() {
                Err(BuildError::Configuration {
                    field: "id".into(),
                    reason: format!("duplicates an earlier agent '{}'", config.id),
                })
            } else {
                self.build(config, memory.clone(), None)
            };

            match result {
                Ok(agent) => registry.register(Arc::new(agent)),
                Err(e) => {
                    error!(agent_id = %config.id, error = %e, "Agent construction failed");
                    failures.push((config.id.clone(), e));
                }
            }
        }

        (registry, failures)
    }

    /// Build a network over agents already in `registry`.
    pub fn build_network(
        &self,
        config: &NetworkConfig,
        model: &ModelParams,
        registry: &AgentRegistry,
        memory: Arc<ThreadManager>,
    ) -> Result<NetworkRouter, BuildError> {
        if config.name.trim().is_empty() {
            return Err(BuildError::empty_field("name"));
        }
        if config.agents.is_empty() {
            return Err(BuildError::empty_field("agents"));
        }

        let roster = config
            .agents
            .iter()
            .map(|id| {
                registry.get(id).ok_or_else(|| BuildError::Configuration {
                    field: "agents".into(),
                    reason: format!("references unavailable agent '{id}'"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fallback: RoutingFallback =
            config
                .fallback
                .parse()
                .map_err(|reason| BuildError::Configuration {
                    field: "fallback".into(),
                    reason,
                })?;

        let options = config
            .response_validation
            .map(HookOptions::from)
            .unwrap_or_else(HookOptions::generic)
            .with_decorator(network_decorator(config.name.clone(), roster.len()));

        let coordinator = AgentConfig {
            model: model.clone(),
            ..AgentConfig::new(
                config.name.clone(),
                config.name.clone(),
                composite_instructions(&config.instructions, &roster),
            )
        };

        let coordinator = Agent::from_parts(AgentParts {
            model: self.providers.model_handle(&coordinator.model)?,
            config: coordinator,
            tools: Default::default(),
            hook: ResponseValidationHook::new(options),
            error_handler: Arc::new(RoutingErrorHandler::new(
                config.name.clone(),
                Some(self.events.clone()),
            )),
            memory,
            events: self.events.clone(),
            limits: self.limits,
        });

        info!(
            network = %config.name,
            roster = roster.len(),
            fallback = ?fallback,
            "Network built"
        );

        Ok(NetworkRouter::new(
            config.name.clone(),
            roster,
            coordinator,
            fallback,
            self.events.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::Verdict;
    use crate::test_helpers::{EchoTool, SequentialMockProvider};
    use conclave_core::agent::ValidationPolicy;
    use conclave_core::response::AgentResponse;

    fn factory(tools: ToolRegistry) -> AgentFactory {
        let mut providers = ProviderRouter::new();
        providers.register("mock", Arc::new(SequentialMockProvider::new(vec![])));
        AgentFactory::new(Arc::new(tools), Arc::new(providers))
    }

    fn config(id: &str) -> AgentConfig {
        AgentConfig::new(id, "Test", "Be useful.").with_model("mock", "mock-model")
    }

    fn memory() -> Arc<ThreadManager> {
        Arc::new(ThreadManager::in_memory())
    }

    #[test]
    fn builds_with_exact_tool_map() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let agent = factory(tools)
            .build(&config("echoer").with_tools(["echo"]), memory(), None)
            .unwrap();
        assert_eq!(agent.tool_ids(), vec!["echo"]);
    }

    #[test]
    fn tool_map_excludes_unrequested_tools() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let agent = factory(tools).build(&config("plain"), memory(), None).unwrap();
        assert!(agent.tool_ids().is_empty());
        assert!(!agent.has_tool("echo"));
    }

    #[test]
    fn hook_follows_authored_policy() {
        let f = factory(ToolRegistry::new());
        let short = AgentResponse::text("hello");

        let generic = f.build(&config("plain"), memory(), None).unwrap();
        assert_eq!(generic.hook().check(&short), Verdict::Valid);

        let strict = f
            .build(
                &config("strict").with_validation(ValidationPolicy {
                    min_response_length: 10,
                    max_attempts: 2,
                }),
                memory(),
                None,
            )
            .unwrap();
        assert_eq!(strict.hook().check(&short), Verdict::Short);
        assert_eq!(strict.hook().options().max_attempts, 2);
    }

    #[test]
    fn missing_tools_listed_exactly() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let err = factory(tools)
            .build(
                &config("needs-search").with_tools(["web-search", "echo", "github", "web-search"]),
                memory(),
                None,
            )
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingTools {
                agent_id: "needs-search".into(),
                missing: vec!["web-search".into(), "github".into()],
            }
        );
    }

    #[test]
    fn empty_fields_named() {
        let f = factory(ToolRegistry::new());
        for (cfg, field) in [
            (AgentConfig::new("", "n", "i"), "id"),
            (AgentConfig::new("a", "  ", "i"), "name"),
            (AgentConfig::new("a", "n", ""), "instructions"),
        ] {
            match f.build(&cfg.with_model("mock", "m"), memory(), None) {
                Err(BuildError::Configuration { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected configuration error, got {other:?}"),
            }
        }
    }

    #[test]
    fn field_check_precedes_tool_check() {
        let err = factory(ToolRegistry::new())
            .build(&AgentConfig::new("", "n", "i").with_tools(["nope"]), memory(), None)
            .unwrap_err();
        assert!(matches!(err, BuildError::Configuration { .. }));
    }

    #[test]
    fn unknown_provider_fails_build() {
        let err = factory(ToolRegistry::new())
            .build(&AgentConfig::new("a", "n", "i").with_model("nowhere", "m"), memory(), None)
            .unwrap_err();
        assert!(matches!(err, BuildError::ProviderConfiguration { .. }));
    }

    #[test]
    fn build_all_isolates_failures_and_duplicates() {
        let configs = vec![
            config("good"),
            config("bad").with_tools(["missing"]),
            config("good"),
            config("also-good"),
        ];
        let (registry, failures) = factory(ToolRegistry::new()).build_all(&configs, memory());

        assert_eq!(registry.agent_ids(), vec!["good", "also-good"]);
        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0].1, BuildError::MissingTools { .. }));
        assert!(matches!(
            &failures[1].1,
            BuildError::Configuration { field, .. } if field == "id"
        ));
    }

    #[test]
    fn network_requires_known_roster() {
        let f = factory(ToolRegistry::new());
        let (registry, _) = f.build_all(&[config("a")], memory());
        let network = NetworkConfig {
            name: "team".into(),
            instructions: String::new(),
            agents: vec!["a".into(), "ghost".into()],
            model: None,
            fallback: "none".into(),
            response_validation: None,
        };
        let model = ModelParams {
            provider: "mock".into(),
            ..ModelParams::default()
        };
        let err = f
            .build_network(&network, &model, &registry, memory())
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn network_instructions_list_roster() {
        let f = factory(ToolRegistry::new());
        let (registry, _) = f.build_all(
            &[
                config("researcher").with_description("Finds sources on the web"),
                config("writer"),
            ],
            memory(),
        );
        let network = NetworkConfig {
            name: "team".into(),
            instructions: "Answer research questions.".into(),
            agents: vec!["researcher".into(), "writer".into()],
            model: None,
            fallback: "scoring".into(),
            response_validation: None,
        };
        let model = ModelParams {
            provider: "mock".into(),
            ..ModelParams::default()
        };
        let router = f.build_network(&network, &model, &registry, memory()).unwrap();

        let instructions = router.instructions();
        assert!(instructions.starts_with("Answer research questions."));
        assert!(instructions.contains("- researcher: Finds sources on the web"));
        assert!(instructions.contains("- writer: Test"));
        assert!(instructions.contains("narrowest agent"));
        assert_eq!(router.fallback(), RoutingFallback::Scoring);
    }
}
