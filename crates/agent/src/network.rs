//! Network router — one task, a fixed roster of agents.
//!
//! The routing model sees every roster agent as a tool taking a `task`
//! argument and decides which ones to call. Each call runs the roster agent
//! on the shared thread and feeds its answer back to the routing model.
//!
//! ```text
//!        task
//!         │
//!         ▼
//!  ┌───────────────┐  tool call  ┌──────────────┐
//!  │ routing model │ ──────────► │ roster agent │
//!  │               │ ◄────────── │              │
//!  └───────┬───────┘   answer    └──────────────┘
//!          │
//!          ▼
//!  validation hook ──► metadata stamp ──► AgentResponse
//! ```

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use conclave_core::error::{Error, ToolError};
use conclave_core::event::{DomainEvent, EventBus};
use conclave_core::message::Message;
use conclave_core::response::AgentResponse;
use conclave_core::thread::ThreadId;
use conclave_core::tool::{Tool, ToolResult};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::agent::{Agent, InvokeOptions};
use crate::error_handler::{ErrorContext, ErrorHandler, RoutingErrorHandler};
use crate::scoring;

/// What to do when model routing yields no usable answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingFallback {
    #[default]
    None,
    /// Delegate to the best keyword match from [`scoring::score_roster`]
    Scoring,
}

impl FromStr for RoutingFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "scoring" => Ok(Self::Scoring),
            other => Err(format!("unknown routing fallback '{other}'")),
        }
    }
}

impl RoutingFallback {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Scoring => "scoring",
        }
    }
}

/// Per-call routing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    Routing,
    SingleAgentInvoked,
    MultiAgentInvoked,
    Validating,
    Done,
    Errored,
}

impl RouteState {
    pub fn can_transition(self, next: RouteState) -> bool {
        use RouteState::*;
        matches!(
            (self, next),
            (Idle, Routing)
                | (Routing, SingleAgentInvoked | MultiAgentInvoked | Validating | Errored)
                | (SingleAgentInvoked, Validating)
                | (MultiAgentInvoked, Validating | Errored)
                | (Validating, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }
}

struct RouteTrace<'a> {
    network: &'a str,
    states: Vec<RouteState>,
}

impl<'a> RouteTrace<'a> {
    fn new(network: &'a str) -> Self {
        Self {
            network,
            states: vec![RouteState::Idle],
        }
    }

    fn current(&self) -> RouteState {
        self.states.last().copied().unwrap_or(RouteState::Idle)
    }

    fn advance(&mut self, next: RouteState) {
        let from = self.current();
        if from.can_transition(next) {
            debug!(network = self.network, ?from, to = ?next, "Route state");
        } else {
            warn!(network = self.network, ?from, to = ?next, "Unexpected route state transition");
        }
        self.states.push(next);
    }
}

/// Result of a routed call, for callers that want more than the response.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub response: AgentResponse,
    /// Roster agents the model called, first call first, no repeats
    pub agents_invoked: Vec<String>,
    pub states: Vec<RouteState>,
}

impl RouteOutcome {
    pub fn final_state(&self) -> RouteState {
        self.states.last().copied().unwrap_or(RouteState::Idle)
    }
}

/// A named roster of agents behind a routing model.
pub struct NetworkRouter {
    name: String,
    roster: Vec<Arc<Agent>>,
    coordinator: Agent,
    fallback: RoutingFallback,
    error_handler: RoutingErrorHandler,
    events: Arc<EventBus>,
}

impl std::fmt::Debug for NetworkRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRouter")
            .field("name", &self.name)
            .field("roster", &self.roster_ids())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// The routing model's instructions: authored guidance, the roster, and
/// coordination rules.
pub fn composite_instructions(guidance: &str, roster: &[Arc<Agent>]) -> String {
    let mut out = String::new();
    if !guidance.trim().is_empty() {
        out.push_str(guidance.trim());
        out.push_str("\n\n");
    }
    out.push_str(
        "You coordinate a team of specialist agents. Each agent is available as a tool \
         that takes a single `task` argument describing what it should do.\n\n## Agents\n",
    );
    for agent in roster {
        out.push_str(&format!("- {}: {}\n", agent.id(), agent.purpose()));
    }
    out.push_str(
        "\n## Guidelines\n\
         - Prefer the narrowest agent whose description matches the task.\n\
         - If the task needs several agents, call each of them and synthesize their outputs into one answer.\n\
         - If no agent fits, answer directly and briefly.\n",
    );
    out
}

impl NetworkRouter {
    pub(crate) fn new(
        name: String,
        roster: Vec<Arc<Agent>>,
        coordinator: Agent,
        fallback: RoutingFallback,
        events: Arc<EventBus>,
    ) -> Self {
        let error_handler = RoutingErrorHandler::new(&name, Some(events.clone()));
        Self {
            name,
            roster,
            coordinator,
            fallback,
            error_handler,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roster(&self) -> &[Arc<Agent>] {
        &self.roster
    }

    pub fn roster_ids(&self) -> Vec<&str> {
        self.roster.iter().map(|a| a.id()).collect()
    }

    pub fn fallback(&self) -> RoutingFallback {
        self.fallback
    }

    /// The composite instruction given to the routing model.
    pub fn instructions(&self) -> &str {
        self.coordinator.instructions()
    }

    /// Route a task to the roster and return the normalized answer.
    pub async fn route(
        &self,
        task: &str,
        thread_id: Option<ThreadId>,
        resource_id: Option<String>,
    ) -> AgentResponse {
        self.route_detailed(task, thread_id, resource_id).await.response
    }

    pub async fn route_detailed(
        &self,
        task: &str,
        thread_id: Option<ThreadId>,
        resource_id: Option<String>,
    ) -> RouteOutcome {
        let mut trace = RouteTrace::new(&self.name);
        trace.advance(RouteState::Routing);
        info!(network = %self.name, roster = self.roster.len(), "Routing task");

        if task.trim().is_empty() {
            let err = Error::Internal("task must not be empty".into());
            return self.fail(&err, Vec::new(), trace);
        }

        // Resolve once so the coordinator and every roster agent share the thread
        let thread = match self
            .coordinator
            .memory()
            .resolve(thread_id.as_ref(), resource_id.as_deref())
            .await
        {
            Ok(thread) => thread,
            Err(e) => return self.fail(&Error::Memory(e), Vec::new(), trace),
        };
        let options = InvokeOptions {
            thread_id: thread.map(|t| t.id),
            resource_id,
        };

        let roster_tools: Vec<Arc<dyn Tool>> = self
            .roster
            .iter()
            .map(|agent| Arc::new(RosterTool::new(agent.clone(), options.clone())) as Arc<dyn Tool>)
            .collect();

        let completion = match self
            .coordinator
            .run(vec![Message::user(task)], &options, &roster_tools)
            .await
        {
            Ok(completion) => completion,
            Err(e) => return self.fail(&Error::Invocation(e), Vec::new(), trace),
        };

        let mut agents_invoked: Vec<String> = Vec::new();
        for name in completion.tools_invoked {
            if !agents_invoked.contains(&name) && self.roster.iter().any(|a| a.id() == name) {
                agents_invoked.push(name);
            }
        }

        let mut response = completion.response;
        if response.error.as_deref() == Some(RoutingErrorHandler::ERROR) {
            if agents_invoked.len() > 1 {
                trace.advance(RouteState::MultiAgentInvoked);
            }
            trace.advance(RouteState::Errored);
        } else {
            if response.is_error() && self.fallback == RoutingFallback::Scoring {
                if let Some((agent_id, fallback)) = self.score_fallback(task, &options).await {
                    response = fallback;
                    if !agents_invoked.contains(&agent_id) {
                        agents_invoked.push(agent_id);
                    }
                }
            }
            match agents_invoked.len() {
                0 => {}
                1 => trace.advance(RouteState::SingleAgentInvoked),
                _ => trace.advance(RouteState::MultiAgentInvoked),
            }
            trace.advance(RouteState::Validating);
            trace.advance(RouteState::Done);
        }

        self.complete(response, agents_invoked, trace)
    }

    /// Hand the task to the best keyword match.
    async fn score_fallback(
        &self,
        task: &str,
        options: &InvokeOptions,
    ) -> Option<(String, AgentResponse)> {
        let best = scoring::best_match(task, self.roster.iter().map(|a| (a.id(), a.purpose())))?;
        let agent = self.roster.iter().find(|a| a.id() == best.agent_id)?;
        info!(
            network = %self.name,
            agent_id = %best.agent_id,
            score = best.score,
            "Model routing failed, using scoring fallback"
        );

        match agent.generate(vec![Message::user(task)], options).await {
            Ok(mut response) if !response.is_error() => {
                self.decorate(&mut response);
                response
                    .metadata
                    .insert("fallback".into(), json!("scoring"));
                Some((best.agent_id, response))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(network = %self.name, error = %e, "Scoring fallback failed");
                None
            }
        }
    }

    fn decorate(&self, response: &mut AgentResponse) {
        if let Some(decorate) = &self.coordinator.hook().options().decorate {
            decorate(response);
        }
    }

    fn fail(&self, err: &Error, agents_invoked: Vec<String>, mut trace: RouteTrace<'_>) -> RouteOutcome {
        trace.advance(RouteState::Errored);
        let mut response = self
            .error_handler
            .handle(ErrorContext::agent(&self.name), err);
        self.decorate(&mut response);
        self.complete(response, agents_invoked, trace)
    }

    fn complete(
        &self,
        mut response: AgentResponse,
        agents_invoked: Vec<String>,
        trace: RouteTrace<'_>,
    ) -> RouteOutcome {
        response
            .metadata
            .insert("agents_invoked".into(), json!(agents_invoked));

        let success = trace.current() == RouteState::Done && !response.is_error();
        self.events.publish(DomainEvent::RouteCompleted {
            network: self.name.clone(),
            agents_invoked: agents_invoked.clone(),
            success,
            timestamp: Utc::now(),
        });
        info!(
            network = %self.name,
            agents_invoked = agents_invoked.len(),
            success,
            "Routing complete"
        );

        RouteOutcome {
            response,
            agents_invoked,
            states: trace.states,
        }
    }
}

/// Metadata stamp applied to every network response.
pub(crate) fn network_decorator(
    network: String,
    agents_available: usize,
) -> impl Fn(&mut AgentResponse) + Send + Sync + 'static {
    move |response: &mut AgentResponse| {
        response.metadata.insert("network".into(), json!(network));
        response
            .metadata
            .insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        response
            .metadata
            .insert("agents_available".into(), json!(agents_available));
    }
}

/// A roster agent exposed to the routing model as a tool.
struct RosterTool {
    agent: Arc<Agent>,
    options: InvokeOptions,
}

impl RosterTool {
    fn new(agent: Arc<Agent>, options: InvokeOptions) -> Self {
        Self { agent, options }
    }
}

#[async_trait]
impl Tool for RosterTool {
    fn name(&self) -> &str {
        self.agent.id()
    }

    fn description(&self) -> &str {
        self.agent.purpose()
    }

    /// The roster agent applies its own model timeouts and retry budget.
    fn self_limiting(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What this agent should do, in plain language"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let task = arguments
            .get("task")
            .and_then(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'task' string".into()))?;

        debug!(agent_id = %self.agent.id(), "Delegating task to roster agent");
        let response = self
            .agent
            .generate(vec![Message::user(task)], &self.options)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.agent.id().to_string(),
                reason: e.to_string(),
            })?;

        let output = match (&response.object, response.has_text()) {
            (Some(object), false) => object.to_string(),
            _ => response.text.clone(),
        };
        Ok(ToolResult {
            call_id: String::new(),
            success: !response.is_error(),
            output,
            data: response.object,
        })
    }
}
