//! A runnable agent: one `AgentConfig` bound to a model, tools and memory.
//!
//! Each turn follows the same loop:
//!
//! 1. Resolve the conversation thread and recall its recent history
//! 2. Send instructions + history + new messages to the model
//! 3. If the model calls tools, execute them, append results, go to 2
//! 4. Pass the final answer through the response validation hook
//! 5. Record the exchange on the thread
//!
//! Model and tool calls are wrapped in timeouts. A model timeout counts as
//! an empty answer; every other failure goes to the agent's error handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use conclave_config::RuntimeConfig;
use conclave_core::agent::AgentConfig;
use conclave_core::error::{Error, InvocationError};
use conclave_core::event::{DomainEvent, EventBus};
use conclave_core::message::{Message, MessageToolCall, Role};
use conclave_core::provider::{ModelHandle, ProviderRequest, ProviderResponse, ToolDefinition};
use conclave_core::response::AgentResponse;
use conclave_core::thread::ThreadId;
use conclave_core::tool::{Tool, ToolResult};
use conclave_memory::ThreadManager;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error_handler::{ErrorContext, ErrorHandler};
use crate::hook::ResponseValidationHook;
use crate::stream_event::AgentStreamEvent;

/// Timeouts and loop bounds applied to every invocation.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeLimits {
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub max_tool_iterations: u32,
    pub history_limit: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for RuntimeLimits {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            model_timeout: Duration::from_secs(config.model_timeout_secs),
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
            max_tool_iterations: config.max_tool_iterations,
            history_limit: config.history_limit,
        }
    }
}

/// Which thread an invocation records on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeOptions {
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

impl InvokeOptions {
    pub fn with_thread(mut self, thread_id: impl Into<ThreadId>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

/// Result of a full invocation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: AgentResponse,
    /// Generation attempts made by the validation hook
    pub attempts: u32,
    /// Names of tools the model called, in call order
    pub tools_invoked: Vec<String>,
}

pub(crate) struct AgentParts {
    pub config: AgentConfig,
    pub model: ModelHandle,
    pub tools: HashMap<String, Arc<dyn Tool>>,
    pub hook: ResponseValidationHook,
    pub error_handler: Arc<dyn ErrorHandler>,
    pub memory: Arc<ThreadManager>,
    pub events: Arc<EventBus>,
    pub limits: RuntimeLimits,
}

/// An immutable, shareable agent. Built by [`AgentFactory`](crate::AgentFactory).
pub struct Agent {
    config: AgentConfig,
    model: ModelHandle,
    tools: HashMap<String, Arc<dyn Tool>>,
    hook: ResponseValidationHook,
    error_handler: Arc<dyn ErrorHandler>,
    memory: Arc<ThreadManager>,
    events: Arc<EventBus>,
    limits: RuntimeLimits,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.config.id)
            .field("model", &self.model)
            .field("tools", &self.tool_ids())
            .finish()
    }
}

impl Agent {
    pub(crate) fn from_parts(parts: AgentParts) -> Self {
        Self {
            config: parts.config,
            model: parts.model,
            tools: parts.tools,
            hook: parts.hook,
            error_handler: parts.error_handler,
            memory: parts.memory,
            events: parts.events,
            limits: parts.limits,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn instructions(&self) -> &str {
        &self.config.instructions
    }

    /// What this agent is for, as shown to routing models.
    pub fn purpose(&self) -> &str {
        self.config.purpose()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn hook(&self) -> &ResponseValidationHook {
        &self.hook
    }

    pub fn memory(&self) -> &Arc<ThreadManager> {
        &self.memory
    }

    /// Resolved tool ids, sorted.
    pub fn tool_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn has_tool(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Generate a validated answer for `messages`.
    pub async fn generate(
        &self,
        messages: Vec<Message>,
        options: &InvokeOptions,
    ) -> Result<AgentResponse, InvocationError> {
        Ok(self.run(messages, options, &[]).await?.response)
    }

    /// Generate with additional per-call tools available to the model.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        options: &InvokeOptions,
        extra_tools: &[Arc<dyn Tool>],
    ) -> Result<Completion, InvocationError> {
        if messages.is_empty() {
            return Err(InvocationError::EmptyMessages);
        }
        let started = Instant::now();

        let thread_id = match self.resolve_thread(options).await {
            Ok(id) => id,
            Err(response) => {
                return Ok(Completion {
                    response,
                    attempts: 0,
                    tools_invoked: Vec::new(),
                });
            }
        };

        let conversation = self.conversation(thread_id.as_ref(), &messages).await;
        self.record_input(thread_id.as_ref(), &messages).await;
        let invoked = Mutex::new(Vec::new());

        let (response, attempts) = {
            let conversation = &conversation;
            let invoked = &invoked;
            let thread = thread_id.as_ref();
            self.hook
                .run_counted(move |attempt| async move {
                    debug!(agent_id = %self.id(), attempt, "Generating response");
                    let result = self
                        .run_turn(conversation.clone(), extra_tools, invoked, None)
                        .await;
                    self.settle(result, thread)
                })
                .await
        };

        let tools_invoked = invoked.into_inner().unwrap_or_else(PoisonError::into_inner);
        let response = self
            .record(thread_id.as_ref(), response, attempts, started)
            .await;
        Ok(Completion {
            response,
            attempts,
            tools_invoked,
        })
    }

    /// Stream an answer. Chunks are forwarded as they arrive; the final
    /// `done` event carries the validated response.
    pub fn stream(
        self: &Arc<Self>,
        messages: Vec<Message>,
        options: InvokeOptions,
    ) -> Result<mpsc::Receiver<AgentStreamEvent>, InvocationError> {
        if messages.is_empty() {
            return Err(InvocationError::EmptyMessages);
        }
        let (tx, rx) = mpsc::channel(64);
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            agent.stream_task(messages, options, tx).await;
        });
        Ok(rx)
    }

    async fn stream_task(
        &self,
        messages: Vec<Message>,
        options: InvokeOptions,
        tx: mpsc::Sender<AgentStreamEvent>,
    ) {
        let started = Instant::now();
        let thread_id = match self.resolve_thread(&options).await {
            Ok(id) => id,
            Err(response) => {
                finish_stream(&tx, response).await;
                return;
            }
        };

        let conversation = self.conversation(thread_id.as_ref(), &messages).await;
        self.record_input(thread_id.as_ref(), &messages).await;
        let invoked = Mutex::new(Vec::new());
        let streamed = self.stream_turn(conversation.clone(), &tx, &invoked).await;
        let first = Mutex::new(Some(streamed));

        let (response, attempts) = {
            let conversation = &conversation;
            let invoked = &invoked;
            let first = &first;
            let thread = thread_id.as_ref();
            self.hook
                .run_counted(move |attempt| async move {
                    let streamed = first.lock().unwrap_or_else(PoisonError::into_inner).take();
                    let result = match streamed {
                        Some(result) => result,
                        None => {
                            debug!(agent_id = %self.id(), attempt, "Regenerating streamed response");
                            self.run_turn(conversation.clone(), &[], invoked, None).await
                        }
                    };
                    self.settle(result, thread)
                })
                .await
        };

        let response = self
            .record(thread_id.as_ref(), response, attempts, started)
            .await;
        finish_stream(&tx, response).await;
    }

    async fn resolve_thread(&self, options: &InvokeOptions) -> Result<Option<ThreadId>, AgentResponse> {
        match self
            .memory
            .resolve(options.thread_id.as_ref(), options.resource_id.as_deref())
            .await
        {
            Ok(thread) => Ok(thread.map(|t| t.id)),
            Err(e) => Err(self
                .error_handler
                .handle(ErrorContext::agent(self.id()), &Error::Memory(e))),
        }
    }

    async fn conversation(&self, thread_id: Option<&ThreadId>, messages: &[Message]) -> Vec<Message> {
        let mut conversation = vec![Message::system(self.instructions())];
        if let Some(id) = thread_id {
            match self.memory.recent_messages(id, self.limits.history_limit).await {
                Ok(history) => {
                    if !history.is_empty() {
                        debug!(thread_id = %id, count = history.len(), "Recalled thread history");
                    }
                    conversation.extend(history);
                }
                Err(e) => warn!(thread_id = %id, error = %e, "Thread history unavailable"),
            }
        }
        conversation.extend(messages.iter().cloned());
        conversation
    }

    /// Map one attempt's outcome to what the hook sees.
    fn settle(
        &self,
        result: Result<AgentResponse, Error>,
        thread_id: Option<&ThreadId>,
    ) -> Result<AgentResponse, Error> {
        match result {
            Ok(response) => Ok(response),
            Err(Error::Invocation(InvocationError::Timeout { timeout_secs })) => {
                warn!(agent_id = %self.id(), timeout_secs, "Model call timed out, treating as empty");
                Ok(AgentResponse::empty())
            }
            Err(e) => {
                let mut context =
                    ErrorContext::agent(self.id()).with_thread(thread_id.map(ThreadId::as_str));
                if let Error::Invocation(InvocationError::ToolExecution { tool_id, .. }) = &e {
                    context = context.with_tool(tool_id);
                }
                Ok(self.error_handler.handle(context, &e))
            }
        }
    }

    async fn run_turn(
        &self,
        mut conversation: Vec<Message>,
        extra_tools: &[Arc<dyn Tool>],
        invoked: &Mutex<Vec<String>>,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<AgentResponse, Error> {
        let definitions = self.tool_definitions(extra_tools);
        let mut last_content = String::new();

        for iteration in 1..=self.limits.max_tool_iterations.max(1) {
            debug!(agent_id = %self.id(), iteration, "Agent loop iteration");

            let request = self.model.request(conversation.clone(), definitions.clone());
            let response = self.call_model(request).await?;

            if response.message.tool_calls.is_empty() {
                return Ok(AgentResponse {
                    text: response.message.content,
                    object: response.structured,
                    ..AgentResponse::default()
                });
            }

            debug!(
                agent_id = %self.id(),
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );
            let tool_calls = response.message.tool_calls.clone();
            last_content = response.message.content.clone();
            conversation.push(response.message);

            for tc in &tool_calls {
                invoked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(tc.name.clone());
                let result = self.execute_tool(tc, extra_tools, events).await?;
                conversation.push(Message::tool_result(&tc.id, result.output));
            }
        }

        warn!(
            agent_id = %self.id(),
            max_iterations = self.limits.max_tool_iterations,
            "Max tool iterations reached"
        );
        Ok(AgentResponse::text(last_content))
    }

    /// Like `run_turn`, but requests a streamed completion and forwards chunks.
    async fn stream_turn(
        &self,
        mut conversation: Vec<Message>,
        tx: &mpsc::Sender<AgentStreamEvent>,
        invoked: &Mutex<Vec<String>>,
    ) -> Result<AgentResponse, Error> {
        let definitions = self.tool_definitions(&[]);
        let mut last_content = String::new();

        for iteration in 1..=self.limits.max_tool_iterations.max(1) {
            debug!(agent_id = %self.id(), iteration, "Streaming loop iteration");

            let mut request = self.model.request(conversation.clone(), definitions.clone());
            request.stream = true;
            let mut chunks =
                match tokio::time::timeout(self.limits.model_timeout, self.model.provider.stream(request))
                    .await
                {
                    Ok(rx) => rx?,
                    Err(_) => return Err(self.model_timeout()),
                };

            let mut content = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            loop {
                let next = tokio::time::timeout(self.limits.model_timeout, chunks.recv())
                    .await
                    .map_err(|_| self.model_timeout())?;
                let Some(chunk) = next else { break };
                let chunk = chunk?;
                if let Some(text) = chunk.content {
                    content.push_str(&text);
                    let _ = tx.send(AgentStreamEvent::Chunk { content: text }).await;
                }
                tool_calls.extend(chunk.tool_calls);
                if chunk.done {
                    break;
                }
            }

            if tool_calls.is_empty() {
                return Ok(AgentResponse::text(content));
            }

            let mut assistant = Message::assistant(&content);
            assistant.tool_calls = tool_calls.clone();
            conversation.push(assistant);
            last_content = content;

            for tc in &tool_calls {
                invoked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(tc.name.clone());
                let result = self.execute_tool(tc, &[], Some(tx)).await?;
                conversation.push(Message::tool_result(&tc.id, result.output));
            }
        }

        Ok(AgentResponse::text(last_content))
    }

    async fn call_model(&self, request: ProviderRequest) -> Result<ProviderResponse, Error> {
        match tokio::time::timeout(self.limits.model_timeout, self.model.provider.complete(request)).await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.model_timeout()),
        }
    }

    fn model_timeout(&self) -> Error {
        InvocationError::Timeout {
            timeout_secs: self.limits.model_timeout.as_secs(),
        }
        .into()
    }

    fn tool_definitions(&self, extra_tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.to_definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions.extend(extra_tools.iter().map(|t| t.to_definition()));
        definitions
    }

    /// Execute one tool call. Tool failures are never retried here.
    async fn execute_tool(
        &self,
        tc: &MessageToolCall,
        extra_tools: &[Arc<dyn Tool>],
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<ToolResult, Error> {
        let tool = self
            .tools
            .get(&tc.name)
            .or_else(|| extra_tools.iter().find(|t| t.name() == tc.name))
            .cloned()
            .ok_or_else(|| self.tool_failure(&tc.name, "tool is not available to this agent"))?;

        let arguments: serde_json::Value = if tc.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&tc.arguments)
                .map_err(|e| self.tool_failure(&tc.name, format!("invalid arguments: {e}")))?
        };

        if let Some(tx) = events {
            let _ = tx
                .send(AgentStreamEvent::ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: arguments.clone(),
                })
                .await;
        }

        let start = Instant::now();
        let outcome = if tool.self_limiting() {
            Ok(tool.execute(arguments).await)
        } else {
            tokio::time::timeout(self.limits.tool_timeout, tool.execute(arguments)).await
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(result)) => Ok(ToolResult {
                call_id: tc.id.clone(),
                ..result
            }),
            Ok(Err(e)) => Err(self.tool_failure(&tc.name, e.to_string())),
            Err(_) => Err(self.tool_failure(
                &tc.name,
                format!("timed out after {}s", self.limits.tool_timeout.as_secs()),
            )),
        };

        self.events.publish(DomainEvent::ToolExecuted {
            agent_id: self.id().to_string(),
            tool_name: tc.name.clone(),
            success: result.as_ref().is_ok_and(|r| r.success),
            duration_ms,
            timestamp: Utc::now(),
        });

        if let (Some(tx), Ok(r)) = (events, &result) {
            let _ = tx
                .send(AgentStreamEvent::ToolResult {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    output: r.output.clone(),
                    success: r.success,
                })
                .await;
        }

        result
    }

    fn tool_failure(&self, tool_id: &str, reason: impl Into<String>) -> Error {
        InvocationError::ToolExecution {
            agent_id: self.id().to_string(),
            tool_id: tool_id.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    /// Append the caller's messages to the thread before generating, so
    /// anything recorded during the turn (delegated roster exchanges)
    /// follows the message that caused it.
    async fn record_input(&self, thread_id: Option<&ThreadId>, messages: &[Message]) {
        let Some(id) = thread_id else { return };
        let input: Vec<Message> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        if let Err(e) = self.memory.append_messages(id, input).await {
            warn!(thread_id = %id, error = %e, "Failed to record input on thread");
        }
    }

    /// Append the answer to the thread, stamp the thread id and publish.
    async fn record(
        &self,
        thread_id: Option<&ThreadId>,
        mut response: AgentResponse,
        attempts: u32,
        started: Instant,
    ) -> AgentResponse {
        if let Some(id) = thread_id {
            if response.has_text() && !response.is_error() {
                let answer = vec![Message::assistant(&response.text)];
                if let Err(e) = self.memory.append_messages(id, answer).await {
                    warn!(thread_id = %id, error = %e, "Failed to record answer on thread");
                }
            }
            response.thread_id = Some(id.to_string());
        }

        info!(
            agent_id = %self.id(),
            attempts,
            success = !response.is_error(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Agent invocation complete"
        );
        self.events.publish(DomainEvent::AgentInvoked {
            agent_id: self.id().to_string(),
            thread_id: response.thread_id.clone(),
            attempts,
            success: !response.is_error(),
            timestamp: Utc::now(),
        });
        response
    }
}

async fn finish_stream(tx: &mpsc::Sender<AgentStreamEvent>, response: AgentResponse) {
    if let Some(message) = &response.error {
        let _ = tx
            .send(AgentStreamEvent::Error {
                message: message.clone(),
            })
            .await;
    }
    let _ = tx.send(AgentStreamEvent::Done { response }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::SafeErrorHandler;
    use crate::hook::{ELABORATION_OFFER, EMPTY_RESPONSE_ERROR, HookOptions};
    use crate::test_helpers::{
        EchoTool, FailingTool, SequentialMockProvider, SlowProvider, make_text_response,
        make_tool_call, make_tool_call_response,
    };
    use conclave_core::response::APOLOGY_TEXT;

    fn agent_with(provider: Arc<SequentialMockProvider>, tools: Vec<Arc<dyn Tool>>) -> Agent {
        agent_on(provider, tools, RuntimeLimits::default())
    }

    fn agent_on(
        provider: Arc<dyn conclave_core::provider::Provider>,
        tools: Vec<Arc<dyn Tool>>,
        limits: RuntimeLimits,
    ) -> Agent {
        let config = AgentConfig::new("helper", "Helper", "You help.")
            .with_tools(tools.iter().map(|t| t.name().to_string()));
        Agent::from_parts(AgentParts {
            config,
            model: ModelHandle {
                provider,
                model: "mock-model".into(),
                temperature: 0.0,
                max_tokens: None,
            },
            tools: tools.into_iter().map(|t| (t.name().to_string(), t)).collect(),
            hook: ResponseValidationHook::new(HookOptions::default()),
            error_handler: Arc::new(SafeErrorHandler::new()),
            memory: Arc::new(ThreadManager::in_memory()),
            events: Arc::new(EventBus::default()),
            limits,
        })
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let agent = agent_with(provider.clone(), vec![]);

        let response = agent
            .generate(vec![Message::user("Hello!")], &InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(response, AgentResponse::text("Hello! How can I help?"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_messages_rejected() {
        let agent = agent_with(Arc::new(SequentialMockProvider::new(vec![])), vec![]);
        let err = agent.generate(vec![], &InvokeOptions::default()).await.unwrap_err();
        assert!(matches!(err, InvocationError::EmptyMessages));
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("echo", serde_json::json!({"text": "ping"}))],
            "",
            "The echo said ping.",
        ));
        let agent = agent_with(provider.clone(), vec![Arc::new(EchoTool)]);

        let completion = agent
            .run(vec![Message::user("echo ping")], &InvokeOptions::default(), &[])
            .await
            .unwrap();
        assert_eq!(completion.response.text, "The echo said ping.");
        assert_eq!(completion.tools_invoked, vec!["echo"]);

        // Second request carries the tool result
        let requests = provider.requests();
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("ping"));
    }

    #[tokio::test]
    async fn tool_failure_becomes_safe_apology() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("flaky", serde_json::json!({}))],
            "",
        )]));
        let agent = agent_with(provider.clone(), vec![Arc::new(FailingTool)]);

        let response = agent
            .generate(vec![Message::user("try it")], &InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text, APOLOGY_TEXT);
        assert_eq!(response.error.as_deref(), Some("Tool execution failed"));
        assert!(!response.text.contains("backend exploded"));
        // Tool errors are not retried
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_call_is_tool_failure() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("not-mine", serde_json::json!({}))],
            "",
        )]));
        let agent = agent_with(provider, vec![]);
        let response = agent
            .generate(vec![Message::user("hi")], &InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(response.error.as_deref(), Some("Tool execution failed"));
    }

    #[tokio::test]
    async fn short_answer_is_augmented() {
        let provider = Arc::new(SequentialMockProvider::single_text("Yes."));
        let agent = agent_with(provider, vec![]);
        let response = agent
            .generate(vec![Message::user("Is it?")], &InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text, format!("Yes.{ELABORATION_OFFER}"));
    }

    #[tokio::test]
    async fn model_timeout_consumes_attempts() {
        let limits = RuntimeLimits {
            model_timeout: Duration::from_millis(20),
            ..RuntimeLimits::default()
        };
        let provider = Arc::new(SlowProvider::new(Duration::from_secs(5)));
        let agent = agent_on(provider.clone(), vec![], limits);

        let completion = agent
            .run(vec![Message::user("hi")], &InvokeOptions::default(), &[])
            .await
            .unwrap();
        assert_eq!(completion.attempts, 3);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(completion.response.error.as_deref(), Some(EMPTY_RESPONSE_ERROR));
    }

    #[tokio::test]
    async fn thread_history_is_shared_across_calls() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Nice to meet you, Ada."),
            make_text_response("Your name is Ada, as you said."),
        ]));
        let agent = agent_with(provider.clone(), vec![]);
        let options = InvokeOptions::default().with_resource("user-1");

        let first = agent
            .generate(vec![Message::user("I'm Ada")], &options)
            .await
            .unwrap();
        let thread_id = first.thread_id.clone().unwrap();

        let second = agent
            .generate(vec![Message::user("What's my name?")], &options)
            .await
            .unwrap();
        assert_eq!(second.thread_id.as_deref(), Some(thread_id.as_str()));

        // system + 2 recalled + new user message
        let requests = provider.requests();
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[1].content, "I'm Ada");
    }

    #[tokio::test]
    async fn stream_emits_chunks_then_done() {
        let provider = Arc::new(SequentialMockProvider::single_text("Streaming works fine."));
        let agent = Arc::new(agent_with(provider, vec![]));

        let mut rx = agent
            .stream(vec![Message::user("go")], InvokeOptions::default())
            .unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(&events[0], AgentStreamEvent::Chunk { content } if content == "Streaming works fine."));
        match events.last().unwrap() {
            AgentStreamEvent::Done { response } => {
                assert_eq!(response.text, "Streaming works fine.")
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_retries_empty_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(""),
            make_text_response("Second attempt answer."),
        ]));
        let agent = Arc::new(agent_with(provider, vec![]));

        let mut rx = agent
            .stream(vec![Message::user("go")], InvokeOptions::default())
            .unwrap();
        let mut done = None;
        while let Some(event) = rx.recv().await {
            if let AgentStreamEvent::Done { response } = event {
                done = Some(response);
            }
        }
        assert_eq!(done.unwrap().text, "Second attempt answer.");
    }
}
