//! The session loop — one orchestrated run of prompt → events → outcome.
//!
//! A session moves `Idle → Running → (ToolDispatch)* → Terminated`. While
//! running it feeds the conversation to the provider, dispatches requested
//! tool calls sequentially (the loop suspends until each result is back),
//! and feeds results into the conversation so the agent can keep reasoning.
//! Tool invocations are checked against an allow-list at the boundary; the
//! model only ever sees, and can only ever reach, the allowed set.
//!
//! Failure contract: provider errors abort the run and propagate — retry is
//! the caller's business. Tool failures never abort; they come back to the
//! agent as error results. Side effects already performed (a sent email)
//! are never rolled back.

use attache_core::error::{Error, ToolError};
use attache_core::event::{DomainEvent, EventBus};
use attache_core::message::{Conversation, Message};
use attache_core::provider::{Provider, ProviderRequest, ToolDefinition};
use attache_core::tool::{ToolCall, ToolRegistry, ToolResult};
use attache_telemetry::PricingTable;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_MAX_ITERATIONS: u32 = 16;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    ToolDispatch,
    Terminated,
}

/// The immutable terminal record of a session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Whether the run reached a normal terminal event.
    pub success: bool,
    /// Wall-clock duration of the whole session.
    pub duration_ms: u64,
    /// Accumulated cost, when the pricing table knew the model.
    /// `None` means unknown, not zero.
    pub cost_usd: Option<f64>,
    /// Number of provider calls made.
    pub llm_calls: u32,
    /// Number of tool invocations dispatched (including rejected ones).
    pub tool_dispatches: u32,
    /// The agent's final text.
    pub final_text: String,
}

impl SessionOutcome {
    /// Duration as seconds with two decimals, e.g. "2.50s".
    pub fn duration_display(&self) -> String {
        format!("{:.2}s", self.duration_ms as f64 / 1000.0)
    }

    /// Cost with four decimal places, e.g. "$0.0100".
    pub fn cost_display(&self) -> Option<String> {
        self.cost_usd.map(|c| format!("${c:.4}"))
    }

    /// The multi-line report shown to the operator at the end of a run.
    pub fn report(&self) -> String {
        let mut out = String::new();
        if self.success {
            out.push_str("Agent completed successfully\n");
        } else {
            out.push_str("Agent completed with error\n");
        }
        out.push_str(&format!("Duration: {}", self.duration_display()));
        if let Some(cost) = self.cost_display() {
            out.push_str(&format!("\nCost: {cost}"));
        }
        out
    }
}

/// Drives a single task-oriented conversation against a provider and a
/// permissioned tool set.
pub struct Session {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    allowed_tools: Vec<String>,
    pricing: Arc<PricingTable>,
    event_bus: Arc<EventBus>,
    max_iterations: u32,
    state: SessionState,
}

impl Session {
    /// Create a session bound to a tool set and an explicit allow-list of
    /// callable tool names.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        allowed_tools: Vec<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            allowed_tools,
            pricing: Arc::new(PricingTable::with_defaults()),
            event_bus,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            state: SessionState::Idle,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per provider response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of loop iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Replace the pricing table.
    pub fn with_pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session to termination.
    ///
    /// Errors from the provider (or a broken tool wiring) abort the run and
    /// are returned; the session is not restarted here.
    pub async fn run(
        &mut self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<SessionOutcome, Error> {
        // An allowed name with no registered tool is a wiring bug — catch
        // it before the first provider call.
        for name in &self.allowed_tools {
            if !self.tools.contains(name) {
                return Err(Error::config(format!(
                    "allowed tool '{name}' is not registered"
                )));
            }
        }

        let started = Instant::now();
        self.state = SessionState::Running;

        let mut conversation = Conversation::new();
        conversation.push(Message::system(system_instruction));
        conversation.push(Message::user(prompt));

        // The model only sees the allowed subset
        let definitions: Vec<ToolDefinition> = self
            .tools
            .definitions()
            .into_iter()
            .filter(|d| self.allowed_tools.iter().any(|n| n == &d.name))
            .collect();

        info!(
            conversation_id = %conversation.id,
            model = %self.model,
            tools = ?self.allowed_tools,
            "Session started"
        );

        let mut cost_usd: Option<f64> = None;
        let mut llm_calls = 0u32;
        let mut tool_dispatches = 0u32;
        let mut iteration = 0u32;

        loop {
            iteration += 1;
            if iteration > self.max_iterations {
                warn!(iterations = iteration, "Iteration ceiling reached, ending session");
                let final_text = "Reached the tool-call iteration limit before finishing. \
                                  The summary may be incomplete."
                    .to_string();
                return Ok(self.terminate(
                    true,
                    started,
                    cost_usd,
                    llm_calls,
                    tool_dispatches,
                    final_text,
                ));
            }

            debug!(iteration, "Session loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            let response = match self.provider.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    self.state = SessionState::Terminated;
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: "session".into(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e.into());
                }
            };

            llm_calls += 1;

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::LlmCompleted {
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });

                if let Some(c) = self.pricing.compute_cost(
                    &response.model,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                ) {
                    *cost_usd.get_or_insert(0.0) += c;
                }
            }

            // Surface text to observers — no semantic effect on the run
            if !response.message.content.is_empty() {
                self.event_bus.publish(DomainEvent::AssistantText {
                    content: response.message.content.clone(),
                    timestamp: Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                // Terminal event: a plain text turn
                let final_text = response.message.content.clone();
                conversation.push(response.message);
                return Ok(self.terminate(
                    true,
                    started,
                    cost_usd,
                    llm_calls,
                    tool_dispatches,
                    final_text,
                ));
            }

            // Dispatch tool invocations sequentially; the loop resumes only
            // once every result is back in the conversation.
            self.state = SessionState::ToolDispatch;
            let tool_calls = response.message.tool_calls.clone();
            conversation.push(response.message);

            for tc in &tool_calls {
                tool_dispatches += 1;

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                let dispatch_started = Instant::now();
                let result = if !self.allowed_tools.iter().any(|n| n == &tc.name) {
                    // Boundary rejection — covers unknown names too, since
                    // the allow-list was validated against the registry
                    warn!(tool = %tc.name, "Rejected tool invocation outside the allow-list");
                    ToolResult::error(
                        &tc.id,
                        format!("Tool '{}' is not permitted in this session", tc.name),
                    )
                } else {
                    match self.tools.execute(&call).await {
                        Ok(result) => result,
                        Err(e @ ToolError::NotFound(_)) => {
                            // Unreachable after the up-front check; treat as
                            // the wiring bug it is
                            self.state = SessionState::Terminated;
                            return Err(e.into());
                        }
                        Err(e) => ToolResult::error(&tc.id, e.to_string()),
                    }
                };
                let duration_ms = dispatch_started.elapsed().as_millis() as u64;

                self.event_bus.publish(DomainEvent::ToolDispatched {
                    tool_name: tc.name.clone(),
                    is_error: result.is_error,
                    duration_ms,
                    timestamp: Utc::now(),
                });

                let content = if result.is_error {
                    format!("Error: {}", result.output)
                } else {
                    result.output
                };
                conversation.push(Message::tool_result(&tc.id, content));
            }

            self.state = SessionState::Running;
        }
    }

    fn terminate(
        &mut self,
        success: bool,
        started: Instant,
        cost_usd: Option<f64>,
        llm_calls: u32,
        tool_dispatches: u32,
        final_text: String,
    ) -> SessionOutcome {
        self.state = SessionState::Terminated;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::SessionCompleted {
            success,
            duration_ms,
            cost_usd,
            timestamp: Utc::now(),
        });

        info!(success, duration_ms, llm_calls, tool_dispatches, "Session terminated");

        SessionOutcome {
            success,
            duration_ms,
            cost_usd,
            llm_calls,
            tool_dispatches,
            final_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attache_core::error::ProviderError;
    use attache_core::message::MessageToolCall;
    use attache_core::provider::{ProviderResponse, Usage};
    use attache_core::tool::Tool;
    use attache_telemetry::ModelPricing;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A provider that replays a script of responses and records requests.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted provider ran out of responses")
        }
    }

    fn text_response(text: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            }),
            model: "mock-model".into(),
        })
    }

    fn tool_call_response(tool: &str, args: &str) -> Result<ProviderResponse, ProviderError> {
        let mut message = Message::assistant("");
        message.tool_calls = vec![MessageToolCall {
            id: "toolu_1".into(),
            name: tool.into(),
            arguments: args.into(),
        }];
        Ok(ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            }),
            model: "mock-model".into(),
        })
    }

    /// A tool that records whether it ran.
    struct TracerTool {
        executed: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Tool for TracerTool {
        fn name(&self) -> &str {
            "tracer"
        }
        fn description(&self) -> &str {
            "Records executions"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, call: &ToolCall) -> ToolResult {
            self.executed.store(true, Ordering::SeqCst);
            ToolResult::ok(&call.id, "traced")
        }
    }

    fn registry_with_tracer() -> (Arc<ToolRegistry>, Arc<AtomicBool>) {
        let executed = Arc::new(AtomicBool::new(false));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(TracerTool {
            executed: executed.clone(),
        }));
        (Arc::new(registry), executed)
    }

    fn session(provider: Arc<ScriptedProvider>, tools: Arc<ToolRegistry>, allowed: Vec<String>) -> Session {
        Session::new(
            provider,
            "mock-model",
            tools,
            allowed,
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn text_only_run_terminates_successfully() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("All done.")]));
        let (tools, _) = registry_with_tracer();
        let mut s = session(provider, tools, vec!["tracer".into()]);

        assert_eq!(*s.state(), SessionState::Idle);
        let outcome = s.run("You are an assistant", "Do the thing").await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.llm_calls, 1);
        assert_eq!(outcome.tool_dispatches, 0);
        assert_eq!(outcome.final_text, "All done.");
        assert_eq!(*s.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn tool_round_trip_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tracer", "{}"),
            text_response("Done after tool."),
        ]));
        let (tools, executed) = registry_with_tracer();
        let mut s = session(provider.clone(), tools, vec!["tracer".into()]);

        let outcome = s.run("sys", "go").await.unwrap();

        assert!(executed.load(Ordering::SeqCst), "tool must have run");
        assert!(outcome.success);
        assert_eq!(outcome.llm_calls, 2);
        assert_eq!(outcome.tool_dispatches, 1);

        // The second request must carry the tool result back to the model
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let replayed = &requests[1].messages;
        assert!(
            replayed
                .iter()
                .any(|m| m.tool_call_id.as_deref() == Some("toolu_1") && m.content == "traced")
        );
    }

    #[tokio::test]
    async fn disallowed_tool_rejected_at_boundary() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tracer", "{}"),
            text_response("Understood, I can't use that."),
        ]));
        let (tools, executed) = registry_with_tracer();
        // Registered but NOT allowed
        let mut s = session(provider.clone(), tools, vec![]);

        let outcome = s.run("sys", "go").await.unwrap();

        assert!(!executed.load(Ordering::SeqCst), "tool must NOT have run");
        assert!(outcome.success);
        assert_eq!(outcome.tool_dispatches, 1);

        // The rejection is visible to the model as an error result
        let requests = provider.requests();
        let replayed = &requests[1].messages;
        assert!(replayed.iter().any(|m| m.content.contains("not permitted")));
        // And the model never saw the tool definition
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn invented_tool_name_rejected_not_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("made_up_tool", "{}"),
            text_response("Sorry about that."),
        ]));
        let (tools, _) = registry_with_tracer();
        let mut s = session(provider, tools, vec!["tracer".into()]);

        let outcome = s.run("sys", "go").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tool_dispatches, 1);
    }

    #[tokio::test]
    async fn allowed_tool_missing_from_registry_is_config_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (tools, _) = registry_with_tracer();
        let mut s = session(provider.clone(), tools, vec!["nonexistent".into()]);

        let err = s.run("sys", "go").await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        // Caught before any provider call
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn provider_error_aborts_and_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 529,
            message: "overloaded".into(),
        })]));
        let (tools, _) = registry_with_tracer();
        let mut s = session(provider, tools, vec!["tracer".into()]);

        let err = s.run("sys", "go").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(*s.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn iteration_ceiling_ends_with_explanatory_text() {
        // One iteration allowed; the first turn asks for a tool, so the
        // second iteration trips the ceiling.
        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_response(
            "tracer", "{}",
        )]));
        let (tools, _) = registry_with_tracer();
        let mut s = session(provider, tools, vec!["tracer".into()]).with_max_iterations(1);

        let outcome = s.run("sys", "go").await.unwrap();
        assert!(outcome.final_text.contains("iteration limit"));
        assert_eq!(*s.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn cost_accumulates_across_llm_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tracer", "{}"),
            text_response("Done."),
        ]));
        let (tools, _) = registry_with_tracer();

        let pricing = PricingTable::empty();
        // $10/M input, $20/M output → (100*10 + 50*20)/1M = 0.002 per call
        pricing.set("mock-model", ModelPricing::new(10.0, 20.0));

        let mut s = session(provider, tools, vec!["tracer".into()])
            .with_pricing(Arc::new(pricing));

        let outcome = s.run("sys", "go").await.unwrap();
        let cost = outcome.cost_usd.unwrap();
        assert!((cost - 0.004).abs() < 1e-10);
    }

    #[tokio::test]
    async fn unknown_model_cost_is_none_not_zero() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Done.")]));
        let (tools, _) = registry_with_tracer();
        let mut s = session(provider, tools, vec!["tracer".into()])
            .with_pricing(Arc::new(PricingTable::empty()));

        let outcome = s.run("sys", "go").await.unwrap();
        assert!(outcome.cost_usd.is_none());
        assert!(outcome.cost_display().is_none());
    }

    #[tokio::test]
    async fn events_published_for_observers() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello there.")]));
        let (tools, _) = registry_with_tracer();
        let mut s = Session::new(provider, "mock-model", tools, vec![], bus);

        s.run("sys", "go").await.unwrap();

        let mut saw_text = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::AssistantText { content, .. } => {
                    assert_eq!(content, "Hello there.");
                    saw_text = true;
                }
                DomainEvent::SessionCompleted { success, .. } => {
                    assert!(success);
                    saw_completed = true;
                }
                _ => {}
            }
        }
        assert!(saw_text);
        assert!(saw_completed);
    }

    #[test]
    fn outcome_report_formats_duration_and_cost() {
        let outcome = SessionOutcome {
            success: true,
            duration_ms: 2500,
            cost_usd: Some(0.01),
            llm_calls: 2,
            tool_dispatches: 1,
            final_text: "Done.".into(),
        };

        assert_eq!(outcome.duration_display(), "2.50s");
        assert_eq!(outcome.cost_display().as_deref(), Some("$0.0100"));

        let report = outcome.report();
        assert!(report.contains("Agent completed successfully"));
        assert!(report.contains("Duration: 2.50s"));
        assert!(report.contains("Cost: $0.0100"));
    }

    #[test]
    fn outcome_report_error_without_cost() {
        let outcome = SessionOutcome {
            success: false,
            duration_ms: 120,
            cost_usd: None,
            llm_calls: 1,
            tool_dispatches: 0,
            final_text: String::new(),
        };

        let report = outcome.report();
        assert!(report.contains("Agent completed with error"));
        assert!(report.contains("Duration: 0.12s"));
        assert!(!report.contains("Cost"));
    }
}
