//! The research agent: a tool-calling conversation loop.
//!
//! Each user message runs one turn. A turn keeps asking the model for a
//! completion and executing the tool calls it requests, in request order,
//! until the model replies with no tool calls. Tool failures never abort a
//! turn; they go back to the model as text it can react to. The loop itself
//! is unbounded, so whoever drives the agent decides when a runaway
//! conversation stops (interactive callers by closing, harnesses by
//! exhausting their scripted model).

use anyhow::Result;
use std::sync::Arc;

use crate::bridge::ToolDispatch;
use crate::llm::{ChatMessage, ChatModel};

pub const RESEARCH_ASSISTANT_PROMPT: &str = "\
You are a research assistant with access to a local library of research papers and to arXiv.

Workflow:
1. Always consult the local library first with research_paper_probe.
2. If the library cannot answer (low confidence or no sources), search arXiv with search_arxiv and present the results as a numbered list with titles, years, and one-line summaries.
3. When asked to expand the library, download the most relevant papers with download_paper. Download at most 3 papers per request.
4. After downloading, probe the library again to answer the original question.

Always cite paper titles and years in your answers. If neither the library nor arXiv yields an answer, say so plainly.";

pub struct ResearchAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolDispatch>,
    system_prompt: String,
    history: Vec<ChatMessage>,
}

impl ResearchAgent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn ToolDispatch>) -> Self {
        Self::with_system_prompt(model, tools, RESEARCH_ASSISTANT_PROMPT)
    }

    pub fn with_system_prompt(
        model: Arc<dyn ChatModel>,
        tools: Arc<dyn ToolDispatch>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
        }
    }

    /// Run one conversational turn. History is updated only when the whole
    /// turn succeeds, so a failed turn can be retried cleanly.
    pub async fn chat(&mut self, user_message: &str) -> Result<String> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(user_message));
        let messages = self.run_turn(messages).await?;
        self.history = messages;
        Ok(last_assistant_content(&self.history))
    }

    /// One-shot variant that leaves no trace in the agent's history.
    pub async fn chat_single(&self, user_message: &str) -> Result<String> {
        let messages = self.run_turn(vec![ChatMessage::user(user_message)]).await?;
        Ok(last_assistant_content(&messages))
    }

    async fn run_turn(&self, mut messages: Vec<ChatMessage>) -> Result<Vec<ChatMessage>> {
        self.tools.connect().await?;
        let specs = self.tools.tool_specs().await?;

        loop {
            let mut request = Vec::with_capacity(messages.len() + 1);
            request.push(ChatMessage::system(&self.system_prompt));
            request.extend(messages.iter().cloned());

            let reply = self.model.complete(&request, &specs).await?;
            let tool_calls = reply.tool_calls.clone();
            messages.push(reply);

            if tool_calls.is_empty() {
                return Ok(messages);
            }

            for call in &tool_calls {
                let output = if !self.tools.has_tool(&call.name) {
                    "bad tool name, retry".to_string()
                } else {
                    match self.tools.dispatch(&call.name, &call.arguments).await {
                        Ok(result) => result,
                        Err(e) => format!("Error: {}", e),
                    }
                };
                messages.push(ChatMessage::tool_result(&call.id, &call.name, output));
            }
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn close(&self) {
        self.tools.close();
    }
}

fn last_assistant_content(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "assistant")
        .map(|m| m.content.clone())
        .unwrap_or_default()
}
