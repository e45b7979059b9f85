#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bioforge_engine::conversation::{
    ModelRequest, ModelResponse, ReasoningService, ToolInvocation, Turn,
};
use bioforge_engine::error::{ServiceError, SourceError};
use bioforge_engine::metrics::TokenUsage;
use bioforge_engine::source::{SourceDocument, SourceProvider};
use serde_json::Value;

pub const OBITUARY_URL: &str = "https://www.news.cn/20250901/obituary/c.html";

pub const OBITUARY: &str = "林炳尧同志，福建晋江人，1943年出生，1961年入伍，1964年加入中国共产党。\
                            1995年晋升为少将军衔，曾任原南京军区副司令员。";

/// Replays a fixed list of responses, then answers with text only.
pub struct ScriptedService {
    script: Mutex<VecDeque<Result<ModelResponse, ServiceError>>>,
    requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedService {
    pub fn new(script: impl IntoIterator<Item = Result<ModelResponse, ServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// History sent with call `index` (0-based).
    pub fn history(&self, index: usize) -> Vec<Turn> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedService {
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
        self.requests.lock().unwrap().push(request.history.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(text_only("Let me think about this.")))
    }
}

pub fn invoke(id: &str, name: &str, input: Value) -> ToolInvocation {
    ToolInvocation::new(id, name, input)
}

pub fn tools(invocations: Vec<ToolInvocation>) -> Result<ModelResponse, ServiceError> {
    Ok(ModelResponse {
        text: None,
        invocations,
        usage: TokenUsage::single_call(1200, 150),
    })
}

pub fn text_only(text: &str) -> ModelResponse {
    ModelResponse {
        text: Some(text.to_string()),
        invocations: Vec::new(),
        usage: TokenUsage::single_call(1200, 40),
    }
}

/// Tool results sent back in the last turn of `history`.
pub fn last_results(history: &[Turn]) -> Vec<bioforge_engine::conversation::ToolResultTurn> {
    match history.last() {
        Some(Turn::ToolResults(results)) => results.clone(),
        other => panic!("expected tool results, got {other:?}"),
    }
}

/// In-memory sources keyed by identifier.
#[derive(Default)]
pub struct FixedSources {
    documents: HashMap<String, SourceDocument>,
}

impl FixedSources {
    pub fn with(mut self, identifier: &str, document: SourceDocument) -> Self {
        self.documents.insert(identifier.to_string(), document);
        self
    }
}

#[async_trait]
impl SourceProvider for FixedSources {
    async fn fetch(&self, identifier: &str) -> Result<SourceDocument, SourceError> {
        self.documents
            .get(identifier)
            .cloned()
            .ok_or_else(|| SourceError::Unavailable {
                identifier: identifier.to_string(),
                message: "no such document".to_string(),
            })
    }
}
