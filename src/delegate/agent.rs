// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agents that delegated tasks run on.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Reply from one agent conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
    /// Steps the agent used to produce the reply.
    pub steps: u32,
    pub tokens_used: u64,
}

impl AgentReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            steps: 1,
            tokens_used: 0,
        }
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }
}

/// A conversational agent: text in, text out.
#[async_trait]
pub trait Chatter: Send + Sync {
    async fn chat(&self, prompt: &str) -> Result<AgentReply, AgentError>;
}

/// Creates agents by name.
pub trait SubagentFactory: Send + Sync {
    fn has_agent(&self, name: &str) -> bool;

    /// A fresh agent, or `None` for an unknown name.
    fn create(&self, name: &str) -> Option<Arc<dyn Chatter>>;
}

type Constructor = Arc<dyn Fn() -> Arc<dyn Chatter> + Send + Sync>;

/// [`SubagentFactory`] over a table of named constructors.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, replacing any previous one for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Chatter> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_agent<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Arc<dyn Chatter> + Send + Sync + 'static,
    {
        self.register(name, constructor);
        self
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl SubagentFactory for AgentRegistry {
    fn has_agent(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    fn create(&self, name: &str) -> Option<Arc<dyn Chatter>> {
        self.constructors.get(name).map(|constructor| constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Chatter for Echo {
        async fn chat(&self, prompt: &str) -> Result<AgentReply, AgentError> {
            Ok(AgentReply::text(prompt))
        }
    }

    #[tokio::test]
    async fn test_registry_creates_by_name() {
        let registry = AgentRegistry::new().with_agent("echo", || Arc::new(Echo) as Arc<dyn Chatter>);

        assert!(registry.has_agent("echo"));
        assert!(!registry.has_agent("missing"));
        assert!(registry.create("missing").is_none());

        let agent = registry.create("echo").unwrap();
        let reply = agent.chat("hi").await.unwrap();
        assert_eq!(reply.content, "hi");
        assert_eq!(reply.steps, 1);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = AgentRegistry::new();
        registry
            .register("b", || Arc::new(Echo) as Arc<dyn Chatter>)
            .register("a", || Arc::new(Echo) as Arc<dyn Chatter>)
            .register("a", || Arc::new(Echo) as Arc<dyn Chatter>);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
