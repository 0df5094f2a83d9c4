//! Prompt rendering for the model service.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::capability::CapabilityKind;
use crate::core::types::Backlog;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASKS_TEMPLATE: &str = "<AI TASKS>{{ ai }}</AI TASKS>\n<USER TASKS>{{ user }}</USER TASKS>";

/// Capability summary for template rendering.
#[derive(Debug, Clone, Serialize)]
struct CapabilityContext {
    name: &'static str,
    description: &'static str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)?;
        env.add_template("tasks", TASKS_TEMPLATE)?;
        Ok(Self { env })
    }

    /// System instruction describing the agent's role and capabilities.
    pub fn render_system(&self, max_calls: u32) -> Result<String> {
        let capabilities: Vec<CapabilityContext> = CapabilityKind::ALL
            .into_iter()
            .map(|kind| CapabilityContext {
                name: kind.name(),
                description: kind.description(),
            })
            .collect();
        let template = self.env.get_template("system")?;
        Ok(template.render(context! { capabilities => capabilities, max_calls => max_calls })?)
    }

    /// Initial user message: both backlog slots wrapped in their tags.
    pub fn render_tasks(&self, backlog: &Backlog) -> Result<String> {
        let template = self.env.get_template("tasks")?;
        Ok(template.render(context! { ai => &backlog.ai, user => &backlog.user })?)
    }
}
