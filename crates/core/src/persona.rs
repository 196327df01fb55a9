//! Personas: named agent configurations a turn can run as.
//!
//! A persona is a system prompt plus an optional tool allowlist and model
//! override. The registry is built once from configuration and shared
//! read-only by every loop and session.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Error, TurnError};

/// Immutable description of one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaContext {
    /// Unique id, e.g. "planner", "joke_writer"
    pub id: String,

    /// One-line summary shown to other personas when they consider delegating
    #[serde(default)]
    pub description: String,

    /// Instructions sent as the system prompt on every model call
    pub system_prompt: String,

    /// Tools this persona may call; `None` means every registered tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<BTreeSet<String>>,

    /// Model to use instead of the loop's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl PersonaContext {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            allowed_tools: None,
            model: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Restrict the persona to the named tools.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether this persona may call `tool_name`.
    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|tools| tools.contains(tool_name))
    }
}

/// All personas known to a runtime, keyed by id.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: BTreeMap<String, Arc<PersonaContext>>,
    default_id: String,
}

impl PersonaRegistry {
    /// Build a registry. Ids must be unique and non-empty, and `default_id`
    /// must name one of the personas.
    pub fn new(personas: Vec<PersonaContext>, default_id: &str) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        for persona in personas {
            if persona.id.trim().is_empty() {
                return Err(Error::Config {
                    message: "persona id must not be empty".into(),
                });
            }
            if map.contains_key(&persona.id) {
                return Err(Error::Config {
                    message: format!("duplicate persona id '{}'", persona.id),
                });
            }
            map.insert(persona.id.clone(), Arc::new(persona));
        }

        if !map.contains_key(default_id) {
            return Err(Error::Config {
                message: format!("default persona '{}' is not defined", default_id),
            });
        }

        Ok(Self {
            personas: map,
            default_id: default_id.to_string(),
        })
    }

    /// A registry holding exactly one persona, which is also the default.
    pub fn single(persona: PersonaContext) -> Self {
        let default_id = persona.id.clone();
        let mut personas = BTreeMap::new();
        personas.insert(default_id.clone(), Arc::new(persona));
        Self {
            personas,
            default_id,
        }
    }

    /// Resolve a persona by id.
    pub fn get(&self, id: &str) -> Result<Arc<PersonaContext>, TurnError> {
        self.personas
            .get(id)
            .cloned()
            .ok_or_else(|| TurnError::UnknownPersona(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.personas.contains_key(id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn default_persona(&self) -> Arc<PersonaContext> {
        // `new` and `single` both guarantee the default exists.
        self.personas[&self.default_id].clone()
    }

    /// Persona ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.personas.keys().map(|s| s.as_str()).collect()
    }

    /// Every persona in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PersonaContext>> {
        self.personas.values()
    }

    /// Every persona except `id`, in id order.
    pub fn others<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Arc<PersonaContext>> + 'a {
        self.personas.values().filter(move |p| p.id != id)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
