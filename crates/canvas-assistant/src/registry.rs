//! Capability registry

use std::collections::HashMap;
use std::sync::Arc;

use canvas_ai::CapabilitySchema;
use serde_json::Value;

use crate::capability::BoxedCapability;
use crate::error::{CapabilityError, Error, Result};

/// Ordered set of capabilities available to one conversation.
///
/// Schemas are compiled once at registration; the registry is read-only
/// once handed to a conversation.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<BoxedCapability>,
    validators: HashMap<String, Arc<jsonschema::Validator>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, rejecting duplicate names and uncompilable schemas
    pub fn register(&mut self, capability: BoxedCapability) -> Result<()> {
        let name = capability.name().to_string();
        if self.validators.contains_key(&name) {
            return Err(Error::DuplicateCapability(name));
        }

        let schema = capability.parameters_schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| Error::InvalidSchema {
            name: name.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(capability = %name, "registered capability");
        self.validators.insert(name, Arc::new(validator));
        self.capabilities.push(capability);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, capability: BoxedCapability) -> Result<Self> {
        self.register(capability)?;
        Ok(self)
    }

    /// Look up a capability by name
    pub fn get(&self, name: &str) -> Option<&BoxedCapability> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    /// Capability names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Check arguments against the capability's compiled schema
    pub fn validate(&self, name: &str, arguments: &Value) -> std::result::Result<(), CapabilityError> {
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        match validate_with_validator(arguments, validator) {
            Some(message) => Err(CapabilityError::Validation(message)),
            None => Ok(()),
        }
    }

    /// Function-calling declarations for the backend, in registration order
    pub fn schemas(&self) -> Vec<CapabilitySchema> {
        self.capabilities
            .iter()
            .map(|c| {
                CapabilitySchema::new(
                    c.name(),
                    c.description(),
                    render_schema(c.parameters_schema()),
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

/// Convert a parameter schema into the backend's declaration format
fn render_schema(schema: Value) -> Value {
    match schema {
        Value::Object(mut map) => {
            map.remove("$schema");
            map.entry("type")
                .or_insert_with(|| Value::String("object".to_string()));
            Value::Object(map)
        }
        other => other,
    }
}

/// Validate arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(args: &Value, validator: &jsonschema::Validator) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}
