use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::domain::flow_template::FlowTemplate;
use crate::CoreError;

/// Catalog of flow templates
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct FlowRegistry {
    templates: HashMap<String, Arc<FlowTemplate>>,
}

impl FlowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a template
    pub fn register(&mut self, template: FlowTemplate) -> Result<(), CoreError> {
        template.validate()?;

        if self.templates.contains_key(template.name()) {
            return Err(CoreError::DuplicateTemplate(template.name().to_string()));
        }

        info!(template = %template.name(), nodes = template.len(), "Registered flow template");
        self.templates
            .insert(template.name().to_string(), Arc::new(template));
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, template: FlowTemplate) -> Result<Self, CoreError> {
        self.register(template)?;
        Ok(self)
    }

    /// Find a template by name
    pub fn lookup(&self, name: &str) -> Result<Arc<FlowTemplate>, CoreError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::TemplateNotFound(name.to_string()))
    }

    /// Whether a template is registered
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered template names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no template is registered
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow_template::NoopExecutor;

    fn template(name: &str) -> FlowTemplate {
        FlowTemplate::builder(name)
            .immediate("start", "end", "", Arc::new(NoopExecutor))
            .end("end")
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = FlowRegistry::new()
            .with(template("CreateCluster"))
            .unwrap()
            .with(template("DeleteCluster"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("CreateCluster"));
        assert_eq!(registry.lookup("DeleteCluster").unwrap().name(), "DeleteCluster");
        assert_eq!(registry.names(), vec!["CreateCluster", "DeleteCluster"]);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = FlowRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.lookup("ScaleOutCluster").unwrap_err(),
            CoreError::TemplateNotFound("ScaleOutCluster".to_string())
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = FlowRegistry::new();
        registry.register(template("Backup")).unwrap();

        let err = registry.register(template("Backup")).unwrap_err();
        assert_eq!(err, CoreError::DuplicateTemplate("Backup".to_string()));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_lookups_share_template() {
        let registry = FlowRegistry::new().with(template("Restore")).unwrap();
        let a = registry.lookup("Restore").unwrap();
        let b = registry.lookup("Restore").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
