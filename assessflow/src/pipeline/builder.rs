//! Pipeline builder with validation.

use super::{ComponentDescriptor, PipelineSpec, StageSpec};
use crate::errors::PipelineValidationError;

/// Builder for creating validated pipelines.
///
/// ```
/// use assessflow::pipeline::{ComponentDescriptor, PipelineBuilder};
///
/// let spec = PipelineBuilder::new("audit")
///     .stage("collect")
///     .component(ComponentDescriptor::new("screenshots"))
///     .stage("analyze")
///     .component(ComponentDescriptor::new("vision").depends_on(["screenshots"]))
///     .finishing(ComponentDescriptor::new("scoring"))
///     .build()
///     .unwrap();
///
/// assert_eq!(spec.stages.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// Stages in insertion order; the last one receives new components.
    stages: Vec<StageSpec>,
    /// Finishing components.
    finishing: Vec<ComponentDescriptor>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            finishing: Vec::new(),
        }
    }

    /// Opens a new named stage.
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>) -> Self {
        self.stages.push(StageSpec::default().with_name(name));
        self
    }

    /// Adds a component to the current stage, opening one if needed.
    #[must_use]
    pub fn component(mut self, descriptor: ComponentDescriptor) -> Self {
        if self.stages.is_empty() {
            self.stages.push(StageSpec::default());
        }
        if let Some(stage) = self.stages.last_mut() {
            stage.components.push(descriptor);
        }
        self
    }

    /// Adds a whole stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Adds a finishing component.
    #[must_use]
    pub fn finishing(mut self, descriptor: ComponentDescriptor) -> Self {
        self.finishing.push(descriptor);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds and validates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (missing dependency, cycle, etc.)
    pub fn build(self) -> Result<PipelineSpec, PipelineValidationError> {
        let spec = PipelineSpec {
            name: self.name,
            stages: self.stages,
            finishing: self.finishing,
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_component_opens_implicit_stage() {
        let spec = PipelineBuilder::new("test")
            .component(ComponentDescriptor::new("a"))
            .component(ComponentDescriptor::new("b"))
            .build()
            .unwrap();

        assert_eq!(spec.stages.len(), 1);
        assert_eq!(spec.stages[0].components.len(), 2);
        assert!(spec.stages[0].name.is_none());
    }

    #[test]
    fn test_builder_with_dependencies() {
        let spec = PipelineBuilder::new("test")
            .stage("first")
            .component(ComponentDescriptor::new("a"))
            .stage("second")
            .component(ComponentDescriptor::new("b").depends_on(["a"]))
            .build()
            .unwrap();

        assert_eq!(spec.stages[1].label(1), "second");
    }

    #[test]
    fn test_builder_missing_dependency() {
        let err = PipelineBuilder::new("test")
            .component(ComponentDescriptor::new("a").depends_on(["missing"]))
            .build()
            .unwrap_err();

        assert_eq!(err.error_info.unwrap().code, "CONTRACT-004-MISSING_DEP");
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-EMPTY"));
    }
}
