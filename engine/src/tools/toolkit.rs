//! Declarative assembly of the extraction tool set.

use std::sync::Arc;
use std::time::Duration;

use super::builtin::{
    BiographyExampleTool, LookupExistingRecordTool, SubmitBiographyTool, ValidateBiographyTool,
    ValidateDatesTool, VerifyInformationTool,
};
use super::registry::{DEFAULT_TOOL_TIMEOUT, ToolRegistry};
use crate::error::EngineError;
use crate::store::RecordStore;
use crate::validation::ValidationEngine;

/// Default deadline of the record lookup tool.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The biography tool set: submit, validate and example tools sharing one
/// validation engine, plus the chronology, evidence and lookup tools.
pub struct BiographyToolkit {
    validation: Arc<ValidationEngine>,
    store: Option<Arc<dyn RecordStore>>,
    tool_timeout: Duration,
    lookup_timeout: Duration,
    submit: Option<(String, String)>,
    validate: Option<(String, String)>,
    example: Option<(String, String)>,
}

impl BiographyToolkit {
    /// Returns a new builder.
    #[must_use]
    pub fn builder() -> BiographyToolkitBuilder {
        BiographyToolkitBuilder::default()
    }

    /// Builds a registry with every tool registered and the submit tool
    /// designated as finalize.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a name collides or a schema fails to compile.
    pub fn into_registry(self) -> Result<ToolRegistry, EngineError> {
        let mut registry = ToolRegistry::new().with_default_timeout(self.tool_timeout);

        let mut submit = SubmitBiographyTool::new(Arc::clone(&self.validation));
        if let Some((name, description)) = self.submit {
            submit.name = name;
            submit.description = description;
        }
        let finalize_name = submit.name.clone();

        let mut validate = ValidateBiographyTool::new(Arc::clone(&self.validation));
        if let Some((name, description)) = self.validate {
            validate.name = name;
            validate.description = description;
        }

        let mut example = BiographyExampleTool::default();
        if let Some((name, description)) = self.example {
            example.name = name;
            example.description = description;
        }

        registry.register(submit)?;
        registry.register(validate)?;
        registry.register(example)?;
        registry.register(ValidateDatesTool)?;
        registry.register(VerifyInformationTool)?;
        if let Some(store) = self.store {
            registry
                .register_with_timeout(LookupExistingRecordTool::new(store), self.lookup_timeout)?;
        }
        registry.designate_finalize(&finalize_name)?;

        Ok(registry)
    }
}

/// Builder for [`BiographyToolkit`].
#[derive(Default)]
pub struct BiographyToolkitBuilder {
    validation: Option<Arc<ValidationEngine>>,
    store: Option<Arc<dyn RecordStore>>,
    tool_timeout: Option<Duration>,
    lookup_timeout: Option<Duration>,
    submit: Option<(String, String)>,
    validate: Option<(String, String)>,
    example: Option<(String, String)>,
}

impl BiographyToolkitBuilder {
    /// Shares an existing validation engine instead of compiling a new one.
    #[must_use]
    pub fn validation(mut self, validation: Arc<ValidationEngine>) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Enables the lookup tool over `store`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Deadline for every tool without its own.
    #[must_use]
    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Deadline for the lookup tool.
    #[must_use]
    pub const fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    /// Customizes the submit tool name and description.
    #[must_use]
    pub fn customize_submit(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.submit = Some((name.into(), description.into()));
        self
    }

    /// Customizes the validate tool name and description.
    #[must_use]
    pub fn customize_validate(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.validate = Some((name.into(), description.into()));
        self
    }

    /// Customizes the example tool name and description.
    #[must_use]
    pub fn customize_example(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.example = Some((name.into(), description.into()));
        self
    }

    /// Builds the toolkit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if no validation engine was supplied
    /// and the record schema fails to compile.
    pub fn build(self) -> Result<BiographyToolkit, EngineError> {
        let validation = match self.validation {
            Some(validation) => validation,
            None => Arc::new(ValidationEngine::new()?),
        };
        Ok(BiographyToolkit {
            validation,
            store: self.store,
            tool_timeout: self.tool_timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT),
            lookup_timeout: self.lookup_timeout.unwrap_or(DEFAULT_LOOKUP_TIMEOUT),
            submit: self.submit,
            validate: self.validate,
            example: self.example,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::tools::builtin::{LOOKUP_EXISTING_RECORD, SUBMIT_BIOGRAPHY};

    #[test]
    fn test_default_tool_set() {
        let registry = BiographyToolkit::builder().build().unwrap().into_registry().unwrap();
        assert_eq!(registry.finalize_tool(), Some(SUBMIT_BIOGRAPHY));
        assert_eq!(registry.names().len(), 5);
        assert!(!registry.contains(LOOKUP_EXISTING_RECORD));
    }

    #[test]
    fn test_store_enables_lookup_and_names_are_customizable() {
        let registry = BiographyToolkit::builder()
            .store(Arc::new(MemoryRecordStore::new()))
            .customize_submit("finalize_record", "Submit the record.")
            .build()
            .unwrap()
            .into_registry()
            .unwrap();
        assert!(registry.contains(LOOKUP_EXISTING_RECORD));
        assert_eq!(registry.finalize_tool(), Some("finalize_record"));
        assert!(!registry.contains(SUBMIT_BIOGRAPHY));
    }
}
