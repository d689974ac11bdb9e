//! Schema types for describing provider, resource and data source attributes.
//!
//! A schema drives three things: what the host shows and validates
//! (`GetSchema`), what [`crate::validation`] checks, and how
//! [`crate::plan`] fills in planned state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create an object type from `(name, type)` pairs.
    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeType)>,
        K: Into<String>,
    {
        Self::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider.
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Computed and never settable from configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The type of the attribute.
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    pub description: Option<String>,
    /// Changing this attribute forces resource replacement.
    pub force_new: bool,
    /// Value planned when configuration leaves the attribute unset.
    pub default: Option<serde_json::Value>,
    /// Keep the prior state value while the new one is unknown.
    pub use_state_for_unknown: bool,
    /// Attributes that must not be set together with this one.
    pub conflicts_with: Vec<String>,
    /// Group of attributes of which at least one must be set.
    pub at_least_one_of: Vec<String>,
    /// Allowed string values; empty means any.
    pub one_of: Vec<String>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            use_state_for_unknown: false,
            conflicts_with: Vec::new(),
            at_least_one_of: Vec::new(),
            one_of: Vec::new(),
        }
    }

    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    pub fn optional_computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional_computed())
    }

    /// A computed list whose elements have the given type.
    pub fn computed_list(element_type: AttributeType) -> Self {
        Self::new(AttributeType::list(element_type), AttributeFlags::computed())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set a default value for this attribute.
    ///
    /// An attribute with a default is also computed: the provider fills it in.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self.flags.computed = true;
        self
    }

    /// Carry the prior state value through plans.
    pub fn with_use_state_for_unknown(mut self) -> Self {
        self.use_state_for_unknown = true;
        self
    }

    /// Reject configurations that also set any of `others`.
    pub fn conflicts_with(mut self, others: &[&str]) -> Self {
        self.conflicts_with = others.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Require at least one attribute of `group` (which should include this one).
    pub fn at_least_one_of(mut self, group: &[&str]) -> Self {
        self.at_least_one_of = group.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Restrict a string attribute to the given values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.one_of = values.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// Schema for a resource, data source or the provider configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    /// The version of this schema.
    pub version: u64,
    /// Human-readable description.
    pub description: Option<String>,
    /// Attributes keyed by name.
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::default()
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// The full schema a provider reports to the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    pub provider: Schema,
    /// Schemas for each resource type.
    pub resources: BTreeMap<String, Schema>,
    /// Schemas for each data source type.
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_flags() {
        let required = Attribute::required_string().flags;
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let computed = Attribute::computed_string().flags;
        assert!(computed.is_computed_only());

        let optional_computed = Attribute::optional_computed_bool().flags;
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
        assert!(!optional_computed.is_computed_only());
    }

    #[test]
    fn test_default_makes_attribute_computed() {
        let attr = Attribute::optional_bool().with_default(json!(true));
        assert!(attr.flags.optional);
        assert!(attr.flags.computed);
        assert_eq!(attr.default, Some(json!(true)));
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("The custom domain")
            .with_force_new()
            .sensitive();

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.flags.sensitive);
        assert!(attr.force_new);
        assert_eq!(attr.description.as_deref(), Some("The custom domain"));

        let attr = Attribute::optional_bool().conflicts_with(&["certificate"]);
        assert_eq!(attr.conflicts_with, vec!["certificate".to_string()]);

        let attr = Attribute::optional_string().one_of(&["asc", "desc"]);
        assert_eq!(attr.one_of.len(), 2);
    }

    #[test]
    fn test_object_type_serializes_for_the_wire() {
        let ty = AttributeType::list(AttributeType::object([
            ("id", AttributeType::Int64),
            ("username", AttributeType::String),
        ]));
        assert_eq!(
            serde_json::to_value(&ty).unwrap(),
            json!({"list": {"object": {"id": "int64", "username": "string"}}})
        );
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("token", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "gitlab_pages_domain",
                Schema::v0().with_attribute("domain", Attribute::required_string()),
            )
            .with_data_source(
                "gitlab_users",
                Schema::v0().with_attribute("search", Attribute::optional_string()),
            );

        assert!(provider_schema.provider.attribute("token").is_some());
        assert!(provider_schema.resources.contains_key("gitlab_pages_domain"));
        assert!(provider_schema.data_sources.contains_key("gitlab_users"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Conflicting attributes")
            .with_detail("certificate cannot be set with auto_ssl_enabled")
            .with_attribute("certificate");

        assert!(err.is_error());
        assert_eq!(err.attribute.as_deref(), Some("certificate"));
        assert!(has_errors(&[Diagnostic::warning("w"), err]));
        assert!(!has_errors(&[Diagnostic::warning("w")]));
    }
}
