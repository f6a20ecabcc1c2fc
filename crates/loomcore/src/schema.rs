use crate::Value;
use serde::{Deserialize, Serialize};

/// An input or output pin declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_pin_type")]
    pub pin_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

fn default_pin_type() -> String {
    crate::pin::ANY.to_string()
}

impl PinSpec {
    pub fn new(name: impl Into<String>, pin_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pin_type: pin_type.into(),
            description: String::new(),
            required: false,
            default_value: None,
        }
    }
}

/// A configurable property declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub prop_type: String,
    pub title: String,
    pub description: String,
    pub default: Option<Value>,
    pub required: bool,
    pub options: Vec<String>,
}

impl PropertySpec {
    /// Whether the declaration carries a usable default.
    pub fn has_default(&self) -> bool {
        self.default.as_ref().is_some_and(|v| !v.is_null())
    }
}

/// Declarative description of a node type: identity, pins and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSchema {
    pub node_type: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub inputs: Vec<PinSpec>,
    pub outputs: Vec<PinSpec>,
    pub properties: Vec<PropertySpec>,
}

impl NodeSchema {
    pub fn new(
        node_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            icon: "📦".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn input(
        mut self,
        name: impl Into<String>,
        pin_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let mut pin = PinSpec::new(name, pin_type);
        pin.description = description.into();
        pin.required = required;
        self.inputs.push(pin);
        self
    }

    /// Optional input that falls back to `default` when unconnected.
    pub fn input_with_default(
        mut self,
        name: impl Into<String>,
        pin_type: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        let mut pin = PinSpec::new(name, pin_type);
        pin.description = description.into();
        pin.default_value = Some(default.into());
        self.inputs.push(pin);
        self
    }

    pub fn output(
        mut self,
        name: impl Into<String>,
        pin_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut pin = PinSpec::new(name, pin_type);
        pin.description = description.into();
        self.outputs.push(pin);
        self
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        prop_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<Value>,
        required: bool,
    ) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            prop_type: prop_type.into(),
            title: title.into(),
            description: description.into(),
            default: Some(default.into()),
            required,
            options: Vec::new(),
        });
        self
    }

    /// A `select` property restricted to `options`.
    pub fn select(
        mut self,
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        default: &str,
        options: &[&str],
    ) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            prop_type: "select".to_string(),
            title: title.into(),
            description: description.into(),
            default: Some(Value::from(default)),
            required: true,
            options: options.iter().map(|o| o.to_string()).collect(),
        });
        self
    }

    pub fn find_input(&self, name: &str) -> Option<&PinSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&PinSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn required_properties(&self) -> impl Iterator<Item = &PropertySpec> {
        self.properties.iter().filter(|p| p.required)
    }
}
