use loomcore::{
    pin, EventEmitter, ExecutionContext, Node, NodeContext, NodeData, NodeError, NodeId,
    NodeOutput, NodeSchema, Properties, Value, WorkflowDocument, WorkflowError, WorkflowSummary,
};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Declared pins, properties and catalog metadata for the type
    fn schema(&self) -> NodeSchema;

    /// Create a new instance of the node for the given node record
    fn create(&self, data: &NodeData) -> Result<Box<dyn Node>, NodeError>;
}

/// Factory for node types that are constructed through `Default`.
pub struct TypedFactory<T> {
    schema: NodeSchema,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedFactory<T>
where
    T: Node + Default + 'static,
{
    pub fn new() -> Self {
        Self {
            schema: T::schema(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedFactory<T>
where
    T: Node + Default + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeFactory for TypedFactory<T>
where
    T: Node + Default + 'static,
{
    fn node_type(&self) -> &str {
        &self.schema.node_type
    }

    fn schema(&self) -> NodeSchema {
        self.schema.clone()
    }

    fn create(&self, _data: &NodeData) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(T::default()))
    }
}

/// Registry of available node types
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
    schemas: HashMap<String, Arc<NodeSchema>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node factory, replacing any previous factory for the type
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        let schema = Arc::new(factory.schema());
        tracing::debug!("Registering node type: {} ({})", node_type, schema.category);
        self.schemas.insert(node_type.clone(), schema);
        self.factories.insert(node_type, factory);
    }

    pub fn register_node<T>(&mut self)
    where
        T: Node + Default + 'static,
    {
        self.register(Arc::new(TypedFactory::<T>::new()));
    }

    /// Build the executable runtime for one node of a workflow.
    pub fn create_instance(
        &self,
        node_type: &str,
        node_id: &str,
        data: &NodeData,
    ) -> Result<NodeInstance, WorkflowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;
        let schema = self
            .schemas
            .get(node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;

        let node = factory.create(data).map_err(|e| {
            WorkflowError::InvalidDocument(format!("Failed to create node {}: {}", node_id, e))
        })?;

        Ok(NodeInstance {
            node_id: node_id.to_string(),
            properties: merge_properties(&schema, &data.properties),
            schema,
            node,
        })
    }

    pub fn get_schema(&self, node_type: &str) -> Option<Arc<NodeSchema>> {
        self.schemas.get(node_type).cloned()
    }

    pub fn is_valid_type(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Category name to the sorted node types it holds.
    pub fn list_categories(&self) -> BTreeMap<String, Vec<String>> {
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for schema in self.schemas.values() {
            categories
                .entry(schema.category.clone())
                .or_default()
                .push(schema.node_type.clone());
        }
        for types in categories.values_mut() {
            types.sort();
        }
        categories
    }

    /// Case-insensitive search over type id, title, description and category.
    pub fn search(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        let mut matches: Vec<String> = self
            .schemas
            .values()
            .filter(|s| {
                s.node_type.to_lowercase().contains(&query)
                    || s.title.to_lowercase().contains(&query)
                    || s.description.to_lowercase().contains(&query)
                    || s.category.to_lowercase().contains(&query)
            })
            .map(|s| s.node_type.clone())
            .collect();
        matches.sort();
        matches
    }

    /// Node types with at least one input able to accept `output_type`.
    pub fn compatible_node_types(&self, output_type: &str) -> Vec<String> {
        let mut matches: Vec<String> = self
            .schemas
            .values()
            .filter(|s| s.inputs.iter().any(|p| pin::compatible(output_type, &p.pin_type)))
            .map(|s| s.node_type.clone())
            .collect();
        matches.sort();
        matches
    }

    /// A fresh node record for the editor, pre-filled from the schema.
    pub fn new_node_data(&self, node_type: &str) -> Result<NodeData, WorkflowError> {
        let schema = self
            .get_schema(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;

        let mut data = NodeData::new(node_type).with_title(schema.title.clone());
        data.properties = merge_properties(&schema, &Properties::new());
        data.inputs = schema.inputs.clone();
        data.outputs = schema.outputs.clone();
        Ok(data)
    }

    /// Advisory lint of property values against their declared types and options.
    pub fn validate_properties(&self, node_type: &str, properties: &Properties) -> Vec<String> {
        let Some(schema) = self.get_schema(node_type) else {
            return vec![format!("Unknown node type: {}", node_type)];
        };

        let mut errors = Vec::new();
        for prop in schema.required_properties() {
            if !properties.contains_key(&prop.name) {
                errors.push(format!("Missing required property: {}", prop.name));
            }
        }

        for (name, value) in properties {
            let Some(spec) = schema.find_property(name) else {
                continue;
            };
            let type_ok = match spec.prop_type.as_str() {
                "string" | "text" => matches!(value, Value::String(_)),
                "number" | "float" => matches!(value, Value::Number(_)),
                "integer" => value.as_f64().is_some_and(|n| n.fract() == 0.0),
                "boolean" => matches!(value, Value::Bool(_)),
                "list" => matches!(value, Value::Array(_)),
                "object" => matches!(value, Value::Object(_)),
                _ => true,
            };
            if !type_ok {
                errors.push(format!("Property '{}' must be of type {}", name, spec.prop_type));
            }
            if !spec.options.is_empty() {
                let member = value.as_str().is_some_and(|s| spec.options.iter().any(|o| o == s));
                if !member {
                    errors.push(format!(
                        "Property '{}' must be one of: {}",
                        name,
                        spec.options.join(", ")
                    ));
                }
            }
        }
        errors
    }

    /// Document summary with node counts per category; unregistered types
    /// are counted under `Unknown`.
    pub fn summarize(&self, document: &WorkflowDocument) -> WorkflowSummary {
        let mut summary = document.summary();
        for node in document.nodes.values() {
            let category = self
                .get_schema(&node.node_type)
                .map(|s| s.category.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            *summary.nodes_by_category.entry(category).or_default() += 1;
        }
        summary
    }

    /// Markdown reference of every registered node, grouped by category.
    pub fn export_node_documentation(&self) -> String {
        let mut doc = vec!["# Loom Node Reference".to_string(), String::new()];
        for (category, types) in self.list_categories() {
            doc.push(format!("## {} Nodes", category));
            doc.push(String::new());
            for node_type in types {
                let Some(schema) = self.get_schema(&node_type) else {
                    continue;
                };
                doc.push(format!("### {}", schema.title));
                doc.push(format!("**Type:** `{}`", node_type));
                doc.push(format!("**Description:** {}", schema.description));
                doc.push(String::new());

                if !schema.inputs.is_empty() {
                    doc.push("**Inputs:**".to_string());
                    for pin in &schema.inputs {
                        let required = if pin.required { " (required)" } else { "" };
                        doc.push(format!(
                            "- `{}` ({}){}: {}",
                            pin.name, pin.pin_type, required, pin.description
                        ));
                    }
                    doc.push(String::new());
                }
                if !schema.outputs.is_empty() {
                    doc.push("**Outputs:**".to_string());
                    for pin in &schema.outputs {
                        doc.push(format!("- `{}` ({}): {}", pin.name, pin.pin_type, pin.description));
                    }
                    doc.push(String::new());
                }
                if !schema.properties.is_empty() {
                    doc.push("**Properties:**".to_string());
                    for prop in &schema.properties {
                        let required = if prop.required { " (required)" } else { "" };
                        doc.push(format!(
                            "- `{}` ({}){}: {}",
                            prop.name, prop.prop_type, required, prop.description
                        ));
                    }
                    doc.push(String::new());
                }
                doc.push("---".to_string());
                doc.push(String::new());
            }
        }
        doc.join("\n")
    }
}

/// Node properties overlaid on the schema's non-null defaults.
fn merge_properties(schema: &NodeSchema, properties: &Properties) -> Properties {
    let mut merged: Properties = schema
        .properties
        .iter()
        .filter(|p| p.has_default())
        .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
        .collect();
    for (k, v) in properties {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Executable runtime for one node of a run.
pub struct NodeInstance {
    node_id: NodeId,
    schema: Arc<NodeSchema>,
    properties: Properties,
    node: Box<dyn Node>,
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("node_id", &self.node_id)
            .field("node_type", &self.schema.node_type)
            .finish()
    }
}

impl NodeInstance {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Fill in pin defaults and reject missing required inputs.
    pub fn prepare_inputs(
        &self,
        mut inputs: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, NodeError> {
        for pin in &self.schema.inputs {
            let present = inputs.get(&pin.name).is_some_and(|v| !v.is_null());
            if present {
                continue;
            }
            match &pin.default_value {
                Some(default) => {
                    inputs.insert(pin.name.clone(), default.clone());
                }
                None if pin.required => return Err(NodeError::MissingInput(pin.name.clone())),
                None => {}
            }
        }
        Ok(inputs)
    }

    pub async fn execute(
        &self,
        inputs: HashMap<String, Value>,
        context: Arc<ExecutionContext>,
        events: &EventEmitter,
    ) -> Result<NodeOutput, NodeError> {
        let inputs = self.prepare_inputs(inputs)?;
        let mut ctx = NodeContext::new(self.node_id.clone(), context, events.clone());
        ctx.inputs = inputs;
        ctx.properties = self.properties.clone();
        self.node.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loomcore::ExecutionId;

    #[derive(Default)]
    struct Echo;

    #[async_trait]
    impl Node for Echo {
        fn schema() -> NodeSchema {
            NodeSchema::new("echo", "Echo", "Copies its input", "Processing")
                .input("value", "any", "Value to copy", true)
                .input_with_default("suffix", "string", "Appended text", "")
                .output("value", "any", "Copied value")
                .property("label", "string", "Label", "Shown in logs", "echo", false)
                .select("mode", "Mode", "Copy mode", "plain", &["plain", "loud"])
        }

        async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            let value = ctx.require_input("value")?.to_string();
            let suffix = ctx.input_or("suffix", Value::Null).to_string();
            Ok(NodeOutput::new().with_output("value", format!("{}{}", value, suffix)))
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register_node::<Echo>();
        registry
    }

    #[test]
    fn test_node_documentation() {
        let doc = registry().export_node_documentation();
        assert!(doc.starts_with("# Loom Node Reference\n"));
        assert!(doc.contains("## Processing Nodes\n"));
        assert!(doc.contains("### Echo\n**Type:** `echo`\n**Description:** Copies its input\n"));
        assert!(doc.contains("- `value` (any) (required): Value to copy\n"));
        assert!(doc.contains("- `suffix` (string): Appended text\n"));
        assert!(doc.contains("**Outputs:**\n- `value` (any): Copied value\n"));
        assert!(doc.contains("- `label` (string): Shown in logs\n"));
    }

    #[test]
    fn test_summarize_counts_categories() {
        let mut graph = loomcore::WorkflowGraph::new();
        graph.add_node("a", NodeData::new("echo"));
        graph.add_node("b", NodeData::new("echo"));
        graph.add_node("c", NodeData::new("mystery"));
        graph.connect("a", "value", "b", "value");
        let document = WorkflowDocument::from_graph("counts", graph);

        let summary = registry().summarize(&document);
        assert_eq!(summary.nodes_by_category["Processing"], 2);
        assert_eq!(summary.nodes_by_category["Unknown"], 1);
        assert_eq!(summary.entry_nodes, vec!["a", "c"]);
        assert_eq!(summary.exit_nodes, vec!["b", "c"]);
        assert!(summary.to_string().contains("CATEGORIES:"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = registry();
        let err = registry
            .create_instance("nope", "n1", &NodeData::new("nope"))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownNodeType(t) if t == "nope"));
        assert!(!registry.is_valid_type("nope"));
    }

    #[test]
    fn test_properties_merge_schema_defaults() {
        let registry = registry();
        let data = NodeData::new("echo").with_property("mode", "loud");
        let instance = registry.create_instance("echo", "n1", &data).unwrap();
        assert_eq!(instance.properties().get("label"), Some(&Value::from("echo")));
        assert_eq!(instance.properties().get("mode"), Some(&Value::from("loud")));
    }

    #[tokio::test]
    async fn test_missing_required_input_fails() {
        let registry = registry();
        let instance = registry
            .create_instance("echo", "n1", &NodeData::new("echo"))
            .unwrap();
        let id = ExecutionId::new_v4();
        let result = instance
            .execute(
                HashMap::new(),
                Arc::new(ExecutionContext::new(id)),
                &EventEmitter::detached(id),
            )
            .await;
        assert!(matches!(result, Err(NodeError::MissingInput(p)) if p == "value"));
    }

    #[tokio::test]
    async fn test_pin_default_applied() {
        let registry = registry();
        let instance = registry
            .create_instance("echo", "n1", &NodeData::new("echo"))
            .unwrap();
        let id = ExecutionId::new_v4();
        let inputs = HashMap::from([("value".to_string(), Value::from("hi"))]);
        let output = instance
            .execute(
                inputs,
                Arc::new(ExecutionContext::new(id)),
                &EventEmitter::detached(id),
            )
            .await
            .unwrap();
        assert_eq!(output.outputs.get("value"), Some(&Value::from("hi")));
    }

    #[test]
    fn test_catalog_queries() {
        let registry = registry();
        assert_eq!(registry.list_node_types(), vec!["echo"]);
        assert_eq!(registry.list_categories()["Processing"], vec!["echo"]);
        assert_eq!(registry.search("COPIES"), vec!["echo"]);
        assert!(registry.search("database").is_empty());
        assert_eq!(registry.compatible_node_types("number"), vec!["echo"]);

        let data = registry.new_node_data("echo").unwrap();
        assert_eq!(data.title.as_deref(), Some("Echo"));
        assert_eq!(data.inputs.len(), 2);
        assert_eq!(data.properties.get("mode"), Some(&Value::from("plain")));
    }

    #[test]
    fn test_validate_properties() {
        let registry = registry();
        let mut props = Properties::new();
        props.insert("label".into(), Value::from(3_i64));
        props.insert("mode".into(), Value::from("quiet"));
        let errors = registry.validate_properties("echo", &props);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("label"));
        assert!(errors[1].contains("one of: plain, loud"));
    }
}
