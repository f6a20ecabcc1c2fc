use async_trait::async_trait;
use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Static text source
#[derive(Default)]
pub struct TextInputNode;

#[async_trait]
impl Node for TextInputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "text_input",
            "Text Input",
            "Provides static text input to the workflow",
            "Input",
        )
        .with_icon("📝")
        .output("text", "string", "The input text")
        .property("text", "text", "Input Text", "Enter the text to output", "", true)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_output("text", ctx.property_str("text", "")))
    }
}

#[derive(Default)]
pub struct NumberInputNode;

#[async_trait]
impl Node for NumberInputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "number_input",
            "Number Input",
            "Provides numeric input to the workflow",
            "Input",
        )
        .with_icon("🔢")
        .output("number", "number", "The input number")
        .property("value", "number", "Number Value", "Enter the numeric value", 0.0, true)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.require_property("value")?;
        let number = value.coerce_f64().ok_or_else(|| NodeError::InvalidInputType {
            field: "value".to_string(),
            expected: "number".to_string(),
            actual: value.type_name().to_string(),
        })?;
        Ok(NodeOutput::new().with_output("number", number))
    }
}

/// Parses a JSON document; invalid text is reported, not raised.
#[derive(Default)]
pub struct JsonInputNode;

#[async_trait]
impl Node for JsonInputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("json_input", "JSON Input", "Provides JSON data input", "Input")
            .with_icon("📋")
            .output("data", "object", "Parsed JSON data")
            .output("is_valid", "boolean", "Whether JSON is valid")
            .property("json_text", "text", "JSON Data", "JSON formatted text", "{}", true)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let text = ctx.property_str("json_text", "{}");
        let (data, is_valid) = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => (Value::from(json), true),
            Err(e) => {
                ctx.events.warn(format!("Invalid JSON: {}", e));
                let mut error = BTreeMap::new();
                error.insert("error".to_string(), Value::from(e.to_string()));
                error.insert("input".to_string(), Value::from(text));
                (Value::Object(error), false)
            }
        };
        Ok(NodeOutput::new()
            .with_output("data", data)
            .with_output("is_valid", is_valid))
    }
}

#[derive(Default)]
pub struct FileInputNode;

#[async_trait]
impl Node for FileInputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("file_input", "File Input", "Reads content from a file", "Input")
            .with_icon("📁")
            .output("content", "string", "File content as text")
            .output("filename", "string", "Name of the file")
            .output("size", "number", "File size in bytes")
            .property("file_path", "file", "File Path", "Path to the file to read", "", true)
            .property("encoding", "string", "Encoding", "Text encoding (e.g., utf-8)", "utf-8", false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let file_path = ctx.property_str("file_path", "");
        if file_path.is_empty() {
            return Err(NodeError::Configuration("File path is required".to_string()));
        }
        let path = Path::new(&file_path);
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(NodeError::Io(format!("File not found: {}", file_path)));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| NodeError::Io(format!("Failed to read file: {}", e)))?;
        let encoding = ctx.property_str("encoding", "utf-8").to_lowercase();
        let content = match encoding.as_str() {
            "utf-8" | "utf8" => String::from_utf8(bytes)
                .map_err(|e| NodeError::Io(format!("Failed to read file: {}", e)))?,
            other => {
                ctx.events
                    .warn(format!("Encoding '{}' not supported, decoding lossily as utf-8", other));
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        let size = tokio::fs::metadata(path).await?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        ctx.events.debug(format!("Read {} bytes from {}", size, file_path));
        Ok(NodeOutput::new()
            .with_output("content", content)
            .with_output("filename", filename)
            .with_output("size", size as f64))
    }
}

#[derive(Default)]
pub struct EnvVarNode;

#[async_trait]
impl Node for EnvVarNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "env_var",
            "Environment Variable",
            "Reads system environment variables",
            "Input",
        )
        .with_icon("🌍")
        .output("value", "string", "Environment variable value")
        .output("exists", "boolean", "Whether variable exists")
        .property("var_name", "string", "Variable Name", "Name of environment variable", "", true)
        .property(
            "default_value",
            "string",
            "Default Value",
            "Default value if variable doesn't exist",
            "",
            false,
        )
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let name = ctx.property_str("var_name", "");
        if name.is_empty() {
            return Err(NodeError::Configuration("Variable name is required".to_string()));
        }
        let (value, exists) = match std::env::var(&name) {
            Ok(value) => (value, true),
            Err(_) => (ctx.property_str("default_value", ""), false),
        };
        Ok(NodeOutput::new()
            .with_output("value", value)
            .with_output("exists", exists))
    }
}

/// Reads a run-scoped variable
#[derive(Default)]
pub struct VariableInputNode;

#[async_trait]
impl Node for VariableInputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "variable_input",
            "Variable Input",
            "Reads a global variable value",
            "Input",
        )
        .with_icon("📤")
        .output("value", "any", "Variable value")
        .output("exists", "boolean", "Whether variable exists")
        .property(
            "variable_name",
            "string",
            "Variable Name",
            "Name of the variable to read",
            "",
            true,
        )
        .property(
            "default_value",
            "string",
            "Default Value",
            "Default value if variable doesn't exist",
            "",
            false,
        )
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let name = ctx.property_str("variable_name", "");
        if name.is_empty() {
            return Err(NodeError::Configuration("Variable name is required".to_string()));
        }
        let (value, exists) = match ctx.context.get_variable(&name) {
            Some(value) => (value, true),
            None => (Value::from(ctx.property_str("default_value", "")), false),
        };
        Ok(NodeOutput::new()
            .with_output("value", value)
            .with_output("exists", exists))
    }
}
