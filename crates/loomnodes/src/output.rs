use crate::transform::pretty_json;
use async_trait::async_trait;
use chrono::Local;
use loomcore::{LogLevel, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Default)]
pub struct TextOutputNode;

#[async_trait]
impl Node for TextOutputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("text_output", "Text Output", "Displays or stores text output", "Output")
            .with_icon("📄")
            .input("text", "string", "Text to output", true)
            .output("output", "string", "The output text")
            .output("length", "number", "Length of output text")
            .property("prefix", "string", "Prefix", "Text to prepend", "", false)
            .property("suffix", "string", "Suffix", "Text to append", "", false)
            .select(
                "format",
                "Format",
                "Output format",
                "plain",
                &["plain", "uppercase", "lowercase", "title"],
            )
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let text = ctx.require_input("text")?.to_string();
        let text = match ctx.property_str("format", "plain").as_str() {
            "uppercase" => text.to_uppercase(),
            "lowercase" => text.to_lowercase(),
            "title" => crate::transform::title_case(&text),
            _ => text,
        };
        let output = format!(
            "{}{}{}",
            ctx.property_str("prefix", ""),
            text,
            ctx.property_str("suffix", "")
        );
        ctx.events.info(output.clone());
        let length = output.chars().count();
        Ok(NodeOutput::new()
            .with_output("output", output)
            .with_output("length", length))
    }
}

/// Writes data as text, JSON or CSV
#[derive(Default)]
pub struct FileOutputNode;

#[async_trait]
impl Node for FileOutputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("file_output", "File Output", "Writes data to a file", "Output")
            .with_icon("💾")
            .input("data", "any", "Data to write", true)
            .output("file_path", "string", "Path of written file")
            .output("bytes_written", "number", "Number of bytes written")
            .property("file_path", "file", "File Path", "Path where to save the file", "", true)
            .select("format", "Format", "Output format", "text", &["text", "json", "csv"])
            .property("encoding", "string", "Encoding", "Text encoding", "utf-8", false)
            .property("append", "boolean", "Append", "Append to existing file", false, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let data = ctx.require_input("data")?;
        let file_path = ctx.property_str("file_path", "");
        if file_path.is_empty() {
            return Err(NodeError::Configuration("File path is required".to_string()));
        }
        let encoding = ctx.property_str("encoding", "utf-8").to_lowercase();
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(NodeError::Configuration(format!(
                "Unsupported encoding: {}",
                encoding
            )));
        }

        let mut content = match ctx.property_str("format", "text").as_str() {
            "json" => match data {
                Value::Array(_) | Value::Object(_) => pretty_json(data, 2)?,
                other => {
                    let wrapped: BTreeMap<String, Value> =
                        [("data".to_string(), other.clone())].into_iter().collect();
                    pretty_json(&Value::Object(wrapped), 2)?
                }
            },
            "csv" => to_csv(data)?,
            _ => data.to_string(),
        };
        let append = ctx.property_bool("append", false);
        if append && !content.ends_with('\n') {
            content.push('\n');
        }

        let path = Path::new(&file_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await
            .map_err(|e| NodeError::Io(format!("Failed to write file: {}", e)))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| NodeError::Io(format!("Failed to write file: {}", e)))?;
        file.flush().await?;

        let size = tokio::fs::metadata(path).await?.len();
        ctx.events.info(format!("Wrote {} ({} bytes)", file_path, size));
        Ok(NodeOutput::new()
            .with_output("file_path", file_path)
            .with_output("bytes_written", size as f64))
    }
}

/// Objects become rows under a header taken from the first object.
pub(crate) fn to_csv(data: &Value) -> Result<String, NodeError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    match data {
        Value::Array(items) => match items.first() {
            Some(Value::Object(first)) => {
                let header: Vec<String> = first.keys().cloned().collect();
                for item in items {
                    let fields = item.as_object();
                    rows.push(
                        header
                            .iter()
                            .map(|h| {
                                fields
                                    .and_then(|f| f.get(h))
                                    .map(csv_cell)
                                    .unwrap_or_default()
                            })
                            .collect(),
                    );
                }
                rows.insert(0, header);
            }
            _ => rows.extend(items.iter().map(|item| vec![csv_cell(item)])),
        },
        other => rows.push(vec![csv_cell(other)]),
    }

    let csv_error = |e: csv::Error| NodeError::ExecutionFailed(format!("CSV write failed: {}", e));
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    for row in &rows {
        writer.write_record(row).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| NodeError::ExecutionFailed(format!("CSV write failed: {}", e.error())))?;
    String::from_utf8(bytes)
        .map_err(|e| NodeError::ExecutionFailed(format!("CSV write failed: {}", e)))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Writes a message into the run's log stream
#[derive(Default)]
pub struct LogOutputNode;

#[async_trait]
impl Node for LogOutputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("log_output", "Log Output", "Logs messages to the workflow log", "Output")
            .with_icon("📝")
            .input("message", "string", "Message to log", true)
            .input("data", "any", "Additional data to log", false)
            .output("logged", "boolean", "Whether message was logged")
            .select(
                "log_level",
                "Log Level",
                "Logging level",
                "INFO",
                &["DEBUG", "INFO", "WARNING", "ERROR"],
            )
            .property(
                "include_timestamp",
                "boolean",
                "Include Timestamp",
                "Include timestamp in log",
                true,
                false,
            )
            .property(
                "include_data",
                "boolean",
                "Include Data",
                "Include additional data in log",
                true,
                false,
            )
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let message = ctx.require_input("message")?.to_string();
        if message.is_empty() {
            return Err(NodeError::MissingInput("message".to_string()));
        }
        let level = match ctx.property_str("log_level", "INFO").to_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        };

        let mut line = message;
        if ctx.property_bool("include_timestamp", true) {
            line = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), line);
        }
        let mut details = None;
        if ctx.property_bool("include_data", true) {
            if let Some(data) = ctx.input("data") {
                let rendered = match data {
                    Value::Array(_) | Value::Object(_) => pretty_json(data, 2)?,
                    other => other.to_string(),
                };
                line = format!("{}\nData: {}", line, rendered);
                details = Some(data.clone());
            }
        }

        ctx.events.log_with_details(level, line, details);
        Ok(NodeOutput::new().with_output("logged", true))
    }
}

/// Surfaces a titled message in the run's log stream
#[derive(Default)]
pub struct NotificationNode;

#[async_trait]
impl Node for NotificationNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("notification", "Notification", "Sends system notifications", "Output")
            .with_icon("🔔")
            .input("message", "string", "Notification message", true)
            .input_with_default("title", "string", "Notification title", "Workflow Notification")
            .output("sent", "boolean", "Whether notification was sent")
            .select(
                "notification_type",
                "Type",
                "Type of notification",
                "info",
                &["info", "warning", "error", "success"],
            )
            .property("sound", "boolean", "Sound", "Play notification sound", true, false)
            .property("timeout", "number", "Timeout", "Notification timeout in seconds", 5.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let message = ctx.require_input("message")?.to_string();
        if message.is_empty() {
            return Err(NodeError::MissingInput("message".to_string()));
        }
        let title = ctx.input_or("title", Value::from("Workflow Notification")).to_string();
        let kind = ctx.property_str("notification_type", "info");
        let level = match kind.as_str() {
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "success" => LogLevel::Success,
            _ => LogLevel::Info,
        };

        let mut details = BTreeMap::new();
        details.insert("title".to_string(), Value::from(title.clone()));
        details.insert("notification_type".to_string(), Value::from(kind));
        details.insert("sound".to_string(), Value::from(ctx.property_bool("sound", true)));
        details.insert("timeout".to_string(), Value::from(ctx.property_f64("timeout", 5.0)));
        ctx.events.log_with_details(
            level,
            format!("{}: {}", title, message),
            Some(Value::Object(details)),
        );
        Ok(NodeOutput::new().with_output("sent", true))
    }
}

/// Writes a run-scoped variable
#[derive(Default)]
pub struct VariableOutputNode;

#[async_trait]
impl Node for VariableOutputNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "variable_output",
            "Variable Output",
            "Sets a global variable value",
            "Output",
        )
        .with_icon("📥")
        .input("value", "any", "Value to store", true)
        .output("stored", "boolean", "Whether value was stored")
        .output("previous_value", "any", "Previous variable value")
        .property(
            "variable_name",
            "string",
            "Variable Name",
            "Name of the variable to set",
            "",
            true,
        )
        .property("overwrite", "boolean", "Overwrite", "Overwrite existing variable", true, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.require_input("value")?.clone();
        let name = ctx.property_str("variable_name", "");
        if name.is_empty() {
            return Err(NodeError::Configuration("Variable name is required".to_string()));
        }

        let previous = ctx.context.get_variable(&name);
        let stored = ctx.property_bool("overwrite", true) || previous.is_none();
        if stored {
            ctx.context.set_variable(name.clone(), value);
            ctx.events.debug(format!("Variable '{}' set", name));
        }
        Ok(NodeOutput::new()
            .with_output("stored", stored)
            .with_output("previous_value", previous.unwrap_or(Value::Null)))
    }
}
