use async_trait::async_trait;
use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// String operations with optional regex extraction
#[derive(Default)]
pub struct TextProcessorNode;

#[async_trait]
impl Node for TextProcessorNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "text_processor",
            "Text Processor",
            "Performs various text processing operations",
            "Processing",
        )
        .with_icon("📝")
        .input("text", "string", "Input text to process", true)
        .output("result", "string", "Processed text")
        .output("length", "number", "Length of processed text")
        .select(
            "operation",
            "Operation",
            "Text operation to perform",
            "uppercase",
            &[
                "uppercase",
                "lowercase",
                "title_case",
                "strip",
                "reverse",
                "remove_spaces",
                "replace",
                "extract_numbers",
                "word_count",
            ],
        )
        .property("find_text", "string", "Find Text", "Text to find (for replace operation)", "", false)
        .property("replace_text", "string", "Replace Text", "Text to replace with", "", false)
        .property("regex_pattern", "string", "Regex Pattern", "Regular expression pattern", "", false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let text = ctx.require_input("text")?.to_string();
        let operation = ctx.property_str("operation", "uppercase");

        let mut result = match operation.as_str() {
            "uppercase" => text.to_uppercase(),
            "lowercase" => text.to_lowercase(),
            "title_case" => title_case(&text),
            "strip" => text.trim().to_string(),
            "reverse" => text.chars().rev().collect(),
            "remove_spaces" => text.split_whitespace().collect(),
            "replace" => {
                let find = ctx.property_str("find_text", "");
                if find.is_empty() {
                    text
                } else {
                    text.replace(&find, &ctx.property_str("replace_text", ""))
                }
            }
            "extract_numbers" => text
                .split(|c: char| !c.is_ascii_digit())
                .filter(|run| !run.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            "word_count" => text.split_whitespace().count().to_string(),
            other => {
                return Err(NodeError::Configuration(format!("Unknown operation: {}", other)));
            }
        };

        let pattern = ctx.property_str("regex_pattern", "");
        if !pattern.is_empty() {
            let re = Regex::new(&pattern)
                .map_err(|e| NodeError::Configuration(format!("Invalid regex pattern: {}", e)))?;
            result = re
                .find_iter(&result)
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(" ");
        }

        let length = result.chars().count();
        Ok(NodeOutput::new()
            .with_output("result", result)
            .with_output("length", length))
    }
}

/// Capitalize the first letter of every alphabetic run, lowercase the rest.
pub(crate) fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[derive(Default)]
pub struct MathNode;

#[async_trait]
impl Node for MathNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "math",
            "Math Operations",
            "Performs mathematical calculations",
            "Processing",
        )
        .with_icon("🧮")
        .input("a", "number", "First number", true)
        .input("b", "number", "Second number", false)
        .output("result", "number", "Calculation result")
        .output("formatted", "string", "Formatted result")
        .select(
            "operation",
            "Operation",
            "Mathematical operation to perform",
            "add",
            &[
                "add", "subtract", "multiply", "divide", "power", "modulo", "sqrt", "abs", "round",
                "floor", "ceil",
            ],
        )
        .property("precision", "number", "Decimal Precision", "Number of decimal places", 2.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let a = number_input(&ctx, "a")?;
        let b = match ctx.input("b") {
            Some(_) => number_input(&ctx, "b")?,
            None => 0.0,
        };
        let precision = ctx.property_f64("precision", 2.0).max(0.0) as usize;
        let operation = ctx.property_str("operation", "add");

        let result = match operation.as_str() {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Err(NodeError::ExecutionFailed("Cannot divide by zero".to_string()));
                }
                a / b
            }
            "power" => a.powf(b),
            "modulo" => {
                if b == 0.0 {
                    return Err(NodeError::ExecutionFailed(
                        "Cannot calculate modulo with zero".to_string(),
                    ));
                }
                // Result takes the sign of the divisor
                a - b * (a / b).floor()
            }
            "sqrt" => {
                if a < 0.0 {
                    return Err(NodeError::ExecutionFailed(
                        "Cannot calculate square root of negative number".to_string(),
                    ));
                }
                a.sqrt()
            }
            "abs" => a.abs(),
            "round" => {
                let factor = 10f64.powi(precision as i32);
                (a * factor).round() / factor
            }
            "floor" => a.floor(),
            "ceil" => a.ceil(),
            other => {
                return Err(NodeError::Configuration(format!("Unknown operation: {}", other)));
            }
        };

        let formatted = if precision > 0 {
            format!("{:.*}", precision, result)
        } else {
            format!("{}", result.trunc() as i64)
        };
        Ok(NodeOutput::new()
            .with_output("result", result)
            .with_output("formatted", formatted))
    }
}

fn number_input(ctx: &NodeContext, name: &str) -> Result<f64, NodeError> {
    let value = ctx.require_input(name)?;
    value.coerce_f64().ok_or_else(|| NodeError::InvalidInputType {
        field: name.to_string(),
        expected: "number".to_string(),
        actual: value.type_name().to_string(),
    })
}

/// Keeps the parts of a string, list or object that match a condition
#[derive(Default)]
pub struct FilterNode;

#[async_trait]
impl Node for FilterNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("filter", "Data Filter", "Filters data based on conditions", "Processing")
            .with_icon("🔍")
            .input("data", "any", "Input data to filter", true)
            .output("filtered", "any", "Filtered data")
            .output("count", "number", "Number of items after filtering")
            .select(
                "filter_type",
                "Filter Type",
                "Type of filter to apply",
                "contains",
                &[
                    "contains",
                    "equals",
                    "greater_than",
                    "less_than",
                    "starts_with",
                    "ends_with",
                    "regex",
                ],
            )
            .property("filter_value", "string", "Filter Value", "Value to filter by", "", true)
            .property(
                "case_sensitive",
                "boolean",
                "Case Sensitive",
                "Whether filtering is case sensitive",
                false,
                false,
            )
            .property("filter_key", "string", "Filter Key", "Key to filter on (for objects)", "", false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let data = ctx.require_input("data")?;
        let filter_key = ctx.property_str("filter_key", "");
        let condition = Condition::new(
            &ctx.property_str("filter_type", "contains"),
            &ctx.property_str("filter_value", ""),
            ctx.property_bool("case_sensitive", false),
        )?;

        let filtered = match data {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| {
                        let candidate = match (item, filter_key.is_empty()) {
                            (Value::Object(map), false) => {
                                map.get(&filter_key).map(Value::to_string).unwrap_or_default()
                            }
                            _ => item.to_string(),
                        };
                        condition.matches(&candidate)
                    })
                    .cloned()
                    .collect(),
            ),
            Value::Object(map) => {
                let keep = if filter_key.is_empty() {
                    map.values().any(|v| condition.matches(&v.to_string()))
                } else {
                    let candidate = map.get(&filter_key).map(Value::to_string).unwrap_or_default();
                    condition.matches(&candidate)
                };
                if keep {
                    data.clone()
                } else {
                    Value::Object(BTreeMap::new())
                }
            }
            other => {
                let text = other.to_string();
                if condition.matches(&text) {
                    Value::String(text)
                } else {
                    Value::String(String::new())
                }
            }
        };

        let count = match &filtered {
            Value::String(s) => usize::from(!s.is_empty()),
            other => other.len().unwrap_or(0),
        };
        ctx.events.debug(format!("Filter kept {} item(s)", count));
        Ok(NodeOutput::new()
            .with_output("filtered", filtered)
            .with_output("count", count))
    }
}

enum Condition {
    Text {
        kind: TextMatch,
        value: String,
        case_sensitive: bool,
    },
    Greater(Option<f64>),
    Less(Option<f64>),
    Pattern(Regex),
}

#[derive(Clone, Copy)]
enum TextMatch {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

impl Condition {
    fn new(filter_type: &str, value: &str, case_sensitive: bool) -> Result<Self, NodeError> {
        let text = |kind| {
            Ok(Condition::Text {
                kind,
                value: if case_sensitive {
                    value.to_string()
                } else {
                    value.to_lowercase()
                },
                case_sensitive,
            })
        };
        match filter_type {
            "contains" => text(TextMatch::Contains),
            "equals" => text(TextMatch::Equals),
            "starts_with" => text(TextMatch::StartsWith),
            "ends_with" => text(TextMatch::EndsWith),
            "greater_than" => Ok(Condition::Greater(value.trim().parse().ok())),
            "less_than" => Ok(Condition::Less(value.trim().parse().ok())),
            "regex" => RegexBuilder::new(value)
                .case_insensitive(!case_sensitive)
                .build()
                .map(Condition::Pattern)
                .map_err(|_| NodeError::Configuration(format!("Invalid regex pattern: {}", value))),
            other => Err(NodeError::Configuration(format!("Unknown filter type: {}", other))),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            Condition::Text {
                kind,
                value,
                case_sensitive,
            } => {
                let candidate = if *case_sensitive {
                    candidate.to_string()
                } else {
                    candidate.to_lowercase()
                };
                match kind {
                    TextMatch::Contains => candidate.contains(value.as_str()),
                    TextMatch::Equals => candidate == *value,
                    TextMatch::StartsWith => candidate.starts_with(value.as_str()),
                    TextMatch::EndsWith => candidate.ends_with(value.as_str()),
                }
            }
            Condition::Greater(threshold) => numeric(candidate, *threshold, |a, b| a > b),
            Condition::Less(threshold) => numeric(candidate, *threshold, |a, b| a < b),
            Condition::Pattern(re) => re.is_match(candidate),
        }
    }
}

fn numeric(candidate: &str, threshold: Option<f64>, cmp: fn(f64, f64) -> bool) -> bool {
    match (candidate.trim().parse::<f64>(), threshold) {
        (Ok(n), Some(t)) => cmp(n, t),
        _ => false,
    }
}

/// Converts data between representations
#[derive(Default)]
pub struct TransformNode;

#[async_trait]
impl Node for TransformNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "transform",
            "Data Transform",
            "Transforms data between different formats",
            "Processing",
        )
        .with_icon("🔄")
        .input("data", "any", "Input data to transform", true)
        .output("result", "any", "Transformed data")
        .output("type", "string", "Output data type")
        .select(
            "transform_type",
            "Transform Type",
            "Type of transformation",
            "json_to_string",
            &[
                "json_to_string",
                "string_to_json",
                "list_to_string",
                "string_to_list",
                "csv_to_json",
                "flatten",
                "unflatten",
            ],
        )
        .property("separator", "string", "Separator", "Separator for string/list conversion", ",", false)
        .property("json_indent", "number", "JSON Indent", "Indentation for JSON formatting", 2.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let data = ctx.require_input("data")?.clone();
        let separator = ctx.property_str("separator", ",");
        let indent = ctx.property_f64("json_indent", 2.0).max(0.0) as usize;
        let transform_type = ctx.property_str("transform_type", "json_to_string");

        let result = match (transform_type.as_str(), data) {
            ("json_to_string", data @ (Value::Array(_) | Value::Object(_))) => {
                Value::String(pretty_json(&data, indent)?)
            }
            ("json_to_string", data) => Value::String(data.to_string()),
            ("string_to_json", Value::String(s)) => serde_json::from_str::<serde_json::Value>(&s)
                .map(Value::from)
                .map_err(|e| NodeError::ExecutionFailed(format!("Transformation failed: {}", e)))?,
            ("list_to_string", Value::Array(items)) => Value::String(
                items
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(&separator),
            ),
            ("string_to_list", Value::String(s)) => {
                if separator.is_empty() {
                    return Err(NodeError::Configuration(
                        "Transformation failed: empty separator".to_string(),
                    ));
                }
                Value::Array(s.split(separator.as_str()).map(|p| Value::from(p.trim())).collect())
            }
            ("csv_to_json", Value::String(s)) => csv_to_records(&s)?,
            ("flatten", Value::Object(map)) => {
                let mut flat = BTreeMap::new();
                flatten_object(&map, "", &mut flat);
                Value::Object(flat)
            }
            ("flatten", Value::Array(items)) => {
                let mut flat = Vec::new();
                flatten_list(items, &mut flat);
                Value::Array(flat)
            }
            ("unflatten", Value::Object(map)) => Value::Object(unflatten_object(map)),
            (
                "json_to_string" | "string_to_json" | "list_to_string" | "string_to_list"
                | "csv_to_json" | "flatten" | "unflatten",
                data,
            ) => data,
            (other, _) => {
                return Err(NodeError::Configuration(format!("Unknown transform type: {}", other)));
            }
        };

        let type_name = result.type_name();
        Ok(NodeOutput::new()
            .with_output("type", type_name)
            .with_output("result", result))
    }
}

pub(crate) fn pretty_json(value: &Value, indent: usize) -> Result<String, NodeError> {
    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .to_json()
        .serialize(&mut serializer)
        .map_err(|e| NodeError::ExecutionFailed(format!("Transformation failed: {}", e)))?;
    String::from_utf8(buf)
        .map_err(|e| NodeError::ExecutionFailed(format!("Transformation failed: {}", e)))
}

/// Header row, then one object per record. Every record must match the header width.
pub(crate) fn csv_to_records(text: &str) -> Result<Value, NodeError> {
    if text.trim().is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let csv_error = |e: csv::Error| NodeError::ExecutionFailed(format!("Invalid CSV: {}", e));
    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        records.push(Value::Object(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), Value::from(v)))
                .collect(),
        ));
    }
    Ok(Value::Array(records))
}

fn flatten_object(map: &BTreeMap<String, Value>, prefix: &str, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) => flatten_object(inner, &path, out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

fn flatten_list(items: Vec<Value>, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten_list(inner, out),
            other => out.push(other),
        }
    }
}

fn unflatten_object(map: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut root = BTreeMap::new();
    for (key, value) in map {
        let path: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &path, value);
    }
    root
}

fn insert_path(map: &mut BTreeMap<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            map.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
            if let Value::Object(inner) = slot {
                insert_path(inner, rest, value);
            } else {
                let mut inner = BTreeMap::new();
                insert_path(&mut inner, rest, value);
                *slot = Value::Object(inner);
            }
        }
    }
}

/// Compares two values and routes one of two results
#[derive(Default)]
pub struct ConditionalNode;

#[async_trait]
impl Node for ConditionalNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "conditional",
            "Conditional",
            "Performs conditional logic operations",
            "Processing",
        )
        .with_icon("🔀")
        .input("value_a", "any", "First value", true)
        .input("value_b", "any", "Second value", false)
        .input_with_default("true_value", "any", "Value to output if condition is true", true)
        .input_with_default("false_value", "any", "Value to output if condition is false", false)
        .output("result", "any", "Result based on condition")
        .output("condition", "boolean", "Condition result")
        .select(
            "operator",
            "Operator",
            "Comparison operator",
            "equals",
            &[
                "equals",
                "not_equals",
                "greater_than",
                "less_than",
                "greater_equal",
                "less_equal",
                "contains",
                "is_empty",
            ],
        )
        .property(
            "case_sensitive",
            "boolean",
            "Case Sensitive",
            "Case sensitive comparison for strings",
            true,
            false,
        )
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let mut a = ctx.inputs.get("value_a").cloned().unwrap_or(Value::Null);
        let mut b = ctx.inputs.get("value_b").cloned().unwrap_or(Value::Null);
        if !ctx.property_bool("case_sensitive", true) {
            if let (Value::String(x), Value::String(y)) = (&a, &b) {
                a = Value::String(x.to_lowercase());
                b = Value::String(y.to_lowercase());
            }
        }

        let condition = evaluate(&ctx.property_str("operator", "equals"), &a, &b)?;
        let result = if condition {
            ctx.input_or("true_value", Value::Bool(true))
        } else {
            ctx.input_or("false_value", Value::Bool(false))
        };
        Ok(NodeOutput::new()
            .with_output("result", result)
            .with_output("condition", condition))
    }
}

fn evaluate(operator: &str, a: &Value, b: &Value) -> Result<bool, NodeError> {
    let ordering = || match (a.coerce_f64(), b.coerce_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(a.to_string().cmp(&b.to_string())),
    };
    Ok(match operator {
        "equals" => a == b,
        "not_equals" => a != b,
        "greater_than" => ordering().is_some_and(|o| o.is_gt()),
        "less_than" => ordering().is_some_and(|o| o.is_lt()),
        "greater_equal" => ordering().is_some_and(|o| o.is_ge()),
        "less_equal" => ordering().is_some_and(|o| o.is_le()),
        "contains" => a.to_string().contains(&b.to_string()),
        "is_empty" => a.is_null() || a.len() == Some(0),
        other => {
            return Err(NodeError::Configuration(format!("Unknown operator: {}", other)));
        }
    })
}

/// Reduces a list to a single value
#[derive(Default)]
pub struct AggregateNode;

#[async_trait]
impl Node for AggregateNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "aggregate",
            "Aggregate Data",
            "Performs aggregation operations on data",
            "Processing",
        )
        .with_icon("📊")
        .input("data", "list", "List of data to aggregate", true)
        .output("result", "any", "Aggregation result")
        .output("count", "number", "Number of items processed")
        .select(
            "operation",
            "Operation",
            "Aggregation operation",
            "sum",
            &["sum", "average", "min", "max", "count", "unique", "join", "first", "last"],
        )
        .property("field", "string", "Field", "Field to aggregate (for objects)", "", false)
        .property("separator", "string", "Separator", "Separator for join operation", ", ", false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let data = ctx.require_input("data")?;
        let items = data.as_array().ok_or_else(|| NodeError::InvalidInputType {
            field: "data".to_string(),
            expected: "list".to_string(),
            actual: data.type_name().to_string(),
        })?;

        let field = ctx.property_str("field", "");
        let values: Vec<&Value> =
            if !field.is_empty() && items.iter().all(|i| matches!(i, Value::Object(_))) {
                items
                    .iter()
                    .filter_map(|i| i.as_object().and_then(|m| m.get(&field)))
                    .collect()
            } else {
                items.iter().collect()
            };
        let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
        let numbers: Option<Vec<f64>> = present.iter().map(|v| v.coerce_f64()).collect();

        let count = values.len();
        let result = match ctx.property_str("operation", "sum").as_str() {
            "sum" => Value::from(numbers.map(|n| n.iter().sum()).unwrap_or(0.0)),
            "average" => Value::from(
                numbers
                    .filter(|n| !n.is_empty())
                    .map(|n| n.iter().sum::<f64>() / n.len() as f64)
                    .unwrap_or(0.0),
            ),
            "min" => extreme(&present, numbers, false),
            "max" => extreme(&present, numbers, true),
            "count" => Value::from(count),
            "unique" => {
                let unique: BTreeSet<String> = present.iter().map(|v| v.to_string()).collect();
                Value::Array(unique.into_iter().map(Value::from).collect())
            }
            "join" => Value::from(
                present
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(&ctx.property_str("separator", ", ")),
            ),
            "first" => values.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
            "last" => values.last().map(|v| (*v).clone()).unwrap_or(Value::Null),
            other => {
                return Err(NodeError::Configuration(format!("Unknown operation: {}", other)));
            }
        };

        Ok(NodeOutput::new()
            .with_output("result", result)
            .with_output("count", count))
    }
}

/// Numeric extreme when every value is numeric, else by display text.
fn extreme(values: &[&Value], numbers: Option<Vec<f64>>, want_max: bool) -> Value {
    if let Some(numbers) = numbers {
        return numbers
            .into_iter()
            .reduce(if want_max { f64::max } else { f64::min })
            .map(Value::from)
            .unwrap_or(Value::Null);
    }
    let picked = if want_max {
        values.iter().max_by_key(|v| v.to_string())
    } else {
        values.iter().min_by_key(|v| v.to_string())
    };
    picked.map(|v| (*v).clone()).unwrap_or(Value::Null)
}
