//! Persisted workflow document: versioned metadata wrapped around a graph.

use crate::{Connection, ConnectionId, NodeData, NodeId, WorkflowError, WorkflowGraph};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Document format version written by this engine.
pub const CURRENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub version: String,
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, NodeData>,
    #[serde(default)]
    pub connections: BTreeMap<ConnectionId, Connection>,
    #[serde(default)]
    pub canvas_state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub modified_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DocumentMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            name: name.into(),
            description: String::new(),
            author: String::new(),
            created_at: now.clone(),
            modified_at: now,
            tags: Vec::new(),
        }
    }
}

impl WorkflowDocument {
    /// Parse a document, rejecting versions whose major part differs from ours.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        let raw: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| WorkflowError::InvalidDocument(e.to_string()))?;

        let version = raw
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WorkflowError::InvalidDocument("missing version".to_string()))?;
        check_version(version)?;

        serde_json::from_value(raw).map_err(|e| WorkflowError::InvalidDocument(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Empty document with default canvas state.
    pub fn template(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut metadata = DocumentMetadata::new(name);
        metadata.description = description.into();
        Self {
            version: CURRENT_VERSION.to_string(),
            metadata,
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            canvas_state: serde_json::json!({
                "zoom_level": 1.0,
                "pan_offset": {"x": 0, "y": 0},
            }),
        }
    }

    pub fn from_graph(name: impl Into<String>, graph: WorkflowGraph) -> Self {
        Self {
            nodes: graph.nodes,
            connections: graph.connections,
            ..Self::template(name, "")
        }
    }

    pub fn graph(&self) -> WorkflowGraph {
        WorkflowGraph {
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
        }
    }

    pub fn into_graph(self) -> WorkflowGraph {
        WorkflowGraph {
            nodes: self.nodes,
            connections: self.connections,
        }
    }

    pub fn touch(&mut self) {
        self.metadata.modified_at = Utc::now().to_rfc3339();
    }

    /// Counts and endpoints of the graph. Categories are left empty; the
    /// registry fills them in since only it knows each type's category.
    pub fn summary(&self) -> WorkflowSummary {
        let mut nodes_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *nodes_by_type.entry(node.node_type.clone()).or_default() += 1;
        }

        let targets: BTreeSet<&str> = self.connections.values().map(|c| c.to_node.as_str()).collect();
        let sources: BTreeSet<&str> = self.connections.values().map(|c| c.from_node.as_str()).collect();
        let entry_nodes = self
            .nodes
            .keys()
            .filter(|id| !targets.contains(id.as_str()))
            .cloned()
            .collect();
        let exit_nodes = self
            .nodes
            .keys()
            .filter(|id| !sources.contains(id.as_str()))
            .cloned()
            .collect();

        WorkflowSummary {
            name: self.metadata.name.clone(),
            description: self.metadata.description.clone(),
            node_count: self.nodes.len(),
            connection_count: self.connections.len(),
            nodes: self
                .nodes
                .iter()
                .map(|(id, node)| SummaryNode {
                    id: id.clone(),
                    title: node.display_name().to_string(),
                    node_type: node.node_type.clone(),
                })
                .collect(),
            connections: self.connections.values().cloned().collect(),
            nodes_by_type,
            nodes_by_category: BTreeMap::new(),
            entry_nodes,
            exit_nodes,
        }
    }

    /// Render as `json` (the document itself) or `summary` (human-readable text).
    pub fn export_to_format(&self, format: &str) -> Result<String, WorkflowError> {
        match format {
            "json" => self
                .to_json_pretty()
                .map_err(|e| WorkflowError::InvalidDocument(e.to_string())),
            "summary" => Ok(self.summary().to_string()),
            other => Err(WorkflowError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryNode {
    pub id: NodeId,
    pub title: String,
    pub node_type: String,
}

/// Overview of a document: sizes, per-type and per-category counts, and
/// the nodes where data enters and leaves the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub node_count: usize,
    pub connection_count: usize,
    pub nodes: Vec<SummaryNode>,
    pub connections: Vec<Connection>,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub nodes_by_category: BTreeMap<String, usize>,
    /// Nodes without incoming connections.
    pub entry_nodes: Vec<NodeId>,
    /// Nodes without outgoing connections.
    pub exit_nodes: Vec<NodeId>,
}

impl fmt::Display for WorkflowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or = |text: &str, fallback: &'static str| {
            if text.is_empty() {
                fallback.to_string()
            } else {
                text.to_string()
            }
        };

        writeln!(f, "WORKFLOW SUMMARY")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Name: {}", or(&self.name, "Untitled"))?;
        writeln!(f, "Description: {}", or(&self.description, "No description"))?;
        writeln!(f, "Nodes: {}", self.node_count)?;
        writeln!(f, "Connections: {}", self.connection_count)?;

        writeln!(f)?;
        writeln!(f, "NODES:")?;
        writeln!(f, "{}", "-".repeat(20))?;
        for node in &self.nodes {
            writeln!(f, "  {} ({}) - {}", node.title, node.node_type, node.id)?;
        }

        writeln!(f)?;
        writeln!(f, "NODE TYPES:")?;
        writeln!(f, "{}", "-".repeat(20))?;
        for (node_type, count) in &self.nodes_by_type {
            writeln!(f, "  {}: {}", node_type, count)?;
        }
        if !self.nodes_by_category.is_empty() {
            writeln!(f)?;
            writeln!(f, "CATEGORIES:")?;
            writeln!(f, "{}", "-".repeat(20))?;
            for (category, count) in &self.nodes_by_category {
                writeln!(f, "  {}: {}", category, count)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Entry nodes: {}", or(&self.entry_nodes.join(", "), "none"))?;
        writeln!(f, "Exit nodes: {}", or(&self.exit_nodes.join(", "), "none"))?;

        writeln!(f)?;
        writeln!(f, "CONNECTIONS:")?;
        write!(f, "{}", "-".repeat(20))?;
        for c in &self.connections {
            write!(f, "\n  {}.{} -> {}.{}", c.from_node, c.from_pin, c.to_node, c.to_pin)?;
        }
        Ok(())
    }
}

fn check_version(version: &str) -> Result<(), WorkflowError> {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    let parsed = version
        .split_once('.')
        .filter(|(maj, min)| {
            !maj.is_empty()
                && !min.is_empty()
                && maj.chars().all(|c| c.is_ascii_digit())
                && min.chars().all(|c| c.is_ascii_digit())
        });
    if parsed.is_none() || major(version) != major(CURRENT_VERSION) {
        return Err(WorkflowError::IncompatibleVersion(format!(
            "document version {} is not supported (engine version {})",
            version, CURRENT_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    const DOC: &str = r#"{
        "version": "1.3",
        "metadata": {"name": "demo", "created_at": "2024-01-01T00:00:00"},
        "nodes": {
            "n1": {"id": "n1", "type": "text_input", "position": {"x": 10, "y": 20},
                   "properties": {"text": "abc"}},
            "n2": {"id": "n2", "type": "text_output", "position": {"x": 200, "y": 20}}
        },
        "connections": {
            "c1": {"from_node": "n1", "from_pin": "text", "to_node": "n2", "to_pin": "text"}
        }
    }"#;

    #[test]
    fn test_load_compatible_minor_version() {
        let doc = WorkflowDocument::from_json(DOC).unwrap();
        assert_eq!(doc.metadata.name, "demo");
        let graph = doc.into_graph();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.nodes["n1"].properties.get("text"),
            Some(&Value::from("abc"))
        );
        assert_eq!(graph.connections["c1"].to_node, "n2");
    }

    #[test]
    fn test_reject_other_major_version() {
        let doc = DOC.replace("\"1.3\"", "\"2.0\"");
        assert!(matches!(
            WorkflowDocument::from_json(&doc),
            Err(WorkflowError::IncompatibleVersion(_))
        ));
        let doc = DOC.replace("\"1.3\"", "\"one\"");
        assert!(WorkflowDocument::from_json(&doc).is_err());
    }

    #[test]
    fn test_summary_counts_and_endpoints() {
        let mut doc = WorkflowDocument::from_json(DOC).unwrap();
        doc.nodes.insert("n3".to_string(), NodeData::new("text_input"));
        let summary = doc.summary();

        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.connection_count, 1);
        assert_eq!(summary.nodes_by_type["text_input"], 2);
        assert_eq!(summary.nodes_by_type["text_output"], 1);
        assert!(summary.nodes_by_category.is_empty());
        assert_eq!(summary.entry_nodes, vec!["n1", "n3"]);
        assert_eq!(summary.exit_nodes, vec!["n2", "n3"]);
    }

    #[test]
    fn test_export_summary_text() {
        let doc = WorkflowDocument::from_json(DOC).unwrap();
        let text = doc.export_to_format("summary").unwrap();
        assert!(text.starts_with("WORKFLOW SUMMARY\n"));
        assert!(text.contains("Name: demo\n"));
        assert!(text.contains("Description: No description\n"));
        assert!(text.contains("  text_input (text_input) - n1\n"));
        assert!(text.contains("Entry nodes: n1\n"));
        assert!(text.contains("Exit nodes: n2\n"));
        assert!(text.ends_with("  n1.text -> n2.text"));
        assert!(!text.contains("CATEGORIES"));
    }

    #[test]
    fn test_export_formats() {
        let doc = WorkflowDocument::from_json(DOC).unwrap();
        let json = doc.export_to_format("json").unwrap();
        assert_eq!(WorkflowDocument::from_json(&json).unwrap().nodes.len(), 2);
        assert!(matches!(
            doc.export_to_format("yaml"),
            Err(WorkflowError::UnsupportedFormat(f)) if f == "yaml"
        ));
    }

    #[test]
    fn test_template_round_trips() {
        let doc = WorkflowDocument::template("empty", "nothing yet");
        let json = doc.to_json_pretty().unwrap();
        let back = WorkflowDocument::from_json(&json).unwrap();
        assert_eq!(back.version, CURRENT_VERSION);
        assert_eq!(back.metadata.description, "nothing yet");
        assert!(back.nodes.is_empty());
    }
}
