//! Serde representation of the JSON pipeline description.
//!
//! The wire format spells `paralellism_level` that way and carries its
//! numbers as JSON strings; both quirks are preserved here and resolved
//! by the builder.

use anyhow::Context;
use log::info;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct DagNode {
    pub name: String,
    pub paralellism_level: String,
    pub input_degree: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DagConnection {
    pub source: String,
    pub target: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DagDocument {
    #[serde(rename = "Nodes")]
    pub nodes: Vec<DagNode>,
    #[serde(rename = "Connections")]
    pub connections: Vec<DagConnection>,
}

impl DagDocument {
    /// Imports the pipeline description at the given path.
    pub fn parse(path: &Path) -> anyhow::Result<Self> {
        info!(target: "parser", "parsing DAG file '{}'", path.display());
        let file = File::open(path)
            .with_context(|| format!("failed to open file '{}'", path.display()))?;
        let document: DagDocument = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse DAG document '{}'", path.display()))?;
        info!(
            target: "parser",
            "parsed {} node(s) and {} connection(s)",
            document.nodes.len(),
            document.connections.len(),
        );
        Ok(document)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
