use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use harbormind_core::error::{HarbormindError, Result};

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique within the owning graph.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Owning module/category tag, e.g. "marina" or "finance".
    #[serde(default)]
    pub module: String,
    /// Registry key of the handler this node dispatches to.
    pub handler: String,
    /// Ordered successor node ids. Empty list terminates the run.
    #[serde(default)]
    pub next: Vec<String>,
}

/// A named, static plan: task nodes plus one entry point.
///
/// Validated at load time and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Entry node id.
    pub entry: String,
    pub nodes: Vec<TaskNode>,
}

impl TaskGraph {
    /// Enforce the structural invariants: unique node ids, existing entry
    /// node, and no dangling `next` references. Dangling references are a
    /// load-time error here, never a silent runtime truncation.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(HarbormindError::EmptyGraph(self.id.clone()));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(HarbormindError::DuplicateNodeId {
                    graph: self.id.clone(),
                    node: node.id.clone(),
                });
            }
        }

        if !ids.contains(self.entry.as_str()) {
            return Err(HarbormindError::MissingEntryNode {
                graph: self.id.clone(),
                entry: self.entry.clone(),
            });
        }

        for node in &self.nodes {
            for target in &node.next {
                if !ids.contains(target.as_str()) {
                    return Err(HarbormindError::DanglingNodeReference {
                        graph: self.id.clone(),
                        node: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Parse a graph from its TOML definition. Does not validate; the
    /// catalog validates on insert.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| HarbormindError::GraphParse(e.to_string()))
    }
}

/// Table of validated graphs, loaded once at startup.
#[derive(Default)]
pub struct GraphCatalog {
    graphs: HashMap<String, Arc<TaskGraph>>,
}

impl GraphCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a graph, validating it first. Last insert for an id wins.
    pub fn insert(&mut self, graph: TaskGraph) -> Result<()> {
        graph.validate()?;
        debug!(graph = %graph.id, nodes = graph.nodes.len(), "Graph registered");
        self.graphs.insert(graph.id.clone(), Arc::new(graph));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<TaskGraph>> {
        self.graphs.get(id).cloned()
    }

    /// Graph ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.graphs.keys().map(|s| s.as_str()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Load every `*.toml` graph definition from a directory.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let graph = TaskGraph::from_toml_str(&raw)?;
            let id = graph.id.clone();
            self.insert(graph)?;
            info!(graph = %id, path = %path.display(), "Graph loaded");
            loaded += 1;
        }
        Ok(loaded)
    }
}
