use std::collections::{HashMap, HashSet};

use flowline_config::{NodeDef, TransformConfig, WorkflowDef};

use crate::error::WorkflowError;
use crate::graph::Graph;

/// A locked workflow ready for evaluation.
#[derive(Debug, Clone)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  pub nodes: HashMap<String, NodeDef>,
  graph: Graph,
  order: Vec<String>,
}

impl Workflow {
  /// Validate a workflow definition and lock it.
  ///
  /// Checks run in this order: unique node ids, edge endpoints, acyclicity,
  /// then each transform's upstream requirements and field list.
  pub fn lock(def: WorkflowDef) -> Result<Self, WorkflowError> {
    let mut nodes = HashMap::with_capacity(def.nodes.len());
    let mut declared = Vec::with_capacity(def.nodes.len());
    for node in def.nodes {
      if nodes.contains_key(&node.node_id) {
        return Err(WorkflowError::DuplicateNode(node.node_id));
      }
      declared.push(node.node_id.clone());
      nodes.insert(node.node_id.clone(), node);
    }

    for edge in &def.edges {
      if !nodes.contains_key(&edge.from) || !nodes.contains_key(&edge.to) {
        return Err(WorkflowError::InvalidEdge {
          from: edge.from.clone(),
          to: edge.to.clone(),
        });
      }
    }

    let graph = Graph::new(declared.iter().map(String::as_str), &def.edges);
    let order = graph
      .topological_order()
      .map_err(|cycle| WorkflowError::Cycle { cycle })?;

    for node_id in &order {
      if let Some(transform) = nodes.get(node_id).and_then(NodeDef::transform_config) {
        validate_transform(node_id, transform, &graph)?;
      }
    }

    Ok(Self {
      workflow_id: def.workflow_id,
      name: def.name,
      nodes,
      graph,
      order,
    })
  }

  /// The graph structure for traversal.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Node ids in an order where every node follows its upstreams.
  pub fn topological_order(&self) -> &[String] {
    &self.order
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.get(node_id)
  }

  /// Transform nodes in topological order.
  pub fn transform_nodes(&self) -> impl Iterator<Item = (&NodeDef, &TransformConfig)> {
    self
      .order
      .iter()
      .filter_map(|id| self.nodes.get(id))
      .filter_map(|node| node.transform_config().map(|t| (node, t)))
  }
}

fn validate_transform(
  node_id: &str,
  transform: &TransformConfig,
  graph: &Graph,
) -> Result<(), WorkflowError> {
  let upstream = graph.upstream(node_id);

  match transform {
    TransformConfig::Extract { .. }
    | TransformConfig::Template { .. }
    | TransformConfig::Code { .. } => match upstream.len() {
      0 => Err(WorkflowError::MissingUpstream {
        node_id: node_id.to_string(),
        source_node_id: None,
      }),
      1 => Ok(()),
      n => Err(WorkflowError::InvalidNode {
        node_id: node_id.to_string(),
        message: format!(
          "{} transform expects exactly one upstream node, found {}: {}",
          transform.kind(),
          n,
          upstream.join(", ")
        ),
      }),
    },
    TransformConfig::Combine { fields } => {
      if fields.is_empty() {
        return Err(WorkflowError::InvalidNode {
          node_id: node_id.to_string(),
          message: "combine transform requires at least one field".to_string(),
        });
      }

      let mut names = HashSet::with_capacity(fields.len());
      for field in fields {
        if field.field_name.is_empty() {
          return Err(WorkflowError::InvalidNode {
            node_id: node_id.to_string(),
            message: "combine field name must not be empty".to_string(),
          });
        }
        if !names.insert(field.field_name.as_str()) {
          return Err(WorkflowError::InvalidNode {
            node_id: node_id.to_string(),
            message: format!("duplicate combine field name '{}'", field.field_name),
          });
        }
        if !graph.has_edge(&field.source_node_id, node_id) {
          return Err(WorkflowError::MissingUpstream {
            node_id: node_id.to_string(),
            source_node_id: Some(field.source_node_id.clone()),
          });
        }
      }

      Ok(())
    }
  }
}
