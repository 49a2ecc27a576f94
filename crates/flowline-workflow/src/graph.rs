use std::collections::{HashMap, HashSet, VecDeque};

use flowline_config::Edge;

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node ids in declaration order.
  nodes: Vec<String>,
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from node ids and edges.
  ///
  /// Duplicate edges are collapsed. Edges naming unknown nodes are kept as-is;
  /// callers validate them first.
  pub fn new<'a>(node_ids: impl IntoIterator<Item = &'a str>, edges: &[Edge]) -> Self {
    let nodes: Vec<String> = node_ids.into_iter().map(str::to_string).collect();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all nodes
    for node_id in &nodes {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    // Build adjacency lists
    let mut seen = HashSet::new();
    for edge in edges {
      if !seen.insert((edge.from.as_str(), edge.to.as_str())) {
        continue;
      }
      adjacency
        .entry(edge.from.clone())
        .or_default()
        .push(edge.to.clone());
      reverse_adjacency
        .entry(edge.to.clone())
        .or_default()
        .push(edge.from.clone());
    }

    Self {
      nodes,
      adjacency,
      reverse_adjacency,
    }
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check whether `from -> to` is a direct edge.
  pub fn has_edge(&self, from: &str, to: &str) -> bool {
    self.upstream(to).iter().any(|up| up == from)
  }

  /// Order nodes so every node follows all of its upstreams.
  ///
  /// Ties are broken by declaration order. On a cycle, returns the node ids
  /// of one cycle, with the first node repeated at the end.
  pub fn topological_order(&self) -> Result<Vec<String>, Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = self
      .nodes
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();

    let mut queue: VecDeque<&str> = self
      .nodes
      .iter()
      .map(String::as_str)
      .filter(|id| in_degree.get(id) == Some(&0))
      .collect();

    let mut order = Vec::with_capacity(self.nodes.len());
    while let Some(node_id) = queue.pop_front() {
      order.push(node_id.to_string());
      for down in self.downstream(node_id) {
        if let Some(degree) = in_degree.get_mut(down.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(down.as_str());
          }
        }
      }
    }

    if order.len() == self.nodes.len() {
      return Ok(order);
    }

    let remaining: HashSet<&str> = in_degree
      .into_iter()
      .filter(|(_, degree)| *degree > 0)
      .map(|(id, _)| id)
      .collect();
    Err(self.find_cycle(&remaining))
  }

  /// Walk upstream through nodes Kahn's algorithm could not order until a
  /// node repeats. Every such node has an upstream in the remaining set.
  fn find_cycle(&self, remaining: &HashSet<&str>) -> Vec<String> {
    let Some(start) = self
      .nodes
      .iter()
      .map(String::as_str)
      .find(|id| remaining.contains(id))
    else {
      return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut current = start;

    loop {
      if let Some(&index) = position.get(current) {
        let mut cycle: Vec<String> = path[index..].iter().rev().map(|s| s.to_string()).collect();
        if let Some(first) = cycle.first().cloned() {
          cycle.push(first);
        }
        return cycle;
      }
      position.insert(current, path.len());
      path.push(current);

      match self
        .upstream(current)
        .iter()
        .map(String::as_str)
        .find(|up| remaining.contains(up))
      {
        Some(up) => current = up,
        None => return path.iter().map(|s| s.to_string()).collect(),
      }
    }
  }
}
