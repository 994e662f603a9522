use crate::problem::NodeId;

/// Result of scanning the selected edges of one vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Shortest walk that does not contain the depot
    Subtour(Vec<NodeId>),
    /// The walk starting at the depot, empty if the depot has no selected edge
    DepotTour(Vec<NodeId>),
}

impl Detection {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Detection::Subtour(_))
    }

    pub fn nodes(&self) -> &[NodeId] {
        match self {
            Detection::Subtour(nodes) | Detection::DepotTour(nodes) => nodes,
        }
    }

    pub fn into_nodes(self) -> Vec<NodeId> {
        match self {
            Detection::Subtour(nodes) | Detection::DepotTour(nodes) => nodes,
        }
    }
}

/// Walks the adjacency matrix `edges` from the lowest unvisited node, always moving to
/// the first unvisited neighbour. The first walk starts at the depot; every later walk is
/// depot-free and counts as a subtour once it has at least two nodes, cycles and chains alike.
pub fn find_subtour(edges: &[Vec<bool>]) -> Detection {
    let n = edges.len();
    let mut seen = vec![false; n];
    let mut depot_tour = Vec::new();
    let mut shortest: Option<Vec<NodeId>> = None;

    while let Some(start) = seen.iter().position(|&s| !s) {
        seen[start] = true;
        let mut walk = vec![start];
        let mut current = start;
        while let Some(next) = (0..n).find(|&k| edges[current][k] && !seen[k]) {
            seen[next] = true;
            walk.push(next);
            current = next;
        }

        if walk.len() < 2 {
            continue;
        }
        if start == 0 {
            depot_tour = walk;
        } else if shortest.as_ref().map_or(true, |s| walk.len() < s.len()) {
            shortest = Some(walk);
        }
    }

    match shortest {
        Some(subtour) => Detection::Subtour(subtour),
        None => Detection::DepotTour(depot_tour),
    }
}
