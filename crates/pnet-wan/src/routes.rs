//! All-pairs-shortest-paths over the direct-connection graph. `routes[src][dst]`
//! is the list of hops after `src`, so its first element is the next hop.

use std::collections::{HashMap, HashSet};

pub type Prefix = u32;

#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    adjacency: HashMap<Prefix, HashSet<Prefix>>,
    routes: HashMap<Prefix, HashMap<Prefix, Vec<Prefix>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    pub fn next_hop(&self, src: Prefix, dst: Prefix) -> Option<Prefix> {
        self.routes.get(&src)?.get(&dst)?.first().copied()
    }

    pub fn route(&self, src: Prefix, dst: Prefix) -> Option<&[Prefix]> {
        self.routes.get(&src)?.get(&dst).map(|v| v.as_slice())
    }

    /// Replace `prefix`'s declared neighbor set and fully recompute APSP.
    /// Returns the symmetric difference of edges added/removed so the
    /// caller can instantiate or tear down matching direct in-process
    /// links.
    pub fn set_direct_connections(&mut self, prefix: Prefix, neighbors: &[Prefix]) -> EdgeDiff {
        let old_neighbors = self.adjacency.get(&prefix).cloned().unwrap_or_default();
        let new_neighbors: HashSet<Prefix> = neighbors.iter().copied().collect();

        for &old in old_neighbors.difference(&new_neighbors) {
            if let Some(set) = self.adjacency.get_mut(&old) {
                set.remove(&prefix);
            }
        }
        for &new in new_neighbors.difference(&old_neighbors) {
            self.adjacency.entry(new).or_default().insert(prefix);
        }
        if new_neighbors.is_empty() {
            self.adjacency.remove(&prefix);
        } else {
            self.adjacency.insert(prefix, new_neighbors.clone());
        }

        self.recompute();

        EdgeDiff {
            added: new_neighbors.difference(&old_neighbors).map(|p| (prefix, *p)).collect(),
            removed: old_neighbors.difference(&new_neighbors).map(|p| (prefix, *p)).collect(),
        }
    }

    fn recompute(&mut self) {
        let prefixes: Vec<Prefix> = self.adjacency.keys().copied().collect();
        let mut routes: HashMap<Prefix, HashMap<Prefix, Vec<Prefix>>> = HashMap::new();
        for &p in &prefixes {
            routes.entry(p).or_default();
        }
        for &src in &prefixes {
            for &dst in self.adjacency.get(&src).into_iter().flatten() {
                routes.get_mut(&src).unwrap().insert(dst, vec![dst]);
            }
        }
        for &k in &prefixes {
            for &i in &prefixes {
                let Some(via_k) = routes.get(&i).and_then(|m| m.get(&k)).cloned() else {
                    continue;
                };
                for &j in &prefixes {
                    if i == j {
                        continue;
                    }
                    let Some(k_to_j) = routes.get(&k).and_then(|m| m.get(&j)).cloned() else {
                        continue;
                    };
                    let candidate_len = via_k.len() + k_to_j.len();
                    let current_len = routes.get(&i).and_then(|m| m.get(&j)).map(|v| v.len());
                    let better = match current_len {
                        None => true,
                        Some(cur) => candidate_len < cur,
                    };
                    if better {
                        let mut candidate = via_k.clone();
                        candidate.extend(k_to_j);
                        routes.get_mut(&i).unwrap().insert(j, candidate);
                    }
                }
            }
        }
        self.routes = routes;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EdgeDiff {
    pub added: Vec<(Prefix, Prefix)>,
    pub removed: Vec<(Prefix, Prefix)>,
}
