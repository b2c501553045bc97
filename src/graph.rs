//! The service dependency graph.
//!
//! Services are nodes; an edge S -> T exists when S `links` to T, mounts
//! `volumes_from` T, shares T's network/PID/IPC namespace, or `depends_on`
//! T. Ordering is deterministic: ties break by declaration order. Cycles
//! are detected with a three-color depth-first search and reported with
//! the full trail; a self-edge gets its own message naming the field that
//! caused it.

use std::collections::HashMap;

use crate::config::ServiceConfig;
use crate::errors::{ComposeError, Result};

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency edges over a flat service list, by index
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// `edges[i]` lists the indices service `i` depends on
    edges: Vec<Vec<usize>>,
    names: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph from the declared services.
    ///
    /// Self-references through `links`, `volumes_from` or `depends_on` are
    /// rejected here with a field-specific message; references to names
    /// outside the list (external containers) carry no edge.
    pub fn from_services(services: &[ServiceConfig]) -> Result<Self> {
        let index_by_name: HashMap<&str, usize> = services
            .iter()
            .enumerate()
            .map(|(index, service)| (service.name.as_str(), index))
            .collect();

        for service in services {
            check_self_reference(service)?;
        }

        let edges = services
            .iter()
            .map(|service| {
                service
                    .dependency_names()
                    .iter()
                    .filter_map(|name| index_by_name.get(name.as_str()).copied())
                    .collect()
            })
            .collect();

        Ok(Self {
            edges,
            names: services.iter().map(|service| service.name.clone()).collect(),
        })
    }

    /// The indices service `index` depends on
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    /// The indices that depend on service `index` (inverse edges, used for
    /// stop ordering)
    pub fn dependents_of(&self, index: usize) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains(&index))
            .map(|(dependent, _)| dependent)
            .collect()
    }

    /// Topological order: every dependency precedes its dependents.
    ///
    /// Deterministic; ties break by declaration order. A cycle raises
    /// [`ComposeError::CircularReference`] naming the nodes on it.
    pub fn sorted(&self) -> Result<Vec<usize>> {
        let mut colors = vec![Color::White; self.names.len()];
        let mut sorted = Vec::with_capacity(self.names.len());
        let mut trail = Vec::new();

        for index in 0..self.names.len() {
            self.visit(index, &mut colors, &mut sorted, &mut trail)?;
        }
        Ok(sorted)
    }

    fn visit(
        &self,
        index: usize,
        colors: &mut [Color],
        sorted: &mut Vec<usize>,
        trail: &mut Vec<usize>,
    ) -> Result<()> {
        match colors[index] {
            Color::Black => return Ok(()),
            Color::Gray => {
                let position = trail
                    .iter()
                    .position(|node| *node == index)
                    .unwrap_or_default();
                let mut cycle: Vec<String> = trail[position..]
                    .iter()
                    .map(|node| self.names[*node].clone())
                    .collect();
                cycle.push(self.names[index].clone());
                return Err(ComposeError::CircularReference { trail: cycle });
            }
            Color::White => {}
        }

        colors[index] = Color::Gray;
        trail.push(index);
        for dep in &self.edges[index] {
            self.visit(*dep, colors, sorted, trail)?;
        }
        trail.pop();
        colors[index] = Color::Black;
        sorted.push(index);
        Ok(())
    }

    /// Topological order reversed: leaves (no dependents) first, used for
    /// stop-like verbs
    pub fn reverse_sorted(&self) -> Result<Vec<usize>> {
        let mut sorted = self.sorted()?;
        sorted.reverse();
        Ok(sorted)
    }

    /// Indices reachable from the seed set (the seeds included), in
    /// dependency order
    pub fn reachable_from(&self, seeds: &[usize]) -> Result<Vec<usize>> {
        let order = self.sorted()?;
        let mut included = vec![false; self.names.len()];
        let mut stack: Vec<usize> = seeds.to_vec();
        while let Some(index) = stack.pop() {
            if included[index] {
                continue;
            }
            included[index] = true;
            stack.extend(self.edges[index].iter().copied());
        }
        Ok(order.into_iter().filter(|index| included[*index]).collect())
    }
}

fn check_self_reference(service: &ServiceConfig) -> Result<()> {
    let name = &service.name;
    if service.links.iter().any(|link| link.target == *name) {
        return Err(ComposeError::dependency(format!(
            "A service can not link to itself: {name}"
        )));
    }
    if service
        .volumes_from
        .iter()
        .any(|vf| vf.service_name() == Some(name))
    {
        return Err(ComposeError::dependency(format!(
            "A service can not mount itself as volume: {name}"
        )));
    }
    if service.depends_on.0.contains_key(name) {
        return Err(ComposeError::dependency(format!(
            "A service can not depend on itself: {name}"
        )));
    }
    Ok(())
}

/// Sort a service list into start order, returning indices
pub fn sort_services(services: &[ServiceConfig]) -> Result<Vec<usize>> {
    DependencyGraph::from_services(services)?.sorted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(name: &str, value: serde_json::Value) -> ServiceConfig {
        let mut config: ServiceConfig = serde_json::from_value(value).unwrap();
        config.name = name.into();
        config
    }

    fn plain(name: &str) -> ServiceConfig {
        service(name, json!({"image": "busybox"}))
    }

    fn names(services: &[ServiceConfig], order: &[usize]) -> Vec<String> {
        order
            .iter()
            .map(|index| services[*index].name.clone())
            .collect()
    }

    #[test]
    fn test_sort_no_dependencies_keeps_declaration_order() {
        let services = vec![plain("c"), plain("a"), plain("b")];
        let order = sort_services(&services).unwrap();
        assert_eq!(names(&services, &order), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_sort_depends_on() {
        let services = vec![
            service("web", json!({"image": "busybox", "depends_on": ["db", "cache"]})),
            plain("cache"),
            plain("db"),
        ];
        let order = sort_services(&services).unwrap();
        let sorted = names(&services, &order);
        let position = |name: &str| sorted.iter().position(|n| n == name).unwrap();
        assert!(position("db") < position("web"));
        assert!(position("cache") < position("web"));
    }

    #[test]
    fn test_sort_links_and_volumes_from() {
        let services = vec![
            service("app", json!({"image": "busybox", "links": ["db:database"]})),
            service("collector", json!({"image": "busybox", "volumes_from": ["app"]})),
            plain("db"),
        ];
        let order = sort_services(&services).unwrap();
        let sorted = names(&services, &order);
        let position = |name: &str| sorted.iter().position(|n| n == name).unwrap();
        assert!(position("db") < position("app"));
        assert!(position("app") < position("collector"));
    }

    #[test]
    fn test_sort_namespace_modes() {
        let services = vec![
            service("sidecar", json!({"image": "busybox", "network_mode": "service:gateway"})),
            plain("gateway"),
        ];
        let order = sort_services(&services).unwrap();
        assert_eq!(names(&services, &order), vec!["gateway", "sidecar"]);
    }

    #[test]
    fn test_cycle_reports_members() {
        let services = vec![
            service("a", json!({"image": "busybox", "depends_on": ["b"]})),
            service("b", json!({"image": "busybox", "depends_on": ["c"]})),
            service("c", json!({"image": "busybox", "depends_on": ["a"]})),
        ];
        let err = sort_services(&services).unwrap_err();
        match err {
            ComposeError::CircularReference { trail } => {
                assert!(trail.len() >= 3);
                for name in ["a", "b", "c"] {
                    assert!(trail.iter().any(|node| node == name), "{name} missing");
                }
            }
            other => panic!("expected CircularReference, got {other}"),
        }
    }

    #[test]
    fn test_self_reference_messages() {
        let self_link = vec![service("a", json!({"image": "busybox", "links": ["a"]}))];
        assert!(sort_services(&self_link)
            .unwrap_err()
            .to_string()
            .contains("can not link to itself"));

        let self_volume = vec![service("a", json!({"image": "busybox", "volumes_from": ["a"]}))];
        assert!(sort_services(&self_volume)
            .unwrap_err()
            .to_string()
            .contains("can not mount itself"));

        let self_dep = vec![service("a", json!({"image": "busybox", "depends_on": ["a"]}))];
        assert!(sort_services(&self_dep)
            .unwrap_err()
            .to_string()
            .contains("can not depend on itself"));
    }

    #[test]
    fn test_reachable_from() {
        let services = vec![
            service("web", json!({"image": "busybox", "depends_on": ["db"]})),
            plain("db"),
            plain("unrelated"),
        ];
        let graph = DependencyGraph::from_services(&services).unwrap();
        let reachable = graph.reachable_from(&[0]).unwrap();
        assert_eq!(names(&services, &reachable), vec!["db", "web"]);
    }

    #[test]
    fn test_reverse_sorted_leaves_first() {
        let services = vec![
            plain("db"),
            service("web", json!({"image": "busybox", "depends_on": ["db"]})),
        ];
        let graph = DependencyGraph::from_services(&services).unwrap();
        let order = graph.reverse_sorted().unwrap();
        assert_eq!(names(&services, &order), vec!["web", "db"]);
    }

    #[test]
    fn test_dependents_of() {
        let services = vec![
            plain("db"),
            service("web", json!({"image": "busybox", "depends_on": ["db"]})),
            service("worker", json!({"image": "busybox", "depends_on": ["db"]})),
        ];
        let graph = DependencyGraph::from_services(&services).unwrap();
        assert_eq!(graph.dependents_of(0), vec![1, 2]);
    }
}
