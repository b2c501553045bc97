//! The parallel executor.
//!
//! Runs one operation per node concurrently, honoring dependency edges, a
//! global concurrency cap and fail-fast semantics: a node becomes ready
//! when all its dependencies succeeded; when a node fails, its dependents
//! are transitively skipped without running, while unrelated nodes keep
//! going. The executor never retries; per-node outcomes are returned as
//! explicit records rather than propagated mid-flight.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{ComposeError, Result};

/// Default cap on concurrently running node operations
pub const DEFAULT_PARALLEL_LIMIT: usize = 64;

/// Cooperative cancellation signal.
///
/// Cancelling stops the executor from starting new nodes; operations
/// already in flight drain to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was signalled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Why a node produced no result
#[derive(Debug)]
pub enum NodeError {
    /// The node's operation returned an error
    Failed(ComposeError),
    /// A dependency failed, so the node never ran
    Skipped {
        /// The dependency whose failure pruned this node
        failed_dependency: String,
    },
    /// The node names a dependency outside the node set
    MissingDependency {
        /// The unknown dependency name
        dependency: String,
    },
    /// The node sits on a dependency cycle
    CircularDependency,
    /// The failure predicate rejected an otherwise successful operation
    FailedCheck,
    /// Cancellation arrived before the node started
    Cancelled,
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::Skipped { failed_dependency } => {
                write!(f, "skipped because dependency {failed_dependency} failed")
            }
            Self::MissingDependency { dependency } => {
                write!(f, "depends on unknown node {dependency}")
            }
            Self::CircularDependency => write!(f, "part of a dependency cycle"),
            Self::FailedCheck => write!(f, "operation completed but failed its check"),
            Self::Cancelled => write!(f, "cancelled before starting"),
        }
    }
}

/// Post-operation predicate turning an apparent success into a failure
/// (e.g. "service has no running containers after start")
pub type FailCheck<N> = Arc<dyn Fn(N) -> BoxFuture<'static, bool> + Send + Sync>;

/// Tuning knobs for one [`parallel_execute`] run
pub struct ExecuteOptions<N> {
    /// Concurrency cap; [`DEFAULT_PARALLEL_LIMIT`] when unset
    pub limit: Option<usize>,
    /// Cooperative cancellation signal
    pub cancel: Option<CancelToken>,
    /// Failure predicate, run after each successful operation
    pub fail_check: Option<FailCheck<N>>,
}

impl<N> Default for ExecuteOptions<N> {
    fn default() -> Self {
        Self {
            limit: None,
            cancel: None,
            fail_check: None,
        }
    }
}

impl<N> ExecuteOptions<N> {
    /// Options with an explicit concurrency cap
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Outcome of one [`parallel_execute`] run
pub struct ExecuteResults<T> {
    /// Per-node results of successful operations
    pub results: HashMap<String, T>,
    /// Per-node errors; empty when every node succeeded
    pub errors: IndexMap<String, NodeError>,
}

impl<T> ExecuteResults<T> {
    /// Whether every node succeeded
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse the error set into `(node, error text)` pairs
    pub fn error_causes(&self) -> Vec<(String, String)> {
        self.errors
            .iter()
            .map(|(node, err)| (node.clone(), err.to_string()))
            .collect()
    }
}

/// Execute `op` on every node, honoring dependencies and the concurrency
/// cap.
///
/// Two nodes with no dependency relation may run concurrently and in any
/// order; for an edge A -> B, A's operation completes successfully before
/// B's starts. All runnable work completes even when some nodes fail;
/// the caller decides whether a non-empty error set fails the verb.
pub async fn parallel_execute<N, T, F, Fut>(
    nodes: Vec<N>,
    op: F,
    name_of: impl Fn(&N) -> String,
    deps_of: impl Fn(&N) -> Vec<String>,
    options: ExecuteOptions<N>,
) -> ExecuteResults<T>
where
    N: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(N) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T>> + Send + 'static,
{
    let limit = options.limit.unwrap_or(DEFAULT_PARALLEL_LIMIT).max(1);
    let op = Arc::new(op);

    let names: Vec<String> = nodes.iter().map(&name_of).collect();
    let name_set: HashSet<&String> = names.iter().collect();
    let nodes_by_name: HashMap<String, N> = names
        .iter()
        .cloned()
        .zip(nodes.iter().cloned())
        .collect();

    let mut results: HashMap<String, T> = HashMap::new();
    let mut errors: IndexMap<String, NodeError> = IndexMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut deps_remaining: HashMap<String, HashSet<String>> = HashMap::new();

    // Schedule validation: a dependency outside the node set fails the
    // node up front.
    for (node, name) in nodes.iter().zip(&names) {
        let mut remaining = HashSet::new();
        for dep in deps_of(node) {
            if dep == *name {
                continue;
            }
            if !name_set.contains(&dep) {
                errors.insert(
                    name.clone(),
                    NodeError::MissingDependency { dependency: dep },
                );
                remaining.clear();
                break;
            }
            dependents.entry(dep.clone()).or_default().push(name.clone());
            remaining.insert(dep);
        }
        deps_remaining.insert(name.clone(), remaining);
    }

    // Cycle check: anything Kahn's algorithm cannot drain is on (or
    // behind) a cycle and is marked without running.
    let mut counts: HashMap<String, usize> = names
        .iter()
        .map(|name| (name.clone(), deps_remaining[name].len()))
        .collect();
    let mut queue: VecDeque<String> = names
        .iter()
        .filter(|name| counts[*name] == 0 && !errors.contains_key(*name))
        .cloned()
        .collect();
    let mut drained: HashSet<String> = queue.iter().cloned().collect();
    while let Some(name) = queue.pop_front() {
        for dependent in dependents.get(&name).cloned().unwrap_or_default() {
            let count = counts.get_mut(&dependent).expect("dependent is a node");
            *count -= 1;
            if *count == 0 && drained.insert(dependent.clone()) {
                queue.push_back(dependent);
            }
        }
    }
    for name in &names {
        if !drained.contains(name) && !errors.contains_key(name) && !deps_remaining[name].is_empty()
        {
            warn!(node = %name, "not runnable: dependency cycle");
            errors.insert(name.clone(), NodeError::CircularDependency);
        }
    }

    // Pre-failed nodes prune their dependents before anything runs.
    let pre_failed: Vec<String> = errors.keys().cloned().collect();
    for name in pre_failed {
        skip_dependents(&name, &dependents, &mut errors, &mut deps_remaining);
    }

    let mut pending: HashSet<String> = names
        .iter()
        .filter(|name| !errors.contains_key(*name))
        .cloned()
        .collect();
    let mut ready: VecDeque<String> = names
        .iter()
        .filter(|name| pending.contains(*name) && deps_remaining[*name].is_empty())
        .cloned()
        .collect();

    enum TaskOutcome<T> {
        Ok(T),
        Err(ComposeError),
        CheckFailed,
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<(String, TaskOutcome<T>)>();
    let mut in_flight = 0usize;

    loop {
        let cancelled = options
            .cancel
            .as_ref()
            .is_some_and(CancelToken::is_cancelled);
        if !cancelled {
            while in_flight < limit {
                let Some(name) = ready.pop_front() else { break };
                pending.remove(&name);
                in_flight += 1;
                let node = nodes_by_name[&name].clone();
                let op = Arc::clone(&op);
                let fail_check = options.fail_check.clone();
                let tx = tx.clone();
                debug!(node = %name, "starting operation");
                tokio::spawn(async move {
                    let outcome = match op(node.clone()).await {
                        Ok(value) => {
                            let check_failed = match &fail_check {
                                Some(check) => check(node).await,
                                None => false,
                            };
                            if check_failed {
                                TaskOutcome::CheckFailed
                            } else {
                                TaskOutcome::Ok(value)
                            }
                        }
                        Err(err) => TaskOutcome::Err(err),
                    };
                    let _ = tx.send((name, outcome));
                });
            }
        }

        if in_flight == 0 {
            break;
        }

        let Some((name, outcome)) = rx.recv().await else {
            break;
        };
        in_flight -= 1;

        match outcome {
            TaskOutcome::Ok(value) => {
                debug!(node = %name, "operation succeeded");
                results.insert(name.clone(), value);
                for dependent in dependents.get(&name).cloned().unwrap_or_default() {
                    if let Some(remaining) = deps_remaining.get_mut(&dependent) {
                        remaining.remove(&name);
                        if remaining.is_empty() && pending.contains(&dependent) {
                            ready.push_back(dependent);
                        }
                    }
                }
            }
            TaskOutcome::Err(err) => {
                warn!(node = %name, error = %err, "operation failed");
                errors.insert(name.clone(), NodeError::Failed(err));
                skip_dependents(&name, &dependents, &mut errors, &mut deps_remaining);
                pending.retain(|pending_name| !errors.contains_key(pending_name));
                ready.retain(|ready_name| !errors.contains_key(ready_name));
            }
            TaskOutcome::CheckFailed => {
                warn!(node = %name, "operation failed its check");
                errors.insert(name.clone(), NodeError::FailedCheck);
                skip_dependents(&name, &dependents, &mut errors, &mut deps_remaining);
                pending.retain(|pending_name| !errors.contains_key(pending_name));
                ready.retain(|ready_name| !errors.contains_key(ready_name));
            }
        }
    }

    // Whatever is still pending was starved by cancellation.
    for name in pending {
        errors.entry(name).or_insert(NodeError::Cancelled);
    }

    ExecuteResults { results, errors }
}

fn skip_dependents(
    failed: &str,
    dependents: &HashMap<String, Vec<String>>,
    errors: &mut IndexMap<String, NodeError>,
    deps_remaining: &mut HashMap<String, HashSet<String>>,
) {
    let mut stack: Vec<String> = dependents.get(failed).cloned().unwrap_or_default();
    while let Some(name) = stack.pop() {
        if errors.contains_key(&name) {
            continue;
        }
        errors.insert(
            name.clone(),
            NodeError::Skipped {
                failed_dependency: failed.to_string(),
            },
        );
        deps_remaining.remove(&name);
        stack.extend(dependents.get(&name).cloned().unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Clone)]
    struct Node {
        name: String,
        deps: Vec<String>,
    }

    fn node(name: &str, deps: &[&str]) -> Node {
        Node {
            name: name.into(),
            deps: deps.iter().map(|dep| dep.to_string()).collect(),
        }
    }

    async fn run(
        nodes: Vec<Node>,
        fail: &[&str],
        options: ExecuteOptions<Node>,
    ) -> ExecuteResults<String> {
        let fail: HashSet<String> = fail.iter().map(|name| name.to_string()).collect();
        parallel_execute(
            nodes,
            move |node: Node| {
                let fail = fail.clone();
                async move {
                    if fail.contains(&node.name) {
                        Err(ComposeError::operation_failed(format!(
                            "{} exploded",
                            node.name
                        )))
                    } else {
                        Ok(node.name.clone())
                    }
                }
            },
            |node| node.name.clone(),
            |node| node.deps.clone(),
            options,
        )
        .await
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let results = run(
            vec![node("a", &[]), node("b", &["a"]), node("c", &[])],
            &[],
            ExecuteOptions::default(),
        )
        .await;
        assert!(results.ok());
        assert_eq!(results.results.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_prunes_dependents_not_peers() {
        let results = run(
            vec![
                node("a", &[]),
                node("b", &["a"]),
                node("c", &["b"]),
                node("peer", &[]),
            ],
            &["a"],
            ExecuteOptions::default(),
        )
        .await;
        assert!(results.results.contains_key("peer"));
        assert!(matches!(results.errors["a"], NodeError::Failed(_)));
        assert!(matches!(results.errors["b"], NodeError::Skipped { .. }));
        assert!(matches!(results.errors["c"], NodeError::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_missing_dependency() {
        let results = run(
            vec![node("a", &["ghost"]), node("b", &["a"])],
            &[],
            ExecuteOptions::default(),
        )
        .await;
        assert!(matches!(
            results.errors["a"],
            NodeError::MissingDependency { .. }
        ));
        assert!(matches!(results.errors["b"], NodeError::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_cycle_marked_without_running() {
        let results = run(
            vec![node("a", &["b"]), node("b", &["a"]), node("free", &[])],
            &[],
            ExecuteOptions::default(),
        )
        .await;
        assert!(results.results.contains_key("free"));
        assert!(matches!(results.errors["a"], NodeError::CircularDependency));
        assert!(matches!(results.errors["b"], NodeError::CircularDependency));
    }

    #[tokio::test]
    async fn test_dependency_ordering() {
        let started: Arc<std::sync::Mutex<Vec<String>>> = Arc::default();
        let log = Arc::clone(&started);
        let results = parallel_execute(
            vec![node("first", &[]), node("second", &["first"])],
            move |node: Node| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(node.name.clone());
                    Ok(node.name)
                }
            },
            |node| node.name.clone(),
            |node| node.deps.clone(),
            ExecuteOptions::default(),
        )
        .await;
        assert!(results.ok());
        assert_eq!(*started.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_concurrency_limit_respected() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let nodes: Vec<Node> = (0..20).map(|i| node(&format!("n{i}"), &[])).collect();
        let (current_ref, peak_ref) = (Arc::clone(&current), Arc::clone(&peak));
        let results = parallel_execute(
            nodes,
            move |node: Node| {
                let current = Arc::clone(&current_ref);
                let peak = Arc::clone(&peak_ref);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(node.name)
                }
            },
            |node| node.name.clone(),
            |node| node.deps.clone(),
            ExecuteOptions::with_limit(3),
        )
        .await;
        assert!(results.ok());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_fail_check_converts_success() {
        let options = ExecuteOptions {
            fail_check: Some(Arc::new(|node: Node| {
                Box::pin(async move { node.name == "flaky" })
            })),
            ..Default::default()
        };
        let results = run(
            vec![node("flaky", &[]), node("solid", &[])],
            &[],
            options,
        )
        .await;
        assert!(results.results.contains_key("solid"));
        assert!(matches!(results.errors["flaky"], NodeError::FailedCheck));
    }

    #[tokio::test]
    async fn test_cancellation_stops_scheduling() {
        let cancel = CancelToken::new();
        let options = ExecuteOptions {
            cancel: Some(cancel.clone()),
            ..Default::default()
        };
        cancel.cancel();
        let results = run(vec![node("a", &[]), node("b", &[])], &[], options).await;
        assert!(results.results.is_empty());
        assert!(matches!(results.errors["a"], NodeError::Cancelled));
        assert!(matches!(results.errors["b"], NodeError::Cancelled));
    }
}
