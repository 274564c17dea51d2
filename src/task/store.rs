//! The shared task list: ground truth for what work exists and who owns it.
//!
//! All mutation goes through atomic operations on a single table lock, which
//! makes claim/complete linearizable per task id: when several agents race to
//! claim the same task, exactly one wins and the rest observe `AlreadyOwned`.

use std::collections::{BTreeMap, HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::record::{BatchDep, Task, TaskSpec, TaskStatus};
use crate::error::{Result, TeamError};
use crate::team::{AgentId, TaskId};

#[derive(Debug, Default)]
struct TaskTable {
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
}

impl TaskTable {
    fn allocate_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId::new(self.next_id)
    }

    fn deps_unmet(&self, task: &Task) -> Vec<TaskId> {
        task.dependencies
            .iter()
            .filter(|dep| {
                self.tasks
                    .get(dep)
                    .map(|t| !t.is_completed())
                    .unwrap_or(true)
            })
            .copied()
            .collect()
    }
}

/// Durable-for-the-session mapping of task records with dependency edges.
///
/// Tasks are never deleted while the session lives; they are snapshotted into
/// the teardown archive instead.
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: Mutex<TaskTable>,
    changed: Notify,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a single task whose dependencies reference existing ids.
    ///
    /// A single create cannot form a cycle (nothing can depend on an id that
    /// does not exist yet), so only existence is validated here.
    pub fn create(&self, description: impl Into<String>, dependencies: Vec<TaskId>) -> Result<TaskId> {
        let description = description.into();
        let mut table = self.inner.lock();

        for dep in &dependencies {
            if !table.tasks.contains_key(dep) {
                return Err(TeamError::InvalidDependency {
                    task: description,
                    dependency: dep.to_string(),
                });
            }
        }

        let id = table.allocate_id();
        table
            .tasks
            .insert(id, Task::new(id, description, dependencies));
        drop(table);

        debug!(task = %id, "Task created");
        self.changed.notify_waiters();
        Ok(id)
    }

    /// Create a batch of tasks that may reference each other by position.
    ///
    /// The whole batch is validated before anything is inserted: unknown
    /// existing ids or out-of-range entry references fail with
    /// `InvalidDependency`, and a cycle among the entries fails with
    /// `CycleDetected`. A rejected batch persists nothing, not even the
    /// acyclic part.
    pub fn create_batch(&self, specs: Vec<TaskSpec>) -> Result<Vec<TaskId>> {
        let mut table = self.inner.lock();

        for (index, spec) in specs.iter().enumerate() {
            for dep in &spec.dependencies {
                match dep {
                    BatchDep::Existing(id) => {
                        if !table.tasks.contains_key(id) {
                            return Err(TeamError::InvalidDependency {
                                task: spec.description.clone(),
                                dependency: id.to_string(),
                            });
                        }
                    }
                    BatchDep::Entry(target) => {
                        if *target >= specs.len() {
                            return Err(TeamError::InvalidDependency {
                                task: spec.description.clone(),
                                dependency: format!("entry {}", target),
                            });
                        }
                        if *target == index {
                            return Err(TeamError::CycleDetected(format!(
                                "entry {} depends on itself",
                                index
                            )));
                        }
                    }
                }
            }
        }

        // Existing tasks cannot reference batch entries, so any cycle is
        // confined to the entry -> entry edges.
        if let Some(entry) = find_cycle_entry(&specs) {
            return Err(TeamError::CycleDetected(format!(
                "batch entry {} participates in a cycle",
                entry
            )));
        }

        let ids: Vec<TaskId> = specs.iter().map(|_| table.allocate_id()).collect();
        for (spec, id) in specs.into_iter().zip(ids.iter()) {
            let dependencies = spec
                .dependencies
                .into_iter()
                .map(|dep| match dep {
                    BatchDep::Existing(existing) => existing,
                    BatchDep::Entry(index) => ids[index],
                })
                .collect();
            table
                .tasks
                .insert(*id, Task::new(*id, spec.description, dependencies));
        }
        drop(table);

        debug!(count = ids.len(), "Task batch created");
        self.changed.notify_waiters();
        Ok(ids)
    }

    /// Atomically claim a pending task whose dependencies are all completed.
    ///
    /// Exactly one of N concurrent callers succeeds; losers observe
    /// `AlreadyOwned`. Returns the claimed record.
    pub fn claim(&self, id: TaskId, agent: &AgentId) -> Result<Task> {
        let mut table = self.inner.lock();

        let unmet = {
            let task = table.tasks.get(&id).ok_or(TeamError::TaskNotFound(id))?;
            match task.status {
                TaskStatus::Completed => {
                    return Err(TeamError::NotClaimable {
                        task: id,
                        status: task.status.as_str().into(),
                    });
                }
                TaskStatus::InProgress => {
                    return Err(TeamError::AlreadyOwned {
                        task: id,
                        owner: task.owner.clone().unwrap_or_else(|| AgentId::new("?")),
                    });
                }
                TaskStatus::Pending => table.deps_unmet(task),
            }
        };

        if !unmet.is_empty() {
            return Err(TeamError::DependenciesUnmet { task: id, unmet });
        }

        let task = table
            .tasks
            .get_mut(&id)
            .ok_or(TeamError::TaskNotFound(id))?;
        task.status = TaskStatus::InProgress;
        task.owner = Some(agent.clone());
        let claimed = task.clone();
        drop(table);

        debug!(task = %id, agent = %agent, "Task claimed");
        Ok(claimed)
    }

    /// Complete an in-progress task owned by the caller.
    ///
    /// Dependents become claimable on the next `list_claimable` read; waiters
    /// parked on [`TaskStore::wait_changed`] are woken so idle agents notice
    /// without a message.
    pub fn complete(&self, id: TaskId, agent: &AgentId) -> Result<()> {
        let mut table = self.inner.lock();
        let task = table
            .tasks
            .get_mut(&id)
            .ok_or(TeamError::TaskNotFound(id))?;

        let owned_by_caller =
            task.status == TaskStatus::InProgress && task.owner.as_ref() == Some(agent);
        if !owned_by_caller {
            return Err(TeamError::NotOwner {
                task: id,
                agent: agent.clone(),
            });
        }

        task.status = TaskStatus::Completed;
        drop(table);

        debug!(task = %id, agent = %agent, "Task completed");
        self.changed.notify_waiters();
        Ok(())
    }

    /// Explicitly return an in-progress task to the pending pool.
    ///
    /// This never happens implicitly: a terminated owner leaves its task
    /// in-progress until the lead (or the owner itself, on a failed work
    /// attempt) releases it.
    pub fn release(&self, id: TaskId) -> Result<()> {
        let mut table = self.inner.lock();
        let task = table
            .tasks
            .get_mut(&id)
            .ok_or(TeamError::TaskNotFound(id))?;

        if task.status != TaskStatus::InProgress {
            return Err(TeamError::NotClaimable {
                task: id,
                status: task.status.as_str().into(),
            });
        }

        let previous_owner = task.owner.take();
        task.status = TaskStatus::Pending;
        drop(table);

        debug!(
            task = %id,
            previous_owner = previous_owner.as_ref().map(|o| o.as_str()).unwrap_or("?"),
            "Task released back to pending"
        );
        self.changed.notify_waiters();
        Ok(())
    }

    /// Pending tasks whose dependencies are all completed, in creation order.
    ///
    /// Deterministic, so concurrent agents converge on the same visible set
    /// modulo claim races.
    pub fn list_claimable(&self) -> Vec<Task> {
        let table = self.inner.lock();
        table
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending && table.deps_unmet(task).is_empty())
            .cloned()
            .collect()
    }

    /// Full state in creation order, for display and the teardown archive.
    pub fn snapshot(&self) -> Vec<Task> {
        self.inner.lock().tasks.values().cloned().collect()
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(&id).cloned()
    }

    pub fn all_completed(&self) -> bool {
        let table = self.inner.lock();
        !table.tasks.is_empty() && table.tasks.values().all(Task::is_completed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    /// Suspend until the table changes (task created, completed, or
    /// released). Callers pair this with a bounded timeout; a wakeup may be
    /// missed between a check and the await.
    pub async fn wait_changed(&self) {
        self.changed.notified().await;
    }
}

/// Kahn's algorithm over the batch-internal edges; returns an entry index on
/// a cycle.
fn find_cycle_entry(specs: &[TaskSpec]) -> Option<usize> {
    let mut indegree = vec![0usize; specs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];

    for (index, spec) in specs.iter().enumerate() {
        for dep in &spec.dependencies {
            if let BatchDep::Entry(target) = dep {
                indegree[index] += 1;
                dependents[*target].push(index);
            }
        }
    }

    let mut queue: VecDeque<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut resolved = HashSet::new();

    while let Some(index) = queue.pop_front() {
        resolved.insert(index);
        for &dependent in &dependents[index] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    (0..specs.len()).find(|i| !resolved.contains(i))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::task::TaskSpec;

    fn agent(name: &str) -> AgentId {
        AgentId::new(name)
    }

    #[test]
    fn test_claim_complete_lifecycle() {
        let store = TaskStore::new();
        let id = store.create("document the API", Vec::new()).unwrap();

        let claimed = store.claim(id, &agent("a")).unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert_eq!(claimed.owner, Some(agent("a")));

        store.complete(id, &agent("a")).unwrap();
        assert!(store.get(id).unwrap().is_completed());
        assert!(store.all_completed());
    }

    #[test]
    fn test_claim_with_unmet_dependencies() {
        let store = TaskStore::new();
        let first = store.create("first", Vec::new()).unwrap();
        let second = store.create("second", vec![first]).unwrap();

        let err = store.claim(second, &agent("a")).unwrap_err();
        assert!(matches!(
            err,
            TeamError::DependenciesUnmet { task, ref unmet } if task == second && unmet == &vec![first]
        ));
    }

    #[test]
    fn test_claim_race_has_one_winner() {
        let store = TaskStore::new();
        let id = store.create("contested", Vec::new()).unwrap();

        let winner = store.claim(id, &agent("a"));
        let loser = store.claim(id, &agent("b"));

        assert!(winner.is_ok());
        assert!(matches!(
            loser.unwrap_err(),
            TeamError::AlreadyOwned { owner, .. } if owner == agent("a")
        ));
    }

    #[test]
    fn test_concurrent_claims_exactly_one_winner() {
        let store = Arc::new(TaskStore::new());
        let id = store.create("contested", Vec::new()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.claim(id, &AgentId::new(format!("agent-{i}"))))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_complete_requires_owner() {
        let store = TaskStore::new();
        let id = store.create("owned", Vec::new()).unwrap();
        store.claim(id, &agent("a")).unwrap();

        assert!(matches!(
            store.complete(id, &agent("b")).unwrap_err(),
            TeamError::NotOwner { .. }
        ));

        store.complete(id, &agent("a")).unwrap();
        // Second completion fails; dependents are unaffected by the retry.
        assert!(matches!(
            store.complete(id, &agent("a")).unwrap_err(),
            TeamError::NotOwner { .. }
        ));
    }

    #[test]
    fn test_completed_task_not_claimable() {
        let store = TaskStore::new();
        let id = store.create("done", Vec::new()).unwrap();
        store.claim(id, &agent("a")).unwrap();
        store.complete(id, &agent("a")).unwrap();

        assert!(matches!(
            store.claim(id, &agent("b")).unwrap_err(),
            TeamError::NotClaimable { .. }
        ));
    }

    #[test]
    fn test_list_claimable_unlocks_in_creation_order() {
        let store = TaskStore::new();
        let ids = store
            .create_batch(vec![
                TaskSpec::new("one"),
                TaskSpec::new("two"),
                TaskSpec::new("three").depends_on_entry(0).depends_on_entry(1),
            ])
            .unwrap();

        let claimable = |store: &TaskStore| -> Vec<TaskId> {
            store.list_claimable().iter().map(|t| t.id).collect()
        };

        assert_eq!(claimable(&store), vec![ids[0], ids[1]]);

        store.claim(ids[0], &agent("a")).unwrap();
        store.complete(ids[0], &agent("a")).unwrap();
        assert_eq!(claimable(&store), vec![ids[1]]);

        store.claim(ids[1], &agent("b")).unwrap();
        store.complete(ids[1], &agent("b")).unwrap();
        assert_eq!(claimable(&store), vec![ids[2]]);
    }

    #[test]
    fn test_batch_cycle_rejected_without_side_effects() {
        let store = TaskStore::new();
        let err = store
            .create_batch(vec![
                TaskSpec::new("one").depends_on_entry(1),
                TaskSpec::new("two").depends_on_entry(0),
            ])
            .unwrap_err();

        assert!(matches!(err, TeamError::CycleDetected(_)));
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let store = TaskStore::new();
        let err = store
            .create_batch(vec![TaskSpec::new("narcissist").depends_on_entry(0)])
            .unwrap_err();
        assert!(matches!(err, TeamError::CycleDetected(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_rejects_unknown_dependency() {
        let store = TaskStore::new();
        let err = store
            .create("dangling", vec![TaskId::new(42)])
            .unwrap_err();
        assert!(matches!(err, TeamError::InvalidDependency { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_release_returns_task_to_pending() {
        let store = TaskStore::new();
        let id = store.create("flaky", Vec::new()).unwrap();
        store.claim(id, &agent("a")).unwrap();

        store.release(id).unwrap();

        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.owner.is_none());
        assert!(store.claim(id, &agent("b")).is_ok());
    }

    #[test]
    fn test_release_requires_in_progress() {
        let store = TaskStore::new();
        let id = store.create("untouched", Vec::new()).unwrap();
        assert!(matches!(
            store.release(id).unwrap_err(),
            TeamError::NotClaimable { .. }
        ));
    }
}
