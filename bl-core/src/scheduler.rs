//! Analysis task queue with dependency tracking.
//!
//! A task that needs the result of another one is parked with a wait-for
//! edge instead of recursing into it. Resolving the blocker moves its
//! waiters to the `resumed` queue, which is drained before fresh
//! submissions. When nothing is ready but tasks still wait, the wait-for
//! graph necessarily contains a cycle; [`Scheduler::detect_cycle`] finds it.

use std::collections::{HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::arena::{Arena, define_id};
use crate::ast::AstId;
use crate::mir::FnId;
use crate::scope::SymbolId;

define_id!(TaskId, "task");

/// What a task analyzes; submitting the same kind twice yields the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Value (or type, or signature) of a global declaration.
    Global(SymbolId),
    FnBody(FnId),
    /// Top-level comptime expression requested through the session API.
    Eval(AstId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Waiting(TaskId),
    Resolved,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Resolved | TaskState::Failed)
    }
}

#[derive(Debug, Clone)]
struct Task {
    kind: TaskKind,
    state: TaskState,
    runs: usize,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Arena<TaskId, Task>,
    by_kind: HashMap<TaskKind, TaskId>,
    fresh: VecDeque<TaskId>,
    resumed: VecDeque<TaskId>,
    waiters: HashMap<TaskId, Vec<TaskId>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task unless one of the same kind exists already.
    pub fn submit(&mut self, kind: TaskKind) -> TaskId {
        if let Some(&id) = self.by_kind.get(&kind) {
            return id;
        }
        let id = self.tasks.push(Task {
            kind,
            state: TaskState::Queued,
            runs: 0,
        });
        self.by_kind.insert(kind, id);
        self.fresh.push_back(id);
        log::trace!("submit {id} {kind:?}");
        id
    }

    pub fn find(&self, kind: TaskKind) -> Option<TaskId> {
        self.by_kind.get(&kind).copied()
    }

    pub fn kind(&self, task: TaskId) -> TaskKind {
        self.tasks[task].kind
    }

    pub fn state(&self, task: TaskId) -> TaskState {
        self.tasks[task].state
    }

    pub fn runs(&self, task: TaskId) -> usize {
        self.tasks[task].runs
    }

    /// Next ready task: resumed ones first, then fresh ones, FIFO each.
    pub fn next(&mut self) -> Option<TaskId> {
        while let Some(id) = self.resumed.pop_front().or_else(|| self.fresh.pop_front()) {
            // Entries of tasks that finished or got parked again are stale.
            if self.tasks[id].state == TaskState::Queued {
                self.tasks[id].runs += 1;
                return Some(id);
            }
        }
        None
    }

    /// Park `waiter` until `blocker` reaches a terminal state.
    pub fn mark_dependency(&mut self, waiter: TaskId, blocker: TaskId) {
        match self.tasks[blocker].state {
            TaskState::Resolved => {
                self.resumed.push_back(waiter);
            }
            TaskState::Failed => {
                self.fail(waiter);
            }
            TaskState::Queued | TaskState::Waiting(_) => {
                log::trace!("{waiter} waits for {blocker}");
                self.tasks[waiter].state = TaskState::Waiting(blocker);
                self.waiters.entry(blocker).or_default().push(waiter);
            }
        }
    }

    /// Mark `task` resolved and resume everything waiting for it.
    pub fn resolve(&mut self, task: TaskId) {
        self.tasks[task].state = TaskState::Resolved;
        for waiter in self.waiters.remove(&task).unwrap_or_default() {
            if self.tasks[waiter].state == TaskState::Waiting(task) {
                self.tasks[waiter].state = TaskState::Queued;
                self.resumed.push_back(waiter);
            }
        }
    }

    /// Mark `task` failed together with every task transitively waiting for
    /// it. Returns the dependents that failed as a consequence.
    pub fn fail(&mut self, task: TaskId) -> Vec<TaskId> {
        let mut failed = Vec::new();
        let mut stack = vec![task];
        while let Some(id) = stack.pop() {
            if self.tasks[id].state == TaskState::Failed {
                continue;
            }
            self.tasks[id].state = TaskState::Failed;
            if id != task {
                failed.push(id);
            }
            stack.extend(self.waiters.remove(&id).unwrap_or_default());
        }
        failed
    }

    /// Find a cycle in the wait-for graph, members ordered by id.
    pub fn detect_cycle(&self) -> Option<Vec<TaskId>> {
        let mut graph: DiGraph<TaskId, ()> = DiGraph::new();
        let mut nodes: HashMap<TaskId, NodeIndex> = HashMap::new();
        let mut node = |graph: &mut DiGraph<TaskId, ()>, id: TaskId| *nodes.entry(id).or_insert_with(|| graph.add_node(id));

        for (id, task) in self.tasks.iter_enumerated() {
            if let TaskState::Waiting(blocker) = task.state {
                let from = node(&mut graph, id);
                let to = node(&mut graph, blocker);
                graph.add_edge(from, to, ());
            }
        }

        let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut members: Vec<TaskId> = scc.into_iter().map(|n| graph[n]).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        let cycle = cycles.into_iter().next()?;
        log::warn!("dependency cycle between {} task(s)", cycle.len());
        Some(cycle)
    }

    /// No task is queued or waiting.
    pub fn is_idle(&self) -> bool {
        self.tasks.iter().all(|t| t.state.is_terminal())
    }

    /// Tasks that have not reached a terminal state.
    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.state.is_terminal()).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
