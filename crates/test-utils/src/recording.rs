use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::Notify;
use tracing::debug;
use workgraph::exec::WorkFuture;
use workgraph::{AccessMode, DependencyGraph, NodeDescriptor, WorkContext, WorkItem};

/// One entry in an [`ExecutionLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Started(String),
    Finished(String),
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<LogEvent>,
    /// Recorded nodes currently inside their work, with the locks they declared.
    active: BTreeMap<String, Vec<(String, AccessMode)>>,
    peak: usize,
    conflicts: Vec<String>,
}

/// Shared, ordered record of what recorded nodes did.
///
/// Every recorded node writes its start and finish into one mutex-protected list, so
/// event positions give a total order that tests can assert on. On start, the
/// recorded node's declared locks are checked against every other active node and
/// any exclusive/shared conflict is recorded.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    inner: Arc<Mutex<LogState>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self, node: &str, locks: &[(String, AccessMode)]) {
        let mut guard = self.inner.lock().unwrap();
        let LogState {
            events,
            active,
            peak,
            conflicts,
        } = &mut *guard;

        for (other, held) in active.iter() {
            for (key, mode) in held {
                for (want_key, want_mode) in locks {
                    let both_shared =
                        *mode == AccessMode::Shared && *want_mode == AccessMode::Shared;
                    if key == want_key && !both_shared {
                        conflicts.push(format!("{node} ran alongside {other} on '{key}'"));
                    }
                }
            }
        }

        active.insert(node.to_string(), locks.to_vec());
        *peak = (*peak).max(active.len());
        events.push(LogEvent::Started(node.to_string()));
    }

    fn exit(&self, node: &str) {
        let mut guard = self.inner.lock().unwrap();
        guard.active.remove(node);
        guard.events.push(LogEvent::Finished(node.to_string()));
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Node ids in the order their work started.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LogEvent::Started(n) => Some(n),
                LogEvent::Finished(_) => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LogEvent::Finished(n) => Some(n),
                LogEvent::Started(_) => None,
            })
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.inner.lock().unwrap().peak
    }

    pub fn conflicts(&self) -> Vec<String> {
        self.inner.lock().unwrap().conflicts.clone()
    }

    pub fn position(&self, event: &LogEvent) -> Option<usize> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .position(|e| e == event)
    }

    /// `first` finished before `then` started.
    pub fn finished_before_start(&self, first: &str, then: &str) -> bool {
        match (
            self.position(&LogEvent::Finished(first.to_string())),
            self.position(&LogEvent::Started(then.to_string())),
        ) {
            (Some(f), Some(s)) => f < s,
            _ => false,
        }
    }

    /// The work of `a` and `b` overlapped in time.
    pub fn ran_concurrently(&self, a: &str, b: &str) -> bool {
        let pos = |e: LogEvent| self.position(&e);
        match (
            pos(LogEvent::Started(a.to_string())),
            pos(LogEvent::Finished(a.to_string())),
            pos(LogEvent::Started(b.to_string())),
            pos(LogEvent::Finished(b.to_string())),
        ) {
            (Some(sa), Some(fa), Some(sb), Some(fb)) => sa < fb && sb < fa,
            _ => false,
        }
    }
}

/// How a recorded node's work ends.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    Fail,
    Panic,
    /// Block until the notify fires, then succeed.
    WaitFor(Arc<Notify>),
}

/// A work item that records itself in an [`ExecutionLog`].
#[derive(Debug)]
pub struct RecordingWork {
    name: String,
    locks: Vec<(String, AccessMode)>,
    log: ExecutionLog,
    delay: Duration,
    behaviour: Behaviour,
}

impl WorkItem for RecordingWork {
    fn run(&self, ctx: WorkContext) -> WorkFuture<'_> {
        Box::pin(async move {
            debug!(node = %ctx.node(), "recorded node entered");
            self.log.enter(&self.name, &self.locks);

            if let Behaviour::WaitFor(ref gate) = self.behaviour {
                gate.notified().await;
            }
            if self.delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.delay).await;
            }

            self.log.exit(&self.name);

            match self.behaviour {
                Behaviour::Fail => Err(anyhow!("{} failed on purpose", self.name)),
                Behaviour::Panic => panic!("{} panicked on purpose", self.name),
                Behaviour::Succeed | Behaviour::WaitFor(_) => Ok(()),
            }
        })
    }

    fn describe(&self) -> String {
        format!("recorded node {}", self.name)
    }
}

/// Declarative description of one recorded node.
#[derive(Debug, Clone)]
pub struct WorkSpec {
    id: String,
    deps: Vec<String>,
    locks: Vec<(String, AccessMode)>,
    delay: Duration,
    behaviour: Behaviour,
}

impl WorkSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            deps: Vec::new(),
            locks: Vec::new(),
            delay: Duration::ZERO,
            behaviour: Behaviour::Succeed,
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    pub fn exclusive(mut self, key: &str) -> Self {
        self.locks.push((key.to_string(), AccessMode::Exclusive));
        self
    }

    pub fn shared(mut self, key: &str) -> Self {
        self.locks.push((key.to_string(), AccessMode::Shared));
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn failing(mut self) -> Self {
        self.behaviour = Behaviour::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.behaviour = Behaviour::WaitFor(gate);
        self
    }

    fn into_descriptor(self, log: &ExecutionLog) -> NodeDescriptor {
        let work = RecordingWork {
            name: self.id.clone(),
            locks: self.locks.clone(),
            log: log.clone(),
            delay: self.delay,
            behaviour: self.behaviour,
        };
        let mut desc = NodeDescriptor::new(self.id, Arc::new(work));
        for dep in self.deps {
            desc = desc.after(dep);
        }
        for (key, mode) in self.locks {
            desc = match mode {
                AccessMode::Exclusive => desc.exclusive(key),
                AccessMode::Shared => desc.shared(key),
            };
        }
        desc
    }
}

/// Builder for a graph made entirely of recorded nodes sharing one log.
#[derive(Debug, Default)]
pub struct RecordingGraph {
    log: ExecutionLog,
    descriptors: Vec<NodeDescriptor>,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, spec: WorkSpec) -> Self {
        let desc = spec.into_descriptor(&self.log);
        self.descriptors.push(desc);
        self
    }

    /// Plain succeeding recorded node with the given dependencies.
    pub fn simple(self, id: &str, deps: &[&str]) -> Self {
        let spec = deps
            .iter()
            .fold(WorkSpec::new(id), |spec, dep| spec.after(dep));
        self.node(spec)
    }

    pub fn log(&self) -> ExecutionLog {
        self.log.clone()
    }

    pub fn descriptors(self) -> Vec<NodeDescriptor> {
        self.descriptors
    }

    /// Build the graph; panics if the recorded nodes do not form a valid graph.
    pub fn build(self) -> (DependencyGraph, ExecutionLog) {
        let log = self.log.clone();
        let graph =
            DependencyGraph::build(self.descriptors).expect("recorded graph should be valid");
        (graph, log)
    }
}

