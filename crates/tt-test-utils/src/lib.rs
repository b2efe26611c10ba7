//! Testing utilities for TT workspace
//!
//! In-memory stand-ins for the remote authority and the job queue, plus
//! canned split registries.

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tt_remote::{
    IdentifierRequest, Job, JobError, JobQueue, RemoteAssignment, RemoteAuthority, RemoteError,
    RemoteVisitor,
};
use tt_split::{Assignment, SplitRegistry};

/// Registry used throughout the tests: a 50/50 boolean split and a split
/// where one variant carries all the weight
pub fn fixture_split_registry() -> SplitRegistry {
    SplitRegistry::new()
        .with_split("blue_button", [("false", 50), ("true", 50)])
        .with_split("time", [("hammertime", 100), ("clobberin_time", 0)])
}

/// Install a test-writer tracing subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the fake authority answers calls
#[derive(Debug, Clone, Default)]
pub enum FakeMode {
    /// Serve from in-memory state
    #[default]
    Serve,
    /// Fail every call with the given error
    Fail(RemoteError),
    /// Never answer
    Hang,
}

#[derive(Debug, Default)]
struct FakeState {
    registry: SplitRegistry,
    visitors: BTreeMap<String, Vec<RemoteAssignment>>,
    identifiers: HashMap<(String, String), String>,
    persisted: Vec<(String, Assignment)>,
    mode: FakeMode,
}

/// Per-operation call counters
#[derive(Debug, Default)]
pub struct CallCounts {
    pub fetch_visitor: AtomicUsize,
    pub fetch_split_registry: AtomicUsize,
    pub create_identifier: AtomicUsize,
    pub resolve_visitor_by_identifier: AtomicUsize,
    pub persist_assignment: AtomicUsize,
}

impl CallCounts {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory remote authority
///
/// Identifiers link to the first visitor that claims them; later claims
/// return that canonical visitor, the way the real server does.
#[derive(Debug, Default)]
pub struct FakeAuthority {
    state: Mutex<FakeState>,
    pub calls: CallCounts,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(self, registry: SplitRegistry) -> Self {
        self.state.lock().registry = registry;
        self
    }

    /// Seed a visitor with confirmed assignments
    pub fn with_visitor<'a>(
        self,
        id: &str,
        assignments: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        self.state.lock().visitors.insert(
            id.to_string(),
            assignments
                .into_iter()
                .map(|(split, variant)| RemoteAssignment::new(split, variant))
                .collect(),
        );
        self
    }

    /// Seed an identifier already linked to a visitor
    pub fn with_identifier(self, identifier_type: &str, value: &str, visitor_id: &str) -> Self {
        self.state.lock().identifiers.insert(
            (identifier_type.to_string(), value.to_string()),
            visitor_id.to_string(),
        );
        self
    }

    pub fn set_mode(&self, mode: FakeMode) {
        self.state.lock().mode = mode;
    }

    /// Assignments recorded through `persist_assignment`
    pub fn persisted(&self) -> Vec<(String, Assignment)> {
        self.state.lock().persisted.clone()
    }

    /// Visitor currently owning an identifier
    pub fn identifier_owner(&self, identifier_type: &str, value: &str) -> Option<String> {
        self.state
            .lock()
            .identifiers
            .get(&(identifier_type.to_string(), value.to_string()))
            .cloned()
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        let mode = self.state.lock().mode.clone();
        match mode {
            FakeMode::Serve => Ok(()),
            FakeMode::Fail(error) => Err(error),
            FakeMode::Hang => std::future::pending().await,
        }
    }

    fn visitor(state: &FakeState, id: &str) -> RemoteVisitor {
        RemoteVisitor {
            id: id.to_string(),
            assignments: state.visitors.get(id).cloned().unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn fetch_visitor(&self, id: &str) -> Result<RemoteVisitor, RemoteError> {
        CallCounts::bump(&self.calls.fetch_visitor);
        self.gate().await?;
        let state = self.state.lock();
        Ok(Self::visitor(&state, id))
    }

    async fn fetch_split_registry(&self) -> Result<SplitRegistry, RemoteError> {
        CallCounts::bump(&self.calls.fetch_split_registry);
        self.gate().await?;
        Ok(self.state.lock().registry.clone())
    }

    async fn create_identifier(
        &self,
        request: &IdentifierRequest,
    ) -> Result<RemoteVisitor, RemoteError> {
        CallCounts::bump(&self.calls.create_identifier);
        self.gate().await?;
        let mut state = self.state.lock();
        let key = (request.identifier_type.clone(), request.value.clone());
        let owner = state
            .identifiers
            .entry(key)
            .or_insert_with(|| request.visitor_id.clone())
            .clone();
        Ok(Self::visitor(&state, &owner))
    }

    async fn resolve_visitor_by_identifier(
        &self,
        identifier_type: &str,
        identifier_value: &str,
    ) -> Result<RemoteVisitor, RemoteError> {
        CallCounts::bump(&self.calls.resolve_visitor_by_identifier);
        self.gate().await?;
        let mut state = self.state.lock();
        let key = (identifier_type.to_string(), identifier_value.to_string());
        let owner = state
            .identifiers
            .entry(key)
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        Ok(Self::visitor(&state, &owner))
    }

    async fn persist_assignment(
        &self,
        visitor_id: &str,
        assignment: &Assignment,
    ) -> Result<(), RemoteError> {
        CallCounts::bump(&self.calls.persist_assignment);
        self.gate().await?;
        let mut state = self.state.lock();
        let confirmed = RemoteAssignment::new(assignment.split_name(), assignment.variant());
        let entry = state.visitors.entry(visitor_id.to_string()).or_default();
        entry.retain(|a| a.split_name != confirmed.split_name);
        entry.push(confirmed);
        state
            .persisted
            .push((visitor_id.to_string(), assignment.clone()));
        Ok(())
    }
}

/// Job queue that only records what it was given
#[derive(Debug, Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<Job>>,
    closed: Mutex<bool>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every further job
    pub fn close(&self) {
        *self.closed.lock() = true;
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }
}

#[async_trait::async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        if *self.closed.lock() {
            return Err(JobError::QueueClosed);
        }
        self.jobs.lock().push(job);
        Ok(())
    }
}
