//! Visitor aggregate
//!
//! A [`Visitor`] owns one person's assignment registry for the duration of a
//! request. It resolves splits lazily: remote-confirmed assignments are
//! fetched at most once, and anything still missing is computed locally and
//! kept as new and unsynced until [`Visitor::sync_assignments`] pushes it.
//!
//! Remote reads that fail transiently degrade to "no data" and flag the
//! visitor as offline. Remote writes that fail transiently become deferred
//! jobs. Every other failure is returned to the caller.

use crate::error::VisitorError;
use crate::types::{BackfillIdentity, LinkOutcome, SyncReport, VisitorConfig, VisitorId};
use std::future::Future;
use std::sync::Arc;
use tt_remote::{
    IdentifierRequest, Job, JobQueue, RemoteAssignment, RemoteAuthority, RemoteError,
    RemoteVisitor,
};
use tt_split::{
    fill_missing, merge, Assignment, AssignmentRegistry, SplitError, SplitRegistry,
    VariantCalculator,
};
use tt_vary::{AbConfiguration, Dispatch, VaryDsl};

/// Memoized remote value
#[derive(Debug, Clone)]
enum Fetched<T> {
    NotFetched,
    Available(T),
    Unavailable,
}

/// Run a remote call under the visitor's time bound
async fn bounded<T, F>(config: &VisitorConfig, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(config.request_timeout(), call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout {
            timeout_ms: config.request_timeout_ms,
        }),
    }
}

/// One visitor's view of the split-testing service
pub struct Visitor {
    id: VisitorId,
    authority: Arc<dyn RemoteAuthority>,
    jobs: Arc<dyn JobQueue>,
    config: VisitorConfig,
    assignments: AssignmentRegistry,
    split_registry: Fetched<Arc<SplitRegistry>>,
    loaded: bool,
    offline: bool,
    id_overridden_by_existing_visitor: bool,
}

impl Visitor {
    fn build(
        authority: Arc<dyn RemoteAuthority>,
        jobs: Arc<dyn JobQueue>,
        id: VisitorId,
        loaded: bool,
    ) -> Self {
        Self {
            id,
            authority,
            jobs,
            config: VisitorConfig::default(),
            assignments: AssignmentRegistry::new(),
            split_registry: Fetched::NotFetched,
            loaded,
            offline: false,
            id_overridden_by_existing_visitor: false,
        }
    }

    /// Brand new visitor with a random id
    ///
    /// Nothing can exist remotely for it yet, so it never fetches.
    #[must_use]
    pub fn new(authority: Arc<dyn RemoteAuthority>, jobs: Arc<dyn JobQueue>) -> Self {
        Self::build(authority, jobs, VisitorId::generate(), true)
    }

    /// Returning visitor whose remote assignments load on first use
    #[must_use]
    pub fn with_id(
        authority: Arc<dyn RemoteAuthority>,
        jobs: Arc<dyn JobQueue>,
        id: impl Into<VisitorId>,
    ) -> Self {
        Self::build(authority, jobs, id.into(), false)
    }

    /// Visitor adopting state the remote authority already returned
    #[must_use]
    pub fn from_remote(
        authority: Arc<dyn RemoteAuthority>,
        jobs: Arc<dyn JobQueue>,
        remote: RemoteVisitor,
    ) -> Self {
        let assignments = remote
            .to_assignments()
            .map(|a| (a.split_name().to_string(), a))
            .collect();
        let mut visitor = Self::build(authority, jobs, VisitorId::from(remote.id), true);
        visitor.assignments = assignments;
        visitor
    }

    /// Seed the split registry, skipping the remote fetch
    #[must_use]
    pub fn with_split_registry(mut self, registry: Arc<SplitRegistry>) -> Self {
        self.split_registry = Fetched::Available(registry);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: VisitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve the canonical visitor for an identity and alias it
    ///
    /// The returned visitor carries the server's assignments as confirmed,
    /// and a [`Job::CreateAlias`] tying `existing_id` to the canonical id is
    /// enqueued.
    ///
    /// # Errors
    /// Any remote failure, transient or not, since there is no local state
    /// to fall back on
    pub async fn backfill_identity(
        authority: Arc<dyn RemoteAuthority>,
        jobs: Arc<dyn JobQueue>,
        identity: &BackfillIdentity,
        config: VisitorConfig,
    ) -> Result<Self, VisitorError> {
        let remote = bounded(
            &config,
            authority
                .resolve_visitor_by_identifier(&identity.identifier_type, &identity.identifier_value),
        )
        .await?;

        jobs.enqueue(Job::CreateAlias {
            existing_id: identity.existing_id.clone(),
            alias_id: remote.id.clone(),
        })
        .await?;
        tracing::info!(
            "Backfilled visitor {} from {} identifier, aliasing {}",
            remote.id,
            identity.identifier_type,
            identity.existing_id
        );

        let mut visitor = Self::from_remote(authority, jobs, remote).with_config(config);
        for assignment in visitor.assignments.values_mut() {
            *assignment = assignment.synced();
        }
        Ok(visitor)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &VisitorId {
        &self.id
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &VisitorConfig {
        &self.config
    }

    /// Whether a remote read has failed transiently
    #[inline]
    #[must_use]
    pub fn offline(&self) -> bool {
        self.offline
    }

    /// Whether remote assignments have been loaded (or need no loading)
    #[inline]
    #[must_use]
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Whether an identity link replaced this visitor's id
    #[inline]
    #[must_use]
    pub fn id_overridden_by_existing_visitor(&self) -> bool {
        self.id_overridden_by_existing_visitor
    }

    /// All assignments, loading remote ones first if needed
    ///
    /// # Errors
    /// Non-transient failure of the remote fetch
    pub async fn assignment_registry(&mut self) -> Result<&AssignmentRegistry, VisitorError> {
        self.ensure_loaded().await?;
        Ok(&self.assignments)
    }

    /// Assignments the remote authority has not confirmed
    ///
    /// # Errors
    /// Non-transient failure of the remote fetch
    pub async fn unsynced_assignments(&mut self) -> Result<Vec<Assignment>, VisitorError> {
        self.ensure_loaded().await?;
        Ok(self
            .assignments
            .values()
            .filter(|a| a.unsynced())
            .cloned()
            .collect())
    }

    /// Assignments held right now in wire form, without loading
    #[must_use]
    pub fn assignments_payload(&self) -> Vec<RemoteAssignment> {
        self.assignments.values().map(RemoteAssignment::from).collect()
    }

    /// Split registry, fetched once per visitor
    ///
    /// `None` when the remote authority could not be reached.
    ///
    /// # Errors
    /// Non-transient failure of the remote fetch
    pub async fn split_registry(&mut self) -> Result<Option<Arc<SplitRegistry>>, VisitorError> {
        match &self.split_registry {
            Fetched::Available(registry) => return Ok(Some(Arc::clone(registry))),
            Fetched::Unavailable => return Ok(None),
            Fetched::NotFetched => {}
        }

        match bounded(&self.config, self.authority.fetch_split_registry()).await {
            Ok(registry) => {
                let registry = Arc::new(registry);
                self.split_registry = Fetched::Available(Arc::clone(&registry));
                Ok(Some(registry))
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Split registry unavailable for visitor {}: {}", self.id, e);
                self.offline = true;
                self.split_registry = Fetched::Unavailable;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the branch of `block` matching this visitor's variant
    ///
    /// If the variant has no branch the default runs, and the default's
    /// variant replaces the assignment so the visitor is reported as having
    /// seen what it actually saw.
    ///
    /// The declaration is validated before the split is resolved, so a
    /// malformed block records no assignment.
    ///
    /// # Errors
    /// Malformed declaration, unknown split, or a non-transient remote
    /// failure
    pub async fn vary<'a, R, F>(&mut self, split_name: &str, block: F) -> Result<R, VisitorError>
    where
        F: FnOnce(&mut VaryDsl<'a, R>),
    {
        let registry = self.prepare(split_name).await?;
        let weighting = registry.as_deref().and_then(|r| r.weighting(split_name));

        let mut dsl = VaryDsl::new(split_name, weighting);
        block(&mut dsl);
        dsl.validate()?;

        let assignment = self.resolve(split_name, registry.as_deref())?;
        let outcome = dsl.run(assignment.as_ref().map(Assignment::variant))?;
        self.record(assignment, &outcome.dispatch);
        Ok(outcome.value)
    }

    /// Whether this visitor is in the `true` variant of a two-way split
    ///
    /// `true_variant` defaults to `"true"`.
    ///
    /// # Errors
    /// Unknown split or a non-transient remote failure
    pub async fn ab(
        &mut self,
        split_name: &str,
        true_variant: Option<&str>,
    ) -> Result<bool, VisitorError> {
        let registry = self.prepare(split_name).await?;
        let weighting = registry.as_deref().and_then(|r| r.weighting(split_name));

        let config = AbConfiguration::new(split_name, true_variant, weighting);
        let assignment = self.resolve(split_name, registry.as_deref())?;
        let outcome = tt_vary::ab(&config, assignment.as_ref().map(Assignment::variant), weighting)?;
        self.record(assignment, &outcome.dispatch);
        Ok(outcome.value)
    }

    /// Link an external identifier to this visitor
    ///
    /// Remote assignments of the current id are loaded first so they are
    /// carried over. On success the visitor adopts the canonical id and the
    /// server's assignments win over local ones. If the remote authority is
    /// unreachable the call is queued and the visitor is left untouched.
    ///
    /// # Errors
    /// Non-transient remote failure, or the retry could not be queued
    pub async fn link_identifier(
        &mut self,
        identifier_type: &str,
        value: &str,
    ) -> Result<LinkOutcome, VisitorError> {
        self.ensure_loaded().await?;
        let request = IdentifierRequest::new(identifier_type, self.id.as_str(), value);
        match bounded(&self.config, self.authority.create_identifier(&request)).await {
            Ok(remote) => Ok(self.adopt(remote)),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "Deferring {} identifier link for visitor {}: {}",
                    identifier_type,
                    self.id,
                    e
                );
                self.jobs.enqueue(Job::CreateIdentifier(request)).await?;
                Ok(LinkOutcome::Deferred)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Push unsynced assignments to the remote authority
    ///
    /// # Errors
    /// Non-transient remote failure, or a retry could not be queued
    pub async fn sync_assignments(&mut self) -> Result<SyncReport, VisitorError> {
        self.ensure_loaded().await?;
        let pending: Vec<Assignment> = self
            .assignments
            .values()
            .filter(|a| a.unsynced())
            .cloned()
            .collect();

        let mut report = SyncReport::default();
        for assignment in pending {
            match bounded(
                &self.config,
                self.authority.persist_assignment(self.id.as_str(), &assignment),
            )
            .await
            {
                Ok(()) => {
                    self.assignments
                        .insert(assignment.split_name().to_string(), assignment.synced());
                    report.synced += 1;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        "Deferring sync of {} for visitor {}: {}",
                        assignment.split_name(),
                        self.id,
                        e
                    );
                    self.jobs
                        .enqueue(Job::PersistAssignment {
                            visitor_id: self.id.to_string(),
                            split_name: assignment.split_name().to_string(),
                            variant: assignment.variant().to_string(),
                        })
                        .await?;
                    report.deferred += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(
            "Visitor {} sync: {} synced, {} deferred",
            self.id,
            report.synced,
            report.deferred
        );
        Ok(report)
    }

    async fn ensure_loaded(&mut self) -> Result<(), VisitorError> {
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;

        match bounded(&self.config, self.authority.fetch_visitor(self.id.as_str())).await {
            Ok(remote) => {
                let added = fill_missing(&mut self.assignments, remote.to_assignments());
                tracing::debug!("Loaded {} remote assignments for visitor {}", added, self.id);
                Ok(())
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Visitor {} could not be loaded, continuing offline: {}", self.id, e);
                self.offline = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load whatever resolving `split_name` may need
    ///
    /// Remote assignments are only fetched when the split is not held
    /// locally. The split registry is fetched regardless since dispatch
    /// checks declarations against it.
    async fn prepare(&mut self, split_name: &str) -> Result<Option<Arc<SplitRegistry>>, VisitorError> {
        if !self.assignments.contains_key(split_name) {
            self.ensure_loaded().await?;
        }
        self.split_registry().await
    }

    /// Existing or freshly computed assignment for a split
    ///
    /// Nothing is stored; [`Self::record`] does that once a branch ran.
    /// `None` only when the split registry is unreachable.
    fn resolve(
        &self,
        split_name: &str,
        registry: Option<&SplitRegistry>,
    ) -> Result<Option<Assignment>, SplitError> {
        if let Some(assignment) = self.assignments.get(split_name) {
            return Ok(Some(assignment.clone()));
        }
        let Some(registry) = registry else {
            return Ok(None);
        };
        VariantCalculator::assign(self.id.as_str(), split_name, registry).map(Some)
    }

    fn record(&mut self, assignment: Option<Assignment>, dispatch: &Dispatch) {
        let Some(assignment) = assignment else {
            return;
        };
        let assignment = match dispatch.replaced() {
            Some(unhandled) => {
                tracing::info!(
                    "Visitor {} variant {} of {} has no branch, recording {}",
                    self.id,
                    unhandled,
                    assignment.split_name(),
                    dispatch.variant()
                );
                assignment.with_variant(dispatch.variant())
            }
            None => {
                if !self.assignments.contains_key(assignment.split_name()) {
                    tracing::debug!(
                        "Assigned visitor {} to {} variant {}",
                        self.id,
                        assignment.split_name(),
                        assignment.variant()
                    );
                }
                assignment
            }
        };
        self.assignments
            .insert(assignment.split_name().to_string(), assignment);
    }

    fn adopt(&mut self, remote: RemoteVisitor) -> LinkOutcome {
        let local = std::mem::take(&mut self.assignments);
        self.assignments = merge(local, remote.to_assignments());
        self.loaded = true;

        let id_changed = self.id.as_str() != remote.id;
        if id_changed {
            tracing::info!("Visitor {} linked to existing visitor {}", self.id, remote.id);
            self.id = VisitorId::from(remote.id);
            self.id_overridden_by_existing_visitor = true;
        }
        LinkOutcome::Linked { id_changed }
    }
}

impl std::fmt::Debug for Visitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visitor")
            .field("id", &self.id)
            .field("assignments", &self.assignments)
            .field("loaded", &self.loaded)
            .field("offline", &self.offline)
            .finish_non_exhaustive()
    }
}
