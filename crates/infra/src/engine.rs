//! Facade wiring every component of the stock engine to one store.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use medstock_auth::{Actor, AuthClaims, Role, RolePolicy};
use medstock_core::{DomainError, DomainResult, UserId};

use crate::allocator::FefoAllocator;
use crate::audit::LedgerAudit;
use crate::batches::BatchRegistry;
use crate::catalog::CatalogService;
use crate::config::EngineConfig;
use crate::notifications::NotificationCenter;
use crate::recorder::StockRecorder;
use crate::signals::{ForecastSource, SignalEngine};
use crate::store::{InMemoryLedgerStore, UnitOfWork};
use crate::workflows::{CountReconciler, DisposalWorkflow, TransferWorkflow};

pub struct StockEngine<U> {
    policy: RolePolicy,
    recorder: StockRecorder<U>,
    allocator: FefoAllocator<U>,
    transfers: TransferWorkflow<U>,
    disposals: DisposalWorkflow<U>,
    counts: CountReconciler<U>,
    signals: SignalEngine<U>,
    notifications: NotificationCenter<U>,
    audit: LedgerAudit<U>,
    catalog: CatalogService<U>,
    batches: BatchRegistry<U>,
}

impl StockEngine<Arc<InMemoryLedgerStore>> {
    /// Engine over a fresh in-memory store.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), config)
    }
}

impl<U: UnitOfWork + Clone> StockEngine<U> {
    pub fn new(uow: U, config: EngineConfig) -> Self {
        let policy = config.role_policy();
        let params = config.forecast;
        Self {
            policy,
            recorder: StockRecorder::new(uow.clone()),
            allocator: FefoAllocator::new(uow.clone()),
            transfers: TransferWorkflow::new(uow.clone()),
            disposals: DisposalWorkflow::new(uow.clone()),
            counts: CountReconciler::new(uow.clone()),
            signals: SignalEngine::new(uow.clone(), params.clone()),
            notifications: NotificationCenter::new(uow.clone(), params),
            audit: LedgerAudit::new(uow.clone()),
            catalog: CatalogService::new(uow.clone()),
            batches: BatchRegistry::new(uow),
        }
    }

    pub fn with_forecast_source(mut self, source: Arc<dyn ForecastSource>) -> Self {
        self.signals = self.signals.with_forecast_source(source);
        self
    }

    /// Derive the caller's capabilities from the roles the Auth collaborator
    /// issued.
    pub fn actor(&self, user_id: UserId, roles: &[Role]) -> Actor {
        Actor::from_roles(user_id, roles, &self.policy)
    }

    /// Expired or not-yet-valid claims are refused as forbidden.
    pub fn actor_from_claims(&self, claims: &AuthClaims, now: DateTime<Utc>) -> DomainResult<Actor> {
        claims
            .to_actor(&self.policy, now)
            .map_err(|e| DomainError::forbidden(e.to_string()))
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    pub fn recorder(&self) -> &StockRecorder<U> {
        &self.recorder
    }

    pub fn allocator(&self) -> &FefoAllocator<U> {
        &self.allocator
    }

    pub fn transfers(&self) -> &TransferWorkflow<U> {
        &self.transfers
    }

    pub fn disposals(&self) -> &DisposalWorkflow<U> {
        &self.disposals
    }

    pub fn counts(&self) -> &CountReconciler<U> {
        &self.counts
    }

    pub fn signals(&self) -> &SignalEngine<U> {
        &self.signals
    }

    pub fn notifications(&self) -> &NotificationCenter<U> {
        &self.notifications
    }

    pub fn audit(&self) -> &LedgerAudit<U> {
        &self.audit
    }

    pub fn catalog(&self) -> &CatalogService<U> {
        &self.catalog
    }

    pub fn batches(&self) -> &BatchRegistry<U> {
        &self.batches
    }
}
