//! Explicit create-or-update commands for catalog records.

use rust_decimal::Decimal;
use tracing::{info, instrument};

use medstock_auth::{Actor, Capability, require};
use medstock_core::{DomainError, DomainResult, ItemId, LocationId};
use medstock_inventory::{Item, ItemSpec, Location, LocationSpec, Threshold};

use crate::store::{LedgerTx, UnitOfWork};

/// Whether an upsert created a record or changed an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted<T> {
    Created(T),
    Updated(T),
}

impl<T> Upserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upserted::Created(v) | Upserted::Updated(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}

#[derive(Debug, Clone)]
pub struct CatalogService<U> {
    uow: U,
}

impl<U: UnitOfWork> CatalogService<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    #[instrument(skip(self, actor, spec), fields(sku = %spec.sku))]
    pub fn create_or_update_item_by_sku(&self, actor: &Actor, spec: ItemSpec) -> DomainResult<Upserted<Item>> {
        require(actor, Capability::ManageCatalog)?;
        spec.validate()?;

        self.uow.run_atomically("upsert_item", |tx| {
            let outcome = match tx.item_by_sku(&spec.sku) {
                Some(existing) => Upserted::Updated(spec.into_item(existing.id)),
                None => Upserted::Created(spec.into_item(ItemId::new())),
            };
            let item = match &outcome {
                Upserted::Created(i) | Upserted::Updated(i) => i.clone(),
            };
            tx.put_item(item);
            info!(created = outcome.was_created(), "item upserted");
            Ok(outcome)
        })
    }

    #[instrument(skip(self, actor, spec), fields(code = %spec.code))]
    pub fn create_or_update_location_by_code(
        &self,
        actor: &Actor,
        spec: LocationSpec,
    ) -> DomainResult<Upserted<Location>> {
        require(actor, Capability::ManageCatalog)?;
        spec.validate()?;

        self.uow.run_atomically("upsert_location", |tx| {
            let outcome = match tx.location_by_code(&spec.code) {
                Some(existing) => Upserted::Updated(spec.into_location(existing.id)),
                None => Upserted::Created(spec.into_location(LocationId::new())),
            };
            let location = match &outcome {
                Upserted::Created(l) | Upserted::Updated(l) => l.clone(),
            };
            tx.put_location(location);
            info!(created = outcome.was_created(), "location upserted");
            Ok(outcome)
        })
    }

    /// Set the minimum quantity of an item, item-wide or for one location.
    pub fn set_threshold(
        &self,
        actor: &Actor,
        item: ItemId,
        location: Option<LocationId>,
        min_qty: Decimal,
    ) -> DomainResult<Threshold> {
        require(actor, Capability::ManageCatalog)?;
        let threshold = Threshold::new(item, location, min_qty)?;

        self.uow.run_atomically("set_threshold", |tx| {
            if tx.item(item).is_none() {
                return Err(DomainError::not_found("item", item));
            }
            if let Some(l) = location {
                if tx.location(l).is_none() {
                    return Err(DomainError::not_found("location", l));
                }
            }
            tx.put_threshold(threshold.clone());
            Ok(threshold)
        })
    }

    pub fn item(&self, id: ItemId) -> DomainResult<Item> {
        self.uow
            .read(|tx| tx.item(id))?
            .ok_or_else(|| DomainError::not_found("item", id))
    }

    pub fn item_by_sku(&self, sku: &str) -> DomainResult<Item> {
        self.uow
            .read(|tx| tx.item_by_sku(sku))?
            .ok_or_else(|| DomainError::not_found("item", sku))
    }

    pub fn location(&self, id: LocationId) -> DomainResult<Location> {
        self.uow
            .read(|tx| tx.location(id))?
            .ok_or_else(|| DomainError::not_found("location", id))
    }
}
