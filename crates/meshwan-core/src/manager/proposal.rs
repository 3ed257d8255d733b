use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::EntityManager;
use super::context::ManagerContext;
use crate::error::{CoreError, Result};
use crate::model::{EntityKind, Proposal, validate_name};
use crate::store::{StoreKey, keys};

/// Crypto proposals of an overlay. Every tunnel in the overlay offers all
/// of them.
#[derive(Clone)]
pub struct ProposalManager {
    ctx: Arc<ManagerContext>,
}

impl ProposalManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EntityManager for ProposalManager {
    type Entity = Proposal;
    type Parent = str;

    fn kind(&self) -> EntityKind {
        EntityKind::Proposal
    }

    fn store_key(&self, overlay: &str, name: &str) -> StoreKey {
        keys::child(overlay, "proposal", name)
    }

    async fn create(&self, overlay: &str, proposal: Proposal) -> Result<Proposal> {
        self.ctx.require_overlay(overlay).await?;
        validate_name(self.kind(), proposal.name())?;
        proposal.validate()?;

        let key = self.store_key(overlay, proposal.name());
        if self.ctx.store.exists(keys::PROPOSALS, &key).await? {
            return Err(ManagerContext::already_exists(self.kind(), proposal.name()));
        }
        self.ctx.store.put(keys::PROPOSALS, &key, &proposal).await?;
        info!(overlay, proposal = %proposal.name(), "proposal created");
        Ok(proposal)
    }

    async fn get(&self, overlay: &str, name: &str) -> Result<Proposal> {
        self.ctx
            .load(keys::PROPOSALS, &self.store_key(overlay, name), self.kind(), name)
            .await
    }

    async fn list(&self, overlay: &str) -> Result<Vec<Proposal>> {
        self.ctx
            .store
            .list(keys::PROPOSALS, &self.store_key(overlay, ""))
            .await
    }

    async fn update(&self, overlay: &str, name: &str, proposal: Proposal) -> Result<Proposal> {
        if proposal.name() != name {
            return Err(CoreError::validation(format!(
                "name '{}' does not match '{name}'",
                proposal.name()
            )));
        }
        proposal.validate()?;
        self.get(overlay, name).await?;
        self.ctx
            .store
            .put(keys::PROPOSALS, &self.store_key(overlay, name), &proposal)
            .await?;
        Ok(proposal)
    }

    async fn delete(&self, overlay: &str, name: &str) -> Result<()> {
        self.ctx
            .store
            .delete(keys::PROPOSALS, &self.store_key(overlay, name))
            .await
    }
}
