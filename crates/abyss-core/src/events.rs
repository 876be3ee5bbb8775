//! Outbound events from the engine to presentation collaborators.
//!
//! Everything the engine wants a host to *do* (apply effects, play sounds,
//! kill an entity, update a display) is one of these messages. The engine
//! never calls presentation code directly.

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, NarehateVariant};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CurseEvent {
    /// Depth layer for score/visual display. 0 when outside the region.
    LayerDisplay { entity: EntityId, layer: u8 },
    /// A curse became active. Hosts apply the status-effect bundle for `layer`.
    CurseTriggered {
        entity: EntityId,
        layer: u8,
        duration_ticks: u64,
        arm: i64,
    },
    PlayTriggerSound { entity: EntityId },
    StartAmbientSound { entity: EntityId },
    StopAmbientSound { entity: EntityId },
    /// Remove every curse-sourced status effect.
    RemoveCurseEffects { entity: EntityId },
    CurseExpired { entity: EntityId, layer: u8 },
    /// Terminal-layer curse ran its course: set health to zero.
    ForceKill { entity: EntityId },
    /// Emitted on every death interrupt. `from_curse` drives the custom death message.
    DeathResolved { entity: EntityId, from_curse: bool },
    NarehateConverted { entity: EntityId, variant: NarehateVariant },
    /// A converted entity rejoined; hosts reapply the variant's cosmetics.
    NarehateRestored { entity: EntityId, variant: NarehateVariant },
    ExemptionGranted { entity: EntityId },
    ExemptionRevoked { entity: EntityId },
}

impl CurseEvent {
    /// The entity this event concerns.
    pub fn entity(&self) -> EntityId {
        match self {
            Self::LayerDisplay { entity, .. }
            | Self::CurseTriggered { entity, .. }
            | Self::PlayTriggerSound { entity }
            | Self::StartAmbientSound { entity }
            | Self::StopAmbientSound { entity }
            | Self::RemoveCurseEffects { entity }
            | Self::CurseExpired { entity, .. }
            | Self::ForceKill { entity }
            | Self::DeathResolved { entity, .. }
            | Self::NarehateConverted { entity, .. }
            | Self::NarehateRestored { entity, .. }
            | Self::ExemptionGranted { entity }
            | Self::ExemptionRevoked { entity } => *entity,
        }
    }
}
