//! Shared helpers for end-to-end scenarios.

use std::sync::Arc;
use std::time::Duration;

use abyss_core::clock::ManualClock;
use abyss_core::events::CurseEvent;
use abyss_core::region::{RegionConfig, RegionMode};
use abyss_core::traits::CurseStore;
use abyss_core::types::{EntityId, Position, Timestamp};
use abyss_curse::SampleOutcome;
use abyss_node_lib::{MemoryStore, Node, NodeConfig};
use rand::rngs::mock::StepRng;
use tokio::sync::broadcast;

/// Scenario start time.
pub const T0: Timestamp = Timestamp(1_700_000_000_000);

/// Random source whose every draw converts (and picks the lucky variant).
pub fn always_convert() -> StepRng {
    StepRng::new(0, 0)
}

/// Random source whose first draw converts and second picks the sad variant.
pub fn convert_sad() -> StepRng {
    StepRng::new(0, 1 << 63)
}

/// Random source whose draws never convert.
pub fn never_convert() -> StepRng {
    StepRng::new(u64::MAX, 0)
}

pub fn entity(n: u128) -> EntityId {
    EntityId::from_u128(n)
}

/// Overworld position near the region center.
pub fn at(y: f64) -> Position {
    Position::new(8.0, y, 8.0)
}

/// Bounded region, radius 10 chunks, default bands and thresholds.
pub fn bounded_config() -> NodeConfig {
    NodeConfig {
        ephemeral: true,
        region: RegionConfig { mode: RegionMode::Bounded, radius: 10, ..RegionConfig::default() },
        ..NodeConfig::default()
    }
}

pub struct TestNode {
    pub node: Arc<Node>,
    pub clock: Arc<ManualClock>,
    pub events: broadcast::Receiver<CurseEvent>,
}

impl TestNode {
    /// Node over `store` with a fresh manual clock at [`T0`].
    pub fn new(config: NodeConfig, store: Arc<dyn CurseStore>, rng: StepRng) -> Self {
        Self::with_clock(config, store, Arc::new(ManualClock::new(T0)), rng)
    }

    pub fn with_clock(
        config: NodeConfig,
        store: Arc<dyn CurseStore>,
        clock: Arc<ManualClock>,
        rng: StepRng,
    ) -> Self {
        let node = Node::with_rng(config, store, clock.clone(), Box::new(rng)).unwrap();
        let events = node.subscribe();
        Self { node, clock, events }
    }

    /// In-memory node, bounded region, draws never convert.
    pub fn memory() -> Self {
        Self::new(bounded_config(), Arc::new(MemoryStore::new()), never_convert())
    }

    pub fn advance(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    /// Everything published since the last drain.
    pub fn drain(&mut self) -> Vec<CurseEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Report a position and run one sample step, half a second later.
    pub fn step_to(&self, id: EntityId, pos: Position) -> SampleOutcome {
        self.advance(500);
        self.node.update_position(id, pos).unwrap();
        self.node.sample_entity(id).unwrap()
    }
}
