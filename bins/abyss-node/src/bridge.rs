//! JSON-lines host protocol.
//!
//! The host writes one [`HostMessage`] per line on stdin. Outbound curse
//! events and [`Reply`] objects are written one per line on stdout by a
//! single writer task, so lines never interleave.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use abyss_core::events::CurseEvent;
use abyss_core::region::{ExemptionZone, RegionMode};
use abyss_core::types::{EntityId, Position};
use abyss_node_lib::{EntityReport, Node, NodeConfig};

/// Inbound message, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Join { entity: EntityId, position: Position },
    Quit { entity: EntityId },
    Move { entity: EntityId, position: Position },
    Death { entity: EntityId, position: Position },
    Respawn { entity: EntityId, position: Position },
    Debuff { entity: EntityId, present: bool },
    /// Re-read the configuration file and swap the region snapshot.
    Reload,
    Save,
    Grant { entity: EntityId },
    Revoke { entity: EntityId },
    Mode { mode: RegionMode },
    Inspect { entity: EntityId },
    Zones,
    ZoneAdd { min: [i64; 3], max: [i64; 3] },
    ZoneRemove { index: usize },
}

/// Outbound answer to a query message, tagged by `"reply"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Report { entity: EntityId, report: Option<EntityReport> },
    Saved { saved: usize },
    Zones { zones: Vec<ExemptionZone> },
}

pub struct Bridge {
    node: Arc<Node>,
    config_path: Option<PathBuf>,
    out: mpsc::UnboundedSender<String>,
}

impl Bridge {
    pub fn new(
        node: Arc<Node>,
        config_path: Option<PathBuf>,
        out: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self { node, config_path, out }
    }

    /// Read host messages until end of input. Bad lines are skipped.
    pub async fn serve<R: AsyncRead + Unpin>(&self, input: R) -> anyhow::Result<()> {
        let mut lines = BufReader::new(input).lines();
        while let Some(line) = lines.next_line().await.context("failed to read host input")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<HostMessage>(line) {
                Ok(message) => {
                    if let Err(e) = self.handle(message).await {
                        warn!(error = %e, "host message failed");
                    }
                }
                Err(e) => warn!(error = %e, line, "skipping unparseable host message"),
            }
        }
        Ok(())
    }

    pub async fn handle(&self, message: HostMessage) -> anyhow::Result<()> {
        debug!(?message, "host message");
        match message {
            HostMessage::Join { entity, position } => self.node.join(entity, position).await,
            HostMessage::Quit { entity } => {
                self.node.quit(entity).await?;
            }
            HostMessage::Move { entity, position } => self.node.update_position(entity, position)?,
            HostMessage::Death { entity, position } => {
                self.node.death(entity, position)?;
            }
            HostMessage::Respawn { entity, position } => self.node.respawn(entity, position)?,
            HostMessage::Debuff { entity, present } => self.node.set_deep_debuff(entity, present)?,
            HostMessage::Reload => {
                let config = NodeConfig::load(self.config_path.as_deref())
                    .context("failed to reload configuration")?;
                self.node.reload_region(config.region)?;
            }
            HostMessage::Save => {
                let saved = self.node.save_all().await;
                self.reply(&Reply::Saved { saved })?;
            }
            HostMessage::Grant { entity } => {
                self.node.grant_exemption(entity);
            }
            HostMessage::Revoke { entity } => {
                self.node.revoke_exemption(entity);
            }
            HostMessage::Mode { mode } => self.node.set_mode(mode)?,
            HostMessage::Inspect { entity } => {
                self.reply(&Reply::Report { entity, report: self.node.inspect(entity) })?;
            }
            HostMessage::Zones => self.reply_zones()?,
            HostMessage::ZoneAdd { min, max } => {
                self.node.add_exemption_zone(ExemptionZone::new(min, max))?;
                self.reply_zones()?;
            }
            HostMessage::ZoneRemove { index } => {
                if self.node.remove_exemption_zone(index)?.is_none() {
                    warn!(index, "no exemption zone at index");
                }
                self.reply_zones()?;
            }
        }
        Ok(())
    }

    fn reply_zones(&self) -> anyhow::Result<()> {
        self.reply(&Reply::Zones { zones: self.node.exemption_zones() })
    }

    fn reply(&self, reply: &Reply) -> anyhow::Result<()> {
        let line = serde_json::to_string(reply).context("failed to encode reply")?;
        self.out.send(line).context("output closed")
    }
}

/// Forward curse events to the output channel until either side closes.
pub async fn forward_events(
    mut events: broadcast::Receiver<CurseEvent>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => {
                    if out.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode curse event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event stream lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Write output lines until every sender is gone.
pub async fn write_lines<W: AsyncWrite + Unpin>(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut writer: W,
) -> std::io::Result<()> {
    while let Some(line) = lines.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
