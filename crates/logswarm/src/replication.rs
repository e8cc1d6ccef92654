//! Pull-based log replication
//!
//! Every registered log is replicated eagerly. Peers advertise how much of a
//! log they hold with `Have`; whoever is behind asks for the missing range
//! with `Request` and merges the signed entries that come back in `Data`.
//! A node that merged anything advertises its new length, which is what
//! carries records across multi-hop paths.
//!
//! `Have` goes out as [`Outbound::Announce`]: a peer whose send queue is
//! full misses it and catches up on the next one for that log.

use crate::log::{LogError, LogHandle};
use crate::outbound::Outbound;
use crate::registry::LogRegistry;
use logswarm_net::framing::{Frame, FrameType};
use logswarm_net::peer::PeerId;
use logswarm_net::transport::messages::{Data, Have, Request, WireMessage};
use logswarm_net::transport::TransportError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Replication errors
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Wire error: {0}")]
    Wire(#[from] TransportError),
    #[error("Log error: {0}")]
    Log(#[from] LogError),
    #[error("Not a replication frame: {0:?}")]
    UnexpectedFrame(FrameType),
}

fn encode<M: WireMessage>(message: &M) -> Result<Frame, ReplicationError> {
    message
        .to_frame()
        .map_err(|e| ReplicationError::Wire(TransportError::from(e)))
}

fn decode<M: WireMessage>(frame: &Frame) -> Result<M, ReplicationError> {
    M::from_frame(frame).map_err(|e| ReplicationError::Wire(TransportError::from(e)))
}

/// Sans-IO replication state machine
pub struct Replicator {
    registry: Arc<LogRegistry>,
    /// Maximum entries per `Data` frame
    max_batch: usize,
}

impl Replicator {
    pub fn new(registry: Arc<LogRegistry>, max_batch: usize) -> Self {
        Self {
            registry,
            max_batch: max_batch.max(1),
        }
    }

    /// Tell a newly opened peer how far along every non-empty log is
    pub fn on_peer_open(&self, peer: PeerId) -> Result<Vec<Outbound>, ReplicationError> {
        self.registry
            .handles()
            .iter()
            .filter(|log| !log.is_empty())
            .map(|log| {
                let frame = encode(&Have {
                    log: log.id(),
                    length: log.len(),
                })?;
                Ok(Outbound::Send { peer, frame })
            })
            .collect()
    }

    /// Ask every peer for a freshly registered replica
    pub fn on_log_registered(&self, log: &LogHandle) -> Result<Option<Outbound>, ReplicationError> {
        if log.is_writable() {
            return Ok(None);
        }
        let frame = encode(&Request {
            log: log.id(),
            start: log.len(),
        })?;
        Ok(Some(Outbound::Broadcast(frame)))
    }

    /// Advertise a local append
    pub fn on_local_append(&self, log: &LogHandle) -> Result<Outbound, ReplicationError> {
        let frame = encode(&Have {
            log: log.id(),
            length: log.len(),
        })?;
        Ok(Outbound::Announce(frame))
    }

    /// Handle a replication frame from `from`
    pub fn on_frame(&self, from: PeerId, frame: &Frame) -> Result<Vec<Outbound>, ReplicationError> {
        match frame.frame_type {
            FrameType::Have => self.on_have(from, decode(frame)?),
            FrameType::Request => self.on_request(from, decode(frame)?),
            FrameType::Data => self.on_data(from, decode(frame)?),
            other => Err(ReplicationError::UnexpectedFrame(other)),
        }
    }

    fn on_have(&self, from: PeerId, have: Have) -> Result<Vec<Outbound>, ReplicationError> {
        let Some(log) = self.registry.get(&have.log) else {
            trace!("Have for unregistered log {} from {}", have.log, from);
            return Ok(Vec::new());
        };
        let local = log.len();
        if log.is_writable() || have.length <= local {
            return Ok(Vec::new());
        }

        debug!(
            "Peer {} holds {} entries of {}, we hold {}",
            from, have.length, have.log, local
        );
        let frame = encode(&Request {
            log: have.log,
            start: local,
        })?;
        Ok(vec![Outbound::Send { peer: from, frame }])
    }

    fn on_request(&self, from: PeerId, request: Request) -> Result<Vec<Outbound>, ReplicationError> {
        let Some(log) = self.registry.get(&request.log) else {
            trace!("Request for unregistered log {} from {}", request.log, from);
            return Ok(Vec::new());
        };
        let entries = log.entries(request.start, self.max_batch);
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        trace!(
            "Sending {} entries of {} from {} to {}",
            entries.len(),
            request.log,
            request.start,
            from
        );
        let frame = encode(&Data {
            log: request.log,
            entries,
        })?;
        Ok(vec![Outbound::Send { peer: from, frame }])
    }

    fn on_data(&self, from: PeerId, data: Data) -> Result<Vec<Outbound>, ReplicationError> {
        let Some(log) = self.registry.get(&data.log) else {
            trace!("Data for unregistered log {} from {}", data.log, from);
            return Ok(Vec::new());
        };
        if log.is_writable() {
            return Ok(Vec::new());
        }

        let received = data.entries.len();
        let mut merged = 0;
        let mut failure = None;
        for entry in data.entries {
            match log.merge(entry) {
                Ok(true) => merged += 1,
                Ok(false) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut outbound = Vec::new();
        if merged > 0 {
            debug!("Merged {} entries of {} from {}", merged, data.log, from);
            outbound.push(Outbound::Announce(encode(&Have {
                log: data.log,
                length: log.len(),
            })?));
        }
        if let Some(e) = failure {
            warn!("Rejected data for {} from {}: {}", data.log, from, e);
            if outbound.is_empty() {
                return Err(e.into());
            }
            return Ok(outbound);
        }
        if received >= self.max_batch {
            outbound.push(Outbound::Send {
                peer: from,
                frame: encode(&Request {
                    log: data.log,
                    start: log.len(),
                })?,
            });
        }
        Ok(outbound)
    }
}
