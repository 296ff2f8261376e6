// Outbound fan-out lives off the event loop: the loop drops jobs into a bounded
// queue and one worker task hands them to the transports, which keep a queue
// per peer so a slow peer never holds this worker

use crate::network::{NetAddr, Transport};
use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound jobs buffered before new ones are dropped
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send to every peer of every configured transport
    Broadcast(Vec<u8>),
    /// Send to one peer over the primary transport
    Direct { to: NetAddr, payload: Vec<u8> },
}

#[derive(Clone)]
pub struct Broadcaster {
    queue: mpsc::Sender<Outbound>,
}

impl Broadcaster {
    /// Start the worker. It stops once every `Broadcaster` clone is dropped.
    pub fn spawn(
        transports: Vec<Arc<dyn Transport>>,
        primary: Arc<dyn Transport>,
        capacity: usize,
    ) -> (Broadcaster, JoinHandle<()>) {
        let (queue, mut jobs) = mpsc::channel::<Outbound>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                match job {
                    Outbound::Broadcast(payload) => {
                        for transport in &transports {
                            if let Err(e) = transport.broadcast(payload.clone()).await {
                                error!("Broadcast over {} failed: {e}", transport.addr());
                            }
                        }
                    }
                    Outbound::Direct { to, payload } => {
                        if let Err(e) = primary.send_message(&to, payload).await {
                            error!("Send from {} to {to} failed: {e}", primary.addr());
                        }
                    }
                }
            }
            debug!("Outbound worker for {} stopped", primary.addr());
        });

        (Broadcaster { queue }, worker)
    }

    /// Queue a job without waiting. Returns `false` when the job was dropped.
    pub fn enqueue(&self, job: Outbound) -> bool {
        match self.queue.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Outbound worker stopped, dropping job");
                false
            }
        }
    }
}
