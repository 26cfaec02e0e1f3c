use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use relay_protocol::Response;

use crate::registry::Registry;
use crate::server_types::ConnectionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to the recipient's outbound queue
    Queued,
    /// No live registration under that name
    Unreachable,
    /// Recipient is not keeping up, message dropped
    QueueFull,
    /// Recipient's writer is gone, it is on its way out
    Closed,
}

// handles msg delivery back to clients, best effort: never waits on the recipient
#[derive(Clone)]
pub struct Delivery {
    registry: Registry,
}

impl Delivery {
    pub fn new(registry: &Registry) -> Self {
        Delivery {
            registry: registry.clone(),
        }
    }

    pub fn send(&self, handle: &ConnectionHandle, msg: Response) -> DeliveryOutcome {
        match handle.outbound().try_send(msg) {
            Ok(()) => DeliveryOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, dropping msg", handle.id());
                DeliveryOutcome::QueueFull
            },
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue closed for {}, dropping msg", handle.id());
                DeliveryOutcome::Closed
            },
        }
    }

    pub async fn send_to(&self, username: &str, msg: Response) -> DeliveryOutcome {
        match self.registry.lookup(username).await {
            Some(handle) => self.send(&handle, msg),
            None => DeliveryOutcome::Unreachable,
        }
    }
}
