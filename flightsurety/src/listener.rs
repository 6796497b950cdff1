use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures::StreamExt;
use tokio::{sync::mpsc::UnboundedSender, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    error::SubscriptionError,
    event::ChainEvent,
    gateway::Gateway,
};

/// Subscribes to the contract event stream and forwards every event, in
/// ledger order, to the node loop. A dropped stream is resubscribed with
/// capped exponential backoff, resuming from the block after the last
/// delivered event; the process never dies with the subscription.
pub struct RequestListener {
    gateway: Arc<dyn Gateway>,
    next_block: u64,
    backoff: Duration,
    max_backoff: Duration,
}

impl RequestListener {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        from_block: u64,
        backoff: Duration,
        max_backoff: Duration,
    ) -> RequestListener {
        RequestListener {
            gateway,
            next_block: from_block,
            backoff,
            max_backoff,
        }
    }

    /// Runs until the receiving side of `events` goes away.
    pub async fn run(mut self, events: UnboundedSender<ChainEvent>) -> Result<()> {
        let mut delay = self.backoff;
        loop {
            match self.deliver(&events).await {
                Delivery::ReceiverGone => {
                    info!("event consumer gone, listener stopping");
                    return Ok(());
                }
                Delivery::StreamEnded(error) => {
                    warn!(%error, from_block = self.next_block, "event stream lost, resubscribing");
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_backoff);
                }
                Delivery::Delivered => {
                    // The stream produced events before failing; start the
                    // backoff ladder from the bottom again.
                    delay = self.backoff;
                    sleep(delay).await;
                }
            }
        }
    }

    async fn deliver(&mut self, events: &UnboundedSender<ChainEvent>) -> Delivery {
        let mut stream = match self.gateway.subscribe(self.next_block).await {
            Ok(stream) => stream,
            Err(error) => return Delivery::StreamEnded(error),
        };
        let mut delivered = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    debug!(block = event.block, "event observed");
                    self.next_block = event.block + 1;
                    delivered = true;
                    if events.send(event).is_err() {
                        return Delivery::ReceiverGone;
                    }
                }
                Err(error) => return Delivery::StreamEnded(error),
            }
        }
        if delivered {
            Delivery::Delivered
        } else {
            Delivery::StreamEnded(SubscriptionError::StreamEnded)
        }
    }
}

enum Delivery {
    /// The stream ended after delivering at least one event.
    Delivered,
    StreamEnded(SubscriptionError),
    ReceiverGone,
}
