//! Delivery pump - per-consumer task draining its subscriber queue

use std::sync::Arc;

use contracts::{ConsumerId, FrameOutput};
use tokio::sync::Notify;
use tracing::{debug, error, instrument};

use crate::metrics::ConsumerMetrics;
use crate::registry::{Next, SessionRegistry};

/// Drain the consumer's queue into `output` until the consumer is
/// unregistered, then flush and close the output.
///
/// Each frame is retained under the lock, emitted with the lock released,
/// and popped afterwards, so emission order is queue order and a slow
/// output only delays this consumer.
#[instrument(
    name = "delivery_pump",
    skip_all,
    fields(consumer = %consumer, output = %output.name())
)]
pub(crate) async fn delivery_pump<O: FrameOutput>(
    registry: SessionRegistry,
    consumer: ConsumerId,
    wake: Arc<Notify>,
    mut output: O,
    metrics: Arc<ConsumerMetrics>,
) {
    debug!("Delivery pump started");

    'pump: loop {
        loop {
            let frame = match registry.next_frame(consumer) {
                Next::Deliver(frame) => frame,
                Next::Idle => break,
                Next::Gone => break 'pump,
            };

            let result = output.emit(consumer, &frame).await;
            registry.complete(consumer, &frame);
            match result {
                Ok(()) => metrics.record_emit(true),
                Err(e) => {
                    metrics.record_emit(false);
                    error!(
                        frame_index = frame.frame_index(),
                        error = %e,
                        "Emit failed"
                    );
                    // Continue with the next frame
                }
            }
        }

        wake.notified().await;
    }

    if let Err(e) = output.flush().await {
        error!(error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = output.close().await {
        error!(error = %e, "Close failed on shutdown");
    }
    metrics.publish();

    debug!("Delivery pump stopped");
}
