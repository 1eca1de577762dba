use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbImage;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{DecodeTarget, FrameSample, SamplingSurface},
    models::EncodedFrame,
};

use super::round::DetectionPipeline;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "sampler";

use crate::{log_debug, log_info, log_warn};

pub(crate) struct SamplerContext {
    pub(crate) decode_target: Arc<DecodeTarget>,
    pub(crate) surface: SamplingSurface,
    pub(crate) pipeline: DetectionPipeline,
    pub(crate) interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SamplerExit {
    Cancelled,
    /// The camera stream ended underneath us (device unplugged, track revoked).
    StreamEnded,
}

/// Takes one sample per tick until cancelled. Ticks are not held back by
/// detection latency: every round runs on its own task and rounds may overlap.
pub(crate) async fn sampling_loop(
    ctx: SamplerContext,
    epoch: u64,
    cancel_token: CancellationToken,
) -> SamplerExit {
    // First sample one full interval after start.
    let mut ticker = tokio::time::interval_at(Instant::now() + ctx.interval, ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!(
        "sampling every {}ms at {} (epoch {epoch})",
        ctx.interval.as_millis(),
        ctx.surface.resolution()
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                return SamplerExit::Cancelled;
            }
            _ = ticker.tick() => {
                match ctx.decode_target.sample() {
                    FrameSample::Ready(frame) => dispatch_round(&ctx, epoch, frame),
                    FrameSample::NotReady => log_debug!("no frame on decode target; tick skipped"),
                    FrameSample::StreamEnded => {
                        log_warn!("camera stream ended while live");
                        return SamplerExit::StreamEnded;
                    }
                }
            }
        }
    }
}

fn dispatch_round(ctx: &SamplerContext, epoch: u64, frame: RgbImage) {
    let ticket = ctx.pipeline.issue_ticket(epoch);
    let surface = ctx.surface;
    let pipeline = ctx.pipeline.clone();

    tokio::spawn(async move {
        let encode_start = Instant::now();
        let encoded = match encode_frame(surface, frame).await {
            Ok(encoded) => encoded,
            Err(err) => {
                log_warn!("frame #{} dropped: {err:#}", ticket.seq());
                return;
            }
        };
        log_debug!(
            "frame #{}: {} bytes, encode_time={}ms",
            ticket.seq(),
            encoded.jpeg.len(),
            encode_start.elapsed().as_millis()
        );

        pipeline.run(encoded, ticket).await;
    });
}

async fn encode_frame(surface: SamplingSurface, frame: RgbImage) -> Result<EncodedFrame> {
    tokio::task::spawn_blocking(move || surface.encode(&frame))
        .await
        .context("frame encode worker join failed")?
}
