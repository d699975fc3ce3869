use anyhow::{Result, bail};
use media_router::loopback::{LoopbackEngine, OfferBuilder};
use sfu_prototype::{SfuConfig, Signaling, SignalRequest, SignalResponse};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const STREAM_ID: &str = "live";

/// Number of viewers joining the demo stream.
const VIEWERS: usize = 2;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SfuConfig::from_env()?;
    info!(
        public_ip = %config.public_ip,
        rtc_port = config.rtc_port,
        origin = config.is_origin(),
        "Starting SFU demo"
    );

    let engine = Arc::new(LoopbackEngine::with_candidates(config.candidates()));
    let signaling = Signaling::new(engine.clone(), config);

    let publisher = signaling.connect();
    let response = signaling
        .handle(
            publisher,
            SignalRequest::Publish {
                stream_id: STREAM_ID.to_string(),
                sdp: OfferBuilder::publish(STREAM_ID).audio().video().build(),
            },
        )
        .await?;
    let SignalResponse::Publish { sdp, .. } = response else {
        bail!("unexpected publish reply: {response:?}");
    };
    info!(stream_id = STREAM_ID, "Publish answer:\n{sdp}");

    let mut viewers = Vec::with_capacity(VIEWERS);
    for _ in 0..VIEWERS {
        let viewer = signaling.connect();
        let response = signaling
            .handle(
                viewer,
                SignalRequest::Play {
                    stream_id: STREAM_ID.to_string(),
                    sdp: OfferBuilder::receive().audio().video().build(),
                },
            )
            .await?;
        let SignalResponse::Play { subscriber_id, .. } = response else {
            bail!("unexpected play reply: {response:?}");
        };
        info!(connection = %viewer, subscriber_id = %subscriber_id, "Viewer joined");
        viewers.push(viewer);
    }

    if let Some(router) = signaling.routers().get(STREAM_ID) {
        info!(
            stream_id = STREAM_ID,
            subscribers = router.subscriber_count(),
            "Router state"
        );
    }

    // The first viewer leaves politely, the rest just drop their connection.
    let mut viewers = viewers.into_iter();
    if let Some(viewer) = viewers.next() {
        signaling
            .handle(
                viewer,
                SignalRequest::Unplay {
                    stream_id: STREAM_ID.to_string(),
                },
            )
            .await?;
        signaling.disconnect(viewer).await;
    }
    for viewer in viewers {
        signaling.disconnect(viewer).await;
    }

    signaling.disconnect(publisher).await;
    let released = engine.forget_stopped();
    info!(
        routers = signaling.routers().len(),
        sessions = signaling.sessions().len(),
        transports_released = released,
        "Demo finished"
    );

    Ok(())
}
