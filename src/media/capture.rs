//! Local media capture collaborator
//!
//! Physical capture and rendering live outside this crate; the negotiation
//! layer only needs per-kind enable switches and an idempotent stop. The
//! [`LocalTracks`] implementation wraps the local WebRTC tracks attached to
//! the peer connection so the produced offer carries the media sections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::{Error, Result};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// Captured-media collaborator driven by the lifecycle monitor and the
/// caller's mute/unmute controls
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Enable or disable the local track of the given kind
    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool);

    /// Stop all tracks and release the capture device; idempotent
    async fn stop_all_tracks(&self);
}

struct TrackHandle {
    track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
}

/// Local audio/video tracks attached to the peer connection
///
/// Sample payloads come from the external capture pipeline; a disabled or
/// stopped track drops them instead of writing, mirroring the
/// `track.enabled` semantics of browser capture.
pub struct LocalTracks {
    audio: Option<TrackHandle>,
    video: Option<TrackHandle>,
    stopped: AtomicBool,
}

impl LocalTracks {
    /// Create tracks according to the room configuration
    pub fn new(enable_audio: bool, enable_video: bool) -> Self {
        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());

        let audio = enable_audio.then(|| TrackHandle {
            track: Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "audio".to_string(),
                stream_id.clone(),
            )),
            enabled: AtomicBool::new(true),
        });

        let video = enable_video.then(|| TrackHandle {
            track: Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "video".to_string(),
                stream_id,
            )),
            enabled: AtomicBool::new(true),
        });

        Self {
            audio,
            video,
            stopped: AtomicBool::new(false),
        }
    }

    /// Add the tracks to a peer connection so the offer includes them
    pub async fn attach(&self, peer_connection: &Arc<RTCPeerConnection>) -> Result<()> {
        for handle in [self.audio.as_ref(), self.video.as_ref()].into_iter().flatten() {
            peer_connection
                .add_track(Arc::clone(&handle.track) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;
        }
        debug!("local tracks attached to peer connection");
        Ok(())
    }

    fn handle(&self, kind: TrackKind) -> Option<&TrackHandle> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    /// Whether the track of the given kind currently forwards samples
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        !self.stopped.load(Ordering::SeqCst)
            && self
                .handle(kind)
                .map(|h| h.enabled.load(Ordering::SeqCst))
                .unwrap_or(false)
    }

    /// Write one encoded sample to the track of the given kind
    ///
    /// Dropped silently when the track is absent, disabled, or stopped.
    pub async fn write_sample(
        &self,
        kind: TrackKind,
        data: Bytes,
        duration: Duration,
    ) -> Result<()> {
        if !self.is_enabled(kind) {
            return Ok(());
        }
        let handle = match self.handle(kind) {
            Some(handle) => handle,
            None => return Ok(()),
        };

        handle
            .track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write sample: {}", e)))
    }
}

#[async_trait]
impl MediaCapture for LocalTracks {
    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        if let Some(handle) = self.handle(kind) {
            handle.enabled.store(enabled, Ordering::SeqCst);
            debug!(?kind, enabled, "local track toggled");
        }
    }

    async fn stop_all_tracks(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("stopping all local tracks");
        }
    }
}
