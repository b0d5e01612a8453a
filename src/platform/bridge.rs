use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::geo::Coordinate;

use super::{
    Accuracy, CameraFault, CameraOptions, CameraService, CapturedImage, LocationService,
    PermissionStatus, PositionError,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequestKind {
    LocationPermission,
    CurrentPosition { accuracy: Accuracy },
    CameraPermission,
    TakePicture { options: CameraOptions },
}

/// A platform call waiting for the webview to answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub id: Uuid,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeReply {
    Permission { granted: bool },
    Position { latitude: f64, longitude: f64 },
    PositionTimeout,
    Picture { uri: PathBuf },
    Failure { message: String },
}

/// Delivers requests to whoever can answer them (the webview in the app).
pub trait BridgeSink: Send + Sync {
    fn dispatch(&self, request: &BridgeRequest) -> Result<()>;
}

#[derive(Debug)]
enum CallFailure {
    NoReply,
    Dispatch(String),
    Dropped,
}

pub struct PlatformBridge {
    sink: Arc<dyn BridgeSink>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<BridgeReply>>>,
    reply_timeout: Duration,
}

impl PlatformBridge {
    pub fn new(sink: Arc<dyn BridgeSink>, reply_timeout: Duration) -> Self {
        Self {
            sink,
            pending: Mutex::new(HashMap::new()),
            reply_timeout,
        }
    }

    /// Completes the request `id` with the webview's answer.
    pub fn resolve(&self, id: Uuid, reply: BridgeReply) -> Result<()> {
        let sender = self
            .pending()
            .remove(&id)
            .ok_or_else(|| anyhow!("no pending platform request {id}"))?;
        sender
            .send(reply)
            .map_err(|_| anyhow!("platform request {id} was abandoned"))
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, oneshot::Sender<BridgeReply>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn call(&self, kind: RequestKind) -> Result<BridgeReply, CallFailure> {
        let request = BridgeRequest {
            id: Uuid::new_v4(),
            kind,
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending().insert(request.id, reply_tx);
        let _pending = PendingEntry {
            bridge: self,
            id: request.id,
        };

        if let Err(err) = self.sink.dispatch(&request) {
            log_error!("failed to dispatch platform request {}: {err:#}", request.id);
            return Err(CallFailure::Dispatch(err.to_string()));
        }

        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CallFailure::Dropped),
            Err(_) => {
                log_warn!(
                    "platform request {} ({:?}) got no reply within {:?}",
                    request.id,
                    request.kind,
                    self.reply_timeout
                );
                Err(CallFailure::NoReply)
            }
        }
    }

    async fn permission(&self, kind: RequestKind) -> PermissionStatus {
        match self.call(kind).await {
            Ok(BridgeReply::Permission { granted: true }) => PermissionStatus::Granted,
            Ok(BridgeReply::Permission { granted: false }) => PermissionStatus::Denied,
            Ok(other) => {
                log_warn!("unexpected reply to permission request: {other:?}");
                PermissionStatus::Denied
            }
            Err(failure) => {
                log_warn!("permission request failed: {failure:?}");
                PermissionStatus::Denied
            }
        }
    }
}

/// Forgets a request however its call ends, including when the caller's
/// future is dropped mid-wait.
struct PendingEntry<'a> {
    bridge: &'a PlatformBridge,
    id: Uuid,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.bridge.pending().remove(&self.id);
    }
}

#[async_trait]
impl LocationService for PlatformBridge {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission(RequestKind::LocationPermission).await
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<Coordinate, PositionError> {
        match self.call(RequestKind::CurrentPosition { accuracy }).await {
            Ok(BridgeReply::Position {
                latitude,
                longitude,
            }) => Coordinate::new(latitude, longitude)
                .map_err(|err| PositionError::Unavailable(err.to_string())),
            Ok(BridgeReply::PositionTimeout) | Err(CallFailure::NoReply) => {
                Err(PositionError::Timeout)
            }
            Ok(BridgeReply::Failure { message }) => Err(PositionError::Unavailable(message)),
            Ok(other) => Err(PositionError::Unavailable(format!(
                "unexpected reply to position request: {other:?}"
            ))),
            Err(CallFailure::Dispatch(message)) => Err(PositionError::Unavailable(message)),
            Err(CallFailure::Dropped) => Err(PositionError::Unavailable(
                "position request dropped".into(),
            )),
        }
    }
}

#[async_trait]
impl CameraService for PlatformBridge {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission(RequestKind::CameraPermission).await
    }

    async fn take_picture(&self, options: CameraOptions) -> Result<CapturedImage, CameraFault> {
        match self.call(RequestKind::TakePicture { options }).await {
            Ok(BridgeReply::Picture { uri }) => {
                log_info!("camera returned {}", uri.display());
                Ok(CapturedImage { uri })
            }
            Ok(BridgeReply::Failure { message }) => Err(CameraFault(message)),
            Ok(other) => Err(CameraFault(format!(
                "unexpected reply to picture request: {other:?}"
            ))),
            Err(CallFailure::NoReply) => Err(CameraFault("camera did not respond".into())),
            Err(CallFailure::Dispatch(message)) => Err(CameraFault(message)),
            Err(CallFailure::Dropped) => Err(CameraFault("picture request dropped".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::CameraFacing;
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<BridgeRequest>);

    impl BridgeSink for ChannelSink {
        fn dispatch(&self, request: &BridgeRequest) -> Result<()> {
            self.0
                .send(request.clone())
                .map_err(|_| anyhow!("webview gone"))
        }
    }

    struct BrokenSink;

    impl BridgeSink for BrokenSink {
        fn dispatch(&self, _request: &BridgeRequest) -> Result<()> {
            Err(anyhow!("no webview attached"))
        }
    }

    fn bridge() -> (Arc<PlatformBridge>, mpsc::UnboundedReceiver<BridgeRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = PlatformBridge::new(Arc::new(ChannelSink(tx)), Duration::from_secs(30));
        (Arc::new(bridge), rx)
    }

    /// Answers every request with `answer(kind)`.
    fn respond_with(
        bridge: Arc<PlatformBridge>,
        mut rx: mpsc::UnboundedReceiver<BridgeRequest>,
        answer: fn(&RequestKind) -> BridgeReply,
    ) {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                bridge.resolve(request.id, answer(&request.kind)).unwrap();
            }
        });
    }

    #[tokio::test]
    async fn position_reply_becomes_coordinate() {
        let (bridge, rx) = bridge();
        respond_with(bridge.clone(), rx, |kind| match kind {
            RequestKind::CurrentPosition { accuracy } => {
                assert_eq!(*accuracy, Accuracy::High);
                BridgeReply::Position {
                    latitude: -7.45,
                    longitude: 110.22,
                }
            }
            _ => BridgeReply::Permission { granted: true },
        });

        let coord = bridge.current_position(Accuracy::High).await.unwrap();
        assert_eq!(coord.latitude(), -7.45);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn out_of_range_position_is_unavailable() {
        let (bridge, rx) = bridge();
        respond_with(bridge.clone(), rx, |_| BridgeReply::Position {
            latitude: 200.0,
            longitude: 0.0,
        });

        let err = bridge.current_position(Accuracy::High).await.unwrap_err();
        assert!(matches!(err, PositionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn permission_replies_map_to_status() {
        let (bridge, rx) = bridge();
        respond_with(bridge.clone(), rx, |kind| match kind {
            RequestKind::LocationPermission => BridgeReply::Permission { granted: true },
            _ => BridgeReply::Permission { granted: false },
        });

        assert_eq!(
            LocationService::request_permission(bridge.as_ref()).await,
            PermissionStatus::Granted
        );
        assert_eq!(
            CameraService::request_permission(bridge.as_ref()).await,
            PermissionStatus::Denied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_webview_times_out() {
        let (bridge, _rx) = bridge();

        let err = bridge.current_position(Accuracy::High).await.unwrap_err();
        assert_eq!(err, PositionError::Timeout);
        assert_eq!(bridge.pending_count(), 0);

        assert_eq!(
            LocationService::request_permission(bridge.as_ref()).await,
            PermissionStatus::Denied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_calls_leave_nothing_pending() {
        let (bridge, mut rx) = bridge();

        for _ in 0..5 {
            let call = bridge.current_position(Accuracy::High);
            assert!(tokio::time::timeout(Duration::from_millis(1), call)
                .await
                .is_err());
        }
        assert_eq!(bridge.pending_count(), 0);

        // A late answer to an abandoned request is refused, not delivered.
        let late = rx.recv().await.unwrap();
        assert!(bridge.resolve(late.id, BridgeReply::PositionTimeout).is_err());
    }

    #[tokio::test]
    async fn dispatch_failure_is_unavailable() {
        let bridge = PlatformBridge::new(Arc::new(BrokenSink), Duration::from_secs(1));

        let err = bridge.current_position(Accuracy::High).await.unwrap_err();
        assert!(matches!(err, PositionError::Unavailable(msg) if msg.contains("no webview")));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn picture_reply_carries_uri_and_options() {
        let (bridge, rx) = bridge();
        respond_with(bridge.clone(), rx, |kind| match kind {
            RequestKind::TakePicture { options } => {
                assert_eq!(options.facing, CameraFacing::Front);
                BridgeReply::Picture {
                    uri: PathBuf::from("/tmp/shot.jpg"),
                }
            }
            _ => BridgeReply::Failure {
                message: "wrong request".into(),
            },
        });

        let image = bridge
            .take_picture(CameraOptions {
                quality: 0.7,
                facing: CameraFacing::Front,
            })
            .await
            .unwrap();
        assert_eq!(image.uri, PathBuf::from("/tmp/shot.jpg"));
    }

    #[test]
    fn resolving_unknown_request_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bridge = PlatformBridge::new(Arc::new(ChannelSink(tx)), Duration::from_secs(1));
        assert!(bridge
            .resolve(Uuid::new_v4(), BridgeReply::PositionTimeout)
            .is_err());
    }

    #[test]
    fn replies_deserialize_from_webview_json() {
        let reply: BridgeReply =
            serde_json::from_str(r#"{"type":"position","latitude":1.5,"longitude":2.5}"#).unwrap();
        assert!(matches!(reply, BridgeReply::Position { latitude, .. } if latitude == 1.5));

        let reply: BridgeReply = serde_json::from_str(r#"{"type":"positionTimeout"}"#).unwrap();
        assert!(matches!(reply, BridgeReply::PositionTimeout));
    }
}
