use media_router::{Endpoint, MediaRouter, Routers, SessionInfo, Sessions};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::connection::ConnectionId;
use super::error::SignalingError;
use super::message::{SignalRequest, SignalResponse};
use crate::config::SfuConfig;

/// Run a call into the router on the blocking pool. Engine calls may block.
async fn blocking<T, F>(f: F) -> Result<T, SignalingError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

/// Handles the commands of every signaling connection.
///
/// Owns no transport: the caller feeds it each connection's lifecycle events and text
/// messages and writes the returned replies back.
pub struct Signaling {
    routers: Arc<Routers>,
    sessions: Arc<Sessions<ConnectionId>>,
    endpoint: Arc<dyn Endpoint>,
    config: SfuConfig,
}

impl Signaling {
    /// Create a dispatcher with fresh, empty registries.
    pub fn new(endpoint: Arc<dyn Endpoint>, config: SfuConfig) -> Self {
        Self::with_registries(
            endpoint,
            config,
            Arc::new(Routers::new()),
            Arc::new(Sessions::new()),
        )
    }

    /// Create a dispatcher sharing existing registries.
    pub fn with_registries(
        endpoint: Arc<dyn Endpoint>,
        config: SfuConfig,
        routers: Arc<Routers>,
        sessions: Arc<Sessions<ConnectionId>>,
    ) -> Self {
        Self {
            routers,
            sessions,
            endpoint,
            config,
        }
    }

    pub fn routers(&self) -> &Arc<Routers> {
        &self.routers
    }

    pub fn sessions(&self) -> &Arc<Sessions<ConnectionId>> {
        &self.sessions
    }

    /// Register a newly opened connection.
    pub fn connect(&self) -> ConnectionId {
        let connection = ConnectionId::new();
        self.sessions.add(connection);
        debug!(connection = %connection, "Connection opened");
        connection
    }

    /// Forget a closed connection and tear down whatever it was bound to.
    ///
    /// A command still in flight on the connection finds it gone when it completes and
    /// releases what it created itself.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let Some(binding) = self.sessions.remove(&connection) else {
            debug!(connection = %connection, "Unknown connection closed");
            return;
        };

        if binding.is_playing() {
            self.release_subscriber(&binding).await;
        } else if binding.is_publishing() {
            if let Some(router) = self.routers.remove(&binding.stream_id) {
                self.stop_router(router).await;
            }
        }

        info!(
            connection = %connection,
            stream_id = %binding.stream_id,
            "Connection closed"
        );
    }

    /// Handle one text message and produce the text reply.
    ///
    /// Command failures are turned into an error reply rather than returned.
    pub async fn handle_text(
        &self,
        connection: ConnectionId,
        text: &str,
    ) -> Result<String, serde_json::Error> {
        let result = match serde_json::from_str::<SignalRequest>(text) {
            Ok(request) => self.handle(connection, request).await,
            Err(e) => Err(e.into()),
        };

        let response = result.unwrap_or_else(|e| {
            warn!(connection = %connection, error = %e, "Signaling command failed");
            SignalResponse::Error {
                code: e.to_code(),
                message: e.to_string(),
            }
        });

        serde_json::to_string(&response)
    }

    pub async fn handle(
        &self,
        connection: ConnectionId,
        request: SignalRequest,
    ) -> Result<SignalResponse, SignalingError> {
        match request {
            SignalRequest::Publish { stream_id, sdp } => {
                self.publish(connection, stream_id, sdp).await
            }
            SignalRequest::Unpublish { stream_id } => self.unpublish(connection, stream_id).await,
            SignalRequest::Play { stream_id, sdp } => self.play(connection, stream_id, sdp).await,
            SignalRequest::Unplay { stream_id } => self.unplay(connection, stream_id).await,
        }
    }

    async fn publish(
        &self,
        connection: ConnectionId,
        stream_id: String,
        sdp: String,
    ) -> Result<SignalResponse, SignalingError> {
        self.reserve(connection, &stream_id)?;

        let result = self.start_publishing(connection, stream_id, sdp).await;
        if result.is_err() {
            self.sessions.update(&connection, SessionInfo::clear);
        }
        result
    }

    async fn start_publishing(
        &self,
        connection: ConnectionId,
        stream_id: String,
        sdp: String,
    ) -> Result<SignalResponse, SignalingError> {
        let router = Arc::new(MediaRouter::new(
            stream_id.clone(),
            Arc::clone(&self.endpoint),
            self.config.capabilities(),
            self.config.is_origin(),
        ));
        if let Some(url) = &self.config.origin_url {
            router.set_origin_url(url.clone());
        }
        self.routers.add(Arc::clone(&router))?;

        let worker = Arc::clone(&router);
        let created = blocking(move || worker.create_publisher(&sdp))
            .await
            .and_then(|r| r.map_err(SignalingError::from));
        let (publisher, answer) = match created {
            Ok(created) => created,
            Err(e) => {
                self.routers.remove(&stream_id);
                self.stop_router(router).await;
                return Err(e);
            }
        };

        let bound = self
            .sessions
            .update(&connection, |info| info.pending = false);
        if bound.is_none() {
            self.routers.remove(&stream_id);
            self.stop_router(router).await;
            return Err(SignalingError::UnknownConnection(connection));
        }

        info!(
            connection = %connection,
            stream_id = %stream_id,
            publisher_id = %publisher.id(),
            "Publishing"
        );

        Ok(SignalResponse::Publish {
            stream_id,
            sdp: answer,
        })
    }

    async fn unpublish(
        &self,
        connection: ConnectionId,
        stream_id: String,
    ) -> Result<SignalResponse, SignalingError> {
        let binding = self.binding(connection)?;
        if !binding.is_publishing() || binding.stream_id != stream_id {
            return Err(SignalingError::NotBound {
                connection,
                stream_id,
            });
        }

        if let Some(router) = self.routers.remove(&stream_id) {
            self.stop_router(router).await;
        }
        self.sessions.update(&connection, SessionInfo::clear);

        info!(connection = %connection, stream_id = %stream_id, "Unpublished");
        Ok(SignalResponse::Unpublish { stream_id })
    }

    async fn play(
        &self,
        connection: ConnectionId,
        stream_id: String,
        sdp: String,
    ) -> Result<SignalResponse, SignalingError> {
        self.reserve(connection, &stream_id)?;

        let result = self.start_playing(connection, stream_id, sdp).await;
        if result.is_err() {
            self.sessions.update(&connection, SessionInfo::clear);
        }
        result
    }

    async fn start_playing(
        &self,
        connection: ConnectionId,
        stream_id: String,
        sdp: String,
    ) -> Result<SignalResponse, SignalingError> {
        let router = self
            .routers
            .get(&stream_id)
            .ok_or_else(|| SignalingError::StreamNotFound(stream_id.clone()))?;

        let worker = Arc::clone(&router);
        let (subscriber, answer) = blocking(move || worker.create_subscriber(&sdp)).await??;
        let subscriber_id = subscriber.id().to_string();

        let bound = self.sessions.update(&connection, |info| {
            info.subscriber_id = subscriber_id.clone();
            info.pending = false;
        });
        if bound.is_none() {
            let id = subscriber_id.clone();
            blocking(move || router.stop_subscriber(&id)).await?;
            return Err(SignalingError::UnknownConnection(connection));
        }

        info!(
            connection = %connection,
            stream_id = %stream_id,
            subscriber_id = %subscriber_id,
            "Playing"
        );

        Ok(SignalResponse::Play {
            stream_id,
            subscriber_id,
            sdp: answer,
        })
    }

    async fn unplay(
        &self,
        connection: ConnectionId,
        stream_id: String,
    ) -> Result<SignalResponse, SignalingError> {
        let binding = self.binding(connection)?;
        if !binding.is_playing() || binding.stream_id != stream_id {
            return Err(SignalingError::NotBound {
                connection,
                stream_id,
            });
        }

        self.release_subscriber(&binding).await;
        self.sessions.update(&connection, SessionInfo::clear);

        info!(connection = %connection, stream_id = %stream_id, "Stopped playing");
        Ok(SignalResponse::Unplay { stream_id })
    }

    fn binding(&self, connection: ConnectionId) -> Result<SessionInfo, SignalingError> {
        self.sessions
            .get(&connection)
            .ok_or(SignalingError::UnknownConnection(connection))
    }

    /// Claim an idle connection for `stream_id` before any negotiation starts.
    fn reserve(&self, connection: ConnectionId, stream_id: &str) -> Result<(), SignalingError> {
        match self.sessions.try_bind(&connection, stream_id) {
            Some(Ok(())) => Ok(()),
            Some(Err(current)) => Err(SignalingError::ConnectionBusy {
                connection,
                stream_id: current.stream_id,
            }),
            None => Err(SignalingError::UnknownConnection(connection)),
        }
    }

    /// Stop the subscriber a binding points at. A router that is already gone is fine.
    async fn release_subscriber(&self, binding: &SessionInfo) {
        let Some(router) = self.routers.get(&binding.stream_id) else {
            debug!(stream_id = %binding.stream_id, "Router already gone, nothing to release");
            return;
        };

        let subscriber_id = binding.subscriber_id.clone();
        if let Err(e) = blocking(move || router.stop_subscriber(&subscriber_id)).await {
            warn!(stream_id = %binding.stream_id, error = %e, "Failed to stop subscriber");
        }
    }

    async fn stop_router(&self, router: Arc<MediaRouter>) {
        let router_id = router.id().to_string();
        if let Err(e) = blocking(move || router.stop()).await {
            warn!(router_id = %router_id, error = %e, "Failed to stop router");
        }
    }
}
