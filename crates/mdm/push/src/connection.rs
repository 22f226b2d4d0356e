//! A supervised, self-reconnecting gateway connection for one push topic.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mdm_core::{PushResponse, PushTarget};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::payload::encode_payload;
use crate::{GatewayConnector, GatewaySession, PushError};

/// Lifecycle of a gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    ConnectFailed,
    TransportClosed,
    RetryTimerFired,
    Disconnect,
    /// The supervisor task has exited.
    Stopped,
}

impl ConnectionState {
    /// State after `event`. Events that do not apply leave the state unchanged.
    pub fn next(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (Connecting, Connected) => Open,
            (Connecting, ConnectFailed) => Closed,
            (Open, TransportClosed) => Closed,
            (Closed, RetryTimerFired) => Connecting,
            (Connecting | Open, Disconnect) => Closing,
            (Closing, TransportClosed | ConnectFailed) => Closed,
            (_, Stopped) => Closed,
            (state, _) => state,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Connection timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Idle time before a liveness ping.
    pub keepalive: Duration,
    /// Fixed delay between a close and the next connect attempt.
    pub retry_backoff: Duration,
    /// Per-push deadline, and the longest a push waits for the connection to open.
    pub request_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(60 * 60),
            retry_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

struct Link<S> {
    state: ConnectionState,
    session: Option<Arc<S>>,
}

impl<S> Link<S> {
    fn apply(&mut self, event: ConnectionEvent, topic: &str) {
        let next = self.state.next(event);
        if next != self.state {
            tracing::debug!(topic = %topic, from = %self.state, to = %next, ?event, "push connection state");
        }
        self.state = next;
        if next != ConnectionState::Open {
            self.session = None;
        }
    }
}

#[derive(Default)]
struct Activity {
    retries: AtomicU32,
    last_response: Mutex<Option<Instant>>,
}

impl Activity {
    fn touch(&self) {
        if let Ok(mut last) = self.last_response.lock() {
            *last = Some(Instant::now());
        }
    }

    fn last_response(&self) -> Option<Instant> {
        self.last_response.lock().ok().and_then(|last| *last)
    }
}

/// Handle to a supervised gateway connection.
///
/// The supervisor task connects, keeps the session alive, and reconnects after
/// a fixed backoff until [`Connection::disconnect`] is called or the handle is
/// dropped.
pub struct Connection<C: GatewayConnector> {
    topic: String,
    issued_at: i64,
    settings: ConnectionSettings,
    link: Arc<watch::Sender<Link<C::Session>>>,
    stop: CancellationToken,
    activity: Arc<Activity>,
}

impl<C: GatewayConnector> Connection<C> {
    /// Start connecting. `issued_at` is the rotation marker of the credential
    /// `connector` was built from.
    pub fn spawn(
        topic: impl Into<String>,
        issued_at: i64,
        connector: C,
        settings: ConnectionSettings,
    ) -> Self {
        let topic = topic.into();
        let (link, _) = watch::channel(Link {
            state: ConnectionState::Connecting,
            session: None,
        });
        let link = Arc::new(link);
        let stop = CancellationToken::new();
        let activity = Arc::new(Activity::default());

        tokio::spawn(supervise(
            connector,
            Arc::clone(&link),
            stop.clone(),
            Arc::clone(&activity),
            settings,
            topic.clone(),
        ));

        Self {
            topic,
            issued_at,
            settings,
            link,
            stop,
            activity,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Rotation marker captured at creation.
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn state(&self) -> ConnectionState {
        self.link.borrow().state
    }

    /// Consecutive reconnect attempts since the last successful connect.
    pub fn retries(&self) -> u32 {
        self.activity.retries.load(Ordering::Relaxed)
    }

    /// When the gateway last answered a push or ping.
    pub fn last_response(&self) -> Option<Instant> {
        self.activity.last_response()
    }

    /// Whether [`Connection::disconnect`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Send one push over this connection.
    pub async fn push(&self, target: &PushTarget) -> Result<PushResponse, PushError> {
        let body = encode_payload(&target.push_magic)?;

        if self.stop.is_cancelled() {
            return Err(PushError::ConnectionClosed);
        }

        let session = tokio::time::timeout(self.settings.request_timeout, self.open_session())
            .await
            .map_err(|_| PushError::Timeout)??;

        let result = tokio::select! {
            result = tokio::time::timeout(self.settings.request_timeout, session.send(target, body)) => {
                result.map_err(|_| PushError::Timeout)?
            }
            _ = session.closed() => return Err(PushError::ConnectionClosed),
        };

        match result {
            Ok(response) => {
                self.activity.touch();
                Ok(response)
            }
            // the transport died underneath the request
            Err(PushError::Transport(_)) if self.state() != ConnectionState::Open => {
                Err(PushError::ConnectionClosed)
            }
            Err(e) => Err(e),
        }
    }

    /// Stop the connection. Idempotent.
    pub fn disconnect(&self) {
        if self.stop.is_cancelled() {
            return;
        }
        tracing::info!(topic = %self.topic, "disconnecting push connection");
        self.stop.cancel();
        self.link
            .send_modify(|link| link.apply(ConnectionEvent::Disconnect, &self.topic));
    }

    /// Wait until a disconnected connection has fully closed.
    pub async fn closed(&self) {
        let mut link = self.link.subscribe();
        let _ = link
            .wait_for(|link| link.state == ConnectionState::Closed && self.stop.is_cancelled())
            .await;
    }

    async fn open_session(&self) -> Result<Arc<C::Session>, PushError> {
        let mut link = self.link.subscribe();
        loop {
            {
                let current = link.borrow_and_update();
                match (current.state, &current.session) {
                    (ConnectionState::Open, Some(session)) => return Ok(Arc::clone(session)),
                    (ConnectionState::Closing | ConnectionState::Closed, _) => {
                        return Err(PushError::ConnectionClosed);
                    }
                    _ => {}
                }
            }
            link.changed()
                .await
                .map_err(|_| PushError::ConnectionClosed)?;
        }
    }
}

impl<C: GatewayConnector> Drop for Connection<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn supervise<C: GatewayConnector>(
    connector: C,
    link: Arc<watch::Sender<Link<C::Session>>>,
    stop: CancellationToken,
    activity: Arc<Activity>,
    settings: ConnectionSettings,
    topic: String,
) {
    let transition = |event| link.send_modify(|l| l.apply(event, &topic));

    loop {
        let connected = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            result = connector.connect() => Some(result),
        };
        let Some(connected) = connected else {
            break;
        };

        match connected {
            Ok(session) => {
                let session = Arc::new(session);
                if stop.is_cancelled() {
                    session.close();
                    break;
                }

                activity.retries.store(0, Ordering::Relaxed);
                link.send_modify(|l| {
                    l.apply(ConnectionEvent::Connected, &topic);
                    if l.state == ConnectionState::Open {
                        l.session = Some(Arc::clone(&session));
                    }
                });
                tracing::info!(topic = %topic, "push connection open");

                keep_alive(session.as_ref(), &stop, &activity, &settings, &topic).await;

                if stop.is_cancelled() {
                    session.close();
                    session.closed().await;
                    break;
                }

                tracing::warn!(topic = %topic, "push connection closed by transport");
                transition(ConnectionEvent::TransportClosed);
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "push connection failed");
                transition(ConnectionEvent::ConnectFailed);
            }
        }

        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(settings.retry_backoff) => {}
        }
        if stop.is_cancelled() {
            break;
        }

        let attempt = activity.retries.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(topic = %topic, attempt, "reconnecting push connection");
        transition(ConnectionEvent::RetryTimerFired);
    }

    transition(ConnectionEvent::Stopped);
    tracing::info!(topic = %topic, "push connection closed");
}

/// Ping the gateway whenever it has been quiet for the keepalive interval.
/// Returns when the transport closes or the connection is stopped.
async fn keep_alive<S: GatewaySession>(
    session: &S,
    stop: &CancellationToken,
    activity: &Activity,
    settings: &ConnectionSettings,
    topic: &str,
) {
    let mut last_probe = Instant::now();

    loop {
        let quiet_since = activity
            .last_response()
            .map_or(last_probe, |last| last.max(last_probe));

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = session.closed() => return,
            _ = tokio::time::sleep_until(quiet_since + settings.keepalive) => {}
        }

        // a push may have answered while we slept
        if activity
            .last_response()
            .is_some_and(|last| last + settings.keepalive > Instant::now())
        {
            continue;
        }

        last_probe = Instant::now();
        match tokio::time::timeout(settings.request_timeout, session.ping()).await {
            Ok(Ok(())) => {
                activity.touch();
                tracing::debug!(topic = %topic, "keepalive ping acknowledged");
            }
            Ok(Err(e)) => tracing::warn!(topic = %topic, error = %e, "keepalive ping failed"),
            Err(_) => tracing::warn!(topic = %topic, "keepalive ping timed out"),
        }
    }
}
