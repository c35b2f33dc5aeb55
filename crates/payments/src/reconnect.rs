//! Backoff schedule for re-establishing the payments socket.
//!
//! After a session ends the subscription waits before dialing again, so
//! a server that refuses the namespace is not hammered. The wait starts
//! at one second and doubles per failed attempt up to thirty seconds.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{PaymentsSocketClient, SocketConnection};

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before the first redial.
    pub initial_delay: Duration,
    /// Upper bound on the wait between attempts.
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Stateful position in a [`ReconnectConfig`] schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    upcoming: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let upcoming = config.initial_delay;
        Self {
            config,
            upcoming,
            attempts: 0,
        }
    }

    /// Wait to apply before the next attempt, advancing the schedule.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.upcoming;
        let grown = self.upcoming.as_secs_f64() * self.config.multiplier;
        self.upcoming = Duration::from_secs_f64(grown).min(self.config.max_delay);
        self.attempts += 1;
        wait
    }

    /// Number of waits handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Redial until a connection is made or `cancel` fires.
///
/// Every attempt, including the first, is preceded by its backoff wait.
pub async fn reconnect_loop(
    client: &PaymentsSocketClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<SocketConnection> {
    let mut backoff = Backoff::new(config.clone());

    loop {
        let wait = backoff.next_wait();
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(wait) => {}
        }

        let attempt = backoff.attempts();
        tracing::info!(
            url = client.websocket_url(),
            attempt,
            waited_ms = wait.as_millis() as u64,
            "Redialing payments socket",
        );

        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = client.connect() => result,
        };
        match result {
            Ok(conn) => {
                tracing::info!(attempt, "Payments socket reconnected");
                return Some(conn);
            }
            Err(e) => tracing::warn!(attempt, error = %e, "Redial failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn schedule_doubles_and_caps() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        let waits: Vec<u64> = (0..7).map(|_| backoff.next_wait().as_secs()).collect();

        assert_eq!(waits, [1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff.attempts(), 7);
    }

    #[test]
    fn custom_cap_is_respected() {
        let mut backoff = Backoff::new(ReconnectConfig {
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(500),
            multiplier: 3.0,
        });

        assert_eq!(backoff.next_wait(), Duration::from_millis(300));
        assert_eq!(backoff.next_wait(), Duration::from_millis(500));
        assert_eq!(backoff.next_wait(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn cancelled_token_returns_none() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = PaymentsSocketClient::new("ws://localhost:9", "key");
        let result = reconnect_loop(&client, &ReconnectConfig::default(), &cancel).await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn waits_before_first_redial() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let accepted_at = Instant::now();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            (accepted_at, ws)
        });

        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(200),
            ..ReconnectConfig::default()
        };
        let client = PaymentsSocketClient::new(format!("ws://{addr}"), "key");
        let started = Instant::now();

        let conn = reconnect_loop(&client, &config, &CancellationToken::new()).await;

        assert!(conn.is_some());
        let (accepted_at, _ws) = server.await.unwrap();
        assert!(accepted_at.duration_since(started) >= Duration::from_millis(200));
    }
}
