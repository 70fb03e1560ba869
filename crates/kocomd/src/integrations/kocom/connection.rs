use std::time::Duration;

use tokio::net::TcpStream;
use tracing::error;
use tracing::info;

const MAX_BACKOFF_SECS: u64 = 60;

/// Delay before reconnect attempt number `attempt` (1-based).
///
/// The first retry is quick; after that the delay doubles up to a minute.
pub fn backoff(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::from_secs(1);
    }
    let secs = 2u64
        .checked_pow(attempt)
        .map_or(MAX_BACKOFF_SECS, |secs| secs.min(MAX_BACKOFF_SECS));
    Duration::from_secs(secs)
}

/// TCP link to the serial bridge.
#[derive(Debug)]
pub struct Connection {
    host: String,
    port: u16,
    attempts: u32,
}

impl Connection {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            attempts: 0,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect, retrying with backoff until the bridge answers.
    pub async fn connect(&mut self) -> TcpStream {
        loop {
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    if self.attempts > 0 {
                        info!(
                            "Reconnected to {} after {} attempts",
                            self.address(),
                            self.attempts
                        );
                    } else {
                        info!("Connection established to {}", self.address());
                    }
                    self.attempts = 0;
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY: {}", e);
                    }
                    return stream;
                }
                Err(e) => {
                    self.attempts += 1;
                    let delay = backoff(self.attempts);
                    error!(
                        "Connection to {} failed: {}. Attempt {} in {:?}",
                        self.address(),
                        e,
                        self.attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let delays: Vec<u64> = (1..=7).map(|n| backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 4, 8, 16, 32, 60, 60]);
        assert_eq!(backoff(200), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut connection = Connection::new("127.0.0.1", port);
        let (stream, accepted) = tokio::join!(connection.connect(), listener.accept());

        assert!(accepted.is_ok());
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }
}
