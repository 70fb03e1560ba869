use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use wallpad::encode_hex;
use wallpad::KocomCodec;

use super::connection::Connection;
use super::KocomConfig;
use crate::engine::lock;

type FrameCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
type BusStream = Framed<TcpStream, KocomCodec>;

#[derive(Debug, Clone, Copy)]
struct SendSettings {
    max_retries: u32,
    retry_delay: Duration,
    send_interval: Duration,
}

/// Owns the bus connection: a read loop handing complete frames to a
/// callback, and a serialized send queue.
pub struct KocomClient {
    host: String,
    port: u16,
    settings: SendSettings,
    queue_tx: mpsc::UnboundedSender<Vec<u8>>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    status: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl KocomClient {
    pub fn new(config: &KocomConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(false);
        Self {
            host: config.host.clone(),
            port: config.port,
            settings: SendSettings {
                max_retries: config.max_retries.max(1),
                retry_delay: config.retry_delay(),
                send_interval: config.send_interval(),
            },
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            status,
            task: Mutex::new(None),
        }
    }

    /// Spawn the connection task. Returns `false` if it was started before.
    pub fn start(&self, on_frame: impl Fn(Vec<u8>) + Send + Sync + 'static) -> bool {
        let Some(queue) = lock(&self.queue_rx).take() else {
            warn!("Kocom client already started");
            return false;
        };

        debug!("Starting client...");
        let connection = Connection::new(self.host.clone(), self.port);
        let task = tokio::spawn(run(
            connection,
            queue,
            self.status.clone(),
            Arc::new(on_frame),
            self.settings,
        ));
        *lock(&self.task) = Some(task);
        true
    }

    pub async fn stop(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            debug!("Stopping client...");
            task.abort();
            // The task was aborted, a JoinError is expected.
            let _ = task.await;
        }
        self.status.send_replace(false);
    }

    /// Queue a frame for sending.
    pub fn send(&self, frame: Vec<u8>) {
        if self.queue_tx.send(frame).is_err() {
            warn!("Kocom client stopped, dropping frame");
        }
    }

    pub fn status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.status.borrow()
    }
}

async fn run(
    mut connection: Connection,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    status: watch::Sender<bool>,
    on_frame: FrameCallback,
    settings: SendSettings,
) {
    loop {
        let stream = connection.connect().await;
        let mut bus = Framed::new(stream, KocomCodec);
        status.send_replace(true);

        loop {
            tokio::select! {
                frame = bus.next() => match frame {
                    Some(Ok(frame)) => on_frame(frame),
                    Some(Err(e)) => {
                        error!("Failed to receive packet data: {}", e);
                        break;
                    }
                    None => {
                        warn!("Connection to {} closed by peer", connection.address());
                        break;
                    }
                },
                Some(frame) = queue.recv() => {
                    if write_frame(&mut bus, frame, &settings).await.is_err() {
                        break;
                    }
                }
            }
        }

        status.send_replace(false);
        info!("Reconnecting to {}", connection.address());
    }
}

/// Write one frame, retrying up to `max_retries` times.
async fn write_frame(
    bus: &mut BusStream,
    frame: Vec<u8>,
    settings: &SendSettings,
) -> Result<(), wallpad::Error> {
    let mut retries = 0;
    loop {
        debug!("Sending packet: {}, retries: {}", encode_hex(&frame), retries);
        match bus.send(frame.clone()).await {
            Ok(()) => {
                tokio::time::sleep(settings.send_interval).await;
                return Ok(());
            }
            Err(e) => {
                retries += 1;
                error!("Send error: {}. Retry {}/{}", e, retries, settings.max_retries);
                if retries >= settings.max_retries {
                    error!("Max retries reached for packet: {}", encode_hex(&frame));
                    return Err(e);
                }
                tokio::time::sleep(settings.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use wallpad::command::frame;

    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = KocomClient::new(&KocomConfig::new("127.0.0.1", port));
        let mut status = client.status();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        assert!(client.start(move |frame| {
            let _ = frames_tx.send(frame);
        }));
        assert!(!client.start(|_| {}));

        let (mut bridge, _) = listener.accept().await.unwrap();
        status.wait_for(|connected| *connected).await.unwrap();
        assert!(client.is_connected());

        // Two frames split across writes, with noise in front.
        let motion = frame(&hex!("30dc 00 0100 6000 04 0000000000000000"));
        let mut bytes = vec![0x00, 0x01];
        bytes.extend(&motion);
        bytes.extend(&motion);
        bridge.write_all(&bytes[..15]).await.unwrap();
        bridge.write_all(&bytes[15..]).await.unwrap();

        assert_eq!(frames_rx.recv().await, Some(motion.clone()));
        assert_eq!(frames_rx.recv().await, Some(motion));

        let scan = frame(&hex!("30bc 00 3601 0100 3a 0000000000000000"));
        client.send(scan.clone());
        let mut received = vec![0u8; scan.len()];
        bridge.read_exact(&mut received).await.unwrap();
        assert_eq!(received, scan);

        client.stop().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_after_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = KocomClient::new(&KocomConfig::new("127.0.0.1", port));
        let mut status = client.status();
        client.start(|_| {});

        let (bridge, _) = listener.accept().await.unwrap();
        status.wait_for(|connected| *connected).await.unwrap();
        drop(bridge);

        let (_bridge, _) = listener.accept().await.unwrap();
        status.wait_for(|connected| *connected).await.unwrap();

        client.stop().await;
    }
}
