use super::*;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Connection = Arc<tokio::sync::Mutex<Framed<TcpStream, LengthDelimitedCodec>>>;

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Sends each message as a length-delimited frame over TCP.
/// One connection per destination is cached and requests on it are serialized.
pub struct TcpTransport {
    cache: moka::sync::Cache<Endpoint, Connection>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        let builder = moka::sync::Cache::builder()
            .initial_capacity(3)
            .time_to_idle(Duration::from_secs(60));
        Self {
            cache: builder.build(),
        }
    }

    async fn connect(&self, dest: &Endpoint) -> Result<Connection> {
        if let Some(conn) = self.cache.get(dest) {
            return Ok(conn);
        }
        let stream = TcpStream::connect((dest.host.as_str(), dest.port))
            .await
            .map_err(|e| {
                debug!("failed to connect to {dest}: {e}");
                Error::Unreachable(dest.clone())
            })?;
        stream.set_nodelay(true)?;
        let conn = Arc::new(tokio::sync::Mutex::new(Framed::new(stream, frame_codec())));
        self.cache.insert(dest.clone(), conn.clone());
        Ok(conn)
    }

    async fn round_trip(&self, dest: &Endpoint, message: Bytes) -> Result<Bytes> {
        let conn = self.connect(dest).await?;
        let mut framed = conn.lock().await;
        framed.send(message).await.map_err(|e| {
            debug!("failed to send to {dest}: {e}");
            Error::Unreachable(dest.clone())
        })?;
        match framed.next().await {
            Some(Ok(frame)) => Ok(frame.freeze()),
            Some(Err(e)) => {
                debug!("failed to receive from {dest}: {e}");
                bail!(Error::Unreachable(dest.clone()))
            }
            // The receiver closed the connection.
            None => bail!(Error::Unreachable(dest.clone())),
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn request(&self, dest: &Endpoint, message: Bytes, timeout: Duration) -> Result<Bytes> {
        match tokio::time::timeout(timeout, self.round_trip(dest, message)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => {
                self.cache.invalidate(dest);
                Err(e)
            }
            Err(_) => {
                // The response may still arrive on this connection. Don't reuse it.
                self.cache.invalidate(dest);
                bail!(Error::Timeout(format!(
                    "no response from {dest} in {timeout:?}"
                )))
            }
        }
    }
}

/// Accept connections and answer the requests with `node` until the task is dropped.
/// A connection is closed when the node drops a request.
pub async fn serve(node: Arc<RaftNode>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true).ok();
        let node = node.clone();
        tokio::spawn(async move {
            let mut framed = Framed::new(stream, frame_codec());
            while let Some(frame) = framed.next().await {
                let frame = match frame {
                    Ok(frame) => frame.freeze(),
                    Err(e) => {
                        debug!("connection from {peer} is broken: {e}");
                        break;
                    }
                };
                let Some(resp) = node.handle(frame).await else {
                    debug!("close connection from {peer}");
                    break;
                };
                if let Err(e) = framed.send(resp).await {
                    debug!("failed to respond to {peer}: {e}");
                    break;
                }
            }
        });
    }
}
