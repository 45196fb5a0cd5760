//! Line-delimited JSON transport over a pair of byte pipes

use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Writes one JSON document per line
pub struct LineWriter {
    inner: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl LineWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: BufWriter::new(Box::new(writer)),
        }
    }

    pub async fn send(&mut self, value: &Value) -> io::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        self.inner.flush().await
    }
}

/// Read JSON lines from `reader` on a background task
///
/// Blank and unparseable lines are skipped. The returned channel closes when
/// the reader hits EOF or an I/O error.
pub fn spawn_reader<R>(reader: R) -> (mpsc::UnboundedReceiver<Value>, JoinHandle<()>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(line) {
                        Ok(value) => {
                            if tx.send(value).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Skipping unparseable driver line: {} ({})", line, e),
                    }
                }
                Ok(None) => {
                    debug!("driver output closed");
                    break;
                }
                Err(e) => {
                    warn!("Driver read error: {}", e);
                    break;
                }
            }
        }
    });

    (rx, handle)
}
