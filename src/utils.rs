use std::io::Write;
use std::path::Path;

use anyhow::Result;
use log::{error, info};
use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        if let Err(e) = fs::create_dir_all(path).await {
            error!("Failed to create directory at {:?}: {}", path, e);
            return Err(e.into());
        }
        info!("Created directory at: {:?}", path);
    }
    Ok(())
}

/// Background writer printing every item sent to it as one JSON line
pub struct JsonLinesWriter {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl JsonLinesWriter {
    /// Spawns the writer task and returns the sending side.
    pub fn spawn<T, W>(mut out: W) -> (UnboundedSender<T>, Self)
    where
        T: Serialize + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let stop = CancellationToken::new();
        let stop_for_task = stop.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    item = rx.recv() => match item {
                        Some(item) => write_json_line(&mut out, &item),
                        None => break,
                    },
                    _ = stop_for_task.cancelled() => {
                        while let Ok(item) = rx.try_recv() {
                            write_json_line(&mut out, &item);
                        }
                        break;
                    }
                }
            }
            let _ = out.flush();
        });
        (tx, Self { stop, task })
    }

    /// Writes out everything sent so far and stops the task. Senders that are
    /// still alive afterwards are ignored.
    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            error!("JSON output task failed: {}", e);
        }
    }
}

fn write_json_line<T: Serialize, W: Write>(out: &mut W, item: &T) {
    let result = serde_json::to_writer(&mut *out, item)
        .map_err(anyhow::Error::from)
        .and_then(|()| writeln!(out).map_err(anyhow::Error::from));
    if let Err(e) = result {
        error!("Failed to write JSON output: {}", e);
    }
}
