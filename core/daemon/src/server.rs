//! Local IPC server on a Unix domain socket.
//!
//! Each connection runs two duties over the same stream: answering request
//! lines in order, and pushing a status event whenever the change signal
//! fires. Both live in one task so a response line and an event line can
//! never interleave, and both stop together when the peer goes away.

use fs_err as fs;
use historian_protocol::{RequestError, ServerMessage, MAX_REQUEST_BYTES};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::commands::CommandTable;
use crate::error::{HistorianError, Result};
use crate::historian::SharedState;

pub struct IpcServer {
    listener: UnixListener,
    state: Arc<SharedState>,
    commands: Arc<CommandTable>,
    next_conn_id: AtomicU64,
}

impl IpcServer {
    /// Binds the socket, replacing a stale socket file left by a previous run.
    pub fn bind(socket_path: &Path, state: Arc<SharedState>, commands: CommandTable) -> Result<Self> {
        prepare_socket_dir(socket_path)?;
        remove_socket(socket_path).map_err(|err| {
            HistorianError::io(
                format!("removing existing socket {}", socket_path.display()),
                err,
            )
        })?;

        let listener = UnixListener::bind(socket_path).map_err(|err| {
            HistorianError::io(format!("binding {}", socket_path.display()), err)
        })?;
        info!(path = %socket_path.display(), "IPC socket listening");

        Ok(Self {
            listener,
            state,
            commands: Arc::new(commands),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Accepts connections until the task is dropped.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                    let state = Arc::clone(&self.state);
                    let commands = Arc::clone(&self.commands);
                    tokio::spawn(async move {
                        debug!(conn_id, "IPC client connected");
                        match handle_connection(stream, state, commands).await {
                            Ok(()) => debug!(conn_id, "IPC client disconnected"),
                            Err(err) => debug!(conn_id, error = %err, "IPC connection dropped"),
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "Failed to accept IPC connection");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    state: Arc<SharedState>,
    commands: Arc<CommandTable>,
) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut requests = RequestReader::new(read_half);
    let mut changes = state.subscribe();
    // A fresh client gets the current status right away.
    changes.mark_changed();

    loop {
        tokio::select! {
            incoming = requests.next_line() => {
                let response = match incoming? {
                    None => return Ok(()),
                    Some(IncomingLine::Line(line)) => commands.handle_line(&state, &line),
                    Some(IncomingLine::TooLarge(len)) => {
                        debug!(len, "Discarded oversized IPC request");
                        ServerMessage::request_error(&RequestError::TooLarge(len))
                    }
                };
                write_message(&mut write_half, &response).await?;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let event = ServerMessage::event(state.status());
                write_message(&mut write_half, &event).await?;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IncomingLine {
    Line(Vec<u8>),
    /// A line over `MAX_REQUEST_BYTES`; carries its full length. The bytes
    /// past the limit were discarded while reading.
    TooLarge(usize),
}

/// Newline-delimited request reader that never buffers more than
/// `MAX_REQUEST_BYTES` (plus one read chunk) of a single line.
///
/// `next_line` is cancel-safe: bytes are only consumed from the buffered
/// reader after they have been copied into `line` or counted as discarded.
struct RequestReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    overflow: Option<usize>,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: Vec::new(),
            overflow: None,
        }
    }

    async fn next_line(&mut self) -> io::Result<Option<IncomingLine>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(self.take_pending());
            }

            let (used, complete) = match available.iter().position(|byte| *byte == b'\n') {
                Some(index) => (index + 1, true),
                None => (available.len(), false),
            };

            match self.overflow.as_mut() {
                Some(total) => *total += used,
                None => {
                    self.line.extend_from_slice(&available[..used]);
                    if self.line.len() > MAX_REQUEST_BYTES {
                        self.overflow = Some(self.line.len());
                        self.line = Vec::new();
                    }
                }
            }
            self.reader.consume(used);

            if complete {
                return Ok(self.take_pending());
            }
        }
    }

    fn take_pending(&mut self) -> Option<IncomingLine> {
        if let Some(total) = self.overflow.take() {
            return Some(IncomingLine::TooLarge(total));
        }
        if self.line.is_empty() {
            return None;
        }
        Some(IncomingLine::Line(std::mem::take(&mut self.line)))
    }
}

async fn write_message<W>(writer: &mut W, message: &ServerMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = message.encode_line().map_err(io::Error::other)?;
    writer.write_all(&line).await?;
    writer.flush().await
}

fn prepare_socket_dir(socket_path: &Path) -> Result<()> {
    let Some(parent) = socket_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|err| {
        HistorianError::io(
            format!("creating socket directory {}", parent.display()),
            err,
        )
    })
}

/// Removes the socket file. A missing file is not an error.
pub fn remove_socket(socket_path: &Path) -> io::Result<()> {
    match fs::remove_file(socket_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
