#![allow(dead_code)]

use futures::SinkExt;
use historian_daemon::{
    score_keeper_factory, CommandTable, Historian, HistoryWriter, IpcServer, SharedState,
};
use historian_protocol::{ServerMessage, StatusPayload};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UnixStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestDaemon {
    pub state: Arc<SharedState>,
    pub socket: PathBuf,
    pub history: PathBuf,
    server: JoinHandle<()>,
    _dir: TempDir,
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn new_state(history: &Path) -> Arc<SharedState> {
    Arc::new(SharedState::new(Historian::new(
        HistoryWriter::new(history),
        score_keeper_factory(),
    )))
}

pub fn start_daemon() -> TestDaemon {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("run").join("historian.sock");
    let history = dir.path().join("history");
    let state = new_state(&history);

    let server = IpcServer::bind(
        &socket,
        Arc::clone(&state),
        CommandTable::standard().expect("command table"),
    )
    .expect("bind IPC server");
    let server = tokio::spawn(server.serve());

    TestDaemon {
        state,
        socket,
        history,
        server,
        _dir: dir,
    }
}

pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(socket: &Path) -> Self {
        let stream = UnixStream::connect(socket)
            .await
            .expect("connect to IPC socket");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write request");
        self.writer.flush().await.expect("flush request");
    }

    pub async fn send(&mut self, request: Value) {
        let mut line = serde_json::to_vec(&request).expect("serialize request");
        line.push(b'\n');
        self.send_raw(&line).await;
    }

    pub async fn next_message(&mut self) -> ServerMessage {
        let line = tokio::time::timeout(IO_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for IPC message")
            .expect("read IPC message")
            .expect("IPC connection closed");
        serde_json::from_str(&line).expect("parse IPC message")
    }

    /// Next response, skipping any pushed events.
    pub async fn next_response(&mut self) -> ServerMessage {
        loop {
            let message = self.next_message().await;
            if message.is_response() {
                return message;
            }
        }
    }

    pub async fn next_event(&mut self) -> StatusPayload {
        loop {
            if let ServerMessage::Event { status } = self.next_message().await {
                return status;
            }
        }
    }

    pub async fn request(&mut self, request: Value) -> ServerMessage {
        self.send(request).await;
        self.next_response().await
    }
}

pub async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", description);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A stand-in for the Beat Saber status plugin.
pub struct FakeBeatSaber {
    listener: TcpListener,
    pub uri: String,
}

impl FakeBeatSaber {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake Beat Saber");
        let addr = listener.local_addr().expect("local addr");
        Self {
            listener,
            uri: format!("ws://{}/socket", addr),
        }
    }

    pub async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (tcp, _) = tokio::time::timeout(IO_TIMEOUT, self.listener.accept())
            .await
            .expect("timed out waiting for connector")
            .expect("accept connector");
        tokio_tungstenite::accept_async(tcp)
            .await
            .expect("websocket handshake")
    }

    /// Accepts one TCP connection and drops it before the handshake.
    pub async fn reject_once(&self) {
        let (tcp, _) = tokio::time::timeout(IO_TIMEOUT, self.listener.accept())
            .await
            .expect("timed out waiting for connector")
            .expect("accept connector");
        drop(tcp);
    }
}

pub async fn send_event(ws: &mut WebSocketStream<TcpStream>, event: Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .expect("send telemetry event");
}

pub fn song_start(author: &str, song: &str, difficulty: &str) -> Value {
    serde_json::json!({
        "event": "songStart",
        "time": 1_700_000_000_000u64,
        "status": {
            "beatmap": {
                "songAuthorName": author,
                "songName": song,
                "difficulty": difficulty,
            },
            "performance": { "score": 0, "combo": 0 },
        }
    })
}

pub fn history_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(players) = std::fs::read_dir(root) else {
        return files;
    };
    for player in players.flatten() {
        if let Ok(entries) = std::fs::read_dir(player.path()) {
            files.extend(entries.flatten().map(|entry| entry.path()));
        }
    }
    files.sort();
    files
}

pub fn read_history_file(path: &Path) -> Value {
    use std::io::Read;
    let file = std::fs::File::open(path).expect("open history file");
    let mut text = String::new();
    flate2::read::GzDecoder::new(file)
        .read_to_string(&mut text)
        .expect("gunzip history file");
    assert!(text.ends_with('\n'), "history file must end with a newline");
    serde_json::from_str(&text).expect("parse history JSON")
}
