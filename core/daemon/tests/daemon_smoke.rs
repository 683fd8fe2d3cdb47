use historian_protocol::{Request, ResponseData, ServerMessage, CMD_SET, CMD_STATUS};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_config(dir: &Path) -> (PathBuf, PathBuf) {
    let socket = dir.join("historian.sock");
    let config = dir.join("config.toml");
    let contents = format!(
        "unix_socket = \"{}\"\nhistory_directory = \"{}\"\nbeatsaber_websocket_uri = \"ws://127.0.0.1:1/socket\"\nreconnect_delay_ms = 100\n",
        socket.display(),
        dir.join("history").display()
    );
    std::fs::write(&config, contents).expect("write config");
    (config, socket)
}

fn spawn_daemon(config: &Path, home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_historian-daemon"))
        .arg("--config")
        .arg(config)
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn historian-daemon")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() && UnixStream::connect(path).is_ok() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn read_response(reader: &mut BufReader<UnixStream>) -> ServerMessage {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).expect("Failed to read from daemon");
        assert!(n > 0, "daemon closed the connection");
        let message: ServerMessage =
            serde_json::from_str(&line).expect("Failed to parse daemon message");
        if message.is_response() {
            return message;
        }
    }
}

fn send_request(stream: &mut UnixStream, request: &Request) {
    let line = request.encode_line().expect("Failed to encode request");
    stream.write_all(&line).expect("Failed to write request");
    stream.flush().ok();
}

#[test]
fn daemon_serves_status_and_cleans_up_on_interrupt() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let (config, socket) = write_config(home.path());
    let child = spawn_daemon(&config, home.path());
    let pid = child.id();
    let mut guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(5));

    let mut stream = UnixStream::connect(&socket).expect("Failed to connect to daemon socket");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    send_request(&mut stream, &Request::new(CMD_STATUS));
    let ServerMessage::Response {
        success: true,
        data: ResponseData::Status(status),
    } = read_response(&mut reader)
    else {
        panic!("status response was not ok");
    };
    assert!(!status.connection.connected_to_beatsaber);
    assert!(!status.connection.in_game);

    send_request(
        &mut stream,
        &Request::new(CMD_SET).with_param("current_player", serde_json::json!("alice")),
    );
    let ServerMessage::Response {
        success: true,
        data: ResponseData::Status(status),
    } = read_response(&mut reader)
    else {
        panic!("set response was not ok");
    };
    assert_eq!(status.connection.current_player.as_deref(), Some("alice"));

    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    assert_eq!(rc, 0, "failed to signal daemon");

    let deadline = Instant::now() + Duration::from_secs(5);
    let exit_status = loop {
        if let Some(status) = guard.child.try_wait().expect("poll daemon") {
            break status;
        }
        assert!(Instant::now() < deadline, "daemon did not exit after SIGINT");
        sleep(Duration::from_millis(25));
    };
    assert!(exit_status.success(), "daemon exited with {:?}", exit_status);
    assert!(!socket.exists(), "socket file was not removed");
}
