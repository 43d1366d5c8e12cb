//! End-to-end daemon lifecycle over the Unix socket.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use assured::config::Config;
use assured::core::Token;
use assured::service::ipc::{ChannelClient, Request, Response, ResponsePayload, send_request};
use assured::service::run_daemon;

struct DaemonFixture {
    socket: PathBuf,
    handle: Option<std::thread::JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl DaemonFixture {
    fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("daemon.sock");
        let config = Config {
            db_path: Some(dir.path().join("assured.db")),
            socket_path: Some(socket.clone()),
            ..Config::default()
        };

        let handle = std::thread::spawn(move || {
            if let Err(e) = run_daemon(config) {
                eprintln!("daemon failed: {e}");
            }
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        while !socket.exists() {
            assert!(Instant::now() < deadline, "daemon socket never appeared");
            std::thread::sleep(Duration::from_millis(20));
        }

        Self {
            socket,
            handle: Some(handle),
            _dir: dir,
        }
    }

    fn request(&self, request: &Request) -> Response {
        send_request(&self.socket, request).expect("send request")
    }

    fn expect_ok(&self, request: &Request) -> ResponsePayload {
        match self.request(request) {
            Response::Ok { ok } => ok,
            Response::Err { err } => panic!("request failed: {} {}", err.code, err.message),
        }
    }

    fn register(&self, username: &str) -> Token {
        match self.expect_ok(&Request::RegisterUser {
            username: username.to_string(),
            email: format!("{username}@example.org"),
        }) {
            ResponsePayload::User(user) => user.token,
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    fn shutdown(mut self) {
        let _ = self.request(&Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle.join().expect("daemon thread");
        }
    }
}

#[test]
fn daemon_serves_requests_and_shuts_down() {
    let daemon = DaemonFixture::start();

    match daemon.expect_ok(&Request::Ping) {
        ResponsePayload::Pong { pong } => assert!(pong),
        other => panic!("unexpected payload: {other:?}"),
    }
    match daemon.expect_ok(&Request::Info) {
        ResponsePayload::Info(info) => assert_eq!(info.protocol_version, 1),
        other => panic!("unexpected payload: {other:?}"),
    }

    let token = daemon.register("alice");
    let case_id = match daemon.expect_ok(&Request::CreateCase {
        token: token.clone(),
        name: "wire case".into(),
        description: "created over the socket".into(),
    }) {
        ResponsePayload::Case(case) => case.id,
        other => panic!("unexpected payload: {other:?}"),
    };

    match daemon.expect_ok(&Request::GetCase {
        token: token.clone(),
        case_id,
    }) {
        ResponsePayload::Case(case) => assert_eq!(case.name, "wire case"),
        other => panic!("unexpected payload: {other:?}"),
    }

    daemon.shutdown();
}

#[test]
fn bad_tokens_fail_and_connections_survive_parse_errors() {
    let daemon = DaemonFixture::start();

    let bogus = Token::parse("bogus").expect("token");
    match daemon.request(&Request::ListCases {
        token: bogus,
        filter: Default::default(),
    }) {
        Response::Err { err } => assert_eq!(err.code, "unauthenticated"),
        other => panic!("expected error, got {other:?}"),
    }

    daemon.shutdown();
}

#[test]
fn realtime_channel_carries_presence_and_chat() {
    let daemon = DaemonFixture::start();

    let alice = daemon.register("alice");
    let bob = daemon.register("bob");
    let case_id = match daemon.expect_ok(&Request::CreateCase {
        token: alice.clone(),
        name: "live".into(),
        description: String::new(),
    }) {
        ResponsePayload::Case(case) => case.id,
        other => panic!("unexpected payload: {other:?}"),
    };
    daemon.expect_ok(&Request::ShareWith {
        token: alice.clone(),
        case_id,
        entries: vec![assured::service::ShareEntry {
            email: "bob@example.org".into(),
            view: Some(true),
            edit: None,
            review: None,
        }],
    });

    let mut chan_a = ChannelClient::subscribe(
        &daemon.socket,
        &Request::Subscribe {
            token: alice,
            case_id,
            channel_key: Some("ch-a".into()),
            origin: None,
        },
    )
    .expect("alice channel");
    let first = chan_a
        .next_message()
        .expect("read")
        .expect("first message");
    assert_eq!(first["type"], "case_message");
    assert!(first["content"]["current_connections"].is_array());

    let mut chan_b = ChannelClient::subscribe(
        &daemon.socket,
        &Request::Subscribe {
            token: bob,
            case_id,
            channel_key: Some("ch-b".into()),
            origin: None,
        },
    )
    .expect("bob channel");
    let joined = chan_b.next_message().expect("read").expect("join message");
    assert_eq!(joined["type"], "case_message");

    // Alice sees the membership update, then Bob's message arrives with
    // author identity and no echo back to Bob.
    let update = chan_a.next_message().expect("read").expect("update");
    assert_eq!(update["type"], "case_message");

    chan_b.send_raw(r#"{"content":"hello"}"#).expect("send");
    let chat = chan_a.next_message().expect("read").expect("chat");
    assert_eq!(chat["type"], "case_message");
    assert_eq!(chat["content"], "hello");
    assert_eq!(chat["username"], "bob");

    drop(chan_a);
    drop(chan_b);
    daemon.shutdown();
}
