//! Common utilities for integration tests.
//!
//! Spawning the agent binary against generated configs, picking free ports, and a minimal
//! control server speaking the agent's WebSocket protocol.

use std::{
    env,
    path::PathBuf,
    process::{Child, Command, Stdio},
    time::Duration,
};

use futures_util::{SinkExt as _, StreamExt as _};
use linkshift_common::{Envelope, NODE_ID_HEADER};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
    },
};

pub fn get_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .unwrap()
        .port()
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

pub fn get_agent_bin() -> &'static str {
    env!("CARGO_BIN_EXE_linkshift_agent")
}

/// Config for a node that talks to a control server on `port`, with every external
/// utility stubbed out and streams disabled.
pub fn stub_config(port: u16, reboot_command: &str) -> String {
    format!(
        r#"
        [node]
        id = 3
        destination = 1

        [server]
        url = "ws://127.0.0.1:{port}/ws"
        token = "integration-secret"
        keepalive_secs = 1
        telemetry_secs = 1
        backoff_base_secs = 1
        backoff_cap_secs = 2

        [interfaces]
        wired = "lo"
        wireless = "linkshift-none0"

        [[access_points]]
        id = 1
        bssid = "00:11:32:aa:00:01"

        [[destinations]]
        id = 1
        ip = "127.0.0.1"

        [radio]
        command = ["sh", "-c", "echo OK", "wpa_cli"]

        [routing]
        command = ["true"]

        [media]
        enabled = false

        [load]
        enabled = false

        [system]
        reboot_command = "{reboot_command}"
        "#
    )
}

/// Writes `config_toml` to a temp file unique to `tag`.
pub fn write_config(tag: &str, config_toml: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("linkshift_integration_{tag}.toml"));
    std::fs::write(&path, config_toml).expect("failed to write config");
    path
}

/// Spawns `linkshift_agent service` with the given config file.
pub fn spawn_agent(config_path: &std::path::Path) -> Child {
    Command::new(get_agent_bin())
        .args(["service", "--config", config_path.to_str().unwrap()])
        .env("LINKSHIFT_INTEGRATION_TEST", "1")
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start agent")
}

/// One accepted control-channel connection and the headers of its upgrade request.
pub struct AgentConnection {
    pub node_id: Option<String>,
    pub authorization: Option<String>,
    pub socket: WebSocketStream<TcpStream>,
}

impl AgentConnection {
    /// Next event with the given name, skipping others.
    pub async fn next_event(&mut self, name: &str) -> Envelope {
        loop {
            let message = timeout(Duration::from_secs(10), self.socket.next())
                .await
                .expect("timed out waiting for an event")
                .expect("connection ended")
                .expect("websocket error");
            if let Message::Text(text) = message {
                let envelope: Envelope = serde_json::from_str(text.as_str()).unwrap();
                if envelope.event == name {
                    return envelope;
                }
            }
        }
    }

    pub async fn send(&mut self, envelope: &Envelope) {
        let text = serde_json::to_string(envelope).unwrap();
        self.socket.send(Message::text(text)).await.unwrap();
    }
}

/// Accepts the next agent connection on `listener`.
pub async fn accept_agent(listener: &TcpListener) -> AgentConnection {
    let (stream, _) = timeout(Duration::from_secs(15), listener.accept())
        .await
        .expect("agent never connected")
        .unwrap();
    let (tx, rx) = oneshot::channel();
    let socket = accept_hdr_async(stream, |request: &Request, response: Response| {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        drop(tx.send((header(NODE_ID_HEADER), header("authorization"))));
        Ok(response)
    })
    .await
    .expect("websocket handshake failed");
    let (node_id, authorization) = rx.await.unwrap();
    AgentConnection {
        node_id,
        authorization,
        socket,
    }
}
