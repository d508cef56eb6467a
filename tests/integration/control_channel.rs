//! The agent against a local control server over the real WebSocket transport.

use std::{path::Path, time::Duration};

use linkshift_common::{Envelope, Keepalive};
use serde_json::json;
use tokio::{net::TcpListener, time::sleep};

use crate::common::{KillOnDrop, accept_agent, get_free_port, spawn_agent, stub_config, write_config};

#[tokio::test]
async fn agent_identifies_itself_and_keeps_alive() {
    let port = get_free_port();
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let config = write_config(&format!("keepalive_{port}"), &stub_config(port, "true"));
    let _agent = KillOnDrop(spawn_agent(&config));

    let mut conn = accept_agent(&listener).await;
    assert_eq!(conn.node_id.as_deref(), Some("3"));
    assert_eq!(conn.authorization.as_deref(), Some("Bearer integration-secret"));

    let ping: Keepalive = conn.next_event("robot_keepalive").await.decode().unwrap();
    assert_eq!(ping.robot_id, 3);
    assert!(ping.ts > 1_600_000_000, "unix seconds, got {}", ping.ts);
}

#[tokio::test]
async fn agent_reconnects_after_server_drop() {
    let port = get_free_port();
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let config = write_config(&format!("reconnect_{port}"), &stub_config(port, "true"));
    let _agent = KillOnDrop(spawn_agent(&config));

    let first = accept_agent(&listener).await;
    drop(first);

    let mut second = accept_agent(&listener).await;
    assert_eq!(second.node_id.as_deref(), Some("3"));
    second.next_event("robot_keepalive").await;
}

#[tokio::test]
async fn reboot_directive_runs_configured_command() {
    let port = get_free_port();
    let marker = std::env::temp_dir().join(format!("linkshift_reboot_marker_{port}"));
    drop(std::fs::remove_file(&marker));
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let config = write_config(
        &format!("reboot_{port}"),
        &stub_config(port, &format!("touch {}", marker.display())),
    );
    let _agent = KillOnDrop(spawn_agent(&config));

    let mut conn = accept_agent(&listener).await;
    conn.send(&Envelope {
        event: "reboot".to_string(),
        data: json!({"robot_id": "4"}),
    })
    .await;
    conn.send(&Envelope {
        event: "reboot".to_string(),
        data: json!({"robot_id": "3"}),
    })
    .await;

    assert!(wait_for_file(&marker).await, "reboot command was not executed");
    drop(std::fs::remove_file(&marker));
}

async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..50 {
        if path.exists() {
            return true;
        }
        sleep(Duration::from_millis(100)).await;
    }
    false
}
