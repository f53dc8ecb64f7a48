use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;
use tunehub_runtime::{serve, Hub, HubOptions, Stream, Transport, TransportFrame};

const RADIO: &str = r#"
fn entry_point(plugin) {
    log_info("radio starting");
    plugin.add_browser("com.test.radio", #{
        name: "Radio",
        handle_request: |payload| #{ stations: ["one", "two"], query: payload },
    }) && plugin.add_player("com.test.radio.player", #{
        name: "Radio player",
        play: |path| true,
    })
}
"#;

fn write_plugin(root: &Path) {
    let dir = root.join("radio");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("manifest.toml"),
        r#"
name = "radio"
version = "0.2.0"
min_runtime_version = "0.1.0"
kind = "embedded"
filename = "radio.rhai"
"#,
    )
    .unwrap();
    std::fs::write(dir.join("radio.rhai"), RADIO).unwrap();
}

async fn run_session(hub: &Hub, input: &str) -> Vec<TransportFrame> {
    let (tx, rx) = unbounded_channel();
    let transport = Transport::new(hub.browsers().clone(), hub.playback().clone(), tx);
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (client_read, mut client_write) = tokio::io::split(client);

    client_write.write_all(input.as_bytes()).await.unwrap();
    client_write.shutdown().await.unwrap();
    drop(client_write);
    serve(server_read, server_write, transport, rx).await.unwrap();

    let mut frames = Vec::new();
    let mut lines = BufReader::new(client_read).lines();
    while let Some(line) = lines.next_line().await.unwrap() {
        frames.push(serde_json::from_str(&line).unwrap());
    }
    frames
}

// A single test owns the process-wide hub.
#[tokio::test]
async fn scripted_plugin_over_the_transport() {
    let root = tempfile::tempdir().unwrap();
    write_plugin(root.path());

    let hub = Hub::new(HubOptions::default()).unwrap();
    let report = hub.load_plugins(root.path());
    assert!(report.is_clean());
    assert_eq!(report.loaded, vec!["radio".to_string()]);

    let input = [
        json!({"id": 1, "method": "browser_request", "browser_id": "com.test.radio", "payload": "jazz"}),
        json!({"id": 2, "method": "subscribe", "stream": "playlist"}),
        json!({"id": 3, "method": "play_list",
            "parent": {"player_id": "com.test.radio.player", "path": "/stations"},
            "entries": [
                {"player_id": "com.test.radio.player", "path": "/stations/one"},
                {"player_id": "com.test.radio.player", "path": "/stations/two"}
            ]}),
        json!({"id": 4, "method": "next"}),
        json!({"id": 5, "method": "next"}),
        json!({"id": 6, "method": "list_players"}),
    ]
    .iter()
    .map(|request| format!("{request}\n"))
    .collect::<String>();

    let frames = run_session(&hub, &input).await;

    assert_eq!(
        frames[0],
        TransportFrame::Response {
            id: 1,
            payload: json!({"stations": ["one", "two"], "query": "jazz"}),
        }
    );
    assert_eq!(frames[1], TransportFrame::End { id: 1 });
    assert_eq!(
        frames[2],
        TransportFrame::Ok {
            id: 2,
            result: Value::Null
        }
    );

    let ok = |id: u64| {
        frames
            .iter()
            .find_map(|frame| match frame {
                TransportFrame::Ok { id: found, result } if *found == id => Some(result.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no ok frame for request {id}"))
    };
    assert_eq!(ok(3), Value::Null);
    assert_eq!(ok(4), json!(true));
    assert_eq!(ok(5), json!(false));
    assert_eq!(ok(6)["current"], "com.test.radio.player");

    let playlist_events: Vec<&Value> = frames
        .iter()
        .filter_map(|frame| match frame {
            TransportFrame::Event {
                stream: Stream::Playlist,
                payload,
            } => Some(payload),
            _ => None,
        })
        .collect();
    assert!(playlist_events
        .iter()
        .any(|event| event["event"] == "current_changed" && event["entry"] == 1));

    drop(hub);
}
