//! JSON-lines transport.
//!
//! Each inbound line is a [`TransportRequest`]; each outbound line a
//! [`TransportFrame`]. Browser and player requests stream `response` frames
//! followed by a single `end`. Playlist commands answer with `ok` or
//! `error`. Subscriptions forward registry and playlist events as `event`
//! frames, starting with a replay of the current state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tunehub_core::{BrowserRegistry, CoreError, Listener, Media, Message, Request, RequestState};
use tunehub_player::Playback;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    pub id: u64,
    #[serde(flatten)]
    pub method: TransportMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TransportMethod {
    BrowserRequest {
        browser_id: String,
        payload: Value,
    },
    PlayerRequest {
        payload: Value,
    },
    Cancel {
        request_id: u64,
    },
    Subscribe {
        stream: Stream,
    },
    Unsubscribe {
        stream: Stream,
    },
    ListBrowsers,
    ListPlayers,
    PlayMedia {
        media: Media,
    },
    PlayList {
        parent: Media,
        entries: Vec<Media>,
    },
    AddMedia {
        media: Media,
    },
    AddList {
        parent: Media,
        entries: Vec<Media>,
    },
    PlaylistPlay {
        playlist: usize,
        #[serde(default)]
        entry: Option<usize>,
    },
    PlaylistRemove {
        playlist: usize,
        #[serde(default)]
        entry: Option<usize>,
    },
    /// Swap two entries of `playlist` (the current one when unset).
    PlaylistSwap {
        #[serde(default)]
        playlist: Option<usize>,
        from: usize,
        to: usize,
    },
    /// Swap two whole playlists.
    PlaylistMove {
        from: usize,
        to: usize,
    },
    Next {
        #[serde(default)]
        parent: bool,
    },
    Previous {
        #[serde(default)]
        parent: bool,
    },
    Clear,
    ListPlaylists,
}

/// An event stream a client can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Stream {
    Browsers,
    Players,
    Playlist,
    /// Events sent by one browser.
    Browser(String),
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Browsers => f.write_str("browsers"),
            Stream::Players => f.write_str("players"),
            Stream::Playlist => f.write_str("playlist"),
            Stream::Browser(id) => write!(f, "browser:{id}"),
        }
    }
}

impl FromStr for Stream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "browsers" => Ok(Stream::Browsers),
            "players" => Ok(Stream::Players),
            "playlist" => Ok(Stream::Playlist),
            other => match other.strip_prefix("browser:") {
                Some(id) if !id.is_empty() => Ok(Stream::Browser(id.to_string())),
                _ => Err(format!("unknown stream {other:?}")),
            },
        }
    }
}

impl TryFrom<String> for Stream {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stream> for String {
    fn from(stream: Stream) -> Self {
        stream.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum TransportFrame {
    Response {
        id: u64,
        payload: Value,
    },
    End {
        id: u64,
    },
    Event {
        stream: Stream,
        payload: Value,
    },
    Error {
        id: u64,
        message: String,
    },
    Ok {
        id: u64,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        result: Value,
    },
}

/// Translates requests into coordinator calls and queues the resulting
/// frames.
///
/// Dropping the transport cancels its pending requests and removes its
/// subscriptions.
pub struct Transport {
    browsers: Arc<BrowserRegistry>,
    playback: Playback,
    frames: UnboundedSender<TransportFrame>,
    pending: Arc<Mutex<HashMap<u64, Request>>>,
    subscriptions: Mutex<HashMap<Stream, Listener>>,
}

impl Transport {
    pub fn new(
        browsers: Arc<BrowserRegistry>,
        playback: Playback,
        frames: UnboundedSender<TransportFrame>,
    ) -> Self {
        Self {
            browsers,
            playback,
            frames,
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Decode and dispatch one line.
    pub fn handle_line(&self, line: &str) {
        match serde_json::from_str::<TransportRequest>(line) {
            Ok(request) => self.dispatch(request),
            Err(err) => {
                tracing::warn!(error = %err, "undecodable transport request");
                let id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|value| value.get("id").and_then(Value::as_u64))
                    .unwrap_or(0);
                self.send(TransportFrame::Error {
                    id,
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn dispatch(&self, request: TransportRequest) {
        let id = request.id;
        tracing::trace!(id, method = ?request.method, "transport request");
        let result = match request.method {
            TransportMethod::BrowserRequest {
                browser_id,
                payload,
            } => return self.browser_request(id, &browser_id, payload),
            TransportMethod::PlayerRequest { payload } => return self.player_request(id, payload),
            TransportMethod::Cancel { request_id } => self.cancel(request_id),
            TransportMethod::Subscribe { stream } => self.subscribe(stream),
            TransportMethod::Unsubscribe { stream } => self.unsubscribe(&stream),
            TransportMethod::ListBrowsers => Ok(json!(self
                .browsers
                .list()
                .into_iter()
                .map(|(id, info)| json!({ "id": id, "info": info }))
                .collect::<Vec<_>>())),
            TransportMethod::ListPlayers => Ok(json!({
                "current": self.playback.players().current_id(),
                "players": self
                    .playback
                    .players()
                    .list()
                    .into_iter()
                    .map(|(id, info)| json!({ "id": id, "info": info }))
                    .collect::<Vec<_>>(),
            })),
            TransportMethod::PlayMedia { media } => done(self.playback.play_media(media)),
            TransportMethod::PlayList { parent, entries } => {
                done(self.playback.play_list(parent, entries))
            }
            TransportMethod::AddMedia { media } => done(self.playback.add_media(media)),
            TransportMethod::AddList { parent, entries } => {
                done(self.playback.add_list(parent, entries))
            }
            TransportMethod::PlaylistPlay { playlist, entry } => {
                done(self.playback.play(playlist, entry))
            }
            TransportMethod::PlaylistRemove { playlist, entry } => {
                done(self.playback.remove(playlist, entry))
            }
            TransportMethod::PlaylistSwap { playlist, from, to } => done(match playlist {
                Some(playlist) => self.playback.swap_in(playlist, from, to),
                None => self.playback.swap(from, to),
            }),
            TransportMethod::PlaylistMove { from, to } => {
                done(self.playback.swap_playlists(from, to))
            }
            TransportMethod::Next { parent } => Ok(json!(self.playback.next(parent))),
            TransportMethod::Previous { parent } => Ok(json!(self.playback.previous(parent))),
            TransportMethod::Clear => {
                self.playback.clear();
                Ok(Value::Null)
            }
            TransportMethod::ListPlaylists => self.list_playlists(),
        };
        self.send(match result {
            Ok(result) => TransportFrame::Ok { id, result },
            Err(message) => TransportFrame::Error { id, message },
        });
    }

    fn browser_request(&self, id: u64, browser_id: &str, payload: Value) {
        // Only an error frame: an end frame would close the request in flight.
        if self.pending.lock().contains_key(&id) {
            self.send(TransportFrame::Error {
                id,
                message: format!("request {id} is already in flight"),
            });
            return;
        }
        let listener = self.request_listener(id);
        match self
            .browsers
            .handle_request(browser_id, encode_payload(payload), listener)
        {
            Ok(request) => {
                self.pending.lock().insert(id, request.clone());
                if request.state() != RequestState::Pending {
                    self.pending.lock().remove(&id);
                }
            }
            // The end frame has already been sent through the listener.
            Err(CoreError::HandlerFailed { .. }) => {}
            Err(err) => {
                self.send(TransportFrame::Error {
                    id,
                    message: err.to_string(),
                });
                self.send(TransportFrame::End { id });
            }
        }
    }

    fn player_request(&self, id: u64, payload: Value) {
        let listener = self.request_listener(id);
        if !self
            .playback
            .handle_request(&encode_payload(payload), &listener)
        {
            self.send(TransportFrame::Error {
                id,
                message: "player request refused".into(),
            });
            self.send(TransportFrame::End { id });
        }
    }

    fn cancel(&self, request_id: u64) -> Result<Value, String> {
        let request = self.pending.lock().remove(&request_id);
        match request {
            Some(request) => Ok(json!(request.cancel())),
            None => Err(format!("no pending request {request_id}")),
        }
    }

    fn subscribe(&self, stream: Stream) -> Result<Value, String> {
        if self.subscriptions.lock().contains_key(&stream) {
            return Err(format!("already subscribed to {stream}"));
        }
        let listener = self.event_listener(stream.clone());
        let added = match &stream {
            Stream::Browsers => self.browsers.add_event_listener(None, listener.clone()),
            Stream::Browser(id) => self.browsers.add_event_listener(Some(id), listener.clone()),
            Stream::Players => self.playback.players().add_event_listener(listener.clone()),
            Stream::Playlist => self.playback.add_event_listener(listener.clone()),
        };
        added.map_err(|err| err.to_string())?;
        self.subscriptions.lock().insert(stream, listener);
        Ok(Value::Null)
    }

    fn unsubscribe(&self, stream: &Stream) -> Result<Value, String> {
        let listener = self
            .subscriptions
            .lock()
            .remove(stream)
            .ok_or_else(|| format!("not subscribed to {stream}"))?;
        self.detach(stream, &listener);
        Ok(Value::Null)
    }

    fn detach(&self, stream: &Stream, listener: &Listener) {
        let result = match stream {
            Stream::Browsers => self.browsers.remove_event_listener(None, listener),
            Stream::Browser(id) => self.browsers.remove_event_listener(Some(id), listener),
            Stream::Players => {
                self.playback.players().remove_event_listener(listener);
                Ok(())
            }
            Stream::Playlist => {
                self.playback.remove_event_listener(listener);
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::debug!(%stream, error = %err, "listener already gone");
        }
    }

    fn list_playlists(&self) -> Result<Value, String> {
        let playlists: Vec<_> = (0..self.playback.get_playlist_count())
            .filter_map(|index| self.playback.get_playlist(index))
            .collect();
        Ok(json!({
            "current": self.playback.get_current_playlist_index(),
            "playlists": playlists,
        }))
    }

    fn request_listener(&self, id: u64) -> Listener {
        let frames = self.frames.clone();
        let pending: Weak<Mutex<HashMap<u64, Request>>> = Arc::downgrade(&self.pending);
        Listener::new(move |message| {
            let frame = match message {
                Some(message) => TransportFrame::Response {
                    id,
                    payload: decode_payload(message),
                },
                None => {
                    if let Some(pending) = pending.upgrade() {
                        let finished = pending.lock().remove(&id);
                        drop(finished);
                    }
                    TransportFrame::End { id }
                }
            };
            frames.send(frame).is_ok()
        })
    }

    fn event_listener(&self, stream: Stream) -> Listener {
        let frames = self.frames.clone();
        Listener::new(move |message| {
            let payload = message.map_or(Value::Null, decode_payload);
            frames
                .send(TransportFrame::Event {
                    stream: stream.clone(),
                    payload,
                })
                .is_ok()
        })
    }

    fn send(&self, frame: TransportFrame) {
        if self.frames.send(frame).is_err() {
            tracing::debug!("transport closed, dropping frame");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        let subscriptions: Vec<_> = self.subscriptions.lock().drain().collect();
        for (stream, listener) in subscriptions {
            self.detach(&stream, &listener);
        }
        let pending: Vec<_> = self.pending.lock().drain().map(|(_, request)| request).collect();
        for request in pending {
            request.cancel();
        }
    }
}

fn done<E: fmt::Display>(result: Result<(), E>) -> Result<Value, String> {
    result.map(|()| Value::Null).map_err(|err| err.to_string())
}

/// Strings travel as raw text, anything else as JSON.
fn encode_payload(payload: Value) -> Message {
    match payload {
        Value::String(text) => Message::from(text),
        other => Message::from(other.to_string()),
    }
}

/// JSON payloads are embedded as is, anything else as a string.
fn decode_payload(message: &Message) -> Value {
    serde_json::from_slice(message.cdata()).unwrap_or_else(|_| Value::String(message.to_text()))
}

/// Serve `transport` over a line-oriented reader and writer until the reader
/// reaches end of input. Frames queued before shutdown are still written.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    transport: Transport,
    mut frames: UnboundedReceiver<TransportFrame>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => transport.handle_line(&line),
                None => break,
            },
            Some(frame) = frames.recv() => write_frame(&mut writer, &frame).await?,
        }
    }
    drop(transport);
    while let Ok(frame) = frames.try_recv() {
        write_frame(&mut writer, &frame).await?;
    }
    writer.flush().await
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &TransportFrame) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;
    use tunehub_audio::NullAudioEngine;
    use tunehub_core::{Browser, BrowserInfo};

    struct Echo {
        held: Mutex<Vec<Request>>,
    }

    impl Browser for Echo {
        fn info(&self) -> BrowserInfo {
            BrowserInfo {
                name: "Echo".into(),
                ..BrowserInfo::default()
            }
        }

        fn handle_request(&self, request: Request) -> bool {
            match request.message().to_text().as_str() {
                "hold" => {
                    self.held.lock().push(request);
                    true
                }
                "reject" => false,
                text => {
                    request.complete(Message::from(format!(r#"{{"echo":"{text}"}}"#)));
                    true
                }
            }
        }
    }

    fn setup() -> (Transport, UnboundedReceiver<TransportFrame>, Arc<Echo>) {
        let browsers = Arc::new(BrowserRegistry::new());
        let echo = Arc::new(Echo {
            held: Mutex::new(Vec::new()),
        });
        browsers.add("com.test.echo", echo.clone()).unwrap();
        let playback = Playback::new(Arc::new(NullAudioEngine::default()), 1.0, false);
        let (tx, rx) = unbounded_channel();
        (Transport::new(browsers, playback, tx), rx, echo)
    }

    fn drain(rx: &mut UnboundedReceiver<TransportFrame>) -> Vec<TransportFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn request_wire_format() {
        let request: TransportRequest = serde_json::from_str(
            r#"{"id":7,"method":"browser_request","browser_id":"com.test.echo","payload":"hi"}"#,
        )
        .unwrap();
        assert_eq!(request.id, 7);
        assert_eq!(
            request.method,
            TransportMethod::BrowserRequest {
                browser_id: "com.test.echo".into(),
                payload: json!("hi"),
            }
        );

        let request: TransportRequest =
            serde_json::from_str(r#"{"id":1,"method":"subscribe","stream":"browser:com.x"}"#).unwrap();
        assert_eq!(
            request.method,
            TransportMethod::Subscribe {
                stream: Stream::Browser("com.x".into())
            }
        );

        let request: TransportRequest = serde_json::from_str(r#"{"id":2,"method":"next"}"#).unwrap();
        assert_eq!(request.method, TransportMethod::Next { parent: false });

        let frame = serde_json::to_value(TransportFrame::End { id: 3 }).unwrap();
        assert_eq!(frame, json!({"frame":"end","id":3}));
    }

    #[test]
    fn streams_parse() {
        assert_eq!("players".parse::<Stream>().unwrap(), Stream::Players);
        assert!("browser:".parse::<Stream>().is_err());
        assert!("everything".parse::<Stream>().is_err());
    }

    #[test]
    fn browser_request_streams_response_then_end() {
        let (transport, mut rx, _echo) = setup();
        transport.handle_line(
            r#"{"id":1,"method":"browser_request","browser_id":"com.test.echo","payload":"hi"}"#,
        );
        assert_eq!(
            drain(&mut rx),
            vec![
                TransportFrame::Response {
                    id: 1,
                    payload: json!({"echo":"hi"}),
                },
                TransportFrame::End { id: 1 },
            ]
        );
        assert!(transport.pending.lock().is_empty());
    }

    #[test]
    fn unknown_browser_and_rejection() {
        let (transport, mut rx, _echo) = setup();
        transport.handle_line(
            r#"{"id":2,"method":"browser_request","browser_id":"com.test.none","payload":"hi"}"#,
        );
        let frames = drain(&mut rx);
        assert!(matches!(frames[0], TransportFrame::Error { id: 2, .. }));
        assert_eq!(frames[1], TransportFrame::End { id: 2 });

        transport.handle_line(
            r#"{"id":3,"method":"browser_request","browser_id":"com.test.echo","payload":"reject"}"#,
        );
        assert_eq!(drain(&mut rx), vec![TransportFrame::End { id: 3 }]);
    }

    #[test]
    fn cancel_pending_request() {
        let (transport, mut rx, echo) = setup();
        transport.handle_line(
            r#"{"id":4,"method":"browser_request","browser_id":"com.test.echo","payload":"hold"}"#,
        );
        assert!(drain(&mut rx).is_empty());
        assert!(transport.pending.lock().contains_key(&4));

        transport.handle_line(r#"{"id":5,"method":"cancel","request_id":4}"#);
        assert_eq!(
            drain(&mut rx),
            vec![
                TransportFrame::End { id: 4 },
                TransportFrame::Ok {
                    id: 5,
                    result: json!(true)
                },
            ]
        );
        let held = echo.held.lock().pop().unwrap();
        assert!(!held.complete(Message::from("late")));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn reused_request_id_is_refused_while_in_flight() {
        let (transport, mut rx, echo) = setup();
        transport.handle_line(
            r#"{"id":7,"method":"browser_request","browser_id":"com.test.echo","payload":"hold"}"#,
        );
        transport.handle_line(
            r#"{"id":7,"method":"browser_request","browser_id":"com.test.echo","payload":"hi"}"#,
        );
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], TransportFrame::Error { id: 7, .. }));
        assert_eq!(echo.held.lock().len(), 1);

        transport.handle_line(r#"{"id":8,"method":"cancel","request_id":7}"#);
        assert_eq!(
            drain(&mut rx),
            vec![
                TransportFrame::End { id: 7 },
                TransportFrame::Ok {
                    id: 8,
                    result: json!(true)
                },
            ]
        );
        assert!(echo.held.lock()[0].is_canceled());

        transport.handle_line(
            r#"{"id":7,"method":"browser_request","browser_id":"com.test.echo","payload":"hi"}"#,
        );
        assert_eq!(drain(&mut rx).last(), Some(&TransportFrame::End { id: 7 }));
    }

    #[test]
    fn dropping_transport_cancels_pending() {
        let (transport, mut rx, echo) = setup();
        transport.handle_line(
            r#"{"id":6,"method":"browser_request","browser_id":"com.test.echo","payload":"hold"}"#,
        );
        drop(transport);
        assert_eq!(drain(&mut rx), vec![TransportFrame::End { id: 6 }]);
        assert!(echo.held.lock()[0].is_canceled());
    }

    #[test]
    fn subscriptions_replay_and_detach() {
        let (transport, mut rx, _echo) = setup();
        transport.handle_line(r#"{"id":1,"method":"subscribe","stream":"browsers"}"#);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            TransportFrame::Event { stream, payload } => {
                assert_eq!(*stream, Stream::Browsers);
                assert_eq!(payload["event"], "added");
                assert_eq!(payload["id"], "com.test.echo");
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert_eq!(
            frames[1],
            TransportFrame::Ok {
                id: 1,
                result: Value::Null
            }
        );

        transport.handle_line(r#"{"id":2,"method":"subscribe","stream":"browsers"}"#);
        assert!(matches!(drain(&mut rx)[0], TransportFrame::Error { id: 2, .. }));

        transport.handle_line(r#"{"id":3,"method":"unsubscribe","stream":"browsers"}"#);
        drain(&mut rx);
        transport.browsers.remove("com.test.echo").unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn playlist_commands_answer_ok_or_error() {
        let (transport, mut rx, _echo) = setup();
        transport.handle_line(r#"{"id":1,"method":"playlist_play","playlist":0}"#);
        assert!(matches!(drain(&mut rx)[0], TransportFrame::Error { id: 1, .. }));

        transport.handle_line(r#"{"id":2,"method":"list_playlists"}"#);
        assert_eq!(
            drain(&mut rx),
            vec![TransportFrame::Ok {
                id: 2,
                result: json!({"current": null, "playlists": []}),
            }]
        );

        transport.handle_line(r#"{"id":3,"method":"next","parent":true}"#);
        assert_eq!(
            drain(&mut rx),
            vec![TransportFrame::Ok {
                id: 3,
                result: json!(false)
            }]
        );
    }

    #[test]
    fn player_request_without_current_player_fails() {
        let (transport, mut rx, _echo) = setup();
        transport.handle_line(
            r#"{"id":9,"method":"player_request","payload":{"type":"set_state","value":"paused"}}"#,
        );
        let frames = drain(&mut rx);
        assert!(matches!(frames[0], TransportFrame::Error { id: 9, .. }));
        assert_eq!(frames[1], TransportFrame::End { id: 9 });
    }

    #[test]
    fn garbage_lines_report_errors() {
        let (transport, mut rx, _echo) = setup();
        transport.handle_line("not json");
        transport.handle_line(r#"{"id":12,"method":"teleport"}"#);
        let frames = drain(&mut rx);
        assert!(matches!(frames[0], TransportFrame::Error { id: 0, .. }));
        assert!(matches!(frames[1], TransportFrame::Error { id: 12, .. }));
    }

    #[tokio::test]
    async fn serves_json_lines() {
        let (transport, rx, _echo) = setup();
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, mut client_write) = tokio::io::split(client);

        client_write
            .write_all(
                b"{\"id\":1,\"method\":\"browser_request\",\"browser_id\":\"com.test.echo\",\"payload\":\"hi\"}\n\n",
            )
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();
        drop(client_write);

        serve(server_read, server_write, transport, rx).await.unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let first: TransportFrame =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: TransportFrame =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(
            first,
            TransportFrame::Response {
                id: 1,
                payload: json!({"echo":"hi"})
            }
        );
        assert_eq!(second, TransportFrame::End { id: 1 });
    }
}
