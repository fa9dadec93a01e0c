//! Recording doubles for the session's collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use resona_protocol::{GuildId, SessionId, UserId};
use resona_session::{
    EventEmitter, LibraryVersions, SessionConfig, SessionContext, SessionDeps,
    SessionEventHandler, SessionRegistry, VoiceClient, VoiceConnection, VoiceEventListener,
    node_info,
};
use resona_transport::{Connection, ConnectionId, TransportError};
use serde_json::Value;

// =========================================================================
// Transport
// =========================================================================

pub struct RecordingConnection {
    id: u64,
    frames: Mutex<Vec<String>>,
    open: AtomicBool,
}

impl RecordingConnection {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            frames: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        })
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<Value> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn ops(&self) -> Vec<String> {
        self.values()
            .iter()
            .map(|v| v["op"].as_str().unwrap_or_default().to_owned())
            .collect()
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        ConnectionId::new(self.id)
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(format!("conn-{}", self.id)));
        }
        self.frames.lock().unwrap().push(text);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self, _code: Option<u16>, _reason: Option<String>) {
        self.open.store(false, Ordering::SeqCst);
    }
}

// =========================================================================
// Registry
// =========================================================================

#[derive(Default)]
pub struct RecordingRegistry {
    pub timeouts: Mutex<Vec<SessionId>>,
    pub stats_ticks: AtomicUsize,
    /// Destroy the context on timeout, the way the server does.
    pub evict: bool,
}

impl RecordingRegistry {
    pub fn timeouts(&self) -> usize {
        self.timeouts.lock().unwrap().len()
    }

    pub fn stats_ticks(&self) -> usize {
        self.stats_ticks.load(Ordering::SeqCst)
    }
}

impl SessionRegistry for RecordingRegistry {
    fn on_session_resume_timeout(&self, context: Arc<SessionContext>) {
        self.timeouts
            .lock()
            .unwrap()
            .push(context.session_id().clone());
        if self.evict {
            tokio::spawn(async move { context.destroy().await });
        }
    }

    fn send_stats(&self, _context: &SessionContext) {
        self.stats_ticks.fetch_add(1, Ordering::SeqCst);
    }
}

// =========================================================================
// Voice
// =========================================================================

pub struct FakeVoiceConnection {
    guild_id: GuildId,
    listeners: Mutex<Vec<Arc<dyn VoiceEventListener>>>,
    pub connected: AtomicBool,
    pub ping: AtomicI64,
}

impl FakeVoiceConnection {
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn listener(&self) -> Arc<dyn VoiceEventListener> {
        Arc::clone(&self.listeners.lock().unwrap()[0])
    }
}

impl VoiceConnection for FakeVoiceConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn register_listener(&self, listener: Arc<dyn VoiceEventListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn gateway_ping(&self) -> Option<i64> {
        match self.ping.load(Ordering::SeqCst) {
            p if p < 0 => None,
            p => Some(p),
        }
    }
}

#[derive(Default)]
pub struct FakeVoiceClient {
    connections: Mutex<HashMap<GuildId, Arc<FakeVoiceConnection>>>,
    pub destroyed: Mutex<Vec<GuildId>>,
    pub created: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeVoiceClient {
    pub fn connection(&self, guild_id: GuildId) -> Option<Arc<FakeVoiceConnection>> {
        self.connections.lock().unwrap().get(&guild_id).cloned()
    }

    pub fn destroyed(&self) -> Vec<GuildId> {
        self.destroyed.lock().unwrap().clone()
    }
}

impl VoiceClient for FakeVoiceClient {
    fn get_connection(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        self.connection(guild_id)
            .map(|c| c as Arc<dyn VoiceConnection>)
    }

    fn create_connection(&self, guild_id: GuildId) -> Arc<dyn VoiceConnection> {
        let connection = Arc::new(FakeVoiceConnection {
            guild_id,
            listeners: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            ping: AtomicI64::new(-1),
        });
        self.created.fetch_add(1, Ordering::SeqCst);
        self.connections
            .lock()
            .unwrap()
            .insert(guild_id, Arc::clone(&connection));
        connection
    }

    fn destroy_connection(&self, guild_id: GuildId) {
        self.connections.lock().unwrap().remove(&guild_id);
        self.destroyed.lock().unwrap().push(guild_id);
    }

    fn close(&self) {
        self.connections.lock().unwrap().clear();
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =========================================================================
// Event handler
// =========================================================================

#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<String>>,
    pub frames_out: AtomicUsize,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionEventHandler for RecordingHandler {
    fn on_new_player(&self, _context: &SessionContext, player: &Arc<resona_session::Player>) {
        self.record(format!("new_player:{}", player.guild_id()));
    }

    fn on_destroy_player(&self, _context: &SessionContext, player: &Arc<resona_session::Player>) {
        self.record(format!("destroy_player:{}", player.guild_id()));
    }

    fn on_socket_context_paused(&self, _context: &SessionContext) {
        self.record("paused".into());
    }

    fn on_socket_context_destroyed(&self, _context: &SessionContext) {
        self.record("destroyed".into());
    }

    fn on_web_socket_message_out(&self, _context: &SessionContext, _frame: &str) {
        self.frames_out.fetch_add(1, Ordering::SeqCst);
    }
}

// =========================================================================
// Harness
// =========================================================================

pub struct Harness {
    pub context: Arc<SessionContext>,
    pub transport: Arc<RecordingConnection>,
    pub registry: Arc<RecordingRegistry>,
    pub voice: Arc<FakeVoiceClient>,
    pub handler: Arc<RecordingHandler>,
}

pub fn harness(session_id: &str) -> Harness {
    build(session_id, SessionConfig::default(), RecordingRegistry::default())
}

pub fn evicting_harness(session_id: &str) -> Harness {
    build(
        session_id,
        SessionConfig::default(),
        RecordingRegistry {
            evict: true,
            ..Default::default()
        },
    )
}

pub fn build(session_id: &str, config: SessionConfig, registry: RecordingRegistry) -> Harness {
    let transport = RecordingConnection::new(1);
    let registry = Arc::new(registry);
    let voice = Arc::new(FakeVoiceClient::default());
    let handler = Arc::new(RecordingHandler::default());

    let context = SessionContext::new(
        SessionId::from(session_id),
        UserId::from("1234"),
        transport.clone(),
        config,
        SessionDeps {
            voice: voice.clone(),
            registry: registry.clone(),
            events: EventEmitter::new().with(handler.clone()),
            info: node_info(&LibraryVersions::default()),
        },
    )
    .expect("context should build inside a runtime");

    Harness {
        context,
        transport,
        registry,
        voice,
        handler,
    }
}
