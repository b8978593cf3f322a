//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, RwLock};

use crate::client::{ClientCommand, CommandError, FetchError, NetworkClient};
use crate::desktop::{Desktop, DesktopError};
use crate::handlers::{self, HandlerContext};
use crate::menu::{Activations, Menu};
use crate::reconciler::{self, Reconciler};
use crate::tray::{HeadlessTray, Tray};
use crate::types::{Snapshot, ToggleState};

/// Scripted [`NetworkClient`].  Status queries fail until a document is set.
pub struct FakeClient {
    status: Mutex<Option<String>>,
    dns: Mutex<Option<ToggleState>>,
    fail_commands: AtomicBool,
    commands: Mutex<Vec<ClientCommand>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(None),
            dns: Mutex::new(Some(ToggleState::Disabled)),
            fail_commands: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, doc: Value) {
        *self.status.lock().unwrap() = Some(doc.to_string());
    }

    pub fn fail_status(&self) {
        *self.status.lock().unwrap() = None;
    }

    /// `None` makes the DNS query fail.
    pub fn set_dns(&self, state: Option<ToggleState>) {
        *self.dns.lock().unwrap() = state;
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<ClientCommand> {
        self.commands.lock().unwrap().clone()
    }
}

fn not_running() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, "tailscaled not running")
}

#[async_trait]
impl NetworkClient for FakeClient {
    async fn status(&self) -> Result<Snapshot, FetchError> {
        let doc = self.status.lock().unwrap().clone();
        match doc {
            Some(doc) => Ok(Snapshot::from_json(doc.as_bytes())?),
            None => Err(FetchError::Spawn {
                program: "tailscale".into(),
                source: not_running(),
            }),
        }
    }

    async fn dns_status(&self) -> Result<ToggleState, FetchError> {
        let state = *self.dns.lock().unwrap();
        state.ok_or_else(|| FetchError::Spawn {
            program: "tailscale".into(),
            source: not_running(),
        })
    }

    async fn run(&self, command: ClientCommand) -> Result<(), CommandError> {
        self.commands.lock().unwrap().push(command);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(CommandError::Failed {
                output: "permission denied".into(),
            });
        }
        Ok(())
    }
}

/// [`Desktop`] that records what it was asked to do.
#[derive(Default)]
pub struct RecordingDesktop {
    notifications: Mutex<Vec<(String, String)>>,
    clipboard: Mutex<Vec<String>>,
    opened: Mutex<Vec<String>>,
    fail_clipboard: AtomicBool,
}

impl RecordingDesktop {
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn clipboard(&self) -> Vec<String> {
        self.clipboard.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn fail_clipboard(&self, fail: bool) {
        self.fail_clipboard.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Desktop for RecordingDesktop {
    async fn notify(&self, title: &str, body: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), DesktopError> {
        if self.fail_clipboard.load(Ordering::SeqCst) {
            return Err(DesktopError::Clipboard(arboard::Error::ClipboardOccupied));
        }
        self.clipboard.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// A menu wired to fakes.
pub struct Harness {
    pub tray: Arc<HeadlessTray>,
    pub client: Arc<FakeClient>,
    pub desktop: Arc<RecordingDesktop>,
    pub menu: Menu,
    pub ctx: HandlerContext,
    pub triggers: mpsc::Receiver<()>,
    pub shutdown: mpsc::Receiver<()>,
    activations: Option<Activations>,
}

impl Harness {
    pub fn new() -> Self {
        let tray = Arc::new(HeadlessTray::new());
        let dyn_tray: Arc<dyn Tray> = tray.clone();
        let (menu, activations) = Menu::build(&dyn_tray);
        let client = Arc::new(FakeClient::new());
        let desktop = Arc::new(RecordingDesktop::default());
        let (reconcile, triggers) = reconciler::trigger_channel();
        let (shutdown_tx, shutdown) = mpsc::channel(1);

        let ctx = HandlerContext {
            client: client.clone(),
            desktop: desktop.clone(),
            reconcile,
            self_address: Arc::new(RwLock::new(None)),
            shutdown: shutdown_tx,
            admin_url: "https://login.tailscale.com/admin/machines".into(),
        };

        Self {
            tray,
            client,
            desktop,
            menu,
            ctx,
            triggers,
            shutdown,
            activations: Some(activations),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.menu.clone(), self.tray.clone(), self.ctx.clone())
    }

    /// Spawn the fixed-item listeners.  May be called once.
    pub fn spawn_fixed(&mut self, privileged: bool) {
        let activations = self.activations.take().expect("listeners already spawned");
        handlers::spawn_fixed(&self.ctx, &self.menu, activations, privileged);
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}

/// Status document node with a MagicDNS name.
pub fn node(name: &str, addr: &str) -> Value {
    json!({
        "DNSName": format!("{}.example.ts.net.", name),
        "HostName": name,
        "TailscaleIPs": [addr],
    })
}

pub fn peer(name: &str, addr: &str, exit_node_option: bool, exit_node: bool) -> Value {
    let mut value = node(name, addr);
    value["ExitNodeOption"] = json!(exit_node_option);
    value["ExitNode"] = json!(exit_node);
    value
}

/// Node without a DNS name.
pub fn service(name: &str, addr: &str) -> Value {
    json!({
        "DNSName": "",
        "HostName": name,
        "TailscaleIPs": [addr],
    })
}

/// Status document with the peers in the given order.
pub fn status(up: bool, self_node: Value, peers: Vec<Value>) -> Value {
    let peers: Map<String, Value> = peers
        .into_iter()
        .enumerate()
        .map(|(i, peer)| (format!("nodekey:{:04}", i), peer))
        .collect();
    let backend_state = if up { "Running" } else { "Stopped" };
    json!({
        "BackendState": backend_state,
        "Self": self_node,
        "Peer": peers,
        "Health": [],
    })
}
