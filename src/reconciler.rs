//! The poll-diff-render loop.
//!
//! A [`Reconciler`] is owned by a single task.  Timer ticks and requests from
//! listeners both funnel into that task, so cycles never overlap and the
//! registries need no locking.  The only state shared with listeners is the
//! last known local address.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{self, MissedTickBehavior};

use crate::handlers::{self, HandlerContext};
use crate::menu::{Menu, DNS_TITLE, ROUTES_TITLE};
use crate::registry::{DeviceRegistry, ExitNodeRegistry};
use crate::tray::{Icon, ItemSpec, MenuItem, Tray};
use crate::types::{Snapshot, ToggleState};

/// Last known canonical address of the local node.
pub type SharedAddress = Arc<RwLock<Option<String>>>;

/// Connection state shown by the tray icon and the connect items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected {
        exit_node_active: bool,
    },
}

impl ConnectionState {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        if snapshot.connected {
            ConnectionState::Connected {
                exit_node_active: snapshot.has_active_exit_node(),
            }
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    fn icon(self) -> Icon {
        match self {
            ConnectionState::Disconnected => Icon::Off,
            ConnectionState::Connected {
                exit_node_active: false,
            } => Icon::On,
            ConnectionState::Connected {
                exit_node_active: true,
            } => Icon::OnWithExitNode,
        }
    }
}

/// Requests an out-of-band cycle.
#[derive(Debug, Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<()>,
}

impl ReconcileHandle {
    /// Queue a cycle.  Requests made while one is already pending coalesce
    /// into it.
    pub fn request(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("Reconciler gone, dropping request"),
        }
    }
}

pub fn trigger_channel() -> (ReconcileHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ReconcileHandle { tx }, rx)
}

/// What one cycle changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub state: ConnectionState,
    pub fetch_failed: bool,
    pub created: Vec<String>,
    pub evicted: Vec<String>,
    pub exit_nodes_created: Vec<String>,
    pub current_exit_node: Option<String>,
}

pub struct Reconciler {
    menu: Menu,
    tray: Arc<dyn Tray>,
    ctx: HandlerContext,
    state: ConnectionState,
    devices: DeviceRegistry,
    exit_nodes: ExitNodeRegistry,
}

impl Reconciler {
    pub fn new(menu: Menu, tray: Arc<dyn Tray>, ctx: HandlerContext) -> Self {
        tray.set_icon(Icon::Off);
        tray.set_tooltip("Tailscale: Disconnected");
        Self {
            menu,
            tray,
            ctx,
            state: ConnectionState::Disconnected,
            devices: DeviceRegistry::new(),
            exit_nodes: ExitNodeRegistry::new(),
        }
    }

    /// Run cycles every `period` and whenever a request arrives.
    pub async fn run(mut self, period: Duration, mut triggers: mpsc::Receiver<()>) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(()) = triggers.recv() => debug!("Reconciliation requested"),
            }
            let report = self.run_cycle().await;
            debug!(
                "Cycle finished: {:?} (fetch failed: {}), {} devices (+{} -{}), {} exit nodes (+{}), active exit node {:?}",
                report.state,
                report.fetch_failed,
                self.devices.len(),
                report.created.len(),
                report.evicted.len(),
                self.exit_nodes.len(),
                report.exit_nodes_created.len(),
                report.current_exit_node,
            );
        }
    }

    /// One full fetch-diff-apply pass.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let routes = match self.ctx.client.status().await {
            Ok(snapshot) => {
                self.transition(ConnectionState::from_snapshot(&snapshot));
                self.update_self_label(&snapshot).await;
                self.reconcile_exit_nodes(&snapshot, &mut report);
                self.reconcile_devices(&snapshot, &mut report);
                snapshot.routes_state()
            }
            Err(e) => {
                warn!("Status query failed: {}", e);
                report.fetch_failed = true;
                self.transition(ConnectionState::Disconnected);
                self.menu.disable_exit_node.hide();
                ToggleState::Unknown
            }
        };

        let dns = match self.ctx.client.dns_status().await {
            Ok(state) => state,
            Err(e) => {
                warn!("DNS status query failed: {}", e);
                ToggleState::Unknown
            }
        };
        render_toggle(&self.menu.dns, DNS_TITLE, dns);
        render_toggle(&self.menu.routes, ROUTES_TITLE, routes);

        report.state = self.state;
        report
    }

    fn transition(&mut self, next: ConnectionState) {
        let prev = std::mem::replace(&mut self.state, next);
        if prev == next {
            return;
        }

        if next.is_connected() && !prev.is_connected() {
            info!("Tailscale connected");
            self.tray.set_tooltip("Tailscale: Connected");
            self.menu.connect.disable();
            self.menu.disconnect.enable();
        } else if !next.is_connected() {
            info!("Tailscale disconnected");
            self.tray.set_tooltip("Tailscale: Disconnected");
            self.menu.connect.enable();
            self.menu.disconnect.disable();
        }
        self.tray.set_icon(next.icon());
    }

    async fn update_self_label(&self, snapshot: &Snapshot) {
        let address = {
            let mut known = self.ctx.self_address.write().await;
            if let Some(addr) = snapshot.self_node.canonical_address() {
                *known = Some(addr.to_string());
            }
            known.clone().unwrap_or_default()
        };
        self.menu.this_device.set_title(format!(
            "This device: {} ({})",
            snapshot.self_node.name, address
        ));
    }

    fn reconcile_exit_nodes(&mut self, snapshot: &Snapshot, report: &mut CycleReport) {
        let mut current: Option<String> = None;

        for peer in snapshot.peers.iter().filter(|p| p.exit_node_eligible) {
            let key = peer.display_key();
            let item = match self.exit_nodes.get(key) {
                Some(item) => item.clone(),
                None => {
                    let (item, rx) = self.menu.exit_node.add_child(
                        ItemSpec::new(key)
                            .tooltip(format!("Use {} as exit node", key))
                            .checkbox(false),
                    );
                    handlers::spawn_exit_node(self.ctx.clone(), key.to_string(), rx);
                    self.exit_nodes.insert(key, item.clone());
                    report.exit_nodes_created.push(key.to_string());
                    item
                }
            };
            item.set_checked(peer.exit_node_active);
            item.show();

            if peer.exit_node_active {
                // the client should never report more than one; keep the last
                if let Some(previous) = &current {
                    warn!("Multiple active exit nodes reported: {} and {}", previous, key);
                }
                current = Some(key.to_string());
            }
        }

        let eligible: HashSet<&str> = snapshot
            .peers
            .iter()
            .filter(|p| p.exit_node_eligible)
            .map(|p| p.display_key())
            .collect();
        self.exit_nodes.hide_absent(|key| eligible.contains(key));

        if current.is_some() {
            self.menu.disable_exit_node.show();
        } else {
            self.menu.disable_exit_node.hide();
        }
        report.current_exit_node = current;
    }

    fn reconcile_devices(&mut self, snapshot: &Snapshot, report: &mut CycleReport) {
        self.devices.begin_pass();

        for peer in &snapshot.peers {
            let key = peer.display_key();
            let address = peer.canonical_address();
            if self.devices.touch(key, address) {
                continue;
            }

            let parent = self.menu.device_parent(&peer.name);
            let (item, rx) = parent.add_child(ItemSpec::new(key).tooltip(key));
            let address_rx = self.devices.insert(key, item, address);
            handlers::spawn_device(self.ctx.clone(), key.to_string(), address_rx, rx);
            info!("Device {} joined the network ({})", key, address);
            report.created.push(key.to_string());
        }

        report.evicted = self.devices.evict_stale();
    }
}

fn render_toggle(item: &MenuItem, title: &str, state: ToggleState) {
    match state {
        ToggleState::Unknown => {
            item.set_title(format!("{} (unknown)", title));
            item.uncheck();
        }
        known => {
            item.set_title(title);
            item.set_checked(known.is_checked());
        }
    }
}
