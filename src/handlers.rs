//! Listeners for menu activations.
//!
//! Every interactive item gets one listener task that lives until the item's
//! activation channel closes.  Mutating commands run in their own detached
//! task so a slow `tailscale` invocation never blocks the listener; repeated
//! clicks are neither queued nor debounced.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::{ClientCommand, NetworkClient};
use crate::desktop::Desktop;
use crate::menu::{Activations, Menu};
use crate::reconciler::{ReconcileHandle, SharedAddress};
use crate::tray::MenuItem;

const NOTIFY_TITLE: &str = "Tailscale";

/// Everything a listener needs besides its own item.
#[derive(Clone)]
pub struct HandlerContext {
    pub client: Arc<dyn NetworkClient>,
    pub desktop: Arc<dyn Desktop>,
    pub reconcile: ReconcileHandle,
    pub self_address: SharedAddress,
    pub shutdown: mpsc::Sender<()>,
    pub admin_url: String,
}

/// Preferences shown as checkboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Dns,
    Routes,
}

impl Toggle {
    fn command(self, enable: bool) -> ClientCommand {
        match self {
            Toggle::Dns => ClientCommand::AcceptDns(enable),
            Toggle::Routes => ClientCommand::AcceptRoutes(enable),
        }
    }

    fn failure(self) -> &'static str {
        match self {
            Toggle::Dns => "Failed to set DNS routing",
            Toggle::Routes => "Failed to set routes",
        }
    }
}

impl HandlerContext {
    /// Run `command` in a detached task, report a failure, then ask for a
    /// reconciliation cycle either way.
    fn dispatch(&self, command: ClientCommand, failure: Option<&'static str>) {
        let ctx = self.clone();
        tokio::spawn(async move {
            info!("Running tailscale {}", command);
            if let Err(e) = ctx.client.run(command.clone()).await {
                error!("tailscale {} failed: {}", command, e);
                let body = match failure {
                    Some(prefix) => format!("{}: {}", prefix, e),
                    None => e.to_string(),
                };
                ctx.desktop.notify(NOTIFY_TITLE, &body).await;
            }
            ctx.reconcile.request();
        });
    }
}

fn listen<F>(mut rx: mpsc::Receiver<()>, mut on_activate: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            on_activate();
        }
    })
}

/// Spawn the listeners of the fixed menu items.
///
/// Without the elevation helper the connect and disconnect items are hidden
/// and get no listener.
pub fn spawn_fixed(
    ctx: &HandlerContext,
    menu: &Menu,
    activations: Activations,
    privileged: bool,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if privileged {
        let up = ctx.clone();
        handles.push(listen(activations.connect, move || {
            up.dispatch(ClientCommand::Up, None)
        }));
        let down = ctx.clone();
        handles.push(listen(activations.disconnect, move || {
            down.dispatch(ClientCommand::Down, None)
        }));
    } else {
        warn!("Elevation helper not found, hiding connect and disconnect");
        menu.connect.hide();
        menu.disconnect.hide();
    }

    handles.push(spawn_this_device(ctx.clone(), activations.this_device));
    handles.push(spawn_toggle(
        ctx.clone(),
        Toggle::Dns,
        menu.dns.clone(),
        activations.dns,
    ));
    handles.push(spawn_toggle(
        ctx.clone(),
        Toggle::Routes,
        menu.routes.clone(),
        activations.routes,
    ));

    let disable = ctx.clone();
    handles.push(listen(activations.disable_exit_node, move || {
        disable.dispatch(ClientCommand::ExitNode(None), Some("Failed to disable exit node"))
    }));

    handles.push(spawn_admin_console(ctx.clone(), activations.admin_console));
    handles.push(spawn_quit(ctx.clone(), activations.quit));
    handles
}

/// Copy a peer's address on activation.
///
/// A clipboard failure is reported and ends the listener; the entry stays in
/// the menu but no longer reacts until it is evicted and recreated.
pub fn spawn_device(
    ctx: HandlerContext,
    title: String,
    address: watch::Receiver<String>,
    mut rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let ip = address.borrow().clone();
            if let Err(e) = ctx.desktop.copy_to_clipboard(&ip).await {
                error!("Failed to copy address of {}: {}", title, e);
                ctx.desktop.notify(NOTIFY_TITLE, &e.to_string()).await;
                return;
            }
            ctx.desktop
                .notify(
                    &title,
                    &format!("Copy the IP address ({}) to the Clipboard", ip),
                )
                .await;
        }
        debug!("Listener for {} closed", title);
    })
}

/// Copy the local address on activation.  Keeps listening after failures.
pub fn spawn_this_device(ctx: HandlerContext, mut rx: mpsc::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let Some(ip) = ctx.self_address.read().await.clone() else {
                debug!("Local address not known yet");
                continue;
            };
            match ctx.desktop.copy_to_clipboard(&ip).await {
                Ok(()) => {
                    ctx.desktop
                        .notify(
                            "This device",
                            &format!("Copy the IP address ({}) to the Clipboard", ip),
                        )
                        .await
                }
                Err(e) => {
                    error!("Failed to copy local address: {}", e);
                    ctx.desktop.notify(NOTIFY_TITLE, &e.to_string()).await;
                }
            }
        }
    })
}

/// Flip a preference.  The new value is the negation of what the checkbox
/// currently shows; the follow-up cycle corrects the display if the command
/// did not take effect.
pub fn spawn_toggle(
    ctx: HandlerContext,
    toggle: Toggle,
    item: MenuItem,
    rx: mpsc::Receiver<()>,
) -> JoinHandle<()> {
    listen(rx, move || {
        let enable = !item.is_checked();
        ctx.dispatch(toggle.command(enable), Some(toggle.failure()));
    })
}

/// Route traffic through the named peer on activation.
pub fn spawn_exit_node(ctx: HandlerContext, name: String, rx: mpsc::Receiver<()>) -> JoinHandle<()> {
    listen(rx, move || {
        ctx.dispatch(
            ClientCommand::ExitNode(Some(name.clone())),
            Some("Failed to set exit node"),
        );
    })
}

fn spawn_admin_console(ctx: HandlerContext, mut rx: mpsc::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            if let Err(e) = ctx.desktop.open_url(&ctx.admin_url).await {
                warn!("Could not open link: {}", e);
            }
        }
    })
}

fn spawn_quit(ctx: HandlerContext, mut rx: mpsc::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if rx.recv().await.is_some() {
            info!("Exit requested from the menu");
            let _ = ctx.shutdown.send(()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{DNS_TITLE, ROUTES_TITLE};
    use crate::testing::{node, peer, status, wait_until, Harness};
    use crate::types::ToggleState;

    #[tokio::test]
    async fn test_device_copies_current_address() {
        let h = Harness::new();
        let (tx, rx) = mpsc::channel(1);
        let (addr_tx, addr_rx) = watch::channel("100.0.0.2".to_string());
        let _listener = spawn_device(h.ctx.clone(), "host-b".into(), addr_rx, rx);

        tx.send(()).await.unwrap();
        wait_until(|| h.desktop.clipboard().len() == 1).await;
        wait_until(|| h.desktop.notifications().len() == 1).await;
        assert_eq!(
            h.desktop.notifications()[0],
            (
                "host-b".to_string(),
                "Copy the IP address (100.0.0.2) to the Clipboard".to_string()
            )
        );

        addr_tx.send("100.0.0.9".into()).unwrap();
        tx.send(()).await.unwrap();
        wait_until(|| h.desktop.clipboard().len() == 2).await;
        assert_eq!(h.desktop.clipboard()[1], "100.0.0.9");
    }

    #[tokio::test]
    async fn test_device_listener_stops_on_clipboard_failure() {
        let h = Harness::new();
        h.desktop.fail_clipboard(true);
        let (tx, rx) = mpsc::channel(1);
        let (_addr_tx, addr_rx) = watch::channel("100.0.0.2".to_string());
        let listener = spawn_device(h.ctx.clone(), "host-b".into(), addr_rx, rx);

        tx.send(()).await.unwrap();
        listener.await.unwrap();
        let notes = h.desktop.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "Tailscale");
        assert!(tx.send(()).await.is_err(), "listener is gone");
    }

    #[tokio::test]
    async fn test_this_device_keeps_listening_after_failure() {
        let h = Harness::new();
        let (tx, rx) = mpsc::channel(1);
        *h.ctx.self_address.write().await = Some("100.0.0.1".into());
        let listener = spawn_this_device(h.ctx.clone(), rx);

        h.desktop.fail_clipboard(true);
        tx.send(()).await.unwrap();
        wait_until(|| h.desktop.notifications().len() == 1).await;
        assert_eq!(h.desktop.notifications()[0].0, "Tailscale");

        h.desktop.fail_clipboard(false);
        tx.send(()).await.unwrap();
        wait_until(|| h.desktop.notifications().len() == 2).await;
        assert_eq!(h.desktop.notifications()[1].0, "This device");
        assert_eq!(h.desktop.clipboard(), vec!["100.0.0.1".to_string()]);

        drop(tx);
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_this_device_ignored_without_address() {
        let h = Harness::new();
        let (tx, rx) = mpsc::channel(1);
        let listener = spawn_this_device(h.ctx.clone(), rx);

        tx.send(()).await.unwrap();
        drop(tx);
        listener.await.unwrap();
        assert!(h.desktop.clipboard().is_empty());
        assert!(h.desktop.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_reports_raw_output() {
        let mut h = Harness::new();
        h.spawn_fixed(true);
        h.client.fail_commands(true);

        assert!(h.tray.activate("Connect"));
        wait_until(|| !h.desktop.notifications().is_empty()).await;
        assert_eq!(h.client.commands(), vec![ClientCommand::Up]);
        assert_eq!(
            h.desktop.notifications()[0],
            ("Tailscale".to_string(), "permission denied".to_string())
        );
        assert_eq!(h.triggers.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_unprivileged_hides_connection_items() {
        let mut h = Harness::new();
        h.spawn_fixed(false);

        assert!(!h.tray.item(h.menu.connect.id()).unwrap().visible);
        assert!(!h.tray.item(h.menu.disconnect.id()).unwrap().visible);
        assert!(!h.tray.activate("Connect"));
    }

    #[tokio::test]
    async fn test_toggle_negates_displayed_state() {
        let mut h = Harness::new();
        h.spawn_fixed(true);

        h.menu.routes.set_checked(true);
        assert!(h.tray.activate(ROUTES_TITLE));
        wait_until(|| !h.client.commands().is_empty()).await;
        assert_eq!(h.client.commands(), vec![ClientCommand::AcceptRoutes(false)]);
        assert_eq!(h.triggers.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_dns_toggle_self_heals_after_failed_set() {
        let mut h = Harness::new();
        h.client
            .set_status(status(true, node("host-a", "100.0.0.1"), vec![]));
        h.client.set_dns(Some(ToggleState::Disabled));
        let mut reconciler = h.reconciler();
        reconciler.run_cycle().await;
        assert!(!h.menu.dns.is_checked());

        h.spawn_fixed(true);
        h.client.fail_commands(true);
        assert!(h.tray.activate(DNS_TITLE));

        assert_eq!(h.triggers.recv().await, Some(()));
        assert_eq!(h.client.commands(), vec![ClientCommand::AcceptDns(true)]);
        assert_eq!(
            h.desktop.notifications()[0].1,
            "Failed to set DNS routing: permission denied"
        );

        reconciler.run_cycle().await;
        assert!(!h.menu.dns.is_checked(), "display follows the real state");
        assert_eq!(h.tray.item(h.menu.dns.id()).unwrap().title, DNS_TITLE);
    }

    #[tokio::test]
    async fn test_exit_node_selection_and_disable() {
        let mut h = Harness::new();
        h.client.set_status(status(
            true,
            node("host-a", "100.0.0.1"),
            vec![peer("host-b", "100.0.0.2", true, true)],
        ));
        let mut reconciler = h.reconciler();
        reconciler.run_cycle().await;
        h.spawn_fixed(true);

        assert!(h.tray.activate("host-b"), "exit node entry comes first");
        assert_eq!(h.triggers.recv().await, Some(()));
        assert!(h.tray.activate("Disable Exit Node"));
        assert_eq!(h.triggers.recv().await, Some(()));

        wait_until(|| h.client.commands().len() == 2).await;
        assert_eq!(
            h.client.commands(),
            vec![
                ClientCommand::ExitNode(Some("host-b".into())),
                ClientCommand::ExitNode(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_admin_console_and_quit() {
        let mut h = Harness::new();
        h.spawn_fixed(true);

        assert!(h.tray.activate("Admin Console..."));
        wait_until(|| !h.desktop.opened().is_empty()).await;
        assert_eq!(h.desktop.opened(), vec![h.ctx.admin_url.clone()]);

        assert!(h.tray.activate("Exit"));
        assert_eq!(h.shutdown.recv().await, Some(()));
    }
}
