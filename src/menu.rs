//! The fixed part of the tray menu.
//!
//! Peer entries are added under `my_devices`, `services` and `exit_node` by
//! the reconciler as peers appear.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::tray::{Icon, ItemSpec, MenuItem, Tray};
use crate::types::PeerName;

pub const DNS_TITLE: &str = "Use Tailscale DNS";
pub const ROUTES_TITLE: &str = "Use Tailscale Routes";

#[derive(Debug, Clone)]
pub struct Menu {
    pub connect: MenuItem,
    pub disconnect: MenuItem,
    pub this_device: MenuItem,
    pub my_devices: MenuItem,
    pub services: MenuItem,
    pub exit_node: MenuItem,
    pub disable_exit_node: MenuItem,
    pub dns: MenuItem,
    pub routes: MenuItem,
}

/// Activation channels of the fixed items.
pub struct Activations {
    pub connect: mpsc::Receiver<()>,
    pub disconnect: mpsc::Receiver<()>,
    pub this_device: mpsc::Receiver<()>,
    pub disable_exit_node: mpsc::Receiver<()>,
    pub dns: mpsc::Receiver<()>,
    pub routes: mpsc::Receiver<()>,
    pub admin_console: mpsc::Receiver<()>,
    pub quit: mpsc::Receiver<()>,
}

impl Menu {
    pub fn build(tray: &Arc<dyn Tray>) -> (Menu, Activations) {
        tray.set_icon(Icon::Off);

        let (connect, connect_rx) = MenuItem::top_level(tray, ItemSpec::new("Connect"));
        let (disconnect, disconnect_rx) = MenuItem::top_level(tray, ItemSpec::new("Disconnect"));
        disconnect.disable();

        tray.add_separator(None);

        let (this_device, this_device_rx) =
            MenuItem::top_level(tray, ItemSpec::new("This device:"));

        // Submenu headers are never activated; their receivers are dropped.
        let (network_devices, _) = MenuItem::top_level(tray, ItemSpec::new("Network Devices"));
        let (my_devices, _) = network_devices.add_child(ItemSpec::new("My Devices"));
        let (services, _) = network_devices.add_child(ItemSpec::new("Tailscale Services"));

        let (exit_node, _) = MenuItem::top_level(
            tray,
            ItemSpec::new("Exit Node").tooltip("Configure exit node"),
        );
        let (disable_exit_node, disable_exit_node_rx) = exit_node.add_child(
            ItemSpec::new("Disable Exit Node").tooltip("Disable all exit nodes"),
        );
        disable_exit_node.hide();

        let (dns, dns_rx) = MenuItem::top_level(
            tray,
            ItemSpec::new(DNS_TITLE)
                .tooltip("Enable or disable Tailscale DNS routing")
                .checkbox(false),
        );
        let (routes, routes_rx) = MenuItem::top_level(
            tray,
            ItemSpec::new(ROUTES_TITLE)
                .tooltip("Enable or disable Tailscale subnet routes")
                .checkbox(false),
        );

        tray.add_separator(None);
        let (_, admin_console_rx) = MenuItem::top_level(tray, ItemSpec::new("Admin Console..."));
        tray.add_separator(None);
        let (_, quit_rx) = MenuItem::top_level(tray, ItemSpec::new("Exit"));

        let menu = Menu {
            connect,
            disconnect,
            this_device,
            my_devices,
            services,
            exit_node,
            disable_exit_node,
            dns,
            routes,
        };
        let activations = Activations {
            connect: connect_rx,
            disconnect: disconnect_rx,
            this_device: this_device_rx,
            disable_exit_node: disable_exit_node_rx,
            dns: dns_rx,
            routes: routes_rx,
            admin_console: admin_console_rx,
            quit: quit_rx,
        };
        (menu, activations)
    }

    /// Submenu that lists devices with this kind of name.
    pub fn device_parent(&self, name: &PeerName) -> &MenuItem {
        match name {
            PeerName::AddressNamed(_) => &self.my_devices,
            PeerName::HostNamed(_) => &self.services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tray::HeadlessTray;

    #[test]
    fn test_initial_layout() {
        let headless = Arc::new(HeadlessTray::new());
        let tray: Arc<dyn Tray> = headless.clone();
        let (menu, _activations) = Menu::build(&tray);

        assert_eq!(headless.icon(), Icon::Off);
        assert!(headless.item(menu.connect.id()).unwrap().enabled);
        assert!(!headless.item(menu.disconnect.id()).unwrap().enabled);
        assert!(!headless.item(menu.disable_exit_node.id()).unwrap().visible);
        assert!(headless.item(menu.dns.id()).unwrap().checkable);
        assert_eq!(headless.find("Admin Console...").len(), 1);
        assert_eq!(headless.find("Exit").len(), 1);

        assert_eq!(
            menu.device_parent(&PeerName::AddressNamed("a".into())).id(),
            menu.my_devices.id()
        );
        assert_eq!(
            menu.device_parent(&PeerName::HostNamed("a".into())).id(),
            menu.services.id()
        );
    }
}
