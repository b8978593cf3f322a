//! Presentation boundary.
//!
//! A [`Tray`] owns a tree of menu items.  Each item created through
//! [`Tray::add_item`] comes with the receiving half of its activation
//! channel; the tray keeps the sending half.  Removing an item, or closing
//! the tray, drops that sender so the item's listener sees `None` from
//! `recv()` and exits.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

pub mod headless;
pub use headless::HeadlessTray;

/// Identifier of an item within one tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u64);

/// Tray icon variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Off,
    On,
    OnWithExitNode,
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Icon::Off => "off",
            Icon::On => "on",
            Icon::OnWithExitNode => "on-with-exit-node",
        };
        f.write_str(name)
    }
}

/// Initial description of a menu item.
#[derive(Debug, Clone, Default)]
pub struct ItemSpec {
    pub title: String,
    pub tooltip: String,
    pub checkable: bool,
    pub checked: bool,
}

impl ItemSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = tooltip.into();
        self
    }

    pub fn checkbox(mut self, checked: bool) -> Self {
        self.checkable = true;
        self.checked = checked;
        self
    }
}

/// A change to an existing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemChange {
    Title(String),
    Checked(bool),
    Visible(bool),
    Enabled(bool),
}

pub trait Tray: Send + Sync {
    fn set_icon(&self, icon: Icon);

    fn set_tooltip(&self, tooltip: &str);

    /// Create an item under `parent`, or at the top level.
    fn add_item(&self, parent: Option<ItemId>, spec: ItemSpec) -> (ItemId, mpsc::Receiver<()>);

    fn add_separator(&self, parent: Option<ItemId>);

    fn update(&self, id: ItemId, change: ItemChange);

    /// Remove the item and close its activation channel.
    fn remove(&self, id: ItemId);

    fn is_checked(&self, id: ItemId) -> bool;

    /// Close every activation channel.  Used on shutdown.
    fn close(&self);
}

/// Handle to one item of a tray.
#[derive(Clone)]
pub struct MenuItem {
    id: ItemId,
    tray: Arc<dyn Tray>,
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MenuItem").field(&self.id).finish()
    }
}

impl MenuItem {
    pub fn top_level(tray: &Arc<dyn Tray>, spec: ItemSpec) -> (Self, mpsc::Receiver<()>) {
        let (id, rx) = tray.add_item(None, spec);
        (
            Self {
                id,
                tray: Arc::clone(tray),
            },
            rx,
        )
    }

    pub fn add_child(&self, spec: ItemSpec) -> (Self, mpsc::Receiver<()>) {
        let (id, rx) = self.tray.add_item(Some(self.id), spec);
        (
            Self {
                id,
                tray: Arc::clone(&self.tray),
            },
            rx,
        )
    }

    #[cfg(test)]
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.tray.update(self.id, ItemChange::Title(title.into()));
    }

    pub fn set_checked(&self, checked: bool) {
        self.tray.update(self.id, ItemChange::Checked(checked));
    }

    pub fn uncheck(&self) {
        self.set_checked(false);
    }

    pub fn is_checked(&self) -> bool {
        self.tray.is_checked(self.id)
    }

    pub fn show(&self) {
        self.tray.update(self.id, ItemChange::Visible(true));
    }

    pub fn hide(&self) {
        self.tray.update(self.id, ItemChange::Visible(false));
    }

    pub fn enable(&self) {
        self.tray.update(self.id, ItemChange::Enabled(true));
    }

    pub fn disable(&self) {
        self.tray.update(self.id, ItemChange::Enabled(false));
    }

    pub fn remove(&self) {
        self.tray.remove(self.id);
    }
}
