use super::{Icon, ItemChange, ItemId, ItemSpec, Tray};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Pending activations per item before further clicks are dropped.
const ACTIVATION_BUFFER: usize = 8;

/// Read-only view of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub title: String,
    pub checkable: bool,
    pub checked: bool,
    pub visible: bool,
    pub enabled: bool,
}

struct Entry {
    view: ItemView,
    separator: bool,
    activate: Option<mpsc::Sender<()>>,
}

struct Inner {
    next_id: u64,
    items: BTreeMap<ItemId, Entry>,
    icon: Icon,
    tooltip: String,
    created: usize,
    removed: usize,
    hidden: usize,
}

/// In-memory [`Tray`] that logs every change.
///
/// Used when no desktop tray is available and as the inspection surface for
/// tests.  Items can be activated by title, which is what the stdin console
/// does.
pub struct HeadlessTray {
    inner: Mutex<Inner>,
}

impl Default for HeadlessTray {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessTray {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                items: BTreeMap::new(),
                icon: Icon::Off,
                tooltip: String::new(),
                created: 0,
                removed: 0,
                hidden: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn icon(&self) -> Icon {
        self.lock().icon
    }

    #[cfg(test)]
    pub fn tooltip(&self) -> String {
        self.lock().tooltip.clone()
    }

    #[cfg(test)]
    pub fn item(&self, id: ItemId) -> Option<ItemView> {
        self.lock().items.get(&id).map(|e| e.view.clone())
    }

    /// All items with the given title, in creation order.
    #[cfg(test)]
    pub fn find(&self, title: &str) -> Vec<ItemView> {
        self.lock()
            .items
            .values()
            .filter(|e| !e.separator && e.view.title == title)
            .map(|e| e.view.clone())
            .collect()
    }

    #[cfg(test)]
    pub fn children(&self, parent: ItemId) -> Vec<ItemView> {
        self.lock()
            .items
            .values()
            .filter(|e| !e.separator && e.view.parent == Some(parent))
            .map(|e| e.view.clone())
            .collect()
    }

    /// Number of items created so far, separators excluded.
    #[cfg(test)]
    pub fn created_count(&self) -> usize {
        self.lock().created
    }

    #[cfg(test)]
    pub fn removed_count(&self) -> usize {
        self.lock().removed
    }

    /// Number of visible-to-hidden transitions so far.
    #[cfg(test)]
    pub fn hidden_count(&self) -> usize {
        self.lock().hidden
    }

    /// Activate the first visible, enabled item titled `title`.
    pub fn activate(&self, title: &str) -> bool {
        let inner = self.lock();
        let target = inner.items.values().find(|e| {
            !e.separator && e.view.visible && e.view.enabled && e.view.title == title
        });
        match target.and_then(|e| e.activate.as_ref()) {
            Some(tx) => {
                if tx.try_send(()).is_err() {
                    debug!("Dropped activation of {:?}", title);
                }
                true
            }
            None => false,
        }
    }

    /// One-line description of the tray state.
    pub fn summary(&self) -> String {
        let inner = self.lock();
        format!(
            "icon {}, {:?}, {} items created, {} hidden, {} removed",
            inner.icon, inner.tooltip, inner.created, inner.hidden, inner.removed
        )
    }

    /// Render the visible menu as an indented text tree.
    pub fn render(&self) -> String {
        let inner = self.lock();
        let mut out = String::new();
        render_level(&inner, None, 0, &mut out);
        out
    }
}

fn render_level(inner: &Inner, parent: Option<ItemId>, depth: usize, out: &mut String) {
    for entry in inner.items.values() {
        if entry.view.parent != parent || !entry.view.visible {
            continue;
        }
        let indent = "  ".repeat(depth);
        if entry.separator {
            let _ = writeln!(out, "{indent}----");
            continue;
        }
        let mark = match (entry.view.checkable, entry.view.checked) {
            (true, true) => "[x] ",
            (true, false) => "[ ] ",
            _ => "",
        };
        let disabled = if entry.view.enabled { "" } else { " (disabled)" };
        let _ = writeln!(out, "{indent}{mark}{}{disabled}", entry.view.title);
        render_level(inner, Some(entry.view.id), depth + 1, out);
    }
}

impl Tray for HeadlessTray {
    fn set_icon(&self, icon: Icon) {
        let mut inner = self.lock();
        if inner.icon != icon {
            info!("Tray icon: {}", icon);
            inner.icon = icon;
        }
    }

    fn set_tooltip(&self, tooltip: &str) {
        self.lock().tooltip = tooltip.to_string();
    }

    fn add_item(&self, parent: Option<ItemId>, spec: ItemSpec) -> (ItemId, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(ACTIVATION_BUFFER);
        let mut inner = self.lock();
        let id = ItemId(inner.next_id);
        inner.next_id += 1;
        inner.created += 1;
        debug!("Menu item {:?} added: {:?} ({})", id, spec.title, spec.tooltip);
        inner.items.insert(
            id,
            Entry {
                view: ItemView {
                    id,
                    parent,
                    title: spec.title,
                    checkable: spec.checkable,
                    checked: spec.checked,
                    visible: true,
                    enabled: true,
                },
                separator: false,
                activate: Some(tx),
            },
        );
        (id, rx)
    }

    fn add_separator(&self, parent: Option<ItemId>) {
        let mut inner = self.lock();
        let id = ItemId(inner.next_id);
        inner.next_id += 1;
        inner.items.insert(
            id,
            Entry {
                view: ItemView {
                    id,
                    parent,
                    title: String::new(),
                    checkable: false,
                    checked: false,
                    visible: true,
                    enabled: false,
                },
                separator: true,
                activate: None,
            },
        );
    }

    fn update(&self, id: ItemId, change: ItemChange) {
        let mut inner = self.lock();
        let Some(entry) = inner.items.get_mut(&id) else {
            debug!("Ignoring {:?} for removed item {:?}", change, id);
            return;
        };
        let mut newly_hidden = false;
        match change {
            ItemChange::Title(title) => entry.view.title = title,
            ItemChange::Checked(checked) => entry.view.checked = checked,
            ItemChange::Visible(visible) => {
                newly_hidden = entry.view.visible && !visible;
                entry.view.visible = visible;
            }
            ItemChange::Enabled(enabled) => entry.view.enabled = enabled,
        }
        if newly_hidden {
            inner.hidden += 1;
        }
    }

    fn remove(&self, id: ItemId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.items.remove(&id) {
            debug!("Menu item {:?} removed: {:?}", id, entry.view.title);
            inner.removed += 1;
        }
    }

    fn is_checked(&self, id: ItemId) -> bool {
        self.lock().items.get(&id).is_some_and(|e| e.view.checked)
    }

    fn close(&self) {
        let mut inner = self.lock();
        for entry in inner.items.values_mut() {
            entry.activate = None;
        }
    }
}
