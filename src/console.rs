//! Line-based driver for the headless tray.
//!
//! `menu` prints the visible menu, `status` the icon and tooltip; any other
//! line activates the visible, enabled item with exactly that title.

use std::sync::Arc;

use log::warn;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::tray::HeadlessTray;

pub async fn run(tray: Arc<HeadlessTray>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "menu" => print!("{}", tray.render()),
            "status" => println!("{}", tray.summary()),
            title => {
                if !tray.activate(title) {
                    warn!("No active menu item titled {:?}", title);
                }
            }
        }
    }
    Ok(())
}
