
use std::{io, thread};

use inotify::{EventMask, Inotify, WatchMask};
use tokio::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Create { name: String, base_path: String },
    Delete { name: String, base_path: String },
}

/// Start watching for files being created or deleted in the given directory,
/// sending [WatchEvent] to the given channel from a detached thread. The
/// watch is in place when this returns. The thread exits once the receiver
/// is dropped and the next event arrives, and never keeps the process alive.
pub fn spawn(path: String, tx: Sender<WatchEvent>) -> Result<thread::JoinHandle<()>, io::Error> {
    let inotify = Inotify::init()?;
    inotify
        .watches()
        .add(path.clone(), WatchMask::CREATE | WatchMask::DELETE)?;
    log::debug!("Watching {path} for changes");

    thread::Builder::new()
        .name("ds-watcher".to_string())
        .spawn(move || {
            if let Err(e) = watch(inotify, &path, tx) {
                log::error!("Stopped watching {path}: {e}");
            }
        })
}

/// Blocks until the receiver is dropped
fn watch(mut inotify: Inotify, path: &str, tx: Sender<WatchEvent>) -> Result<(), io::Error> {
    let mut buffer = [0u8; 4096];
    loop {
        let events = inotify.read_events_blocking(&mut buffer)?;

        for event in events {
            let Some(name) = event.name.and_then(|name| name.to_str()) else {
                continue;
            };
            let name = name.to_string();

            let value = if event.mask.contains(EventMask::CREATE) {
                log::debug!("inotify CREATE: {name}");
                WatchEvent::Create {
                    name,
                    base_path: path.to_string(),
                }
            } else if event.mask.contains(EventMask::DELETE) {
                log::debug!("inotify DELETE: {name}");
                WatchEvent::Delete {
                    name,
                    base_path: path.to_string(),
                }
            } else {
                continue;
            };

            if tx.blocking_send(value).is_err() {
                log::debug!("Watch receiver for {path} closed");
                return Ok(());
            }
        }
    }
}
