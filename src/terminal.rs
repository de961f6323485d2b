//! Terminal front end: chat log and entry line on stdio.
//!
//! Prints session events with wall-clock timestamps and feeds typed lines
//! into the session. All presentation policy lives here; the session core
//! only hands over events.

use chrono::Local;
use log::debug;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::error::ChatError;
use crate::event::{ChatEvent, EventRx};
use crate::manager::ChatManager;

fn stamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::Inbound(text) => println!("[{}] peer: {text}", stamp()),
        ChatEvent::Notice(text) => println!("[{}] [system] {text}", stamp()),
        ChatEvent::Error(text) => eprintln!("[{}] [error] {text}", stamp()),
    }
}

/// Drains session events onto the terminal until the channel closes.
pub async fn event_printer(mut events: EventRx) {
    while let Some(event) = events.recv().await {
        print_event(&event);
    }
}

/// Reads lines from stdin and sends each one to the peer.
///
/// Returns on stdin EOF, on `/quit`, or once the session is gone. Blank
/// lines are dropped without comment, matching a chat box that ignores an
/// empty submit.
pub async fn input_loop(manager: &ChatManager) {
    let mut lines = BufReader::new(stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim() == "/quit" {
                    break;
                }
                match manager.send(&line).await {
                    Ok(()) => println!("[{}] me: {}", stamp(), line.trim()),
                    Err(ChatError::Empty) => {}
                    Err(ChatError::NotConnected) => {
                        println!("[{}] [system] not connected", stamp());
                        break;
                    }
                    Err(err) => {
                        eprintln!("[{}] [error] {err}", stamp());
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!("stdin closed with an error: {err}");
                break;
            }
        }
    }
}
