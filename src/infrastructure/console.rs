//! Console bridge for the host build.
//!
//! Plays the central side of the UART link: every stdin line is written to
//! the device as one burst, and every frame the device sends is printed as
//! one stdout line.
//!
//! Stdin is read on a plain OS thread. Tokio's stdin runs on a blocking pool
//! thread that the runtime waits for on shutdown, so a read parked on an
//! interactive terminal would keep the process alive after Ctrl-C. The
//! reader thread is detached and never joined.

use crate::domain::models::LinkEvent;
use crate::infrastructure::bluetooth::protocol::HCI_REMOTE_USER_TERMINATED;
use crate::infrastructure::bluetooth::UartInput;
use std::io::BufRead;
use std::thread;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Peer name reported for the console central
pub const CONSOLE_PEER_NAME: &str = "console";

/// Connect as a central and forward stdin lines until EOF
pub fn spawn_stdin_reader(
    input: mpsc::UnboundedSender<UartInput>,
) -> std::io::Result<thread::JoinHandle<()>> {
    spawn_line_reader(std::io::BufReader::new(std::io::stdin()), input)
}

/// Forward lines from `reader` on a dedicated thread
pub fn spawn_line_reader<R>(
    reader: R,
    input: mpsc::UnboundedSender<UartInput>,
) -> std::io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || forward_lines(reader, &input))
}

fn forward_lines<R: BufRead>(reader: R, input: &mpsc::UnboundedSender<UartInput>) {
    let connected = UartInput::Link(LinkEvent::Connected {
        peer_name: CONSOLE_PEER_NAME.to_string(),
    });
    if input.send(connected).is_err() {
        return;
    }

    for line in reader.lines() {
        match line {
            Ok(line) => {
                debug!("Console input: {:?}", line);
                if input.send(UartInput::Bytes(line.into_bytes())).is_err() {
                    // Device side is gone
                    return;
                }
            }
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        }
    }
    info!("Console input closed");

    let _ = input.send(UartInput::Link(LinkEvent::Disconnected {
        reason: HCI_REMOTE_USER_TERMINATED,
    }));
}

/// Print each received frame on its own stdout line
pub fn spawn_stdout_writer(mut frames: mpsc::UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(mut frame) = frames.recv().await {
            frame.push(b'\n');
            if let Err(e) = stdout.write_all(&frame).await {
                error!("Failed to write frame to stdout: {}", e);
                break;
            }
            if let Err(e) = stdout.flush().await {
                error!("Failed to flush stdout: {}", e);
                break;
            }
        }
    })
}
