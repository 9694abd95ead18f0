use lexmask_core::{Display, Screen};
use lexmask_experiment::InputHub;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Prints each screen once, when it first becomes visible.
pub struct ConsoleDisplay<W: Write + Send> {
    out: W,
    current: Option<Screen>,
}

impl ConsoleDisplay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out, current: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Display for ConsoleDisplay<W> {
    fn present(&mut self, screen: &Screen) {
        if self.current.as_ref() == Some(screen) {
            return;
        }
        self.current = Some(screen.clone());
        let text = screen.text();
        let written = if text.is_empty() {
            writeln!(self.out)
        } else {
            writeln!(self.out, "{text}")
        };
        if written.and_then(|()| self.out.flush()).is_err() {
            debug!("console output closed");
        }
    }
}

/// Publishes each input line as one input identifier. End of input cancels
/// the session.
pub fn spawn_line_input<R>(reader: R, hub: InputHub, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let id = line.trim();
                        if !id.is_empty() {
                            hub.publish(id);
                        }
                    }
                    Ok(None) | Err(_) => {
                        debug!("input closed");
                        cancel.cancel();
                        break;
                    }
                },
            }
        }
    })
}

pub fn spawn_stdin_input(hub: InputHub, cancel: CancellationToken) -> JoinHandle<()> {
    spawn_line_input(BufReader::new(tokio::io::stdin()), hub, cancel)
}
