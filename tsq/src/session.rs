use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::broadcast,
};
use tsq_common::{Signal, internal, outgoing};
use tsq_tracing::traced;

use crate::{
    action::DispatchError,
    dispatcher::{self, Dispatcher},
};

/// A line-driven conversation with an operator
///
/// Each line read is one action; its outcome is written back as one line.
/// Blank lines are skipped, and a line that is not UTF-8 is answered with an
/// error like any other bad action. The session ends at end of input or when a
/// [`Signal::Shutdown`] is broadcast.
#[derive(Debug)]
pub struct Session<'a, R, W> {
    dispatcher: &'a Dispatcher,
    reader: R,
    writer: W,
}

impl<'a, R, W> Session<'a, R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub const fn new(dispatcher: &'a Dispatcher, reader: R, writer: W) -> Self {
        Self {
            dispatcher,
            reader,
            writer,
        }
    }

    /// Run the session until input ends or a shutdown is signalled, returning
    /// the number of actions handled.
    ///
    /// # Errors
    /// If reading from or writing to the operator fails
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "ms"))]
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<Signal>) -> std::io::Result<usize> {
        let mut handled = 0;
        let mut line = Vec::new();

        loop {
            line.clear();

            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(level = INFO, "Session received shutdown signal");
                        break;
                    }
                }

                read = self.reader.read_until(b'\n', &mut line) => {
                    if read? == 0 {
                        internal!("End of input");
                        break;
                    }

                    let outcome = match std::str::from_utf8(&line) {
                        Ok(action) if action.trim().is_empty() => continue,
                        Ok(action) => self.dispatcher.dispatch(action).await,
                        Err(e) => Err(DispatchError::from(e)),
                    };

                    let reply = dispatcher::render(&outcome);
                    outgoing!("{reply}");

                    self.writer.write_all(reply.as_bytes()).await?;
                    self.writer.write_all(b"\n").await?;
                    self.writer.flush().await?;
                    handled += 1;
                }
            }
        }

        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tokio::io::BufReader;
    use tsq_storage::InMemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_session_replies_line_per_action() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .bind(Arc::new(InMemoryStore::new()))
            .await
            .unwrap();

        let input = "PUT hello\n\nPUT world\nGET 2\nGET 3\nFETCH 1\n";
        let mut output = Vec::new();
        let (_tx, rx) = broadcast::channel(1);

        let handled = Session::new(&dispatcher, BufReader::new(input.as_bytes()), &mut output)
            .run(rx)
            .await
            .unwrap();

        assert_eq!(handled, 5);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            " - Created: 1\n - Created: 2\n - world\n \
             - Record 3 is out of range for a store of 2 records\n \
             - Invalid argument: FETCH\n"
        );
    }

    #[tokio::test]
    async fn test_session_survives_non_utf8_line() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .bind(Arc::new(InMemoryStore::new()))
            .await
            .unwrap();

        let input: &[u8] = b"PUT a\nPUT \xff\xfe\nPUT b\nGET 2\n";
        let mut output = Vec::new();
        let (_tx, rx) = broadcast::channel(1);

        let handled = Session::new(&dispatcher, BufReader::new(input), &mut output)
            .run(rx)
            .await
            .unwrap();

        assert_eq!(handled, 4);
        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], " - Created: 1");
        assert!(lines[1].starts_with(" - Invalid input: "), "{}", lines[1]);
        assert_eq!(&lines[2..], &[" - Created: 2", " - b"]);
    }

    #[tokio::test]
    async fn test_session_stops_on_shutdown() {
        let dispatcher = Dispatcher::new();
        let (reader, _keep_open) = tokio::io::duplex(64);
        let (tx, rx) = broadcast::channel(1);
        let mut output = Vec::new();

        tx.send(Signal::Shutdown).unwrap();
        let handled = Session::new(&dispatcher, BufReader::new(reader), &mut output)
            .run(rx)
            .await
            .unwrap();

        assert_eq!(handled, 0);
        assert!(output.is_empty());
    }
}
