//! Bus-monitor style traffic capture via a [`CecLink`](crate::CecLink) wrapper.
//!
//! [`CapturingLink`] wraps any link and appends one line per frame to a
//! writer, in the `<< 04:83` / `>> 4f:84:10:00:04` notation CEC bus monitors
//! print, prefixed with milliseconds since the capture started. Failed
//! transmissions carry their delivery status.
//!
//! ```no_run
//! # use rustcec_link::capture::CapturingLink;
//! # use rustcec_link::VirtualBus;
//! # use rustcec_core::types::LogicalAddress;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = VirtualBus::new();
//! let link = bus.attach(LogicalAddress::Tv).await?;
//! let capturing = CapturingLink::to_file(link, "traffic.log")?;
//! // Use `capturing` as your CecLink; all traffic is logged.
//! # Ok(())
//! # }
//! ```

use crate::{CecLink, LinkError, SendResult};
use rustcec_core::CecMessage;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Direction of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    const fn marker(self) -> &'static str {
        match self {
            Self::In => ">>",
            Self::Out => "<<",
        }
    }
}

struct TrafficWriter<W: Write + Send> {
    inner: W,
    started: Instant,
}

impl<W: Write + Send> TrafficWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            started: Instant::now(),
        }
    }

    fn write_frame(
        &mut self,
        direction: Direction,
        message: &CecMessage,
        status: Option<SendResult>,
    ) -> io::Result<()> {
        let elapsed = self.started.elapsed().as_millis();
        write!(self.inner, "[{elapsed:>8}] {} {message}", direction.marker())?;
        match status {
            Some(SendResult::Success) | None => {}
            Some(SendResult::Nack) => write!(self.inner, " (nack)")?,
            Some(SendResult::Busy) => write!(self.inner, " (busy)")?,
            Some(SendResult::Failed) => write!(self.inner, " (failed)")?,
        }
        writeln!(self.inner)?;
        self.inner.flush()
    }
}

/// A [`CecLink`] wrapper that logs all frames to a writer.
pub struct CapturingLink<L: CecLink, W: Write + Send = io::BufWriter<std::fs::File>> {
    inner: L,
    writer: Arc<Mutex<TrafficWriter<W>>>,
}

impl<L: CecLink> CapturingLink<L> {
    /// Create a capturing wrapper that writes traffic to the given file path.
    pub fn to_file(inner: L, path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::with_writer(inner, io::BufWriter::new(file)))
    }
}

impl<L: CecLink, W: Write + Send> CapturingLink<L, W> {
    pub fn with_writer(inner: L, writer: W) -> Self {
        Self {
            inner,
            writer: Arc::new(Mutex::new(TrafficWriter::new(writer))),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: CecLink, W: Write + Send> CecLink for CapturingLink<L, W> {
    async fn send(&self, message: &CecMessage) -> Result<(), LinkError> {
        let outcome = self.inner.send(message).await;
        {
            let mut w = self.writer.lock().await;
            if let Err(err) = w.write_frame(
                Direction::Out,
                message,
                Some(SendResult::from_outcome(&outcome)),
            ) {
                log::debug!("traffic capture write failed: {err}");
            }
        }
        outcome
    }

    async fn recv(&self) -> Result<CecMessage, LinkError> {
        let message = self.inner.recv().await?;
        {
            let mut w = self.writer.lock().await;
            if let Err(err) = w.write_frame(Direction::In, &message, None) {
                log::debug!("traffic capture write failed: {err}");
            }
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustcec_core::types::LogicalAddress;

    #[test]
    fn writes_monitor_notation() {
        let mut buf = Vec::new();
        let mut writer = TrafficWriter::new(&mut buf);
        let query =
            CecMessage::give_physical_address(LogicalAddress::Tv, LogicalAddress::Playback1);
        writer
            .write_frame(Direction::Out, &query, Some(SendResult::Nack))
            .unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.ends_with("<< 04:83 (nack)\n"), "{line}");
    }

    #[tokio::test]
    async fn wrapper_records_both_directions() {
        let bus = crate::VirtualBus::new();
        let tv = bus.attach(LogicalAddress::Tv).await.unwrap();
        let player = bus.attach(LogicalAddress::Playback1).await.unwrap();
        let capturing = CapturingLink::with_writer(tv, Vec::new());

        capturing
            .send(&CecMessage::give_osd_name(
                LogicalAddress::Tv,
                LogicalAddress::Playback1,
            ))
            .await
            .unwrap();
        player
            .send(&CecMessage::set_osd_name(
                LogicalAddress::Playback1,
                LogicalAddress::Tv,
                "BD",
            ))
            .await
            .unwrap();
        capturing.recv().await.unwrap();

        let w = capturing.writer.lock().await;
        let text = String::from_utf8(w.inner.clone()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("<< 04:46"));
        assert!(lines[1].ends_with(">> 40:47:42:44"));
    }
}
