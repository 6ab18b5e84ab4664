//! Writes each Windowed Count as one JSON line. Default consumer when no endpoint is set.

use super::{MetricsConsumer, SinkError};
use crate::logging::StructuredLogger;
use crate::window::WindowedCount;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

pub struct LineConsumer<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineConsumer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LineConsumer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> MetricsConsumer for LineConsumer<W> {
    async fn publish(&self, count: &WindowedCount) -> Result<(), SinkError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| SinkError::Io(std::io::Error::other("line consumer poisoned")))?;
        StructuredLogger::emit_json(count, &mut *out)?;
        out.flush()?;
        Ok(())
    }
}
