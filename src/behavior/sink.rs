//! Batch delivery sinks
//!
//! A sink receives each flushed [`Batch`]. Delivery is fire-and-forget: the
//! ledger logs a failed delivery and moves on.

use crate::behavior::types::Batch;
use crate::error::SinkError;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use tracing::info;

pub trait BatchSink {
    fn deliver(&mut self, batch: &Batch) -> Result<(), SinkError>;
}

impl<F> BatchSink for F
where
    F: FnMut(&Batch) -> Result<(), SinkError>,
{
    fn deliver(&mut self, batch: &Batch) -> Result<(), SinkError> {
        self(batch)
    }
}

/// Logs a one-line summary per batch
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl BatchSink for LogSink {
    fn deliver(&mut self, batch: &Batch) -> Result<(), SinkError> {
        info!(
            batch_id = %batch.id,
            session_id = %batch.session_id,
            events = batch.event_count(),
            trigger = %batch.trigger,
            "batch delivered"
        );
        Ok(())
    }
}

/// Writes each batch as one JSON line
#[derive(Debug)]
pub struct NdjsonSink<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BatchSink for NdjsonSink<W> {
    fn deliver(&mut self, batch: &Batch) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, batch)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects batches in memory; clones share the buffer
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    batches: Rc<RefCell<Vec<Batch>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.borrow().clone()
    }

    /// Remove and return everything delivered so far
    pub fn drain(&self) -> Vec<Batch> {
        std::mem::take(&mut *self.batches.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.batches.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.borrow().is_empty()
    }
}

impl BatchSink for BufferSink {
    fn deliver(&mut self, batch: &Batch) -> Result<(), SinkError> {
        self.batches.borrow_mut().push(batch.clone());
        Ok(())
    }
}
