//! Demultiplex / arbitrated-merge fabric.
//!
//! Each inbound stream (work requests, verified packets, DMA read and
//! write completions) fans out to per-slot channels keyed on the
//! destination QPN; each outbound merge (egress packets, DMA requests)
//! folds per-slot channels into one shared stream under round-robin
//! arbitration. Within one connection's own channel, FIFO order is
//! preserved end to end.

use crate::arbiter::RoundRobinArbiter;
use crate::channel::{Receiver, Sender, TryRecvError};
use crate::table::ConnectionTable;
use crate::DatapathError;

/// Content-addressed fan-out: one output channel per table slot.
#[derive(Debug)]
pub struct Demux<T> {
    outputs: Vec<Sender<T>>,
}

impl<T> Demux<T> {
    pub fn new(outputs: Vec<Sender<T>>) -> Self {
        Demux { outputs }
    }

    /// Deliver `item` to the slot the table maps `key` to. Upstream
    /// filtering is supposed to guarantee a match; a miss is a wiring
    /// bug surfaced as an error rather than silent misdelivery.
    pub fn route(&mut self, key: u32, table: &ConnectionTable, item: T) -> Result<(), DatapathError> {
        let slot = table.lookup(key).ok_or(DatapathError::NoMatchingSlot(key))?;
        self.forward(slot, item)
    }

    /// Deliver `item` to an already-resolved slot.
    pub fn forward(&mut self, slot: usize, item: T) -> Result<(), DatapathError> {
        self.outputs[slot].send(item)?;
        Ok(())
    }
}

/// N-to-1 merge under round-robin arbitration. Never drops, only
/// delays; a multi-part item holds the output via the fragment lock.
#[derive(Debug)]
pub struct ArbitratedMerge<T> {
    inputs: Vec<Receiver<T>>,
    arbiter: RoundRobinArbiter,
    ready: Vec<bool>,
}

impl<T> ArbitratedMerge<T> {
    pub fn new(inputs: Vec<Receiver<T>>) -> Self {
        let n = inputs.len();
        ArbitratedMerge {
            inputs,
            arbiter: RoundRobinArbiter::new(n),
            ready: vec![false; n],
        }
    }

    /// Forward up to `budget` items into `output`. `last_fragment`
    /// reports whether a forwarded item completes its multi-part
    /// transfer (single-part streams return true unconditionally).
    pub fn pump(
        &mut self,
        output: &mut Sender<T>,
        last_fragment: impl Fn(&T) -> bool,
        budget: usize,
    ) -> Result<usize, DatapathError> {
        let mut forwarded = 0;
        while forwarded < budget {
            for (idx, rx) in self.inputs.iter().enumerate() {
                self.ready[idx] = !rx.is_empty();
            }
            let Some(idx) = self.arbiter.select(&self.ready) else {
                break;
            };
            let item = match self.inputs[idx].try_recv() {
                Ok(item) => item,
                // Lost a race between the readiness check and the recv;
                // skip this turn.
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    self.ready[idx] = false;
                    continue;
                }
            };
            self.arbiter.commit(idx, last_fragment(&item));
            output.send(item)?;
            forwarded += 1;
        }
        Ok(forwarded)
    }
}
