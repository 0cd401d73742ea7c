//! Top-level transport engine composition.
//!
//! Wires admission control in front of the table-keyed inbound demuxes,
//! the outbound arbiters feeding external egress and the shared memory
//! backend, and the control/state/pulse channels around the connection
//! table. The whole assembly advances as one synchronous domain: every
//! [`TransportEngine::step`] recomputes outputs from current-step inputs
//! and committed state. The six routing channels and the control channel
//! run independently; nothing blocks anything else except ordinary
//! backpressure on the shared outputs.

use tracing::{debug, warn};

use crate::channel::{create_channel, Receiver, Sender, TryRecvError};
use crate::config::TransportConfig;
use crate::message::{ControlRequest, DmaReadResp, DmaRequest, DmaWriteResp, WorkRequest};
use crate::packet::Packet;
use crate::qp::{AttrNotification, QpState, TableSnapshot};
use crate::router::{ArbitratedMerge, Demux};
use crate::table::{ConnectionTable, ModifyOp};
use crate::validator::HeaderValidator;
use crate::{ControlError, DatapathError};

/// Channel endpoints handed to one connection unit (one per table slot).
#[derive(Debug)]
pub struct QpEndpoints {
    pub wr_in: Receiver<WorkRequest>,
    pub pkt_in: Receiver<Packet>,
    pub read_resp_in: Receiver<DmaReadResp>,
    pub write_resp_in: Receiver<DmaWriteResp>,
    pub attr_in: Receiver<AttrNotification>,
    pub pkt_out: Sender<Packet>,
    pub dma_out: Sender<DmaRequest>,
    /// Reports the unit's own state; the slot is fixed by the channel.
    pub state_out: Sender<QpState>,
}

/// Channel endpoints handed to the memory backend.
#[derive(Debug)]
pub struct DmaEndpoints {
    pub req_in: Receiver<DmaRequest>,
    pub read_resp_out: Sender<DmaReadResp>,
    pub write_resp_out: Sender<DmaWriteResp>,
}

/// The engine's external face: control plane, host work requests,
/// packet ingress and egress. The capacity signal is polled on the
/// engine itself via [`TransportEngine::is_full`].
#[derive(Debug)]
pub struct EngineHandles {
    pub control: Sender<ControlRequest>,
    pub work: Sender<WorkRequest>,
    pub ingress: Sender<Packet>,
    pub egress: Receiver<Packet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Progress(usize),
    Disconnected,
}

use Status::Progress;

pub struct TransportEngine {
    table: ConnectionTable,
    step_burst: usize,

    control_rx: Receiver<ControlRequest>,
    wr_rx: Receiver<WorkRequest>,
    ingress_rx: Receiver<Packet>,
    egress_tx: Sender<Packet>,

    dma_req_tx: Sender<DmaRequest>,
    dma_read_rx: Receiver<DmaReadResp>,
    dma_write_rx: Receiver<DmaWriteResp>,

    wr_demux: Demux<WorkRequest>,
    pkt_demux: Demux<Packet>,
    read_resp_demux: Demux<DmaReadResp>,
    write_resp_demux: Demux<DmaWriteResp>,

    attr_tx: Vec<Sender<AttrNotification>>,
    state_rx: Vec<Receiver<QpState>>,

    egress_merge: ArbitratedMerge<Packet>,
    dma_merge: ArbitratedMerge<DmaRequest>,
}

impl TransportEngine {
    /// Build the engine plus the endpoint bundles for its collaborators:
    /// N connection units and one memory backend.
    pub fn new(
        config: &TransportConfig,
    ) -> (TransportEngine, EngineHandles, Vec<QpEndpoints>, DmaEndpoints) {
        let flavor = config.channel_flavor.into();
        let n = config.num_connections;

        let (control_tx, control_rx) = create_channel(flavor);
        let (work_tx, wr_rx) = create_channel(flavor);
        let (ingress_tx, ingress_rx) = create_channel(flavor);
        let (egress_tx, egress_rx) = create_channel(flavor);
        let (dma_req_tx, dma_req_rx) = create_channel(flavor);
        let (dma_read_tx, dma_read_rx) = create_channel(flavor);
        let (dma_write_tx, dma_write_rx) = create_channel(flavor);

        let mut qps = Vec::with_capacity(n);
        let mut wr_out = Vec::with_capacity(n);
        let mut pkt_out = Vec::with_capacity(n);
        let mut read_resp_out = Vec::with_capacity(n);
        let mut write_resp_out = Vec::with_capacity(n);
        let mut attr_tx = Vec::with_capacity(n);
        let mut state_rx = Vec::with_capacity(n);
        let mut egress_in = Vec::with_capacity(n);
        let mut dma_in = Vec::with_capacity(n);

        for _ in 0..n {
            let (wr_tx, wr_in) = create_channel(flavor);
            let (pkt_tx, pkt_in) = create_channel(flavor);
            let (read_tx, read_resp_in) = create_channel(flavor);
            let (write_tx, write_resp_in) = create_channel(flavor);
            let (a_tx, attr_in) = create_channel(flavor);
            let (qp_pkt_tx, qp_pkt_rx) = create_channel(flavor);
            let (qp_dma_tx, qp_dma_rx) = create_channel(flavor);
            let (s_tx, s_rx) = create_channel(flavor);

            wr_out.push(wr_tx);
            pkt_out.push(pkt_tx);
            read_resp_out.push(read_tx);
            write_resp_out.push(write_tx);
            attr_tx.push(a_tx);
            state_rx.push(s_rx);
            egress_in.push(qp_pkt_rx);
            dma_in.push(qp_dma_rx);

            qps.push(QpEndpoints {
                wr_in,
                pkt_in,
                read_resp_in,
                write_resp_in,
                attr_in,
                pkt_out: qp_pkt_tx,
                dma_out: qp_dma_tx,
                state_out: s_tx,
            });
        }

        let engine = TransportEngine {
            table: ConnectionTable::new(n),
            step_burst: config.step_burst,
            control_rx,
            wr_rx,
            ingress_rx,
            egress_tx,
            dma_req_tx,
            dma_read_rx,
            dma_write_rx,
            wr_demux: Demux::new(wr_out),
            pkt_demux: Demux::new(pkt_out),
            read_resp_demux: Demux::new(read_resp_out),
            write_resp_demux: Demux::new(write_resp_out),
            attr_tx,
            state_rx,
            egress_merge: ArbitratedMerge::new(egress_in),
            dma_merge: ArbitratedMerge::new(dma_in),
        };
        let handles = EngineHandles {
            control: control_tx,
            work: work_tx,
            ingress: ingress_tx,
            egress: egress_rx,
        };
        let dma = DmaEndpoints {
            req_in: dma_req_rx,
            read_resp_out: dma_read_tx,
            write_resp_out: dma_write_tx,
        };
        (engine, handles, qps, dma)
    }

    /// Capacity signal for upstream admission control.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.table.is_full()
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    /// Advance the synchronous domain by one step.
    ///
    /// Consumers observe the snapshot published at the start of the
    /// step; control-plane effects land in the table now and become
    /// visible to the datapath next step, with PSN reset pulses
    /// delivered one step after their request resolves.
    pub fn step(&mut self) -> Result<Status, DatapathError> {
        let snapshot = self.table.snapshot();
        let mut work = 0;

        work += self.deliver_pulses()?;
        work += self.check_state_changes();
        work += self.check_ingress(&snapshot)?;
        work += self.check_work_requests()?;
        work += self.check_dma_responses()?;
        let (n, disconnected) = self.check_control();
        work += n;
        work += self
            .egress_merge
            .pump(&mut self.egress_tx, |_| true, self.step_burst)?;
        work += self.dma_merge.pump(
            &mut self.dma_req_tx,
            DmaRequest::is_last_fragment,
            self.step_burst,
        )?;

        if disconnected {
            Ok(Status::Disconnected)
        } else {
            Ok(Progress(work))
        }
    }

    /// Stage 2 of the table pipeline: hand the queued one-shot pulses to
    /// their slots' connection units.
    fn deliver_pulses(&mut self) -> Result<usize, DatapathError> {
        let pulses = self.table.tick();
        let n = pulses.len();
        for (slot, notification) in pulses {
            self.attr_tx[slot].send(notification)?;
        }
        Ok(n)
    }

    // Each channel belongs to exactly one slot, so the sender cannot
    // address any context but its own.
    fn check_state_changes(&mut self) -> usize {
        let mut n = 0;
        for slot in 0..self.state_rx.len() {
            while let Ok(state) = self.state_rx[slot].try_recv() {
                self.table.apply_state_change(slot, state);
                n += 1;
            }
        }
        n
    }

    fn check_ingress(&mut self, snapshot: &TableSnapshot) -> Result<usize, DatapathError> {
        let mut n = 0;
        while n < self.step_burst {
            match self.ingress_rx.try_recv() {
                Ok(pkt) => {
                    n += 1;
                    if let Some(slot) = HeaderValidator::admit(&pkt.header, snapshot) {
                        self.pkt_demux.forward(slot, pkt)?;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(n)
    }

    fn check_work_requests(&mut self) -> Result<usize, DatapathError> {
        let mut n = 0;
        while n < self.step_burst {
            match self.wr_rx.try_recv() {
                Ok(wr) => {
                    n += 1;
                    self.wr_demux.route(wr.qpn, &self.table, wr)?;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(n)
    }

    fn check_dma_responses(&mut self) -> Result<usize, DatapathError> {
        let mut reads = 0;
        while reads < self.step_burst {
            match self.dma_read_rx.try_recv() {
                Ok(resp) => {
                    reads += 1;
                    self.read_resp_demux.route(resp.qpn, &self.table, resp)?;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        let mut writes = 0;
        while writes < self.step_burst {
            match self.dma_write_rx.try_recv() {
                Ok(resp) => {
                    writes += 1;
                    self.write_resp_demux.route(resp.qpn, &self.table, resp)?;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(reads + writes)
    }

    /// Drain the control channel. Rejected requests are logged and
    /// swallowed: the control plane never faults the datapath.
    fn check_control(&mut self) -> (usize, bool) {
        let mut n = 0;
        loop {
            match self.control_rx.try_recv() {
                Ok(req) => {
                    n += 1;
                    if let Err(e) = self.process_control(&req) {
                        warn!(error = %e, ?req, "control request rejected");
                    }
                }
                Err(TryRecvError::Empty) => return (n, false),
                Err(TryRecvError::Disconnected) => return (n, true),
            }
        }
    }

    fn process_control(&mut self, req: &ControlRequest) -> Result<(), ControlError> {
        match *req {
            ControlRequest::Create(attrs) => {
                let slot = self.table.create(attrs)?;
                debug!(qpn = attrs.qpn, slot, "qp created");
            }
            ControlRequest::ResetRecvPsn(qpn) => {
                self.table.modify(ModifyOp::ResetRecvPsn, qpn)?;
            }
            ControlRequest::ResetSendPsn(qpn) => {
                self.table.modify(ModifyOp::ResetSendPsn, qpn)?;
            }
            ControlRequest::Destroy(qpn) => {
                let slot = self.table.destroy(qpn)?;
                debug!(qpn, slot, "qp destroyed");
            }
        }
        Ok(())
    }
}
