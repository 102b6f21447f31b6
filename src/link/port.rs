use std::sync::Mutex;

use log::{trace, warn};

use super::{
    ait_frame, control_frame, data_frame, AitFrame, AitReceipt, Action, BoundedQueue, EclpFrame,
    ErrorFlag, LinkAddr, LinkMachine, MsgType, Prescription, StateSnapshot, BROADCAST_MAC,
    ETH_P_ECLD, ETH_P_ECLL, ETH_P_ECLP, MSG_TEST_MASK, TX_HOLD_DEPTH,
};
use crate::alo::AloBlock;
use crate::Error;

/// Side effects a dispatch pass owes the module once the link lock is
/// released: frames to transmit and notifications to publish or route.
#[derive(Debug, Default)]
pub struct PortOutput {
    pub frames: Vec<Vec<u8>>,
    pub notices: Vec<PortNotice>,
}

#[derive(Debug)]
pub enum PortNotice {
    /// Error latched or signaled; carries current and first-error snapshots.
    LinkStatus(StateSnapshot, StateSnapshot),
    /// Atomic messages crossed the link; receive-queue depth attached.
    AitGot { num_messages: u16 },
    /// Frame addressed through the forwarding table; bridge decides.
    Forward(Vec<u8>),
    /// Discovery payload for subscribers.
    Discovery(Vec<u8>),
    /// Frame or payload owed to the local host.
    Host(Vec<u8>),
    /// Control word carried a test-injection field.
    Test { msg_raw: u16 },
}

#[derive(Debug)]
struct PortCore {
    machine: LinkMachine,
    tx_hold: BoundedQueue<Vec<u8>>,
    alo: AloBlock,
}

/// One link endpoint of the module: the state machine, its queues, and the
/// classification/render logic that turns frames into transitions and
/// transitions back into frames. All decisions happen under the single
/// port lock; transmission and publication happen after it is dropped.
#[derive(Debug)]
pub struct LinkPort {
    port_id: u32,
    name: String,
    core: Mutex<PortCore>,
    // Frames queued by other threads (bridge hops, discovery) for the
    // runner to put on the wire. Never taken while `core` is held.
    outbox: Mutex<Vec<Vec<u8>>>,
}

impl LinkPort {
    pub fn new(port_id: u32, name: impl Into<String>) -> Self {
        let name = name.into();
        LinkPort {
            port_id,
            core: Mutex::new(PortCore {
                machine: LinkMachine::new(name.clone()),
                tx_hold: BoundedQueue::new(TX_HOLD_DEPTH),
                alo: AloBlock::default(),
            }),
            outbox: Mutex::new(Vec::new()),
            name,
        }
    }

    pub fn port_id(&self) -> u32 {
        self.port_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -- lifecycle -----------------------------------------------------------

    pub fn set_identity(&self, addr: LinkAddr) {
        self.core.lock().unwrap().machine.set_identity(addr);
    }

    pub fn identity(&self) -> Option<LinkAddr> {
        self.core.lock().unwrap().machine.my_addr()
    }

    pub fn link_up(&self) {
        self.core.lock().unwrap().machine.link_up();
    }

    pub fn link_down(&self) {
        self.core
            .lock()
            .unwrap()
            .machine
            .state_error(ErrorFlag::LINKDOWN);
    }

    pub fn state_error(&self, flag: ErrorFlag) {
        self.core.lock().unwrap().machine.state_error(flag);
    }

    pub fn current_state(&self) -> (StateSnapshot, StateSnapshot) {
        self.core.lock().unwrap().machine.current_state()
    }

    pub fn read_and_clear_error_state(&self) -> (StateSnapshot, StateSnapshot) {
        self.core.lock().unwrap().machine.read_and_clear_error_state()
    }

    // -- AIT control surface -------------------------------------------------

    /// Queue an atomic message; returns remaining queue space.
    pub fn send_ait(&self, frame: AitFrame) -> Result<usize, Error> {
        self.core
            .lock()
            .unwrap()
            .machine
            .send_ait(frame)
            .map_err(|_| Error::QueueFull(self.port_id))
    }

    pub fn read_ait(&self) -> Option<AitReceipt> {
        self.core.lock().unwrap().machine.read_ait()
    }

    pub fn queued(&self) -> usize {
        self.core.lock().unwrap().machine.queued()
    }

    pub fn delivered(&self) -> usize {
        self.core.lock().unwrap().machine.delivered()
    }

    /// Hand a raw frame to this port's runner for transmission.
    pub fn queue_out(&self, frame: Vec<u8>) {
        self.outbox.lock().unwrap().push(frame);
    }

    pub fn drain_out(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }

    // -- ALO registers -------------------------------------------------------

    /// Write one register; returns the whole block for the update event.
    pub fn write_alo(&self, reg_no: u32, data: u64) -> Result<(u32, [u64; 32]), Error> {
        let mut core = self.core.lock().unwrap();
        core.alo.write(reg_no, data)?;
        Ok(core.alo.read_all())
    }

    pub fn read_alo(&self) -> (u32, [u64; 32]) {
        self.core.lock().unwrap().alo.read_all()
    }

    // -- dispatch ------------------------------------------------------------

    /// Classify one inbound frame and run it through the machine.
    pub fn handle_frame(&self, buf: &[u8], fw_enabled: bool) -> Result<PortOutput, Error> {
        let frame = EclpFrame::parse(buf)?;
        let mut out = PortOutput::default();

        match frame.ether_type {
            ETH_P_ECLL => {
                out.notices.push(PortNotice::Host(buf.to_vec()));
                return Ok(out);
            }
            ETH_P_ECLD => {
                out.notices
                    .push(PortNotice::Discovery(frame.payload.to_vec()));
                return Ok(out);
            }
            ETH_P_ECLP => {}
            other => {
                trace!("{}: ether type 0x{:04x} to host", self.name, other);
                out.notices.push(PortNotice::Host(buf.to_vec()));
                return Ok(out);
            }
        }

        let test_bits = frame.msg_raw & MSG_TEST_MASK;
        let msg = MsgType::from_raw(frame.msg_raw);

        // Only in-transit atomic traffic rides the bridge; control frames
        // (broadcast HELLOs included) always feed the machine.
        if frame.wants_forward() && fw_enabled && msg == Some(MsgType::Ait) {
            out.notices.push(PortNotice::Forward(buf.to_vec()));
            return Ok(out);
        }

        let mut core = self.core.lock().unwrap();
        let act = core
            .machine
            .received(frame.from_addr(), frame.msg_raw, frame.seqno);

        if act.contains(Action::PROC_AIT) {
            match frame.ait_payload() {
                Ok(ait) => core.machine.stash_ait(ait),
                Err(e) => warn!("{}: bad atomic payload: {}", self.name, e),
            }
        }

        // A clock-advancing EVENT may carry one piggybacked host frame.
        if msg == Some(MsgType::Event) && act.contains(Action::SEND) && !frame.payload.is_empty() {
            match frame.data_payload() {
                Ok(data) => out.notices.push(PortNotice::Host(data.to_vec())),
                Err(e) => warn!("{}: bad data payload: {}", self.name, e),
            }
        }

        if act.contains(Action::SEND) {
            let presc = core.machine.next_send();
            self.render_send(&mut core, presc, test_bits, &mut out);
        }

        if act.contains(Action::SIG_AIT) {
            out.notices.push(PortNotice::AitGot {
                num_messages: core.machine.delivered() as u16,
            });
        }

        if act.intersects(Action::SIG_ERR | Action::ERROR) {
            let (cur, err) = core.machine.current_state();
            out.notices.push(PortNotice::LinkStatus(cur, err));
        }
        drop(core);

        if test_bits != 0 {
            out.notices.push(PortNotice::Test {
                msg_raw: frame.msg_raw,
            });
        }

        Ok(out)
    }

    /// Periodic clock slot: advances the exchange when it is our turn.
    pub fn tick(&self) -> PortOutput {
        let mut out = PortOutput::default();
        let mut core = self.core.lock().unwrap();
        let presc = core.machine.next_send();
        self.render_send(&mut core, presc, 0, &mut out);
        out
    }

    /// Idle-link nudge: re-issues the current-state frame (HELLO
    /// advertisement, the master's EVENT(0), a stalled AIT or ACK) without
    /// moving the clock.
    pub fn heartbeat(&self) -> PortOutput {
        let mut out = PortOutput::default();
        let mut core = self.core.lock().unwrap();
        let presc = core.machine.resend_current();
        self.render_send(&mut core, presc, 0, &mut out);
        out
    }

    /// Host transmit path: stamp the clock onto a data frame when it is our
    /// turn, otherwise hold it for a later piggyback slot.
    pub fn transmit(&self, data: Vec<u8>) -> Result<PortOutput, Error> {
        let mut out = PortOutput::default();
        let mut core = self.core.lock().unwrap();
        let (presc, reclaimed) = core.machine.next_send_tx();

        if let Some(frame) = reclaimed {
            // tx path: delivery confirmed, but the payload goes back to its
            // originator rather than being dropped here.
            out.notices.push(PortNotice::Host(frame.into_data()));
        }

        if presc.action.contains(Action::SEND) {
            let dst = self.peer_mac(&core);
            let src = self.src_addr(&core);
            out.frames
                .push(data_frame(dst, src, presc.msg_raw, presc.seqno, &data));
            if presc.action.contains(Action::SIG_AIT) {
                out.notices.push(PortNotice::AitGot {
                    num_messages: core.machine.delivered() as u16,
                });
            }
        } else if core.tx_hold.push(data).is_err() {
            return Err(Error::QueueFull(self.port_id));
        }

        Ok(out)
    }

    // -- render --------------------------------------------------------------

    fn render_send(
        &self,
        core: &mut PortCore,
        presc: Prescription,
        test_bits: u16,
        out: &mut PortOutput,
    ) {
        if !presc.action.contains(Action::SEND) {
            return;
        }

        let msg_raw = presc.msg_raw | test_bits;
        let dst = self.peer_mac(core);
        let src = self.src_addr(core);

        if presc.action.contains(Action::SEND_AIT) {
            // Peek only; the queue head survives until the ack round-trip
            // completes at Bm.
            match core.machine.next_ait() {
                Some(ait) => out
                    .frames
                    .push(ait_frame(dst, src, msg_raw, presc.seqno, &ait)),
                None => {
                    warn!("{}: SEND_AIT with empty send queue", self.name);
                    out.frames
                        .push(control_frame(dst, src, msg_raw, presc.seqno));
                }
            }
        } else if presc.action.contains(Action::SEND_DAT) && core.tx_hold.has_data() {
            let held = core.tx_hold.pop().unwrap();
            out.frames
                .push(data_frame(dst, src, msg_raw, presc.seqno, &held));
        } else {
            out.frames
                .push(control_frame(dst, src, msg_raw, presc.seqno));
        }

        if presc.action.contains(Action::SIG_AIT) {
            out.notices.push(PortNotice::AitGot {
                num_messages: core.machine.delivered() as u16,
            });
        }
    }

    fn peer_mac(&self, core: &PortCore) -> [u8; 6] {
        core.machine
            .peer_addr()
            .map(LinkAddr::to_mac)
            .unwrap_or(BROADCAST_MAC)
    }

    fn src_addr(&self, core: &PortCore) -> LinkAddr {
        core.machine.my_addr().unwrap_or_default()
    }
}
