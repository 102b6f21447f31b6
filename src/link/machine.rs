use std::time::Instant;

use log::{debug, trace, warn};

use super::{
    Action, AitFrame, BoundedQueue, ErrorFlag, IntervalStats, LinkAddr, LinkState, MsgType,
    Prescription, StateSnapshot, AIT_QUEUE_DEPTH, HELLO_MAGIC, WAIT_HELLO_MAX,
};

/// Receive-queue depths reported alongside a consumed atomic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AitReceipt {
    pub frame: AitFrame,
    pub num_messages: u16,
    pub num_queued: u16,
}

/// First-error latch. Snapshot fields freeze on the first error; later
/// errors only bump the count and accumulate into the flag union.
#[derive(Debug, Default, Clone, Copy)]
struct ErrorLatch {
    state: LinkState,
    i_know: u32,
    i_sent: u32,
    error_flag: ErrorFlag,
    p_error_flag: ErrorFlag,
    error_count: u32,
    update_time: Option<Instant>,
    error_time: Option<Instant>,
}

/*
The protocol automaton of one link endpoint. Both peers advertise HELLO
until one of them (the greater address, the master) sees the other and moves
to WAIT. The master clocks out EVENT(0); from then on the peers strictly
alternate, each advancing the sequence number by two per own emission, so
parity identifies the speaker:

    HELLO --HELLO/greater--> WAIT --EVENT(i_sent+1)--> SEND <--> RECEIVE

An atomic transfer interleaves with the event clock as a four-corner
handshake, sender on the left:

    SEND --AIT--> AM --ACK--> BM --ACK--> RECEIVE    (pop send queue at BM)
    RECEIVE --AIT--> AH --ACK--> BH --ACK--> SEND    (push recv queue at BH)

Any out-of-window sequence number latches an error and restarts discovery.
*/
#[derive(Debug)]
pub struct LinkMachine {
    name: String,

    state: LinkState,
    i_know: u32,
    i_sent: u32,
    send_next: u32,
    update_time: Option<Instant>,
    intervals: IntervalStats,
    state_count: u32,

    error: ErrorLatch,

    my_addr: LinkAddr,
    mac_valid: bool,
    peer_addr: LinkAddr,
    peer_valid: bool,

    send_queue: BoundedQueue<AitFrame>,
    recv_queue: BoundedQueue<AitFrame>,
    stash: Option<AitFrame>,
}

impl LinkMachine {
    pub fn new(name: impl Into<String>) -> Self {
        LinkMachine {
            name: name.into(),
            state: LinkState::Idle,
            i_know: 0,
            i_sent: 0,
            send_next: 0,
            update_time: None,
            intervals: IntervalStats::default(),
            state_count: 0,
            error: ErrorLatch::default(),
            my_addr: LinkAddr::default(),
            mac_valid: false,
            peer_addr: LinkAddr::default(),
            peer_valid: false,
            send_queue: BoundedQueue::new(AIT_QUEUE_DEPTH),
            recv_queue: BoundedQueue::new(AIT_QUEUE_DEPTH),
            stash: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn my_addr(&self) -> Option<LinkAddr> {
        self.mac_valid.then_some(self.my_addr)
    }

    pub fn peer_addr(&self) -> Option<LinkAddr> {
        self.peer_valid.then_some(self.peer_addr)
    }

    pub fn error_pending(&self) -> bool {
        self.error.error_count != 0
    }

    /// Validate the local address. Must happen before `link_up`; a received
    /// HELLO later fills in the peer side.
    pub fn set_identity(&mut self, addr: LinkAddr) {
        debug!("{}: set-id - addr {}", self.name, addr);
        self.my_addr = addr;
        self.mac_valid = true;
        self.peer_valid = false;
    }

    pub fn link_up(&mut self) {
        if self.state != LinkState::Idle {
            warn!("{}: link up in {:?}, unexpected", self.name, self.state);
            self.latch(ErrorFlag::UNEXPECTED_LU);
            return;
        }
        if self.error_pending() {
            warn!(
                "{}: link up refused, error pending: {:?} count {}",
                self.name, self.error.error_flag, self.error.error_count
            );
            return;
        }
        debug!("{}: link up, Idle -> Hello", self.name);
        self.rehello();
        self.intervals.clear();
    }

    /// Externally signaled error (carrier loss, watchdog). LINKDOWN and
    /// TIMEOUT force Idle and stay latched until the next `link_up`;
    /// SEQUENCE restarts discovery immediately and clears the latch.
    pub fn state_error(&mut self, flag: ErrorFlag) {
        let was = self.state;
        if flag == ErrorFlag::LINKDOWN && was == LinkState::Idle {
            return;
        }

        self.latch(flag);
        if flag == ErrorFlag::LINKDOWN || flag == ErrorFlag::TIMEOUT {
            self.state = LinkState::Idle;
            self.stash = None;
        } else if flag == ErrorFlag::SEQUENCE {
            self.rehello();
            self.error = ErrorLatch::default();
            self.intervals.clear();
        }
        debug!(
            "{}: state_error {:?}, {:?} -> {:?}",
            self.name, flag, was, self.state
        );
    }

    pub fn current_state(&self) -> (StateSnapshot, StateSnapshot) {
        (self.snapshot(), self.error_snapshot())
    }

    /// Both snapshots, then the error latch is zeroed. The first-error
    /// record is delivered to user space exactly once.
    pub fn read_and_clear_error_state(&mut self) -> (StateSnapshot, StateSnapshot) {
        let out = (self.snapshot(), self.error_snapshot());
        self.error = ErrorLatch::default();
        out
    }

    // -- AIT queue surface ---------------------------------------------------

    /// Queue one atomic message for transmission; returns the remaining
    /// space, or the frame itself when the queue is full.
    pub fn send_ait(&mut self, frame: AitFrame) -> Result<usize, AitFrame> {
        let space = self.send_queue.push(frame);
        trace!("{}: sendq push - space {:?}", self.name, space.as_ref().ok());
        space
    }

    /// Copy of the next message to transmit. Removal only happens on the
    /// BM transition, after the peer acknowledged.
    pub fn next_ait(&self) -> Option<AitFrame> {
        self.send_queue.peek().cloned()
    }

    /// Consume one delivered message along with the queue depths.
    pub fn read_ait(&mut self) -> Option<AitReceipt> {
        let frame = self.recv_queue.pop()?;
        let receipt = AitReceipt {
            frame,
            num_messages: self.recv_queue.count() as u16,
            num_queued: self.send_queue.count() as u16,
        };
        trace!(
            "{}: recvq pop - msgs {} queued {}",
            self.name,
            receipt.num_messages,
            receipt.num_queued
        );
        Some(receipt)
    }

    pub fn queued(&self) -> usize {
        self.send_queue.count()
    }

    pub fn delivered(&self) -> usize {
        self.recv_queue.count()
    }

    /// Park a just-received atomic payload until the closing ACK commits it
    /// to the receive queue. Discarded on any return to Hello or Idle.
    pub fn stash_ait(&mut self, frame: AitFrame) {
        self.stash = Some(frame);
    }

    // -- entry points --------------------------------------------------------

    /// Feed one received control word into the automaton.
    pub fn received(&mut self, from: LinkAddr, msg_raw: u16, seqno: u32) -> Action {
        let Some(msg) = MsgType::from_raw(msg_raw) else {
            return self.unknown_cmd(msg_raw);
        };
        if msg == MsgType::Nop {
            return Action::empty();
        }
        if !self.mac_valid {
            trace!("{}: no identity, dropping {:?}", self.name, msg);
            return Action::empty();
        }
        if self.error_pending() {
            trace!(
                "{}: error pending {:?}, count {} - {:?} seqno {} from {}",
                self.name,
                self.error.error_flag,
                self.error.error_count,
                msg,
                seqno,
                from
            );
            return Action::SIG_ERR;
        }

        let was = self.state;
        match was {
            LinkState::Idle => {
                trace!("{}: {:?} seqno {} from {}, Idle", self.name, msg, seqno, from);
                Action::empty()
            }

            LinkState::Hello => match msg {
                MsgType::Hello => {
                    self.peer_addr = from;
                    self.peer_valid = true;
                    debug!("{}: neighbor {}", self.name, from);

                    match self.my_addr.cmp(&from) {
                        std::cmp::Ordering::Greater => {
                            debug!("{}: Hello (master) -> Wait", self.name);
                            self.state = LinkState::Wait;
                            self.touch();
                            self.intervals.clear();
                            self.state_count = 0;
                            Action::SEND
                        }
                        std::cmp::Ordering::Equal => {
                            warn!("{}: fatal - same address {}, Hello -> Idle", self.name, from);
                            self.latch(ErrorFlag::SAME_ADDRESS);
                            self.state = LinkState::Idle;
                            self.touch();
                            Action::empty()
                        }
                        std::cmp::Ordering::Less => {
                            debug!("{}: Hello (slave)", self.name);
                            Action::empty()
                        }
                    }
                }
                MsgType::Event => {
                    if seqno != HELLO_MAGIC {
                        debug!("{}: EVENT out of sequence: seqno {}, Hello", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: EVENT advance - seqno {}, Hello (slave) -> Send", self.name, seqno);
                        self.advance(seqno);
                        self.state = LinkState::Send;
                        self.record_interval();
                        self.touch();
                        Action::SEND
                    }
                }
                _ => {
                    trace!("{}: {:?} seqno {} from {}, Hello", self.name, msg, seqno, from);
                    Action::empty()
                }
            },

            LinkState::Wait => match msg {
                MsgType::Hello => {
                    self.state_count += 1;
                    if self.state_count > WAIT_HELLO_MAX {
                        debug!("{}: hello overflow {}, Wait -> Hello", self.name, self.state_count);
                        self.rehello();
                    }
                    Action::empty()
                }
                MsgType::Event => {
                    if seqno == self.i_sent.wrapping_add(1) {
                        debug!("{}: EVENT advance - seqno {}, Wait (master) -> Send", self.name, seqno);
                        self.advance(seqno);
                        self.state = LinkState::Send;
                        self.touch();
                        self.intervals.clear();
                        Action::SEND
                    } else {
                        debug!("{}: EVENT wrong seqno {}, Wait -> Hello", self.name, seqno);
                        self.rehello();
                        self.intervals.clear();
                        Action::empty()
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Wait -> Hello", self.name, msg);
                    self.seqno_error(Action::empty())
                }
            },

            LinkState::Send => match msg {
                MsgType::Event | MsgType::Ack => {
                    if seqno == self.i_know {
                        trace!("{}: {:?} same seqno {}, Send", self.name, msg, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: {:?} out of sequence: seqno {}, Send -> Hello", self.name, msg, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Send -> Hello", self.name, msg);
                    self.seqno_error(Action::ERROR)
                }
            },

            LinkState::Receive => match msg {
                MsgType::Event => {
                    if seqno == self.i_know.wrapping_add(2) {
                        self.advance(seqno);
                        self.state = LinkState::Send;
                        self.touch();
                        let mut action = Action::SEND;
                        // Data piggyback is optional and yields to AIT.
                        if !self.send_queue.has_data() {
                            action |= Action::SEND_DAT;
                        }
                        action
                    } else if seqno == self.i_know {
                        trace!("{}: EVENT unchanged - seqno {}, Receive", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: EVENT out of sequence - seqno {}, Receive -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                MsgType::Ait => {
                    if seqno == self.i_know.wrapping_add(2) {
                        self.advance(seqno);
                        self.state = LinkState::Ah;
                        self.touch();
                        let mut action = Action::PROC_AIT;
                        if !self.recv_queue.is_full() {
                            debug!("{}: AIT advance - seqno {}, Receive -> Ah", self.name, seqno);
                            action |= Action::SEND;
                        } else {
                            debug!("{}: AIT queue full - seqno {}, Receive -> Ah (hold)", self.name, seqno);
                        }
                        action
                    } else if seqno == self.i_know {
                        trace!("{}: AIT unchanged - seqno {}, Receive", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: AIT out of sequence - seqno {}, Receive -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Receive -> Hello", self.name, msg);
                    self.seqno_error(Action::ERROR)
                }
            },

            // Atomic message sent, waiting for the ack.
            LinkState::Am => match msg {
                MsgType::Ack => {
                    if seqno == self.i_know.wrapping_add(2) {
                        debug!("{}: ACK advance - seqno {}, Am -> Bm", self.name, seqno);
                        self.advance(seqno);
                        self.state = LinkState::Bm;
                        self.touch();
                        Action::SEND
                    } else {
                        debug!("{}: ACK out of sequence - seqno {}, Am -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                MsgType::Event => {
                    if seqno == self.i_know {
                        trace!("{}: EVENT unchanged - seqno {}, Am", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: EVENT wrong seqno {}, Am -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Am -> Hello", self.name, msg);
                    self.seqno_error(Action::ERROR)
                }
            },

            // Ack received for our atomic message, our closing ack owed.
            LinkState::Bm => match msg {
                MsgType::Ack => {
                    if seqno == self.i_know {
                        trace!("{}: ACK unchanged - seqno {}, Bm", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: ACK wrong seqno {}, Bm -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Bm -> Hello", self.name, msg);
                    self.seqno_error(Action::ERROR)
                }
            },

            // Atomic message received, our ack owed.
            LinkState::Ah => match msg {
                MsgType::Ait => {
                    if seqno == self.i_know {
                        trace!("{}: AIT unchanged - seqno {}, Ah", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: AIT out of sequence - seqno {}, Ah -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Ah -> Hello", self.name, msg);
                    self.seqno_error(Action::ERROR)
                }
            },

            // Our ack sent, waiting for the peer's closing ack.
            LinkState::Bh => match msg {
                MsgType::Ack => {
                    if seqno == self.i_know.wrapping_add(2) {
                        debug!("{}: ACK advance - seqno {}, Bh -> Send", self.name, seqno);
                        self.advance(seqno);
                        self.state = LinkState::Send;
                        self.touch();
                        match self.stash.take() {
                            Some(frame) => {
                                if let Err(frame) = self.recv_queue.push(frame) {
                                    // Space was checked before the ack went
                                    // out; only a consumer races us here.
                                    warn!(
                                        "{}: recvq overflow, dropping {} bytes",
                                        self.name,
                                        frame.message_len()
                                    );
                                }
                            }
                            None => warn!("{}: no stashed payload at Bh close", self.name),
                        }
                        Action::SEND | Action::SIG_AIT
                    } else {
                        debug!("{}: ACK out of sequence - seqno {}, Bh -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                MsgType::Ait => {
                    if seqno == self.i_know {
                        trace!("{}: AIT unchanged - seqno {}, Bh", self.name, seqno);
                        Action::empty()
                    } else {
                        debug!("{}: AIT out of sequence - seqno {}, Bh -> Hello", self.name, seqno);
                        self.seqno_error(Action::ERROR)
                    }
                }
                _ => {
                    debug!("{}: wrong message {:?}, Bh -> Hello", self.name, msg);
                    self.seqno_error(Action::ERROR)
                }
            },

            LinkState::Error => {
                warn!("{}: wrong state {:?} -> Idle", self.name, was);
                self.latch(ErrorFlag::UNKNOWN_STATE);
                self.reidle();
                Action::empty()
            }
        }
    }

    /// Prescription for the link's own transmit slot. The data path calls
    /// this on every clock tick; SEND means put the frame on the wire.
    pub fn next_send(&mut self) -> Prescription {
        if self.error_pending() {
            trace!(
                "{}: next_send under error {:?}, count {}, {:?}",
                self.name,
                self.error.error_flag,
                self.error.error_count,
                self.state
            );
            return Prescription::nop();
        }

        match self.state {
            LinkState::Idle => Prescription::nop(),

            LinkState::Hello => {
                Prescription::send(MsgType::Hello, HELLO_MAGIC, Action::SEND)
            }

            // The master's first EVENT goes out through resend_current on
            // the heartbeat; nothing spontaneous from here.
            LinkState::Wait => Prescription::send(MsgType::Event, 0, Action::empty()),

            LinkState::Send => {
                let engaged = self.i_know != 0 && self.i_sent != 0;
                self.i_sent = self.send_next;
                self.send_next = self.send_next.wrapping_add(2);
                self.record_interval();
                self.touch();

                // No AIT on the first exchange, the neighbor may still be
                // mid-handshake.
                if engaged && self.send_queue.has_data() {
                    self.state = LinkState::Am;
                    debug!("{}: AIT out - seqno {}, Send -> Am", self.name, self.i_sent);
                    Prescription::send(MsgType::Ait, self.i_sent, Action::SEND | Action::SEND_AIT)
                } else {
                    self.state = LinkState::Receive;
                    Prescription::send(MsgType::Event, self.i_sent, Action::SEND | Action::SEND_DAT)
                }
            }

            LinkState::Receive | LinkState::Am | LinkState::Bh => Prescription::nop(),

            LinkState::Bm => {
                self.i_sent = self.send_next;
                self.send_next = self.send_next.wrapping_add(2);
                self.state = LinkState::Receive;
                self.record_interval();
                self.touch();
                debug!("{}: ACK out - seqno {}, Bm -> Receive", self.name, self.i_sent);

                // The peer saw our message; it comes off the queue for good.
                if self.send_queue.pop().is_none() {
                    warn!("{}: send queue empty at Bm close", self.name);
                }
                Prescription::send(MsgType::Ack, self.i_sent, Action::SEND | Action::SIG_AIT)
            }

            LinkState::Ah => {
                if self.recv_queue.is_full() {
                    // Hold the ack until the consumer makes room; the peer
                    // keeps retransmitting AIT idempotently.
                    Prescription::nop()
                } else {
                    self.i_sent = self.send_next;
                    self.send_next = self.send_next.wrapping_add(2);
                    self.state = LinkState::Bh;
                    self.record_interval();
                    self.touch();
                    debug!("{}: ACK out - seqno {}, Ah -> Bh", self.name, self.i_sent);
                    Prescription::send(MsgType::Ack, self.i_sent, Action::SEND)
                }
            }

            LinkState::Error => Prescription::nop(),
        }
    }

    /// Transmit-only variant: the clock is stamped onto an outgoing data
    /// frame, so an atomic message can never originate here and SEND drops
    /// straight to RECEIVE. A BM pop hands the payload back to the caller
    /// instead of discarding it; on this path the originator keeps
    /// ownership.
    pub fn next_send_tx(&mut self) -> (Prescription, Option<AitFrame>) {
        if self.error_pending() {
            trace!(
                "{}: next_send_tx under error {:?}, count {}, {:?}",
                self.name,
                self.error.error_flag,
                self.error.error_count,
                self.state
            );
            return (Prescription::nop(), None);
        }

        match self.state {
            LinkState::Send => {
                self.i_sent = self.send_next;
                self.send_next = self.send_next.wrapping_add(2);
                self.record_interval();
                self.touch();
                self.state = LinkState::Receive;
                (
                    Prescription::send(MsgType::Event, self.i_sent, Action::SEND),
                    None,
                )
            }

            LinkState::Bm => {
                self.i_sent = self.send_next;
                self.send_next = self.send_next.wrapping_add(2);
                self.state = LinkState::Receive;
                self.record_interval();
                self.touch();
                debug!("{}: ACK out - seqno {}, Bm -> Receive (tx)", self.name, self.i_sent);

                let reclaimed = self.send_queue.pop();
                if reclaimed.is_none() {
                    warn!("{}: send queue empty at Bm close", self.name);
                }
                (
                    Prescription::send(MsgType::Ack, self.i_sent, Action::SEND | Action::SIG_AIT),
                    reclaimed,
                )
            }

            _ => (self.next_send(), None),
        }
    }

    /// Re-issue the frame appropriate to the current state without moving
    /// the clock. The heartbeat drives this while the exchange is stalled:
    /// HELLO advertisements, the master's EVENT(0), and retransmission of
    /// an unacknowledged AIT or ACK.
    pub fn resend_current(&mut self) -> Prescription {
        if self.error_pending() {
            return Prescription::nop();
        }

        match self.state {
            LinkState::Hello => Prescription::send(MsgType::Hello, HELLO_MAGIC, Action::SEND),
            LinkState::Wait => Prescription::send(MsgType::Event, 0, Action::SEND),
            LinkState::Receive => {
                Prescription::send(MsgType::Event, self.i_sent, Action::SEND)
            }
            LinkState::Am => {
                Prescription::send(MsgType::Ait, self.i_sent, Action::SEND | Action::SEND_AIT)
            }
            LinkState::Bh => {
                if self.recv_queue.is_full() {
                    Prescription::nop()
                } else {
                    Prescription::send(MsgType::Ack, self.i_sent, Action::SEND)
                }
            }
            _ => Prescription::nop(),
        }
    }

    // -- internals -----------------------------------------------------------

    fn advance(&mut self, seqno: u32) {
        self.i_know = seqno;
        self.send_next = seqno.wrapping_add(1);
    }

    /// Fresh discovery: all three counters at zero marks "just out of the
    /// handshake"; the stash never survives a return to Hello.
    fn rehello(&mut self) {
        self.i_know = 0;
        self.i_sent = 0;
        self.send_next = 0;
        self.state = LinkState::Hello;
        self.stash = None;
        self.touch();
    }

    fn reidle(&mut self) {
        self.i_know = 0;
        self.i_sent = 0;
        self.send_next = 0;
        self.state = LinkState::Idle;
        self.stash = None;
        self.touch();
    }

    fn seqno_error(&mut self, action: Action) -> Action {
        self.latch(ErrorFlag::SEQUENCE);
        self.rehello();
        action
    }

    fn unknown_cmd(&mut self, msg_raw: u16) -> Action {
        match self.state {
            LinkState::Idle | LinkState::Hello => Action::empty(),
            _ => {
                warn!(
                    "{}: unknown opcode 0x{:04x}, {:?} -> Hello",
                    self.name, msg_raw, self.state
                );
                self.latch(ErrorFlag::UNKNOWN_CMD);
                self.rehello();
                Action::ERROR
            }
        }
    }

    fn latch(&mut self, flag: ErrorFlag) {
        self.error.error_count += 1;
        if self.error.error_count > 1 {
            self.error.p_error_flag |= flag;
            return;
        }
        self.error.state = self.state;
        self.error.i_know = self.i_know;
        self.error.i_sent = self.i_sent;
        self.error.error_flag = flag;
        self.error.update_time = self.update_time;
        self.error.error_time = Some(Instant::now());
    }

    fn touch(&mut self) {
        self.update_time = Some(Instant::now());
    }

    fn record_interval(&mut self) {
        if let Some(at) = self.update_time {
            self.intervals.record(at.elapsed());
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state: self.state,
            i_know: self.i_know,
            i_sent: self.i_sent,
            send_next: self.send_next,
            error_flag: ErrorFlag::empty(),
            p_error_flag: ErrorFlag::empty(),
            error_count: 0,
            update_time: self.update_time,
            error_time: None,
            intervals: self.intervals,
        }
    }

    fn error_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state: self.error.state,
            i_know: self.error.i_know,
            i_sent: self.error.i_sent,
            send_next: 0,
            error_flag: self.error.error_flag,
            p_error_flag: self.error.p_error_flag,
            error_count: self.error.error_count,
            update_time: self.error.update_time,
            error_time: self.error.error_time,
            intervals: IntervalStats::default(),
        }
    }
}
