//! Shared harness: two link machines joined by in-memory wires, driven the
//! same way the dispatch adapter drives a real port.

use std::collections::VecDeque;

use eclp::{Action, AitFrame, LinkAddr, LinkMachine, Prescription};

/// One frame in flight: the control word plus an optional atomic payload.
#[derive(Debug, Clone)]
pub struct Msg {
    pub msg_raw: u16,
    pub seqno: u32,
    pub ait: Option<AitFrame>,
}

pub struct TestLink {
    pub a: LinkMachine,
    pub b: LinkMachine,
    pub a_addr: LinkAddr,
    pub b_addr: LinkAddr,
    pub a_to_b: VecDeque<Msg>,
    pub b_to_a: VecDeque<Msg>,
}

impl TestLink {
    /// Fresh pair, identities set and both links up. A holds the greater
    /// address and will take the master role.
    pub fn new() -> Self {
        let a_addr = LinkAddr::new(0x0001, 0x0000_0002);
        let b_addr = LinkAddr::new(0x0001, 0x0000_0001);

        let mut a = LinkMachine::new("a");
        a.set_identity(a_addr);
        a.link_up();

        let mut b = LinkMachine::new("b");
        b.set_identity(b_addr);
        b.link_up();

        TestLink {
            a,
            b,
            a_addr,
            b_addr,
            a_to_b: VecDeque::new(),
            b_to_a: VecDeque::new(),
        }
    }

    /// Pair already through discovery and into the steady event exchange.
    pub fn established() -> Self {
        let mut link = TestLink::new();
        link.run(16);
        link
    }

    /// Drive the exchange for at most `budget` steps (one delivery or one
    /// idle nudge per step), stopping early once both wires stay quiet.
    pub fn run(&mut self, budget: usize) {
        for _ in 0..budget {
            if self.a_to_b.is_empty() && self.b_to_a.is_empty() {
                self.nudge();
                if self.a_to_b.is_empty() && self.b_to_a.is_empty() {
                    return;
                }
            }

            if let Some(msg) = self.a_to_b.pop_front() {
                let from = self.a_addr;
                let act = self.b.received(from, msg.msg_raw, msg.seqno);
                if act.contains(Action::PROC_AIT) {
                    if let Some(ait) = msg.ait {
                        self.b.stash_ait(ait);
                    }
                }
                if act.contains(Action::SEND) {
                    let presc = self.b.next_send();
                    if let Some(reply) = render(&mut self.b, presc) {
                        self.b_to_a.push_back(reply);
                    }
                }
            } else if let Some(msg) = self.b_to_a.pop_front() {
                let from = self.b_addr;
                let act = self.a.received(from, msg.msg_raw, msg.seqno);
                if act.contains(Action::PROC_AIT) {
                    if let Some(ait) = msg.ait {
                        self.a.stash_ait(ait);
                    }
                }
                if act.contains(Action::SEND) {
                    let presc = self.a.next_send();
                    if let Some(reply) = render(&mut self.a, presc) {
                        self.a_to_b.push_back(reply);
                    }
                }
            }
        }
    }

    /// Deliver frames until A lands in Send, leaving its transmit slot
    /// unclaimed so a test can issue the next prescription itself.
    pub fn park_a_in_send(&mut self) {
        for _ in 0..64 {
            if let Some(msg) = self.b_to_a.pop_front() {
                let act = self.a.received(self.b_addr, msg.msg_raw, msg.seqno);
                if act.contains(Action::PROC_AIT) {
                    if let Some(ait) = msg.ait {
                        self.a.stash_ait(ait);
                    }
                }
                if self.a.state() == eclp::LinkState::Send {
                    return;
                }
                if act.contains(Action::SEND) {
                    let presc = self.a.next_send();
                    if let Some(reply) = render(&mut self.a, presc) {
                        self.a_to_b.push_back(reply);
                    }
                }
            } else if let Some(msg) = self.a_to_b.pop_front() {
                let act = self.b.received(self.a_addr, msg.msg_raw, msg.seqno);
                if act.contains(Action::PROC_AIT) {
                    if let Some(ait) = msg.ait {
                        self.b.stash_ait(ait);
                    }
                }
                if act.contains(Action::SEND) {
                    let presc = self.b.next_send();
                    if let Some(reply) = render(&mut self.b, presc) {
                        self.b_to_a.push_back(reply);
                    }
                }
            } else {
                self.nudge();
            }
        }
        panic!("A never reached Send");
    }

    /// Grant each quiet side a transmit slot, falling back to the
    /// heartbeat re-send when the clock has nothing new to say.
    fn nudge(&mut self) {
        if self.a_to_b.is_empty() {
            let mut presc = self.a.next_send();
            if !presc.action.contains(Action::SEND) {
                presc = self.a.resend_current();
            }
            if let Some(msg) = render(&mut self.a, presc) {
                self.a_to_b.push_back(msg);
            }
        }
        if self.b_to_a.is_empty() {
            let mut presc = self.b.next_send();
            if !presc.action.contains(Action::SEND) {
                presc = self.b.resend_current();
            }
            if let Some(msg) = render(&mut self.b, presc) {
                self.b_to_a.push_back(msg);
            }
        }
    }
}

fn render(machine: &mut LinkMachine, presc: Prescription) -> Option<Msg> {
    if !presc.action.contains(Action::SEND) {
        return None;
    }
    let ait = if presc.action.contains(Action::SEND_AIT) {
        machine.next_ait()
    } else {
        None
    };
    Some(Msg {
        msg_raw: presc.msg_raw,
        seqno: presc.seqno,
        ait,
    })
}

/// Sequence parity: the gap between the clock and the last emission never
/// leaves {0, 2}.
pub fn assert_parity(machine: &LinkMachine) {
    let (cur, _) = machine.current_state();
    let gap = cur.send_next.wrapping_sub(cur.i_sent);
    assert!(
        gap == 0 || gap == 2,
        "send_next {} i_sent {} gap {}",
        cur.send_next,
        cur.i_sent,
        gap
    );
}
