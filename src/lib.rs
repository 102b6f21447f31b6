use std::collections::VecDeque;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nix::poll::{poll, PollFd, PollFlags};
use tidy_tuntap::Tap;

mod alo;
mod err;
mod event;
mod link;
mod table;

pub use alo::{AloBlock, ALO_REG_COUNT};
pub use err::Error;
pub use event::{Channel, Event, EventHub, EventKind};
pub use link::*;
pub use table::{Route, TableEntry, FW_TABLE_ENTRY_ARRAY, TABLE_MAX};

// Frames parked for the host side before anyone reads them.
const HOST_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub num_ports: u32,
}

/// What `get_port_state` reports for one port.
#[derive(Debug, Clone)]
pub struct PortState {
    pub name: String,
    pub link_up: bool,
    pub current: StateSnapshot,
    pub error: StateSnapshot,
    pub num_queued: u16,
    pub num_messages: u16,
}

/// Register write piggybacked on a message retrieve.
#[derive(Debug, Clone, Copy)]
pub struct AloReg {
    pub no: u32,
    pub data: u64,
}

/// Owned registry of modules, looked up by id. Replaces the process-wide
/// module array of older bridge designs.
#[derive(Debug, Default)]
pub struct Registry {
    modules: Mutex<Vec<Arc<Module>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn alloc_driver(&self, name: &str) -> u32 {
        let mut modules = self.modules.lock().unwrap();
        let module_id = modules.len() as u32;
        modules.push(Arc::new(Module::new(module_id, name)));
        info!("module {} ({}) allocated", module_id, name);
        module_id
    }

    pub fn module(&self, module_id: u32) -> Result<Arc<Module>, Error> {
        self.modules
            .lock()
            .unwrap()
            .get(module_id as usize)
            .cloned()
            .ok_or(Error::NoSuchModule(module_id))
    }
}

/// One bridge instance: a set of link ports, the forwarding tables, and the
/// event surface its subscribers listen on.
#[derive(Debug)]
pub struct Module {
    module_id: u32,
    name: String,
    ports: Mutex<Vec<Arc<LinkPort>>>,
    tables: Mutex<table::ForwardingTables>,
    fw_enable: AtomicBool,
    events: EventHub,
    host_rx: Mutex<VecDeque<Vec<u8>>>,
}

impl Module {
    fn new(module_id: u32, name: &str) -> Self {
        Module {
            module_id,
            name: name.to_string(),
            ports: Mutex::new(Vec::new()),
            tables: Mutex::new(table::ForwardingTables::default()),
            fw_enable: AtomicBool::new(false),
            events: EventHub::default(),
            host_rx: Mutex::new(VecDeque::new()),
        }
    }

    pub fn module_id(&self) -> u32 {
        self.module_id
    }

    pub fn register_port(&self, name: &str) -> u32 {
        let mut ports = self.ports.lock().unwrap();
        let port_id = ports.len() as u32;
        ports.push(Arc::new(LinkPort::new(port_id, name)));
        info!("module {}: port {} ({}) registered", self.module_id, port_id, name);
        port_id
    }

    pub fn port(&self, port_id: u32) -> Result<Arc<LinkPort>, Error> {
        self.ports
            .lock()
            .unwrap()
            .get(port_id as usize)
            .cloned()
            .ok_or(Error::NoSuchPort(port_id))
    }

    pub fn subscribe(&self, channel: Channel) -> std::sync::mpsc::Receiver<Event> {
        self.events.subscribe(channel)
    }

    pub fn forwarding(&self) -> bool {
        self.fw_enable.load(Ordering::Acquire)
    }

    // -- control surface -----------------------------------------------------

    pub fn get_module_info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.name.clone(),
            num_ports: self.ports.lock().unwrap().len() as u32,
        }
    }

    pub fn get_port_state(&self, port_id: u32) -> Result<PortState, Error> {
        let port = self.port(port_id)?;
        let (current, error) = port.current_state();
        Ok(PortState {
            name: port.name().to_string(),
            link_up: current.state != LinkState::Idle,
            current,
            error,
            num_queued: port.queued() as u16,
            num_messages: port.delivered() as u16,
        })
    }

    pub fn alloc_table(&self, size: u32) -> Result<u32, Error> {
        self.tables.lock().unwrap().alloc(size)
    }

    pub fn fill_table(&self, id: u32, offset: u32, entries: &[TableEntry]) -> Result<(), Error> {
        self.tables.lock().unwrap().fill(id, offset, entries)
    }

    pub fn fill_table_entry(&self, id: u32, index: u32, entry: TableEntry) -> Result<(), Error> {
        self.tables.lock().unwrap().fill_entry(id, index, entry)
    }

    pub fn select_table(&self, id: u32) -> Result<(), Error> {
        self.tables.lock().unwrap().select(id)
    }

    pub fn dealloc_table(&self, id: u32) -> Result<(), Error> {
        self.tables.lock().unwrap().dealloc(id)
    }

    pub fn map_ports(&self, map: [u32; FW_TABLE_ENTRY_ARRAY]) {
        self.tables.lock().unwrap().map_ports(map);
    }

    pub fn start_forwarding(&self) {
        self.fw_enable.store(true, Ordering::Release);
    }

    pub fn stop_forwarding(&self) {
        self.fw_enable.store(false, Ordering::Release);
    }

    /// Queue an atomic message for reliable in-band delivery; returns the
    /// remaining send-queue space. Transmission happens on the link's next
    /// SEND slot.
    pub fn send_ait_message(&self, port_id: u32, bytes: Vec<u8>) -> Result<usize, Error> {
        let port = self.port(port_id)?;
        port.send_ait(AitFrame::new(bytes)?)
    }

    /// Wire shape of `send_ait_message`; kept as an alias until a distinct
    /// meaning is settled (see DESIGN.md).
    pub fn signal_ait_message(&self, port_id: u32, bytes: Vec<u8>) -> Result<usize, Error> {
        self.send_ait_message(port_id, bytes)
    }

    /// Pop one delivered atomic message, applying the piggybacked register
    /// write first. `None` when the receive queue is empty.
    pub fn retrieve_ait_message(
        &self,
        port_id: u32,
        alo_reg: Option<AloReg>,
    ) -> Result<Option<AitReceipt>, Error> {
        let port = self.port(port_id)?;
        if let Some(reg) = alo_reg {
            let (flags, regs) = port.write_alo(reg.no, reg.data)?;
            self.events.publish(Event {
                module_id: self.module_id,
                port_id,
                kind: EventKind::AloUpdate { flags, regs },
            });
        }
        Ok(port.read_ait())
    }

    pub fn write_alo_register(&self, port_id: u32, reg_no: u32, data: u64) -> Result<(), Error> {
        let port = self.port(port_id)?;
        let (flags, regs) = port.write_alo(reg_no, data)?;
        self.events.publish(Event {
            module_id: self.module_id,
            port_id,
            kind: EventKind::AloUpdate { flags, regs },
        });
        Ok(())
    }

    pub fn read_alo_registers(&self, port_id: u32) -> Result<(u32, [u64; ALO_REG_COUNT]), Error> {
        Ok(self.port(port_id)?.read_alo())
    }

    /// Fire-and-forget discovery payload out of one port.
    pub fn send_discover_message(&self, port_id: u32, bytes: Vec<u8>) -> Result<(), Error> {
        if bytes.len() > EC_MESSAGE_MAX {
            return Err(Error::OversizeMessage(bytes.len()));
        }
        let port = self.port(port_id)?;
        let src = port.identity().unwrap_or_default();
        port.queue_out(discovery_frame(BROADCAST_MAC, src, ETH_P_ECLD, &bytes));
        Ok(())
    }

    /// Host transmit through the clocked link.
    pub fn transmit(&self, port_id: u32, data: Vec<u8>) -> Result<(), Error> {
        let port = self.port(port_id)?;
        let out = port.transmit(data)?;
        for frame in out.frames {
            port.queue_out(frame);
        }
        self.process_notices(&port, out.notices);
        Ok(())
    }

    /// Non-blocking read of the next frame delivered to the host side.
    pub fn read_host_frame(&self) -> Option<Vec<u8>> {
        self.host_rx.lock().unwrap().pop_front()
    }

    fn deliver_host(&self, frame: Vec<u8>) {
        let mut host = self.host_rx.lock().unwrap();
        if host.len() == HOST_QUEUE_DEPTH {
            host.pop_front();
        }
        host.push_back(frame);
    }

    // -- plumbing used by the runner ----------------------------------------

    /// Route notices produced under a port lock now that it is released:
    /// publications, host delivery, and bridge hops onto other ports.
    pub fn process_notices(&self, port: &LinkPort, notices: Vec<PortNotice>) {
        for notice in notices {
            match notice {
                PortNotice::LinkStatus(current, error) => self.publish(port, EventKind::LinkStatus {
                    current,
                    error,
                }),
                PortNotice::AitGot { num_messages } => {
                    self.publish(port, EventKind::AitGot { num_messages })
                }
                PortNotice::Discovery(payload) => {
                    self.publish(port, EventKind::Discovery { payload })
                }
                PortNotice::Test { msg_raw } => self.publish(port, EventKind::Test { msg_raw }),
                PortNotice::Host(frame) => self.deliver_host(frame),
                PortNotice::Forward(frame) => self.forward_frame(port, frame),
            }
        }
    }

    pub fn publish_status(&self, port: &LinkPort) {
        let (current, error) = port.current_state();
        self.publish(port, EventKind::LinkStatus { current, error });
    }

    fn publish(&self, port: &LinkPort, kind: EventKind) {
        self.events.publish(Event {
            module_id: self.module_id,
            port_id: port.port_id(),
            kind,
        });
    }

    /// Clone-and-forward walk over the selected table.
    fn forward_frame(&self, arriving: &LinkPort, frame: Vec<u8>) {
        let Ok(parsed) = EclpFrame::parse(&frame) else {
            warn!("module {}: unparsable frame on bridge path", self.module_id);
            return;
        };
        let route = self.tables.lock().unwrap().route(
            parsed.next_hop_id(),
            parsed.is_backward(),
            parsed.host_on_backward(),
            arriving.port_id(),
        );
        let is_ait = MsgType::from_raw(parsed.msg_raw) == Some(MsgType::Ait);

        if route.to_host {
            self.deliver_host(frame.clone());
        }

        for (port_id, next_id) in route.hops {
            let Ok(out_port) = self.port(port_id) else {
                warn!("module {}: bridge hop to missing port {}", self.module_id, port_id);
                continue;
            };
            let mut hop = frame.clone();
            if let Err(e) = set_next_hop(&mut hop, next_id) {
                warn!("module {}: bridge hop not stamped: {}", self.module_id, e);
                continue;
            }
            out_port.queue_out(hop);
        }

        if is_ait {
            self.publish(arriving, EventKind::AitForward { frame });
        }
    }
}

/// Knobs of the per-port runner thread.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Clock slot granted to the link when the wire is quiet.
    pub tick: Duration,
    /// Re-issue the current-state frame after this much inbound silence.
    pub resend_after: Duration,
    /// Declare the link dead after this much inbound silence.
    pub timeout_after: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            tick: Duration::from_millis(50),
            resend_after: Duration::from_millis(250),
            timeout_after: Duration::from_secs(2),
        }
    }
}

/// One thread per TAP-backed port: reads frames into the dispatch adapter,
/// writes the rendered frames back out, runs the clock and the watchdog.
#[derive(Debug)]
pub struct PortRunner {
    jh: thread::JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl PortRunner {
    pub fn spawn(
        module: Arc<Module>,
        port_id: u32,
        tap: Tap,
        cfg: RunnerConfig,
    ) -> Result<Self, Error> {
        let port = module.port(port_id)?;
        let stop = Arc::new(AtomicBool::new(false));
        let jh = {
            let stop = stop.clone();
            thread::spawn(move || port_loop(module, port, tap, cfg, stop))
        };
        Ok(PortRunner { jh, stop })
    }

    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.jh.join();
    }
}

fn port_loop(module: Arc<Module>, port: Arc<LinkPort>, mut tap: Tap, cfg: RunnerConfig, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; EC_MESSAGE_MAX];
    let mut last_rx = Instant::now();
    let mut timed_out = false;

    while !stop.load(Ordering::Acquire) {
        for frame in port.drain_out() {
            if let Err(e) = tap.write_all(&frame) {
                warn!("{}: tx failed: {}", port.name(), e);
            }
        }

        let mut pfd = [PollFd::new(tap.as_raw_fd(), PollFlags::POLLIN)];
        let ready = match poll(&mut pfd[..], cfg.tick.as_millis() as i32) {
            Ok(n) => n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                warn!("{}: poll failed: {}", port.name(), e);
                break;
            }
        };

        if ready > 0 {
            let n = match tap.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    warn!("{}: rx failed: {}", port.name(), e);
                    continue;
                }
            };
            last_rx = Instant::now();
            timed_out = false;

            match port.handle_frame(&buf[..n], module.forwarding()) {
                Ok(out) => emit(&module, &port, &mut tap, out),
                Err(e) => debug!("{}: dropped frame: {}", port.name(), e),
            }
            continue;
        }

        // Quiet wire: grant the clock a slot, then nudge or give up on the
        // peer depending on how long it has been silent.
        let out = port.tick();
        emit(&module, &port, &mut tap, out);

        let silent = last_rx.elapsed();
        if silent >= cfg.timeout_after && !timed_out {
            warn!("{}: no frames for {:?}, signaling timeout", port.name(), silent);
            port.state_error(ErrorFlag::TIMEOUT);
            module.publish_status(&port);
            timed_out = true;
        } else if silent >= cfg.resend_after {
            let out = port.heartbeat();
            emit(&module, &port, &mut tap, out);
        }
    }
}

fn emit(module: &Module, port: &LinkPort, tap: &mut Tap, out: PortOutput) {
    for frame in out.frames {
        if let Err(e) = tap.write_all(&frame) {
            warn!("{}: tx failed: {}", port.name(), e);
        }
    }
    module.process_notices(port, out.notices);
}
