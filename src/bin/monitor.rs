use std::env;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::time::Duration;

use eclp::{Channel, Event, EventKind, LinkAddr, PortRunner, Registry, RunnerConfig};
use tidy_tuntap::Tap;

// Brings one port up and prints everything published on the event
// channels until interrupted.
fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let usage = "usage: monitor <tap> <addr-hi hex> <addr-lo hex>";
    let tap_name = args.next().expect(usage);
    let hi = u16::from_str_radix(&args.next().expect(usage), 16).expect("bad addr-hi");
    let lo = u32::from_str_radix(&args.next().expect(usage), 16).expect("bad addr-lo");

    let registry = Registry::new();
    let module_id = registry.alloc_driver("ecnl0");
    let module = registry.module(module_id).unwrap();

    let port_id = module.register_port(&tap_name);
    let port = module.port(port_id).unwrap();

    let tap = Tap::new(&tap_name, false).unwrap();
    tap.bring_up().unwrap();

    port.set_identity(LinkAddr::new(hi, lo));
    port.link_up();

    let channels = [
        ("linkstatus", Channel::LinkStatus),
        ("ait", Channel::Ait),
        ("alo", Channel::Alo),
        ("discovery", Channel::Discovery),
        ("test", Channel::Test),
    ];
    let subs: Vec<_> = channels
        .iter()
        .map(|(name, channel)| (*name, module.subscribe(*channel)))
        .collect();

    let _runner = PortRunner::spawn(module.clone(), port_id, tap, RunnerConfig::default()).unwrap();

    println!(">>> listening on {tap_name} ...");
    loop {
        let mut idle = true;
        for (name, rx) in &subs {
            match rx.try_recv() {
                Ok(event) => {
                    idle = false;
                    print_event(name, &event);
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return,
            }
        }
        if idle {
            thread::sleep(Duration::from_millis(50));
        }
    }
}

fn print_event(channel: &str, event: &Event) {
    let Event {
        module_id, port_id, ..
    } = event;
    match &event.kind {
        EventKind::LinkStatus { current, error } => println!(
            "[{channel}] module {module_id} port {port_id}: {:?} i_know {} i_sent {} errors {:?} x{}",
            current.state, current.i_know, current.i_sent, error.error_flag, error.error_count
        ),
        EventKind::AitGot { num_messages } => println!(
            "[{channel}] module {module_id} port {port_id}: {num_messages} message(s) pending"
        ),
        EventKind::AitForward { frame } => println!(
            "[{channel}] module {module_id} port {port_id}: forwarded {} bytes",
            frame.len()
        ),
        EventKind::AloUpdate { flags, regs } => println!(
            "[{channel}] module {module_id} port {port_id}: alo flags {flags:#010x} reg0 {:#x}",
            regs[0]
        ),
        EventKind::Discovery { payload } => println!(
            "[{channel}] module {module_id} port {port_id}: discovery {} bytes",
            payload.len()
        ),
        EventKind::Test { msg_raw } => println!(
            "[{channel}] module {module_id} port {port_id}: test word {msg_raw:#06x}"
        ),
    }
}
