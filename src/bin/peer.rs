use std::env;

use eclp::{Channel, EventKind, LinkAddr, PortRunner, Registry, RunnerConfig};
use tidy_tuntap::Tap;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let usage = "usage: peer <tap> <addr-hi hex> <addr-lo hex> [message]";
    let tap_name = args.next().expect(usage);
    let hi = u16::from_str_radix(&args.next().expect(usage), 16).expect("bad addr-hi");
    let lo = u32::from_str_radix(&args.next().expect(usage), 16).expect("bad addr-lo");
    let message = args.next();

    let registry = Registry::new();
    let module_id = registry.alloc_driver("ecnl0");
    let module = registry.module(module_id).unwrap();

    let port_id = module.register_port(&tap_name);
    let port = module.port(port_id).unwrap();

    let tap = Tap::new(&tap_name, false).unwrap();
    tap.bring_up().unwrap();

    port.set_identity(LinkAddr::new(hi, lo));
    port.link_up();

    let ait_events = module.subscribe(Channel::Ait);
    let _runner = PortRunner::spawn(module.clone(), port_id, tap, RunnerConfig::default()).unwrap();

    if let Some(message) = message {
        let space = module
            .send_ait_message(port_id, message.into_bytes())
            .unwrap();
        println!(">>> message queued, {space} slots left");
    }

    println!(">>> waiting for atomic messages on {tap_name} ...");
    loop {
        let event = ait_events.recv().unwrap();

        if let EventKind::AitGot { num_messages } = event.kind {
            println!(">>> {num_messages} message(s) pending");
            while let Some(receipt) = module.retrieve_ait_message(port_id, None).unwrap() {
                println!(">>> got: {}", String::from_utf8_lossy(receipt.frame.data()));
            }
        }
    }
}
