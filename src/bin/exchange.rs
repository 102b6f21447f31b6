use std::env;
use std::thread;
use std::time::{Duration, Instant};

use eclp::{Channel, EventKind, LinkAddr, PortRunner, Registry, RunnerConfig};
use tidy_tuntap::Tap;

// Drives one module with two ports wired back to back (e.g. a veth pair
// with taps bridged on both ends) and pushes one atomic message across.
fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let usage = "usage: exchange <tap-a> <tap-b>";
    let tap_a = args.next().expect(usage);
    let tap_b = args.next().expect(usage);

    let registry = Registry::new();
    let module_id = registry.alloc_driver("ecnl0");
    let module = registry.module(module_id).unwrap();

    let send_port = module.register_port(&tap_a);
    let retr_port = module.register_port(&tap_b);

    let dev_a = Tap::new(&tap_a, false).unwrap();
    dev_a.bring_up().unwrap();
    let dev_b = Tap::new(&tap_b, false).unwrap();
    dev_b.bring_up().unwrap();

    // Distinct addresses; A is the greater and becomes master.
    module.port(send_port).unwrap().set_identity(LinkAddr::new(0x0001, 0x0000_0002));
    module.port(retr_port).unwrap().set_identity(LinkAddr::new(0x0001, 0x0000_0001));
    module.port(send_port).unwrap().link_up();
    module.port(retr_port).unwrap().link_up();

    let ait_events = module.subscribe(Channel::Ait);

    let runner_a =
        PortRunner::spawn(module.clone(), send_port, dev_a, RunnerConfig::default()).unwrap();
    let runner_b =
        PortRunner::spawn(module.clone(), retr_port, dev_b, RunnerConfig::default()).unwrap();

    for port_id in [send_port, retr_port] {
        let state = module.get_port_state(port_id).unwrap();
        println!(
            "port {} ({}) is {}",
            port_id,
            state.name,
            if state.link_up { "up" } else { "down" }
        );
    }

    let frame = b"Plain Text Message".to_vec();
    println!("send_ait_message ({} bytes) on port {}", frame.len(), send_port);
    module.send_ait_message(send_port, frame).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match ait_events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(event) => {
                if !matches!(event.kind, EventKind::AitGot { .. }) || event.port_id != retr_port {
                    continue;
                }
                let receipt = module
                    .retrieve_ait_message(retr_port, None)
                    .unwrap()
                    .expect("signaled but queue empty");
                println!(
                    "retrieve_ait_message: ({} bytes) '{}'",
                    receipt.frame.message_len(),
                    String::from_utf8_lossy(receipt.frame.data())
                );
                break;
            }
            Err(_) => {
                eprintln!("no delivery within 10s; is the tap pair bridged?");
                break;
            }
        }
    }

    thread::sleep(Duration::from_millis(100));
    runner_a.stop();
    runner_b.stop();
}
