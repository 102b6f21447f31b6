//! Module registry and control surface: port/table bookkeeping, the AIT
//! operations, ALO registers, and the bridge walk.

use eclp::{
    control_frame, AloReg, Channel, EclpFrame, Error, EventKind, LinkAddr, MsgType, PortNotice,
    Registry, TableEntry, ETH_P_ECLD, FW_TABLE_ENTRY_ARRAY,
};

#[test]
fn registry_hands_out_modules_by_id() {
    let registry = Registry::new();
    let id = registry.alloc_driver("ecnl0");
    assert_eq!(id, 0);
    assert_eq!(registry.alloc_driver("ecnl1"), 1);

    assert!(registry.module(id).is_ok());
    assert!(matches!(registry.module(9), Err(Error::NoSuchModule(9))));
}

#[test]
fn module_reports_ports_and_their_state() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();

    let p0 = module.register_port("enp7s0");
    let p1 = module.register_port("enp9s0");
    assert_eq!((p0, p1), (0, 1));

    let info = module.get_module_info();
    assert_eq!(info.name, "ecnl0");
    assert_eq!(info.num_ports, 2);

    let state = module.get_port_state(p0).unwrap();
    assert_eq!(state.name, "enp7s0");
    assert!(!state.link_up);
    assert_eq!(state.num_queued, 0);

    assert!(matches!(
        module.get_port_state(5),
        Err(Error::NoSuchPort(5))
    ));
}

#[test]
fn ait_send_and_retrieve_surface() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let port = module.register_port("enp7s0");

    let space = module.send_ait_message(port, b"one".to_vec()).unwrap();
    assert_eq!(space, 31);

    // Same wire shape, same queue.
    let space = module.signal_ait_message(port, b"two".to_vec()).unwrap();
    assert_eq!(space, 30);

    assert!(module.retrieve_ait_message(port, None).unwrap().is_none());

    assert!(matches!(
        module.send_ait_message(port, vec![0; 300]),
        Err(Error::OversizeMessage(300))
    ));
    assert!(matches!(
        module.send_ait_message(7, b"x".to_vec()),
        Err(Error::NoSuchPort(7))
    ));
}

#[test]
fn queue_full_reports_nomem_condition() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let port = module.register_port("enp7s0");

    for i in 0..32u8 {
        module.send_ait_message(port, vec![i]).unwrap();
    }
    assert!(matches!(
        module.send_ait_message(port, b"late".to_vec()),
        Err(Error::QueueFull(_))
    ));
}

#[test]
fn alo_writes_publish_updates() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let port = module.register_port("enp7s0");

    let alo_events = module.subscribe(Channel::Alo);

    module.write_alo_register(port, 4, 0xFEED).unwrap();

    let event = alo_events.try_recv().unwrap();
    assert_eq!(event.port_id, port);
    match event.kind {
        EventKind::AloUpdate { flags, regs } => {
            assert_eq!(flags, 1 << 4);
            assert_eq!(regs[4], 0xFEED);
        }
        other => panic!("wrong event {:?}", other),
    }

    let (flags, regs) = module.read_alo_registers(port).unwrap();
    assert_eq!(flags, 1 << 4);
    assert_eq!(regs[4], 0xFEED);

    assert!(module.write_alo_register(port, 32, 1).is_err());
}

#[test]
fn retrieve_applies_piggybacked_register_write() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let port = module.register_port("enp7s0");

    let got = module
        .retrieve_ait_message(port, Some(AloReg { no: 2, data: 9 }))
        .unwrap();
    assert!(got.is_none());

    let (flags, regs) = module.read_alo_registers(port).unwrap();
    assert_eq!(flags, 1 << 2);
    assert_eq!(regs[2], 9);
}

#[test]
fn table_lifecycle_is_guarded() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();

    let id = module.alloc_table(8).unwrap();
    module
        .fill_table_entry(id, 3, TableEntry::new(1, 0x0003, [0; FW_TABLE_ENTRY_ARRAY]))
        .unwrap();
    assert!(module
        .fill_table_entry(id, 8, TableEntry::new(0, 0, [0; FW_TABLE_ENTRY_ARRAY]))
        .is_err());

    module.select_table(id).unwrap();
    assert!(matches!(module.dealloc_table(id), Err(Error::TableInUse(_))));
    assert!(matches!(module.select_table(5), Err(Error::NoSuchTable(5))));

    let spare = module.alloc_table(2).unwrap();
    module.dealloc_table(spare).unwrap();
}

#[test]
fn bridge_walk_clones_to_ports_and_host() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let p0 = module.register_port("enp7s0");
    let p1 = module.register_port("enp9s0");

    // Entry 0: host bit plus port 1, next hop 42 everywhere.
    let id = module.alloc_table(4).unwrap();
    module
        .fill_table(
            id,
            0,
            &[TableEntry::new(0, 0b0000_0000_0000_0101, [42; FW_TABLE_ENTRY_ARRAY])],
        )
        .unwrap();
    module.select_table(id).unwrap();
    module.start_forwarding();
    assert!(module.forwarding());

    // Forward-marked AIT frame arriving on port 0 with next-hop id 0.
    let mut dst = [0u8; 6];
    dst[0] = 0x80;
    let frame = control_frame(dst, LinkAddr::new(0, 0), MsgType::Ait.raw(), 0);

    let ait_events = module.subscribe(Channel::Ait);
    let arriving = module.port(p0).unwrap();
    module.process_notices(&arriving, vec![PortNotice::Forward(frame.clone())]);

    // Host copy.
    assert_eq!(module.read_host_frame().unwrap(), frame);

    // Port 1 copy with the next-hop id stamped in.
    let hops = module.port(p1).unwrap().drain_out();
    assert_eq!(hops.len(), 1);
    let parsed = EclpFrame::parse(&hops[0]).unwrap();
    assert_eq!(parsed.next_hop_id(), 42);

    // In-transit atomic traffic surfaces on the ait channel.
    assert!(matches!(
        ait_events.try_recv().unwrap().kind,
        EventKind::AitForward { .. }
    ));

    module.stop_forwarding();
    assert!(!module.forwarding());
}

#[test]
fn discovery_send_is_fire_and_forget() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let port_id = module.register_port("enp7s0");
    let port = module.port(port_id).unwrap();
    port.set_identity(LinkAddr::new(0x0001, 0x0000_0002));

    module
        .send_discover_message(port_id, b"anyone".to_vec())
        .unwrap();

    let queued = port.drain_out();
    assert_eq!(queued.len(), 1);
    let parsed = EclpFrame::parse(&queued[0]).unwrap();
    assert_eq!(parsed.ether_type, ETH_P_ECLD);
    assert_eq!(parsed.payload, b"anyone");
    assert_eq!(parsed.from_addr(), LinkAddr::new(0x0001, 0x0000_0002));
}

#[test]
fn host_transmit_is_held_until_the_link_clock_allows() {
    let registry = Registry::new();
    let module = registry.module(registry.alloc_driver("ecnl0")).unwrap();
    let port_id = module.register_port("enp7s0");

    // Link never came up; the frame parks in the holding queue rather
    // than going out unclocked.
    module.transmit(port_id, b"payload".to_vec()).unwrap();
    assert!(module.port(port_id).unwrap().drain_out().is_empty());
}
