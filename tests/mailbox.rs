use std::sync::{Arc, Mutex};
use std::thread;

use cxl::uapi::{CxlCommandInfo, CXL_MEM_COMMAND_FLAG_MUTEX};
use cxl::{
    catalog, command_name, lookup, CommandBuilder, CommandFlags, CommandId, CxlError,
    EmulatedMemdev, Memdev, PayloadSize, ValidationError, CEL_UUID,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn catalog_lookup_bounds() {
    assert_eq!(catalog().len(), 5);
    assert_eq!(lookup(1).unwrap().name, "Identify Command");
    assert_eq!(
        lookup(4).unwrap().size_in,
        PayloadSize::Fixed(cxl::GET_LOG_INPUT_SIZE)
    );
    assert!(matches!(lookup(5), Err(CxlError::NotFound { id: 5 })));
    assert!(matches!(lookup(u32::MAX), Err(CxlError::NotFound { .. })));
    assert_eq!(command_name(77), "Unknown Command");
}

#[test]
fn every_absent_id_is_unknown_except_raw() {
    init_tracing();
    // Only Identify advertised.
    let dev = EmulatedMemdev::new().with_commands(vec![CxlCommandInfo {
        id: 1,
        flags: 0,
        size_in: 0,
        size_out: 0x43,
    }]);
    let memdev = Memdev::open("mem0", dev).unwrap();

    for id in [0u32, 3, 4, 5, 9] {
        let err = CommandBuilder::new(id)
            .out_capacity(16)
            .build(memdev.supported())
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownCommand { id });
    }

    // RAW is never checked against the supported set.
    let raw = CommandBuilder::raw(0x0001)
        .build(memdev.supported())
        .unwrap();
    assert!(raw.is_raw());
}

#[test]
fn identify_sizes_must_match_exactly() {
    let mut memdev = Memdev::open("mem0", EmulatedMemdev::new()).unwrap();
    let small = CommandBuilder::new(CommandId::Identify).out_capacity(0x40);
    assert!(matches!(
        memdev.run(small),
        Err(CxlError::Validation(ValidationError::BufferTooSmall {
            required: 0x43,
            capacity: 0x40,
            ..
        }))
    ));
    let big = CommandBuilder::new(CommandId::Identify).out_capacity(0x100);
    assert!(matches!(
        memdev.run(big),
        Err(CxlError::Validation(ValidationError::SizeMismatch { .. }))
    ));
    let with_input = CommandBuilder::new(CommandId::Identify)
        .payload_in(vec![0u8; 4])
        .out_capacity(0x43);
    assert!(matches!(
        memdev.run(with_input),
        Err(CxlError::Validation(ValidationError::SizeMismatch {
            expected: 0,
            actual: 4,
            ..
        }))
    ));
    assert!(memdev.into_transport().sent().is_empty());
}

#[test]
fn mutex_flag_is_visible_to_callers() {
    let dev = EmulatedMemdev::new().with_commands(vec![
        CxlCommandInfo {
            id: 1,
            flags: CXL_MEM_COMMAND_FLAG_MUTEX,
            size_in: 0,
            size_out: 0x43,
        },
        CxlCommandInfo {
            id: 3,
            flags: 0,
            size_in: 0,
            size_out: -1,
        },
    ]);
    let memdev = Memdev::open("mem0", dev).unwrap();
    assert!(memdev.requires_mutex(CommandId::Identify));
    assert!(!memdev.requires_mutex(CommandId::GetSupportedLogs));
    assert_eq!(
        memdev.descriptor(CommandId::Identify).unwrap().flags,
        CommandFlags::REQUIRES_MUTEX
    );
}

#[test]
fn shared_session_is_serialised_by_the_caller() {
    init_tracing();
    let memdev = Arc::new(Mutex::new(
        Memdev::open("mem0", EmulatedMemdev::new()).unwrap(),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let memdev = Arc::clone(&memdev);
            thread::spawn(move || {
                for _ in 0..8 {
                    let mut guard = memdev.lock().unwrap();
                    let logs = guard.get_supported_logs().unwrap();
                    assert_eq!(logs[0].uuid, CEL_UUID);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let memdev = Arc::try_unwrap(memdev).unwrap().into_inner().unwrap();
    assert_eq!(memdev.into_transport().sent().len(), 32);
}

#[test]
fn transport_errors_are_not_retried() {
    let mut dev = EmulatedMemdev::new();
    let supported = cxl::query_all(&mut dev).unwrap();
    dev.set_faults(cxl::Faults {
        errno: Some(libc::EIO),
        ..Default::default()
    });
    let request = CommandBuilder::new(CommandId::Identify)
        .out_capacity(0x43)
        .build(&supported)
        .unwrap();
    let err = cxl::submit(&mut dev, request).unwrap_err();
    assert!(matches!(&err, CxlError::Transport(e) if e.raw_os_error() == Some(libc::EIO)));
    assert_eq!(dev.sent().len(), 1);
}

#[test]
fn raw_command_can_leave_input_size_to_the_device() {
    let mut memdev = Memdev::open("mem0", EmulatedMemdev::new()).unwrap();
    let result = memdev
        .run(
            CommandBuilder::raw(0x4000)
                .size_in_variable()
                .out_capacity(0x43),
        )
        .unwrap();
    assert_eq!(result.retval, 0);
    assert_eq!(result.size_out, 0x43);

    let sent = memdev.into_transport();
    assert_eq!(sent.sent()[0].command.size_in, -1);
    assert!(sent.sent()[0].payload_in.is_empty());
}
