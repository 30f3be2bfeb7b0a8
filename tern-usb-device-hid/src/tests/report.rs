use super::*;
extern crate alloc;

/// The HID 1.11 appendix B.1 boot keyboard: 8-byte input report
/// (modifiers, reserved, six keycodes), 1-byte output report (LEDs)
const BOOT_KEYBOARD: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum
    0x29, 0xE7, //   Usage Maximum
    0x15, 0x00, //   Logical Minimum
    0x25, 0x01, //   Logical Maximum
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant)
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum
    0x29, 0x05, //   Usage Maximum
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant)
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum
    0x25, 0x65, //   Logical Maximum
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum
    0x29, 0x65, //   Usage Maximum
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

/// Two numbered reports sharing one interface
const NUMBERED: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x01, //   Report ID (1)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x03, //   Report Count (3)
    0x81, 0x02, //   Input
    0x85, 0x02, //   Report ID (2)
    0x95, 0x04, //   Report Count (4)
    0x81, 0x02, //   Input
    0x95, 0x02, //   Report Count (2)
    0xB1, 0x02, //   Feature
    0xC0, // End Collection
];

#[test]
fn boot_keyboard_sizes() {
    let r = ReportStructure::parse(BOOT_KEYBOARD).unwrap();
    assert!(!r.has_report_ids());
    assert_eq!(r.max_size(ReportType::Input), 8);
    assert_eq!(r.max_size(ReportType::Output), 1);
    assert_eq!(r.max_size(ReportType::Feature), 0);
    assert_eq!(r.report_size(ReportType::Input, 0), Some(8));
    assert_eq!(r.report_size(ReportType::Output, 0), Some(1));
    assert_eq!(r.report_size(ReportType::Input, 1), None);
}

#[test]
fn numbered_reports_get_prefix_byte() {
    let r = ReportStructure::parse(NUMBERED).unwrap();
    assert!(r.has_report_ids());
    // 3 and 4 data bytes, plus the ID byte each
    assert_eq!(r.report_size(ReportType::Input, 1), Some(4));
    assert_eq!(r.report_size(ReportType::Input, 2), Some(5));
    assert_eq!(r.max_size(ReportType::Input), 5);
    assert_eq!(r.report_size(ReportType::Feature, 2), Some(3));
    assert_eq!(r.max_size(ReportType::Feature), 3);
}

#[test]
fn parse_is_deterministic() {
    let a = ReportStructure::parse(NUMBERED).unwrap();
    let b = ReportStructure::parse(NUMBERED).unwrap();
    for t in
        [ReportType::Input, ReportType::Output, ReportType::Feature]
    {
        assert_eq!(a.max_size(t), b.max_size(t));
        for id in 0..=3 {
            assert_eq!(a.report_size(t, id), b.report_size(t, id));
        }
    }
}

#[test]
fn bit_sizes_round_up() {
    // 12 bits of input: two octets on the wire
    let d = &[
        0xA1, 0x01, // Collection
        0x75, 0x03, // Report Size (3)
        0x95, 0x04, // Report Count (4)
        0x81, 0x02, // Input
        0xC0,
    ];
    let r = ReportStructure::parse(d).unwrap();
    assert_eq!(r.report_size(ReportType::Input, 0), Some(2));
}

#[test]
fn push_pop_restores_globals() {
    let d = &[
        0xA1, 0x01, // Collection
        0x75, 0x08, // Report Size (8)
        0x95, 0x01, // Report Count (1)
        0xA4, //       Push
        0x75, 0x01, // Report Size (1)
        0x95, 0x04, // Report Count (4)
        0x81, 0x02, // Input: 4 bits
        0xB4, //       Pop
        0x81, 0x02, // Input: 8 more bits with the outer globals
        0xC0,
    ];
    let r = ReportStructure::parse(d).unwrap();
    // 4 + 8 = 12 bits: 2 octets
    assert_eq!(r.report_size(ReportType::Input, 0), Some(2));
}

#[test]
fn pop_from_empty_stack_is_invalid() {
    let d = &[0xA1, 0x01, 0xB4, 0xC0];
    assert!(matches!(
        ReportStructure::parse(d),
        Err(HidError::ReportInvalid)
    ));
}

#[test]
fn push_overflow_is_reported() {
    let mut d = alloc::vec::Vec::new();
    d.extend_from_slice(&[0xA1, 0x01]);
    for _ in 0..(PUSH_POP_DEPTH + 1) {
        d.push(0xA4);
    }
    d.push(0xC0);
    assert!(matches!(
        ReportStructure::parse(&d),
        Err(HidError::ReportPushPopAlloc)
    ));
}

#[test]
fn unbalanced_collections_are_invalid() {
    assert!(matches!(
        ReportStructure::parse(&[0xA1, 0x01]),
        Err(HidError::ReportInvalid)
    ));
    assert!(matches!(
        ReportStructure::parse(&[0xC0]),
        Err(HidError::ReportInvalid)
    ));
}

#[test]
fn truncated_payload_is_invalid() {
    // Prefix promises two payload bytes, only one follows
    assert!(matches!(
        ReportStructure::parse(&[0x76, 0x01]),
        Err(HidError::ReportInvalid)
    ));
}

#[test]
fn unknown_item_is_invalid() {
    assert!(matches!(
        ReportStructure::parse(&[0xF0]),
        Err(HidError::ReportInvalid)
    ));
}

#[test]
fn four_byte_items_parse() {
    let d = &[
        0xA1, 0x01, // Collection
        0x17, 0x00, 0x00, 0x00, 0x80, // Logical Minimum, 4 bytes
        0x27, 0xFF, 0xFF, 0xFF, 0x7F, // Logical Maximum, 4 bytes
        0x75, 0x20, // Report Size (32)
        0x95, 0x01, // Report Count (1)
        0x81, 0x02, // Input
        0xC0,
    ];
    let r = ReportStructure::parse(d).unwrap();
    assert_eq!(r.report_size(ReportType::Input, 0), Some(4));
}

#[test]
fn input_buffers_preload_report_id() {
    let r = ReportStructure::parse(NUMBERED).unwrap();
    let record = r.record(ReportType::Input, 2).unwrap();
    assert_eq!(record.data.borrow()[0], 2);
    let record = r.record(ReportType::Input, 1).unwrap();
    assert_eq!(record.data.borrow()[0], 1);
}

#[test]
fn idle_scheduler_period() {
    let r = ReportStructure::parse(BOOT_KEYBOARD).unwrap();
    // 500 ms = 125 four-millisecond units
    r.set_idle(0, 125).unwrap();
    assert_eq!(r.idle_rate(0), Some(125));

    // First tick serves immediately, then every 125 ticks
    assert_eq!(r.tick().as_slice(), &[0]);
    for _ in 0..124 {
        assert!(r.tick().is_empty());
    }
    assert_eq!(r.tick().as_slice(), &[0]);
    for _ in 0..124 {
        assert!(r.tick().is_empty());
    }
    assert_eq!(r.tick().as_slice(), &[0]);
}

#[test]
fn idle_zero_stops_resends() {
    let r = ReportStructure::parse(BOOT_KEYBOARD).unwrap();
    r.set_idle(0, 1).unwrap();
    assert_eq!(r.tick().as_slice(), &[0]);
    assert_eq!(r.tick().as_slice(), &[0]);

    r.set_idle(0, 0).unwrap();
    for _ in 0..10 {
        assert!(r.tick().is_empty());
    }
}

#[test]
fn idle_relink_after_stop() {
    let r = ReportStructure::parse(BOOT_KEYBOARD).unwrap();
    r.set_idle(0, 1).unwrap();
    assert_eq!(r.tick().as_slice(), &[0]);
    r.set_idle(0, 0).unwrap();
    assert!(r.tick().is_empty());
    // Re-enabling after the unlink must not corrupt the list
    r.set_idle(0, 1).unwrap();
    assert_eq!(r.tick().as_slice(), &[0]);
    assert_eq!(r.tick().as_slice(), &[0]);
}

#[test]
fn broadcast_idle_addresses_every_report() {
    let r = ReportStructure::parse(NUMBERED).unwrap();
    r.set_idle(IDLE_ALL_REPORTS, 2).unwrap();
    assert_eq!(r.idle_rate(1), Some(2));
    assert_eq!(r.idle_rate(2), Some(2));

    let due = r.tick();
    assert_eq!(due.len(), 2);
    assert!(due.contains(&1));
    assert!(due.contains(&2));
}

#[test]
fn set_idle_unknown_id_fails() {
    let r = ReportStructure::parse(NUMBERED).unwrap();
    assert_eq!(r.set_idle(7, 10), Err(HidError::ReportInvalid));
}

#[test]
fn remove_all_idle_clears_list() {
    let r = ReportStructure::parse(NUMBERED).unwrap();
    r.set_idle(IDLE_ALL_REPORTS, 3).unwrap();
    r.remove_all_idle();
    assert_eq!(r.idle_rate(1), Some(IDLE_INFINITE));
    assert_eq!(r.idle_rate(2), Some(IDLE_INFINITE));
    assert!(r.tick().is_empty());
    assert!(r.tick().is_empty());
}

#[test]
fn fresh_write_reloads_countdown() {
    let r = ReportStructure::parse(BOOT_KEYBOARD).unwrap();
    r.set_idle(0, 4).unwrap();
    assert_eq!(r.tick().as_slice(), &[0]); // immediate
    assert!(r.tick().is_empty()); // count 3
    r.store_input(&[1, 2, 3, 4, 5, 6, 7, 8]);
    // The fresh report postpones the next resend by a full period
    assert!(r.tick().is_empty());
    assert!(r.tick().is_empty());
    assert!(r.tick().is_empty());
    assert_eq!(r.tick().as_slice(), &[0]);
}

#[test]
fn stored_input_is_returned() {
    let r = ReportStructure::parse(BOOT_KEYBOARD).unwrap();
    r.store_input(&[9, 8, 7, 6, 5, 4, 3, 2]);
    let record = r.record(ReportType::Input, 0).unwrap();
    assert_eq!(&record.data.borrow()[..8], &[9, 8, 7, 6, 5, 4, 3, 2]);
}
