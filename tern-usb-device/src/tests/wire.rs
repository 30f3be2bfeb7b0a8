use super::*;
use crate::types::{Direction, EndpointType, UsbSpeed};
extern crate alloc;

#[test]
fn setup_from_bytes() {
    // GET_DESCRIPTOR(Device), wLength 64
    let p = SetupPacket::from_bytes([0x80, 6, 0, 1, 0, 0, 64, 0]);
    assert_eq!(p.bmRequestType, 0x80);
    assert_eq!(p.bRequest, GET_DESCRIPTOR);
    assert_eq!(p.wValue, 0x0100);
    assert_eq!(p.wIndex, 0);
    assert_eq!(p.wLength, 64);
    assert_eq!(p.direction(), Direction::In);
    assert_eq!(p.request_type(), RequestType::Standard);
    assert_eq!(p.recipient(), Recipient::Device);
}

#[test]
fn setup_decodes_class_interface() {
    // HID SET_IDLE
    let p = SetupPacket::from_bytes([0x21, 0x0A, 0, 125, 0, 0, 0, 0]);
    assert_eq!(p.direction(), Direction::Out);
    assert_eq!(p.request_type(), RequestType::Class);
    assert_eq!(p.recipient(), Recipient::Interface);
    assert_eq!(p.wValue >> 8, 125);
}

#[test]
fn setup_decodes_vendor_other() {
    let p = SetupPacket::from_bytes([0xC3, 1, 0, 0, 0, 0, 0, 0]);
    assert_eq!(p.request_type(), RequestType::Vendor);
    assert_eq!(p.recipient(), Recipient::Other);
}

#[test]
fn setup_reserved_bits() {
    let p = SetupPacket::from_bytes([0x60, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(p.request_type(), RequestType::Reserved);
    let p = SetupPacket::from_bytes([0x1F, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(p.recipient(), Recipient::Reserved);
}

#[test]
fn descriptor_struct_layouts() {
    assert_eq!(core::mem::size_of::<SetupPacket>(), 8);
    assert_eq!(core::mem::size_of::<DeviceDescriptor>(), 18);
    assert_eq!(core::mem::size_of::<ConfigurationDescriptor>(), 9);
    assert_eq!(core::mem::size_of::<InterfaceDescriptor>(), 9);
    assert_eq!(core::mem::size_of::<EndpointDescriptor>(), 7);
    assert_eq!(
        core::mem::size_of::<InterfaceAssociationDescriptor>(),
        8
    );
    assert_eq!(
        core::mem::size_of::<DeviceQualifierDescriptor>(),
        10
    );
}

#[derive(Default)]
struct Counter {
    configurations: usize,
    interfaces: usize,
    endpoints: usize,
    associations: usize,
    others: usize,
    in_endpoints: u16,
    out_endpoints: u16,
}

impl DescriptorVisitor for Counter {
    fn on_configuration(&mut self, _c: &ConfigurationDescriptor) {
        self.configurations += 1;
    }
    fn on_interface(&mut self, _i: &InterfaceDescriptor) {
        self.interfaces += 1;
    }
    fn on_endpoint(&mut self, e: &EndpointDescriptor) {
        self.endpoints += 1;
        if (e.bEndpointAddress & 0x80) == 0x80 {
            self.in_endpoints |= 1 << (e.bEndpointAddress & 15);
        } else {
            self.out_endpoints |= 1 << (e.bEndpointAddress & 15);
        }
    }
    fn on_interface_association(
        &mut self,
        _a: &InterfaceAssociationDescriptor,
    ) {
        self.associations += 1;
    }
    fn on_other(&mut self, _d: &[u8]) {
        self.others += 1;
    }
}

const KEYBOARD_CONFIG: &[u8] = &[
    9, 2, 59, 0, 2, 1, 0, 160, 49, 9, 4, 0, 0, 1, 3, 1, 1, 0, 9, 33, 16,
    1, 0, 1, 34, 65, 0, 7, 5, 129, 3, 8, 0, 10, 9, 4, 1, 0, 1, 3, 1, 2,
    0, 9, 33, 16, 1, 0, 1, 34, 216, 0, 7, 5, 130, 3, 8, 0, 10,
];

#[test]
fn parse_walks_everything() {
    let mut v = Counter::default();
    parse_descriptors(KEYBOARD_CONFIG, &mut v);
    assert_eq!(v.configurations, 1);
    assert_eq!(v.interfaces, 2);
    assert_eq!(v.endpoints, 2);
    assert_eq!(v.others, 2); // two HID class descriptors
    assert_eq!(v.in_endpoints, 0b110);
    assert_eq!(v.out_endpoints, 0);
}

#[test]
fn parse_stops_at_truncation() {
    let mut v = Counter::default();
    parse_descriptors(&KEYBOARD_CONFIG[..20], &mut v);
    assert_eq!(v.configurations, 1);
    assert_eq!(v.interfaces, 1);
    assert_eq!(v.endpoints, 0);
}

#[test]
fn parse_rejects_zero_length_descriptor() {
    let mut v = Counter::default();
    parse_descriptors(&[9, 2, 9, 0, 0, 1, 0, 160, 49, 0, 0, 0], &mut v);
    assert_eq!(v.configurations, 1);
    assert_eq!(v.others, 0);
}

#[test]
fn packet_sizes_by_type_and_speed() {
    use crate::wire::max_packet_legal as legal;

    assert!(legal(EndpointType::Control, UsbSpeed::Low1_1, 8).is_ok());
    assert!(legal(EndpointType::Control, UsbSpeed::Low1_1, 16).is_err());
    assert!(legal(EndpointType::Control, UsbSpeed::High480, 64).is_ok());
    assert!(
        legal(EndpointType::Control, UsbSpeed::High480, 32).is_err()
    );

    assert!(legal(EndpointType::Bulk, UsbSpeed::Full12, 64).is_ok());
    assert!(legal(EndpointType::Bulk, UsbSpeed::Full12, 48).is_err());
    assert!(legal(EndpointType::Bulk, UsbSpeed::High480, 512).is_ok());
    assert!(legal(EndpointType::Bulk, UsbSpeed::High480, 64).is_err());
    assert!(legal(EndpointType::Bulk, UsbSpeed::Low1_1, 8).is_err());

    assert!(legal(EndpointType::Interrupt, UsbSpeed::Low1_1, 8).is_ok());
    assert!(
        legal(EndpointType::Interrupt, UsbSpeed::Low1_1, 16).is_err()
    );
    assert!(
        legal(EndpointType::Interrupt, UsbSpeed::Full12, 64).is_ok()
    );
    assert!(
        legal(EndpointType::Interrupt, UsbSpeed::High480, 1024).is_ok()
    );

    assert!(
        legal(EndpointType::Isochronous, UsbSpeed::Full12, 1023).is_ok()
    );
    assert!(
        legal(EndpointType::Isochronous, UsbSpeed::Full12, 1024)
            .is_err()
    );
    assert!(
        legal(EndpointType::Isochronous, UsbSpeed::Low1_1, 8).is_err()
    );
}
