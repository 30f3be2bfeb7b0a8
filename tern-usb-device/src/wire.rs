use crate::debug;
use crate::types::{Direction, UsbError};

/// A SETUP packet as received on endpoint 0.
///
/// Every control transaction starts with eight bytes in this format;
/// the layout (and the un-Rust-like field names) come from the USB 2.0
/// specification, section 9.3. The interrupt handler captures the raw
/// bytes and passes them to the core through
/// [`EventQueue::setup()`](crate::event::EventQueue::setup); the
/// standard request handler decodes the `bmRequestType` bitfield with
/// the accessors below.
#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-2
pub struct SetupPacket {
    /// The type and specific target of the request.
    pub bmRequestType: u8,
    /// The particular request.
    pub bRequest: u8,
    /// A parameter to the request.
    pub wValue: u16,
    /// A second parameter to the request.
    pub wIndex: u16,
    /// The length of the subsequent IN or OUT data phase; zero if the
    /// setup packet itself carries all the information.
    pub wLength: u16,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for SetupPacket {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for SetupPacket {}

/// bmRequestType bits 6..5
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// bmRequestType bits 4..0
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

impl SetupPacket {
    /// Reassemble from the eight bytes the controller captured
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self {
            bmRequestType: bytes[0],
            bRequest: bytes[1],
            wValue: u16::from_le_bytes([bytes[2], bytes[3]]),
            wIndex: u16::from_le_bytes([bytes[4], bytes[5]]),
            wLength: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Direction of the data phase (meaningless when wLength is zero)
    pub fn direction(&self) -> Direction {
        if (self.bmRequestType & DEVICE_TO_HOST) != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self.bmRequestType & 0x60 {
            STANDARD_REQUEST => RequestType::Standard,
            CLASS_REQUEST => RequestType::Class,
            VENDOR_REQUEST => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.bmRequestType & 0x1F {
            RECIPIENT_DEVICE => Recipient::Device,
            RECIPIENT_INTERFACE => Recipient::Interface,
            RECIPIENT_ENDPOINT => Recipient::Endpoint,
            RECIPIENT_OTHER => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-8
pub struct DeviceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bcdUSB: [u8; 2],
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,

    pub idVendor: [u8; 2],
    pub idProduct: [u8; 2],
    pub bcdDevice: [u8; 2],
    pub iManufacturer: u8,
    pub iProduct: u8,
    pub iSerialNumber: u8,
    pub bNumConfigurations: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for DeviceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for DeviceDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-10
pub struct ConfigurationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub wTotalLength: [u8; 2],
    pub bNumInterfaces: u8,
    pub bConfigurationValue: u8,
    pub iConfiguration: u8,
    pub bmAttributes: u8,
    pub bMaxPower: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ConfigurationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ConfigurationDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-12
pub struct InterfaceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bInterfaceNumber: u8,
    pub bAlternateSetting: u8,
    pub bNumEndpoints: u8,
    pub bInterfaceClass: u8,
    pub bInterfaceSubClass: u8,
    pub bInterfaceProtocol: u8,
    pub iInterface: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-13
pub struct EndpointDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bEndpointAddress: u8,
    pub bmAttributes: u8,
    pub wMaxPacketSize: [u8; 2],
    pub bInterval: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for EndpointDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for EndpointDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB ECN "Interface
                         // Association Descriptors" table 9-Z
pub struct InterfaceAssociationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bFirstInterface: u8,
    pub bInterfaceCount: u8,
    pub bFunctionClass: u8,
    pub bFunctionSubClass: u8,
    pub bFunctionProtocol: u8,
    pub iFunction: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceAssociationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceAssociationDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-9
pub struct DeviceQualifierDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bcdUSB: [u8; 2],
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,
    pub bNumConfigurations: u8,
    pub bReserved: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for DeviceQualifierDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for DeviceQualifierDescriptor {}

// For request_type (USB 2.0 table 9-2)
pub const DEVICE_TO_HOST: u8 = 0x80;
pub const HOST_TO_DEVICE: u8 = 0;
pub const STANDARD_REQUEST: u8 = 0;
pub const CLASS_REQUEST: u8 = 0x20;
pub const VENDOR_REQUEST: u8 = 0x40;
pub const RECIPIENT_DEVICE: u8 = 0;
pub const RECIPIENT_INTERFACE: u8 = 1;
pub const RECIPIENT_ENDPOINT: u8 = 2;
pub const RECIPIENT_OTHER: u8 = 3;

// For request (USB 2.0 table 9-4)
pub const GET_STATUS: u8 = 0;
pub const CLEAR_FEATURE: u8 = 1;
pub const SET_FEATURE: u8 = 3;
pub const SET_ADDRESS: u8 = 5;
pub const GET_DESCRIPTOR: u8 = 6;
pub const SET_DESCRIPTOR: u8 = 7;
pub const GET_CONFIGURATION: u8 = 8;
pub const SET_CONFIGURATION: u8 = 9;
pub const GET_INTERFACE: u8 = 10;
pub const SET_INTERFACE: u8 = 11;
pub const SYNCH_FRAME: u8 = 12;

// Descriptor types (USB 2.0 table 9-5)
pub const DEVICE_DESCRIPTOR: u8 = 1;
pub const CONFIGURATION_DESCRIPTOR: u8 = 2;
pub const STRING_DESCRIPTOR: u8 = 3;
pub const INTERFACE_DESCRIPTOR: u8 = 4;
pub const ENDPOINT_DESCRIPTOR: u8 = 5;
pub const DEVICE_QUALIFIER_DESCRIPTOR: u8 = 6;
pub const OTHER_SPEED_CONFIGURATION_DESCRIPTOR: u8 = 7;
pub const INTERFACE_ASSOCIATION_DESCRIPTOR: u8 = 11;

// Feature selectors (USB 2.0 table 9-6)
pub const FEATURE_ENDPOINT_HALT: u16 = 0;
pub const FEATURE_DEVICE_REMOTE_WAKEUP: u16 = 1;
pub const FEATURE_TEST_MODE: u16 = 2;

// GET_STATUS reply bits (USB 2.0 figures 9-4 and 9-6)
pub const STATUS_SELF_POWERED: u16 = 1 << 0;
pub const STATUS_REMOTE_WAKEUP: u16 = 1 << 1;
pub const STATUS_ENDPOINT_HALT: u16 = 1 << 0;

// Configuration bmAttributes (USB 2.0 table 9-10)
pub const CONFIG_ATTR_MUST_BE_SET: u8 = 1 << 7;
pub const CONFIG_ATTR_SELF_POWERED: u8 = 1 << 6;
pub const CONFIG_ATTR_REMOTE_WAKEUP: u8 = 1 << 5;

/// Index of the Microsoft OS 1.0 string descriptor
#[cfg(feature = "msos")]
pub const MSOS_STRING_INDEX: u8 = 0xEE;

/// A read-side visitor over an assembled configuration tree.
///
/// The builder's output is opaque bytes; tests (and curious
/// applications) walk it back into structs with
/// [`parse_descriptors()`].
pub trait DescriptorVisitor {
    fn on_configuration(&mut self, _c: &ConfigurationDescriptor) {}
    fn on_interface(&mut self, _i: &InterfaceDescriptor) {}
    fn on_endpoint(&mut self, _e: &EndpointDescriptor) {}
    fn on_interface_association(
        &mut self,
        _a: &InterfaceAssociationDescriptor,
    ) {
    }
    fn on_other(&mut self, _d: &[u8]) {}
}

/// Log every descriptor in a buffer
pub struct ShowDescriptors;

impl DescriptorVisitor for ShowDescriptors {
    fn on_configuration(&mut self, c: &ConfigurationDescriptor) {
        debug::println!("{:?}", c);
    }
    fn on_interface(&mut self, i: &InterfaceDescriptor) {
        debug::println!("  {:?}", i);
    }
    fn on_endpoint(&mut self, e: &EndpointDescriptor) {
        debug::println!("    {:?}", e);
    }
    fn on_interface_association(
        &mut self,
        a: &InterfaceAssociationDescriptor,
    ) {
        debug::println!("  {:?}", a);
    }
    fn on_other(&mut self, d: &[u8]) {
        let dlen = d[0];
        let dtype = d[1];
        let domain = match dtype & 0x60 {
            0x00 => "standard",
            0x20 => "class",
            0x40 => "vendor",
            _ => "reserved",
        };
        debug::println!("  {} type {} len {} skipped", domain, dtype, dlen);
    }
}

/// Walk a configuration-descriptor buffer, struct by struct
pub fn parse_descriptors(buf: &[u8], v: &mut impl DescriptorVisitor) {
    let mut index = 0;

    while buf.len() > index + 2 {
        let dlen = buf[index] as usize;
        let dtype = buf[index + 1];

        if dlen < 2 || buf.len() < index + dlen {
            return;
        }

        match dtype {
            CONFIGURATION_DESCRIPTOR
            | OTHER_SPEED_CONFIGURATION_DESCRIPTOR => {
                if let Ok(c) =
                    bytemuck::try_from_bytes(&buf[index..index + dlen])
                {
                    v.on_configuration(c);
                }
            }
            INTERFACE_DESCRIPTOR => {
                if let Ok(i) =
                    bytemuck::try_from_bytes(&buf[index..index + dlen])
                {
                    v.on_interface(i);
                }
            }
            ENDPOINT_DESCRIPTOR => {
                if let Ok(e) =
                    bytemuck::try_from_bytes(&buf[index..index + dlen])
                {
                    v.on_endpoint(e);
                }
            }
            INTERFACE_ASSOCIATION_DESCRIPTOR => {
                if let Ok(a) =
                    bytemuck::try_from_bytes(&buf[index..index + dlen])
                {
                    v.on_interface_association(a);
                }
            }
            _ => v.on_other(&buf[index..(index + dlen)]),
        }

        index += dlen;
    }
}

/// Max packet size legality per USB 2.0 section 5, by type and speed
pub fn max_packet_legal(
    ep_type: crate::types::EndpointType,
    speed: crate::types::UsbSpeed,
    size: u16,
) -> Result<(), UsbError> {
    use crate::types::{EndpointType, UsbSpeed};
    let ok = match (ep_type, speed) {
        (EndpointType::Control, UsbSpeed::Low1_1) => size == 8,
        (EndpointType::Control, UsbSpeed::Full12) => {
            matches!(size, 8 | 16 | 32 | 64)
        }
        (EndpointType::Control, UsbSpeed::High480) => size == 64,
        (EndpointType::Bulk, UsbSpeed::Full12) => {
            matches!(size, 8 | 16 | 32 | 64)
        }
        (EndpointType::Bulk, UsbSpeed::High480) => size == 512,
        (EndpointType::Interrupt, UsbSpeed::Low1_1) => size <= 8,
        (EndpointType::Interrupt, UsbSpeed::Full12) => size <= 64,
        (EndpointType::Interrupt, UsbSpeed::High480) => size <= 1024,
        (EndpointType::Isochronous, UsbSpeed::Full12) => size <= 1023,
        (EndpointType::Isochronous, UsbSpeed::High480) => size <= 1024,
        // No low-speed bulk or isochronous endpoints
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(UsbError::EpInvalidType)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/wire.rs"]
mod tests;
