use crate::class::ClassDriver;
use crate::topology::{ConfigHandle, EndpointInfo, Topology};
use crate::types::{EndpointType, UsbError, UsbSpeed};
use crate::wire;

/// Little-endian append-only writer over a scratch buffer.
///
/// All descriptor assembly goes through one of these; overflow is
/// latched rather than panicking, and reported once by
/// [`finish()`](DescriptorWriter::finish), so builders can run
/// straight-line without per-write error plumbing.
pub struct DescriptorWriter<'b> {
    buf: &'b mut [u8],
    used: usize,
    overflow: bool,
}

impl<'b> DescriptorWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self {
            buf,
            used: 0,
            overflow: false,
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        if self.used < self.buf.len() {
            self.buf[self.used] = v;
            self.used += 1;
        } else {
            self.overflow = true;
        }
    }

    pub fn write_u16(&mut self, v: u16) {
        for b in v.to_le_bytes() {
            self.write_u8(b);
        }
    }

    pub fn write_u24(&mut self, v: u32) {
        for b in &v.to_le_bytes()[0..3] {
            self.write_u8(*b);
        }
    }

    pub fn write_u32(&mut self, v: u32) {
        for b in v.to_le_bytes() {
            self.write_u8(b);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_u8(b);
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Overwrite two bytes at `at`, for back-patching length fields
    pub fn patch_u16(&mut self, at: usize, v: u16) {
        if at + 2 <= self.used {
            self.buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
        }
    }

    pub fn finish(self) -> Result<usize, UsbError> {
        if self.overflow {
            Err(UsbError::Alloc)
        } else {
            Ok(self.used)
        }
    }
}

/// The identity fields of the device descriptor that come from the
/// application rather than from the topology.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_release: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub manufacturer: u8,
    pub product: u8,
    pub serial_number: u8,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            device_release: 0x0100,
            class: 0,
            subclass: 0,
            protocol: 0,
            manufacturer: 0,
            product: 0,
            serial_number: 0,
        }
    }
}

pub fn device_descriptor(
    w: &mut DescriptorWriter,
    identity: &DeviceIdentity,
    ep0_max_packet: u8,
    num_configurations: u8,
) {
    w.write_u8(18);
    w.write_u8(wire::DEVICE_DESCRIPTOR);
    w.write_u16(0x0200); // bcdUSB
    w.write_u8(identity.class);
    w.write_u8(identity.subclass);
    w.write_u8(identity.protocol);
    w.write_u8(ep0_max_packet);
    w.write_u16(identity.vendor_id);
    w.write_u16(identity.product_id);
    w.write_u16(identity.device_release);
    w.write_u8(identity.manufacturer);
    w.write_u8(identity.product);
    w.write_u8(identity.serial_number);
    w.write_u8(num_configurations);
}

pub fn device_qualifier(
    w: &mut DescriptorWriter,
    identity: &DeviceIdentity,
    ep0_max_packet: u8,
    num_configurations: u8,
) {
    w.write_u8(10);
    w.write_u8(wire::DEVICE_QUALIFIER_DESCRIPTOR);
    w.write_u16(0x0200);
    w.write_u8(identity.class);
    w.write_u8(identity.subclass);
    w.write_u8(identity.protocol);
    w.write_u8(ep0_max_packet);
    w.write_u8(num_configurations);
    w.write_u8(0);
}

/// Clamp an endpoint's registered (current-speed) packet size to what
/// the other speed allows, for other-speed-configuration responses
fn other_speed_max_packet(ep: &EndpointInfo, speed: UsbSpeed) -> u16 {
    match (ep.ep_type, speed) {
        (EndpointType::Bulk, UsbSpeed::Full12) => 64,
        (EndpointType::Bulk, UsbSpeed::High480) => 512,
        (EndpointType::Interrupt, UsbSpeed::Full12) => {
            ep.max_packet.min(64)
        }
        (EndpointType::Isochronous, UsbSpeed::Full12) => {
            ep.max_packet.min(1023)
        }
        _ => ep.max_packet,
    }
}

/// wMaxPacketSize and bInterval for one endpoint at `speed`.
///
/// Full-speed interrupt intervals are frames (= milliseconds)
/// verbatim; high-speed interrupt and isochronous (either speed)
/// intervals are the exponent n in period = 2^(n-1) (micro)frames.
/// The registry has already rejected non-power-of-two periods where
/// the exponent form is required.
pub(crate) fn endpoint_wire_fields(
    ep: &EndpointInfo,
    speed: UsbSpeed,
    native_speed: bool,
) -> (u16, u8) {
    let size = if native_speed {
        ep.max_packet
    } else {
        other_speed_max_packet(ep, speed)
    };
    let transactions =
        if speed == UsbSpeed::High480 { ep.transactions } else { 0 };
    let w_max_packet = (size & 0x07FF) | ((transactions as u16) << 11);

    let b_interval = match (ep.ep_type, speed) {
        (EndpointType::Bulk, _) | (EndpointType::Control, _) => 0,
        (EndpointType::Interrupt, UsbSpeed::High480)
        | (EndpointType::Isochronous, UsbSpeed::High480) => {
            // interval_ms * 8 microframes = 2^(bInterval-1)
            let microframes = (ep.interval_ms as u32) * 8;
            (31 - microframes.leading_zeros()) as u8 + 1
        }
        (EndpointType::Isochronous, _) => {
            (15 - (ep.interval_ms.max(1)).leading_zeros()) as u8 + 1
        }
        (EndpointType::Interrupt, _) => ep.interval_ms.min(255) as u8,
    };
    (w_max_packet, b_interval)
}

/// Assemble a full configuration (or other-speed-configuration)
/// descriptor tree: header, interface associations, interfaces,
/// class-functional descriptors, endpoints, in wire order, with
/// wTotalLength patched once the full size is known.
///
/// `speed` selects the packet-size and interval rendering;
/// `descriptor_type` is 2 or 7. The two vary independently because a
/// dual-speed device running at full speed reports its high-speed
/// shape under type 7.
pub fn configuration(
    w: &mut DescriptorWriter,
    topology: &Topology,
    classes: &[&dyn ClassDriver],
    handle: ConfigHandle,
    speed: UsbSpeed,
    descriptor_type: u8,
) -> Result<(), UsbError> {
    let cfg = topology
        .configurations
        .get(handle.0 as usize)
        .ok_or(UsbError::CfgInvalidNbr)?;

    let header_at = w.used();
    w.write_u8(9);
    w.write_u8(descriptor_type);
    w.write_u16(0); // wTotalLength, patched below
    w.write_u8(cfg.interfaces.len() as u8);
    w.write_u8(handle.value());
    w.write_u8(cfg.name);
    w.write_u8(cfg.attributes);
    w.write_u8(cfg.max_power_2ma);

    for &if_ix in &cfg.interfaces {
        let intf = &topology.interfaces[if_ix as usize];

        if let Some(group) =
            topology.group_of_first_interface(cfg, intf.number)
        {
            w.write_u8(8);
            w.write_u8(wire::INTERFACE_ASSOCIATION_DESCRIPTOR);
            w.write_u8(group.first_interface);
            w.write_u8(group.interface_count);
            w.write_u8(group.class);
            w.write_u8(group.subclass);
            w.write_u8(group.protocol);
            w.write_u8(group.name);
        }

        let class = intf
            .class_driver
            .and_then(|ix| classes.get(ix as usize).copied());

        for &alt_ix in &intf.alternates {
            let alt = &topology.alternates[alt_ix as usize];
            w.write_u8(9);
            w.write_u8(wire::INTERFACE_DESCRIPTOR);
            w.write_u8(intf.number);
            w.write_u8(alt.number);
            w.write_u8(alt.endpoints.len() as u8);
            w.write_u8(intf.class);
            w.write_u8(intf.subclass);
            w.write_u8(intf.protocol);
            w.write_u8(if alt.name != 0 { alt.name } else { intf.name });

            if let Some(class) = class {
                class.interface_descriptors(
                    w,
                    intf.number,
                    alt.number,
                    speed,
                );
            }

            for ep in topology.endpoints_of(alt) {
                let native = speed == topology.speed();
                let (w_max_packet, b_interval) =
                    endpoint_wire_fields(ep, speed, native);
                w.write_u8(7);
                w.write_u8(wire::ENDPOINT_DESCRIPTOR);
                w.write_u8(ep.address.byte());
                w.write_u8(ep.ep_type as u8 | ep.attribute_bits);
                w.write_u16(w_max_packet);
                w.write_u8(b_interval);

                if let Some(class) = class {
                    class.endpoint_descriptors(w, ep.address, speed);
                }
            }
        }
    }

    let total = (w.used() - header_at) as u16;
    w.patch_u16(header_at + 2, total);
    Ok(())
}

/// A string descriptor: index 0 is the language-ID array, index N>=1
/// is the Nth interned string as UTF-16LE
pub fn string(
    w: &mut DescriptorWriter,
    topology: &Topology,
    index: u8,
) -> Result<(), UsbError> {
    if index == 0 {
        w.write_u8(4);
        w.write_u8(wire::STRING_DESCRIPTOR);
        w.write_u16(topology.strings.language_id);
        return Ok(());
    }
    let s = topology.strings.get(index).ok_or(UsbError::InvalidArg)?;
    let units = s.encode_utf16().count();
    w.write_u8((2 + units * 2) as u8);
    w.write_u8(wire::STRING_DESCRIPTOR);
    for unit in s.encode_utf16() {
        w.write_u16(unit);
    }
    Ok(())
}

/// The Microsoft OS 1.0 signature string served at index 0xEE
#[cfg(feature = "msos")]
pub fn msos_string(w: &mut DescriptorWriter, vendor_code: u8) {
    w.write_u8(18);
    w.write_u8(wire::STRING_DESCRIPTOR);
    for unit in "MSFT100".encode_utf16() {
        w.write_u16(unit);
    }
    w.write_u8(vendor_code);
    w.write_u8(0);
}

/// The Microsoft OS 1.0 extended compat ID descriptor, one function
/// section per interface whose class offers a compatible ID
#[cfg(feature = "msos")]
pub fn msos_compat_id(
    w: &mut DescriptorWriter,
    topology: &Topology,
    classes: &[&dyn ClassDriver],
    handle: ConfigHandle,
) -> Result<(), UsbError> {
    let cfg = topology
        .configurations
        .get(handle.0 as usize)
        .ok_or(UsbError::CfgInvalidNbr)?;

    let header_at = w.used();
    w.write_u32(0); // dwLength, patched below
    w.write_u16(0x0100); // bcdVersion
    w.write_u16(0x0004); // wIndex: extended compat ID
    let count_at = w.used();
    w.write_u8(0); // bCount, patched below
    w.write_bytes(&[0; 7]);

    let mut count = 0u8;
    for &if_ix in &cfg.interfaces {
        let intf = &topology.interfaces[if_ix as usize];
        let Some(class) = intf
            .class_driver
            .and_then(|ix| classes.get(ix as usize).copied())
        else {
            continue;
        };
        if let Some((compat, sub_compat)) = class.microsoft_compatible_id()
        {
            w.write_u8(intf.number);
            w.write_u8(1); // reserved
            w.write_bytes(&compat);
            w.write_bytes(&sub_compat);
            w.write_bytes(&[0; 6]);
            count += 1;
        }
    }

    let total = (w.used() - header_at) as u32;
    w.patch_u16(header_at, (total & 0xFFFF) as u16);
    w.patch_u16(header_at + 2, (total >> 16) as u16);
    // the byte after bCount is reserved-zero, so the u16 patch is safe
    w.patch_u16(count_at, count as u16);
    Ok(())
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/descriptors.rs"]
mod tests;
