use crate::config::CONTROL_SCRATCH_BYTES;
use crate::debug;
use crate::descriptors::{self, DescriptorWriter};
use crate::device::UsbDevice;
use crate::device_controller::{
    AddressPhase, DataPhase, DeviceController,
};
use crate::types::{
    DeviceState, Direction, EndpointAddress, EndpointType, UsbError,
    UsbSpeed,
};
use crate::wire::{self, Recipient, RequestType, SetupPacket};

pub(crate) const EP0_OUT: EndpointAddress =
    EndpointAddress::new(0, Direction::Out);
pub(crate) const EP0_IN: EndpointAddress =
    EndpointAddress::new(0, Direction::In);

enum CtrlState {
    Idle,
    DataIn {
        offset: usize,
        len: usize,
        staged: usize,
        zlp: bool,
    },
    StatusOut,
    DataOut {
        setup: SetupPacket,
        received: usize,
        armed: usize,
    },
    StatusIn,
    AddressStatusIn {
        address: u8,
        phase: AddressPhase,
    },
}

enum Reply {
    /// Send `len` bytes of the scratch buffer as the data stage
    In(usize),
    /// No data stage; acknowledge with a status ZLP
    Status,
    /// SET_ADDRESS: acknowledge, then commit the address
    AddressStatus { address: u8, phase: AddressPhase },
    Stall,
}

/// The endpoint-0 state machine.
///
/// Advanced by three inputs only: a SETUP packet, a tx-complete on
/// 0-IN, and an rx-complete on 0-OUT. A SETUP arriving mid-transfer
/// cancels whatever was outstanding and restarts the pipe; some
/// controllers reorder SETUPs ahead of a pending data stage and the
/// host is always right.
pub(crate) struct ControlPipe {
    state: CtrlState,
    scratch: [u8; CONTROL_SCRATCH_BYTES],
}

impl ControlPipe {
    pub fn new() -> Self {
        Self {
            state: CtrlState::Idle,
            scratch: [0; CONTROL_SCRATCH_BYTES],
        }
    }

    pub fn reset(&mut self) {
        self.state = CtrlState::Idle;
    }

    fn stall<DC: DeviceController>(&mut self, dev: &UsbDevice<DC>) {
        let _ = dev.controller().ep_stall(EP0_IN, true);
        let _ = dev.controller().ep_stall(EP0_OUT, true);
        self.state = CtrlState::Idle;
    }

    pub fn on_setup<DC: DeviceController>(
        &mut self,
        dev: &UsbDevice<'_, DC>,
        setup: SetupPacket,
    ) {
        if !matches!(self.state, CtrlState::Idle) {
            // SETUP recovery: the host has moved on
            let _ = dev.controller().ep_abort(EP0_IN);
            let _ = dev.controller().ep_abort(EP0_OUT);
            self.state = CtrlState::Idle;
        }

        if setup.direction() == Direction::Out && setup.wLength > 0 {
            // Receive the whole data stage before dispatching
            if setup.wLength as usize > CONTROL_SCRATCH_BYTES {
                self.stall(dev);
                return;
            }
            match dev
                .controller()
                .ep_rx_start(EP0_OUT, setup.wLength as usize)
            {
                Ok(armed) => {
                    self.state = CtrlState::DataOut {
                        setup,
                        received: 0,
                        armed,
                    };
                }
                Err(_) => self.stall(dev),
            }
            return;
        }

        let reply = self.dispatch(dev, &setup);
        self.act(dev, &setup, reply);
    }

    pub fn on_complete<DC: DeviceController>(
        &mut self,
        dev: &UsbDevice<'_, DC>,
        direction: Direction,
        error: Option<UsbError>,
    ) {
        if error.is_some() {
            let _ = dev.controller().ep_abort(EP0_IN);
            let _ = dev.controller().ep_abort(EP0_OUT);
            self.state = CtrlState::Idle;
            return;
        }

        let state = core::mem::replace(&mut self.state, CtrlState::Idle);
        match (state, direction) {
            (
                CtrlState::DataIn {
                    mut offset,
                    len,
                    staged,
                    zlp,
                },
                Direction::In,
            ) => {
                offset += staged;
                if offset < len {
                    let mps =
                        dev.capabilities().ep0_max_packet as usize;
                    let chunk = (len - offset).min(mps);
                    match dev.controller().ep_tx(
                        EP0_IN,
                        &self.scratch[offset..offset + chunk],
                    ) {
                        Ok(accepted) => {
                            if dev
                                .controller()
                                .ep_tx_start(EP0_IN)
                                .is_err()
                            {
                                self.stall(dev);
                                return;
                            }
                            self.state = CtrlState::DataIn {
                                offset,
                                len,
                                staged: accepted,
                                zlp,
                            };
                        }
                        Err(_) => self.stall(dev),
                    }
                } else if zlp {
                    if dev.controller().ep_tx_zlp(EP0_IN).is_ok() {
                        self.state = CtrlState::DataIn {
                            offset,
                            len,
                            staged: 0,
                            zlp: false,
                        };
                    } else {
                        self.stall(dev);
                    }
                } else {
                    // Data stage done; expect the host's status ZLP
                    if dev.controller().ep_rx_zlp(EP0_OUT).is_ok() {
                        self.state = CtrlState::StatusOut;
                    } else {
                        self.stall(dev);
                    }
                }
            }
            (CtrlState::StatusIn, Direction::In) => {}
            (
                CtrlState::AddressStatusIn { address, phase },
                Direction::In,
            ) => {
                if phase == AddressPhase::Deferred {
                    dev.controller().address_enable(address);
                }
                dev.finish_set_address(address);
            }
            (
                CtrlState::DataOut {
                    setup,
                    mut received,
                    armed,
                },
                Direction::Out,
            ) => {
                let want = armed.min(CONTROL_SCRATCH_BYTES - received);
                let end = received + want;
                let n = match dev.controller().ep_rx(
                    EP0_OUT,
                    &mut self.scratch[received..end],
                ) {
                    Ok(n) => n,
                    Err(_) => {
                        self.stall(dev);
                        return;
                    }
                };
                received += n;
                if received >= setup.wLength as usize || n < want {
                    let reply = {
                        let payload = &self.scratch[..received];
                        match route_to_class(
                            dev,
                            &setup,
                            DataPhase::Out(payload),
                        ) {
                            Ok(_) => Reply::Status,
                            Err(_) => Reply::Stall,
                        }
                    };
                    self.act(dev, &setup, reply);
                } else {
                    let remaining =
                        setup.wLength as usize - received;
                    match dev
                        .controller()
                        .ep_rx_start(EP0_OUT, remaining)
                    {
                        Ok(armed) => {
                            self.state = CtrlState::DataOut {
                                setup,
                                received,
                                armed,
                            };
                        }
                        Err(_) => self.stall(dev),
                    }
                }
            }
            (CtrlState::StatusOut, Direction::Out) => {
                let mut sink = [0u8; 0];
                let _ = dev.controller().ep_rx(EP0_OUT, &mut sink);
            }
            // Stale or mismatched completion: a timed-out or
            // recovered transfer's leftovers. Discard, but put the
            // state back.
            (state, _) => self.state = state,
        }
    }

    fn dispatch<DC: DeviceController>(
        &mut self,
        dev: &UsbDevice<'_, DC>,
        setup: &SetupPacket,
    ) -> Reply {
        match setup.request_type() {
            RequestType::Standard => {
                standard_reply(dev, setup, &mut self.scratch)
            }
            RequestType::Class | RequestType::Vendor => {
                #[cfg(feature = "msos")]
                if let Some(reply) =
                    msos_reply(dev, setup, &mut self.scratch)
                {
                    return reply;
                }
                class_in_reply(dev, setup, &mut self.scratch)
            }
            RequestType::Reserved => Reply::Stall,
        }
    }

    fn act<DC: DeviceController>(
        &mut self,
        dev: &UsbDevice<'_, DC>,
        setup: &SetupPacket,
        reply: Reply,
    ) {
        match reply {
            Reply::In(len) => {
                let len = len.min(setup.wLength as usize);
                let mps = dev.capabilities().ep0_max_packet as usize;
                // A response shorter than requested that lands on a
                // packet boundary needs a terminating ZLP
                let zlp = len < setup.wLength as usize
                    && mps != 0
                    && len % mps == 0
                    && len != 0;
                if len == 0 {
                    if dev.controller().ep_tx_zlp(EP0_IN).is_err() {
                        self.stall(dev);
                        return;
                    }
                    self.state = CtrlState::DataIn {
                        offset: 0,
                        len: 0,
                        staged: 0,
                        zlp: false,
                    };
                    return;
                }
                let chunk = len.min(mps);
                match dev
                    .controller()
                    .ep_tx(EP0_IN, &self.scratch[..chunk])
                {
                    Ok(accepted) => {
                        if dev.controller().ep_tx_start(EP0_IN).is_err()
                        {
                            self.stall(dev);
                            return;
                        }
                        self.state = CtrlState::DataIn {
                            offset: 0,
                            len,
                            staged: accepted,
                            zlp,
                        };
                    }
                    Err(_) => self.stall(dev),
                }
            }
            Reply::Status => {
                if dev.controller().ep_tx_zlp(EP0_IN).is_ok() {
                    self.state = CtrlState::StatusIn;
                } else {
                    self.stall(dev);
                }
            }
            Reply::AddressStatus { address, phase } => {
                if dev.controller().ep_tx_zlp(EP0_IN).is_ok() {
                    self.state =
                        CtrlState::AddressStatusIn { address, phase };
                } else {
                    self.stall(dev);
                }
            }
            Reply::Stall => self.stall(dev),
        }
    }
}

/// Forward a request to the class driver owning the target interface
/// (or the interface owning the target endpoint)
fn route_to_class<DC: DeviceController>(
    dev: &UsbDevice<'_, DC>,
    setup: &SetupPacket,
    data: DataPhase<'_>,
) -> Result<usize, UsbError> {
    let interface_number = match setup.recipient() {
        Recipient::Interface => setup.wIndex as u8,
        Recipient::Endpoint => {
            let addr =
                EndpointAddress::from_byte(setup.wIndex as u8)?;
            let slot = dev.endpoints().slot(addr);
            if slot.state.get()
                == crate::endpoint::EndpointState::Closed
            {
                return Err(UsbError::EpInvalidAddr);
            }
            slot.interface.get()
        }
        _ => return Err(UsbError::Fail),
    };

    let class = dev
        .class_for_interface(interface_number)
        .ok_or(UsbError::IfInvalidNbr)?;

    match setup.request_type() {
        RequestType::Standard => class.interface_request(setup, data),
        RequestType::Class => class.class_request(setup, data),
        RequestType::Vendor => class.vendor_request(setup, data),
        RequestType::Reserved => Err(UsbError::Fail),
    }
}

fn class_in_reply<DC: DeviceController>(
    dev: &UsbDevice<'_, DC>,
    setup: &SetupPacket,
    scratch: &mut [u8],
) -> Reply {
    if setup.direction() == Direction::In && setup.wLength > 0 {
        let cap = (setup.wLength as usize).min(scratch.len());
        match route_to_class(
            dev,
            setup,
            DataPhase::In(&mut scratch[..cap]),
        ) {
            Ok(n) => Reply::In(n.min(cap)),
            Err(_) => Reply::Stall,
        }
    } else {
        match route_to_class(dev, setup, DataPhase::None) {
            Ok(_) => Reply::Status,
            Err(_) => Reply::Stall,
        }
    }
}

#[cfg(feature = "msos")]
fn msos_reply<DC: DeviceController>(
    dev: &UsbDevice<'_, DC>,
    setup: &SetupPacket,
    scratch: &mut [u8],
) -> Option<Reply> {
    let vendor_code = dev.msos_vendor_code()?;
    if setup.request_type() != RequestType::Vendor
        || setup.bRequest != vendor_code
        || setup.direction() != Direction::In
    {
        return None;
    }
    match setup.wIndex {
        0x0004 => {
            let config = dev.active_config_handle()?;
            let mut w = DescriptorWriter::new(scratch);
            descriptors::msos_compat_id(
                &mut w,
                dev.topology(),
                dev.classes(),
                config,
            )
            .ok()?;
            Some(Reply::In(w.finish().ok()?))
        }
        0x0005 => {
            let interface = setup.wValue as u8;
            let class = dev.class_for_interface(interface)?;
            let mut w = DescriptorWriter::new(scratch);
            let header_at = w.used();
            w.write_u32(0); // dwLength, patched below
            w.write_u16(0x0100);
            w.write_u16(0x0005);
            let count_at = w.used();
            w.write_u16(0);
            let count = class.microsoft_ext_properties(&mut w);
            let total = (w.used() - header_at) as u32;
            w.patch_u16(header_at, (total & 0xFFFF) as u16);
            w.patch_u16(header_at + 2, (total >> 16) as u16);
            w.patch_u16(count_at, count);
            Some(Reply::In(w.finish().ok()?))
        }
        _ => None,
    }
}

fn descriptor_reply<DC: DeviceController>(
    dev: &UsbDevice<'_, DC>,
    setup: &SetupPacket,
    scratch: &mut [u8],
) -> Reply {
    let descriptor_type = (setup.wValue >> 8) as u8;
    let index = setup.wValue as u8;
    let dual_speed =
        dev.capabilities().speed == UsbSpeed::High480;
    let mut w = DescriptorWriter::new(scratch);

    let built = match descriptor_type {
        wire::DEVICE_DESCRIPTOR => {
            descriptors::device_descriptor(
                &mut w,
                dev.identity(),
                dev.capabilities().ep0_max_packet,
                dev.topology().configurations.len() as u8,
            );
            Ok(())
        }
        wire::CONFIGURATION_DESCRIPTOR => descriptors::configuration(
            &mut w,
            dev.topology(),
            dev.classes(),
            crate::topology::ConfigHandle(index),
            dev.current_speed(),
            wire::CONFIGURATION_DESCRIPTOR,
        ),
        wire::STRING_DESCRIPTOR => {
            #[cfg(feature = "msos")]
            if index == wire::MSOS_STRING_INDEX {
                if let Some(code) = dev.msos_vendor_code() {
                    descriptors::msos_string(&mut w, code);
                    return match w.finish() {
                        Ok(n) => Reply::In(n),
                        Err(_) => Reply::Stall,
                    };
                }
                return Reply::Stall;
            }
            descriptors::string(&mut w, dev.topology(), index)
        }
        wire::DEVICE_QUALIFIER_DESCRIPTOR => {
            if !dual_speed {
                return Reply::Stall;
            }
            descriptors::device_qualifier(
                &mut w,
                dev.identity(),
                dev.capabilities().ep0_max_packet,
                dev.topology().configurations.len() as u8,
            );
            Ok(())
        }
        wire::OTHER_SPEED_CONFIGURATION_DESCRIPTOR => {
            if !dual_speed {
                return Reply::Stall;
            }
            let other = match dev.current_speed() {
                UsbSpeed::High480 => UsbSpeed::Full12,
                _ => UsbSpeed::High480,
            };
            descriptors::configuration(
                &mut w,
                dev.topology(),
                dev.classes(),
                crate::topology::ConfigHandle(index),
                other,
                wire::OTHER_SPEED_CONFIGURATION_DESCRIPTOR,
            )
        }
        _ => Err(UsbError::InvalidArg),
    };

    match built.and_then(|()| w.finish()) {
        Ok(n) => Reply::In(n),
        Err(_) => Reply::Stall,
    }
}

fn standard_reply<DC: DeviceController>(
    dev: &UsbDevice<'_, DC>,
    setup: &SetupPacket,
    scratch: &mut [u8],
) -> Reply {
    match setup.bRequest {
        wire::GET_STATUS => {
            let status: u16 = match setup.recipient() {
                Recipient::Device => {
                    let mut s = 0;
                    if dev.self_powered() {
                        s |= wire::STATUS_SELF_POWERED;
                    }
                    if dev.remote_wakeup_enabled() {
                        s |= wire::STATUS_REMOTE_WAKEUP;
                    }
                    s
                }
                Recipient::Interface => {
                    if dev.state() != DeviceState::Configured {
                        return Reply::Stall;
                    }
                    0
                }
                Recipient::Endpoint => {
                    let Ok(addr) = EndpointAddress::from_byte(
                        setup.wIndex as u8,
                    ) else {
                        return Reply::Stall;
                    };
                    match dev.endpoint_status(addr) {
                        Some(halted) => {
                            if halted {
                                wire::STATUS_ENDPOINT_HALT
                            } else {
                                0
                            }
                        }
                        None => return Reply::Stall,
                    }
                }
                _ => return Reply::Stall,
            };
            scratch[..2].copy_from_slice(&status.to_le_bytes());
            Reply::In(2)
        }

        wire::CLEAR_FEATURE | wire::SET_FEATURE => {
            let set = setup.bRequest == wire::SET_FEATURE;
            match (setup.recipient(), setup.wValue) {
                (
                    Recipient::Device,
                    wire::FEATURE_DEVICE_REMOTE_WAKEUP,
                ) => {
                    if !dev.remote_wakeup_supported() {
                        return Reply::Stall;
                    }
                    dev.set_remote_wakeup(set);
                    Reply::Status
                }
                (Recipient::Device, wire::FEATURE_TEST_MODE) => {
                    // Entering test mode is allowed; leaving it takes
                    // a power cycle, so CLEAR_FEATURE is an error
                    if set {
                        Reply::Status
                    } else {
                        Reply::Stall
                    }
                }
                (Recipient::Endpoint, wire::FEATURE_ENDPOINT_HALT) => {
                    let Ok(addr) = EndpointAddress::from_byte(
                        setup.wIndex as u8,
                    ) else {
                        return Reply::Stall;
                    };
                    if addr.is_control() {
                        return Reply::Stall;
                    }
                    match dev.endpoint_halt(addr, set) {
                        Ok(()) => Reply::Status,
                        Err(_) => Reply::Stall,
                    }
                }
                _ => Reply::Stall,
            }
        }

        wire::SET_ADDRESS => {
            if !matches!(
                dev.state(),
                DeviceState::Default | DeviceState::Addressed
            ) || setup.wValue > 127
            {
                return Reply::Stall;
            }
            let address = setup.wValue as u8;
            let phase = dev.controller().address_set(address);
            Reply::AddressStatus { address, phase }
        }

        wire::GET_DESCRIPTOR => match setup.recipient() {
            Recipient::Device => {
                descriptor_reply(dev, setup, scratch)
            }
            // HID and friends serve their report descriptors here
            Recipient::Interface => {
                class_in_reply(dev, setup, scratch)
            }
            _ => Reply::Stall,
        },

        wire::SET_DESCRIPTOR => Reply::Stall,

        wire::GET_CONFIGURATION => {
            match dev.state() {
                DeviceState::Addressed => scratch[0] = 0,
                DeviceState::Configured => {
                    scratch[0] = dev.configuration_value()
                }
                _ => return Reply::Stall,
            }
            Reply::In(1)
        }

        wire::SET_CONFIGURATION => {
            if !matches!(
                dev.state(),
                DeviceState::Addressed | DeviceState::Configured
            ) {
                return Reply::Stall;
            }
            match dev.set_configuration(setup.wValue as u8) {
                Ok(()) => Reply::Status,
                Err(e) => {
                    debug::println!("SET_CONFIGURATION: {:?}", e);
                    Reply::Stall
                }
            }
        }

        wire::GET_INTERFACE => {
            if dev.state() != DeviceState::Configured {
                return Reply::Stall;
            }
            match dev.alt_setting(setup.wIndex as u8) {
                Some(alt) => {
                    scratch[0] = alt;
                    Reply::In(1)
                }
                None => Reply::Stall,
            }
        }

        wire::SET_INTERFACE => {
            if dev.state() != DeviceState::Configured {
                return Reply::Stall;
            }
            match dev
                .set_interface(setup.wIndex as u8, setup.wValue as u8)
            {
                Ok(()) => Reply::Status,
                Err(_) => Reply::Stall,
            }
        }

        wire::SYNCH_FRAME => {
            if dev.state() != DeviceState::Configured {
                return Reply::Stall;
            }
            let Ok(addr) =
                EndpointAddress::from_byte(setup.wIndex as u8)
            else {
                return Reply::Stall;
            };
            let slot = dev.endpoints().slot(addr);
            if slot.state.get() == crate::endpoint::EndpointState::Closed
                || slot.ep_type.get() != EndpointType::Isochronous
            {
                return Reply::Stall;
            }
            let frame = dev.controller().frame_number() & 0x07FF;
            scratch[..2].copy_from_slice(&frame.to_le_bytes());
            Reply::In(2)
        }

        _ => Reply::Stall,
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/control.rs"]
mod tests;
