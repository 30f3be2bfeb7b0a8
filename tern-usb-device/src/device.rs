use crate::class::ClassDriver;
use crate::config::MAX_INTERFACES;
use crate::control::{ControlPipe, EP0_IN, EP0_OUT};
use crate::descriptors::DeviceIdentity;
use crate::device_controller::{Capabilities, DeviceController};
use crate::endpoint::{
    with_timeout, EndpointState, Endpoints, RxTransfer, TxTransfer,
};
use crate::event::{DeviceEvent, EventQueue};
use crate::topology::{
    AltHandle, ConfigHandle, InterfaceHandle, StringHandle, Topology,
};
use crate::types::{
    DeviceState, Direction, EndpointAddress, EndpointType, UsbError,
    UsbSpeed,
};
use core::cell::{Cell, RefCell};
use core::future::Future;
use futures::StreamExt;
use heapless::Vec;

/// Optional application notifications for bus-level events, posted
/// from the core task as the state machine advances.
pub trait BusEventHandler {
    fn reset(&self) {}
    fn suspend(&self) {}
    fn resume(&self) {}
    fn connect(&self) {}
    fn disconnect(&self) {}
}

/// Registration-time view of a device: topology mutation is only
/// possible here, and [`start()`](DeviceBuilder::start) consumes the
/// builder, so the running stack's registry is read-only by
/// construction.
pub struct DeviceBuilder<'d, DC: DeviceController> {
    controller: DC,
    events: &'d EventQueue,
    topology: Topology,
    identity: DeviceIdentity,
    classes: Vec<&'d dyn ClassDriver, MAX_INTERFACES>,
    bus_handler: Option<&'d dyn BusEventHandler>,
    self_powered: bool,
    caps: Capabilities,
    #[cfg(feature = "msos")]
    msos_vendor_code: Option<u8>,
}

impl<'d, DC: DeviceController> DeviceBuilder<'d, DC> {
    pub fn new(
        controller: DC,
        events: &'d EventQueue,
        identity: DeviceIdentity,
    ) -> Result<Self, UsbError> {
        controller.init()?;
        let caps = controller.capabilities();
        Ok(Self {
            controller,
            events,
            topology: Topology::new(caps.speed),
            identity,
            classes: Vec::new(),
            bus_handler: None,
            self_powered: false,
            caps,
            #[cfg(feature = "msos")]
            msos_vendor_code: None,
        })
    }

    pub fn bus_event_handler(&mut self, handler: &'d dyn BusEventHandler) {
        self.bus_handler = Some(handler);
    }

    pub fn set_self_powered(&mut self, self_powered: bool) {
        self.self_powered = self_powered;
    }

    #[cfg(feature = "msos")]
    pub fn microsoft_os_support(&mut self, vendor_code: u8) {
        self.msos_vendor_code = Some(vendor_code);
    }

    pub fn string_add(
        &mut self,
        s: &'static str,
    ) -> Result<StringHandle, UsbError> {
        self.topology.string_add(s)
    }

    pub fn configuration_add(
        &mut self,
        self_powered: bool,
        remote_wakeup: bool,
        max_power_ma: u16,
        name: Option<StringHandle>,
    ) -> Result<ConfigHandle, UsbError> {
        self.topology.configuration_add(
            self_powered,
            remote_wakeup,
            max_power_ma,
            name,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn interface_add(
        &mut self,
        config: ConfigHandle,
        class: u8,
        subclass: u8,
        protocol: u8,
        driver: Option<&'d dyn ClassDriver>,
        name: Option<StringHandle>,
    ) -> Result<InterfaceHandle, UsbError> {
        let driver_ix = match driver {
            Some(driver) => {
                self.classes.push(driver).map_err(|_| UsbError::Alloc)?;
                Some(self.classes.len() as u8 - 1)
            }
            None => None,
        };
        self.topology.interface_add(
            config, class, subclass, protocol, driver_ix, name,
        )
    }

    pub fn alternate_add(
        &mut self,
        interface: InterfaceHandle,
        name: Option<StringHandle>,
    ) -> Result<AltHandle, UsbError> {
        self.topology.alternate_add(interface, name)
    }

    /// The alt-0 setting created implicitly by `interface_add`
    pub fn alternate0(
        &self,
        interface: InterfaceHandle,
    ) -> Result<AltHandle, UsbError> {
        self.topology
            .interfaces
            .get(interface.0 as usize)
            .map(|i| AltHandle(i.alternates[0]))
            .ok_or(UsbError::IfInvalidNbr)
    }

    /// Interface number as it will appear on the wire
    pub fn interface_number(
        &self,
        interface: InterfaceHandle,
    ) -> Result<u8, UsbError> {
        self.topology
            .interfaces
            .get(interface.0 as usize)
            .map(|i| i.number)
            .ok_or(UsbError::IfInvalidNbr)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn interface_group_add(
        &mut self,
        config: ConfigHandle,
        number: u8,
        class: u8,
        subclass: u8,
        protocol: u8,
        first_interface: InterfaceHandle,
        interface_count: u8,
        name: Option<StringHandle>,
    ) -> Result<(), UsbError> {
        self.topology.interface_group_add(
            config,
            number,
            class,
            subclass,
            protocol,
            first_interface,
            interface_count,
            name,
        )
    }

    pub fn bulk_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        max_packet: u16,
    ) -> Result<EndpointAddress, UsbError> {
        self.topology.bulk_add(config, alt, direction, max_packet)
    }

    pub fn interrupt_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        max_packet: u16,
        interval_ms: u16,
    ) -> Result<EndpointAddress, UsbError> {
        self.topology.interrupt_add(
            config,
            alt,
            direction,
            max_packet,
            interval_ms,
            0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn isochronous_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        max_packet: u16,
        interval_ms: u16,
        transactions: u8,
        sync_bits: u8,
        sync_address: u8,
    ) -> Result<EndpointAddress, UsbError> {
        self.topology.isochronous_add(
            config,
            alt,
            direction,
            max_packet,
            interval_ms,
            transactions,
            sync_bits,
            sync_address,
        )
    }

    /// Freeze the registry, pull up the bus, and hand over the running
    /// stack
    pub fn start(self) -> Result<UsbDevice<'d, DC>, UsbError> {
        self.controller.start()?;
        let base_speed = match self.caps.speed {
            UsbSpeed::High480 => UsbSpeed::Full12,
            speed => speed,
        };
        Ok(UsbDevice {
            controller: self.controller,
            events: self.events,
            topology: self.topology,
            identity: self.identity,
            classes: self.classes,
            bus_handler: self.bus_handler,
            caps: self.caps,
            state: Cell::new(DeviceState::Init),
            resume_state: Cell::new(DeviceState::Init),
            address: Cell::new(0),
            configuration: Cell::new(0),
            alt_settings: RefCell::new([0; MAX_INTERFACES]),
            self_powered: Cell::new(self.self_powered),
            remote_wakeup: Cell::new(false),
            current_speed: Cell::new(base_speed),
            endpoints: Endpoints::new(),
            control: RefCell::new(ControlPipe::new()),
            pump_active: Cell::new(false),
            #[cfg(feature = "msos")]
            msos_vendor_code: self.msos_vendor_code,
        })
    }
}

/// A running USB device.
///
/// One core future ([`run()`](UsbDevice::run)) drains the event queue
/// and advances everything host-driven: the state machine, the
/// control pipe, and completion routing. Applications and class
/// drivers submit endpoint transfers concurrently from the same
/// executor; a transfer only progresses while `run()` is being
/// polled, which is also what makes dropping a transfer future a safe
/// cancellation point.
pub struct UsbDevice<'d, DC: DeviceController> {
    controller: DC,
    events: &'d EventQueue,
    topology: Topology,
    identity: DeviceIdentity,
    classes: Vec<&'d dyn ClassDriver, MAX_INTERFACES>,
    bus_handler: Option<&'d dyn BusEventHandler>,
    caps: Capabilities,
    state: Cell<DeviceState>,
    resume_state: Cell<DeviceState>,
    address: Cell<u8>,
    configuration: Cell<u8>,
    alt_settings: RefCell<[u8; MAX_INTERFACES]>,
    self_powered: Cell<bool>,
    remote_wakeup: Cell<bool>,
    current_speed: Cell<UsbSpeed>,
    endpoints: Endpoints,
    control: RefCell<ControlPipe>,
    /// True while `handle_event` is dispatching, so class upcalls
    /// that try to submit endpoint I/O on their own device can be
    /// caught instead of deadlocking
    pump_active: Cell<bool>,
    #[cfg(feature = "msos")]
    msos_vendor_code: Option<u8>,
}

impl<'d, DC: DeviceController> UsbDevice<'d, DC> {
    pub(crate) fn controller(&self) -> &DC {
        &self.controller
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub(crate) fn classes(&self) -> &[&'d dyn ClassDriver] {
        &self.classes
    }

    pub fn state(&self) -> DeviceState {
        self.state.get()
    }

    pub fn bus_address(&self) -> u8 {
        self.address.get()
    }

    pub fn configuration_value(&self) -> u8 {
        self.configuration.get()
    }

    pub fn current_speed(&self) -> UsbSpeed {
        self.current_speed.get()
    }

    pub fn frame_number(&self) -> u16 {
        self.controller.frame_number()
    }

    pub(crate) fn self_powered(&self) -> bool {
        self.self_powered.get()
    }

    pub(crate) fn remote_wakeup_enabled(&self) -> bool {
        self.remote_wakeup.get()
    }

    pub(crate) fn set_remote_wakeup(&self, enabled: bool) {
        self.remote_wakeup.set(enabled);
    }

    /// Whether the active configuration advertises remote wakeup
    pub(crate) fn remote_wakeup_supported(&self) -> bool {
        self.active_config_handle()
            .and_then(|h| {
                self.topology.configurations.get(h.0 as usize)
            })
            .is_some_and(|c| {
                (c.attributes & crate::wire::CONFIG_ATTR_REMOTE_WAKEUP)
                    != 0
            })
    }

    #[cfg(feature = "msos")]
    pub(crate) fn msos_vendor_code(&self) -> Option<u8> {
        self.msos_vendor_code
    }

    pub(crate) fn active_config_handle(&self) -> Option<ConfigHandle> {
        self.topology
            .configuration_by_value(self.configuration.get())
            .map(|(h, _)| h)
    }

    /// The configuration class requests are routed against: the
    /// active one, or the first while still unconfigured (hosts read
    /// class descriptors in either order)
    fn routing_config(&self) -> Option<ConfigHandle> {
        self.active_config_handle().or({
            if self.topology.configurations.is_empty() {
                None
            } else {
                Some(ConfigHandle(0))
            }
        })
    }

    pub(crate) fn class_for_interface(
        &self,
        interface_number: u8,
    ) -> Option<&'d dyn ClassDriver> {
        let config = self.routing_config()?;
        let intf = self
            .topology
            .interface_in_config(config, interface_number)?;
        let ix = intf.class_driver?;
        self.classes.get(ix as usize).copied()
    }

    pub(crate) fn alt_setting(
        &self,
        interface_number: u8,
    ) -> Option<u8> {
        let config = self.active_config_handle()?;
        self.topology.interface_in_config(config, interface_number)?;
        self.alt_settings
            .borrow()
            .get(interface_number as usize)
            .copied()
    }

    /// Run the stack: drain events forever. Poll this alongside your
    /// application futures.
    pub async fn run(&self) -> ! {
        let mut events = self.events.stream();
        loop {
            if let Some(event) = events.next().await {
                self.handle_event(event);
            }
        }
    }

    /// Advance on one event. `run()` loops this; tests call it
    /// directly.
    pub fn handle_event(&self, event: DeviceEvent) {
        debug_assert!(
            !self.pump_active.get(),
            "event pump re-entered from a class upcall"
        );
        self.pump_active.set(true);
        self.dispatch_event(event);
        self.pump_active.set(false);
    }

    fn dispatch_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Reset => self.bus_reset(),
            DeviceEvent::Suspend => {
                if matches!(
                    self.state.get(),
                    DeviceState::Default
                        | DeviceState::Addressed
                        | DeviceState::Configured
                ) {
                    self.resume_state.set(self.state.get());
                    self.state.set(DeviceState::Suspended);
                    if let Some(h) = self.bus_handler {
                        h.suspend();
                    }
                }
            }
            DeviceEvent::Resume => {
                if self.state.get() == DeviceState::Suspended {
                    self.state.set(self.resume_state.get());
                    if let Some(h) = self.bus_handler {
                        h.resume();
                    }
                }
            }
            DeviceEvent::Connect => {
                if self.state.get() == DeviceState::Init {
                    self.state.set(DeviceState::Attached);
                }
                if let Some(h) = self.bus_handler {
                    h.connect();
                }
            }
            DeviceEvent::Disconnect => {
                self.teardown_configuration();
                self.address.set(0);
                self.state.set(DeviceState::Init);
                if let Some(h) = self.bus_handler {
                    h.disconnect();
                }
            }
            DeviceEvent::HighSpeed => {
                self.current_speed.set(UsbSpeed::High480);
            }
            DeviceEvent::Setup(packet) => {
                self.control.borrow_mut().on_setup(self, packet);
            }
            DeviceEvent::Complete { ep, error } => {
                if ep.number() == 0 {
                    self.control.borrow_mut().on_complete(
                        self,
                        ep.direction(),
                        error,
                    );
                } else {
                    self.endpoints.on_complete(ep, error);
                }
            }
        }
    }

    fn bus_reset(&self) {
        self.teardown_configuration();
        self.control.borrow_mut().reset();

        let mps = self.caps.ep0_max_packet as u16;
        let _ = self.controller.ep_open(
            EP0_OUT,
            EndpointType::Control,
            mps,
            1,
        );
        let _ =
            self.controller
                .ep_open(EP0_IN, EndpointType::Control, mps, 1);
        self.endpoints.open(EP0_OUT, EndpointType::Control, mps, 0);
        self.endpoints.open(EP0_IN, EndpointType::Control, mps, 0);

        self.address.set(0);
        let base_speed = match self.caps.speed {
            UsbSpeed::High480 => UsbSpeed::Full12,
            speed => speed,
        };
        self.current_speed.set(base_speed);
        if self.state.get() != DeviceState::None {
            self.state.set(DeviceState::Default);
        }
        if let Some(h) = self.bus_handler {
            h.reset();
        }
    }

    /// Disconnect classes, close their endpoints, and drop the active
    /// configuration, if any
    fn teardown_configuration(&self) {
        let value = self.configuration.get();
        if value != 0 {
            if let Some((handle, _)) =
                self.topology.configuration_by_value(value)
            {
                self.for_each_class(handle, |class| class.disconnect());
            }
        }

        for addr in self.endpoints.open_addresses() {
            self.controller.ep_close(addr);
            self.endpoints.close(addr);
        }

        if value != 0 {
            self.controller.configuration_clear(value);
            self.configuration.set(0);
            if self.state.get() == DeviceState::Configured {
                self.state.set(DeviceState::Addressed);
            }
        }
    }

    fn for_each_class(
        &self,
        config: ConfigHandle,
        mut f: impl FnMut(&dyn ClassDriver),
    ) {
        let Some(cfg) =
            self.topology.configurations.get(config.0 as usize)
        else {
            return;
        };
        for &if_ix in &cfg.interfaces {
            let intf = &self.topology.interfaces[if_ix as usize];
            if let Some(class) = intf
                .class_driver
                .and_then(|ix| self.classes.get(ix as usize).copied())
            {
                f(class);
            }
        }
    }

    pub(crate) fn finish_set_address(&self, address: u8) {
        self.address.set(address);
        self.state.set(if address == 0 {
            DeviceState::Default
        } else {
            DeviceState::Addressed
        });
    }

    /// Apply SET_CONFIGURATION: close whatever was open, then open
    /// every alt-0 endpoint of every interface of the new
    /// configuration and fire the class connect upcalls
    pub(crate) fn set_configuration(
        &self,
        value: u8,
    ) -> Result<(), UsbError> {
        if value != 0
            && self.topology.configuration_by_value(value).is_none()
        {
            return Err(UsbError::CfgInvalidNbr);
        }

        self.teardown_configuration();

        if value == 0 {
            return Ok(());
        }

        let (handle, _) = self
            .topology
            .configuration_by_value(value)
            .ok_or(UsbError::CfgInvalidNbr)?;
        self.controller
            .configuration_set(value)
            .map_err(|_| UsbError::CfgSetFail)?;

        self.alt_settings.borrow_mut().fill(0);

        let cfg = &self.topology.configurations[handle.0 as usize];
        for &if_ix in &cfg.interfaces {
            let intf = &self.topology.interfaces[if_ix as usize];
            let alt0 = &self.topology.alternates
                [intf.alternates[0] as usize];
            for ep in self.topology.endpoints_of(alt0) {
                self.controller.ep_open(
                    ep.address,
                    ep.ep_type,
                    ep.max_packet,
                    ep.transactions + 1,
                )?;
                self.endpoints.open(
                    ep.address,
                    ep.ep_type,
                    ep.max_packet,
                    intf.number,
                );
            }
        }

        self.configuration.set(value);
        self.state.set(DeviceState::Configured);

        self.for_each_class(handle, |class| class.connect(value));
        Ok(())
    }

    /// Apply SET_INTERFACE: swap one interface's endpoints from the
    /// old alternate setting to the new one
    pub(crate) fn set_interface(
        &self,
        interface_number: u8,
        alt: u8,
    ) -> Result<(), UsbError> {
        let config = self
            .active_config_handle()
            .ok_or(UsbError::DevInvalidState)?;
        let intf = self
            .topology
            .interface_in_config(config, interface_number)
            .ok_or(UsbError::IfInvalidNbr)?;
        let new_alt = self
            .topology
            .alternate_of(intf, alt)
            .ok_or(UsbError::IfAltInvalidNbr)?;

        let old = self.alt_settings.borrow()
            [interface_number as usize];
        if let Some(old_alt) = self.topology.alternate_of(intf, old) {
            for ep in self.topology.endpoints_of(old_alt) {
                self.controller.ep_close(ep.address);
                self.endpoints.close(ep.address);
            }
        }

        for ep in self.topology.endpoints_of(new_alt) {
            self.controller.ep_open(
                ep.address,
                ep.ep_type,
                ep.max_packet,
                ep.transactions + 1,
            )?;
            self.endpoints.open(
                ep.address,
                ep.ep_type,
                ep.max_packet,
                intf.number,
            );
        }

        self.alt_settings.borrow_mut()[interface_number as usize] =
            alt;

        if let Some(class) = intf
            .class_driver
            .and_then(|ix| self.classes.get(ix as usize).copied())
        {
            class.alt_setting_update(interface_number, alt);
        }
        Ok(())
    }

    /// GET_STATUS helper: `Some(halted)` for an endpoint the host may
    /// ask about, `None` otherwise
    pub(crate) fn endpoint_status(
        &self,
        addr: EndpointAddress,
    ) -> Option<bool> {
        if addr.is_control() {
            return if self.state.get() == DeviceState::Default {
                None
            } else {
                Some(false)
            };
        }
        match self.endpoints.slot(addr).state.get() {
            EndpointState::Open => Some(false),
            EndpointState::Halted => Some(true),
            EndpointState::Closed => None,
        }
    }

    /// Set or clear an endpoint halt. Pending transfers complete with
    /// `EpStall`; clearing resets the data toggle in hardware and
    /// notifies the owning class.
    pub fn endpoint_halt(
        &self,
        addr: EndpointAddress,
        halted: bool,
    ) -> Result<(), UsbError> {
        let slot = self.endpoints.slot(addr);
        if slot.state.get() == EndpointState::Closed {
            return Err(UsbError::EpInvalidState);
        }
        self.controller.ep_stall(addr, halted)?;
        if halted {
            if slot.state.get() == EndpointState::Open {
                slot.state.set(EndpointState::Halted);
                slot.post_completion(Some(UsbError::EpStall));
            }
        } else if slot.state.get() == EndpointState::Halted {
            slot.state.set(EndpointState::Open);
            slot.clear_completion();
        }

        if let Some(config) = self.active_config_handle() {
            let alts = *self.alt_settings.borrow();
            if let Some(class) = self
                .topology
                .interface_owning_endpoint(config, &alts, addr)
                .and_then(|intf| intf.class_driver)
                .and_then(|ix| self.classes.get(ix as usize).copied())
            {
                class.ep_state_update(addr, halted);
            }
        }
        Ok(())
    }

    /// Abort whatever is in flight on an endpoint; the waiter (if
    /// any) completes with `EpAbort` and the endpoint is ready for a
    /// fresh submission
    pub fn endpoint_abort(
        &self,
        addr: EndpointAddress,
    ) -> Result<(), UsbError> {
        let slot = self.endpoints.slot(addr);
        if slot.state.get() == EndpointState::Closed {
            return Err(UsbError::EpInvalidState);
        }
        self.controller.ep_abort(addr)?;
        slot.post_completion(Some(UsbError::EpAbort));
        Ok(())
    }

    fn validate_transfer(
        &self,
        addr: EndpointAddress,
        direction: Direction,
    ) -> Result<(), UsbError> {
        // Upcalls run on the pump task; a transfer submitted from one
        // could only complete through the pump it is blocking
        debug_assert!(
            !self.pump_active.get(),
            "endpoint I/O submitted from a class upcall"
        );
        if addr.is_control() || addr.direction() != direction {
            return Err(UsbError::EpInvalidAddr);
        }
        if self.state.get() != DeviceState::Configured {
            return Err(UsbError::DevInvalidState);
        }
        match self.endpoints.slot(addr).state.get() {
            EndpointState::Open => Ok(()),
            EndpointState::Halted => Err(UsbError::EpStall),
            EndpointState::Closed => Err(UsbError::EpInvalidState),
        }
    }

    /// Send `buf` to the host on an IN endpoint, fragmenting as
    /// needed. With `end` set, a max-packet-aligned transfer gains a
    /// terminating ZLP.
    ///
    /// `timeout` is any delay future; on expiry the transfer aborts
    /// and `OsTimeout` comes back. `futures::future::pending()` waits
    /// forever.
    pub async fn endpoint_write(
        &self,
        addr: EndpointAddress,
        buf: &[u8],
        end: bool,
        timeout: impl Future<Output = ()>,
    ) -> Result<usize, UsbError> {
        self.validate_transfer(addr, Direction::In)?;
        let slot = self.endpoints.slot(addr);
        let _lock = slot.lock.claim().await;
        let _urb = self.endpoints.urbs.claim().await;
        self.validate_transfer(addr, Direction::In)?;
        with_timeout(TxTransfer::new(self, addr, buf, end), timeout)
            .await
    }

    /// Receive from the host on an OUT endpoint. Ends on a short
    /// packet or a full buffer; returns the byte count.
    pub async fn endpoint_read(
        &self,
        addr: EndpointAddress,
        buf: &mut [u8],
        timeout: impl Future<Output = ()>,
    ) -> Result<usize, UsbError> {
        self.validate_transfer(addr, Direction::Out)?;
        let slot = self.endpoints.slot(addr);
        let _lock = slot.lock.claim().await;
        let _urb = self.endpoints.urbs.claim().await;
        self.validate_transfer(addr, Direction::Out)?;
        with_timeout(RxTransfer::new(self, addr, buf), timeout).await
    }

    /// Send an explicit zero-length packet
    pub async fn endpoint_write_zlp(
        &self,
        addr: EndpointAddress,
        timeout: impl Future<Output = ()>,
    ) -> Result<(), UsbError> {
        self.endpoint_write(addr, &[], false, timeout)
            .await
            .map(|_| ())
    }

    /// Receive an expected zero-length packet
    pub async fn endpoint_read_zlp(
        &self,
        addr: EndpointAddress,
        timeout: impl Future<Output = ()>,
    ) -> Result<(), UsbError> {
        self.validate_transfer(addr, Direction::Out)?;
        let slot = self.endpoints.slot(addr);
        let _lock = slot.lock.claim().await;
        let _urb = self.endpoints.urbs.claim().await;
        with_timeout(RxTransfer::new(self, addr, &mut []), timeout)
            .await
            .map(|_| ())
    }

    /// Bytes moved by the most recent transfer on `addr`, including
    /// one that timed out part-way
    pub fn last_transferred(&self, addr: EndpointAddress) -> usize {
        self.endpoints.slot(addr).last_transferred.get()
    }

    /// Take the device off the bus and quiesce everything
    pub fn stop(&self) {
        self.state.set(DeviceState::Stopping);
        self.teardown_configuration();
        self.controller.stop();
        self.address.set(0);
        self.state.set(DeviceState::Init);
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/device.rs"]
mod tests;
