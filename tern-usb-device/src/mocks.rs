use crate::device_controller::{
    AddressPhase, Capabilities, DeviceController,
};
use crate::types::{EndpointAddress, EndpointType, UsbError, UsbSpeed};
use mockall::mock;

mock! {
    pub DeviceControllerInner {
        pub fn init(&self) -> Result<(), UsbError>;
        pub fn start(&self) -> Result<(), UsbError>;
        pub fn stop(&self);
        pub fn address_set(&self, address: u8) -> AddressPhase;
        pub fn address_enable(&self, address: u8);
        pub fn configuration_set(&self, value: u8) -> Result<(), UsbError>;
        pub fn configuration_clear(&self, value: u8);
        pub fn frame_number(&self) -> u16;
        pub fn capabilities(&self) -> Capabilities;
        pub fn ep_open(
            &self,
            addr: EndpointAddress,
            ep_type: EndpointType,
            max_packet: u16,
            transactions_per_microframe: u8,
        ) -> Result<(), UsbError>;
        pub fn ep_close(&self, addr: EndpointAddress);
        pub fn ep_rx_start(
            &self,
            addr: EndpointAddress,
            len: usize,
        ) -> Result<usize, UsbError>;
        pub fn ep_rx(
            &self,
            addr: EndpointAddress,
            buf: &mut [u8],
        ) -> Result<usize, UsbError>;
        pub fn ep_rx_zlp(&self, addr: EndpointAddress) -> Result<(), UsbError>;
        pub fn ep_tx(
            &self,
            addr: EndpointAddress,
            buf: &[u8],
        ) -> Result<usize, UsbError>;
        pub fn ep_tx_start(&self, addr: EndpointAddress) -> Result<(), UsbError>;
        pub fn ep_tx_zlp(&self, addr: EndpointAddress) -> Result<(), UsbError>;
        pub fn ep_abort(&self, addr: EndpointAddress) -> Result<(), UsbError>;
        pub fn ep_stall(
            &self,
            addr: EndpointAddress,
            stalled: bool,
        ) -> Result<(), UsbError>;
    }
}

/// A [`DeviceController`] whose every call is a mockall expectation.
///
/// By default `init`/`start` succeed, `capabilities` reports a
/// full-speed controller with a 64-byte endpoint 0 and a 16 KiB URB
/// ceiling, and `ep_open`/`ep_close`/`ep_stall`/`ep_abort` are
/// permitted freely; tests override whichever calls they care about
/// on `inner`.
pub struct MockDeviceController {
    pub inner: MockDeviceControllerInner,
}

pub const MOCK_CAPABILITIES: Capabilities = Capabilities {
    speed: UsbSpeed::Full12,
    ep0_max_packet: 64,
    urb_byte_ceiling: 16384,
};

impl Default for MockDeviceController {
    fn default() -> Self {
        let mut inner = MockDeviceControllerInner::new();
        inner.expect_init().returning(|| Ok(()));
        inner.expect_start().returning(|| Ok(()));
        inner.expect_stop().return_const(());
        inner
            .expect_capabilities()
            .returning(|| MOCK_CAPABILITIES);
        inner.expect_ep_open().returning(|_, _, _, _| Ok(()));
        inner.expect_ep_close().return_const(());
        inner.expect_ep_stall().returning(|_, _| Ok(()));
        inner.expect_ep_abort().returning(|_| Ok(()));
        inner.expect_configuration_set().returning(|_| Ok(()));
        inner.expect_configuration_clear().return_const(());
        Self { inner }
    }
}

impl DeviceController for MockDeviceController {
    fn init(&self) -> Result<(), UsbError> {
        self.inner.init()
    }

    fn start(&self) -> Result<(), UsbError> {
        self.inner.start()
    }

    fn stop(&self) {
        self.inner.stop()
    }

    fn address_set(&self, address: u8) -> AddressPhase {
        self.inner.address_set(address)
    }

    fn address_enable(&self, address: u8) {
        self.inner.address_enable(address)
    }

    fn configuration_set(&self, value: u8) -> Result<(), UsbError> {
        self.inner.configuration_set(value)
    }

    fn configuration_clear(&self, value: u8) {
        self.inner.configuration_clear(value)
    }

    fn frame_number(&self) -> u16 {
        self.inner.frame_number()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn ep_open(
        &self,
        addr: EndpointAddress,
        ep_type: EndpointType,
        max_packet: u16,
        transactions_per_microframe: u8,
    ) -> Result<(), UsbError> {
        self.inner.ep_open(
            addr,
            ep_type,
            max_packet,
            transactions_per_microframe,
        )
    }

    fn ep_close(&self, addr: EndpointAddress) {
        self.inner.ep_close(addr)
    }

    fn ep_rx_start(
        &self,
        addr: EndpointAddress,
        len: usize,
    ) -> Result<usize, UsbError> {
        self.inner.ep_rx_start(addr, len)
    }

    fn ep_rx(
        &self,
        addr: EndpointAddress,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        self.inner.ep_rx(addr, buf)
    }

    fn ep_rx_zlp(&self, addr: EndpointAddress) -> Result<(), UsbError> {
        self.inner.ep_rx_zlp(addr)
    }

    fn ep_tx(
        &self,
        addr: EndpointAddress,
        buf: &[u8],
    ) -> Result<usize, UsbError> {
        self.inner.ep_tx(addr, buf)
    }

    fn ep_tx_start(&self, addr: EndpointAddress) -> Result<(), UsbError> {
        self.inner.ep_tx_start(addr)
    }

    fn ep_tx_zlp(&self, addr: EndpointAddress) -> Result<(), UsbError> {
        self.inner.ep_tx_zlp(addr)
    }

    fn ep_abort(&self, addr: EndpointAddress) -> Result<(), UsbError> {
        self.inner.ep_abort(addr)
    }

    fn ep_stall(
        &self,
        addr: EndpointAddress,
        stalled: bool,
    ) -> Result<(), UsbError> {
        self.inner.ep_stall(addr, stalled)
    }
}
