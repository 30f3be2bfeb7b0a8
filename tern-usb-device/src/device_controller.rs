use crate::types::{EndpointAddress, EndpointType, UsbError, UsbSpeed};

/// What `address_set` did with the new bus address.
///
/// Some controllers latch the address in hardware and apply it
/// themselves after the status stage; others need the core to call
/// [`DeviceController::address_enable`] once the status stage has
/// gone out. The return value tells the standard-request handler
/// which convention this hardware follows, so the handler itself
/// stays identical across drivers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AddressPhase {
    /// Hardware applies the address after the status stage on its own
    Applied,
    /// Core must call `address_enable` after the status stage
    Deferred,
}

/// Fixed properties of a controller, read once at `start`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct Capabilities {
    /// Speed the PHY will enumerate at (high-speed controllers report
    /// `High480` here and raise the high-speed event if the handshake
    /// succeeds)
    pub speed: UsbSpeed,
    /// Max packet size of endpoint 0
    pub ep0_max_packet: u8,
    /// Largest single transfer the hardware accepts per URB; the
    /// endpoint engine fragments anything bigger
    pub urb_byte_ceiling: usize,
}

/// The data phase of a control request, from the handler's viewpoint.
pub enum DataPhase<'a> {
    /// Device-to-host: the handler fills the buffer, returns the length
    In(&'a mut [u8]),
    /// Host-to-device: the received payload
    Out(&'a [u8]),
    /// No data phase
    None,
}

/// The narrow contract every hardware backend implements.
///
/// All methods are called from the core task; the interrupt side of a
/// driver is its own code, whose only obligation is to translate
/// register events into upcalls on the
/// [`EventQueue`](crate::event::EventQueue). Methods take `&self`;
/// drivers wrap their register blocks in whatever interior-mutability
/// suits the silicon.
pub trait DeviceController {
    /// One-time hardware setup; may claim shadow memory
    fn init(&self) -> Result<(), UsbError>;

    /// Pull up D+/D- and enable bus-event interrupts. Idempotent
    /// after a prior `stop`.
    fn start(&self) -> Result<(), UsbError>;

    /// Disable interrupts and remove the bus pull-up
    fn stop(&self);

    /// Record (or immediately program) the address assigned by
    /// SET_ADDRESS; see [`AddressPhase`]
    fn address_set(&self, address: u8) -> AddressPhase;

    /// Commit the address recorded by a `Deferred` `address_set`,
    /// called after the status stage completes
    fn address_enable(&self, address: u8);

    /// SET_CONFIGURATION notification
    fn configuration_set(&self, value: u8) -> Result<(), UsbError>;

    /// Configuration teardown notification
    fn configuration_clear(&self, value: u8);

    /// Current (micro)frame counter: low 11 bits frame, bits 11..13
    /// microframe
    fn frame_number(&self) -> u16;

    fn capabilities(&self) -> Capabilities;

    /// Realise an endpoint in hardware. Called again, with the same
    /// address, across alternate-setting changes; drivers must
    /// tolerate the re-open.
    fn ep_open(
        &self,
        addr: EndpointAddress,
        ep_type: EndpointType,
        max_packet: u16,
        transactions_per_microframe: u8,
    ) -> Result<(), UsbError>;

    fn ep_close(&self, addr: EndpointAddress);

    /// Arm reception of up to `len` bytes; returns the number of bytes
    /// this pass will actually accept (often one packet, or a
    /// DMA-page-bounded chunk)
    fn ep_rx_start(
        &self,
        addr: EndpointAddress,
        len: usize,
    ) -> Result<usize, UsbError>;

    /// Drain the bytes behind an rx-complete upcall into `buf`
    fn ep_rx(
        &self,
        addr: EndpointAddress,
        buf: &mut [u8],
    ) -> Result<usize, UsbError>;

    /// Arm a zero-length reception, where hardware wants explicit
    /// arming for status stages
    fn ep_rx_zlp(&self, addr: EndpointAddress) -> Result<(), UsbError>;

    /// Stage bytes into the transmit FIFO or DMA descriptor; returns
    /// how many were accepted (at most one max-packet, or up to the
    /// URB ceiling on DMA controllers)
    fn ep_tx(
        &self,
        addr: EndpointAddress,
        buf: &[u8],
    ) -> Result<usize, UsbError>;

    /// Trigger the transmission staged by `ep_tx`
    fn ep_tx_start(&self, addr: EndpointAddress) -> Result<(), UsbError>;

    /// Transmit a zero-length packet
    fn ep_tx_zlp(&self, addr: EndpointAddress) -> Result<(), UsbError>;

    /// Flush any in-flight transfer; hardware is quiesced on return
    fn ep_abort(&self, addr: EndpointAddress) -> Result<(), UsbError>;

    /// Set or clear the halt condition. Clearing resets the data
    /// toggle to DATA0 on non-control endpoints.
    fn ep_stall(
        &self,
        addr: EndpointAddress,
        stalled: bool,
    ) -> Result<(), UsbError>;
}
