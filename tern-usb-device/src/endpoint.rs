use crate::async_pool::Pool;
use crate::config::{EXTRA_URBS, MAX_PHYSICAL_ENDPOINTS};
use crate::device::UsbDevice;
use crate::device_controller::DeviceController;
use crate::types::{EndpointAddress, EndpointType, UsbError};
use core::cell::{Cell, RefCell};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use futures::future::Either;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Closed,
    Open,
    Halted,
}

/// One physical endpoint slot.
///
/// The lock serialises submissions (and, on IN endpoints, the HID
/// idle task against application writers); the completion cell is
/// written by the event dispatcher and consumed by the transfer
/// future it wakes.
pub(crate) struct EndpointSlot {
    pub state: Cell<EndpointState>,
    pub ep_type: Cell<EndpointType>,
    pub max_packet: Cell<u16>,
    /// Interface number owning this endpoint in the active
    /// configuration, for class request routing
    pub interface: Cell<u8>,
    pub lock: Pool,
    completion: Cell<Option<Option<UsbError>>>,
    waker: RefCell<Option<Waker>>,
    /// Bytes moved by the most recent transfer, including one that
    /// timed out part-way
    pub last_transferred: Cell<usize>,
}

impl EndpointSlot {
    fn new() -> Self {
        Self {
            state: Cell::new(EndpointState::Closed),
            ep_type: Cell::new(EndpointType::Bulk),
            max_packet: Cell::new(0),
            interface: Cell::new(0),
            lock: Pool::new(1),
            completion: Cell::new(None),
            waker: RefCell::new(None),
            last_transferred: Cell::new(0),
        }
    }

    pub fn set_waker(&self, waker: &Waker) {
        let mut slot = self.waker.borrow_mut();
        match &*slot {
            Some(w) if w.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    pub fn wake(&self) {
        if let Some(w) = self.waker.borrow_mut().take() {
            w.wake();
        }
    }

    pub fn post_completion(&self, error: Option<UsbError>) {
        self.completion.set(Some(error));
        self.wake();
    }

    pub fn take_completion(&self) -> Option<Option<UsbError>> {
        self.completion.take()
    }

    /// Forget any completion left over from a timed-out or aborted
    /// predecessor; called as each new transfer starts
    pub fn clear_completion(&self) {
        self.completion.set(None);
    }
}

pub(crate) struct Endpoints {
    slots: [EndpointSlot; MAX_PHYSICAL_ENDPOINTS],
    /// The global URB budget: one slot per concurrently queued
    /// transfer, device-wide
    pub urbs: Pool,
}

const URB_POOL_SIZE: usize = {
    let n = MAX_PHYSICAL_ENDPOINTS + EXTRA_URBS;
    if n > 32 {
        32
    } else {
        n
    }
};

impl Endpoints {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| EndpointSlot::new()),
            urbs: Pool::new(URB_POOL_SIZE as u8),
        }
    }

    pub fn slot(&self, addr: EndpointAddress) -> &EndpointSlot {
        &self.slots[addr.index()]
    }

    pub fn open(
        &self,
        addr: EndpointAddress,
        ep_type: EndpointType,
        max_packet: u16,
        interface: u8,
    ) {
        let slot = self.slot(addr);
        slot.state.set(EndpointState::Open);
        slot.ep_type.set(ep_type);
        slot.max_packet.set(max_packet);
        slot.interface.set(interface);
        slot.clear_completion();
    }

    pub fn close(&self, addr: EndpointAddress) {
        let slot = self.slot(addr);
        if slot.state.get() != EndpointState::Closed {
            slot.post_completion(Some(UsbError::EpAbort));
            slot.state.set(EndpointState::Closed);
        }
    }

    /// Every non-control endpoint that is currently open
    pub fn open_addresses(
        &self,
    ) -> impl Iterator<Item = EndpointAddress> + '_ {
        (0..MAX_PHYSICAL_ENDPOINTS).filter_map(move |ix| {
            let slot = &self.slots[ix];
            if slot.state.get() == EndpointState::Closed {
                return None;
            }
            let number = (ix / 2) as u8;
            if number == 0 {
                return None;
            }
            let direction = if ix % 2 == 1 {
                crate::types::Direction::In
            } else {
                crate::types::Direction::Out
            };
            Some(EndpointAddress::new(number, direction))
        })
    }

    pub fn on_complete(
        &self,
        addr: EndpointAddress,
        error: Option<UsbError>,
    ) {
        self.slot(addr).post_completion(error);
    }
}

/// Device-to-host transfer on an IN endpoint, fragmented across the
/// packet size and the controller's per-URB ceiling.
///
/// Completion events arrive through the event pump, which must be
/// polled concurrently. Dropping the future mid-flight aborts the
/// hardware endpoint, so racing it against a delay future gives the
/// timeout semantics for free.
pub(crate) struct TxTransfer<'a, 'd, DC: DeviceController> {
    dev: &'a UsbDevice<'d, DC>,
    ep: EndpointAddress,
    buf: &'a [u8],
    offset: usize,
    staged: usize,
    end: bool,
    zlp_pending: bool,
    started: bool,
    finished: bool,
}

impl<'a, 'd, DC: DeviceController> TxTransfer<'a, 'd, DC> {
    pub fn new(
        dev: &'a UsbDevice<'d, DC>,
        ep: EndpointAddress,
        buf: &'a [u8],
        end: bool,
    ) -> Self {
        let max_packet = dev.endpoints().slot(ep).max_packet.get() as usize;
        let zlp_pending = end
            && !buf.is_empty()
            && max_packet != 0
            && buf.len() % max_packet == 0;
        Self {
            dev,
            ep,
            buf,
            offset: 0,
            staged: 0,
            end,
            zlp_pending,
            started: false,
            finished: false,
        }
    }

    fn stage_next(&mut self) -> Result<(), UsbError> {
        let ceiling = self.dev.capabilities().urb_byte_ceiling;
        let chunk = (self.buf.len() - self.offset).min(ceiling);
        let accepted = self
            .dev
            .controller()
            .ep_tx(self.ep, &self.buf[self.offset..self.offset + chunk])?;
        self.dev.controller().ep_tx_start(self.ep)?;
        self.staged = accepted;
        Ok(())
    }
}

impl<DC: DeviceController> Future for TxTransfer<'_, '_, DC> {
    type Output = Result<usize, UsbError>;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let this = self.get_mut();
        let slot = this.dev.endpoints().slot(this.ep);
        slot.set_waker(cx.waker());

        if !this.started {
            this.started = true;
            slot.clear_completion();
            slot.last_transferred.set(0);
            if this.buf.is_empty() {
                // A bare ZLP: the dedicated entry points land here
                if let Err(e) = this.dev.controller().ep_tx_zlp(this.ep) {
                    this.finished = true;
                    return Poll::Ready(Err(e));
                }
            } else if let Err(e) = this.stage_next() {
                this.finished = true;
                return Poll::Ready(Err(e));
            }
            return Poll::Pending;
        }

        if let Some(result) = slot.take_completion() {
            if let Some(error) = result {
                this.finished = true;
                return Poll::Ready(Err(error));
            }
            this.offset += this.staged;
            this.staged = 0;
            slot.last_transferred.set(this.offset);

            if this.offset < this.buf.len() {
                if let Err(e) = this.stage_next() {
                    this.finished = true;
                    return Poll::Ready(Err(e));
                }
                return Poll::Pending;
            }
            if this.zlp_pending {
                this.zlp_pending = false;
                if let Err(e) = this.dev.controller().ep_tx_zlp(this.ep) {
                    this.finished = true;
                    return Poll::Ready(Err(e));
                }
                return Poll::Pending;
            }
            this.finished = true;
            return Poll::Ready(Ok(this.buf.len()));
        }

        Poll::Pending
    }
}

impl<DC: DeviceController> Drop for TxTransfer<'_, '_, DC> {
    fn drop(&mut self) {
        if self.started && !self.finished {
            let _ = self.dev.controller().ep_abort(self.ep);
            self.dev.endpoints().slot(self.ep).clear_completion();
        }
    }
}

/// Host-to-device transfer on an OUT endpoint. A short packet ends
/// the transfer early; the result is the byte count received.
pub(crate) struct RxTransfer<'a, 'd, DC: DeviceController> {
    dev: &'a UsbDevice<'d, DC>,
    ep: EndpointAddress,
    buf: &'a mut [u8],
    offset: usize,
    armed: usize,
    started: bool,
    finished: bool,
}

impl<'a, 'd, DC: DeviceController> RxTransfer<'a, 'd, DC> {
    pub fn new(
        dev: &'a UsbDevice<'d, DC>,
        ep: EndpointAddress,
        buf: &'a mut [u8],
    ) -> Self {
        Self {
            dev,
            ep,
            buf,
            offset: 0,
            armed: 0,
            started: false,
            finished: false,
        }
    }

    fn arm_next(&mut self) -> Result<(), UsbError> {
        let ceiling = self.dev.capabilities().urb_byte_ceiling;
        let want = (self.buf.len() - self.offset).min(ceiling);
        self.armed = self.dev.controller().ep_rx_start(self.ep, want)?;
        Ok(())
    }
}

impl<DC: DeviceController> Future for RxTransfer<'_, '_, DC> {
    type Output = Result<usize, UsbError>;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let this = self.get_mut();
        let slot = this.dev.endpoints().slot(this.ep);
        slot.set_waker(cx.waker());

        if !this.started {
            this.started = true;
            slot.clear_completion();
            slot.last_transferred.set(0);
            let r = if this.buf.is_empty() {
                this.dev.controller().ep_rx_zlp(this.ep)
            } else {
                this.arm_next()
            };
            if let Err(e) = r {
                this.finished = true;
                return Poll::Ready(Err(e));
            }
            return Poll::Pending;
        }

        if let Some(result) = slot.take_completion() {
            if let Some(error) = result {
                this.finished = true;
                return Poll::Ready(Err(error));
            }
            if this.buf.is_empty() {
                this.finished = true;
                return Poll::Ready(Ok(0));
            }
            let armed = this.armed.min(this.buf.len() - this.offset);
            let end = this.offset + armed;
            let received = match this
                .dev
                .controller()
                .ep_rx(this.ep, &mut this.buf[this.offset..end])
            {
                Ok(n) => n,
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Err(e));
                }
            };
            this.offset += received;
            slot.last_transferred.set(this.offset);

            let max_packet = slot.max_packet.get() as usize;
            let short = received < armed
                || (max_packet != 0 && received % max_packet != 0);
            if short || this.offset == this.buf.len() {
                this.finished = true;
                return Poll::Ready(Ok(this.offset));
            }
            if let Err(e) = this.arm_next() {
                this.finished = true;
                return Poll::Ready(Err(e));
            }
            return Poll::Pending;
        }

        Poll::Pending
    }
}

impl<DC: DeviceController> Drop for RxTransfer<'_, '_, DC> {
    fn drop(&mut self) {
        if self.started && !self.finished {
            let _ = self.dev.controller().ep_abort(self.ep);
            self.dev.endpoints().slot(self.ep).clear_completion();
        }
    }
}

/// Race a transfer against a caller-supplied delay; on expiry the
/// transfer future drops, which aborts the hardware endpoint.
/// `futures::future::pending()` means wait forever.
pub(crate) async fn with_timeout<T>(
    transfer: impl Future<Output = Result<T, UsbError>>,
    timeout: impl Future<Output = ()>,
) -> Result<T, UsbError> {
    let transfer = core::pin::pin!(transfer);
    let timeout = core::pin::pin!(timeout);
    match futures::future::select(transfer, timeout).await {
        Either::Left((result, _)) => result,
        Either::Right(((), transfer)) => {
            drop(transfer);
            Err(UsbError::OsTimeout)
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/endpoint.rs"]
mod tests;
