use crate::config::EVENT_QUEUE_DEPTH;
use crate::types::{Direction, EndpointAddress, UsbError};
use crate::wire::SetupPacket;
use core::cell::UnsafeCell;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use futures::Stream;

/// One occurrence the interrupt handler reports to the core task.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Bus reset seen
    Reset,
    /// Bus idle for >3 ms
    Suspend,
    /// Resume signalling seen
    Resume,
    /// VBUS appeared
    Connect,
    /// VBUS went away
    Disconnect,
    /// High-speed handshake completed
    HighSpeed,
    /// A SETUP packet arrived on endpoint 0
    Setup(SetupPacket),
    /// A queued transfer on `ep` finished in hardware
    Complete {
        ep: EndpointAddress,
        error: Option<UsbError>,
    },
}

/// A waker slot that is safe to wake from interrupt context.
pub(crate) struct IrqWaker {
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: the inner cell is only touched inside critical sections
unsafe impl Sync for IrqWaker {}

impl IrqWaker {
    pub const fn new() -> Self {
        Self {
            waker: UnsafeCell::new(None),
        }
    }

    pub fn register(&self, waker: &Waker) {
        critical_section::with(|_| {
            // SAFETY: within the critical section we are the only accessor
            let slot = unsafe { &mut *self.waker.get() };
            match slot {
                Some(w) if w.will_wake(waker) => {}
                _ => *slot = Some(waker.clone()),
            }
        });
    }

    pub fn wake(&self) {
        let w = critical_section::with(|_| {
            // SAFETY: within the critical section we are the only accessor
            unsafe { (*self.waker.get()).take() }
        });
        if let Some(w) = w {
            w.wake();
        }
    }
}

struct Ring {
    slots: [Option<DeviceEvent>; EVENT_QUEUE_DEPTH],
    head: usize,
    len: usize,
}

/// The single-producer (ISR) / single-consumer (core task) event
/// channel.
///
/// One of these, usually `static`, sits between each controller's
/// interrupt handler and the [`UsbDevice`](crate::device::UsbDevice)
/// that owns that controller. The ISR calls the named upcalls; the
/// core task drains them through [`EventQueue::stream()`].
///
/// Capacity is [`EVENT_QUEUE_DEPTH`]: enough for the worst case of one
/// completion per open endpoint plus the bus-event budget. Overflow
/// means the build was mis-sized and panics.
pub struct EventQueue {
    ring: UnsafeCell<Ring>,
    waker: IrqWaker,
}

// SAFETY: the ring is only touched inside critical sections
unsafe impl Sync for EventQueue {}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            ring: UnsafeCell::new(Ring {
                slots: [None; EVENT_QUEUE_DEPTH],
                head: 0,
                len: 0,
            }),
            waker: IrqWaker::new(),
        }
    }

    fn push(&self, event: DeviceEvent) {
        critical_section::with(|_| {
            // SAFETY: within the critical section we are the only accessor
            let ring = unsafe { &mut *self.ring.get() };
            assert!(
                ring.len < EVENT_QUEUE_DEPTH,
                "usb event queue overflow"
            );
            let tail = (ring.head + ring.len) % EVENT_QUEUE_DEPTH;
            ring.slots[tail] = Some(event);
            ring.len += 1;
        });
        self.waker.wake();
    }

    /// Take the oldest undelivered event, if any
    pub fn pop(&self) -> Option<DeviceEvent> {
        critical_section::with(|_| {
            // SAFETY: within the critical section we are the only accessor
            let ring = unsafe { &mut *self.ring.get() };
            if ring.len == 0 {
                return None;
            }
            let event = ring.slots[ring.head].take();
            ring.head = (ring.head + 1) % EVENT_QUEUE_DEPTH;
            ring.len -= 1;
            event
        })
    }

    /// The core task's view: an endless stream of events
    pub fn stream(&self) -> EventStream<'_> {
        EventStream { queue: self }
    }

    // Named upcalls, for the controller ISR's convenience.

    pub fn reset(&self) {
        self.push(DeviceEvent::Reset);
    }

    pub fn suspend(&self) {
        self.push(DeviceEvent::Suspend);
    }

    pub fn resume(&self) {
        self.push(DeviceEvent::Resume);
    }

    pub fn connect(&self) {
        self.push(DeviceEvent::Connect);
    }

    pub fn disconnect(&self) {
        self.push(DeviceEvent::Disconnect);
    }

    pub fn high_speed(&self) {
        self.push(DeviceEvent::HighSpeed);
    }

    pub fn setup(&self, packet: SetupPacket) {
        self.push(DeviceEvent::Setup(packet));
    }

    /// An armed OUT transfer on logical endpoint `number` was fulfilled
    pub fn rx_complete(&self, number: u8) {
        self.push(DeviceEvent::Complete {
            ep: EndpointAddress::new(number, Direction::Out),
            error: None,
        });
    }

    /// A staged IN transfer on logical endpoint `number` went out
    pub fn tx_complete(&self, number: u8) {
        self.push(DeviceEvent::Complete {
            ep: EndpointAddress::new(number, Direction::In),
            error: None,
        });
    }

    /// As [`tx_complete`](Self::tx_complete), with a hardware error
    pub fn tx_complete_err(&self, number: u8, error: UsbError) {
        self.push(DeviceEvent::Complete {
            ep: EndpointAddress::new(number, Direction::In),
            error: Some(error),
        });
    }

    /// As [`rx_complete`](Self::rx_complete), with a hardware error
    pub fn rx_complete_err(&self, number: u8, error: UsbError) {
        self.push(DeviceEvent::Complete {
            ep: EndpointAddress::new(number, Direction::Out),
            error: Some(error),
        });
    }
}

pub struct EventStream<'q> {
    queue: &'q EventQueue,
}

impl Stream for EventStream<'_> {
    type Item = DeviceEvent;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.queue.waker.register(cx.waker());

        if let Some(event) = self.queue.pop() {
            Poll::Ready(Some(event))
        } else {
            Poll::Pending
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/event.rs"]
mod tests;
