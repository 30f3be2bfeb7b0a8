use super::*;
use crate::device::{DeviceBuilder, UsbDevice};
use crate::event::{DeviceEvent, EventQueue};
use crate::mocks::MockDeviceController;
use crate::types::{Direction, DeviceState};
use futures::future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
extern crate alloc;

struct NoOpWaker;

impl Wake for NoOpWaker {
    fn wake(self: Arc<Self>) {}
}

const EP_IN: EndpointAddress = EndpointAddress::new(1, Direction::In);
const EP_OUT: EndpointAddress =
    EndpointAddress::new(1, Direction::Out);

fn configured_device(
    events: &EventQueue,
    hc: MockDeviceController,
) -> UsbDevice<'_, MockDeviceController> {
    let mut b =
        DeviceBuilder::new(hc, events, Default::default()).unwrap();
    let c = b.configuration_add(false, false, 100, None).unwrap();
    let i = b.interface_add(c, 0xFF, 0, 0, None, None).unwrap();
    let alt0 = b.alternate0(i).unwrap();
    b.bulk_add(c, alt0, Direction::In, 64).unwrap();
    b.bulk_add(c, alt0, Direction::Out, 64).unwrap();
    let dev = b.start().unwrap();
    dev.handle_event(DeviceEvent::Reset);
    dev.finish_set_address(5);
    dev.set_configuration(1).unwrap();
    assert_eq!(dev.state(), DeviceState::Configured);
    dev
}

fn complete(dev: &UsbDevice<MockDeviceController>, ep: EndpointAddress) {
    dev.handle_event(DeviceEvent::Complete { ep, error: None });
}

/// A 512-byte buffer on a 64-byte endpoint with `end` set goes out as
/// eight packets and exactly one trailing ZLP
#[test]
fn aligned_write_with_end_sends_zlp() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_tx()
        .times(8)
        .returning(|_, buf| Ok(buf.len().min(64)));
    hc.inner
        .expect_ep_tx_start()
        .times(8)
        .returning(|_| Ok(()));
    hc.inner.expect_ep_tx_zlp().times(1).returning(|_| Ok(()));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let buf = [0xA5u8; 512];
    let mut fut =
        pin!(dev.endpoint_write(EP_IN, &buf, true, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());

    for _ in 0..8 {
        complete(&dev, EP_IN);
        assert!(fut.as_mut().poll(&mut cx).is_pending());
    }
    // That last poll staged the ZLP
    complete(&dev, EP_IN);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(512)));
}

/// Without `end` the aligned transfer gets no ZLP
#[test]
fn aligned_write_without_end_sends_no_zlp() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_tx()
        .times(2)
        .returning(|_, buf| Ok(buf.len().min(64)));
    hc.inner
        .expect_ep_tx_start()
        .times(2)
        .returning(|_| Ok(()));
    hc.inner.expect_ep_tx_zlp().times(0);

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let buf = [0u8; 128];
    let mut fut = pin!(dev.endpoint_write(
        EP_IN,
        &buf,
        false,
        future::pending()
    ));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(128)));
}

/// An unaligned short write completes in one packet
#[test]
fn short_write() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_tx()
        .times(1)
        .returning(|_, buf| Ok(buf.len()));
    hc.inner
        .expect_ep_tx_start()
        .times(1)
        .returning(|_| Ok(()));
    hc.inner.expect_ep_tx_zlp().times(0);

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let buf = [1u8, 2, 3];
    let mut fut =
        pin!(dev.endpoint_write(EP_IN, &buf, true, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(3)));
}

/// DMA-style controllers take whole URB-ceiling chunks; a transfer
/// above the ceiling fragments and still delivers every byte
#[test]
fn transfer_fragments_at_urb_ceiling() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    let mut sizes = vec![16384usize, 3616];
    hc.inner.expect_ep_tx().times(2).returning(move |_, buf| {
        assert_eq!(buf.len(), sizes.remove(0));
        Ok(buf.len())
    });
    hc.inner
        .expect_ep_tx_start()
        .times(2)
        .returning(|_| Ok(()));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let buf = vec![0u8; 20000];
    let mut fut = pin!(dev.endpoint_write(
        EP_IN,
        &buf,
        false,
        future::pending()
    ));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(20000)));
}

#[test]
fn read_fills_buffer_across_packets() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_rx_start()
        .times(2)
        .returning(|_, want| Ok(want.min(64)));
    hc.inner.expect_ep_rx().times(2).returning(|_, buf| {
        buf.fill(0x5A);
        Ok(buf.len().min(64))
    });

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let mut buf = [0u8; 128];
    let mut fut =
        pin!(dev.endpoint_read(EP_OUT, &mut buf, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_OUT);
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_OUT);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(128)));
}

#[test]
fn short_packet_ends_read_early() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_rx_start()
        .times(1)
        .returning(|_, want| Ok(want.min(64)));
    hc.inner
        .expect_ep_rx()
        .times(1)
        .returning(|_, _| Ok(10));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let mut buf = [0u8; 128];
    let mut fut =
        pin!(dev.endpoint_read(EP_OUT, &mut buf, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_OUT);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(10)));
}

/// A timed-out read aborts the endpoint, reports `OsTimeout`, and
/// leaves the endpoint ready for the next submission
#[test]
fn timeout_aborts_and_recovers() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_rx_start()
        .times(2)
        .returning(|_, want| Ok(want.min(64)));
    hc.inner.expect_ep_abort().times(1).returning(|_| Ok(()));
    hc.inner
        .expect_ep_rx()
        .times(1)
        .returning(|_, _| Ok(32));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let mut buf = [0u8; 1024];
    {
        let mut fut = pin!(dev.endpoint_read(
            EP_OUT,
            &mut buf,
            future::ready(())
        ));
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(UsbError::OsTimeout))
        );
    }

    // The aborted URB's late completion must not reach the next one:
    // the next submission clears it before arming
    complete(&dev, EP_OUT);

    let mut fut =
        pin!(dev.endpoint_read(EP_OUT, &mut buf, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_OUT);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(32)));
}

#[test]
fn external_abort_signals_waiter() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_rx_start()
        .times(1)
        .returning(|_, want| Ok(want.min(64)));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let mut buf = [0u8; 64];
    let mut fut =
        pin!(dev.endpoint_read(EP_OUT, &mut buf, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());

    dev.endpoint_abort(EP_OUT).unwrap();
    assert_eq!(
        fut.as_mut().poll(&mut cx),
        Poll::Ready(Err(UsbError::EpAbort))
    );
}

#[test]
fn halt_completes_waiter_with_stall() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_rx_start()
        .times(1)
        .returning(|_, want| Ok(want.min(64)));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let mut buf = [0u8; 64];
    {
        let mut fut =
            pin!(dev.endpoint_read(EP_OUT, &mut buf, future::pending()));
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        dev.endpoint_halt(EP_OUT, true).unwrap();
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(UsbError::EpStall))
        );
    }
    assert_eq!(dev.endpoint_status(EP_OUT), Some(true));

    // New submissions bounce until the host clears the halt
    {
        let mut fut = pin!(dev.endpoint_read(
            EP_OUT,
            &mut buf,
            future::pending()
        ));
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(UsbError::EpStall))
        );
    }

    dev.endpoint_halt(EP_OUT, false).unwrap();
    assert_eq!(dev.endpoint_status(EP_OUT), Some(false));
}

#[test]
fn explicit_zlp_entry_points() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner.expect_ep_tx_zlp().times(1).returning(|_| Ok(()));
    hc.inner.expect_ep_rx_zlp().times(1).returning(|_| Ok(()));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let mut fut =
        pin!(dev.endpoint_write_zlp(EP_IN, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(())));

    let mut fut =
        pin!(dev.endpoint_read_zlp(EP_OUT, future::pending()));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_OUT);
    assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(())));
}

#[test]
fn submissions_validate_state() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let events = EventQueue::new();
    let dev =
        configured_device(&events, MockDeviceController::default());

    let buf = [0u8; 8];
    // Wrong direction
    {
        let mut fut = pin!(dev.endpoint_write(
            EP_OUT,
            &buf,
            false,
            future::pending()
        ));
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(UsbError::EpInvalidAddr))
        );
    }
    // Control endpoints are off limits here
    {
        let ep0 = EndpointAddress::new(0, Direction::In);
        let mut fut = pin!(dev.endpoint_write(
            ep0,
            &buf,
            false,
            future::pending()
        ));
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(UsbError::EpInvalidAddr))
        );
    }

    // Unconfigured device refuses
    dev.set_configuration(0).unwrap();
    {
        let mut fut = pin!(dev.endpoint_write(
            EP_IN,
            &buf,
            false,
            future::pending()
        ));
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(UsbError::DevInvalidState))
        );
    }
}

/// A second writer awaits the endpoint lock and proceeds once the
/// first transfer finishes
#[test]
fn submission_lock_serialises_writers() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let mut hc = MockDeviceController::default();
    hc.inner
        .expect_ep_tx()
        .times(2)
        .returning(|_, buf| Ok(buf.len()));
    hc.inner
        .expect_ep_tx_start()
        .times(2)
        .returning(|_| Ok(()));

    let events = EventQueue::new();
    let dev = configured_device(&events, hc);

    let a = [1u8; 8];
    let b = [2u8; 8];
    let mut first =
        pin!(dev.endpoint_write(EP_IN, &a, false, future::pending()));
    let mut second =
        pin!(dev.endpoint_write(EP_IN, &b, false, future::pending()));

    assert!(first.as_mut().poll(&mut cx).is_pending());
    // Blocked on the lock: no hardware call yet for `second`
    assert!(second.as_mut().poll(&mut cx).is_pending());

    complete(&dev, EP_IN);
    assert_eq!(first.as_mut().poll(&mut cx), Poll::Ready(Ok(8)));

    assert!(second.as_mut().poll(&mut cx).is_pending());
    complete(&dev, EP_IN);
    assert_eq!(second.as_mut().poll(&mut cx), Poll::Ready(Ok(8)));
}
