use super::*;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Wake, Waker};
extern crate alloc;

struct NoOpWaker;

impl Wake for NoOpWaker {
    fn wake(self: Arc<Self>) {}
}

#[test]
fn try_claim_exhausts() {
    let pool = Pool::new(2);
    let a = pool.try_claim().unwrap();
    let b = pool.try_claim().unwrap();
    assert_ne!(a.n, b.n);
    assert!(pool.try_claim().is_none());
    assert_eq!(pool.in_use(), 2);
}

#[test]
fn drop_releases() {
    let pool = Pool::new(1);
    {
        let _claim = pool.try_claim().unwrap();
        assert!(pool.try_claim().is_none());
    }
    assert!(pool.try_claim().is_some());
}

#[test]
fn claim_future_waits_for_release() {
    let w = Waker::from(Arc::new(NoOpWaker));
    let mut cx = Context::from_waker(&w);

    let pool = Pool::new(1);
    let held = pool.try_claim().unwrap();

    let mut fut = pin!(pool.claim());
    assert!(fut.as_mut().poll(&mut cx).is_pending());

    drop(held);
    assert!(fut.as_mut().poll(&mut cx).is_ready());
}

#[test]
fn display() {
    let pool = Pool::new(1);
    let claim = pool.try_claim().unwrap();
    assert_eq!(format!("{}", claim), "Claimed(0)");
}
