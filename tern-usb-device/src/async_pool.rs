use core::cell::{Cell, RefCell};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
#[cfg(feature = "std")]
use std::fmt::{self, Display};

/// A bitmap of up to 32 identical resources, claimable from async code.
///
/// Two jobs in this stack: the global URB budget (one slot per
/// queued transfer) and the per-endpoint submission lock (a pool of
/// one). Claims release on drop. Alloc and dealloc both happen on the
/// core executor, never in interrupt context, so plain cells suffice.
///
/// Only one claimant may be parked per pool at a time; the endpoint
/// engine guarantees this by serialising submissions per endpoint.
pub struct Pool {
    total: u8,
    allocated: Cell<u32>,
    waker: RefCell<Option<Waker>>,
}

/// One claimed slot; freed when dropped.
pub struct Claimed<'a> {
    pub n: u8,
    pool: &'a Pool,
}

#[cfg(feature = "std")]
impl Display for Claimed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Claimed({})", self.n)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Claimed<'_> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Claimed({})", self.n);
    }
}

impl Drop for Claimed<'_> {
    fn drop(&mut self) {
        self.pool.release(self.n);
    }
}

pub struct ClaimFuture<'a> {
    pool: &'a Pool,
}

impl<'a> Future for ClaimFuture<'a> {
    type Output = Claimed<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.pool.waker.replace(Some(cx.waker().clone()));

        if let Some(n) = self.pool.claim_slot() {
            Poll::Ready(Claimed {
                n,
                pool: self.pool,
            })
        } else {
            Poll::Pending
        }
    }
}

impl Pool {
    pub const fn new(total: u8) -> Self {
        assert!(total <= 32);
        Self {
            total,
            allocated: Cell::new(0),
            waker: RefCell::new(None),
        }
    }

    fn claim_slot(&self) -> Option<u8> {
        let bits = self.allocated.get();
        for i in 0..self.total {
            if (bits & (1 << i)) == 0 {
                self.allocated.set(bits | 1 << i);
                return Some(i);
            }
        }
        None
    }

    fn release(&self, n: u8) {
        self.allocated.set(self.allocated.get() & !(1 << n));

        if let Some(w) = self.waker.take() {
            w.wake();
        }
    }

    /// How many slots are currently claimed
    pub fn in_use(&self) -> u32 {
        self.allocated.get().count_ones()
    }

    pub fn claim(&self) -> ClaimFuture<'_> {
        ClaimFuture { pool: self }
    }

    pub fn try_claim(&self) -> Option<Claimed<'_>> {
        Some(Claimed {
            n: self.claim_slot()?,
            pool: self,
        })
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/async_pool.rs"]
mod tests;
