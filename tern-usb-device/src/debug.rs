// Where log lines go, best option first:
//   std (host-side tests) -> std's println
//   bare metal + defmt    -> defmt, at debug level
//   anything else         -> nowhere

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
pub use std::println;

#[cfg(all(target_os = "none", feature = "defmt"))]
pub use defmt::debug as println;

#[cfg(all(
    not(feature = "std"),
    not(all(target_os = "none", feature = "defmt"))
))]
#[macro_export]
macro_rules! println {
    ($fmt:expr) => {};
    ($fmt:expr, $($arg:tt)*) => {};
}

#[cfg(all(
    not(feature = "std"),
    not(all(target_os = "none", feature = "defmt"))
))]
pub use println;
