// The core crate already picks between std, defmt, and silence;
// log through its choice rather than repeating the selection here.

pub use tern_usb_device::debug::println;
