#![cfg_attr(not(feature = "std"), no_std)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(docsrs, feature(doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(doc)))]

/// The async URB pool and endpoint submission locks
pub mod async_pool;

/// The class-driver upcall interface
pub mod class;

/// Compile-time capacities
pub mod config;

/// The chapter-9 control pipe state machine
mod control;

#[doc(hidden)]
pub mod debug;

/// Descriptor assembly
pub mod descriptors;

/// The stack itself
pub mod device;

/// The contract every hardware backend implements
pub mod device_controller;

/// The ISR-to-task event channel
pub mod event;

/// The endpoint I/O engine
pub mod endpoint;

#[cfg(feature = "std")]
/// Mock controller for host-side tests
pub mod mocks;

/// The registered device tree
pub mod topology;

/// Error type and other pervasive types
pub mod types;

/// Wire-format packets, descriptors, and constants
pub mod wire;

pub use device::{DeviceBuilder, UsbDevice};
pub use types::UsbError;
