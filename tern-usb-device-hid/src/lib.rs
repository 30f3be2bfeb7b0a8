#![cfg_attr(not(feature = "std"), no_std)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(docsrs, feature(doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(doc)))]

mod debug;

/// The HID class driver
pub mod hid;
pub use hid::{CountryCode, HidClass, HidHandler, NullHandler};

/// Report-descriptor parsing and per-report bookkeeping
pub mod report;
pub use report::{HidError, ReportStructure, ReportType};
