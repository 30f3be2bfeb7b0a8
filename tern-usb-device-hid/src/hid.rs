use crate::debug;
use crate::report::{
    HidError, ReportStructure, ReportType, MAX_REPORT_BYTES,
};
use core::cell::{Cell, RefCell};
use core::future::Future;
use core::task::{Poll, Waker};
use futures::future::Either;
use tern_usb_device::class::ClassDriver;
use tern_usb_device::descriptors::DescriptorWriter;
use tern_usb_device::device::{DeviceBuilder, UsbDevice};
use tern_usb_device::device_controller::{
    DataPhase, DeviceController,
};
use tern_usb_device::topology::ConfigHandle;
use tern_usb_device::types::{
    Direction, EndpointAddress, UsbError, UsbSpeed,
};
use tern_usb_device::wire::{SetupPacket, GET_DESCRIPTOR};

// Class requests (HID 1.11 section 7.2)
const REQ_GET_REPORT: u8 = 0x01;
const REQ_GET_IDLE: u8 = 0x02;
const REQ_GET_PROTOCOL: u8 = 0x03;
const REQ_SET_REPORT: u8 = 0x09;
const REQ_SET_IDLE: u8 = 0x0A;
const REQ_SET_PROTOCOL: u8 = 0x0B;

// Class descriptor types (HID 1.11 section 7.1)
pub const HID_DESCRIPTOR: u8 = 0x21;
pub const REPORT_DESCRIPTOR: u8 = 0x22;
pub const PHYSICAL_DESCRIPTOR: u8 = 0x23;

// bInterfaceSubClass / bInterfaceProtocol (HID 1.11 section 4.2)
pub const INTERFACE_CLASS: u8 = 3;
pub const SUBCLASS_NONE: u8 = 0;
pub const SUBCLASS_BOOT: u8 = 1;
pub const PROTOCOL_NONE: u8 = 0;
pub const PROTOCOL_KEYBOARD: u8 = 1;
pub const PROTOCOL_MOUSE: u8 = 2;

// GET_PROTOCOL / SET_PROTOCOL values
pub const BOOT_PROTOCOL: u8 = 0;
pub const REPORT_PROTOCOL: u8 = 1;

/// bCountryCode values for the HID descriptor (HID 1.11 section 6.2.1)
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CountryCode {
    NotSupported = 0,
    Arabic = 1,
    Belgian = 2,
    CanadianBilingual = 3,
    CanadianFrench = 4,
    CzechRepublic = 5,
    Danish = 6,
    Finnish = 7,
    French = 8,
    German = 9,
    Greek = 10,
    Hebrew = 11,
    Hungary = 12,
    International = 13,
    Italian = 14,
    JapanKatakana = 15,
    Korean = 16,
    LatinAmerican = 17,
    NetherlandsDutch = 18,
    Norwegian = 19,
    PersianFarsi = 20,
    Poland = 21,
    Portuguese = 22,
    Russia = 23,
    Slovakia = 24,
    Spanish = 25,
    Swedish = 26,
    SwissFrench = 27,
    SwissGerman = 28,
    Switzerland = 29,
    Taiwan = 30,
    TurkishQ = 31,
    Uk = 32,
    Us = 33,
    Yugoslavia = 34,
    TurkishF = 35,
}

/// Application callbacks for the report paths that need it.
///
/// All defaults are benign: feature requests stall, output reports
/// vanish, protocol changes are acknowledged silently.
pub trait HidHandler {
    /// Host asked for a Feature report; fill `buf`, return the length
    fn feature_report_get(
        &self,
        report_id: u8,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        let _ = (report_id, buf);
        Err(UsbError::Fail)
    }

    /// Host sent a Feature report
    fn feature_report_set(
        &self,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), UsbError> {
        let _ = (report_id, data);
        Err(UsbError::Fail)
    }

    /// Host sent an Output report and no read was pending to take it
    fn output_report(&self, report_id: u8, data: &[u8]) {
        let _ = (report_id, data);
    }

    /// SET_PROTOCOL switched between boot and report protocol
    fn protocol_set(&self, protocol: u8) {
        let _ = protocol;
    }
}

/// A [`HidHandler`] that accepts every default
pub struct NullHandler;

impl HidHandler for NullHandler {}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
enum HidState {
    None,
    Init,
    Configured,
}

struct CtrlRead {
    pending: bool,
    result: Option<Result<usize, UsbError>>,
    buf: [u8; MAX_REPORT_BYTES],
    waker: Option<Waker>,
}

/// One HID function: an interface with an interrupt-IN endpoint,
/// optionally an interrupt-OUT endpoint, a parsed report descriptor,
/// and the idle-rate scheduler for its input reports.
///
/// The instance is registered into a device configuration with
/// [`configuration_add()`](HidClass::configuration_add) and serves
/// control traffic from the core's event pump; reads and writes are
/// plain futures the application awaits.
pub struct HidClass<'h> {
    subclass: u8,
    protocol: u8,
    country: CountryCode,
    report_descriptor: &'h [u8],
    physical_descriptor: &'h [u8],
    report: ReportStructure,
    /// Route reads through SET_REPORT on the control pipe instead of
    /// an interrupt-OUT endpoint
    ctrl_read_enabled: bool,
    handler: &'h dyn HidHandler,
    state: Cell<HidState>,
    interface_number: Cell<u8>,
    ep_in: Cell<Option<EndpointAddress>>,
    ep_out: Cell<Option<EndpointAddress>>,
    active_protocol: Cell<u8>,
    ctrl_read: RefCell<CtrlRead>,
}

impl<'h> HidClass<'h> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subclass: u8,
        protocol: u8,
        country: CountryCode,
        report_descriptor: &'h [u8],
        physical_descriptor: &'h [u8],
        ctrl_read_enabled: bool,
        handler: &'h dyn HidHandler,
    ) -> Result<Self, HidError> {
        let report = ReportStructure::parse(report_descriptor)?;
        Ok(Self {
            subclass,
            protocol,
            country,
            report_descriptor,
            physical_descriptor,
            report,
            ctrl_read_enabled,
            handler,
            state: Cell::new(HidState::None),
            interface_number: Cell::new(0),
            ep_in: Cell::new(None),
            ep_out: Cell::new(None),
            active_protocol: Cell::new(REPORT_PROTOCOL),
            ctrl_read: RefCell::new(CtrlRead {
                pending: false,
                result: None,
                buf: [0; MAX_REPORT_BYTES],
                waker: None,
            }),
        })
    }

    /// The parsed report layout, for applications that want to size
    /// their buffers from it
    pub fn report_structure(&self) -> &ReportStructure {
        &self.report
    }

    /// Add this function to a configuration: one interface, an
    /// interrupt-IN endpoint, and (unless the control-read fallback
    /// is on) an interrupt-OUT endpoint.
    pub fn configuration_add<'d, DC: DeviceController>(
        &'d self,
        builder: &mut DeviceBuilder<'d, DC>,
        config: ConfigHandle,
        interval_in_ms: u16,
        interval_out_ms: u16,
    ) -> Result<(), UsbError> {
        if !self.ctrl_read_enabled && interval_out_ms == 0 {
            return Err(UsbError::InvalidArg);
        }

        let interface = builder.interface_add(
            config,
            INTERFACE_CLASS,
            self.subclass,
            self.protocol,
            Some(self),
            None,
        )?;
        let alt0 = builder.alternate0(interface)?;

        let mps_in = self
            .report
            .max_size(ReportType::Input)
            .clamp(1, 64) as u16;
        let ep_in = builder.interrupt_add(
            config,
            alt0,
            Direction::In,
            mps_in,
            interval_in_ms,
        )?;
        self.ep_in.set(Some(ep_in));

        if !self.ctrl_read_enabled {
            let mps_out = self
                .report
                .max_size(ReportType::Output)
                .clamp(1, 64) as u16;
            let ep_out = builder.interrupt_add(
                config,
                alt0,
                Direction::Out,
                mps_out,
                interval_out_ms,
            )?;
            self.ep_out.set(Some(ep_out));
        }

        self.interface_number
            .set(builder.interface_number(interface)?);
        self.state.set(HidState::Init);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == HidState::Configured
    }

    pub fn interface_number(&self) -> u8 {
        self.interface_number.get()
    }

    /// Send an input report to the host, remembering it for idle
    /// resend. `timeout` is any delay future;
    /// `futures::future::pending()` waits forever.
    pub async fn write<DC: DeviceController>(
        &self,
        dev: &UsbDevice<'_, DC>,
        buf: &[u8],
        timeout: impl Future<Output = ()>,
    ) -> Result<usize, UsbError> {
        if !self.is_connected() {
            return Err(UsbError::InvalidClassState);
        }
        let ep = self.ep_in.get().ok_or(UsbError::EpInvalidAddr)?;
        self.report.store_input(buf);
        // Interrupt reports are self-delimiting; no trailing ZLP
        dev.endpoint_write(ep, buf, false, timeout).await
    }

    /// Receive an output report: from the interrupt-OUT endpoint, or
    /// through the SET_REPORT fallback when `ctrl_read_enabled`
    pub async fn read<DC: DeviceController>(
        &self,
        dev: &UsbDevice<'_, DC>,
        buf: &mut [u8],
        timeout: impl Future<Output = ()>,
    ) -> Result<usize, UsbError> {
        if !self.is_connected() {
            return Err(UsbError::InvalidClassState);
        }
        if self.ctrl_read_enabled {
            return self.control_read(buf, timeout).await;
        }
        let ep = self.ep_out.get().ok_or(UsbError::EpInvalidAddr)?;
        dev.endpoint_read(ep, buf, timeout).await
    }

    /// As [`write()`](Self::write) with no deadline: a handle to
    /// poll at the caller's leisure
    pub fn start_write<'a, DC: DeviceController>(
        &'a self,
        dev: &'a UsbDevice<'a, DC>,
        buf: &'a [u8],
    ) -> impl Future<Output = Result<usize, UsbError>> + 'a {
        self.write(dev, buf, futures::future::pending())
    }

    /// As [`read()`](Self::read) with no deadline
    pub fn start_read<'a, DC: DeviceController>(
        &'a self,
        dev: &'a UsbDevice<'a, DC>,
        buf: &'a mut [u8],
    ) -> impl Future<Output = Result<usize, UsbError>> + 'a {
        self.read(dev, buf, futures::future::pending())
    }

    /// The SET_REPORT read path. One read at a time: a second
    /// concurrent caller gets `EpIoPending` rather than racing the
    /// first for the next report.
    async fn control_read(
        &self,
        buf: &mut [u8],
        timeout: impl Future<Output = ()>,
    ) -> Result<usize, UsbError> {
        {
            let mut cr = self.ctrl_read.borrow_mut();
            if cr.pending || cr.result.is_some() {
                return Err(UsbError::EpIoPending);
            }
            cr.pending = true;
        }

        let wait = futures::future::poll_fn(|cx| {
            let mut cr = self.ctrl_read.borrow_mut();
            if let Some(result) = cr.result.take() {
                Poll::Ready(result)
            } else {
                cr.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        });
        let wait = core::pin::pin!(wait);
        let timeout = core::pin::pin!(timeout);
        match futures::future::select(wait, timeout).await {
            Either::Left((result, _)) => {
                let n = result?.min(buf.len());
                buf[..n].copy_from_slice(
                    &self.ctrl_read.borrow().buf[..n],
                );
                Ok(n)
            }
            Either::Right(((), _wait)) => {
                let mut cr = self.ctrl_read.borrow_mut();
                cr.pending = false;
                cr.result = None;
                cr.waker = None;
                Err(UsbError::OsTimeout)
            }
        }
    }

    fn deliver_output(&self, report_id: u8, payload: &[u8]) {
        if self.ctrl_read_enabled {
            let mut cr = self.ctrl_read.borrow_mut();
            if cr.pending {
                let n = payload.len().min(MAX_REPORT_BYTES);
                cr.buf[..n].copy_from_slice(&payload[..n]);
                cr.result = Some(Ok(n));
                cr.pending = false;
                if let Some(w) = cr.waker.take() {
                    w.wake();
                }
                return;
            }
        }
        self.handler.output_report(report_id, payload);
    }

    /// One 4 ms timer tick: re-send whichever input reports' idle
    /// countdowns expired
    pub async fn on_tick<DC: DeviceController>(
        &self,
        dev: &UsbDevice<'_, DC>,
    ) {
        let due = self.report.tick();
        for id in due {
            if !self.is_connected() {
                return;
            }
            let Some(ep) = self.ep_in.get() else { return };
            let Some(record) =
                self.report.record(ReportType::Input, id)
            else {
                continue;
            };
            let len = record.size as usize;
            if len == 0 {
                continue;
            }
            let mut copy = [0u8; MAX_REPORT_BYTES];
            copy[..len].copy_from_slice(&record.data.borrow()[..len]);
            if dev
                .endpoint_write(
                    ep,
                    &copy[..len],
                    false,
                    futures::future::pending(),
                )
                .await
                .is_err()
            {
                debug::println!("hid: idle resend failed");
            }
        }
    }

    /// The periodic service task: ticks at 4 ms forever, driven by a
    /// caller-supplied delay factory
    pub async fn idle_task<DC, F>(
        &self,
        dev: &UsbDevice<'_, DC>,
        mut delay_4ms: impl FnMut() -> F,
    ) -> !
    where
        DC: DeviceController,
        F: Future<Output = ()>,
    {
        loop {
            delay_4ms().await;
            self.on_tick(dev).await;
        }
    }

    fn get_report(
        &self,
        setup: &SetupPacket,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        let report_id = setup.wValue as u8;
        match (setup.wValue >> 8) as u8 {
            1 => {
                let record = self
                    .report
                    .record(ReportType::Input, report_id)
                    .ok_or(UsbError::InvalidArg)?;
                let n = (record.size as usize).min(buf.len());
                buf[..n]
                    .copy_from_slice(&record.data.borrow()[..n]);
                Ok(n)
            }
            3 => self.handler.feature_report_get(report_id, buf),
            _ => Err(UsbError::InvalidArg),
        }
    }

    fn set_report(
        &self,
        setup: &SetupPacket,
        payload: &[u8],
    ) -> Result<usize, UsbError> {
        let report_id = setup.wValue as u8;
        match (setup.wValue >> 8) as u8 {
            2 => {
                self.deliver_output(report_id, payload);
                Ok(0)
            }
            3 => {
                self.handler
                    .feature_report_set(report_id, payload)?;
                Ok(0)
            }
            _ => Err(UsbError::InvalidArg),
        }
    }
}

impl ClassDriver for HidClass<'_> {
    fn connect(&self, _configuration_value: u8) {
        self.state.set(HidState::Configured);
    }

    fn disconnect(&self) {
        self.state.set(HidState::Init);
        self.report.remove_all_idle();

        // A parked control-read can never complete now
        let mut cr = self.ctrl_read.borrow_mut();
        if cr.pending {
            cr.pending = false;
            cr.result = Some(Err(UsbError::OsAbort));
            if let Some(w) = cr.waker.take() {
                w.wake();
            }
        }
    }

    fn interface_descriptors(
        &self,
        writer: &mut DescriptorWriter,
        _interface_number: u8,
        _alt: u8,
        _speed: UsbSpeed,
    ) {
        let descriptors =
            1 + !self.physical_descriptor.is_empty() as u8;
        writer.write_u8(6 + 3 * descriptors);
        writer.write_u8(HID_DESCRIPTOR);
        writer.write_u16(0x0111); // bcdHID
        writer.write_u8(self.country as u8);
        writer.write_u8(descriptors);
        writer.write_u8(REPORT_DESCRIPTOR);
        writer.write_u16(self.report_descriptor.len() as u16);
        if !self.physical_descriptor.is_empty() {
            writer.write_u8(PHYSICAL_DESCRIPTOR);
            writer.write_u16(self.physical_descriptor.len() as u16);
        }
    }

    fn interface_descriptors_size(
        &self,
        _interface_number: u8,
        _alt: u8,
        _speed: UsbSpeed,
    ) -> usize {
        if self.physical_descriptor.is_empty() {
            9
        } else {
            12
        }
    }

    /// GET_DESCRIPTOR with an interface recipient: the host fetching
    /// the report (or physical) descriptor during enumeration
    fn interface_request(
        &self,
        setup: &SetupPacket,
        data: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        if setup.bRequest != GET_DESCRIPTOR {
            return Err(UsbError::Fail);
        }
        let DataPhase::In(buf) = data else {
            return Err(UsbError::Fail);
        };
        let source = match (setup.wValue >> 8) as u8 {
            REPORT_DESCRIPTOR => self.report_descriptor,
            PHYSICAL_DESCRIPTOR
                if !self.physical_descriptor.is_empty() =>
            {
                self.physical_descriptor
            }
            _ => return Err(UsbError::Fail),
        };
        let n = source.len().min(buf.len());
        buf[..n].copy_from_slice(&source[..n]);
        Ok(n)
    }

    fn class_request(
        &self,
        setup: &SetupPacket,
        data: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        if self.state.get() == HidState::None {
            return Err(UsbError::InvalidClassState);
        }
        match (setup.bRequest, data) {
            (REQ_GET_REPORT, DataPhase::In(buf)) => {
                self.get_report(setup, buf)
            }
            (REQ_SET_REPORT, DataPhase::Out(payload)) => {
                self.set_report(setup, payload)
            }
            (REQ_GET_IDLE, DataPhase::In(buf)) => {
                if buf.is_empty() {
                    return Err(UsbError::InvalidArg);
                }
                buf[0] = self
                    .report
                    .idle_rate(setup.wValue as u8)
                    .ok_or(UsbError::InvalidArg)?;
                Ok(1)
            }
            (REQ_SET_IDLE, _) => {
                let rate = (setup.wValue >> 8) as u8;
                let report_id = setup.wValue as u8;
                self.report
                    .set_idle(report_id, rate)
                    .map_err(|_| UsbError::InvalidArg)?;
                Ok(0)
            }
            (REQ_GET_PROTOCOL, DataPhase::In(buf)) => {
                if buf.is_empty() {
                    return Err(UsbError::InvalidArg);
                }
                buf[0] = self.active_protocol.get();
                Ok(1)
            }
            (REQ_SET_PROTOCOL, _) => {
                let protocol = setup.wValue as u8;
                self.active_protocol.set(protocol);
                self.handler.protocol_set(protocol);
                Ok(0)
            }
            _ => Err(UsbError::Fail),
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/hid.rs"]
mod tests;
