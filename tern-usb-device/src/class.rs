use crate::descriptors::DescriptorWriter;
use crate::device_controller::DataPhase;
use crate::types::{EndpointAddress, UsbError, UsbSpeed};
use crate::wire::SetupPacket;

/// The upcall interface a functional class implements.
///
/// One instance per interface (a class may serve several interfaces by
/// being registered against each). Methods take `&self` and run on the
/// core task, so implementations keep their mutable state in cells; an
/// upcall must not await endpoint I/O on the same device, or the event
/// pump it is running on can never deliver the completion.
///
/// Request handlers receive the decoded SETUP plus its data phase:
/// `DataPhase::In` hands over a buffer to fill (return the length
/// used), `DataPhase::Out` hands over the received payload. Returning
/// an error stalls the control pipe, which is the correct response to
/// any request the class does not recognise.
pub trait ClassDriver {
    /// An alt-0 interface of the active configuration became live
    fn connect(&self, configuration_value: u8) {
        let _ = configuration_value;
    }

    /// The interface went dead: reconfiguration, reset, or disconnect
    fn disconnect(&self) {}

    /// SET_INTERFACE selected a new alternate setting
    fn alt_setting_update(&self, interface_number: u8, alt: u8) {
        let _ = (interface_number, alt);
    }

    /// An endpoint this interface owns was halted or un-halted
    fn ep_state_update(&self, ep: EndpointAddress, halted: bool) {
        let _ = (ep, halted);
    }

    /// Append class-functional descriptors that follow this
    /// interface's descriptor
    fn interface_descriptors(
        &self,
        writer: &mut DescriptorWriter,
        interface_number: u8,
        alt: u8,
        speed: UsbSpeed,
    ) {
        let _ = (writer, interface_number, alt, speed);
    }

    /// Byte count [`interface_descriptors`](Self::interface_descriptors)
    /// will emit, for sizing the response
    fn interface_descriptors_size(
        &self,
        interface_number: u8,
        alt: u8,
        speed: UsbSpeed,
    ) -> usize {
        let _ = (interface_number, alt, speed);
        0
    }

    /// Append class-functional descriptors that follow one of this
    /// interface's endpoint descriptors
    fn endpoint_descriptors(
        &self,
        writer: &mut DescriptorWriter,
        ep: EndpointAddress,
        speed: UsbSpeed,
    ) {
        let _ = (writer, ep, speed);
    }

    /// Byte count [`endpoint_descriptors`](Self::endpoint_descriptors)
    /// will emit
    fn endpoint_descriptors_size(
        &self,
        ep: EndpointAddress,
        speed: UsbSpeed,
    ) -> usize {
        let _ = (ep, speed);
        0
    }

    /// A standard request whose recipient is this interface (for
    /// instance HID GET_DESCRIPTOR for the report descriptor)
    fn interface_request(
        &self,
        setup: &SetupPacket,
        data: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        let _ = (setup, data);
        Err(UsbError::Fail)
    }

    /// A class-specific request targeting this interface or one of its
    /// endpoints
    fn class_request(
        &self,
        setup: &SetupPacket,
        data: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        let _ = (setup, data);
        Err(UsbError::Fail)
    }

    /// A vendor-specific request targeting this interface
    fn vendor_request(
        &self,
        setup: &SetupPacket,
        data: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        let _ = (setup, data);
        Err(UsbError::Fail)
    }

    /// Microsoft OS 1.0 compatible-ID for this interface:
    /// `(compatible_id, sub_compatible_id)`, both blank-padded ASCII
    #[cfg(feature = "msos")]
    fn microsoft_compatible_id(&self) -> Option<([u8; 8], [u8; 8])> {
        None
    }

    /// Append Microsoft OS 1.0 extended-property custom sections;
    /// returns how many sections were written
    #[cfg(feature = "msos")]
    fn microsoft_ext_properties(
        &self,
        writer: &mut DescriptorWriter,
    ) -> u16 {
        let _ = writer;
        0
    }
}
