use crate::config::{
    MAX_ALT_SETTINGS, MAX_CONFIGURATIONS, MAX_ENDPOINT_DESCRIPTORS,
    MAX_INTERFACES, MAX_INTERFACE_GROUPS, MAX_LOGICAL_ENDPOINTS,
    MAX_STRINGS,
};
use crate::types::{
    Direction, EndpointAddress, EndpointType, UsbError, UsbSpeed,
};
use crate::wire;
use heapless::Vec;

/// Handle to a registered configuration
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ConfigHandle(pub(crate) u8);

impl ConfigHandle {
    /// The bConfigurationValue the host will use to select this
    /// configuration
    pub fn value(self) -> u8 {
        self.0 + 1
    }
}

/// Handle to a registered interface
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct InterfaceHandle(pub(crate) u8);

/// Handle to a registered alternate setting
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct AltHandle(pub(crate) u8);

/// A 1-based string-descriptor index
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct StringHandle(pub(crate) u8);

impl StringHandle {
    pub fn index(self) -> u8 {
        self.0
    }
}

pub(crate) struct Configuration {
    pub attributes: u8,
    pub max_power_2ma: u8,
    pub name: u8,
    pub interfaces: Vec<u8, MAX_INTERFACES>,
    pub groups: Vec<u8, MAX_INTERFACE_GROUPS>,
}

pub(crate) struct Interface {
    pub number: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub name: u8,
    /// Index into the stack's class-driver table, or None for a bare
    /// interface
    pub class_driver: Option<u8>,
    pub alternates: Vec<u8, MAX_ALT_SETTINGS>,
}

pub(crate) struct AlternateSetting {
    pub number: u8,
    pub name: u8,
    pub endpoints: Vec<u8, MAX_ENDPOINT_DESCRIPTORS>,
}

pub(crate) struct EndpointInfo {
    pub address: EndpointAddress,
    pub ep_type: EndpointType,
    /// Sync-type and usage-type bits of bmAttributes (isochronous only)
    pub attribute_bits: u8,
    pub max_packet: u16,
    /// User-facing polling interval in milliseconds; zero for bulk
    pub interval_ms: u16,
    /// Additional transactions per microframe (high-speed only, 0..=2)
    pub transactions: u8,
    /// Synchronization-pair endpoint address (isochronous only)
    pub sync_address: u8,
}

pub(crate) struct InterfaceGroup {
    pub number: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub first_interface: u8,
    pub interface_count: u8,
    pub name: u8,
}

/// Process-wide table of descriptor strings.
///
/// Interning the same string twice hands back the same 1-based index.
/// Index 0 is reserved on the wire for the language-ID array.
#[derive(Default)]
pub struct StringTable {
    strings: Vec<&'static str, MAX_STRINGS>,
    /// A single language ID per device
    pub language_id: u16,
}

pub const LANGUAGE_ENGLISH_US: u16 = 0x0409;

impl StringTable {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            language_id: LANGUAGE_ENGLISH_US,
        }
    }

    pub fn add(&mut self, s: &'static str) -> Result<StringHandle, UsbError> {
        if let Some(ix) = self.strings.iter().position(|x| *x == s) {
            return Ok(StringHandle(ix as u8 + 1));
        }
        self.strings.push(s).map_err(|_| UsbError::Alloc)?;
        Ok(StringHandle(self.strings.len() as u8))
    }

    pub fn get(&self, index: u8) -> Option<&'static str> {
        if index == 0 {
            return None;
        }
        self.strings.get(index as usize - 1).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// The registered device tree: configurations, interfaces, alternate
/// settings, endpoint descriptors, interface groups, and the string
/// table.
///
/// Arena-allocated: handles are indices into flat `heapless::Vec`
/// arenas, parents hold child index lists, and nothing points back
/// up. Mutable only until [`DeviceBuilder::start()`] consumes it;
/// read-only forever after.
///
/// [`DeviceBuilder::start()`]: crate::device::DeviceBuilder::start
pub struct Topology {
    speed: UsbSpeed,
    pub(crate) configurations: Vec<Configuration, MAX_CONFIGURATIONS>,
    pub(crate) interfaces: Vec<Interface, MAX_INTERFACES>,
    pub(crate) alternates: Vec<AlternateSetting, MAX_ALT_SETTINGS>,
    pub(crate) endpoints: Vec<EndpointInfo, MAX_ENDPOINT_DESCRIPTORS>,
    pub(crate) groups: Vec<InterfaceGroup, MAX_INTERFACE_GROUPS>,
    pub strings: StringTable,
}

impl Topology {
    pub fn new(speed: UsbSpeed) -> Self {
        Self {
            speed,
            configurations: Vec::new(),
            interfaces: Vec::new(),
            alternates: Vec::new(),
            endpoints: Vec::new(),
            groups: Vec::new(),
            strings: StringTable::new(),
        }
    }

    pub fn speed(&self) -> UsbSpeed {
        self.speed
    }

    pub fn configuration_add(
        &mut self,
        self_powered: bool,
        remote_wakeup: bool,
        max_power_ma: u16,
        name: Option<StringHandle>,
    ) -> Result<ConfigHandle, UsbError> {
        if max_power_ma > 510 {
            return Err(UsbError::CfgInvalidMaxPwr);
        }
        let mut attributes = wire::CONFIG_ATTR_MUST_BE_SET;
        if self_powered {
            attributes |= wire::CONFIG_ATTR_SELF_POWERED;
        }
        if remote_wakeup {
            attributes |= wire::CONFIG_ATTR_REMOTE_WAKEUP;
        }
        self.configurations
            .push(Configuration {
                attributes,
                max_power_2ma: (max_power_ma / 2) as u8,
                name: name.map_or(0, |n| n.0),
                interfaces: Vec::new(),
                groups: Vec::new(),
            })
            .map_err(|_| UsbError::Alloc)?;
        Ok(ConfigHandle(self.configurations.len() as u8 - 1))
    }

    pub fn interface_add(
        &mut self,
        config: ConfigHandle,
        class: u8,
        subclass: u8,
        protocol: u8,
        class_driver: Option<u8>,
        name: Option<StringHandle>,
    ) -> Result<InterfaceHandle, UsbError> {
        let cfg = self
            .configurations
            .get_mut(config.0 as usize)
            .ok_or(UsbError::CfgInvalidNbr)?;
        let number = cfg.interfaces.len() as u8;
        let if_ix = self.interfaces.len() as u8;
        cfg.interfaces.push(if_ix).map_err(|_| UsbError::Alloc)?;

        // Alternate setting zero always exists
        let alt_ix = self.alternates.len() as u8;
        self.alternates
            .push(AlternateSetting {
                number: 0,
                name: 0,
                endpoints: Vec::new(),
            })
            .map_err(|_| UsbError::Alloc)?;

        let mut alternates = Vec::new();
        alternates.push(alt_ix).map_err(|_| UsbError::Alloc)?;
        self.interfaces
            .push(Interface {
                number,
                class,
                subclass,
                protocol,
                name: name.map_or(0, |n| n.0),
                class_driver,
                alternates,
            })
            .map_err(|_| UsbError::Alloc)?;
        Ok(InterfaceHandle(if_ix))
    }

    pub fn alternate_add(
        &mut self,
        interface: InterfaceHandle,
        name: Option<StringHandle>,
    ) -> Result<AltHandle, UsbError> {
        let intf = self
            .interfaces
            .get_mut(interface.0 as usize)
            .ok_or(UsbError::IfInvalidNbr)?;
        let number = intf.alternates.len() as u8;
        let alt_ix = self.alternates.len() as u8;
        intf.alternates.push(alt_ix).map_err(|_| UsbError::Alloc)?;
        self.alternates
            .push(AlternateSetting {
                number,
                name: name.map_or(0, |n| n.0),
                endpoints: Vec::new(),
            })
            .map_err(|_| UsbError::Alloc)?;
        Ok(AltHandle(alt_ix))
    }

    pub fn interface_group_add(
        &mut self,
        config: ConfigHandle,
        number: u8,
        class: u8,
        subclass: u8,
        protocol: u8,
        first_interface: InterfaceHandle,
        interface_count: u8,
        name: Option<StringHandle>,
    ) -> Result<(), UsbError> {
        let cfg = self
            .configurations
            .get(config.0 as usize)
            .ok_or(UsbError::CfgInvalidNbr)?;
        if self.groups.iter().any(|g| g.number == number) {
            return Err(UsbError::IfGrpNbrInUse);
        }
        let first = self
            .interfaces
            .get(first_interface.0 as usize)
            .ok_or(UsbError::IfInvalidNbr)?
            .number;
        if (first + interface_count) as usize > cfg.interfaces.len() {
            return Err(UsbError::IfInvalidNbr);
        }
        let group_ix = self.groups.len() as u8;
        self.groups
            .push(InterfaceGroup {
                number,
                class,
                subclass,
                protocol,
                first_interface: first,
                interface_count,
                name: name.map_or(0, |n| n.0),
            })
            .map_err(|_| UsbError::Alloc)?;
        self.configurations[config.0 as usize]
            .groups
            .push(group_ix)
            .map_err(|_| UsbError::Alloc)?;
        Ok(())
    }

    /// First logical endpoint number free in `config` for `direction`
    fn free_endpoint_number(
        &self,
        config: ConfigHandle,
        direction: Direction,
    ) -> Result<u8, UsbError> {
        let cfg = &self.configurations[config.0 as usize];
        'candidate: for number in 1..MAX_LOGICAL_ENDPOINTS as u8 {
            let addr = EndpointAddress::new(number, direction);
            for &if_ix in &cfg.interfaces {
                for &alt_ix in &self.interfaces[if_ix as usize].alternates {
                    for &ep_ix in
                        &self.alternates[alt_ix as usize].endpoints
                    {
                        if self.endpoints[ep_ix as usize].address == addr {
                            continue 'candidate;
                        }
                    }
                }
            }
            return Ok(number);
        }
        Err(UsbError::EpNoneAvail)
    }

    #[allow(clippy::too_many_arguments)]
    fn endpoint_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        ep_type: EndpointType,
        attribute_bits: u8,
        max_packet: u16,
        interval_ms: u16,
        transactions: u8,
        sync_address: u8,
    ) -> Result<EndpointAddress, UsbError> {
        self.configurations
            .get(config.0 as usize)
            .ok_or(UsbError::CfgInvalidNbr)?;
        self.alternates
            .get(alt.0 as usize)
            .ok_or(UsbError::IfAltInvalidNbr)?;
        wire::max_packet_legal(ep_type, self.speed, max_packet)?;
        if transactions > 2 {
            return Err(UsbError::InvalidArg);
        }
        if transactions > 0
            && (self.speed != UsbSpeed::High480
                || ep_type == EndpointType::Bulk
                || ep_type == EndpointType::Control)
        {
            return Err(UsbError::InvalidArg);
        }

        // High-speed interrupt and isochronous intervals become the
        // exponent in 2^(bInterval-1) microframes; that only works for
        // power-of-two millisecond periods. Full-speed isochronous
        // likewise.
        let needs_power_of_two = match ep_type {
            EndpointType::Isochronous => true,
            EndpointType::Interrupt => self.speed == UsbSpeed::High480,
            _ => false,
        };
        match ep_type {
            EndpointType::Interrupt | EndpointType::Isochronous => {
                if interval_ms == 0
                    || (needs_power_of_two
                        && !interval_ms.is_power_of_two())
                {
                    return Err(UsbError::InvalidArg);
                }
            }
            _ => {}
        }

        let number = self.free_endpoint_number(config, direction)?;
        let address = EndpointAddress::new(number, direction);
        let ep_ix = self.endpoints.len() as u8;
        self.endpoints
            .push(EndpointInfo {
                address,
                ep_type,
                attribute_bits,
                max_packet,
                interval_ms,
                transactions,
                sync_address,
            })
            .map_err(|_| UsbError::Alloc)?;
        self.alternates[alt.0 as usize]
            .endpoints
            .push(ep_ix)
            .map_err(|_| UsbError::Alloc)?;
        Ok(address)
    }

    pub fn bulk_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        max_packet: u16,
    ) -> Result<EndpointAddress, UsbError> {
        self.endpoint_add(
            config,
            alt,
            direction,
            EndpointType::Bulk,
            0,
            max_packet,
            0,
            0,
            0,
        )
    }

    pub fn interrupt_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        max_packet: u16,
        interval_ms: u16,
        transactions: u8,
    ) -> Result<EndpointAddress, UsbError> {
        self.endpoint_add(
            config,
            alt,
            direction,
            EndpointType::Interrupt,
            0,
            max_packet,
            interval_ms,
            transactions,
            0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn isochronous_add(
        &mut self,
        config: ConfigHandle,
        alt: AltHandle,
        direction: Direction,
        max_packet: u16,
        interval_ms: u16,
        transactions: u8,
        sync_bits: u8,
        sync_address: u8,
    ) -> Result<EndpointAddress, UsbError> {
        self.endpoint_add(
            config,
            alt,
            direction,
            EndpointType::Isochronous,
            sync_bits,
            max_packet,
            interval_ms,
            transactions,
            sync_address,
        )
    }

    pub fn string_add(
        &mut self,
        s: &'static str,
    ) -> Result<StringHandle, UsbError> {
        self.strings.add(s)
    }

    // Read-side lookups, used by the descriptor builder and the
    // standard-request handler once the registry is frozen.

    pub(crate) fn configuration_by_value(
        &self,
        value: u8,
    ) -> Option<(ConfigHandle, &Configuration)> {
        if value == 0 {
            return None;
        }
        let ix = value as usize - 1;
        self.configurations
            .get(ix)
            .map(|c| (ConfigHandle(ix as u8), c))
    }

    pub(crate) fn interface_in_config(
        &self,
        config: ConfigHandle,
        number: u8,
    ) -> Option<&Interface> {
        let cfg = self.configurations.get(config.0 as usize)?;
        cfg.interfaces
            .iter()
            .map(|&ix| &self.interfaces[ix as usize])
            .find(|i| i.number == number)
    }

    pub(crate) fn alternate_of(
        &self,
        interface: &Interface,
        alt: u8,
    ) -> Option<&AlternateSetting> {
        interface
            .alternates
            .get(alt as usize)
            .map(|&ix| &self.alternates[ix as usize])
    }

    pub(crate) fn endpoints_of<'a>(
        &'a self,
        alt: &'a AlternateSetting,
    ) -> impl Iterator<Item = &'a EndpointInfo> {
        alt.endpoints
            .iter()
            .map(move |&ix| &self.endpoints[ix as usize])
    }

    /// Find the interface owning endpoint `addr` in the active alt
    /// settings of configuration `config`
    pub(crate) fn interface_owning_endpoint(
        &self,
        config: ConfigHandle,
        alts: &[u8],
        addr: EndpointAddress,
    ) -> Option<&Interface> {
        let cfg = self.configurations.get(config.0 as usize)?;
        for &if_ix in &cfg.interfaces {
            let intf = &self.interfaces[if_ix as usize];
            let alt_nbr = alts.get(intf.number as usize).copied()?;
            let alt = self.alternate_of(intf, alt_nbr)?;
            if self.endpoints_of(alt).any(|e| e.address == addr) {
                return Some(intf);
            }
        }
        None
    }

    pub(crate) fn group_of_first_interface(
        &self,
        cfg: &Configuration,
        if_number: u8,
    ) -> Option<&InterfaceGroup> {
        cfg.groups
            .iter()
            .map(|&ix| &self.groups[ix as usize])
            .find(|g| g.first_interface == if_number)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/topology.rs"]
mod tests;
