use core::cell::{Cell, RefCell};
use heapless::Vec;

/// Report-ID records the parser will track per report type
pub const MAX_REPORT_IDS: usize = 8;

/// Depth of the Push/Pop global-item stack. Part of the public
/// configuration: descriptors nesting deeper fail with
/// [`HidError::ReportPushPopAlloc`].
pub const PUSH_POP_DEPTH: usize = 4;

/// Largest single report, in octets, including the Report-ID prefix
pub const MAX_REPORT_BYTES: usize = 64;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum HidError {
    /// Malformed report descriptor: unknown item, unbalanced
    /// collection, pop from an empty stack, or a truncated payload
    ReportInvalid,
    /// More distinct report IDs than [`MAX_REPORT_IDS`], or a report
    /// bigger than [`MAX_REPORT_BYTES`]
    ReportAlloc,
    /// Push nesting beyond [`PUSH_POP_DEPTH`]
    ReportPushPopAlloc,
    /// Class instance pool exhausted
    InstanceAlloc,
    /// Operation illegal in the instance's current state
    InvalidClassState,
}

/// The three report directions of the HID class specification
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum ReportType {
    Input = 0,
    Output = 1,
    Feature = 2,
}

// Item prefixes with the size bits masked off (HID 1.11 section 6.2.2)
const ITEM_SIZE_MASK: u8 = 0x03;

const MAIN_INPUT: u8 = 0x80;
const MAIN_OUTPUT: u8 = 0x90;
const MAIN_FEATURE: u8 = 0xB0;
const MAIN_COLLECTION: u8 = 0xA0;
const MAIN_END_COLLECTION: u8 = 0xC0;

const GLOBAL_USAGE_PAGE: u8 = 0x04;
const GLOBAL_LOGICAL_MIN: u8 = 0x14;
const GLOBAL_LOGICAL_MAX: u8 = 0x24;
const GLOBAL_PHYSICAL_MIN: u8 = 0x34;
const GLOBAL_PHYSICAL_MAX: u8 = 0x44;
const GLOBAL_UNIT_EXPONENT: u8 = 0x54;
const GLOBAL_UNIT: u8 = 0x64;
const GLOBAL_REPORT_SIZE: u8 = 0x74;
const GLOBAL_REPORT_ID: u8 = 0x84;
const GLOBAL_REPORT_COUNT: u8 = 0x94;
const GLOBAL_PUSH: u8 = 0xA4;
const GLOBAL_POP: u8 = 0xB4;

const LOCAL_USAGE: u8 = 0x08;
const LOCAL_USAGE_MIN: u8 = 0x18;
const LOCAL_USAGE_MAX: u8 = 0x28;
const LOCAL_DESIGNATOR_INDEX: u8 = 0x38;
const LOCAL_DESIGNATOR_MIN: u8 = 0x48;
const LOCAL_DESIGNATOR_MAX: u8 = 0x58;
const LOCAL_STRING_INDEX: u8 = 0x78;
const LOCAL_STRING_MIN: u8 = 0x88;
const LOCAL_STRING_MAX: u8 = 0x98;
const LOCAL_DELIMITER: u8 = 0xA8;

/// SET_IDLE rate of zero: never resend on the scheduler's account
pub const IDLE_INFINITE: u8 = 0;
/// SET_IDLE/GET_IDLE report ID zero addresses every input report
pub const IDLE_ALL_REPORTS: u8 = 0;

/// The globals that Push/Pop save and restore
#[derive(Copy, Clone, Default)]
struct ItemGlobals {
    report_id: u8,
    size: u16,
    count: u16,
}

pub(crate) struct ReportRecord {
    pub id: u8,
    /// Total octets on the wire, Report-ID prefix included
    pub size: u16,
    bits: u32,
    /// Input reports keep their last contents for idle-rate resend
    pub data: RefCell<[u8; MAX_REPORT_BYTES]>,
    /// 4 ms units; `IDLE_INFINITE` when off the timer list
    pub idle_rate: Cell<u8>,
    idle_count: Cell<u8>,
    update_pending: Cell<bool>,
    /// Index-linked timer list through the Input record arena
    timer_next: Cell<Option<u8>>,
}

impl ReportRecord {
    fn new(id: u8) -> Self {
        Self {
            id,
            size: 0,
            bits: 0,
            data: RefCell::new([0; MAX_REPORT_BYTES]),
            idle_rate: Cell::new(IDLE_INFINITE),
            idle_count: Cell::new(0),
            update_pending: Cell::new(false),
            timer_next: Cell::new(None),
        }
    }
}

/// Everything the class needs to know about a report descriptor,
/// produced once by [`ReportStructure::parse()`].
///
/// Parsing the same bytes always yields the same per-ID sizes and
/// per-type maxima; nothing in here depends on runtime state except
/// the idle-timer cells.
pub struct ReportStructure {
    has_report_ids: bool,
    max_size: [u16; 3],
    reports: [Vec<ReportRecord, MAX_REPORT_IDS>; 3],
    /// Head of the timer list: an index into the Input record arena
    timer_head: Cell<Option<u8>>,
}

impl ReportStructure {
    /// Walk the item stream and accumulate per-(type, ID) sizes.
    ///
    /// Items are one prefix byte (4-bit tag, 2-bit type, 2-bit size
    /// code) and 0/1/2/4 bytes of little-endian payload. Main
    /// Input/Output/Feature items commit the current Report Size x
    /// Report Count product to the current Report ID's accumulator;
    /// Push/Pop save and restore the globals. After the walk, bit
    /// counts round up to octets and, if any Report ID appeared at
    /// all, every non-empty report grows one prefix octet.
    pub fn parse(descriptor: &[u8]) -> Result<Self, HidError> {
        let mut this = Self {
            has_report_ids: false,
            max_size: [0; 3],
            reports: [Vec::new(), Vec::new(), Vec::new()],
            timer_head: Cell::new(None),
        };

        let mut current = ItemGlobals::default();
        let mut stack: Vec<ItemGlobals, PUSH_POP_DEPTH> = Vec::new();
        let mut nesting: u32 = 0;

        let mut bytes = descriptor;
        while let Some((&prefix, rest)) = bytes.split_first() {
            bytes = rest;

            let payload_len = match prefix & ITEM_SIZE_MASK {
                0 => 0,
                1 => 1,
                2 => 2,
                _ => 4,
            };
            if bytes.len() < payload_len {
                return Err(HidError::ReportInvalid);
            }
            let mut data: u32 = 0;
            for (i, &b) in bytes[..payload_len].iter().enumerate() {
                data |= (b as u32) << (8 * i);
            }
            bytes = &bytes[payload_len..];

            match prefix & !ITEM_SIZE_MASK {
                MAIN_INPUT => {
                    this.accumulate(ReportType::Input, &current)?
                }
                MAIN_OUTPUT => {
                    this.accumulate(ReportType::Output, &current)?
                }
                MAIN_FEATURE => {
                    this.accumulate(ReportType::Feature, &current)?
                }
                MAIN_COLLECTION => nesting += 1,
                MAIN_END_COLLECTION => {
                    nesting = nesting
                        .checked_sub(1)
                        .ok_or(HidError::ReportInvalid)?;
                }
                GLOBAL_REPORT_SIZE => current.size = data as u16,
                GLOBAL_REPORT_COUNT => current.count = data as u16,
                GLOBAL_REPORT_ID => {
                    current.report_id = data as u8;
                    this.has_report_ids = true;
                }
                GLOBAL_PUSH => {
                    stack
                        .push(current)
                        .map_err(|_| HidError::ReportPushPopAlloc)?;
                }
                GLOBAL_POP => {
                    current = stack
                        .pop()
                        .ok_or(HidError::ReportInvalid)?;
                }
                GLOBAL_USAGE_PAGE | GLOBAL_LOGICAL_MIN
                | GLOBAL_LOGICAL_MAX | GLOBAL_PHYSICAL_MIN
                | GLOBAL_PHYSICAL_MAX | GLOBAL_UNIT_EXPONENT
                | GLOBAL_UNIT | LOCAL_USAGE | LOCAL_USAGE_MIN
                | LOCAL_USAGE_MAX | LOCAL_DESIGNATOR_INDEX
                | LOCAL_DESIGNATOR_MIN | LOCAL_DESIGNATOR_MAX
                | LOCAL_STRING_INDEX | LOCAL_STRING_MIN
                | LOCAL_STRING_MAX | LOCAL_DELIMITER => {}
                _ => return Err(HidError::ReportInvalid),
            }
        }

        if nesting > 0 {
            return Err(HidError::ReportInvalid);
        }

        this.finalize()?;
        Ok(this)
    }

    fn accumulate(
        &mut self,
        report_type: ReportType,
        globals: &ItemGlobals,
    ) -> Result<(), HidError> {
        let reports = &mut self.reports[report_type as usize];
        let ix = match reports
            .iter()
            .position(|r| r.id == globals.report_id)
        {
            Some(ix) => ix,
            None => {
                reports
                    .push(ReportRecord::new(globals.report_id))
                    .map_err(|_| HidError::ReportAlloc)?;
                reports.len() - 1
            }
        };
        reports[ix].bits +=
            globals.count as u32 * globals.size as u32;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), HidError> {
        let has_ids = self.has_report_ids;
        for (type_ix, reports) in self.reports.iter_mut().enumerate()
        {
            let mut max = 0u16;
            for record in reports.iter_mut() {
                let mut octets = ((record.bits + 7) / 8) as u16;
                if octets > 0 && has_ids {
                    octets += 1;
                }
                if octets as usize > MAX_REPORT_BYTES {
                    return Err(HidError::ReportAlloc);
                }
                record.size = octets;
                max = max.max(octets);

                if type_ix == ReportType::Input as usize
                    && octets > 0
                    && has_ids
                {
                    // The wire always leads with the report ID
                    record.data.borrow_mut()[0] = record.id;
                }
            }
            self.max_size[type_ix] = max;
        }
        Ok(())
    }

    pub fn has_report_ids(&self) -> bool {
        self.has_report_ids
    }

    /// Largest report of this type, in octets (prefix included)
    pub fn max_size(&self, report_type: ReportType) -> usize {
        self.max_size[report_type as usize] as usize
    }

    /// Size of one particular report, or None if the ID is unknown
    pub fn report_size(
        &self,
        report_type: ReportType,
        id: u8,
    ) -> Option<usize> {
        self.reports[report_type as usize]
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.size as usize)
    }

    pub(crate) fn record(
        &self,
        report_type: ReportType,
        id: u8,
    ) -> Option<&ReportRecord> {
        self.reports[report_type as usize]
            .iter()
            .find(|r| r.id == id)
    }

    fn input_index(&self, id: u8) -> Option<u8> {
        self.reports[ReportType::Input as usize]
            .iter()
            .position(|r| r.id == id)
            .map(|ix| ix as u8)
    }

    /// Current idle rate of an input report, in 4 ms units
    pub fn idle_rate(&self, id: u8) -> Option<u8> {
        self.record(ReportType::Input, id)
            .map(|r| r.idle_rate.get())
    }

    /// Apply SET_IDLE. ID zero addresses every input report. A
    /// finite rate links the record onto the timer list (once); rate
    /// zero takes effect by letting the next tick unlink it.
    pub fn set_idle(&self, id: u8, rate: u8) -> Result<(), HidError> {
        let mut hit = false;
        for (ix, record) in self.reports
            [ReportType::Input as usize]
            .iter()
            .enumerate()
        {
            if record.id != id && id != IDLE_ALL_REPORTS {
                continue;
            }
            hit = true;
            if rate != IDLE_INFINITE {
                // Link once; a record can still be mid-list with an
                // infinite rate until the next tick unlinks it
                if !self.on_timer_list(record) {
                    record.timer_next.set(self.timer_head.get());
                    self.timer_head.set(Some(ix as u8));
                }
                record.idle_rate.set(rate);
                record.update_pending.set(true);
            } else {
                record.idle_rate.set(IDLE_INFINITE);
            }
            if id != IDLE_ALL_REPORTS {
                break;
            }
        }
        if hit {
            Ok(())
        } else {
            Err(HidError::ReportInvalid)
        }
    }

    /// Drop every input report from the periodic service list, as on
    /// disconnect
    pub fn remove_all_idle(&self) {
        for record in
            self.reports[ReportType::Input as usize].iter()
        {
            if self.on_timer_list(record) {
                record.idle_rate.set(IDLE_INFINITE);
            }
        }
    }

    fn on_timer_list(&self, record: &ReportRecord) -> bool {
        let mut cursor = self.timer_head.get();
        while let Some(ix) = cursor {
            let r = &self.reports[ReportType::Input as usize]
                [ix as usize];
            if core::ptr::eq(r, record) {
                return true;
            }
            cursor = r.timer_next.get();
        }
        false
    }

    /// One 4 ms tick: walk the timer list, unlink records that went
    /// infinite, reload freshly-written ones, count the rest down.
    /// Returns the IDs of input reports due for re-send this tick.
    pub fn tick(&self) -> Vec<u8, MAX_REPORT_IDS> {
        let mut due = Vec::new();
        let inputs = &self.reports[ReportType::Input as usize];

        let mut prev: Option<u8> = None;
        let mut cursor = self.timer_head.get();
        while let Some(ix) = cursor {
            let record = &inputs[ix as usize];
            let next = record.timer_next.get();

            if record.idle_rate.get() == IDLE_INFINITE {
                // Unlink; SET_IDLE(0) only marks the rate
                record.idle_count.set(0);
                record.update_pending.set(false);
                match prev {
                    None => self.timer_head.set(next),
                    Some(p) => {
                        inputs[p as usize].timer_next.set(next)
                    }
                }
                record.timer_next.set(None);
                cursor = next;
                continue;
            }

            if record.update_pending.get() {
                record.update_pending.set(false);
                if record.idle_count.get() > 1 {
                    record.idle_count.set(record.idle_rate.get());
                }
            }

            if record.idle_count.get() > 1 {
                record.idle_count.set(record.idle_count.get() - 1);
            } else {
                record.idle_count.set(record.idle_rate.get());
                due.push(record.id).ok();
            }

            prev = Some(ix);
            cursor = next;
        }
        due
    }

    /// Remember the report most recently written on the interrupt-IN
    /// pipe, so idle expiry can repeat it
    pub(crate) fn store_input(&self, buf: &[u8]) {
        let id = if self.has_report_ids && !buf.is_empty() {
            buf[0]
        } else {
            0
        };
        if let Some(ix) = self.input_index(id) {
            let record = &self.reports[ReportType::Input as usize]
                [ix as usize];
            if buf.len() <= MAX_REPORT_BYTES {
                record.data.borrow_mut()[..buf.len()]
                    .copy_from_slice(buf);
                record.update_pending.set(true);
            }
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/report.rs"]
mod tests;
