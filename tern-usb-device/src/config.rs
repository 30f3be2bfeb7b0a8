//! Compile-time sizing of the stack's fixed pools.
//!
//! Everything here is allocated once, either statically or at
//! registration time; the running stack never allocates. A build that
//! trips the event-queue overflow panic is mis-sized and should raise
//! [`EVENT_QUEUE_DEPTH`] or lower the endpoint count.

/// Configurations per device
pub const MAX_CONFIGURATIONS: usize = 2;

/// Interfaces per device, summed over all configurations
pub const MAX_INTERFACES: usize = 8;

/// Alternate settings, summed over all interfaces
pub const MAX_ALT_SETTINGS: usize = 16;

/// Endpoint descriptors, summed over all alternate settings
pub const MAX_ENDPOINT_DESCRIPTORS: usize = 16;

/// Interface association groups per device
pub const MAX_INTERFACE_GROUPS: usize = 4;

/// Distinct strings in the string table (index 0 is the language array)
pub const MAX_STRINGS: usize = 16;

/// Logical endpoint numbers the engine will manage (0..16 per USB 2.0)
pub const MAX_LOGICAL_ENDPOINTS: usize = 16;

/// Physical endpoint slots: IN and OUT are realised independently
pub const MAX_PHYSICAL_ENDPOINTS: usize = MAX_LOGICAL_ENDPOINTS * 2;

/// URBs allowed beyond one-per-open-endpoint, for controllers with
/// hardware queuing. Zero on controllers without.
pub const EXTRA_URBS: usize = 0;

/// Bus-event slots reserved in the event queue over and above one
/// completion slot per physical endpoint
pub const BUS_EVENT_SLOTS: usize = 8;

/// Event-queue capacity; overflow at runtime is fatal
pub const EVENT_QUEUE_DEPTH: usize =
    BUS_EVENT_SLOTS + MAX_PHYSICAL_ENDPOINTS + EXTRA_URBS;

/// Control-pipe scratch buffer: must hold the largest single descriptor
/// response (the full configuration tree or the longest string)
pub const CONTROL_SCRATCH_BYTES: usize = 512;
