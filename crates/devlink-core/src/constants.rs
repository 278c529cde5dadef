//! Constants shared by the transport and job crates.
//!
//! # Device id layout
//!
//! Every device id is built by the provider that discovered the device:
//!
//! ```text
//! <TAG>|<PAYLOAD>
//! ```
//!
//! Where:
//! - `TAG` - the provider's prefix (`usb`, `httpdebug`, `ble`, `mock`, ...)
//! - `|` - [`TAG_SEPARATOR`]
//! - `PAYLOAD` - the native descriptor, raw text or JSON, enough to reopen
//!   the device without any lookup table
//!
//! ```
//! use devlink_core::constants::*;
//!
//! let id = format!("{HTTP_DEBUG_TAG}{TAG_SEPARATOR}http://localhost:8435");
//! assert!(id.starts_with("httpdebug|"));
//! ```

// ============================================================================
// Device id layout
// ============================================================================

/// Separator between the provider tag and the native payload of a device id.
pub const TAG_SEPARATOR: char = '|';

/// Tag of the USB HID provider.
pub const USB_TAG: &str = "usb";

/// Tag of the debug HTTP proxy provider.
pub const HTTP_DEBUG_TAG: &str = "httpdebug";

/// Tag reserved for a Bluetooth LE provider.
pub const BLE_TAG: &str = "ble";

/// Default tag of the in-process mock provider.
pub const MOCK_TAG: &str = "mock";

// ============================================================================
// Job engine
// ============================================================================

/// Default trailing debounce window for step-entered notifications.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Capacity of the per-run completion broadcast channel.
pub const COMPLETION_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Transports
// ============================================================================

/// Default timeout for probing a debug proxy URL.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

/// USB vendor id used by Ledger hardware wallets.
pub const LEDGER_VENDOR_ID: u16 = 0x2c97;

/// Default interval between two HID enumerations.
pub const DEFAULT_HID_POLL_INTERVAL_MS: u64 = 1000;

/// Size of a single HID report, excluding the report id byte.
pub const HID_PACKET_SIZE: usize = 64;

/// HID framing channel id.
pub const HID_CHANNEL: u16 = 0x0101;

/// HID framing command tag for APDU transport.
pub const HID_TAG_APDU: u8 = 0x05;

/// Prefix of the environment variables read by `LinkConfig::from_env`.
pub const ENV_PREFIX: &str = "DEVLINK_";
