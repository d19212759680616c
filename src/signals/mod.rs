//! Signal extraction from raw worker output.
//!
//! The worker is an opaque text producer; this module is the single place
//! that imposes structure on its output.

mod parser;

pub use parser::{extract_signal_data, parse, parse_all_signals, PHASE_SIGNALS};
