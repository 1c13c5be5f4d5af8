//! Line-oriented logging for the relationship service.
//!
//! Every line produced by [`rlog!`] looks like:
//!
//! ```text
//! 20261019T08:14:03.512 - src/friendship.rs:212 - friendship: u-5f1c2a0 accepted u-9ab03de
//! ```
//!
//! Profile and group identifiers are shortened and, on a terminal, tinted
//! with a colour derived from their content so the same id is easy to follow
//! across lines. Output goes to stderr unless [`set_writer`] installs
//! another destination (tests use this to capture log lines).

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

static COLOUR: AtomicBool = AtomicBool::new(false);

static SINK: LazyLock<Mutex<Box<dyn Write + Send>>> =
    LazyLock::new(|| Mutex::new(Box::new(io::stderr())));

/// Detect colour support on stderr. Call once from the binary entry point.
pub fn init() {
    COLOUR.store(io::stderr().is_terminal(), Ordering::Relaxed);
}

/// Send all further log lines to `w` and switch colour off.
pub fn set_writer(w: Box<dyn Write + Send>) {
    COLOUR.store(false, Ordering::Relaxed);
    if let Ok(mut sink) = SINK.lock() {
        *sink = w;
    }
}

fn colour_enabled() -> bool {
    COLOUR.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

const PALETTE: &[&str] = &[
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m", "\x1b[32m",
    "\x1b[33m", "\x1b[34m", "\x1b[35m", "\x1b[36m",
];

const SHORT_ID_LEN: usize = 7;

fn palette_for(id: &str) -> &'static str {
    let h = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    PALETTE[h as usize % PALETTE.len()]
}

fn shorten(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn tagged(prefix: &str, id: &str) -> String {
    let short = shorten(id);
    if colour_enabled() {
        format!("{}{prefix}-{short}{RESET}", palette_for(id))
    } else {
        format!("{prefix}-{short}")
    }
}

/// Render a profile id for a log line, e.g. `u-5f1c2a0`.
pub fn profile_id(id: &str) -> String {
    tagged("u", id)
}

/// Render a group id for a log line, e.g. `g-03be91c`.
pub fn group_id(id: &str) -> String {
    tagged("g", id)
}

/// Wall-clock time as `YYYYMMDDTHH:MM:SS.mmm` (UTC).
pub fn format_timestamp() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs();
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    let tod = secs % 86_400;
    format!(
        "{y:04}{m:02}{d:02}T{:02}:{:02}:{:02}.{:03}",
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60,
        now.subsec_millis()
    )
}

// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

/// Write one line to the sink. Use [`rlog!`] instead of calling this.
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    let text = if colour_enabled() {
        format!("{DIM}{ts} {file}:{line}{RESET} {msg}")
    } else {
        format!("{ts} - {file}:{line} - {msg}")
    };
    if let Ok(mut sink) = SINK.lock() {
        let _ = writeln!(*sink, "{text}");
    }
}

/// Log a formatted line with timestamp and call site.
///
/// ```ignore
/// rlog!("groups: {} created by {}", logging::group_id(&gid), logging::profile_id(&uid));
/// ```
#[macro_export]
macro_rules! rlog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
