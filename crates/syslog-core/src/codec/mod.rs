//! RFC 3164 datagram decoding
//!
//! Turns a raw UDP payload into a [`DecodedMessage`].
//!
//! ## Wire Format
//!
//! ```text
//! [<PRI>][Mmm DD HH:MM:SS HOSTNAME ]MSG
//! ```
//!
//! - `PRI`: 1-3 ASCII digits in angle brackets
//! - Header: fixed-width BSD timestamp, one space, a hostname token, one space.
//!   The header is recognized only as a whole; a partial header is part of `MSG`.
//! - `MSG`: the rest of the payload, verbatim (trailing line terminators removed)
//!
//! Decoding never fails for a non-empty payload. Missing pieces fall back to
//! defaults: receipt time for the timestamp, the sender address for the hostname.

mod message;

pub use message::{DecodedMessage, Facility, MAX_PRIORITY, Severity};

use chrono::{Datelike, NaiveDate, NaiveDateTime};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Length of `Mmm DD HH:MM:SS`
const TIMESTAMP_LEN: usize = 15;

/// Decode one datagram
///
/// # Parameters
///
/// - `payload`: raw datagram bytes
/// - `received_at`: local receipt time, used for the year and as the fallback timestamp
/// - `sender`: sender address string, used as the fallback hostname
///
/// # Returns
///
/// `None` if the payload is empty after trimming whitespace and NULs.
pub fn decode(payload: &[u8], received_at: NaiveDateTime, sender: &str) -> Option<DecodedMessage> {
    let packet = String::from_utf8_lossy(payload);
    if packet
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .is_empty()
    {
        return None;
    }

    let (priority, rest) = split_priority(&packet);

    let (timestamp, hostname, body) = match split_header(rest) {
        Some(header) => {
            let timestamp = header.timestamp(received_at.year()).unwrap_or(received_at);
            (timestamp, header.hostname, header.body)
        }
        None => (received_at, sender, rest),
    };

    let text = body.trim_end_matches(['\r', '\n', '\0']);

    Some(DecodedMessage::new(priority, timestamp, hostname, text))
}

/// Strip a leading `<PRI>` if present, returning 0 when there is none
fn split_priority(input: &str) -> (u16, &str) {
    let Some(after_open) = input.strip_prefix('<') else {
        return (0, input);
    };

    let Some(close) = after_open.find('>') else {
        return (0, input);
    };

    let digits = &after_open[..close];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (0, input);
    }

    match digits.parse::<u16>() {
        Ok(priority) => (priority, &after_open[close + 1..]),
        Err(_) => (0, input),
    }
}

/// Lexically recognized header fields
#[derive(Debug)]
struct Header<'a> {
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    hostname: &'a str,
    body: &'a str,
}

impl Header<'_> {
    /// Calendar timestamp in `year`, if every component is in range
    fn timestamp(&self, year: i32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            self.second,
        )
    }
}

fn split_header(input: &str) -> Option<Header<'_>> {
    let bytes = input.as_bytes();
    if bytes.len() < TIMESTAMP_LEN + 1 {
        return None;
    }

    let month = MONTHS
        .iter()
        .position(|m| m.as_bytes() == &bytes[0..3])
        .map(|idx| idx as u32 + 1)?;

    if bytes[3] != b' ' || bytes[6] != b' ' || bytes[9] != b':' || bytes[12] != b':' {
        return None;
    }

    // Day is zero- or space-padded
    if !(bytes[4] == b' ' || bytes[4].is_ascii_digit()) || !bytes[5].is_ascii_digit() {
        return None;
    }
    let day = two_digits(bytes[4], bytes[5]);
    let hour = digits_at(bytes, 7)?;
    let minute = digits_at(bytes, 10)?;
    let second = digits_at(bytes, 13)?;

    if bytes[TIMESTAMP_LEN] != b' ' {
        return None;
    }

    // All checked positions are ASCII, so this is a char boundary
    let after_timestamp = &input[TIMESTAMP_LEN + 1..];
    let host_end = after_timestamp.find(char::is_whitespace)?;
    if host_end == 0 || !after_timestamp[host_end..].starts_with(' ') {
        return None;
    }

    Some(Header {
        month,
        day,
        hour,
        minute,
        second,
        hostname: &after_timestamp[..host_end],
        body: &after_timestamp[host_end + 1..],
    })
}

fn digits_at(bytes: &[u8], at: usize) -> Option<u32> {
    let (tens, ones) = (bytes[at], bytes[at + 1]);
    (tens.is_ascii_digit() && ones.is_ascii_digit()).then(|| two_digits(tens, ones))
}

/// `b' '` is treated as a leading zero
fn two_digits(tens: u8, ones: u8) -> u32 {
    let tens = if tens == b' ' { 0 } else { u32::from(tens - b'0') };
    tens * 10 + u32::from(ones - b'0')
}
