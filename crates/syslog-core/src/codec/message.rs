// # Decoded Message
//
// Structured form of one received syslog datagram.
//
// A `DecodedMessage` is built once by the codec and then shared read-only
// (behind an `Arc`) with monitors, routing and parser modules. There are no
// setters; every field is exposed through an accessor.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Highest PRI value whose facility has a name (facility 23 * 8 + severity 7)
pub const MAX_PRIORITY: u16 = 191;

/// Syslog facility, the upper bits of PRI (`PRI / 8`)
///
/// Codes above 23 have no standard name and are kept as [`Facility::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    Kernel,
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Clock,
    AuthPriv,
    Ftp,
    Ntp,
    Audit,
    Alert,
    Clock2,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
    Unknown(u8),
}

impl Facility {
    const ALL: [Facility; 24] = [
        Facility::Kernel,
        Facility::User,
        Facility::Mail,
        Facility::Daemon,
        Facility::Auth,
        Facility::Syslog,
        Facility::Lpr,
        Facility::News,
        Facility::Uucp,
        Facility::Clock,
        Facility::AuthPriv,
        Facility::Ftp,
        Facility::Ntp,
        Facility::Audit,
        Facility::Alert,
        Facility::Clock2,
        Facility::Local0,
        Facility::Local1,
        Facility::Local2,
        Facility::Local3,
        Facility::Local4,
        Facility::Local5,
        Facility::Local6,
        Facility::Local7,
    ];

    /// Look up a facility by its numeric code
    pub fn from_code(code: u8) -> Self {
        Self::ALL
            .get(code as usize)
            .copied()
            .unwrap_or(Facility::Unknown(code))
    }

    /// Numeric facility code
    pub fn code(self) -> u8 {
        match self {
            Facility::Unknown(code) => code,
            named => Self::ALL
                .iter()
                .position(|facility| *facility == named)
                .map_or(0, |idx| idx as u8),
        }
    }
}

/// Syslog severity, the lower three bits of PRI (`PRI % 8`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Informational,
    Debug,
}

impl Severity {
    const ALL: [Severity; 8] = [
        Severity::Emergency,
        Severity::Alert,
        Severity::Critical,
        Severity::Error,
        Severity::Warning,
        Severity::Notice,
        Severity::Informational,
        Severity::Debug,
    ];

    /// Look up a severity by its numeric code (0-7)
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Numeric severity code
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A decoded syslog message
///
/// `facility` and `severity` are `None` when the datagram carried no PRI or
/// a PRI of zero. Any other PRI sets both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedMessage {
    facility: Option<Facility>,
    severity: Option<Severity>,
    timestamp: NaiveDateTime,
    hostname: String,
    text: String,
}

impl DecodedMessage {
    /// Build a message from a raw PRI value and already-resolved header fields
    ///
    /// A `priority` of 0 means "no PRI".
    pub fn new(
        priority: u16,
        timestamp: NaiveDateTime,
        hostname: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let (facility, severity) = if priority > 0 {
            (
                u8::try_from(priority / 8).ok().map(Facility::from_code),
                Severity::from_code((priority % 8) as u8),
            )
        } else {
            (None, None)
        };

        Self {
            facility,
            severity,
            timestamp,
            hostname: hostname.into(),
            text: text.into(),
        }
    }

    pub fn facility(&self) -> Option<Facility> {
        self.facility
    }

    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    /// Header timestamp, or the receipt time when the header had none
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Header hostname, or the sender address when the header had none
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Message body, verbatim
    pub fn text(&self) -> &str {
        &self.text
    }
}
