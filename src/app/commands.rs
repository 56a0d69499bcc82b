//! Text commands accepted on both protocols.
//!
//! Matching follows the device's historical wire behaviour: verbs that
//! take (or tolerate) arguments match as a *prefix* of the line, longest
//! verb first; the rest must match the whole line.  `LED_BRIGHTNESS2` is
//! therefore `LED_BRIGHTNESS` with argument `2`, and `LED_ON please` is
//! plain `LED_ON`.

use heapless::Vec;

use crate::error::ProtocolError;

/// Upper bound on whitespace-separated arguments after the verb.
pub const MAX_ARGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    LedOn,
    LedOff,
    LedBrightness,
    SegmentDisplay,
    SegmentCountdown,
    SegmentStop,
    SegmentOff,
    BuzzerPlay,
    BuzzerStop,
    CdsRead,
    CdsAutoStart,
    CdsAutoStop,
    CdsGetStatus,
    AutoLedOn,
    AutoLedOff,
    AllOff,
    Status,
    Help,
    Quit,
}

/// Matched as a line prefix, longest first.
const PREFIX_VERBS: [(&str, Verb); 12] = [
    ("SEGMENT_COUNTDOWN", Verb::SegmentCountdown),
    ("SEGMENT_DISPLAY", Verb::SegmentDisplay),
    ("CDS_GET_STATUS", Verb::CdsGetStatus),
    ("LED_BRIGHTNESS", Verb::LedBrightness),
    ("CDS_AUTO_START", Verb::CdsAutoStart),
    ("CDS_AUTO_STOP", Verb::CdsAutoStop),
    ("CDS_READ", Verb::CdsRead),
    ("LED_OFF", Verb::LedOff),
    ("ALL_OFF", Verb::AllOff),
    ("LED_ON", Verb::LedOn),
    ("HELP", Verb::Help),
    ("QUIT", Verb::Quit),
];

/// Matched against the whole trimmed line.
const EXACT_VERBS: [(&str, Verb); 7] = [
    ("SEGMENT_STOP", Verb::SegmentStop),
    ("SEGMENT_OFF", Verb::SegmentOff),
    ("BUZZER_PLAY", Verb::BuzzerPlay),
    ("BUZZER_STOP", Verb::BuzzerStop),
    ("AUTO_LED_ON", Verb::AutoLedOn),
    ("AUTO_LED_OFF", Verb::AutoLedOff),
    ("STATUS", Verb::Status),
];

impl Verb {
    pub fn as_str(self) -> &'static str {
        PREFIX_VERBS
            .iter()
            .chain(EXACT_VERBS.iter())
            .find(|(_, v)| *v == self)
            .map_or("?", |(name, _)| name)
    }
}

/// A parsed command line, borrowing from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub verb: Verb,
    pub args: Vec<&'a str, MAX_ARGS>,
}

impl<'a> Command<'a> {
    /// Parse one line.  Leading/trailing whitespace is ignored; verbs are
    /// case-sensitive.
    pub fn parse(line: &'a str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::ParseFailure("empty command".into()));
        }

        if let Some((name, verb)) = PREFIX_VERBS.iter().find(|(name, _)| line.starts_with(name)) {
            let mut args = Vec::new();
            for arg in line[name.len()..].split_whitespace() {
                args.push(arg)
                    .map_err(|_| ProtocolError::ParseFailure(format!("too many arguments for {}", name)))?;
            }
            return Ok(Self { verb: *verb, args });
        }

        EXACT_VERBS
            .iter()
            .find(|(name, _)| *name == line)
            .map(|(_, verb)| Self {
                verb: *verb,
                args: Vec::new(),
            })
            .ok_or_else(|| ProtocolError::UnknownCommand(line.to_string()))
    }

    /// Leading integer of the first argument: optional sign, then digits.
    /// Trailing characters are ignored, so `1x` reads as 1.
    pub fn int_arg(&self) -> Option<i64> {
        let arg = self.args.first()?;
        let sign_len = usize::from(arg.starts_with(['+', '-']));
        let digits = arg[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        arg[..sign_len + digits].parse::<i64>().ok()
    }
}
