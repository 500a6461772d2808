//! Connection character sets.
//!
//! The `lc_ctype` sent at attach decides how the server encodes text for this
//! attachment. The same charset is applied here to SQL text, text slots and text blobs.

use std::borrow::Cow;
use std::fmt;

use encoding::types::EncodingRef;
use encoding::{DecoderTrap, EncoderTrap, all};

use crate::error::{IscError, Result};

/// A supported `lc_ctype`.
///
/// `UTF8` and its aliases go through the standard library; the single-byte sets use
/// the `encoding` tables with strict traps, so unmappable characters are errors rather
/// than replacement marks.
#[derive(Clone, Copy)]
pub struct Charset {
    name: &'static str,
    codec: Option<EncodingRef>,
}

impl Charset {
    pub const UTF8: Charset = Charset {
        name: "UTF8",
        codec: None,
    };

    /// Look up a charset by its server name.
    ///
    /// # Arguments
    /// * `name` - `lc_ctype` as given in the options, matched case-insensitively.
    ///
    /// # Returns
    /// The charset, or [`IscError::Config`] when the name is not supported.
    ///
    /// # Errors
    /// See above.
    pub fn from_name(name: &str) -> Result<Self> {
        let (name, codec): (&'static str, Option<EncodingRef>) =
            match name.trim().to_ascii_uppercase().as_str() {
                "" | "UTF8" | "UTF-8" => ("UTF8", None),
                "UNICODE_FSS" => ("UNICODE_FSS", None),
                "NONE" => ("NONE", None),
                "ASCII" => ("ASCII", Some(all::ASCII as EncodingRef)),
                "ISO8859_1" => ("ISO8859_1", Some(all::ISO_8859_1 as EncodingRef)),
                "ISO8859_2" => ("ISO8859_2", Some(all::ISO_8859_2 as EncodingRef)),
                "ISO8859_15" => ("ISO8859_15", Some(all::ISO_8859_15 as EncodingRef)),
                "WIN1250" => ("WIN1250", Some(all::WINDOWS_1250 as EncodingRef)),
                "WIN1251" => ("WIN1251", Some(all::WINDOWS_1251 as EncodingRef)),
                "WIN1252" => ("WIN1252", Some(all::WINDOWS_1252 as EncodingRef)),
                "KOI8R" => ("KOI8R", Some(all::KOI8_R as EncodingRef)),
                other => {
                    return Err(IscError::Config(format!(
                        "unsupported character set {other}"
                    )));
                }
            };
        Ok(Self { name, codec })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode bytes received from the server.
    ///
    /// # Errors
    /// Returns the reason when the bytes are not valid in this charset.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, Cow<'static, str>> {
        match self.codec {
            None => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| Cow::Owned(e.to_string())),
            Some(codec) => codec.decode(bytes, DecoderTrap::Strict),
        }
    }

    /// Encode text for the server.
    ///
    /// # Errors
    /// Returns the reason when a character has no mapping in this charset.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, Cow<'static, str>> {
        match self.codec {
            None => Ok(text.as_bytes().to_vec()),
            Some(codec) => codec.encode(text, EncoderTrap::Strict),
        }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::UTF8
    }
}

impl PartialEq for Charset {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Charset {}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(Charset::from_name("utf8").unwrap(), Charset::UTF8);
        assert_eq!(Charset::from_name("").unwrap(), Charset::UTF8);
        assert_eq!(Charset::from_name("win1252").unwrap().name(), "WIN1252");
        assert!(matches!(
            Charset::from_name("EBCDIC"),
            Err(IscError::Config(_))
        ));
    }

    #[test]
    fn latin1_round_trips_accents() {
        let latin1 = Charset::from_name("ISO8859_1").unwrap();
        let bytes = latin1.encode("São Paulo").unwrap();
        assert_eq!(bytes, b"S\xe3o Paulo");
        assert_eq!(latin1.decode(&bytes).unwrap(), "São Paulo");
    }

    #[test]
    fn win1252_maps_the_euro_sign() {
        let win = Charset::from_name("WIN1252").unwrap();
        assert_eq!(win.encode("€").unwrap(), vec![0x80]);
        assert_eq!(win.decode(&[0x80]).unwrap(), "€");
        // 0x81 is unassigned in this code page
        assert!(win.decode(&[0x81]).is_err());
    }

    #[test]
    fn unmappable_characters_are_refused() {
        let latin1 = Charset::from_name("ISO8859_1").unwrap();
        assert!(latin1.encode("€").is_err());
        assert!(Charset::UTF8.decode(&[0xff, 0xfe]).is_err());
        assert_eq!(Charset::UTF8.encode("€").unwrap(), "€".as_bytes());
    }
}
