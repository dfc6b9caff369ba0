//! Attribute identification: tags and value representations.

use snafu::{ensure, ResultExt, Snafu};
use std::fmt;
use std::str::{from_utf8, FromStr};

/// Idiomatic alias for a tag's group number.
pub type GroupNumber = u16;
/// Idiomatic alias for a tag's element number.
pub type ElementNumber = u16;

/// The data type for attribute tags, a `(group, element)` pair.
///
/// The canonical textual form is eight upper case hexadecimal digits
/// with no separators (`"GGGGEEEE"`), as used by DICOM JSON.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct Tag(pub GroupNumber, pub ElementNumber);

impl Tag {
    /// Getter for the tag's group value.
    #[inline]
    pub fn group(self) -> GroupNumber {
        self.0
    }

    /// Getter for the tag's element value.
    #[inline]
    pub fn element(self) -> ElementNumber {
        self.1
    }

    /// The tag packed as a single 32-bit number (`0xGGGGEEEE`).
    #[inline]
    pub fn to_u32(self) -> u32 {
        (u32::from(self.0) << 16) | u32::from(self.1)
    }

    /// Build a tag from its packed 32-bit form.
    #[inline]
    pub fn from_u32(value: u32) -> Self {
        Tag((value >> 16) as u16, (value & 0xFFFF) as u16)
    }

    /// Whether this is the reserved pixel data tag.
    #[inline]
    pub fn is_pixel_data(self) -> bool {
        self == tags::PIXEL_DATA
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag({:#06X?}, {:#06X?})", self.0, self.1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04X}{:04X}", self.0, self.1)
    }
}

impl From<(u16, u16)> for Tag {
    #[inline]
    fn from(value: (u16, u16)) -> Tag {
        Tag(value.0, value.1)
    }
}

impl From<[u16; 2]> for Tag {
    #[inline]
    fn from(value: [u16; 2]) -> Tag {
        Tag(value[0], value[1])
    }
}

impl PartialEq<(u16, u16)> for Tag {
    fn eq(&self, other: &(u16, u16)) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

/// Could not parse a tag from text.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ParseTagError {
    /// Tag text must hold exactly 8 hexadecimal digits
    #[snafu(display("Invalid tag `{}`: expected 8 hexadecimal digits", text))]
    InvalidLength { text: String },
    /// Tag text holds a non-hexadecimal character
    #[snafu(display("Invalid tag `{}`: not hexadecimal", text))]
    InvalidDigits {
        text: String,
        source: std::num::ParseIntError,
    },
}

/// Parse a tag from `GGGGEEEE`, `GGGG,EEEE` or `(GGGG,EEEE)`.
impl FromStr for Tag {
    type Err = ParseTagError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut s = text.trim();
        if s.starts_with('(') && s.ends_with(')') {
            s = &s[1..s.len() - 1];
        }
        let (group, elem) = match s.split_once(',') {
            Some((g, e)) => (g.trim(), e.trim()),
            None if s.len() == 8 && s.is_char_boundary(4) => (&s[..4], &s[4..]),
            None => return InvalidLengthSnafu { text }.fail(),
        };
        ensure!(
            group.len() == 4 && elem.len() == 4,
            InvalidLengthSnafu { text }
        );
        let group = u16::from_str_radix(group, 16).context(InvalidDigitsSnafu { text })?;
        let elem = u16::from_str_radix(elem, 16).context(InvalidDigitsSnafu { text })?;
        Ok(Tag(group, elem))
    }
}

/// Well known attribute tags.
pub mod tags {
    use super::Tag;

    /// Specific Character Set
    pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
    /// Image Type
    pub const IMAGE_TYPE: Tag = Tag(0x0008, 0x0008);
    /// SOP Instance UID
    pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
    /// Study Date
    pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
    /// Modality
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    /// Referring Physician's Name
    pub const REFERRING_PHYSICIAN_NAME: Tag = Tag(0x0008, 0x0090);
    /// Code Value
    pub const CODE_VALUE: Tag = Tag(0x0008, 0x0100);
    /// Coding Scheme Designator
    pub const CODING_SCHEME_DESIGNATOR: Tag = Tag(0x0008, 0x0102);
    /// Code Meaning
    pub const CODE_MEANING: Tag = Tag(0x0008, 0x0104);
    /// Derivation Code Sequence
    pub const DERIVATION_CODE_SEQUENCE: Tag = Tag(0x0008, 0x9215);
    /// Patient's Name
    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    /// Patient ID
    pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
    /// Slice Thickness
    pub const SLICE_THICKNESS: Tag = Tag(0x0018, 0x0050);
    /// Instance Number
    pub const INSTANCE_NUMBER: Tag = Tag(0x0020, 0x0013);
    /// Samples per Pixel
    pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
    /// Rows
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    /// Columns
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    /// Pixel Spacing
    pub const PIXEL_SPACING: Tag = Tag(0x0028, 0x0030);
    /// Bits Allocated
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    /// Pixel Representation
    pub const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
    /// Pixel Data, the reserved tag of the pixel tensor
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
}

/// An enum type for a DICOM value representation.
///
/// The set is closed: every VR the container can hold is listed here,
/// and decoding rejects anything else.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum VR {
    /// Application Entity
    AE,
    /// Age String
    AS,
    /// Attribute Tag
    AT,
    /// Code String
    CS,
    /// Date
    DA,
    /// Decimal String
    DS,
    /// Date Time
    DT,
    /// Floating Point Single
    FL,
    /// Floating Point Double
    FD,
    /// Integer String
    IS,
    /// Long String
    LO,
    /// Long Text
    LT,
    /// Other Byte
    OB,
    /// Other Double
    OD,
    /// Other Float
    OF,
    /// Other Long
    OL,
    /// Other Very Long
    OV,
    /// Other Word
    OW,
    /// Person Name
    PN,
    /// Short String
    SH,
    /// Signed Long
    SL,
    /// Sequence of Items
    SQ,
    /// Signed Short
    SS,
    /// Short Text
    ST,
    /// Signed Very Long
    SV,
    /// Time
    TM,
    /// Unlimited Characters
    UC,
    /// Unique Identifier (UID)
    UI,
    /// Unsigned Long
    UL,
    /// Unknown
    UN,
    /// Universal Resource Identifier or Universal Resource Locator (URI/URL)
    UR,
    /// Unsigned Short
    US,
    /// Unlimited Text
    UT,
    /// Unsigned Very Long
    UV,
}

impl VR {
    /// Obtain the value representation corresponding to the given two bytes.
    /// Each byte should represent an alphabetic character in upper case.
    pub fn from_binary(chars: [u8; 2]) -> Option<Self> {
        from_utf8(chars.as_ref())
            .ok()
            .and_then(|s| VR::from_str(s).ok())
    }

    /// Retrieve a string representation of this VR.
    pub fn to_string(self) -> &'static str {
        use VR::*;
        match self {
            AE => "AE",
            AS => "AS",
            AT => "AT",
            CS => "CS",
            DA => "DA",
            DS => "DS",
            DT => "DT",
            FL => "FL",
            FD => "FD",
            IS => "IS",
            LO => "LO",
            LT => "LT",
            OB => "OB",
            OD => "OD",
            OF => "OF",
            OL => "OL",
            OV => "OV",
            OW => "OW",
            PN => "PN",
            SH => "SH",
            SL => "SL",
            SQ => "SQ",
            SS => "SS",
            ST => "ST",
            SV => "SV",
            TM => "TM",
            UC => "UC",
            UI => "UI",
            UL => "UL",
            UN => "UN",
            UR => "UR",
            US => "US",
            UT => "UT",
            UV => "UV",
        }
    }

    /// Retrieve a copy of this VR's byte representation.
    /// The function returns two alphabetic characters in upper case.
    pub fn to_bytes(self) -> [u8; 2] {
        let bytes = self.to_string().as_bytes();
        [bytes[0], bytes[1]]
    }

    /// Whether values of this VR are always textual.
    pub fn is_text(self) -> bool {
        use VR::*;
        matches!(
            self,
            AE | AS | CS | DA | DS | DT | IS | LO | LT | PN | SH | ST | TM | UC | UI | UR | UT
        )
    }

    /// Whether this VR holds opaque binary data
    /// (carried as inline binary in DICOM JSON).
    pub fn is_binary(self) -> bool {
        use VR::*;
        matches!(self, OB | OD | OF | OL | OV | OW | UN)
    }
}

/// Obtain the value representation corresponding to the given string.
/// The string should hold exactly two UTF-8 encoded alphabetic characters
/// in upper case, otherwise no match is made.
impl FromStr for VR {
    type Err = &'static str;

    fn from_str(string: &str) -> std::result::Result<Self, Self::Err> {
        use VR::*;
        match string {
            "AE" => Ok(AE),
            "AS" => Ok(AS),
            "AT" => Ok(AT),
            "CS" => Ok(CS),
            "DA" => Ok(DA),
            "DS" => Ok(DS),
            "DT" => Ok(DT),
            "FL" => Ok(FL),
            "FD" => Ok(FD),
            "IS" => Ok(IS),
            "LO" => Ok(LO),
            "LT" => Ok(LT),
            "OB" => Ok(OB),
            "OD" => Ok(OD),
            "OF" => Ok(OF),
            "OL" => Ok(OL),
            "OV" => Ok(OV),
            "OW" => Ok(OW),
            "PN" => Ok(PN),
            "SH" => Ok(SH),
            "SL" => Ok(SL),
            "SQ" => Ok(SQ),
            "SS" => Ok(SS),
            "ST" => Ok(ST),
            "SV" => Ok(SV),
            "TM" => Ok(TM),
            "UC" => Ok(UC),
            "UI" => Ok(UI),
            "UL" => Ok(UL),
            "UN" => Ok(UN),
            "UR" => Ok(UR),
            "US" => Ok(US),
            "UT" => Ok(UT),
            "UV" => Ok(UV),
            _ => Err("no such value representation"),
        }
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(VR::to_string(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_from_u16_pair() {
        let t = Tag::from((0x0010u16, 0x0020u16));
        assert_eq!(0x0010u16, t.group());
        assert_eq!(0x0020u16, t.element());
    }

    #[test]
    fn tag_text_forms() {
        assert_eq!("00089215".parse::<Tag>().unwrap(), Tag(0x0008, 0x9215));
        assert_eq!("7fe00010".parse::<Tag>().unwrap(), tags::PIXEL_DATA);
        assert_eq!("(0028,0010)".parse::<Tag>().unwrap(), tags::ROWS);
        assert_eq!("0028,0011".parse::<Tag>().unwrap(), tags::COLUMNS);
        assert_eq!(tags::PIXEL_DATA.to_string(), "7FE00010");

        assert!("0008921".parse::<Tag>().is_err());
        assert!("0008921Z".parse::<Tag>().is_err());
        assert!("".parse::<Tag>().is_err());
    }

    #[test]
    fn tag_packing() {
        let t = Tag(0x7FE0, 0x0010);
        assert_eq!(t.to_u32(), 0x7FE0_0010);
        assert_eq!(Tag::from_u32(0x7FE0_0010), t);
    }

    #[test]
    fn vr_binary_roundtrip() {
        assert_eq!(VR::from_binary(*b"SQ"), Some(VR::SQ));
        assert_eq!(VR::from_binary(VR::PN.to_bytes()), Some(VR::PN));
        assert_eq!(VR::from_binary(*b"XX"), None);
        assert_eq!(VR::from_binary([0xFF, 0x00]), None);
    }
}
