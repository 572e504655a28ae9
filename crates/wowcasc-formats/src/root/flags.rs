//! Content and locale flags for root blocks

use std::fmt;
use std::str::FromStr;

/// Content flags of a root block
///
/// Modern root files may carry up to 40 bits, so the value is kept as `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentFlags(pub u64);

impl ContentFlags {
    /// Loaded on Windows clients
    pub const LOAD_ON_WINDOWS: u64 = 0x8;

    /// Loaded on macOS clients
    pub const LOAD_ON_MACOS: u64 = 0x10;

    /// Low violence variant of an asset
    pub const LOW_VIOLENCE: u64 = 0x80;

    /// Never loaded by the client
    pub const DO_NOT_LOAD: u64 = 0x100;

    /// Update plugin
    pub const UPDATE_PLUGIN: u64 = 0x800;

    /// Content is encrypted
    pub const ENCRYPTED: u64 = 0x0800_0000;

    /// Block has no name hashes
    pub const NO_NAME_HASH: u64 = 0x1000_0000;

    /// Uncommon resolution texture
    pub const UNCOMMON_RESOLUTION: u64 = 0x2000_0000;

    /// Bundled content
    pub const BUNDLE: u64 = 0x4000_0000;

    /// Stored without compression
    pub const NO_COMPRESSION: u64 = 0x8000_0000;

    /// Check if any bit of `flag` is set
    pub const fn has(self, flag: u64) -> bool {
        self.0 & flag != 0
    }

    /// Whether the block is a low violence variant
    pub const fn is_low_violence(self) -> bool {
        self.has(Self::LOW_VIOLENCE)
    }

    /// Whether the block stores 8-byte name hashes after its content keys
    pub const fn has_name_hashes(self) -> bool {
        !self.has(Self::NO_NAME_HASH)
    }
}

impl fmt::Display for ContentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Locale bitmask of a root block, also used for the active client locale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LocaleFlags(pub u32);

/// Locale names paired with their bits
const LOCALES: &[(&str, u32)] = &[
    ("enUS", LocaleFlags::EN_US),
    ("koKR", LocaleFlags::KO_KR),
    ("frFR", LocaleFlags::FR_FR),
    ("deDE", LocaleFlags::DE_DE),
    ("zhCN", LocaleFlags::ZH_CN),
    ("esES", LocaleFlags::ES_ES),
    ("zhTW", LocaleFlags::ZH_TW),
    ("enGB", LocaleFlags::EN_GB),
    ("enCN", LocaleFlags::EN_CN),
    ("enTW", LocaleFlags::EN_TW),
    ("esMX", LocaleFlags::ES_MX),
    ("ruRU", LocaleFlags::RU_RU),
    ("ptBR", LocaleFlags::PT_BR),
    ("itIT", LocaleFlags::IT_IT),
    ("ptPT", LocaleFlags::PT_PT),
];

impl LocaleFlags {
    /// English (United States)
    pub const EN_US: u32 = 0x2;
    /// Korean
    pub const KO_KR: u32 = 0x4;
    /// French
    pub const FR_FR: u32 = 0x10;
    /// German
    pub const DE_DE: u32 = 0x20;
    /// Chinese (simplified)
    pub const ZH_CN: u32 = 0x40;
    /// Spanish (Spain)
    pub const ES_ES: u32 = 0x80;
    /// Chinese (traditional)
    pub const ZH_TW: u32 = 0x100;
    /// English (Great Britain)
    pub const EN_GB: u32 = 0x200;
    /// English (China)
    pub const EN_CN: u32 = 0x400;
    /// English (Taiwan)
    pub const EN_TW: u32 = 0x800;
    /// Spanish (Mexico)
    pub const ES_MX: u32 = 0x1000;
    /// Russian
    pub const RU_RU: u32 = 0x2000;
    /// Portuguese (Brazil)
    pub const PT_BR: u32 = 0x4000;
    /// Italian
    pub const IT_IT: u32 = 0x8000;
    /// Portuguese (Portugal)
    pub const PT_PT: u32 = 0x10000;

    /// Whether the two masks share a locale
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Name of a single-locale mask, such as `enUS`
    pub fn name(self) -> Option<&'static str> {
        LOCALES
            .iter()
            .find(|(_, bit)| *bit == self.0)
            .map(|(name, _)| *name)
    }
}

impl FromStr for LocaleFlags {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LOCALES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|&(_, bit)| Self(bit))
            .ok_or_else(|| format!("unknown locale: {s}"))
    }
}

impl fmt::Display for LocaleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08x}", self.0),
        }
    }
}
