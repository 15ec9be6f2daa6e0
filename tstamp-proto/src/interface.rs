use std::str::FromStr;

/// Size of the kernel's interface name field, including the trailing NUL.
pub const INTERFACE_NAME_SIZE: usize = 16;

/// Name of a network interface, stored the way the kernel expects it in an `ifreq`.
///
/// It is an invariant of this type that the bytes are NUL terminated: at most
/// `INTERFACE_NAME_SIZE - 1` bytes of the name are stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceName {
    bytes: [u8; INTERFACE_NAME_SIZE],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceNameParseError {
    Empty,
    TooLong,
    /// The kernel would cut the name off at the first NUL byte
    InteriorNul,
}

impl std::fmt::Display for InterfaceNameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("interface name empty"),
            Self::TooLong => f.write_str("interface name too long"),
            Self::InteriorNul => f.write_str("interface name contains a NUL byte"),
        }
    }
}

impl std::error::Error for InterfaceNameParseError {}

impl InterfaceName {
    pub const LOOPBACK: Self = Self {
        bytes: *b"lo\0\0\0\0\0\0\0\0\0\0\0\0\0\0",
    };

    /// Build a name from an OS-provided string, cutting it off at the bound.
    ///
    /// Names that are cut off may collide with other names sharing the same prefix.
    pub fn truncated(name: &str) -> Self {
        let mut bytes = [0; INTERFACE_NAME_SIZE];
        let length = Ord::min(name.len(), INTERFACE_NAME_SIZE - 1);
        bytes[..length].copy_from_slice(&name.as_bytes()[..length]);

        // an interior NUL ends the name early, keep everything after it zeroed
        if let Some(first_null) = bytes.iter().position(|b| *b == 0) {
            bytes[first_null..].fill(0);
        }

        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; INTERFACE_NAME_SIZE] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        let end = self
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(INTERFACE_NAME_SIZE);

        // a truncated multi-byte character is dropped rather than failing the conversion
        match std::str::from_utf8(&self.bytes[..end]) {
            Ok(name) => name,
            Err(e) => std::str::from_utf8(&self.bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn as_cstr(&self) -> &std::ffi::CStr {
        // the last byte is always NUL, so this cannot fail
        std::ffi::CStr::from_bytes_until_nul(&self.bytes[..]).unwrap_or_default()
    }

    pub fn is_loopback(&self) -> bool {
        *self == Self::LOOPBACK
    }
}

impl FromStr for InterfaceName {
    type Err = InterfaceNameParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.is_empty() {
            return Err(InterfaceNameParseError::Empty);
        }

        // >= so that we always retain a NUL byte at the end
        if name.len() >= INTERFACE_NAME_SIZE {
            return Err(InterfaceNameParseError::TooLong);
        }

        if name.as_bytes().contains(&0) {
            return Err(InterfaceNameParseError::InteriorNul);
        }

        Ok(Self::truncated(name))
    }
}

impl<'de> serde::Deserialize<'de> for InterfaceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name: String = serde::Deserialize::deserialize(deserializer)?;
        Self::from_str(&name).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InterfaceName")
            .field(&self.as_str())
            .finish()
    }
}

impl std::fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// One entry of the host interface table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: InterfaceName,
    /// The entry carries a link-layer (packet family) address
    pub link_layer: bool,
    pub loopback: bool,
}

impl NetworkInterface {
    /// Only physical-ish interfaces can be asked for hardware timestamps
    pub fn is_timestampable(&self) -> bool {
        self.link_layer && !self.loopback && !self.name.is_loopback()
    }
}

/// Which of the timestampable interfaces get hardware timestamping configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InterfaceSelection {
    #[default]
    All,
    Only(Vec<InterfaceName>),
}

impl InterfaceSelection {
    pub fn contains(&self, name: &InterfaceName) -> bool {
        match self {
            InterfaceSelection::All => true,
            InterfaceSelection::Only(names) => names.contains(name),
        }
    }
}
