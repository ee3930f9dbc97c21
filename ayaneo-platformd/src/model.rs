use std::fmt;

/* DMI board vendor shared by every supported handheld. */
pub const BOARD_VENDOR: &str = "AYANEO";

/* Supported hardware variants. Resolved once at startup. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceModel {
    Air,
    Air1S,
    Air1SLimited,
    AirPlus,
    AirPlusMendocino,
    AirPro,
    Ayaneo2,
    Ayaneo2S,
    Geek,
    Geek1S,
    Kun,
    Slide,
    /* Identified boards without a known register map. */
    Ayaneo2021,
    Ayaneo2021Pro,
    Next,
    NextPro,
    Flip,
}

impl DeviceModel {
    pub const ALL: [DeviceModel; 17] = [
        Self::Air,
        Self::Air1S,
        Self::Air1SLimited,
        Self::AirPlus,
        Self::AirPlusMendocino,
        Self::AirPro,
        Self::Ayaneo2,
        Self::Ayaneo2S,
        Self::Geek,
        Self::Geek1S,
        Self::Kun,
        Self::Slide,
        Self::Ayaneo2021,
        Self::Ayaneo2021Pro,
        Self::Next,
        Self::NextPro,
        Self::Flip,
    ];

    /* Exact DMI board name reported by this model's firmware. */
    pub fn board_name(self) -> &'static str {
        match self {
            Self::Air => "AIR",
            Self::Air1S => "AIR 1S",
            Self::Air1SLimited => "AIR 1S Limited",
            Self::AirPlus => "AB05-AMD",
            Self::AirPlusMendocino => "AB05-Mendocino",
            Self::AirPro => "AIR Pro",
            Self::Ayaneo2 => "AYANEO 2",
            Self::Ayaneo2S => "AYANEO 2S",
            Self::Geek => "GEEK",
            Self::Geek1S => "GEEK 1S",
            Self::Kun => "AYANEO KUN",
            Self::Slide => "AS01",
            Self::Ayaneo2021 => "AYANEO 2021",
            Self::Ayaneo2021Pro => "AYANEO 2021 Pro",
            Self::Next => "NEXT",
            Self::NextPro => "NEXT Pro",
            Self::Flip => "FLIP KB",
        }
    }

    /* Match a DMI (vendor, board) pair exactly. */
    pub fn from_dmi(vendor: &str, board: &str) -> Option<Self> {
        if vendor != BOARD_VENDOR {
            return None;
        }
        Self::from_board_name(board)
    }

    pub fn from_board_name(board: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.board_name() == board)
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Air => "AIR",
            Self::Air1S => "AIR 1S",
            Self::Air1SLimited => "AIR 1S Limited",
            Self::AirPlus => "AIR Plus",
            Self::AirPlusMendocino => "AIR Plus (Mendocino)",
            Self::AirPro => "AIR Pro",
            Self::Ayaneo2 => "AYANEO 2",
            Self::Ayaneo2S => "AYANEO 2S",
            Self::Geek => "GEEK",
            Self::Geek1S => "GEEK 1S",
            Self::Kun => "KUN",
            Self::Slide => "SLIDE",
            Self::Ayaneo2021 => "AYANEO 2021",
            Self::Ayaneo2021Pro => "AYANEO 2021 Pro",
            Self::Next => "NEXT",
            Self::NextPro => "NEXT Pro",
            Self::Flip => "FLIP",
        };
        f.write_str(name)
    }
}
