//! Chip-select decoding
//!
//! Chip A answers the chip-select line. Chip B either shares it and is
//! told apart by extra address lines (A5 and/or A8), or sits on an IO
//! expansion select wired to the A8 input (active low), in which case chip
//! select alone means chip A.

use crate::bus::{BusLines, BusSnapshot};
use crate::config::SecondChipAddress;
use crate::registers::ChipId;

/// Chip addressed by `snapshot`, if any
#[inline]
pub fn decode_chip(snapshot: &BusSnapshot, second: SecondChipAddress) -> Option<ChipId> {
    if second.is_io_expansion() {
        if snapshot.chip_selected() {
            return Some(ChipId::A);
        }
        if !snapshot.lines.contains(BusLines::A8) {
            return Some(ChipId::B);
        }
        return None;
    }

    if !snapshot.chip_selected() {
        None
    } else if snapshot.lines.intersects(second.alias_lines()) {
        Some(ChipId::B)
    } else {
        Some(ChipId::A)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(lines: BusLines) -> BusSnapshot {
        BusSnapshot {
            lines: lines | BusLines::PHI2,
            address: 0x04,
            data: 0x11,
        }
    }

    #[test]
    fn test_every_address_routes_both_aliases() {
        for second in SecondChipAddress::ALL {
            assert_eq!(
                decode_chip(&snapshot(second.primary_lines()), second),
                Some(ChipId::A),
                "{second:?} primary"
            );
            let expected = if second == SecondChipAddress::Mirror {
                ChipId::A
            } else {
                ChipId::B
            };
            assert_eq!(
                decode_chip(&snapshot(second.host_lines()), second),
                Some(expected),
                "{second:?} second"
            );
        }
    }

    #[test]
    fn test_idle_bus_selects_nothing() {
        for second in SecondChipAddress::ALL {
            assert_eq!(decode_chip(&snapshot(BusLines::A8), second), None, "{second:?}");
        }
    }

    #[test]
    fn test_io_expansion_ignores_chip_select_aliases() {
        let second = SecondChipAddress::De00;
        let lines = BusLines::CHIP_SELECT | BusLines::A5;
        assert_eq!(decode_chip(&snapshot(lines), second), Some(ChipId::A));
    }
}
