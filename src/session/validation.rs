use std::collections::HashSet;

use super::error::SetupError;

pub const MIN_DEVICES: usize = 2;
pub const MAX_DEVICES: usize = 6;
pub const MIN_ROUND_SECONDS: u32 = 30;
pub const MAX_ROUND_SECONDS: u32 = 600;

/// Checks a proposed session setup without touching the store.
///
/// Player names are compared trimmed and case-insensitively.
pub fn validate_setup(
    devices: &[String],
    player_names: &[String],
    round_seconds: u32,
) -> Result<(), SetupError> {
    if devices.is_empty() || player_names.is_empty() {
        return Err(SetupError::Missing);
    }

    if devices.len() != player_names.len() {
        return Err(SetupError::CountMismatch {
            devices: devices.len(),
            names: player_names.len(),
        });
    }

    if !(MIN_DEVICES..=MAX_DEVICES).contains(&devices.len()) {
        return Err(SetupError::DeviceCount {
            actual: devices.len(),
            min: MIN_DEVICES,
            max: MAX_DEVICES,
        });
    }

    if !(MIN_ROUND_SECONDS..=MAX_ROUND_SECONDS).contains(&round_seconds) {
        return Err(SetupError::RoundDuration {
            actual: round_seconds,
            min: MIN_ROUND_SECONDS,
            max: MAX_ROUND_SECONDS,
        });
    }

    let mut seen_devices = HashSet::new();
    for device in devices {
        if !seen_devices.insert(device.trim()) {
            return Err(SetupError::DuplicateDevice {
                device: device.clone(),
            });
        }
    }

    let mut seen_names = HashSet::new();
    for (position, name) in player_names.iter().enumerate() {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(SetupError::BlankName { position });
        }
        if !seen_names.insert(normalized) {
            return Err(SetupError::DuplicateName {
                name: name.trim().to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn accepts_two_devices_with_unique_names() {
        assert_eq!(
            validate_setup(&strings(&["D1", "D2"]), &strings(&["Alice", "Bob"]), 60),
            Ok(())
        );
    }

    #[test]
    fn rejects_missing_lists() {
        assert_eq!(
            validate_setup(&[], &strings(&["Alice"]), 60),
            Err(SetupError::Missing)
        );
    }

    #[test]
    fn rejects_count_mismatch() {
        assert_eq!(
            validate_setup(&strings(&["D1", "D2", "D3"]), &strings(&["Alice", "Bob"]), 60),
            Err(SetupError::CountMismatch { devices: 3, names: 2 })
        );
    }

    #[test]
    fn rejects_device_counts_outside_bounds() {
        assert!(matches!(
            validate_setup(&strings(&["D1"]), &strings(&["Alice"]), 60),
            Err(SetupError::DeviceCount { actual: 1, .. })
        ));

        let seven: Vec<String> = (1..=7).map(|n| format!("D{n}")).collect();
        let names: Vec<String> = (1..=7).map(|n| format!("P{n}")).collect();
        assert!(matches!(
            validate_setup(&seven, &names, 60),
            Err(SetupError::DeviceCount { actual: 7, .. })
        ));
        assert_eq!(validate_setup(&seven[..6], &names[..6], 60), Ok(()));
    }

    #[test]
    fn rejects_round_duration_outside_bounds() {
        let devices = strings(&["D1", "D2"]);
        let names = strings(&["Alice", "Bob"]);
        for seconds in [0, 29, 601] {
            assert!(matches!(
                validate_setup(&devices, &names, seconds),
                Err(SetupError::RoundDuration { .. })
            ));
        }
        assert_eq!(validate_setup(&devices, &names, 30), Ok(()));
        assert_eq!(validate_setup(&devices, &names, 600), Ok(()));
    }

    #[test]
    fn rejects_names_equal_after_trim_and_case_fold() {
        assert_eq!(
            validate_setup(&strings(&["D1", "D2"]), &strings(&["Alice", "  aLiCe "]), 60),
            Err(SetupError::DuplicateName {
                name: "aLiCe".into()
            })
        );
    }

    #[test]
    fn rejects_blank_names_and_repeated_devices() {
        assert_eq!(
            validate_setup(&strings(&["D1", "D2"]), &strings(&["Alice", "   "]), 60),
            Err(SetupError::BlankName { position: 1 })
        );
        assert_eq!(
            validate_setup(&strings(&["D1", "D1"]), &strings(&["Alice", "Bob"]), 60),
            Err(SetupError::DuplicateDevice { device: "D1".into() })
        );
    }
}
