//! Step identifier generation
//!
//! Every transformed message carries a `step_id` in the shape
//! `step-xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` (lowercase hex groups of
//! byte widths 4-2-2-2-6). The shape is UUID-like but no variant/version
//! bits are set. Generation goes through a trait so tests can inject a
//! deterministic source while production draws from the OS RNG.

use rand::rngs::OsRng;
use rand::RngCore;

/// Injected source of step identifiers
pub trait StepIdGenerator: Send + Sync {
    fn step_id(&self) -> String;
}

/// Production generator backed by a cryptographically secure source
#[derive(Debug, Default)]
pub struct RandomStepIds;

impl StepIdGenerator for RandomStepIds {
    fn step_id(&self) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        format_step_id(&bytes)
    }
}

/// Format 16 raw bytes as a step identifier
pub fn format_step_id(bytes: &[u8; 16]) -> String {
    format!(
        "step-{}-{}-{}-{}-{}",
        hex(&bytes[0..4]),
        hex(&bytes[4..6]),
        hex(&bytes[6..8]),
        hex(&bytes[8..10]),
        hex(&bytes[10..16])
    )
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Check the `step-` prefix and the 8-4-4-4-12 lowercase hex group shape
pub fn is_valid_step_id(step_id: &str) -> bool {
    let Some(rest) = step_id.strip_prefix("step-") else {
        return false;
    };
    let groups: Vec<&str> = rest.split('-').collect();
    if groups.len() != 5 {
        return false;
    }
    let expected = [8, 4, 4, 4, 12];
    groups.iter().zip(expected).all(|(group, len)| {
        group.len() == len
            && group
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn formatted_ids_have_the_expected_shape() {
        let id = format_step_id(&[0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(id, "step-deadbeef-0001-0203-0405-060708090a0b");
        assert!(is_valid_step_id(&id));
    }

    #[test]
    fn random_ids_are_valid_and_unique() {
        let generator = RandomStepIds;
        let ids: HashSet<String> = (0..100).map(|_| generator.step_id()).collect();
        assert_eq!(ids.len(), 100);
        for id in &ids {
            assert!(is_valid_step_id(id), "unexpected step id shape: {id}");
        }
    }

    #[test]
    fn shape_check_rejects_malformed_ids() {
        assert!(!is_valid_step_id("deadbeef-0001-0203-0405-060708090a0b"));
        assert!(!is_valid_step_id("step-DEADBEEF-0001-0203-0405-060708090a0b"));
        assert!(!is_valid_step_id("step-dead-0001-0203-0405-060708090a0b"));
        assert!(!is_valid_step_id("step-deadbeef-0001-0203-0405"));
    }
}
