//! Platform/software fingerprint matching feeding the `Platform` launch
//! condition (spec §4.3): a fingerprint hit on any of a platform's known
//! software tags counts as the platform being present.

use sukyan_types::PlatformDefinition;

/// Returns the names of every platform whose software list overlaps the
/// tags detected for the target (case-insensitive).
pub fn matching_platforms(platforms: &[PlatformDefinition], detected_tags: &[String]) -> Vec<String> {
    platforms
        .iter()
        .filter(|platform| {
            platform
                .software
                .iter()
                .any(|software| detected_tags.iter().any(|tag| tag.eq_ignore_ascii_case(software)))
        })
        .map(|platform| platform.name.clone())
        .collect()
}
