//! Identity checks run on a client's `IdentityAndVersion` submission:
//! name, protocol version and content packages, in that order.

use std::collections::HashSet;

use hullnet_protocol::{ContentPackageEntry, DisconnectReason, PeerDisconnectPacket};

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Characters that would break chat commands and log formatting.
const FORBIDDEN_NAME_CHARS: &[char] = &[';', ',', '<', '>', '/', '\\'];

/// Number of hash characters shown when naming a package.
const SHORT_HASH_LEN: usize = 7;

/// Strips control characters and surrounding whitespace.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Whether an already-sanitized name is acceptable.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_NAME_LEN
        && !name.contains(FORBIDDEN_NAME_CHARS)
}

/// Whether a client on `client` can join a server on `server`.
///
/// Dotted numeric versions are compatible when their first two components
/// agree ("1.2.0.0" joins "1.2.3.4"). Anything else must match exactly.
pub fn is_version_compatible(server: &str, client: &str) -> bool {
    match (major_minor(server), major_minor(client)) {
        (Some(s), Some(c)) => s == c,
        _ => server == client,
    }
}

fn major_minor(version: &str) -> Option<(u32, u32)> {
    let parts = version
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [major, minor, ..] => Some((*major, *minor)),
        _ => None,
    }
}

/// The disconnect packet for a version mismatch. Names both versions so
/// the player knows which side to update.
pub fn version_mismatch(server: &str, client: &str) -> PeerDisconnectPacket {
    PeerDisconnectPacket::with_message(
        DisconnectReason::InvalidVersion,
        format!("server version {server}, client version {client}"),
    )
}

/// Required packages the manifest lacks, in `required` order, each listed
/// once. A package matches only when both name and hash match.
pub fn missing_packages<'a>(
    required: &'a [ContentPackageEntry],
    manifest: &[ContentPackageEntry],
) -> Vec<&'a ContentPackageEntry> {
    let present: HashSet<&ContentPackageEntry> = manifest.iter().collect();
    let mut seen = HashSet::new();
    required
        .iter()
        .filter(|package| !present.contains(package))
        .filter(|package| seen.insert(*package))
        .collect()
}

/// `"Name" (hash abc1234)`
pub fn describe_package(package: &ContentPackageEntry) -> String {
    let short: String = package.hash.chars().take(SHORT_HASH_LEN).collect();
    format!("\"{}\" (hash {short})", package.name)
}

/// The disconnect packet for missing packages, or `None` if nothing is
/// missing. One missing package and several missing packages are worded
/// differently.
pub fn missing_packages_packet(missing: &[&ContentPackageEntry]) -> Option<PeerDisconnectPacket> {
    let message = match missing {
        [] => return None,
        [package] => format!(
            "missing content package {}, which the server requires",
            describe_package(package)
        ),
        many => {
            let list = many
                .iter()
                .map(|package| describe_package(package))
                .collect::<Vec<_>>()
                .join(", ");
            format!("missing {} content packages the server requires: {list}", many.len())
        }
    };
    Some(PeerDisconnectPacket::with_message(
        DisconnectReason::MissingContentPackage,
        message,
    ))
}
