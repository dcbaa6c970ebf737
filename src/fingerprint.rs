use crate::source::VideoCandidate;

/// Sentinel used when a candidate has no peer identifier.
const UNKNOWN_PEER: &str = "unknown";

/// Derive the stable identifier for a video-bearing message.
///
/// Pure and total: missing peer, size or duration fall back to sentinel
/// values instead of failing, and the same substitution applies whether the
/// fingerprint is used for a dedup lookup or for recording an outcome. The
/// readable `peer_message` prefix keeps state files greppable; the md5
/// digest of the full composite guards against collisions.
pub fn fingerprint(candidate: &VideoCandidate) -> String {
    let peer = candidate
        .peer_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| UNKNOWN_PEER.to_string());
    let size = candidate.video_byte_size.unwrap_or(0);
    let duration = candidate.video_duration_seconds.unwrap_or(0.0).round() as i64;

    let composite = format!(
        "{}:{}:{}:{}:{}",
        peer,
        candidate.message_id,
        candidate.timestamp.timestamp(),
        size,
        duration
    );

    format!(
        "{}_{}_{:x}",
        peer,
        candidate.message_id,
        md5::compute(composite.as_bytes())
    )
}
