//! Key builders for every coordination and cache entry.
//!
//! Redis implementations add the configured prefix on top of these.

use std::fmt::Display;

use uuid::Uuid;

// ── Coordination keys ──────────────────────────────────────

/// Mutual-exclusion key for a named resource.
pub fn lock(resource: &str) -> String {
    format!("lock:{resource}")
}

/// Lock resource serializing claim+persist for one section.
pub fn section_claim_resource(section_id: Uuid) -> String {
    format!("section:{section_id}")
}

/// Available-units counter for a section.
pub fn section_available(section_id: Uuid) -> String {
    format!("section:available:{section_id}")
}

/// Hash tag shared by every slot key of a section.
///
/// Redis Cluster hashes only the text inside `{}`, so one section's slot
/// records, index sets, owner sets and metadata land on the same node and
/// a single script may touch all of them.
fn section_tag(section_id: Uuid) -> String {
    format!("{{{section_id}}}")
}

/// Common prefix of every slot record in a section.
pub fn slot_prefix(section_id: Uuid) -> String {
    format!("slot:{}:", section_tag(section_id))
}

/// Record for one slot.
pub fn slot(section_id: Uuid, slot_id: u32) -> String {
    format!("{}{slot_id}", slot_prefix(section_id))
}

/// Set of slot ids in one status.
pub fn slot_index(section_id: Uuid, status: impl Display) -> String {
    format!("slot-index:{}:{status}", section_tag(section_id))
}

/// Section-level slot metadata.
pub fn slot_meta(section_id: Uuid) -> String {
    format!("slot-meta:{}", section_tag(section_id))
}

/// Common prefix of every owner index in a section.
pub fn slot_owner_prefix(section_id: Uuid) -> String {
    format!("slot-owner:{}:", section_tag(section_id))
}

/// Set of slot ids held by one reservation.
pub fn slot_owner(section_id: Uuid, reservation_id: Uuid) -> String {
    format!("{}{reservation_id}", slot_owner_prefix(section_id))
}

// ── Read-through cache keys ────────────────────────────────

/// Cached reservation row.
pub fn reservation(reservation_id: Uuid) -> String {
    format!("reservation:{reservation_id}")
}

/// Cached reservation list for a user, by status filter or `all`.
pub fn user_reservations(user_id: Uuid, status: Option<&str>) -> String {
    format!("user:{user_id}:reservations:{}", status.unwrap_or("all"))
}

/// Pattern matching every cached list of a user.
pub fn user_reservations_pattern(user_id: Uuid) -> String {
    format!("user:{user_id}:reservations:*")
}

/// Cached section availability.
pub fn section(section_id: Uuid) -> String {
    format!("section:{section_id}")
}

/// Cached list of open sections with availability.
pub fn sections_available() -> String {
    "sections:available".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordination_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            section_available(id),
            "section:available:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            slot(id, 7),
            "slot:{00000000-0000-0000-0000-000000000000}:7"
        );
        assert_eq!(
            slot_index(id, "claimed"),
            "slot-index:{00000000-0000-0000-0000-000000000000}:claimed"
        );
        assert_eq!(lock("section:x"), "lock:section:x");
    }

    #[test]
    fn test_section_slot_keys_share_hash_tag() {
        let id = Uuid::new_v4();
        let tag = format!("{{{id}}}");
        for key in [
            slot(id, 3),
            slot_index(id, "available"),
            slot_meta(id),
            slot_owner(id, Uuid::new_v4()),
        ] {
            assert_eq!(key.matches('{').count(), 1, "{key}");
            assert!(key.contains(&tag), "{key}");
        }
    }

    #[test]
    fn test_user_list_keys_share_pattern_prefix() {
        let user = Uuid::new_v4();
        let pattern = user_reservations_pattern(user);
        let prefix = pattern.trim_end_matches('*');
        assert!(user_reservations(user, None).starts_with(prefix));
        assert!(user_reservations(user, Some("pending")).starts_with(prefix));
    }
}
