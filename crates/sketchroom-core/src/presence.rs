//! Ephemeral per-user presence and the room roster.

use std::collections::HashMap;

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// One participant's ephemeral state, replaced wholesale on every
/// update. Partial updates are a protocol violation by the peer, not a
/// supported feature, so there is no merge path.
///
/// Updates carry no sequence number; arrival order wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    /// Display color as a hex string, e.g. `#ff8800`.
    #[serde(default)]
    pub color_hex: String,
    /// Cursor position on the board, if the pointer is over it.
    #[serde(default)]
    pub cursor: Option<Point>,
    #[serde(default)]
    pub is_drawing: bool,
    #[serde(default)]
    pub selected_tool: String,
    #[serde(default)]
    pub stroke_size: f64,
    /// Active stroke color, packed ARGB.
    #[serde(default)]
    pub stroke_color: u32,
    /// Last activity, milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_seen: i64,
    /// Set on the final update a user sends when leaving the room.
    #[serde(default, skip_serializing_if = "is_false")]
    pub left: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Presence {
    /// A minimal presence for a user, with everything else defaulted.
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            color_hex: String::new(),
            cursor: None,
            is_drawing: false,
            selected_tool: String::new(),
            stroke_size: 0.0,
            stroke_color: 0,
            last_seen: 0,
            left: false,
        }
    }

    /// The parting update broadcast on leave.
    pub fn leaving(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            left: true,
            ..Self::new(user_id, user_name)
        }
    }
}

/// Roster change synthesized from a presence update.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Joined(Presence),
    /// Carries the last-known presence of the departed user.
    Left(Presence),
}

/// Roster of remote participants, keyed by user id.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    peers: HashMap<String, Presence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a full-replacement update, returning the roster change it
    /// caused. Plain refreshes of a known user yield no event.
    pub fn apply(&mut self, update: Presence) -> Option<PresenceEvent> {
        if update.left {
            return self.peers.remove(&update.user_id).map(PresenceEvent::Left);
        }
        let newly_joined = !self.peers.contains_key(&update.user_id);
        self.peers.insert(update.user_id.clone(), update.clone());
        newly_joined.then_some(PresenceEvent::Joined(update))
    }

    pub fn get(&self, user_id: &str) -> Option<&Presence> {
        self.peers.get(user_id)
    }

    /// All known participants, in no particular order.
    pub fn peers(&self) -> impl Iterator<Item = &Presence> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop the whole roster (used when leaving a room).
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(user_id: &str, cursor: Point) -> Presence {
        Presence {
            cursor: Some(cursor),
            ..Presence::new(user_id, user_id.to_uppercase())
        }
    }

    #[test]
    fn test_join_update_leave_event_order() {
        let mut tracker = PresenceTracker::new();
        let mut events = Vec::new();

        events.extend(tracker.apply(update("u1", Point::new(10.0, 10.0))));
        events.extend(tracker.apply(update("u1", Point::new(20.0, 20.0))));
        events.extend(tracker.apply(Presence::leaving("u1", "U1")));

        // one joined and one left, in that order; the refresh is silent
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], PresenceEvent::Joined(p) if p.user_id == "u1"));
        match &events[1] {
            PresenceEvent::Left(last_known) => {
                assert_eq!(last_known.cursor, Some(Point::new(20.0, 20.0)));
            }
            other => panic!("expected Left, got {other:?}"),
        }
        assert!(tracker.is_empty());
        assert!(tracker.get("u1").is_none());
    }

    #[test]
    fn test_leave_for_unknown_user_is_silent() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(tracker.apply(Presence::leaving("ghost", "")), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let mut tracker = PresenceTracker::new();

        let mut first = update("u1", Point::new(1.0, 1.0));
        first.is_drawing = true;
        tracker.apply(first);

        // the next update omits is_drawing, which therefore resets
        tracker.apply(update("u1", Point::new(2.0, 2.0)));
        let stored = tracker.get("u1").unwrap();
        assert!(!stored.is_drawing);
        assert_eq!(stored.cursor, Some(Point::new(2.0, 2.0)));
    }

    #[test]
    fn test_wire_field_names() {
        let mut presence = update("u1", Point::new(3.0, 4.0));
        presence.color_hex = "#ff8800".to_string();
        presence.selected_tool = "pen".to_string();
        presence.last_seen = 1_700_000_000_000;

        let json = serde_json::to_string(&presence).unwrap();
        assert!(json.contains(r#""userId":"u1""#));
        assert!(json.contains(r##""colorHex":"#ff8800""##));
        assert!(json.contains(r#""selectedTool":"pen""#));
        assert!(json.contains(r#""lastSeen":1700000000000"#));
        assert!(json.contains(r#""isDrawing":false"#));
        // the left flag only appears on parting updates
        assert!(!json.contains("left"));
        assert!(serde_json::to_string(&Presence::leaving("u1", "")).unwrap().contains(r#""left":true"#));
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let presence: Presence = serde_json::from_str(r#"{"userId":"u9"}"#).unwrap();
        assert_eq!(presence.user_id, "u9");
        assert_eq!(presence.cursor, None);
        assert!(!presence.left);

        // identity is the one field that cannot be defaulted
        assert!(serde_json::from_str::<Presence>(r#"{"cursor":{"x":1.0,"y":2.0}}"#).is_err());
    }
}
