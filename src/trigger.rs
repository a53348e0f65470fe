use crate::marker::HandledMarker;
use crate::models::GitlabNote;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, trace};

fn parse_created_at(note: &GitlabNote) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&note.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Ids of notes that already have a marker-bearing reply somewhere in the thread.
pub fn handled_note_ids(notes: &[GitlabNote]) -> HashSet<i64> {
    notes
        .iter()
        .flat_map(|note| HandledMarker::decode_all(&note.body))
        .map(|marker| marker.note_id())
        .collect()
}

/// Finds the newest unanswered note that mentions `trigger_phrase`.
///
/// Notes are walked newest first. Unparseable timestamps sort as oldest and
/// equal timestamps fall back to the higher note id, so the choice never
/// depends on the order the API returned them in.
pub fn find_latest_trigger<'a>(
    notes: &'a [GitlabNote],
    trigger_phrase: &str,
) -> Option<&'a GitlabNote> {
    let normalized_trigger = trigger_phrase.trim().to_lowercase();
    if normalized_trigger.is_empty() {
        return None;
    }

    let handled = handled_note_ids(notes);
    if !handled.is_empty() {
        debug!(handled = ?handled, "Notes already answered");
    }

    let mut sorted: Vec<&GitlabNote> = notes.iter().collect();
    sorted.sort_by_key(|note| Reverse((parse_created_at(note), note.id)));

    sorted.into_iter().find(|note| {
        if note.body.is_empty() {
            return false;
        }
        if handled.contains(&note.id) {
            trace!(note_id = note.id, "Skipping note that was already handled");
            return false;
        }
        note.body.to_lowercase().contains(&normalized_trigger)
    })
}
