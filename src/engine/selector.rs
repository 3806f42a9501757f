//! Sprite collection selection.
//!
//! Resolves a state collection (idle/talk/thinking) to one concrete sprite
//! according to its selection behavior. The selector is a pure function: it
//! never mutates the collection it is given. Under `List` behavior with
//! `advance`, the rotated state comes back as a new collection value and the
//! caller owns persisting it — the scheduler keeps its own rotation cursor
//! for exactly this purpose.
//!
//! Entries are sorted by `order` before any indexing, so host storage order
//! never leaks into selection.

use rand::Rng;

use crate::defs::{CollectionEntry, EntryRole, SelectionBehavior, StateSpriteCollection};

/// One selected sprite, plus the rotated collection when `advance` applied.
#[derive(Debug, Clone)]
pub struct Selection {
    pub sprite_url: String,
    pub sprite_label: String,
    /// Present only when a `List` selection advanced the index; the caller is
    /// responsible for persisting it.
    pub updated: Option<StateSpriteCollection>,
}

/// Select from `collection` using a thread-local RNG.
pub fn select(collection: &StateSpriteCollection, advance: bool) -> Option<Selection> {
    select_with_rng(collection, advance, &mut rand::thread_rng())
}

/// Select from `collection` with a provided RNG.
///
/// Useful for reproducible testing of `Random` behavior.
pub fn select_with_rng<R: Rng>(collection: &StateSpriteCollection, advance: bool, rng: &mut R) -> Option<Selection> {
    if collection.entries.is_empty() {
        return None;
    }
    let mut ordered: Vec<&CollectionEntry> = collection.entries.iter().collect();
    ordered.sort_by_key(|e| e.order);

    let (entry, updated) = match collection.behavior {
        SelectionBehavior::Principal => {
            let entry = ordered.iter().find(|e| e.role == EntryRole::Principal).copied().unwrap_or(ordered[0]);
            (entry, None)
        }
        SelectionBehavior::Random => (ordered[rng.gen_range(0..ordered.len())], None),
        SelectionBehavior::List => {
            let index = collection.current_index % ordered.len();
            let entry = ordered[index];
            let updated = advance.then(|| {
                let mut next = collection.clone();
                next.current_index = (index + 1) % ordered.len();
                next
            });
            (entry, updated)
        }
    };

    Some(Selection { sprite_url: entry.sprite_url.clone(), sprite_label: entry.sprite_label.clone(), updated })
}
