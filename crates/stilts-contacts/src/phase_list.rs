//! Ordered contact lists and their phase decomposition.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::contact::PlannedContact;

/// Errors raised while building contact lists.
#[derive(Debug, Error)]
pub enum ContactListError {
    #[error("Contact window is empty or reversed: activation {activation} >= deactivation {deactivation}")]
    EmptyWindow { activation: f64, deactivation: f64 },
    #[error("Contact '{name}' overlaps an existing window at [{activation}, {deactivation})")]
    Overlap {
        name: String,
        activation: f64,
        deactivation: f64,
    },
}

/// Time-ordered, non-overlapping planned contacts sharing one contact name.
#[derive(Clone, Debug, Default)]
pub struct ContactList {
    contacts: Vec<PlannedContact>,
}

impl ContactList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a contact keeping the list ordered by activation time.
    ///
    /// Rejects degenerate windows and any overlap with an existing window.
    pub fn add(&mut self, contact: PlannedContact) -> Result<(), ContactListError> {
        if contact.deactivation_time <= contact.activation_time {
            return Err(ContactListError::EmptyWindow {
                activation: contact.activation_time,
                deactivation: contact.deactivation_time,
            });
        }
        for existing in &self.contacts {
            let overlaps = contact.activation_time < existing.deactivation_time
                && existing.activation_time < contact.deactivation_time;
            if overlaps {
                return Err(ContactListError::Overlap {
                    name: contact.name.clone(),
                    activation: contact.activation_time,
                    deactivation: contact.deactivation_time,
                });
            }
        }
        let index = self
            .contacts
            .partition_point(|c| c.activation_time < contact.activation_time);
        self.contacts.insert(index, contact);
        Ok(())
    }

    /// The contacts ordered by activation time.
    pub fn contacts(&self) -> &[PlannedContact] {
        &self.contacts
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedContact> {
        self.contacts.iter()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// The contact whose window covers `time`, if any.
    pub fn active_at(&self, time: f64) -> Option<&PlannedContact> {
        self.contacts.iter().find(|c| c.is_active_at(time))
    }

    /// The earliest contact activating strictly after `time`.
    pub fn next_after(&self, time: f64) -> Option<&PlannedContact> {
        self.contacts.iter().find(|c| c.activation_time > time)
    }

    /// The contact covering `time`, else the next upcoming one, else the
    /// last past one. `None` only when the list is empty.
    pub fn nearest(&self, time: f64) -> Option<&PlannedContact> {
        self.active_at(time)
            .or_else(|| self.next_after(time))
            .or_else(|| self.contacts.last())
    }
}

impl<'a> IntoIterator for &'a ContactList {
    type Item = &'a PlannedContact;
    type IntoIter = std::slice::Iter<'a, PlannedContact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.iter()
    }
}

/// A maximal time interval over which the set of active contacts is constant.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactPhase {
    /// Phase start (s), inclusive.
    pub begin_time: f64,
    /// Phase end (s), exclusive.
    pub end_time: f64,
    /// Names of the contacts active during the phase, sorted.
    pub active_contacts: Vec<String>,
}

/// Per-contact planned-contact lists with their phase decomposition.
///
/// Phases cover the span from the earliest activation to the latest
/// deactivation; intervals where no contact is active (flight) are kept as
/// phases with an empty active set.
#[derive(Clone, Debug, Default)]
pub struct ContactPhaseList {
    lists: BTreeMap<String, ContactList>,
    phases: Vec<ContactPhase>,
}

impl ContactPhaseList {
    /// Build from per-contact lists, computing the phase decomposition.
    pub fn from_lists(lists: BTreeMap<String, ContactList>) -> Self {
        let mut boundaries: Vec<f64> = lists
            .values()
            .flat_map(|list| {
                list.iter()
                    .flat_map(|c| [c.activation_time, c.deactivation_time])
            })
            .collect();
        boundaries.sort_by(f64::total_cmp);
        boundaries.dedup();

        let mut phases = Vec::new();
        for window in boundaries.windows(2) {
            let (begin, end) = (window[0], window[1]);
            let active_contacts: Vec<String> = lists
                .iter()
                .filter(|(_, list)| list.active_at(begin).is_some())
                .map(|(name, _)| name.clone())
                .collect();
            phases.push(ContactPhase {
                begin_time: begin,
                end_time: end,
                active_contacts,
            });
        }

        Self { lists, phases }
    }

    /// The per-contact lists, keyed by contact name.
    pub fn lists(&self) -> &BTreeMap<String, ContactList> {
        &self.lists
    }

    /// The list for `name`, if present.
    pub fn list(&self, name: &str) -> Option<&ContactList> {
        self.lists.get(name)
    }

    /// The phase decomposition, ordered by time.
    pub fn phases(&self) -> &[ContactPhase] {
        &self.phases
    }

    /// True when no contact is planned at all.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// The phase covering `time` (begin inclusive, end exclusive).
    pub fn phase_at(&self, time: f64) -> Option<&ContactPhase> {
        self.phases
            .iter()
            .find(|p| time >= p.begin_time && time < p.end_time)
    }
}
