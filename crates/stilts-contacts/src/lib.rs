//! Contact descriptions and schedules for legged locomotion.
//!
//! A footstep planner produces [`PlannedContact`]s, grouped per contact name
//! into time-ordered [`ContactList`]s. A [`ContactPhaseList`] bundles the
//! lists of every contact and decomposes them into phases, maximal time
//! intervals over which the set of active contacts does not change.
//! Controllers sample these structures to decide which contacts carry load
//! at any given instant.
//!
//! [`DiscreteGeometryContact`] travels the other way: it describes a contact
//! surface through its corner points and carries the forces a controller
//! assigned to them.

pub mod contact;
pub mod phase_list;

pub use contact::{ContactCorner, DiscreteGeometryContact, PlannedContact};
pub use phase_list::{ContactList, ContactListError, ContactPhase, ContactPhaseList};
