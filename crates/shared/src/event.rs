//! Transient event assembled for one email: a date, the shift slots and
//! the values chosen for each event property.

use chrono::NaiveDate;

use crate::{
    domain::{Eligibility, EventProperty, Shift, Volunteer},
    error::AssignError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPropertyValue {
    pub property: EventProperty,
    pub value: String,
}

impl EventPropertyValue {
    pub fn with_default(property: EventProperty) -> Self {
        let value = property.default_value.clone();
        Self { property, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    pub date: Option<NaiveDate>,
    pub shifts: Vec<Shift>,
    pub properties: Vec<EventPropertyValue>,
}

impl Event {
    pub fn new(
        date: Option<NaiveDate>,
        shifts: Vec<Shift>,
        properties: impl IntoIterator<Item = EventProperty>,
    ) -> Self {
        Self {
            date,
            shifts,
            properties: properties
                .into_iter()
                .map(EventPropertyValue::with_default)
                .collect(),
        }
    }

    pub fn assign(
        &mut self,
        shift_index: usize,
        volunteer: Volunteer,
        policy: Eligibility,
    ) -> Result<(), AssignError> {
        let len = self.shifts.len();
        let shift = self
            .shifts
            .get_mut(shift_index)
            .ok_or(AssignError::ShiftOutOfRange {
                index: shift_index,
                len,
            })?;
        shift.assign(volunteer, policy)?;
        Ok(())
    }

    pub fn unassign(&mut self, shift_index: usize) -> Result<Option<Volunteer>, AssignError> {
        let len = self.shifts.len();
        self.shifts
            .get_mut(shift_index)
            .map(Shift::unassign)
            .ok_or(AssignError::ShiftOutOfRange {
                index: shift_index,
                len,
            })
    }

    pub fn set_property_value(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), AssignError> {
        let entry = self
            .properties
            .iter_mut()
            .find(|entry| entry.property.name == name)
            .ok_or_else(|| AssignError::UnknownProperty {
                name: name.to_string(),
            })?;
        entry.value = value.into();
        Ok(())
    }

    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|entry| entry.property.name == name)
            .map(|entry| entry.value.as_str())
    }

    pub fn assigned_volunteers(&self) -> impl Iterator<Item = &Volunteer> {
        self.shifts.iter().filter_map(|shift| shift.volunteer.as_ref())
    }
}
