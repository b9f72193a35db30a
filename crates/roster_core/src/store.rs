use std::{
    cell::RefCell,
    collections::{BTreeMap, HashSet},
    rc::Rc,
};

use chrono::NaiveDate;
use shared::{
    domain::{
        CollectionKind, EmailTemplate, Eligibility, EventProperty, Manager, Record, Role, Shift,
        Volunteer,
    },
    event::Event,
};
use storage::{CollectionStore, ImportSource};
use tracing::{debug, info, warn};

use crate::error::{PersistFailure, StoreError};

/// Change callback for one collection kind. Receives the store so it can
/// re-read the collection that changed.
pub type Observer<P> = Rc<dyn Fn(&AppStore<P>, CollectionKind)>;

#[derive(Debug, Clone, Default)]
pub struct Collections {
    volunteers: Vec<Volunteer>,
    roles: Vec<Role>,
    shifts: Vec<Shift>,
    managers: Vec<Manager>,
    event_properties: Vec<EventProperty>,
    email_template: EmailTemplate,
}

/// A collection the store holds as an ordered list and replaces wholesale.
pub trait Managed: Record {
    fn slot(collections: &Collections) -> &Vec<Self>;
    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self>;

    /// Rejects a candidate collection before anything changes.
    fn validate(_items: &[Self]) -> Result<(), String> {
        Ok(())
    }

    /// Normalisation applied to every element before it is stored.
    fn prepare(&mut self) {}

    /// Drops references to roles outside `roles`; returns whether any were dropped.
    fn retain_roles(&mut self, _roles: &[Role]) -> bool {
        false
    }
}

impl Managed for Volunteer {
    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.volunteers
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.volunteers
    }

    fn retain_roles(&mut self, roles: &[Role]) -> bool {
        Volunteer::retain_roles(self, roles)
    }
}

impl Managed for Role {
    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.roles
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.roles
    }

    fn validate(items: &[Self]) -> Result<(), String> {
        unique_names(items.iter().map(|role| role.name.as_str()))
    }
}

impl Managed for Shift {
    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.shifts
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.shifts
    }

    // Shift templates are stored open; assignment only happens on an Event.
    fn prepare(&mut self) {
        self.volunteer = None;
    }

    fn retain_roles(&mut self, roles: &[Role]) -> bool {
        Shift::retain_roles(self, roles)
    }
}

impl Managed for Manager {
    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.managers
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.managers
    }
}

impl Managed for EventProperty {
    fn slot(collections: &Collections) -> &Vec<Self> {
        &collections.event_properties
    }

    fn slot_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.event_properties
    }

    fn validate(items: &[Self]) -> Result<(), String> {
        unique_names(items.iter().map(|property| property.name.as_str()))
    }
}

/// Single source of truth for every roster collection.
///
/// Every mutation replaces a whole collection, persists it through the port
/// and then notifies the observers registered for that collection, all on
/// the calling thread. Replacing the roles cascades into volunteers and
/// shifts so that neither ever references a role outside the canonical set.
pub struct AppStore<P: CollectionStore> {
    port: P,
    policy: Eligibility,
    collections: RefCell<Collections>,
    observers: RefCell<BTreeMap<CollectionKind, Vec<Observer<P>>>>,
}

impl<P: CollectionStore> AppStore<P> {
    /// Loads every collection once. A collection that fails to load starts empty.
    pub fn open(port: P, policy: Eligibility) -> Self {
        let roles: Vec<Role> = load_or_empty(&port);
        let volunteers: Vec<Volunteer> = load_or_empty(&port);
        let mut shifts: Vec<Shift> = load_or_empty(&port);
        let managers: Vec<Manager> = load_or_empty(&port);
        let event_properties: Vec<EventProperty> = load_or_empty(&port);
        let email_template = load_or_empty::<EmailTemplate, P>(&port)
            .into_iter()
            .next()
            .unwrap_or_default();

        shifts.iter_mut().for_each(Managed::prepare);

        info!(
            volunteers = volunteers.len(),
            roles = roles.len(),
            shifts = shifts.len(),
            managers = managers.len(),
            event_properties = event_properties.len(),
            "roster store opened"
        );

        let store = Self {
            port,
            policy,
            collections: RefCell::new(Collections {
                volunteers,
                roles,
                shifts,
                managers,
                event_properties,
                email_template,
            }),
            observers: RefCell::new(BTreeMap::new()),
        };
        let (pruned_volunteers, pruned_shifts) = store.conform_to_roles();
        if pruned_volunteers + pruned_shifts > 0 {
            warn!(
                pruned_volunteers,
                pruned_shifts, "dropped stored references to unknown roles"
            );
        }
        store
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn policy(&self) -> Eligibility {
        self.policy
    }

    pub fn all<T: Managed>(&self) -> Vec<T> {
        T::slot(&self.collections.borrow()).clone()
    }

    pub fn volunteers(&self) -> Vec<Volunteer> {
        self.all()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.all()
    }

    pub fn shifts(&self) -> Vec<Shift> {
        self.all()
    }

    pub fn managers(&self) -> Vec<Manager> {
        self.all()
    }

    pub fn event_properties(&self) -> Vec<EventProperty> {
        self.all()
    }

    pub fn email_template(&self) -> EmailTemplate {
        self.collections.borrow().email_template.clone()
    }

    /// Registers `observer` for every later change to `kind`. Observers are
    /// never deduplicated or removed.
    pub fn observe(&self, kind: CollectionKind, observer: impl Fn(&Self, CollectionKind) + 'static) {
        self.observers
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(Rc::new(observer));
    }

    /// Replaces the canonical collection of `T`.
    ///
    /// Invalid input is rejected before anything changes; role references
    /// outside the canonical set are dropped. A persistence failure does not
    /// roll back the in-memory change nor suppress notifications; it is
    /// reported as [`StoreError::Persistence`], with one entry per collection
    /// (including cascaded ones) that failed to save.
    pub fn replace_all<T: Managed>(&self, mut items: Vec<T>) -> Result<(), StoreError> {
        {
            let collections = self.collections.borrow();
            T::validate(&items).map_err(|reason| {
                StoreError::InvalidArgument {
                    kind: T::KIND,
                    reason,
                }
            })?;
            let pruned = items
                .iter_mut()
                .map(|item| item.retain_roles(&collections.roles))
                .filter(|pruned| *pruned)
                .count();
            if pruned > 0 {
                debug!(collection = %T::KIND, pruned, "dropped references to unknown roles");
            }
        }
        items.iter_mut().for_each(Managed::prepare);

        StoreError::check(self.install(items))
    }

    /// Appends every element of `source` that the collection does not already
    /// contain. Returns how many were appended.
    pub fn import_and_merge<T, S>(&self, source: &S) -> Result<usize, StoreError>
    where
        T: Managed,
        S: ImportSource<T> + ?Sized,
    {
        let incoming = source.read_all().map_err(|source| StoreError::Import {
            kind: T::KIND,
            source,
        })?;

        let roles = self.roles();
        let mut merged = self.all::<T>();
        let existing = merged.len();
        for mut item in incoming {
            if item.retain_roles(&roles) {
                debug!(collection = %T::KIND, "import element referenced unknown roles");
            }
            item.prepare();
            if !merged.contains(&item) {
                merged.push(item);
            }
        }
        T::validate(&merged).map_err(|reason| StoreError::InvalidArgument {
            kind: T::KIND,
            reason,
        })?;

        let added = merged.len() - existing;
        info!(collection = %T::KIND, added, "merging import");
        StoreError::check(self.install(merged))?;
        Ok(added)
    }

    pub fn set_email_template(&self, template: EmailTemplate) -> Result<(), StoreError> {
        self.collections.borrow_mut().email_template = template;
        let saved = {
            let collections = self.collections.borrow();
            self.port
                .save_all(std::slice::from_ref(&collections.email_template))
        };
        StoreError::check(self.finish(CollectionKind::EmailTemplate, 1, saved).into_iter().collect())
    }

    /// A fresh event over the current shifts and event properties.
    pub fn new_event(&self, date: Option<NaiveDate>) -> Event {
        Event::new(date, self.shifts(), self.event_properties())
    }

    pub fn eligible_volunteers(&self, shift: &Shift) -> Vec<Volunteer> {
        self.collections
            .borrow()
            .volunteers
            .iter()
            .filter(|volunteer| shift.check_eligible(volunteer, self.policy).is_ok())
            .cloned()
            .collect()
    }

    /// Swaps in a validated collection, then persists and notifies. A new
    /// role set is applied to volunteers and shifts in memory first, so no
    /// observer ever sees a reference to a removed role; the three
    /// collections are then persisted and notified in turn.
    fn install<T: Managed>(&self, items: Vec<T>) -> Vec<PersistFailure> {
        *T::slot_mut(&mut self.collections.borrow_mut()) = items;
        if T::KIND != CollectionKind::Roles {
            return self.persist::<T>().into_iter().collect();
        }

        let (pruned_volunteers, pruned_shifts) = self.conform_to_roles();
        debug!(pruned_volunteers, pruned_shifts, "cascading role change");
        let mut failures: Vec<PersistFailure> = self.persist::<T>().into_iter().collect();
        failures.extend(self.persist::<Volunteer>());
        failures.extend(self.persist::<Shift>());
        failures
    }

    fn persist<T: Managed>(&self) -> Option<PersistFailure> {
        let (count, saved) = {
            let collections = self.collections.borrow();
            let items = T::slot(&collections);
            (items.len(), self.port.save_all(items))
        };
        self.finish(T::KIND, count, saved)
    }

    fn finish(
        &self,
        kind: CollectionKind,
        count: usize,
        saved: anyhow::Result<()>,
    ) -> Option<PersistFailure> {
        let failure = match saved {
            Ok(()) => {
                info!(collection = %kind, count, "collection replaced");
                None
            }
            Err(source) => {
                warn!(
                    collection = %kind,
                    error = %format!("{source:#}"),
                    "collection replaced in memory but not persisted"
                );
                Some(PersistFailure { kind, source })
            }
        };
        self.notify(kind);
        failure
    }

    fn notify(&self, kind: CollectionKind) {
        let observers: Vec<Observer<P>> = self
            .observers
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        debug!(collection = %kind, observers = observers.len(), "notifying observers");
        for observer in observers {
            observer(self, kind);
        }
    }

    // Volunteers and shifts are written back with every reference to a role
    // outside the canonical set dropped.
    fn conform_to_roles(&self) -> (usize, usize) {
        let mut collections = self.collections.borrow_mut();
        let Collections {
            roles,
            volunteers,
            shifts,
            ..
        } = &mut *collections;
        let roles: &[Role] = roles;
        let pruned_volunteers = volunteers
            .iter_mut()
            .map(|volunteer| volunteer.retain_roles(roles))
            .filter(|pruned| *pruned)
            .count();
        let pruned_shifts = shifts
            .iter_mut()
            .map(|shift| shift.retain_roles(roles))
            .filter(|pruned| *pruned)
            .count();
        (pruned_volunteers, pruned_shifts)
    }
}

fn load_or_empty<T: Record, P: CollectionStore>(port: &P) -> Vec<T> {
    match port.load_all::<T>() {
        Ok(items) => items,
        Err(err) => {
            warn!(collection = %T::KIND, error = %format!("{err:#}"), "load failed; starting empty");
            Vec::new()
        }
    }
}

fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), String> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(format!("duplicate name '{name}'"));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
