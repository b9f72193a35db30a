use super::*;
use anyhow::anyhow;
use shared::{domain::SendType, error::AssignError};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};
use storage::ImportError;

#[derive(Default)]
struct MemoryPort {
    collections: RefCell<HashMap<CollectionKind, serde_json::Value>>,
    save_log: RefCell<Vec<CollectionKind>>,
    fail_saves: Cell<bool>,
    fail_loads: Cell<bool>,
}

impl MemoryPort {
    fn seed<T: Record>(self, items: &[T]) -> Self {
        self.collections
            .borrow_mut()
            .insert(T::KIND, serde_json::to_value(items).expect("encode"));
        self
    }

    fn stored<T: Record>(&self) -> Vec<T> {
        self.collections
            .borrow()
            .get(&T::KIND)
            .map(|value| serde_json::from_value(value.clone()).expect("decode"))
            .unwrap_or_default()
    }

    fn saves(&self) -> Vec<CollectionKind> {
        self.save_log.borrow().clone()
    }
}

impl CollectionStore for MemoryPort {
    fn load_all<T: Record>(&self) -> anyhow::Result<Vec<T>> {
        if self.fail_loads.get() {
            return Err(anyhow!("disk unavailable"));
        }
        Ok(self.stored())
    }

    fn save_all<T: Record>(&self, items: &[T]) -> anyhow::Result<()> {
        self.save_log.borrow_mut().push(T::KIND);
        if self.fail_saves.get() {
            return Err(anyhow!("disk full"));
        }
        self.collections
            .borrow_mut()
            .insert(T::KIND, serde_json::to_value(items)?);
        Ok(())
    }
}

struct RejectingSource;

impl<T> ImportSource<T> for RejectingSource {
    fn read_all(&self) -> Result<Vec<T>, ImportError> {
        Err(ImportError::NullElement { index: 1 })
    }
}

fn lead() -> Role {
    Role::new("Lead")
}

fn cook() -> Role {
    Role::new("Cook")
}

fn open(port: MemoryPort) -> AppStore<MemoryPort> {
    AppStore::open(port, Eligibility::RolesAndActive)
}

fn record_kinds(
    store: &AppStore<MemoryPort>,
    kinds: &[CollectionKind],
) -> Rc<RefCell<Vec<CollectionKind>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    for kind in kinds {
        let seen = seen.clone();
        store.observe(*kind, move |_, changed| seen.borrow_mut().push(changed));
    }
    seen
}

#[test]
fn replace_then_read_returns_same_content_in_order() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead(), cook()]).expect("roles");
    let volunteers = vec![
        Volunteer::new("Zed").with_roles([cook()]),
        Volunteer::new("Ann").with_roles([lead(), cook()]),
    ];
    store.replace_all(volunteers.clone()).expect("volunteers");
    let managers = vec![Manager::new("Mo", "mo@example.org")];
    store.replace_all(managers.clone()).expect("managers");
    let properties = vec![EventProperty::new("Location", "Hall")];
    store.replace_all(properties.clone()).expect("properties");

    assert_eq!(store.roles(), vec![lead(), cook()]);
    assert_eq!(store.volunteers(), volunteers);
    assert_eq!(store.managers(), managers);
    assert_eq!(store.event_properties(), properties);
    assert_eq!(store.port().stored::<Volunteer>(), volunteers);
}

#[test]
fn shifts_are_stored_without_assigned_volunteers() {
    let store = open(MemoryPort::default());
    let mut shift = Shift::new("Gate");
    shift.volunteer = Some(Volunteer::new("Ann"));

    store.replace_all(vec![shift.clone()]).expect("shifts");

    assert_eq!(store.shifts(), vec![shift.cleared()]);
    assert!(store.port().stored::<Shift>()[0].volunteer.is_none());
}

#[test]
fn returned_collections_are_independent_copies() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead()]).expect("roles");
    store
        .replace_all(vec![Volunteer::new("Ann").with_roles([lead()])])
        .expect("volunteers");

    let mut copy = store.volunteers();
    copy[0].name = "Mallory".to_string();
    copy[0].roles.clear();
    copy.push(Volunteer::new("Eve"));

    assert_eq!(
        store.volunteers(),
        vec![Volunteer::new("Ann").with_roles([lead()])]
    );
}

#[test]
fn removing_a_role_prunes_volunteers_and_shifts() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead(), cook()]).expect("roles");
    store
        .replace_all(vec![
            Volunteer::new("Ann").with_roles([lead(), cook()]),
            Volunteer::new("Bob").with_roles([lead()]),
        ])
        .expect("volunteers");
    store
        .replace_all(vec![Shift::new("Kitchen").with_roles([cook(), lead()])])
        .expect("shifts");
    let before = store.port().saves().len();

    store.replace_all(vec![cook()]).expect("roles");

    let roles = store.roles();
    assert!(store
        .volunteers()
        .iter()
        .all(|volunteer| volunteer.roles.iter().all(|role| roles.contains(role))));
    assert_eq!(store.volunteers()[0].roles, vec![cook()]);
    assert!(store.volunteers()[1].roles.is_empty());
    assert_eq!(store.shifts()[0].roles, vec![cook()]);
    assert_eq!(store.port().stored::<Shift>()[0].roles, vec![cook()]);
    assert_eq!(
        store.port().saves()[before..],
        [
            CollectionKind::Roles,
            CollectionKind::Volunteers,
            CollectionKind::Shifts
        ]
    );
}

#[test]
fn cascade_notifies_each_collection_in_order() {
    let store = open(MemoryPort::default());
    let seen = record_kinds(
        &store,
        &[
            CollectionKind::Shifts,
            CollectionKind::Volunteers,
            CollectionKind::Roles,
        ],
    );

    store.replace_all(vec![lead()]).expect("roles");

    assert_eq!(
        *seen.borrow(),
        vec![
            CollectionKind::Roles,
            CollectionKind::Volunteers,
            CollectionKind::Shifts
        ]
    );
}

#[test]
fn every_observer_fires_once_in_registration_order() {
    let store = open(MemoryPort::default());
    let calls = Rc::new(RefCell::new(Vec::new()));
    for id in 0..3 {
        let calls = calls.clone();
        store.observe(CollectionKind::Managers, move |_, _| calls.borrow_mut().push(id));
    }
    let untouched = record_kinds(&store, &[CollectionKind::Volunteers]);

    store
        .replace_all(vec![Manager::new("Mo", "mo@example.org")])
        .expect("managers");

    assert_eq!(*calls.borrow(), vec![0, 1, 2]);
    assert!(untouched.borrow().is_empty());
}

#[test]
fn observers_are_not_deduplicated() {
    let store = open(MemoryPort::default());
    let count = Rc::new(Cell::new(0));
    let observer: Observer<MemoryPort> = {
        let count = count.clone();
        Rc::new(move |_: &AppStore<MemoryPort>, _: CollectionKind| {
            count.set(count.get() + 1)
        })
    };
    for _ in 0..2 {
        let observer = observer.clone();
        store.observe(CollectionKind::Roles, move |store, kind| observer(store, kind));
    }

    store.replace_all(vec![lead()]).expect("roles");
    assert_eq!(count.get(), 2);
}

#[test]
fn observers_can_reread_and_mutate_the_store() {
    let store = open(MemoryPort::default());
    let observed = Rc::new(RefCell::new(Vec::new()));
    {
        let observed = observed.clone();
        store.observe(CollectionKind::Roles, move |store, _| {
            observed.borrow_mut().push(store.roles().len());
        });
    }
    store.observe(CollectionKind::Managers, |store, _| {
        if store.event_properties().is_empty() {
            store
                .replace_all(vec![EventProperty::new("Location", "Hall")])
                .expect("nested replace");
        }
    });

    store.replace_all(vec![lead(), cook()]).expect("roles");
    store.replace_all(Vec::<Manager>::new()).expect("managers");

    assert_eq!(*observed.borrow(), vec![2]);
    assert_eq!(store.event_properties().len(), 1);
}

#[test]
fn persistence_failure_keeps_edit_and_still_notifies() {
    let port = MemoryPort::default().seed(&[lead()]);
    port.fail_saves.set(true);
    let store = open(port);
    let seen = record_kinds(&store, &[CollectionKind::Roles, CollectionKind::Shifts]);

    let err = store.replace_all(vec![cook()]).expect_err("saves fail");

    let failed: Vec<CollectionKind> = err
        .persistence_failures()
        .iter()
        .map(|failure| failure.kind)
        .collect();
    assert_eq!(
        failed,
        vec![
            CollectionKind::Roles,
            CollectionKind::Volunteers,
            CollectionKind::Shifts
        ]
    );
    assert!(err.to_string().contains("disk full"));
    assert_eq!(store.roles(), vec![cook()]);
    assert_eq!(
        *seen.borrow(),
        vec![CollectionKind::Roles, CollectionKind::Shifts]
    );

    store.port().fail_saves.set(false);
    store.replace_all(vec![cook()]).expect("retry succeeds");
    assert_eq!(store.port().stored::<Role>(), vec![cook()]);
}

#[test]
fn invalid_collections_are_rejected_before_any_change() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead()]).expect("roles");
    let seen = record_kinds(
        &store,
        &[
            CollectionKind::Roles,
            CollectionKind::Volunteers,
            CollectionKind::Shifts,
            CollectionKind::EventProperties,
        ],
    );
    let saves = store.port().saves().len();

    assert!(matches!(
        store.replace_all(vec![cook(), cook()]),
        Err(StoreError::InvalidArgument {
            kind: CollectionKind::Roles,
            ..
        })
    ));
    assert!(matches!(
        store.replace_all(vec![
            EventProperty::new("Location", "a"),
            EventProperty::new("Location", "b")
        ]),
        Err(StoreError::InvalidArgument { .. })
    ));

    assert_eq!(store.roles(), vec![lead()]);
    assert_eq!(store.port().saves().len(), saves);
    assert!(seen.borrow().is_empty());
}

#[test]
fn load_failure_starts_with_empty_collections() {
    let port = MemoryPort::default().seed(&[lead()]);
    port.fail_loads.set(true);
    let store = open(port);

    assert!(store.roles().is_empty());
    assert!(store.volunteers().is_empty());
    assert_eq!(store.email_template(), EmailTemplate::default());
}

#[test]
fn opening_conforms_stored_data_to_stored_roles() {
    let mut assigned = Shift::new("Gate").with_roles([lead(), Role::new("Ghost")]);
    assigned.volunteer = Some(Volunteer::new("Ann"));
    let port = MemoryPort::default()
        .seed(&[lead()])
        .seed(&[Volunteer::new("Ann").with_roles([Role::new("Ghost"), lead()])])
        .seed(&[assigned]);

    let store = open(port);

    assert_eq!(store.volunteers()[0].roles, vec![lead()]);
    assert_eq!(store.shifts()[0].roles, vec![lead()]);
    assert!(store.shifts()[0].volunteer.is_none());
}

#[test]
fn import_appends_only_new_volunteers() {
    let store = open(MemoryPort::default());
    store
        .replace_all(vec![Volunteer::new("Ann")])
        .expect("volunteers");
    let seen = record_kinds(&store, &[CollectionKind::Volunteers]);

    let added = store
        .import_and_merge::<Volunteer, _>(&vec![
            Volunteer::new("Ann"),
            Volunteer::new("Bob"),
            Volunteer::new("Bob"),
        ])
        .expect("import");

    assert_eq!(added, 1);
    assert_eq!(
        store.volunteers(),
        vec![Volunteer::new("Ann"), Volunteer::new("Bob")]
    );
    assert_eq!(store.port().stored::<Volunteer>().len(), 2);
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn import_drops_roles_outside_canonical_set() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead()]).expect("roles");

    store
        .import_and_merge::<Volunteer, _>(&vec![Volunteer::new("Ann").with_roles([lead(), cook()])])
        .expect("import");

    assert_eq!(store.volunteers()[0].roles, vec![lead()]);
}

#[test]
fn rejected_import_leaves_store_untouched() {
    let store = open(MemoryPort::default());
    store
        .replace_all(vec![Volunteer::new("Ann")])
        .expect("volunteers");
    let saves = store.port().saves().len();

    let err = store
        .import_and_merge::<Volunteer, _>(&RejectingSource)
        .expect_err("null element");

    assert!(matches!(
        err,
        StoreError::Import {
            kind: CollectionKind::Volunteers,
            source: ImportError::NullElement { index: 1 }
        }
    ));
    assert_eq!(store.volunteers(), vec![Volunteer::new("Ann")]);
    assert_eq!(store.port().saves().len(), saves);
}

#[test]
fn blank_names_round_trip() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![Role::new("")]).expect("blank role");
    assert_eq!(store.roles(), vec![Role::new("")]);

    store
        .import_and_merge::<Role, _>(&vec![Role::new(""), lead()])
        .expect("import");
    assert_eq!(store.roles(), vec![Role::new(""), lead()]);
}

#[test]
fn replacing_with_unknown_roles_keeps_only_canonical_ones() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead()]).expect("roles");

    store
        .replace_all(vec![Volunteer::new("Ann").with_roles([cook(), lead()])])
        .expect("volunteers");
    store
        .replace_all(vec![Shift::new("Kitchen").with_roles([cook()])])
        .expect("shifts");

    assert_eq!(store.volunteers()[0].roles, vec![lead()]);
    assert_eq!(store.port().stored::<Volunteer>()[0].roles, vec![lead()]);
    assert!(store.shifts()[0].roles.is_empty());
}

#[test]
fn role_observers_see_conformed_dependents_and_can_resave_them() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead(), cook()]).expect("roles");
    store
        .replace_all(vec![Volunteer::new("Ann").with_roles([lead(), cook()])])
        .expect("volunteers");
    store
        .replace_all(vec![Shift::new("Kitchen").with_roles([cook()])])
        .expect("shifts");

    let stale = Rc::new(Cell::new(false));
    let resaved = Rc::new(RefCell::new(None));
    {
        let stale = stale.clone();
        let resaved = resaved.clone();
        store.observe(CollectionKind::Roles, move |store, _| {
            let roles = store.roles();
            let references_unknown = store
                .volunteers()
                .iter()
                .flat_map(|volunteer| volunteer.roles.clone())
                .chain(store.shifts().iter().flat_map(|shift| shift.roles.clone()))
                .any(|role| !roles.contains(&role));
            stale.set(stale.get() || references_unknown);
            if resaved.borrow().is_none() {
                let outcome = store.replace_all(store.volunteers()).is_ok();
                *resaved.borrow_mut() = Some(outcome);
            }
        });
    }

    store.replace_all(vec![lead()]).expect("drop cook");

    assert!(!stale.get());
    assert_eq!(*resaved.borrow(), Some(true));
    assert_eq!(store.volunteers()[0].roles, vec![lead()]);
    assert_eq!(store.port().stored::<Volunteer>()[0].roles, vec![lead()]);
}

#[test]
fn email_template_is_persisted_and_observed() {
    let store = open(MemoryPort::default());
    let seen = record_kinds(&store, &[CollectionKind::EmailTemplate]);
    let template = EmailTemplate::new(SendType::Cc, "Hi", "Bye", "Shifts {date}", "%d/%m");

    store
        .set_email_template(template.clone())
        .expect("template");

    assert_eq!(store.email_template(), template);
    assert_eq!(store.port().stored::<EmailTemplate>(), vec![template]);
    assert_eq!(*seen.borrow(), vec![CollectionKind::EmailTemplate]);

    let reopened = open(MemoryPort::default().seed(&store.port().stored::<EmailTemplate>()));
    assert_eq!(reopened.email_template().send_type, SendType::Cc);
}

#[test]
fn assignment_requires_every_shift_role() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead()]).expect("roles");
    store
        .replace_all(vec![Shift::new("Gate").with_roles([lead()])])
        .expect("shifts");
    store
        .replace_all(vec![Volunteer::new("Ann")])
        .expect("volunteers");

    let mut event = store.new_event(None);
    let ann = store.volunteers()[0].clone();
    assert!(matches!(
        event.assign(0, ann, store.policy()),
        Err(AssignError::Ineligible(_))
    ));

    store
        .replace_all(vec![Volunteer::new("Ann").with_roles([lead()])])
        .expect("grant role");
    let ann = store.volunteers()[0].clone();
    event.assign(0, ann, store.policy()).expect("now eligible");
    assert!(store.shifts()[0].volunteer.is_none());
}

#[test]
fn eligible_volunteers_respect_roles_and_activity() {
    let store = open(MemoryPort::default());
    store.replace_all(vec![lead()]).expect("roles");
    let mut idle = Volunteer::new("Cy").with_roles([lead()]);
    idle.active = false;
    store
        .replace_all(vec![
            Volunteer::new("Ann"),
            idle,
            Volunteer::new("Dee").with_roles([lead()]),
        ])
        .expect("volunteers");

    let shift = Shift::new("Gate").with_roles([lead()]);
    let names: Vec<String> = store
        .eligible_volunteers(&shift)
        .into_iter()
        .map(|volunteer| volunteer.name)
        .collect();
    assert_eq!(names, vec!["Dee".to_string()]);

    let relaxed = AppStore::open(MemoryPort::default(), Eligibility::RolesOnly);
    assert_eq!(relaxed.policy(), Eligibility::RolesOnly);
}
