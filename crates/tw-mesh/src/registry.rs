//! Typed per-entity extension registry.
//!
//! Every transport model attaches its own record type to each DOF (or
//! element) it works on. Records live in a small arena per entity; each
//! entity also keeps a slot table indexed by the extension *kind*, a dense
//! number handed out once per record type by [`ExtensionRegistry::register`].
//!
//! Lookups through an [`ExtKind`] handle are two array indexes plus a type
//! check, so the hot element loop never hashes. The slot table is filled
//! per entity at attach time, which means entities may attach their records
//! in any order: nothing assumes that a given type sits at the same arena
//! position on every entity.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use rayon::prelude::*;

use crate::error::{MeshError, MeshResult};

/// Marker for types that can be stored in the registry.
pub trait Extension: Any + Send + Sync {}

impl<T: Any + Send + Sync> Extension for T {}

const ABSENT: u32 = u32::MAX;

/// Resolved handle for one extension record type.
pub struct ExtKind<T> {
    slot: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ExtKind<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ExtKind<T> {}

impl<T> fmt::Debug for ExtKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtKind<{}>({})", type_name::<T>(), self.slot)
    }
}

impl<T> PartialEq for ExtKind<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

#[derive(Default)]
struct EntityRecords {
    records: Vec<Box<dyn Any + Send + Sync>>,
    /// slots[kind] = position in `records`, or ABSENT.
    slots: Vec<u32>,
}

impl EntityRecords {
    fn position(&self, slot: usize) -> Option<usize> {
        match self.slots.get(slot) {
            Some(&p) if p != ABSENT => Some(p as usize),
            _ => None,
        }
    }
}

/// Registry of heterogeneous per-entity records.
pub struct ExtensionRegistry {
    kinds: HashMap<TypeId, usize>,
    kind_names: Vec<&'static str>,
    entities: Vec<EntityRecords>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("entities", &self.entities.len())
            .field("kinds", &self.kind_names)
            .finish()
    }
}

impl ExtensionRegistry {
    /// Create a registry for `entity_count` entities with no records.
    pub fn new(entity_count: usize) -> Self {
        let mut entities = Vec::with_capacity(entity_count);
        entities.resize_with(entity_count, EntityRecords::default);
        Self {
            kinds: HashMap::new(),
            kind_names: Vec::new(),
            entities,
        }
    }

    /// Number of entities (fixed for the lifetime of the registry).
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Names of the registered record types, in registration order.
    pub fn kind_names(&self) -> &[&'static str] {
        &self.kind_names
    }

    /// Register a record type and return its handle. Idempotent.
    pub fn register<T: Extension>(&mut self) -> ExtKind<T> {
        let next = self.kind_names.len();
        let slot = *self.kinds.entry(TypeId::of::<T>()).or_insert(next);
        if slot == next {
            self.kind_names.push(type_name::<T>());
        }
        ExtKind {
            slot,
            _marker: PhantomData,
        }
    }

    /// Handle for an already registered type.
    pub fn kind<T: Extension>(&self) -> Option<ExtKind<T>> {
        self.kinds.get(&TypeId::of::<T>()).map(|&slot| ExtKind {
            slot,
            _marker: PhantomData,
        })
    }

    /// Attach `record` to `entity`.
    ///
    /// Fails if the entity already carries a record of type `T`.
    pub fn attach<T: Extension>(&mut self, entity: usize, record: T) -> MeshResult<ExtKind<T>> {
        let kind = self.register::<T>();
        let len = self.entities.len();
        let slot_count = self.kind_names.len();
        let ent = self
            .entities
            .get_mut(entity)
            .ok_or(MeshError::EntityOutOfRange { index: entity, len })?;
        if ent.position(kind.slot).is_some() {
            return Err(MeshError::DuplicateExtension {
                entity,
                type_name: type_name::<T>(),
            });
        }
        if ent.slots.len() < slot_count {
            ent.slots.resize(slot_count, ABSENT);
        }
        ent.slots[kind.slot] = ent.records.len() as u32;
        ent.records.push(Box::new(record));
        Ok(kind)
    }

    /// Record of type `T` on `entity`, if any.
    #[inline]
    pub fn extract<T: Extension>(&self, kind: ExtKind<T>, entity: usize) -> Option<&T> {
        let ent = self.entities.get(entity)?;
        ent.records.get(ent.position(kind.slot)?)?.downcast_ref::<T>()
    }

    /// Mutable record of type `T` on `entity`, if any.
    #[inline]
    pub fn extract_mut<T: Extension>(&mut self, kind: ExtKind<T>, entity: usize) -> Option<&mut T> {
        let ent = self.entities.get_mut(entity)?;
        let pos = ent.position(kind.slot)?;
        ent.records.get_mut(pos)?.downcast_mut::<T>()
    }

    /// Record lookup by type alone; absent if the type was never registered.
    pub fn get<T: Extension>(&self, entity: usize) -> Option<&T> {
        self.extract(self.kind::<T>()?, entity)
    }

    /// Whether `entity` carries a record of type `T`.
    pub fn has<T: Extension>(&self, entity: usize) -> bool {
        self.get::<T>(entity).is_some()
    }

    /// Number of entities carrying a record of type `T`.
    pub fn count<T: Extension>(&self) -> usize {
        match self.kind::<T>() {
            Some(kind) => (0..self.entities.len())
                .filter(|&i| self.extract(kind, i).is_some())
                .count(),
            None => 0,
        }
    }

    /// Apply `f` to every record of type `T`, in entity order.
    pub fn for_each_mut<T: Extension>(&mut self, kind: ExtKind<T>, mut f: impl FnMut(usize, &mut T)) {
        for (i, ent) in self.entities.iter_mut().enumerate() {
            if let Some(pos) = ent.position(kind.slot) {
                if let Some(rec) = ent.records[pos].downcast_mut::<T>() {
                    f(i, rec);
                }
            }
        }
    }

    /// Apply `f` to every record of type `T` in parallel.
    pub fn par_for_each_mut<T, F>(&mut self, kind: ExtKind<T>, f: F)
    where
        T: Extension,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        self.entities
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, ent)| {
                if let Some(pos) = ent.position(kind.slot) {
                    if let Some(rec) = ent.records[pos].downcast_mut::<T>() {
                        f(i, rec);
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Salt(f64);
    #[derive(Debug, PartialEq)]
    struct Flow {
        u: f64,
    }

    #[test]
    fn attach_then_extract() {
        let mut reg = ExtensionRegistry::new(3);
        let salt = reg.attach(0, Salt(1.0)).unwrap();
        reg.attach(2, Salt(3.0)).unwrap();

        assert_eq!(reg.extract(salt, 0), Some(&Salt(1.0)));
        assert_eq!(reg.extract(salt, 1), None);
        assert_eq!(reg.get::<Salt>(2), Some(&Salt(3.0)));
        assert_eq!(reg.count::<Salt>(), 2);

        // Same record every time, not a copy.
        let first = reg.extract(salt, 0).unwrap();
        let again = reg.extract(salt, 0).unwrap();
        assert!(std::ptr::eq(first, again));
    }

    #[test]
    fn duplicate_attach_fails() {
        let mut reg = ExtensionRegistry::new(1);
        reg.attach(0, Salt(1.0)).unwrap();
        let err = reg.attach(0, Salt(2.0)).unwrap_err();
        assert!(matches!(err, MeshError::DuplicateExtension { entity: 0, .. }));
        // The original record survives.
        assert_eq!(reg.get::<Salt>(0), Some(&Salt(1.0)));
    }

    #[test]
    fn unknown_type_is_absent() {
        let reg = ExtensionRegistry::new(2);
        assert!(reg.get::<Flow>(0).is_none());
        assert!(reg.kind::<Flow>().is_none());
        assert_eq!(reg.count::<Flow>(), 0);
    }

    #[test]
    fn out_of_range_entity() {
        let mut reg = ExtensionRegistry::new(1);
        assert!(reg.attach(5, Salt(0.0)).is_err());
        let kind = reg.register::<Salt>();
        assert!(reg.extract(kind, 5).is_none());
    }

    #[test]
    fn attach_order_may_differ_per_entity() {
        // Entity 0 gets Salt first, entity 1 gets Flow first; a scheme that
        // cached one arena position per type would hand back the wrong record.
        let mut reg = ExtensionRegistry::new(2);
        let salt = reg.attach(0, Salt(1.0)).unwrap();
        let flow = reg.attach(0, Flow { u: 0.1 }).unwrap();
        reg.attach(1, Flow { u: 0.2 }).unwrap();
        reg.attach(1, Salt(2.0)).unwrap();

        assert_eq!(reg.extract(salt, 0), Some(&Salt(1.0)));
        assert_eq!(reg.extract(salt, 1), Some(&Salt(2.0)));
        assert_eq!(reg.extract(flow, 0), Some(&Flow { u: 0.1 }));
        assert_eq!(reg.extract(flow, 1), Some(&Flow { u: 0.2 }));
    }

    #[test]
    fn mutation_through_handles() {
        let mut reg = ExtensionRegistry::new(4);
        let salt = reg.register::<Salt>();
        for i in 0..4 {
            reg.attach(i, Salt(i as f64)).unwrap();
        }
        if let Some(s) = reg.extract_mut(salt, 1) {
            s.0 = 10.0;
        }
        reg.par_for_each_mut(salt, |_, s| s.0 *= 2.0);
        let mut seen = Vec::new();
        reg.for_each_mut(salt, |i, s| seen.push((i, s.0)));
        assert_eq!(seen, vec![(0, 0.0), (1, 20.0), (2, 4.0), (3, 6.0)]);
    }

    #[test]
    fn register_is_idempotent() {
        let mut reg = ExtensionRegistry::new(0);
        let a = reg.register::<Salt>();
        let b = reg.register::<Flow>();
        assert_eq!(reg.register::<Salt>(), a);
        assert_ne!(format!("{a:?}"), format!("{b:?}"));
        assert_eq!(reg.kind_names().len(), 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, PartialEq)]
    struct A(u32);
    #[derive(Debug, PartialEq)]
    struct B(u32);

    proptest! {
        #[test]
        fn extract_returns_what_was_attached(
            plan in prop::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 1..40)
        ) {
            let mut reg = ExtensionRegistry::new(plan.len());
            for (i, &(has_a, has_b, a_first)) in plan.iter().enumerate() {
                let i32_ = i as u32;
                if a_first {
                    if has_a { reg.attach(i, A(i32_)).unwrap(); }
                    if has_b { reg.attach(i, B(i32_ + 1000)).unwrap(); }
                } else {
                    if has_b { reg.attach(i, B(i32_ + 1000)).unwrap(); }
                    if has_a { reg.attach(i, A(i32_)).unwrap(); }
                }
            }
            for (i, &(has_a, has_b, _)) in plan.iter().enumerate() {
                let i32_ = i as u32;
                // Repeated lookups stay consistent.
                for _ in 0..2 {
                    prop_assert_eq!(reg.get::<A>(i).map(|a| a.0), has_a.then_some(i32_));
                    prop_assert_eq!(reg.get::<B>(i).map(|b| b.0), has_b.then_some(i32_ + 1000));
                }
            }
        }
    }
}
