//! Processing units.
//!
//! A unit is a piece of per-frame logic, run over the entities of a world in
//! a fixed order. Units are grouped into buckets by update order; lower
//! orders run first, and units in one bucket run in insertion order.

use std::any::type_name;

use thiserror::Error;
use tracing::debug;

use crate::component::Component;
use crate::manager::EntityManager;
use crate::query::Query;
use crate::shape::Shape;

/// A processing unit.
pub trait Unit {
    /// Called once, when the unit is added to a world.
    fn init(&mut self, _entities: &mut EntityManager) {}

    /// Called once per frame.
    fn update(&mut self, entities: &mut EntityManager, delta_time: f32);

    /// Called once per drawn frame.
    fn draw(&mut self, _entities: &EntityManager) {}

    /// Return a name for this unit, for logging.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// A boxed unit, as stored in a `UnitSchedule`.
pub type BoxUnit = Box<dyn Unit + Send + 'static>;

/// The set of fields a unit needs.
///
/// Units usually keep one of these and run their per-row logic through it,
/// so that they only ever see entities which have every required field.
#[derive(Clone, Debug, Default)]
pub struct Requirements {
    required: Shape,
}

impl Requirements {
    /// Create requirements matching every entity.
    pub fn new() -> Requirements {
        Requirements::default()
    }

    /// Builder variant of `add`.
    pub fn require<T: Component>(mut self) -> Requirements {
        self.add::<T>();
        self
    }

    /// Require the field `T`.
    pub fn add<T: Component>(&mut self) -> &mut Requirements {
        self.required.add_field::<T>();
        self
    }

    /// Get the shape every matched entity contains.
    pub fn required(&self) -> &Shape {
        &self.required
    }

    /// Run `f` over every entity which meets these requirements.
    ///
    /// # Panics
    /// If `Q` asks for a field which is not required, and a matching block
    /// lacks it.
    pub fn execute_for_entities_matching<'a, Q, F>(&self, entities: &'a mut EntityManager, f: F)
        where Q: Query<'a>,
              F: FnMut(Q::Item)
    {
        entities.execute_for_entities_matching::<Q, F>(&self.required, f)
    }
}

impl From<Shape> for Requirements {
    fn from(required: Shape) -> Requirements {
        Requirements { required }
    }
}

/// The error returned when a unit cannot be found in a schedule.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// There is no unit at the given position.
    #[error("no unit at index {index} of update order {order}")]
    NoSuchUnit {
        /// The update order searched.
        order: usize,
        /// The index within that order.
        index: usize,
    },
}

/// Units, bucketed by update order.
#[derive(Default)]
pub struct UnitSchedule {
    buckets: Vec<Vec<BoxUnit>>,
}

impl UnitSchedule {
    /// Create an empty schedule.
    pub fn new() -> UnitSchedule {
        UnitSchedule::default()
    }

    /// Get the total number of units.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Returns true if the schedule has no units.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Get the number of units with the given update order.
    pub fn bucket_len(&self, order: usize) -> usize {
        self.buckets.get(order).map_or(0, Vec::len)
    }

    /// Get the unit at `index` in the bucket for `order`.
    pub fn get(&self, order: usize, index: usize) -> Option<&(dyn Unit + Send + 'static)> {
        self.buckets.get(order)?.get(index).map(|unit| &**unit)
    }

    /// Append a unit to the bucket for `order`, returning its index in that
    /// bucket.
    pub fn insert(&mut self, order: usize, unit: BoxUnit) -> usize {
        if self.buckets.len() <= order {
            self.buckets.resize_with(order + 1, Vec::new);
        }

        let bucket = &mut self.buckets[order];
        debug!(unit = unit.name(), order, index = bucket.len(), "added unit");
        bucket.push(unit);
        bucket.len() - 1
    }

    /// Move the unit at `index` in bucket `old_order` to the end of bucket
    /// `new_order`, returning its new index.
    ///
    /// Units after it in the old bucket shift down by one.
    pub fn change_update_order(&mut self, old_order: usize, index: usize, new_order: usize)
        -> Result<usize, ScheduleError>
    {
        let bucket = self.buckets.get_mut(old_order)
            .filter(|bucket| index < bucket.len())
            .ok_or(ScheduleError::NoSuchUnit { order: old_order, index })?;

        let unit = bucket.remove(index);
        debug!(unit = unit.name(), old_order, new_order, "changed update order");
        Ok(self.insert(new_order, unit))
    }

    /// Iterate over every unit in update order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BoxUnit> + '_ {
        self.buckets.iter_mut().flatten()
    }
}
