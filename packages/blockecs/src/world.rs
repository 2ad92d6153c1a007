//! The world: entities plus the units which run over them.

use tracing::trace_span;

use crate::block::DEFAULT_BLOCK_SIZE;
use crate::component::Component;
use crate::entity::EntityHandle;
use crate::manager::EntityManager;
use crate::shape::Shape;
use crate::unit::{ScheduleError, Unit, UnitSchedule};

/// A `World` owns a set of entities and the units that process them.
pub struct World {
    entities: EntityManager,
    units: UnitSchedule,
}

impl World {
    /// Create a new, empty world using the default block size.
    pub fn new() -> World {
        World::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create a new, empty world whose blocks allocate `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> World {
        World {
            entities: EntityManager::with_block_size(block_size),
            units: UnitSchedule::new(),
        }
    }

    /// Get the entity manager.
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Get the entity manager mutably.
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// Get the unit schedule.
    pub fn units(&self) -> &UnitSchedule {
        &self.units
    }

    /// Create a new entity of the given shape.
    pub fn create_entity(&mut self, shape: &Shape) -> EntityHandle {
        self.entities.create(shape)
    }

    /// Create a new entity with no fields.
    pub fn create_empty_entity(&mut self) -> EntityHandle {
        self.entities.create_empty()
    }

    /// Destroy an entity, returning false if the handle is stale.
    pub fn destroy_entity(&mut self, handle: EntityHandle) -> bool {
        self.entities.destroy(handle)
    }

    /// Returns true if `handle` refers to a live entity.
    pub fn exists(&self, handle: EntityHandle) -> bool {
        self.entities.exists(handle)
    }

    /// Attach the field `T` to an entity.
    pub fn add_field<T: Component>(&mut self, handle: EntityHandle) -> bool {
        self.entities.add_field::<T>(handle)
    }

    /// Detach the field `T` from an entity.
    pub fn remove_field<T: Component>(&mut self, handle: EntityHandle) -> bool {
        self.entities.remove_field::<T>(handle)
    }

    /// Overwrite the field `T` of an entity.
    ///
    /// # Panics
    /// If the entity does not have the field `T`.
    pub fn set_field<T: Component>(&mut self, handle: EntityHandle, value: T) -> bool {
        self.entities.set(handle, value)
    }

    /// Get the field `T` of an entity.
    pub fn get_field<T: Component>(&self, handle: EntityHandle) -> Option<&T> {
        self.entities.get::<T>(handle)
    }

    /// Get the field `T` of an entity mutably.
    pub fn get_field_mut<T: Component>(&mut self, handle: EntityHandle) -> Option<&mut T> {
        self.entities.get_mut::<T>(handle)
    }

    /// Add a unit with the given update order, returning its index among the
    /// units of that order.
    ///
    /// The unit's `init` hook runs before this returns.
    pub fn add_unit(&mut self, order: usize, unit: impl Unit + Send + 'static) -> usize {
        let mut unit = Box::new(unit);
        unit.init(&mut self.entities);
        self.units.insert(order, unit)
    }

    /// Move a unit to a different update order. See
    /// `UnitSchedule::change_update_order`.
    pub fn change_update_order(&mut self, old_order: usize, index: usize, new_order: usize)
        -> Result<usize, ScheduleError>
    {
        self.units.change_update_order(old_order, index, new_order)
    }

    /// Run every unit's `update` hook once, in update order.
    pub fn update(&mut self, delta_time: f32) {
        for unit in self.units.iter_mut() {
            let span = trace_span!("update", unit = unit.name());
            let _guard = span.enter();
            unit.update(&mut self.entities, delta_time);
        }
    }

    /// Run every unit's `draw` hook once, in update order.
    pub fn draw(&mut self) {
        for unit in self.units.iter_mut() {
            let span = trace_span!("draw", unit = unit.name());
            let _guard = span.enter();
            unit.draw(&self.entities);
        }
    }
}

impl Default for World {
    fn default() -> World {
        World::new()
    }
}
