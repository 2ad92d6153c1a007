//! An entity store which packs entities of the same shape into fixed-size
//! blocks.
//!
//! Each entity is a bundle of plain-data components. Entities with the same
//! set of component types share a `Shape`, and are stored column by column in
//! `Block`s of a fixed byte size, so iterating over one component type walks
//! contiguous memory.

pub use block::{Block, BlockSplitter, DEFAULT_BLOCK_SIZE};
pub use component::{Component, FieldTypeId, TypeRegistry};
pub use entity::EntityHandle;
pub use manager::{BlockId, EntityManager, Location};
pub use profile::Stopwatch;
pub use query::Query;
pub use shape::{Shape, Signature};
pub use unit::{BoxUnit, Requirements, ScheduleError, Unit, UnitSchedule};
pub use world::World;

pub mod component;
mod entity;
pub mod shape;
pub mod block;

pub mod manager;
pub mod query;
pub mod unit;
pub mod world;

pub mod profile;
pub mod sync;
