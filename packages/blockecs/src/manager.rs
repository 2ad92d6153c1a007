//! The entity manager: handles, records and the block collection.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use crate::block::{Block, DEFAULT_BLOCK_SIZE, BlockSplitter};
use crate::component::Component;
use crate::entity::EntityHandle;
use crate::query::Query;
use crate::shape::{Shape, Signature};

/// The index of a block in an `EntityManager`.
///
/// Blocks are never freed, so IDs stay valid for the life of the manager.
pub type BlockId = usize;

/// The physical location of a live entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    /// The block holding the entity.
    pub block: BlockId,
    /// The row of the entity inside that block.
    pub row: usize,
}

#[derive(Clone, Copy, Debug)]
struct EntityRecord {
    /// The handle last issued (or next to be issued) for this index.
    handle: EntityHandle,
    location: Option<Location>,
}

/// Creates, destroys and reshapes entities.
///
/// The manager maps handles to block rows, and owns every block. Entities of
/// the same shape are packed into the same blocks; when one fills up, a new
/// sibling is allocated.
pub struct EntityManager {
    block_size: usize,
    blocks: Vec<Block>,
    by_signature: HashMap<Signature, Vec<BlockId>>,
    records: Vec<EntityRecord>,
    free_indices: VecDeque<u32>,
    alive: usize,
}

impl EntityManager {
    /// Create a new manager with the default block size.
    pub fn new() -> EntityManager {
        EntityManager::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create a new manager whose blocks each allocate `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> EntityManager {
        EntityManager {
            block_size,
            blocks: Vec::new(),
            by_signature: HashMap::new(),
            records: Vec::new(),
            free_indices: VecDeque::new(),
            alive: 0,
        }
    }

    /// Get the number of bytes each block allocates.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Get the number of live entities.
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Returns true if there are no live entities.
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Get every block, in allocation order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Get a block by ID.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Create a new entity of the given shape.
    ///
    /// Every field starts out at its type's default value.
    pub fn create(&mut self, shape: &Shape) -> EntityHandle {
        let handle = self.allocate_handle();
        let block = self.find_or_create_block(shape, true);
        let row = self.blocks[block].create_row(handle);

        self.records[handle.index() as usize].location = Some(Location { block, row });
        self.alive += 1;
        trace!(?handle, block, row, "created entity");
        handle
    }

    /// Create a new entity with no fields.
    pub fn create_empty(&mut self) -> EntityHandle {
        self.create(&Shape::new())
    }

    fn allocate_handle(&mut self) -> EntityHandle {
        if let Some(index) = self.free_indices.pop_front() {
            return self.records[index as usize].handle;
        }

        let index = self.records.len();
        assert!(index <= u32::MAX as usize, "entity index space exhausted");
        let handle = EntityHandle::new(index as u32, 0);
        self.records.push(EntityRecord {
            handle,
            location: None,
        });
        handle
    }

    /// Destroy an entity.
    ///
    /// Returns false if the handle is stale.
    pub fn destroy(&mut self, handle: EntityHandle) -> bool {
        let location = match self.resolve(handle) {
            Some(location) => location,
            None => return false,
        };

        if let Some(moved) = self.blocks[location.block].destroy_row(location.row) {
            self.records[moved.index() as usize].location = Some(location);
        }

        let record = &mut self.records[handle.index() as usize];
        record.handle = handle.next_generation();
        record.location = None;
        self.free_indices.push_back(handle.index());
        self.alive -= 1;

        trace!(?handle, "destroyed entity");
        true
    }

    /// Returns true if `handle` refers to a live entity.
    pub fn exists(&self, handle: EntityHandle) -> bool {
        self.resolve(handle).is_some()
    }

    fn resolve(&self, handle: EntityHandle) -> Option<Location> {
        let record = self.records.get(handle.index() as usize)?;
        if record.handle == handle {
            record.location
        } else {
            None
        }
    }

    /// Get the location of a live entity.
    pub fn location(&self, handle: EntityHandle) -> Option<Location> {
        self.resolve(handle)
    }

    /// Get the shape of a live entity.
    pub fn shape_of(&self, handle: EntityHandle) -> Option<&Shape> {
        let location = self.resolve(handle)?;
        Some(self.blocks[location.block].shape())
    }

    /// Attach the field `T` to an entity, with its default value.
    ///
    /// Returns false if the handle is stale. Adding a field the entity already
    /// has does nothing.
    pub fn add_field<T: Component>(&mut self, handle: EntityHandle) -> bool {
        let location = match self.resolve(handle) {
            Some(location) => location,
            None => return false,
        };

        let shape = self.blocks[location.block].shape();
        if !shape.has_field::<T>() {
            let mut new_shape = shape.clone();
            new_shape.add_field::<T>();
            self.migrate(handle, location, &new_shape);
        }

        true
    }

    /// Detach the field `T` from an entity, dropping its value.
    ///
    /// Returns false if the handle is stale. Removing a field the entity
    /// does not have does nothing.
    pub fn remove_field<T: Component>(&mut self, handle: EntityHandle) -> bool {
        let location = match self.resolve(handle) {
            Some(location) => location,
            None => return false,
        };

        let shape = self.blocks[location.block].shape();
        if shape.has_field::<T>() {
            let mut new_shape = shape.clone();
            new_shape.remove_field::<T>();
            self.migrate(handle, location, &new_shape);
        }

        true
    }

    fn migrate(&mut self, handle: EntityHandle, from: Location, shape: &Shape) {
        let to = self.find_or_create_block(shape, true);
        let (src, dest) = two_blocks_mut(&mut self.blocks, from.block, to);
        let moved = src.move_row(from.row, dest);

        if let Some(displaced) = moved.displaced {
            self.records[displaced.index() as usize].location = Some(from);
        }

        let location = Location {
            block: to,
            row: moved.row,
        };
        self.records[handle.index() as usize].location = Some(location);
        trace!(?handle, from = from.block, to, "migrated entity");
    }

    /// Overwrite the field `T` of an entity.
    ///
    /// Returns false if the handle is stale.
    ///
    /// # Panics
    /// If the entity does not have the field `T`.
    pub fn set<T: Component>(&mut self, handle: EntityHandle, value: T) -> bool {
        match self.resolve(handle) {
            Some(location) => {
                self.blocks[location.block].set(location.row, value);
                true
            }
            None => false,
        }
    }

    /// Get the field `T` of an entity.
    ///
    /// Returns `None` if the handle is stale or the entity lacks `T`.
    pub fn get<T: Component>(&self, handle: EntityHandle) -> Option<&T> {
        let location = self.resolve(handle)?;
        self.blocks[location.block].try_column::<T>()?.get(location.row)
    }

    /// Get the field `T` of an entity mutably.
    ///
    /// Returns `None` if the handle is stale or the entity lacks `T`.
    pub fn get_mut<T: Component>(&mut self, handle: EntityHandle) -> Option<&mut T> {
        let location = self.resolve(handle)?;
        self.blocks[location.block].try_column_mut::<T>()?.get_mut(location.row)
    }

    /// Find a block with exactly the given shape, allocating one if there is
    /// none.
    ///
    /// If `require_spare_capacity` is set, full blocks are skipped.
    pub fn find_or_create_block(&mut self, shape: &Shape, require_spare_capacity: bool) -> BlockId {
        if let Some(ids) = self.by_signature.get(&shape.signature()) {
            let blocks = &self.blocks;
            let found = ids.iter()
                .copied()
                .find(|id| !require_spare_capacity || !blocks[*id].is_full());

            if let Some(id) = found {
                return id;
            }
        }

        let id = self.blocks.len();
        let block = Block::new(shape.clone(), self.block_size);
        debug!(block = id, ?shape, capacity = block.capacity(), "allocated block");

        self.blocks.push(block);
        self.by_signature.entry(shape.signature()).or_default().push(id);
        id
    }

    /// Iterate over every block whose shape contains `shape`.
    pub fn matching_blocks(&self, shape: &Shape) -> impl Iterator<Item = &Block> + '_ {
        let signature = shape.signature();
        self.blocks.iter()
            .filter(move |block| block.shape().signature().is_superset_of(signature))
    }

    /// Iterate mutably over every block whose shape contains `shape`.
    pub fn matching_blocks_mut(&mut self, shape: &Shape) -> impl Iterator<Item = &mut Block> + '_ {
        let signature = shape.signature();
        self.blocks.iter_mut()
            .filter(move |block| block.shape().signature().is_superset_of(signature))
    }

    /// Run `f` over every entity whose shape contains `required`.
    ///
    /// # Panics
    /// If a matching block lacks a column `Q` asks for, or `Q` borrows a
    /// column with conflicting access.
    pub fn execute_for_entities_matching<'a, Q, F>(&'a mut self, required: &Shape, mut f: F)
        where Q: Query<'a>,
              F: FnMut(Q::Item)
    {
        for block in self.matching_blocks_mut(required) {
            let mut splitter = BlockSplitter::new(block);
            for item in Q::fetch(&mut splitter) {
                f(item);
            }
        }
    }

    /// Run `f` over every entity that has every field `Q` touches.
    pub fn for_each<'a, Q, F>(&'a mut self, f: F)
        where Q: Query<'a>,
              F: FnMut(Q::Item)
    {
        let required = Q::shape();
        self.execute_for_entities_matching::<Q, F>(&required, f)
    }
}

impl Default for EntityManager {
    fn default() -> EntityManager {
        EntityManager::new()
    }
}

fn two_blocks_mut(blocks: &mut [Block], a: BlockId, b: BlockId) -> (&mut Block, &mut Block) {
    assert_ne!(a, b, "cannot borrow a block twice");

    if a < b {
        let (lo, hi) = blocks.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = blocks.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}
