//! Logic for dealing with blocks of entities.
//!
//! A `Block` is a single fixed-size allocation holding entities of one
//! `Shape`. The memory is laid out as a struct of arrays:
//!
//! ```text
//! [ handle 0 .. handle cap | field A 0 .. field A cap | field B 0 .. field B cap | .. ]
//! ```
//!
//! Field columns are ordered by ascending `FieldTypeId`. Rows `0..len` are
//! always live; removal moves the last row into the hole.

use std::alloc::{self, Layout};
use std::any::type_name;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::ptr::{self, NonNull};
use std::slice;

use bit_vec::BitVec;

use crate::component::{Component, FieldTypeId};
use crate::entity::EntityHandle;
use crate::shape::Shape;

/// The default number of bytes allocated for each block.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// The number of bytes each row spends on its entity handle.
pub const HANDLE_SIZE: usize = std::mem::size_of::<EntityHandle>();

/// The result of `Block::move_row`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovedRow {
    /// The row the entity now occupies in the destination block.
    pub row: usize,
    /// The entity which was moved into the vacated source row, if any.
    pub displaced: Option<EntityHandle>,
}

/// A single `Block` of entities sharing the same `Shape`.
///
/// The components are stored as a struct of arrays in one contiguous block of
/// memory. Blocks uniquely own their memory and cannot be cloned.
pub struct Block {
    shape: Shape,
    block_size: usize,
    capacity: usize,
    columns: Vec<usize>,
    layout: Layout,
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for Block {}

unsafe impl Sync for Block {}

impl Block {
    /// Allocate a new, empty block for entities of `shape`.
    ///
    /// # Panics
    /// If a single row of `shape` does not fit into `block_size` bytes.
    pub fn new(shape: Shape, block_size: usize) -> Block {
        let (capacity, columns, align) = Block::calculate_layout(&shape, block_size);
        assert!(capacity > 0,
                "a row of {:?} ({} bytes) does not fit in a {} byte block",
                shape, HANDLE_SIZE + shape.memory_size(), block_size);

        let layout = match Layout::from_size_align(block_size, align) {
            Ok(layout) => layout,
            Err(_) => panic!("invalid block layout: {} bytes aligned to {}", block_size, align),
        };
        let ptr = match NonNull::new(unsafe { alloc::alloc_zeroed(layout) }) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };

        Block {
            shape,
            block_size,
            capacity,
            columns,
            layout,
            ptr,
            len: 0,
        }
    }

    /// Compute the capacity, the column offsets and the buffer alignment of a
    /// block.
    ///
    /// The capacity is `block_size / (HANDLE_SIZE + row size)`, lowered if
    /// column alignment padding would not fit otherwise.
    fn calculate_layout(shape: &Shape, block_size: usize) -> (usize, Vec<usize>, usize) {
        let align = shape.fields().iter()
            .map(|f| f.layout().align())
            .fold(std::mem::align_of::<EntityHandle>(), usize::max);
        let mut capacity = block_size / (HANDLE_SIZE + shape.memory_size());

        loop {
            let mut offset = HANDLE_SIZE * capacity;
            let mut columns = Vec::with_capacity(shape.field_count());

            for field in shape.fields() {
                let field_align = field.layout().align();
                let misalignment = offset % field_align;
                if misalignment != 0 {
                    offset += field_align - misalignment;
                }

                columns.push(offset);
                offset += field.size() * capacity;
            }

            if offset <= block_size || capacity == 0 {
                return (capacity, columns, align);
            }

            capacity -= 1;
        }
    }

    /// Return the `Shape` of every entity in this block.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Get the total number of entities currently stored in this block.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if this block contains no entities.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the maximum number of entities this block can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if no more rows can be created in this block.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Get the number of bytes this block allocated.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Get the memory layout of this block's allocation.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the handles of every entity in this block, by row.
    pub fn handles(&self) -> &[EntityHandle] {
        unsafe { slice::from_raw_parts(self.handle_ptr(), self.len) }
    }

    fn handle_ptr(&self) -> *mut EntityHandle {
        self.ptr.as_ptr() as *mut EntityHandle
    }

    fn column_ptr(&self, position: usize) -> *mut u8 {
        unsafe { self.ptr.as_ptr().add(self.columns[position]) }
    }

    fn field_ptr(&self, position: usize, row: usize) -> *mut u8 {
        let size = self.shape.fields()[position].size();
        unsafe { self.column_ptr(position).add(size * row) }
    }

    fn position_of<T: Component>(&self) -> Option<usize> {
        let position = self.shape.position(T::type_id())?;
        debug_assert_eq!(self.shape.fields()[position].layout(), T::layout());
        Some(position)
    }

    /// Get a slice of components from this block, if its shape has them.
    pub fn try_column<T: Component>(&self) -> Option<&[T]> {
        self.position_of::<T>().map(|position| {
            unsafe { slice::from_raw_parts(self.column_ptr(position) as *const T, self.len) }
        })
    }

    /// Get a mutable slice of components from this block, if its shape has them.
    pub fn try_column_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        self.position_of::<T>().map(|position| {
            unsafe { slice::from_raw_parts_mut(self.column_ptr(position) as *mut T, self.len) }
        })
    }

    /// Get a slice of components from this block.
    ///
    /// # Panics
    /// If the block's shape does not have `T`.
    pub fn column<T: Component>(&self) -> &[T] {
        match self.try_column::<T>() {
            Some(column) => column,
            None => missing_column::<T>(&self.shape),
        }
    }

    /// Get a mutable slice of components from this block.
    ///
    /// # Panics
    /// If the block's shape does not have `T`.
    pub fn column_mut<T: Component>(&mut self) -> &mut [T] {
        match self.position_of::<T>() {
            Some(position) => unsafe {
                slice::from_raw_parts_mut(self.column_ptr(position) as *mut T, self.len)
            },
            None => missing_column::<T>(&self.shape),
        }
    }

    /// Overwrite the component `T` of the entity at `row`.
    ///
    /// # Panics
    /// If `row` is not a live row or the block's shape does not have `T`.
    pub fn set<T: Component>(&mut self, row: usize, value: T) {
        self.check_row(row);
        self.column_mut::<T>()[row] = value;
    }

    /// Create a `BlockSplitter` for accessing multiple columns at the same
    /// time.
    pub fn split(&mut self) -> BlockSplitter<'_> {
        BlockSplitter::new(self)
    }

    /// Append a row for `handle`, returning its index.
    ///
    /// Every field of the new row holds its type's default value.
    ///
    /// # Panics
    /// If the block is full.
    pub fn create_row(&mut self, handle: EntityHandle) -> usize {
        assert!(!self.is_full(), "cannot create a row in a full block (capacity {})", self.capacity);

        let row = self.len;
        unsafe { self.handle_ptr().add(row).write(handle) };
        for position in 0..self.shape.field_count() {
            self.set_default(position, row);
        }

        self.len += 1;
        row
    }

    /// Remove the row at `row`, moving the last row into its place.
    ///
    /// Returns the handle of the entity that now occupies `row`, if one had to
    /// be moved.
    ///
    /// # Panics
    /// If the block is empty or `row` is not a live row.
    pub fn destroy_row(&mut self, row: usize) -> Option<EntityHandle> {
        self.swap_remove(row)
    }

    /// Move the row at `row` into `dest`, a block of a different shape.
    ///
    /// Fields present in both shapes are copied. Fields only `dest` has are
    /// set to their default value. Fields only this block has are dropped.
    /// The hole left behind is filled in the same way as `destroy_row`.
    ///
    /// # Panics
    /// If `row` is not a live row or `dest` is full.
    pub fn move_row(&mut self, row: usize, dest: &mut Block) -> MovedRow {
        self.check_row(row);
        assert!(!dest.is_full(), "cannot move a row into a full block (capacity {})", dest.capacity);

        let new_row = dest.len;
        unsafe { dest.handle_ptr().add(new_row).write(self.handles()[row]) };

        let src_fields = self.shape.fields();
        let mut src_position = 0;

        for dest_position in 0..dest.shape.field_count() {
            let field = dest.shape.fields()[dest_position];
            let mut shared = false;

            while let Some(src_field) = src_fields.get(src_position) {
                match src_field.type_id().cmp(&field.type_id()) {
                    Ordering::Less => src_position += 1,
                    Ordering::Equal => {
                        shared = true;
                        break;
                    }
                    Ordering::Greater => break,
                }
            }

            if shared {
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.field_ptr(src_position, row),
                        dest.field_ptr(dest_position, new_row),
                        field.size());
                }
                src_position += 1;
            } else {
                dest.set_default(dest_position, new_row);
            }
        }

        dest.len += 1;
        let displaced = self.swap_remove(row);

        MovedRow {
            row: new_row,
            displaced,
        }
    }

    fn set_default(&mut self, position: usize, row: usize) {
        let field = self.shape.fields()[position];
        let dest = unsafe { slice::from_raw_parts_mut(self.field_ptr(position, row), field.size()) };
        field.set_default(dest);
    }

    fn swap_remove(&mut self, row: usize) -> Option<EntityHandle> {
        assert!(self.len > 0, "cannot remove a row from an empty block");
        self.check_row(row);

        let last = self.len - 1;
        let moved = if row != last {
            self.copy_row(last, row);
            Some(self.handles()[row])
        } else {
            None
        };

        self.len = last;
        moved
    }

    /// Copy every column of row `src` over row `dest`.
    fn copy_row(&mut self, src: usize, dest: usize) {
        debug_assert_ne!(src, dest);

        unsafe {
            ptr::copy_nonoverlapping(self.handle_ptr().add(src), self.handle_ptr().add(dest), 1);

            for (position, field) in self.shape.fields().iter().enumerate() {
                ptr::copy_nonoverlapping(
                    self.field_ptr(position, src),
                    self.field_ptr(position, dest),
                    field.size());
            }
        }
    }

    fn check_row(&self, row: usize) {
        assert!(row < self.len, "row {} out of range for a block of {} entities", row, self.len);
    }
}

fn missing_column<T: Component>(shape: &Shape) -> ! {
    panic!("block of shape {:?} has no {} column", shape, type_name::<T>())
}

impl Debug for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f,
               "Block {{ shape: {:?}, len: {}, capacity: {} }}",
               self.shape,
               self.len,
               self.capacity)
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// A utility for accessing multiple different component types from a
/// block at the same time.
///
/// Any number of shared slices of one column may be taken, or a single
/// mutable one. Requests which would alias a mutable slice return `None`.
pub struct BlockSplitter<'a> {
    block: &'a mut Block,
    taken: BitVec,
}

impl<'a> BlockSplitter<'a> {
    /// Construct a new `BlockSplitter` from a mutable `Block` reference.
    pub fn new(block: &'a mut Block) -> BlockSplitter<'a> {
        let num_fields = block.shape.field_count();

        BlockSplitter {
            block,
            taken: BitVec::from_elem(num_fields << 1, false),
        }
    }

    /// Get the number of entities in the block.
    pub fn len(&self) -> usize {
        self.block.len
    }

    /// Returns true if the block contains no entities.
    pub fn is_empty(&self) -> bool {
        self.block.len == 0
    }

    /// Get the shape of the block.
    pub fn shape(&self) -> &Shape {
        &self.block.shape
    }

    /// Get the handles of every entity in the block.
    pub fn handles(&self) -> &'a [EntityHandle] {
        // The handle column is never handed out mutably.
        unsafe { slice::from_raw_parts(self.block.handle_ptr(), self.block.len) }
    }

    fn mark_type(&mut self, type_id: FieldTypeId, mutable: bool) -> Option<usize> {
        let position = self.block.shape.position(type_id)?;
        let offset = position << 1;
        let const_taken = self.taken[offset];
        let mut_taken = self.taken[offset + 1];

        if mut_taken || (mutable && const_taken) {
            return None;
        }

        self.taken.set(offset + mutable as usize, true);
        Some(position)
    }

    /// Get the slice of all components of the given type in the block.
    pub fn column<T: Component>(&mut self) -> Option<&'a [T]> {
        let position = self.mark_type(T::type_id(), false)?;
        let ptr = self.block.column_ptr(position) as *const T;
        Some(unsafe { slice::from_raw_parts(ptr, self.block.len) })
    }

    /// Get the mutable slice of all components of the given type in the block.
    pub fn column_mut<T: Component>(&mut self) -> Option<&'a mut [T]> {
        let position = self.mark_type(T::type_id(), true)?;
        let ptr = self.block.column_ptr(position) as *mut T;
        Some(unsafe { slice::from_raw_parts_mut(ptr, self.block.len) })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{component, shape};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position(f32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Velocity(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Flag(u8);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Wide(u64);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Huge([u8; 5000]);

    impl Default for Huge {
        fn default() -> Huge {
            Huge([0; 5000])
        }
    }

    impl Default for Health {
        fn default() -> Health {
            Health(100)
        }
    }

    component!(Position);
    component!(Velocity);
    component!(Health);
    component!(Flag);
    component!(Wide);
    component!(Huge);

    fn handle(index: u32) -> EntityHandle {
        EntityHandle::new(index, 0)
    }

    fn filled(shape: Shape, n: u32) -> Block {
        let mut block = Block::new(shape, DEFAULT_BLOCK_SIZE);
        for i in 0..n {
            let row = block.create_row(handle(i));
            block.set(row, Position(i as f32));
        }
        block
    }

    #[test]
    fn test_capacity() {
        let block = Block::new(shape![Position, Velocity], DEFAULT_BLOCK_SIZE);
        assert_eq!(block.capacity(), 256);
        assert_eq!(block.columns, vec![2048, 3072]);
        assert!(block.is_empty());

        let empty = Block::new(Shape::new(), DEFAULT_BLOCK_SIZE);
        assert_eq!(empty.capacity(), DEFAULT_BLOCK_SIZE / HANDLE_SIZE);

        let small = Block::new(shape![Position], 120);
        assert_eq!(small.capacity(), 10);
        assert_eq!(small.block_size(), 120);
    }

    #[test]
    fn test_alignment() {
        for block_size in [34, 64, 100, 4096].iter().cloned() {
            let block = Block::new(shape![Flag, Wide], block_size);
            assert!(block.capacity() >= 1);
            assert!(block.capacity() <= block_size / (HANDLE_SIZE + 9));

            let fields = block.shape().fields();
            for (position, field) in fields.iter().enumerate() {
                let start = block.columns[position];
                assert_eq!(start % field.layout().align(), 0);
                assert!(start + field.size() * block.capacity() <= block_size);
            }

            assert_eq!(block.column::<Wide>().as_ptr() as usize % 8, 0);
        }
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn test_oversized_shape() {
        Block::new(shape![Huge], DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_create_and_set() {
        let mut block = Block::new(shape![Position, Health], DEFAULT_BLOCK_SIZE);
        let a = block.create_row(handle(1));
        let b = block.create_row(handle(2));
        assert_eq!((a, b), (0, 1));
        assert_eq!(block.handles(), &[handle(1), handle(2)]);

        // New rows start out at their defaults.
        assert_eq!(block.column::<Health>(), &[Health(100), Health(100)]);

        block.set(b, Position(3.0));
        block.set(a, Health(7));
        assert_eq!(block.column::<Position>(), &[Position(0.0), Position(3.0)]);
        assert_eq!(block.column::<Health>(), &[Health(7), Health(100)]);
        assert!(block.try_column::<Velocity>().is_none());
    }

    #[test]
    #[should_panic(expected = "full block")]
    fn test_create_full() {
        let mut block = Block::new(shape![Position], 24);
        assert_eq!(block.capacity(), 2);
        block.create_row(handle(0));
        block.create_row(handle(1));
        assert!(block.is_full());
        block.create_row(handle(2));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_out_of_range() {
        let mut block = filled(shape![Position], 2);
        block.set(2, Position(1.0));
    }

    #[test]
    #[should_panic(expected = "no")]
    fn test_missing_column() {
        let block = filled(shape![Position], 1);
        block.column::<Velocity>();
    }

    #[test]
    fn test_destroy_compacts() {
        let mut block = filled(shape![Position], 4);

        let moved = block.destroy_row(1);
        assert_eq!(moved, Some(handle(3)));
        assert_eq!(block.len(), 3);
        assert_eq!(block.handles(), &[handle(0), handle(3), handle(2)]);
        assert_eq!(block.column::<Position>(), &[Position(0.0), Position(3.0), Position(2.0)]);

        // Removing the last row moves nothing.
        assert_eq!(block.destroy_row(2), None);
        assert_eq!(block.handles(), &[handle(0), handle(3)]);

        assert_eq!(block.destroy_row(0), Some(handle(3)));
        assert_eq!(block.destroy_row(0), None);
        assert!(block.is_empty());
    }

    #[test]
    #[should_panic(expected = "empty block")]
    fn test_destroy_empty() {
        let mut block = Block::new(shape![Position], DEFAULT_BLOCK_SIZE);
        block.destroy_row(0);
    }

    #[test]
    fn test_move_row() {
        let mut src = filled(shape![Position, Velocity], 3);
        src.set(0, Velocity(10.0));
        src.set(1, Velocity(11.0));
        src.set(2, Velocity(12.0));

        // Drops Velocity, gains Health.
        let mut dest = Block::new(shape![Position, Health], DEFAULT_BLOCK_SIZE);
        dest.create_row(handle(9));

        let moved = src.move_row(0, &mut dest);
        assert_eq!(moved, MovedRow { row: 1, displaced: Some(handle(2)) });

        assert_eq!(dest.handles(), &[handle(9), handle(0)]);
        assert_eq!(dest.column::<Position>()[1], Position(0.0));
        assert_eq!(dest.column::<Health>()[1], Health(100));

        assert_eq!(src.handles(), &[handle(2), handle(1)]);
        assert_eq!(src.column::<Position>(), &[Position(2.0), Position(1.0)]);
        assert_eq!(src.column::<Velocity>(), &[Velocity(12.0), Velocity(11.0)]);

        // Moving the last row displaces nobody.
        let moved = src.move_row(1, &mut dest);
        assert_eq!(moved, MovedRow { row: 2, displaced: None });
        assert_eq!(dest.column::<Position>()[2], Position(1.0));
    }

    #[test]
    fn test_move_row_to_superset() {
        let mut src = Block::new(shape![Health], DEFAULT_BLOCK_SIZE);
        let row = src.create_row(handle(4));
        src.set(row, Health(55));

        let mut dest = Block::new(shape![Position, Health, Velocity], DEFAULT_BLOCK_SIZE);
        let moved = src.move_row(row, &mut dest);

        assert_eq!(moved.row, 0);
        assert!(src.is_empty());
        assert_eq!(dest.column::<Health>(), &[Health(55)]);
        assert_eq!(dest.column::<Position>(), &[Position(0.0)]);
        assert_eq!(dest.column::<Velocity>(), &[Velocity(0.0)]);
    }

    #[test]
    #[should_panic(expected = "full block")]
    fn test_move_into_full() {
        let mut src = filled(shape![Position], 1);
        let mut dest = Block::new(shape![Position, Velocity], 24);
        dest.create_row(handle(7));
        assert!(dest.is_full());
        src.move_row(0, &mut dest);
    }

    #[test]
    fn test_splitter() {
        let mut block = filled(shape![Position, Velocity], 3);
        let mut splitter = block.split();
        assert_eq!(splitter.len(), 3);

        let positions = splitter.column::<Position>().unwrap();
        let positions_again = splitter.column::<Position>().unwrap();
        assert!(splitter.column_mut::<Position>().is_none());
        assert!(splitter.column::<Health>().is_none());

        let velocities = splitter.column_mut::<Velocity>().unwrap();
        assert!(splitter.column::<Velocity>().is_none());
        assert!(splitter.column_mut::<Velocity>().is_none());

        for (v, p) in velocities.iter_mut().zip(positions.iter()) {
            v.0 = p.0 * 2.0;
        }
        assert_eq!(positions, positions_again);
        assert_eq!(splitter.handles().len(), 3);

        assert_eq!(block.column::<Velocity>(), &[Velocity(0.0), Velocity(2.0), Velocity(4.0)]);
    }
}
