//! Typed access to the columns of matching blocks.
//!
//! A query is a type describing which columns to borrow and how: `&T` for
//! shared access, `&mut T` for exclusive access, `EntityHandle` for the handle
//! of each row, and tuples of up to twelve of these.
//!
//! ```ignore
//! entities.for_each::<(&Position, &mut Velocity), _>(|(p, v)| v.0 += p.0);
//! ```

use std::any::type_name;
use std::iter::Copied;
use std::slice;

use crate::block::BlockSplitter;
use crate::component::Component;
use crate::entity::EntityHandle;
use crate::shape::Shape;

/// A set of column borrows which can be run over the rows of a block.
pub trait Query<'a> {
    /// The value handed to the callback for each row.
    type Item;

    /// An iterator over the rows of a single block.
    type Iter: Iterator<Item = Self::Item>;

    /// Add every component type this query reads or writes to `shape`.
    fn add_to_shape(shape: &mut Shape);

    /// Borrow the columns this query needs from a block.
    ///
    /// # Panics
    /// If the block lacks one of the columns, or a column is requested twice
    /// with conflicting access.
    fn fetch(splitter: &mut BlockSplitter<'a>) -> Self::Iter;

    /// Return the shape made up of every component type this query touches.
    fn shape() -> Shape {
        let mut shape = Shape::new();
        Self::add_to_shape(&mut shape);
        shape
    }
}

fn unavailable<T: Component>(splitter: &BlockSplitter<'_>, access: &str) -> ! {
    if splitter.shape().has_field::<T>() {
        panic!("conflicting {} borrow of {} in a query", access, type_name::<T>())
    } else {
        panic!("block of shape {:?} has no {} column", splitter.shape(), type_name::<T>())
    }
}

impl<'a, 'b, T: Component> Query<'a> for &'b T {
    type Item = &'a T;
    type Iter = slice::Iter<'a, T>;

    fn add_to_shape(shape: &mut Shape) {
        shape.add_field::<T>();
    }

    fn fetch(splitter: &mut BlockSplitter<'a>) -> Self::Iter {
        match splitter.column::<T>() {
            Some(column) => column.iter(),
            None => unavailable::<T>(splitter, "shared"),
        }
    }
}

impl<'a, 'b, T: Component> Query<'a> for &'b mut T {
    type Item = &'a mut T;
    type Iter = slice::IterMut<'a, T>;

    fn add_to_shape(shape: &mut Shape) {
        shape.add_field::<T>();
    }

    fn fetch(splitter: &mut BlockSplitter<'a>) -> Self::Iter {
        match splitter.column_mut::<T>() {
            Some(column) => column.iter_mut(),
            None => unavailable::<T>(splitter, "exclusive"),
        }
    }
}

impl<'a> Query<'a> for EntityHandle {
    type Item = EntityHandle;
    type Iter = Copied<slice::Iter<'a, EntityHandle>>;

    fn add_to_shape(_shape: &mut Shape) {}

    fn fetch(splitter: &mut BlockSplitter<'a>) -> Self::Iter {
        splitter.handles().iter().copied()
    }
}

/// Iterates several row iterators of the same block in lock step.
pub struct TupleIter<I>(I);

macro_rules! impl_query_tuple {
    ($($t:ident),+) => {
        impl<$($t: Iterator),+> Iterator for TupleIter<($($t,)+)> {
            type Item = ($($t::Item,)+);

            #[allow(non_snake_case)]
            fn next(&mut self) -> Option<Self::Item> {
                let ($($t,)+) = &mut self.0;
                Some(($($t.next()?,)+))
            }
        }

        impl<'a, $($t: Query<'a>),+> Query<'a> for ($($t,)+) {
            type Item = ($($t::Item,)+);
            type Iter = TupleIter<($($t::Iter,)+)>;

            fn add_to_shape(shape: &mut Shape) {
                $($t::add_to_shape(shape);)+
            }

            fn fetch(splitter: &mut BlockSplitter<'a>) -> Self::Iter {
                TupleIter(($($t::fetch(splitter),)+))
            }
        }
    };
}

macro_rules! impl_query_tuples {
    ($head:ident) => {
        impl_query_tuple!($head);
    };
    ($head:ident, $($tail:ident),+) => {
        impl_query_tuple!($head, $($tail),+);
        impl_query_tuples!($($tail),+);
    };
}

impl_query_tuples!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::{Block, DEFAULT_BLOCK_SIZE};
    use crate::{component, shape};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position(i32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Velocity(i32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Mass(i32);

    component!(Position);
    component!(Velocity);
    component!(Mass);

    fn block() -> Block {
        let mut block = Block::new(shape![Position, Velocity], DEFAULT_BLOCK_SIZE);
        for i in 0..4 {
            let row = block.create_row(EntityHandle::new(i, 0));
            block.set(row, Position(i as i32));
            block.set(row, Velocity(10));
        }
        block
    }

    #[test]
    fn test_query_shape() {
        let shape = <(&Position, &mut Velocity, EntityHandle)>::shape();
        assert_eq!(shape, shape![Position, Velocity]);
        assert_eq!(<&Mass>::shape(), shape![Mass]);
    }

    #[test]
    fn test_fetch_tuple() {
        let mut block = block();
        {
            let mut splitter = block.split();
            for (p, v) in <(&Position, &mut Velocity)>::fetch(&mut splitter) {
                v.0 += p.0;
            }
        }
        assert_eq!(block.column::<Velocity>(), &[Velocity(10), Velocity(11), Velocity(12), Velocity(13)]);

        let mut splitter = block.split();
        let handles = <(EntityHandle, &Position)>::fetch(&mut splitter)
            .map(|(h, _)| h.index())
            .collect::<Vec<_>>();
        assert_eq!(handles, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shared_twice() {
        let mut block = block();
        let mut splitter = block.split();
        let count = <(&Position, &Position)>::fetch(&mut splitter)
            .filter(|(a, b)| a == b)
            .count();
        assert_eq!(count, 4);
    }

    #[test]
    #[should_panic(expected = "conflicting")]
    fn test_conflicting_borrow() {
        let mut block = block();
        let mut splitter = block.split();
        <(&Position, &mut Position)>::fetch(&mut splitter);
    }

    #[test]
    #[should_panic(expected = "no")]
    fn test_missing_column() {
        let mut block = block();
        let mut splitter = block.split();
        <(&Position, &Mass)>::fetch(&mut splitter);
    }
}
