//! Shapes are the 'layout' of entities: the set of attached components and
//! their byte sizes.

use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};

use crate::component::{Component, FieldRegistration, FieldTypeId, MAX_FIELD_TYPES};

/// A set of component types, one bit per `FieldTypeId`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(u128);

impl Signature {
    /// The signature with no bits set.
    pub const fn empty() -> Signature {
        Signature(0)
    }

    /// Return the raw bitset.
    pub const fn bits(self) -> u128 {
        self.0
    }

    /// Returns true if the bit for `type_id` is set.
    pub fn includes(self, type_id: FieldTypeId) -> bool {
        self.0 & Signature::bit(type_id) != 0
    }

    /// Returns true if every bit set in `other` is also set in `self`.
    pub fn is_superset_of(self, other: Signature) -> bool {
        self.0 & other.0 == other.0
    }

    /// Return the number of types in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if no types are in the set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn insert(&mut self, type_id: FieldTypeId) {
        self.0 |= Signature::bit(type_id);
    }

    fn remove(&mut self, type_id: FieldTypeId) {
        self.0 &= !Signature::bit(type_id);
    }

    fn bit(type_id: FieldTypeId) -> u128 {
        debug_assert!(type_id.id() < MAX_FIELD_TYPES);
        1u128 << type_id.id()
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:#x})", self.0)
    }
}

/// A shape describes the layout of one kind of entity.
///
/// It holds the signature of the attached component types and their
/// registrations, sorted by type ID. Two shapes with the same signature
/// always have identical field lists, so shapes compare and hash by signature.
#[derive(Clone, Default)]
pub struct Shape {
    signature: Signature,
    fields: Vec<FieldRegistration>,
    memory_size: usize,
}

impl Shape {
    /// Create a shape with no fields.
    pub fn new() -> Shape {
        Shape::default()
    }

    /// Builder variant of `add_field`.
    pub fn with<T: Component>(mut self) -> Shape {
        self.add_field::<T>();
        self
    }

    /// Add the component type `T` to this shape.
    ///
    /// Adding a type which is already present does nothing.
    pub fn add_field<T: Component>(&mut self) -> &mut Shape {
        self.insert(FieldRegistration::new::<T>(T::type_id()))
    }

    /// Add a component type to this shape by ID.
    ///
    /// # Panics
    /// If the type was not registered with the global registry.
    pub fn add_field_type(&mut self, type_id: FieldTypeId) -> &mut Shape {
        if self.signature.includes(type_id) {
            return self;
        }
        self.insert(type_id.registration())
    }

    /// Remove the component type `T` from this shape.
    ///
    /// Removing a type which is not present does nothing.
    pub fn remove_field<T: Component>(&mut self) -> &mut Shape {
        self.remove_field_type(T::type_id())
    }

    /// Remove a component type from this shape by ID.
    pub fn remove_field_type(&mut self, type_id: FieldTypeId) -> &mut Shape {
        if let Ok(idx) = self.position_of(type_id) {
            let removed = self.fields.remove(idx);
            self.signature.remove(type_id);
            self.memory_size -= removed.size();
        }
        self
    }

    fn insert(&mut self, registration: FieldRegistration) -> &mut Shape {
        if let Err(idx) = self.position_of(registration.type_id()) {
            self.signature.insert(registration.type_id());
            self.memory_size += registration.size();
            self.fields.insert(idx, registration);
        }
        self
    }

    fn position_of(&self, type_id: FieldTypeId) -> Result<usize, usize> {
        self.fields.binary_search_by(|f| f.type_id().cmp(&type_id))
    }

    /// Return the index of a component type in the sorted field list.
    pub fn position(&self, type_id: FieldTypeId) -> Option<usize> {
        self.position_of(type_id).ok()
    }

    /// Returns true if every type in `other` is also in this shape.
    pub fn contains(&self, other: &Shape) -> bool {
        self.signature.is_superset_of(other.signature)
    }

    /// Returns true if this shape has the component type `T`.
    pub fn has_field<T: Component>(&self) -> bool {
        self.has_field_type(T::type_id())
    }

    /// Returns true if this shape has the given component type.
    pub fn has_field_type(&self, type_id: FieldTypeId) -> bool {
        self.signature.includes(type_id)
    }

    /// Return the sum of the sizes of every field ordered before `T`.
    ///
    /// Multiplied by a block's capacity this is where the column of `T` starts
    /// relative to the first field column.
    pub fn offset_of<T: Component>(&self) -> usize {
        self.offset_of_type(T::type_id())
    }

    /// Return the sum of the sizes of every field with an ID below `type_id`.
    pub fn offset_of_type(&self, type_id: FieldTypeId) -> usize {
        self.fields.iter()
            .take_while(|f| f.type_id() < type_id)
            .map(FieldRegistration::size)
            .sum()
    }

    /// Return the sum of the sizes of the first `position` fields.
    ///
    /// # Panics
    /// If `position` is out of range.
    pub fn offset_of_position(&self, position: usize) -> usize {
        self.check_position(position);
        self.fields[..position].iter().map(FieldRegistration::size).sum()
    }

    /// Return the size of the field at `position`.
    ///
    /// # Panics
    /// If `position` is out of range.
    pub fn size_of_position(&self, position: usize) -> usize {
        self.check_position(position);
        self.fields[position].size()
    }

    /// Return the type ID of the field at `position`.
    ///
    /// # Panics
    /// If `position` is out of range.
    pub fn type_id_of_position(&self, position: usize) -> FieldTypeId {
        self.check_position(position);
        self.fields[position].type_id()
    }

    fn check_position(&self, position: usize) {
        assert!(position < self.fields.len(),
                "field position {} out of range for a shape with {} fields",
                position, self.fields.len());
    }

    /// Return the number of bytes one row of this shape occupies, not counting
    /// the entity handle.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// Return the number of fields in this shape.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Return the signature of this shape.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Return the registrations of every field, sorted by type ID.
    pub fn fields(&self) -> &[FieldRegistration] {
        &self.fields
    }

    /// Iterate over the type IDs of every field, in ascending order.
    pub fn type_ids(&self) -> impl Iterator<Item = FieldTypeId> + '_ {
        self.fields.iter().map(FieldRegistration::type_id)
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Shape) -> bool {
        self.signature == other.signature
    }
}

impl Eq for Shape {}

impl Hash for Shape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature.hash(state)
    }
}

impl Debug for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(FieldRegistration::name))
            .finish()
    }
}

/// Shortcut for neatly creating shapes.
#[macro_export]
macro_rules! shape {
    () => { $crate::shape::Shape::new() };
    ($($t:ty),+ $(,)?) => {
        $crate::shape::Shape::new()$(.with::<$t>())+
    };
}
