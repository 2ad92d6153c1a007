//! Base definitions for components.
//!
//! Entities in this library are nothing but a bundle of component values. This
//! module provides the means of defining component types and assigning each of
//! them a small, process-wide unique ID.
//!
//! There is a macro (`component`) to implement `Component` on plain data types.

use std::alloc::Layout;
use std::any::{type_name, TypeId};
use std::cmp::{Ord, Ordering};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use tracing::trace;

/// The maximum number of distinct component types a process can register.
///
/// Signatures are 128-bit sets, so this is also the width of a `Signature`.
pub const MAX_FIELD_TYPES: usize = 128;

/// A component type ID which is unique for a specific component type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldTypeId(usize);

impl FieldTypeId {
    /// Construct a new `FieldTypeId` from the inner value.
    pub(crate) fn new(inner: usize) -> FieldTypeId {
        assert!(inner < MAX_FIELD_TYPES, "field type id {} exceeds the limit of {}", inner, MAX_FIELD_TYPES);
        FieldTypeId(inner)
    }

    /// Return the inner unique ID.
    pub fn id(&self) -> usize {
        self.0
    }

    /// Fetch the registration information for this component type from the
    /// global registry.
    ///
    /// # Panics
    /// If the ID was not handed out by the global registry.
    pub fn registration(&self) -> FieldRegistration {
        TypeRegistry::global()
            .registration(*self)
            .unwrap_or_else(|| panic!("field type #{} is not registered", self.0))
    }

    /// Fetch the memory layout of this component type.
    pub fn layout(&self) -> Layout {
        self.registration().layout()
    }

    /// Return the name of this component type.
    pub fn name(&self) -> &'static str {
        self.registration().name()
    }
}

impl Debug for FieldTypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match TypeRegistry::global().registration(*self) {
            Some(reg) => write!(f, "{}", reg.name()),
            None => write!(f, "FieldTypeId(#{} missing)", self.0),
        }
    }
}

/// A table assigning `FieldTypeId`s to Rust types.
///
/// IDs are handed out in registration order, starting at zero. The same type
/// always maps to the same ID for the lifetime of the registry.
pub struct TypeRegistry {
    inner: RwLock<RegistryTable>,
}

#[derive(Default)]
struct RegistryTable {
    by_type: HashMap<TypeId, FieldTypeId>,
    registrations: Vec<FieldRegistration>,
}

static GLOBAL_REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

impl TypeRegistry {
    /// Create a new, empty registry.
    pub fn new() -> TypeRegistry {
        TypeRegistry {
            inner: RwLock::new(RegistryTable::default()),
        }
    }

    /// Return the registry used by the `component!` macro.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL_REGISTRY
    }

    /// Return the ID of `T`, registering it if this is the first time it has
    /// been seen.
    ///
    /// # Panics
    /// If more than `MAX_FIELD_TYPES` types are registered.
    pub fn id_of<T: Component>(&self) -> FieldTypeId {
        let key = TypeId::of::<T>();
        if let Some(id) = self.inner.read().by_type.get(&key) {
            return *id;
        }

        let mut table = self.inner.write();
        if let Some(id) = table.by_type.get(&key) {
            return *id;
        }

        let id = FieldTypeId::new(table.registrations.len());
        table.registrations.push(FieldRegistration::new::<T>(id));
        table.by_type.insert(key, id);
        trace!(id = id.id(), name = type_name::<T>(), "registered field type");
        id
    }

    /// Fetch the registration for a type ID, returning `None` if it is
    /// missing from the registry.
    pub fn registration(&self, id: FieldTypeId) -> Option<FieldRegistration> {
        self.inner.read().registrations.get(id.0).copied()
    }

    /// Return the number of registered types.
    pub fn len(&self) -> usize {
        self.inner.read().registrations.len()
    }

    /// Returns true if no types have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}

/// A struct for lazily assigning unique `FieldTypeId`s.
pub struct AutoFieldTypeId(OnceCell<FieldTypeId>);

impl AutoFieldTypeId {
    /// Create a new `AutoFieldTypeId`.
    pub const fn new() -> AutoFieldTypeId {
        AutoFieldTypeId(OnceCell::new())
    }

    /// Get the `FieldTypeId` this struct wraps.
    pub fn get<T: Component>(&self) -> FieldTypeId {
        *self.0.get_or_init(|| TypeRegistry::global().id_of::<T>())
    }
}

/// The component trait is implemented on all component types.
///
/// This trait is unsafe, because implementing it and not returning a unique
/// `type_id` can result in other safe functions on `Block`s performing illegal
/// casts.
pub unsafe trait Component: Debug + Default + Copy + 'static {
    /// Get the unique type ID of this component.
    fn type_id() -> FieldTypeId;

    /// Get the memory layout of an instance of this component.
    fn layout() -> Layout;
}

/// A FieldRegistration is the dynamic version of a type implementing Component.
#[derive(Clone, Copy)]
pub struct FieldRegistration {
    type_id: FieldTypeId,
    layout: Layout,
    set_default: fn(&mut [u8]),
    name: &'static str,
}

impl FieldRegistration {
    /// Create a FieldRegistration for a static type.
    pub fn new<T: Component>(type_id: FieldTypeId) -> FieldRegistration {
        fn default<T: Component>(dest: &mut [u8]) {
            assert_eq!(dest.len(), std::mem::size_of::<T>());
            // Unaligned, since callers may hand us a byte slice from anywhere.
            unsafe { std::ptr::write_unaligned(dest.as_mut_ptr() as *mut T, T::default()) };
        }

        FieldRegistration {
            type_id,
            layout: Layout::new::<T>(),
            set_default: default::<T>,
            name: type_name::<T>(),
        }
    }

    /// Return the unique type ID for this `FieldRegistration`.
    pub fn type_id(&self) -> FieldTypeId {
        self.type_id
    }

    /// Return the memory layout of a single instance of this component.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Return the size in bytes of a single instance of this component.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Get the name of this component type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Given the storage buffer of a component instance, fill in the default
    /// value.
    pub fn set_default(&self, dest: &mut [u8]) {
        (self.set_default)(dest)
    }
}

impl PartialEq for FieldRegistration {
    fn eq(&self, other: &FieldRegistration) -> bool {
        self.type_id.eq(&other.type_id)
    }
}

impl Eq for FieldRegistration {}

impl PartialOrd for FieldRegistration {
    fn partial_cmp(&self, other: &FieldRegistration) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldRegistration {
    fn cmp(&self, other: &FieldRegistration) -> Ordering {
        self.type_id.cmp(&other.type_id)
    }
}

impl Debug for FieldRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<FieldRegistration #{} {} ({} bytes)>", self.type_id.0, self.name, self.layout.size())
    }
}

/// Implement the `Component` trait on a type.
///
/// Component types must implement Copy, Default and Debug.
#[macro_export]
macro_rules! component {
    ($i:ident) => {
        const _: () = {
            static INIT_TYPE: $crate::component::AutoFieldTypeId = $crate::component::AutoFieldTypeId::new();

            unsafe impl $crate::component::Component for $i {
                fn type_id() -> $crate::component::FieldTypeId {
                    INIT_TYPE.get::<$i>()
                }

                fn layout() -> ::core::alloc::Layout {
                    ::core::alloc::Layout::new::<$i>()
                }
            }

            ()
        };
    };
}
