//! Statically declared binding schemas for handler inputs.
//!
//! A handler's input type lists its fields once through [`Input::fields`].
//! Each entry carries the field's name, a [`TypeTag`] for its declared type,
//! whether it is exported, and an accessor into the value. The router walks
//! this list at registration time to resolve a field option per field and
//! at request time to hand each compiled modifier its field's storage.
use std::{
    any::{Any, TypeId},
    fmt,
};

/// A handler input whose fields are populated by the router.
///
/// ```
/// use fieldroute::{Fields, Fixed, Input};
///
/// #[derive(Default)]
/// struct Greeting {
///     greeting: Fixed,
///     name: String,
/// }
///
/// impl Input for Greeting {
///     fn fields() -> Fields<Self> {
///         Fields::new()
///             .field("greeting", |i: &mut Self| &mut i.greeting)
///             .field("name", |i: &mut Self| &mut i.name)
///     }
/// }
/// ```
pub trait Input: Default + Send + Sized + 'static {
    /// The fields of this input, in declaration order.
    fn fields() -> Fields<Self>;
}

/// Stable identifier for a field's declared type.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Field type that reserves a fixed path segment without storing anything.
///
/// Bind it with [`crate::path_by_name_of_fixed_typed`] or an explicit
/// [`crate::path`] option.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fixed;

/// Field type receiving the unmatched path suffix of a catch-all route.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Remainder(pub Vec<String>);

impl Remainder {
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The suffix joined back with `/`.
    pub fn joined(&self) -> String {
        self.0.join("/")
    }
}

trait Access<I>: Send + Sync {
    fn get<'a>(&self, input: &'a mut I) -> &'a mut (dyn Any + Send);
}

struct FnAccess<I, T>(fn(&mut I) -> &mut T);

impl<I, T: Any + Send> Access<I> for FnAccess<I, T> {
    fn get<'a>(&self, input: &'a mut I) -> &'a mut (dyn Any + Send) {
        (self.0)(input)
    }
}

/// Static description of one input field.
pub struct FieldDef<I> {
    name: &'static str,
    tag: TypeTag,
    exported: bool,
    access: Box<dyn Access<I>>,
}

impl<I> FieldDef<I> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub(crate) fn slot<'a>(&self, input: &'a mut I) -> &'a mut (dyn Any + Send) {
        self.access.get(input)
    }
}

impl<I> fmt::Debug for FieldDef<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("exported", &self.exported)
            .finish()
    }
}

/// Ordered field list of an [`Input`].
pub struct Fields<I> {
    defs: Vec<FieldDef<I>>,
}

impl<I: 'static> Fields<I> {
    pub fn new() -> Self {
        Self { defs: Vec::new() }
    }

    /// Declare an exported field.
    pub fn field<T: Any + Send>(self, name: &'static str, access: fn(&mut I) -> &mut T) -> Self {
        self.push(name, true, access)
    }

    /// Declare a field that is not externally accessible.
    ///
    /// Registering a route whose input has such a field fails.
    pub fn private<T: Any + Send>(self, name: &'static str, access: fn(&mut I) -> &mut T) -> Self {
        self.push(name, false, access)
    }

    fn push<T: Any + Send>(
        mut self,
        name: &'static str,
        exported: bool,
        access: fn(&mut I) -> &mut T,
    ) -> Self {
        self.defs.push(FieldDef {
            name,
            tag: TypeTag::of::<T>(),
            exported,
            access: Box::new(FnAccess(access)),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDef<I>> {
        self.defs.iter()
    }
}

impl<I: 'static> Default for Fields<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> IntoIterator for Fields<I> {
    type Item = FieldDef<I>;
    type IntoIter = std::vec::IntoIter<FieldDef<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.defs.into_iter()
    }
}
