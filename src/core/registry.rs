//! Name- and type-keyed tables of field options, consulted once per field
//! while a route registers.
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use crate::core::{
    error::RegistrationError,
    modifier::{ErasedModifier, ErasedOption, FieldInfo, FieldOption, compose},
    route::Route,
    schema::{FieldDef, Input, TypeTag},
};

/// A field definition paired with its compiled modifier.
pub(crate) struct CompiledField<I> {
    pub(crate) def: FieldDef<I>,
    pub(crate) modifier: ErasedModifier,
}

impl<I> fmt::Debug for CompiledField<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledField")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

/// Erase a sequence of typed options into a single registry entry.
pub(crate) fn erase<T: Any + Send>(options: Vec<FieldOption<T>>) -> ErasedOption {
    Arc::new(move |route: &mut Route, field: &FieldInfo| compose(&options, route, field))
}

#[derive(Default)]
pub(crate) struct FieldRegistry {
    by_name: HashMap<String, ErasedOption>,
    by_type: HashMap<TypeTag, ErasedOption>,
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("by_name", &self.by_name.keys().collect::<Vec<_>>())
            .field("by_type", &self.by_type.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldRegistry {
    pub(crate) fn add_name_option(&mut self, name: impl Into<String>, option: ErasedOption) {
        let name = name.into();
        if self.by_name.insert(name.clone(), option).is_some() {
            tracing::warn!(field = %name, "field option by name replaced");
        }
    }

    pub(crate) fn add_type_option(&mut self, tag: TypeTag, option: ErasedOption) {
        if self.by_type.insert(tag, option).is_some() {
            tracing::warn!(field_type = %tag, "field option by type replaced");
        }
    }

    /// Option for `def`: exact name first, then declared type.
    pub(crate) fn resolve<I>(&self, def: &FieldDef<I>) -> Result<&ErasedOption, RegistrationError> {
        if !def.is_exported() {
            return Err(RegistrationError::UnexportedField {
                field: def.name().to_string(),
            });
        }
        self.by_name
            .get(def.name())
            .or_else(|| self.by_type.get(&def.tag()))
            .ok_or_else(|| RegistrationError::UnboundField {
                field: def.name().to_string(),
                type_name: def.tag().name(),
            })
    }

    /// Resolve and compile every field of `I` in declaration order.
    pub(crate) fn compile_input<I: Input>(
        &self,
        route: &mut Route,
    ) -> Result<Vec<CompiledField<I>>, RegistrationError> {
        let fields = I::fields();
        let mut compiled = Vec::with_capacity(fields.len());
        for def in fields {
            let option = self.resolve(&def)?;
            route.set_field(def.name());
            let info = FieldInfo {
                name: def.name(),
                tag: def.tag(),
            };
            let modifier = option(route, &info)?;
            compiled.push(CompiledField { def, modifier });
        }
        Ok(compiled)
    }
}
